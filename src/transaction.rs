//! Optimistic sessions: watch-based transactions over a record's keys.
//!
//! The session watches every field key, stages all fields, runs the body
//! against the staging buffer, and commits the staged writes as one buffered
//! command group. If any watched key changed in the meantime the commit
//! fails with [`Error::Conflict`] and applies nothing; the caller decides
//! whether to re-run the body, directly or through
//! [`Record::with_transaction_retry`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::record::Record;
use crate::store::{RemoteStore, StoreTransaction};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Handle passed to a transaction body to abandon the session explicitly.
///
/// After `discard`, the session drops the staged writes and the buffered
/// command group without applying anything, and the body's return value is
/// passed through.
#[derive(Clone, Default)]
pub struct SessionControl {
    discarded: Arc<AtomicBool>,
}

impl SessionControl {
    fn new() -> Self {
        Self::default()
    }

    pub fn discard(&self) {
        self.discarded.store(true, Ordering::SeqCst);
    }

    fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::SeqCst)
    }
}

impl Record {
    /// Runs `body` as one optimistic transaction.
    ///
    /// Watches every field key, then populates the staging buffer with
    /// direct reads (watch-before-read, so a concurrent change anywhere in
    /// the window is caught at commit). On a clean, undiscarded return the
    /// staged writes are queued and executed atomically; a watched-key
    /// change surfaces as [`Error::Conflict`] with none of them applied.
    /// The staging buffer is detached on every exit path.
    pub async fn with_transaction<S, F, Fut, T>(&self, store: &S, body: F) -> Result<T>
    where
        S: RemoteStore,
        F: FnOnce(SessionControl) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut tx = store.transaction().await?;
        tx.watch(&self.schema().remote_keys()).await?;
        if let Err(e) = self.attach_staging(store).await {
            let _ = tx.discard().await;
            return Err(e);
        }

        let control = SessionControl::new();
        let result = body(control.clone()).await;

        let outcome = match &result {
            Ok(_) if !control.is_discarded() => match self.queue_staging(&mut tx) {
                Ok(()) => tx.exec().await,
                Err(e) => {
                    let _ = tx.discard().await;
                    Err(e)
                }
            },
            _ => {
                tracing::debug!(
                    record = self.schema().qualified_name(),
                    "transaction discarded"
                );
                tx.discard().await
            }
        };
        self.discard_staging();

        match (result, outcome) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), outcome) => {
                if let Err(discard_err) = outcome {
                    tracing::warn!(error = %discard_err, "discard failed after session body error");
                }
                Err(e)
            }
        }
    }

    /// Re-runs a transaction body on [`Error::Conflict`], with exponential
    /// backoff starting at 100ms and doubling per attempt, up to
    /// `max_attempts` runs. Any other error returns immediately.
    pub async fn with_transaction_retry<S, F, Fut, T>(
        &self,
        store: &S,
        max_attempts: usize,
        body: F,
    ) -> Result<T>
    where
        S: RemoteStore,
        F: Fn(SessionControl) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = RETRY_BASE_DELAY;
        let mut attempts = 0;

        loop {
            match self.with_transaction(store, &body).await {
                Err(Error::Conflict) => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        return Err(Error::Conflict);
                    }
                    tracing::debug!(attempts, "transaction conflict, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                other => return other,
            }
        }
    }
}
