//! Pessimistic sessions: a remote named lock serializing access to one
//! record type across threads and processes.

use std::future::Future;

use crate::error::Result;
use crate::record::Record;
use crate::store::RemoteStore;

/// How field access behaves while the lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// Every field access is one remote round trip; the lock only provides
    /// exclusion.
    #[default]
    Direct,
    /// All fields are fetched into the staging buffer on entry (one MGET
    /// plus one HGETALL per map field); the body runs with zero remote
    /// calls; the buffer is flushed back before the lock is released.
    LocalCopy,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LockOptions {
    pub mode: LockMode,
    /// Applies to [`LockMode::LocalCopy`] when the body returns an error.
    /// `false` (the default) still flushes the staged writes, which can
    /// persist a partially-updated batch; `true` discards them instead.
    pub discard_on_error: bool,
}

impl LockOptions {
    pub fn direct() -> Self {
        LockOptions::default()
    }

    pub fn local_copy() -> Self {
        LockOptions {
            mode: LockMode::LocalCopy,
            ..LockOptions::default()
        }
    }

    pub fn discard_on_error(mut self, discard: bool) -> Self {
        self.discard_on_error = discard;
        self
    }
}

impl Record {
    /// Runs `body` under the record type's remote exclusion lock.
    ///
    /// The lock is released on every exit path, after any flush, so staged
    /// writes land while the lock is still held. Error precedence: the body
    /// error, then the flush error, then the release error; secondary
    /// errors are logged and dropped.
    pub async fn with_lock<S, F, Fut, T>(&self, store: &S, options: LockOptions, body: F) -> Result<T>
    where
        S: RemoteStore,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lock_key = self.schema().lock_key();
        store.lock_acquire(lock_key).await?;
        tracing::debug!(
            record = self.schema().qualified_name(),
            mode = ?options.mode,
            "lock acquired"
        );

        let result = self.run_locked(store, options, body).await;

        let released = store.lock_release(lock_key).await;
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), released) => {
                if let Err(release_err) = released {
                    tracing::warn!(error = %release_err, "lock release failed after session error");
                }
                Err(e)
            }
        }
    }

    async fn run_locked<S, F, Fut, T>(&self, store: &S, options: LockOptions, body: F) -> Result<T>
    where
        S: RemoteStore,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match options.mode {
            LockMode::Direct => body().await,
            LockMode::LocalCopy => {
                self.attach_staging(store).await?;
                let result = body().await;

                let flushed = if result.is_err() && options.discard_on_error {
                    Ok(())
                } else {
                    self.flush_staging(store).await
                };
                self.discard_staging();

                match (result, flushed) {
                    (Ok(value), Ok(())) => Ok(value),
                    (Ok(_), Err(e)) => Err(e),
                    (Err(e), flushed) => {
                        if let Err(flush_err) = flushed {
                            tracing::warn!(error = %flush_err, "flush failed after session body error");
                        }
                        Err(e)
                    }
                }
            }
        }
    }
}
