//! Record schemas: the ordered field set declared for one record type.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::field::FieldSpec;
use crate::value::{TypeDesc, Value};

/// The ordered field set of one record type.
///
/// Built once per record type. The qualified name doubles as the remote key
/// namespace: every field key is derived from it, and two extra keys per type
/// hold the exclusion lock (`{name}!lock`) and the schema signature marker
/// (`{name}!class`).
#[derive(Debug)]
pub struct RecordSchema {
    qualified_name: String,
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
    lock_key: String,
    marker_key: String,
}

impl RecordSchema {
    pub fn builder(qualified_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            qualified_name: qualified_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    pub(crate) fn field(&self, name: &str) -> Result<&FieldSpec> {
        self.index
            .get(name)
            .map(|i| &self.fields[*i])
            .ok_or_else(|| Error::UnknownField(name.to_string()))
    }

    pub(crate) fn lock_key(&self) -> &str {
        &self.lock_key
    }

    pub(crate) fn marker_key(&self) -> &str {
        &self.marker_key
    }

    /// Every field's remote key, in declaration order.
    pub(crate) fn remote_keys(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|f| f.remote_key().to_string())
            .collect()
    }

    /// Canonical textual signature of the field set, persisted at the marker
    /// key to detect incompatible redefinitions across runs.
    pub(crate) fn signature(&self) -> String {
        let parts: Vec<String> = self.fields.iter().map(|f| f.signature()).collect();
        format!("{}{{{}}}", self.qualified_name, parts.join(";"))
    }
}

/// Builder for [`RecordSchema`]; codec resolution and validation happen in
/// [`SchemaBuilder::build`].
pub struct SchemaBuilder {
    qualified_name: String,
    fields: Vec<(String, TypeDesc, Value)>,
}

impl SchemaBuilder {
    pub fn field(
        mut self,
        name: impl Into<String>,
        desc: TypeDesc,
        default: impl Into<Value>,
    ) -> Self {
        self.fields.push((name.into(), desc, default.into()));
        self
    }

    pub fn build(self) -> Result<RecordSchema> {
        let mut fields = Vec::with_capacity(self.fields.len());
        let mut index = HashMap::with_capacity(self.fields.len());
        for (name, desc, default) in &self.fields {
            if index.contains_key(name) {
                return Err(Error::DuplicateField(name.clone()));
            }
            index.insert(name.clone(), fields.len());
            fields.push(FieldSpec::new(&self.qualified_name, name, desc, default.clone())?);
        }
        Ok(RecordSchema {
            lock_key: format!("{}!lock", self.qualified_name),
            marker_key: format!("{}!class", self.qualified_name),
            qualified_name: self.qualified_name,
            fields,
            index,
        })
    }
}
