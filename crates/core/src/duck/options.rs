//! Per-request connection options.

use std::collections::BTreeMap;

use duckdb::Connection;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{is_identifier, quote_literal};
use crate::Error;

/// Options applied on every `connect`, pooled or not.
///
/// Unlike the construction-time [`EngineSettings`](super::EngineSettings),
/// these may differ between requests that share one pooled connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConnectOptions {
    /// Extensions to `LOAD` (they must already be installed).
    #[serde(default)]
    pub preload_extensions: Vec<String>,

    /// Session settings applied with `SET name = 'value'`.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl ConnectOptions {
    pub fn is_empty(&self) -> bool {
        self.preload_extensions.is_empty() && self.settings.is_empty()
    }

    /// Reject names that cannot be spliced into SQL safely.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(ext) = self.preload_extensions.iter().find(|e| !is_identifier(e)) {
            return Err(Error::InvalidInput(format!("invalid extension name: {ext:?}")));
        }
        if let Some(name) = self.settings.keys().find(|k| !is_identifier(k)) {
            return Err(Error::InvalidInput(format!("invalid setting name: {name:?}")));
        }
        Ok(())
    }

    /// Statements that apply these options.
    pub fn statements(&self) -> Vec<String> {
        let loads = self.preload_extensions.iter().map(|ext| format!("LOAD {ext};"));
        let sets = self.settings.iter().map(|(name, value)| format!("SET {name} = {};", quote_literal(value)));
        loads.chain(sets).collect()
    }

    pub(crate) fn apply(&self, conn: &Connection) -> Result<(), Error> {
        self.validate()?;
        for stmt in self.statements() {
            conn.execute_batch(&stmt)?;
        }
        Ok(())
    }
}
