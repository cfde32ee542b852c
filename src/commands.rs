use crate::error::UowError;
use crate::registry::{TableIdentity, TableType};
use crate::types::Value;
use serde::{Deserialize, Serialize};

/// A free-standing write command queued outside entity tracking. It still
/// names an owning table so the save path can classify it, and carries its
/// own tracing flag. The statement is parameterized CQL so it can feed
/// either batch encoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdditionalCommand {
    pub table: TableIdentity,
    pub cql: String,
    pub values: Vec<Value>,
    pub tracing: bool,
}

impl AdditionalCommand {
    pub fn new(table: TableIdentity, cql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            table,
            cql: cql.into(),
            values,
            tracing: false,
        }
    }

    pub fn with_tracing(mut self, tracing: bool) -> Self {
        self.tracing = tracing;
        self
    }
}

/// Ordered queue of additional commands. Insertion order is preserved both
/// into batch payloads and across save cycles, and the queue is replaced
/// wholesale with the leftover set at the end of each cycle.
#[derive(Debug, Default, Clone)]
pub struct CommandQueue {
    items: Vec<AdditionalCommand>,
}

impl CommandQueue {
    pub fn append(&mut self, command: AdditionalCommand) {
        self.items.push(command);
    }

    pub fn items(&self) -> &[AdditionalCommand] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn replace(&mut self, items: Vec<AdditionalCommand>) {
        self.items = items;
    }

    /// Splits the queue by the save filter without mutating it: a command is
    /// included exactly when the filter matches its owning table's class,
    /// and requeued into the leftover otherwise. One rule for every save
    /// path, so no command is ever dropped or duplicated across a cycle.
    pub fn partition<F>(
        &self,
        filter: TableType,
        class_of: F,
    ) -> Result<(Vec<AdditionalCommand>, Vec<AdditionalCommand>), UowError>
    where
        F: Fn(&TableIdentity) -> Result<TableType, UowError>,
    {
        let mut included = Vec::new();
        let mut leftover = Vec::new();
        for command in &self.items {
            let class = class_of(&command.table)?;
            if filter.matches(class) {
                included.push(command.clone());
            } else {
                leftover.push(command.clone());
            }
        }
        Ok((included, leftover))
    }
}
