use crate::error::{ResourceType, UowError};
use crate::schema::{quote_identifier, TableDescriptor};
use crate::tracker::RowTracker;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Write class of a table, plus the `All` filter value accepted by save
/// calls. Classification itself never yields `All`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TableType {
    Standard,
    Counter,
    All,
}

impl TableType {
    /// Whether this filter admits a table of the given class.
    pub fn matches(self, class: TableType) -> bool {
        self == TableType::All || self == class
    }

    pub fn is_single_class(self) -> bool {
        self != TableType::All
    }
}

/// Keyspace-qualified, quoted table identity. Unique key per context;
/// registering the same resolved identity twice yields the same table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TableIdentity(String);

impl TableIdentity {
    pub fn resolve(table_name: &str, keyspace: Option<&str>) -> Result<Self, UowError> {
        let name = table_name.trim();
        if name.is_empty() {
            return Err(UowError::InvalidIdentifier {
                message: "resolved table name is empty".into(),
            });
        }
        let quoted = match keyspace.map(str::trim).filter(|ks| !ks.is_empty()) {
            Some(ks) => format!("{}.{}", quote_identifier(ks), quote_identifier(name)),
            None => quote_identifier(name),
        };
        Ok(Self(quoted))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cheap reference to a registered table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableHandle {
    identity: TableIdentity,
}

impl TableHandle {
    pub fn identity(&self) -> &TableIdentity {
        &self.identity
    }
}

pub(crate) struct TableEntry {
    pub(crate) descriptor: TableDescriptor,
    pub(crate) table_type: TableType,
    pub(crate) tracker: RowTracker,
}

/// Owns table metadata and mutation trackers for the lifetime of a context.
/// Registration order is preserved so batch payload ordering is stable.
#[derive(Default)]
pub struct TableRegistry {
    tables: Vec<(TableIdentity, TableEntry)>,
}

impl TableRegistry {
    /// Registers a table, resolving name and keyspace from the explicit
    /// hints, then the descriptor, then the configured default keyspace.
    /// Re-registering an already-known identity returns the existing handle.
    /// Classification runs eagerly here so an unclassifiable schema fails at
    /// registration, never mid-save.
    pub fn register(
        &mut self,
        descriptor: TableDescriptor,
        name_hint: Option<&str>,
        keyspace_hint: Option<&str>,
        default_keyspace: Option<&str>,
    ) -> Result<TableHandle, UowError> {
        let name = name_hint.unwrap_or(&descriptor.table_name);
        let keyspace = keyspace_hint
            .or(descriptor.keyspace.as_deref())
            .or(default_keyspace);
        let identity = TableIdentity::resolve(name, keyspace)?;

        if self.tables.iter().any(|(id, _)| *id == identity) {
            return Ok(TableHandle { identity });
        }

        let table_type = descriptor.classify()?;
        let tracker = RowTracker::new(identity.clone(), descriptor.clone(), table_type);
        self.tables.push((
            identity.clone(),
            TableEntry {
                descriptor,
                table_type,
                tracker,
            },
        ));
        Ok(TableHandle { identity })
    }

    /// Cached classification for a registered table.
    pub fn classify(&self, handle: &TableHandle) -> Result<TableType, UowError> {
        self.entry(handle.identity())
            .map(|entry| entry.table_type)
            .ok_or_else(|| self.not_found(handle.identity()))
    }

    pub fn class_of(&self, identity: &TableIdentity) -> Result<TableType, UowError> {
        self.entry(identity)
            .map(|entry| entry.table_type)
            .ok_or_else(|| self.not_found(identity))
    }

    /// Snapshot of every table's classification, carried in the save tag.
    pub fn classification_map(&self) -> HashMap<TableIdentity, TableType> {
        self.tables
            .iter()
            .map(|(id, entry)| (id.clone(), entry.table_type))
            .collect()
    }

    pub(crate) fn entry(&self, identity: &TableIdentity) -> Option<&TableEntry> {
        self.tables
            .iter()
            .find(|(id, _)| id == identity)
            .map(|(_, entry)| entry)
    }

    pub(crate) fn entry_mut(&mut self, identity: &TableIdentity) -> Option<&mut TableEntry> {
        self.tables
            .iter_mut()
            .find(|(id, _)| id == identity)
            .map(|(_, entry)| entry)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&TableIdentity, &TableEntry)> {
        self.tables.iter().map(|(id, entry)| (id, entry))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&TableIdentity, &mut TableEntry)> {
        self.tables.iter_mut().map(|(id, entry)| (&*id, entry))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub(crate) fn not_found(&self, identity: &TableIdentity) -> UowError {
        UowError::NotFound {
            resource_type: ResourceType::Table,
            resource_id: identity.as_str().to_string(),
        }
    }
}
