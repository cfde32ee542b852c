use crate::error::UowError;
use crate::registry::TableType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    BigInt,
    Int,
    Double,
    Boolean,
    Uuid,
    Timestamp,
    Blob,
    Counter,
}

impl ColumnType {
    pub fn cql_name(self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::BigInt => "bigint",
            ColumnType::Int => "int",
            ColumnType::Double => "double",
            ColumnType::Boolean => "boolean",
            ColumnType::Uuid => "uuid",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Blob => "blob",
            ColumnType::Counter => "counter",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ColumnKind {
    PartitionKey,
    Clustering,
    Regular,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub col_type: ColumnType,
    pub kind: ColumnKind,
}

impl ColumnDef {
    pub fn partition_key(name: impl Into<String>, col_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            col_type,
            kind: ColumnKind::PartitionKey,
        }
    }

    pub fn clustering(name: impl Into<String>, col_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            col_type,
            kind: ColumnKind::Clustering,
        }
    }

    pub fn regular(name: impl Into<String>, col_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            col_type,
            kind: ColumnKind::Regular,
        }
    }

    pub fn is_key(&self) -> bool {
        matches!(self.kind, ColumnKind::PartitionKey | ColumnKind::Clustering)
    }
}

/// Explicit schema descriptor for one logical table.
///
/// The mapping layer hands the context a descriptor at registration;
/// classification, statement rendering, and provisioning CQL all derive
/// from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableDescriptor {
    pub table_name: String,
    pub keyspace: Option<String>,
    pub columns: Vec<ColumnDef>,
}

impl TableDescriptor {
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            table_name: table_name.into(),
            keyspace: None,
            columns,
        }
    }

    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.is_key())
    }

    pub fn regular_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns
            .iter()
            .filter(|c| matches!(c.kind, ColumnKind::Regular))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Assigns the table its write class. Counter tables must be pure: every
    /// non-key column is a counter, and no key column is. Any other shape is
    /// a fatal classification error, never silently defaulted.
    pub fn classify(&self) -> Result<TableType, UowError> {
        let classification_error = |message: &str| UowError::Classification {
            table: self.table_name.clone(),
            message: message.to_string(),
        };

        if self.columns.is_empty() {
            return Err(classification_error("table has no columns"));
        }
        if !self
            .columns
            .iter()
            .any(|c| matches!(c.kind, ColumnKind::PartitionKey))
        {
            return Err(classification_error("table has no partition key"));
        }
        if self
            .key_columns()
            .any(|c| c.col_type == ColumnType::Counter)
        {
            return Err(classification_error("primary key column cannot be a counter"));
        }

        let counters = self
            .regular_columns()
            .filter(|c| c.col_type == ColumnType::Counter)
            .count();
        if counters == 0 {
            return Ok(TableType::Standard);
        }
        let regulars = self.regular_columns().count();
        if counters != regulars {
            return Err(classification_error(
                "counter columns cannot be mixed with regular data columns",
            ));
        }
        Ok(TableType::Counter)
    }

    /// Renders the provisioning DDL for this table. Key ordering follows
    /// descriptor order: partition columns grouped first, then clustering.
    pub fn create_cql(&self, identity: &str) -> String {
        let mut cql = String::from("CREATE TABLE ");
        cql.push_str(identity);
        cql.push_str(" (");
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                cql.push_str(", ");
            }
            cql.push_str(&quote_identifier(&col.name));
            cql.push(' ');
            cql.push_str(col.col_type.cql_name());
        }
        cql.push_str(", PRIMARY KEY ((");
        let partition: Vec<&ColumnDef> = self
            .columns
            .iter()
            .filter(|c| matches!(c.kind, ColumnKind::PartitionKey))
            .collect();
        for (i, col) in partition.iter().enumerate() {
            if i > 0 {
                cql.push_str(", ");
            }
            cql.push_str(&quote_identifier(&col.name));
        }
        cql.push(')');
        for col in self
            .columns
            .iter()
            .filter(|c| matches!(c.kind, ColumnKind::Clustering))
        {
            cql.push_str(", ");
            cql.push_str(&quote_identifier(&col.name));
        }
        cql.push_str("))");
        cql
    }
}

/// Double-quotes a CQL identifier, escaping embedded quotes by doubling.
pub fn quote_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for ch in name.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}
