use crate::batch::PendingSave;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Keyspace,
    Table,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Keyspace => write!(f, "keyspace"),
            ResourceType::Table => write!(f, "table"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UowErrorCode {
    Io,
    InvalidIdentifier,
    InvalidConfig,
    Classification,
    ContractViolation,
    KeyspaceAlreadyExists,
    TableAlreadyExists,
    KeyspaceNotFound,
    TableNotFound,
    ColumnNotFound,
    MissingPrimaryKey,
    Execution,
    Timeout,
    Unavailable,
}

impl UowErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            UowErrorCode::Io => "io",
            UowErrorCode::InvalidIdentifier => "invalid_identifier",
            UowErrorCode::InvalidConfig => "invalid_config",
            UowErrorCode::Classification => "classification",
            UowErrorCode::ContractViolation => "contract_violation",
            UowErrorCode::KeyspaceAlreadyExists => "keyspace_already_exists",
            UowErrorCode::TableAlreadyExists => "table_already_exists",
            UowErrorCode::KeyspaceNotFound => "keyspace_not_found",
            UowErrorCode::TableNotFound => "table_not_found",
            UowErrorCode::ColumnNotFound => "column_not_found",
            UowErrorCode::MissingPrimaryKey => "missing_primary_key",
            UowErrorCode::Execution => "execution",
            UowErrorCode::Timeout => "timeout",
            UowErrorCode::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Error)]
pub enum UowError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid identifier: {message}")]
    InvalidIdentifier { message: String },
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    /// The table's schema cannot be assigned a single write class
    /// (e.g. counter columns mixed with regular data columns).
    #[error("classification error on table '{table}': {message}")]
    Classification { table: String, message: String },
    /// Caller broke the save protocol: `All` passed to a single-class begin,
    /// or a second begin before the matching end.
    #[error("contract violation: {0}")]
    ContractViolation(String),
    /// A pending save handle was offered to a context other than the one
    /// that issued it. The handle is returned so the issuing context can
    /// still complete its in-flight save.
    #[error("pending save handle was issued by a different context")]
    ForeignPendingSave { pending: Box<PendingSave> },
    #[error("{resource_type} '{resource_id}' already exists")]
    AlreadyExists {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("{resource_type} '{resource_id}' not found")]
    NotFound {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("unknown column '{column}' in table '{table}'")]
    ColumnNotFound { table: String, column: String },
    #[error("row for table '{table}' is missing primary key column '{column}'")]
    MissingPrimaryKey { table: String, column: String },
    /// Failure reported by the statement-execution layer, propagated unmodified.
    #[error("execution error: {message}")]
    Execution { message: String },
    #[error("timeout")]
    Timeout,
    #[error("resource unavailable: {message}")]
    Unavailable { message: String },
}

impl UowError {
    pub fn code(&self) -> UowErrorCode {
        match self {
            UowError::Io(_) => UowErrorCode::Io,
            UowError::InvalidIdentifier { .. } => UowErrorCode::InvalidIdentifier,
            UowError::InvalidConfig { .. } => UowErrorCode::InvalidConfig,
            UowError::Classification { .. } => UowErrorCode::Classification,
            UowError::ContractViolation(_) => UowErrorCode::ContractViolation,
            UowError::ForeignPendingSave { .. } => UowErrorCode::ContractViolation,
            UowError::AlreadyExists { resource_type, .. } => match resource_type {
                ResourceType::Keyspace => UowErrorCode::KeyspaceAlreadyExists,
                ResourceType::Table => UowErrorCode::TableAlreadyExists,
            },
            UowError::NotFound { resource_type, .. } => match resource_type {
                ResourceType::Keyspace => UowErrorCode::KeyspaceNotFound,
                ResourceType::Table => UowErrorCode::TableNotFound,
            },
            UowError::ColumnNotFound { .. } => UowErrorCode::ColumnNotFound,
            UowError::MissingPrimaryKey { .. } => UowErrorCode::MissingPrimaryKey,
            UowError::Execution { .. } => UowErrorCode::Execution,
            UowError::Timeout => UowErrorCode::Timeout,
            UowError::Unavailable { .. } => UowErrorCode::Unavailable,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// True for the "already exists" condition that idempotent provisioning swallows.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, UowError::AlreadyExists { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::{ResourceType, UowError, UowErrorCode};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(
            UowErrorCode::TableAlreadyExists.as_str(),
            "table_already_exists"
        );
        assert_eq!(
            UowErrorCode::ContractViolation.as_str(),
            "contract_violation"
        );
        assert_eq!(UowErrorCode::Classification.as_str(), "classification");
    }

    #[test]
    fn error_code_str_matches_variant_mapping() {
        let err = UowError::AlreadyExists {
            resource_type: ResourceType::Table,
            resource_id: "\"ks\".\"events\"".into(),
        };
        assert_eq!(err.code(), UowErrorCode::TableAlreadyExists);
        assert_eq!(err.code_str(), "table_already_exists");
        assert!(err.is_already_exists());
    }

    #[test]
    fn not_found_maps_per_resource() {
        let err = UowError::NotFound {
            resource_type: ResourceType::Keyspace,
            resource_id: "app".into(),
        };
        assert_eq!(err.code(), UowErrorCode::KeyspaceNotFound);
        assert!(!err.is_already_exists());
    }
}
