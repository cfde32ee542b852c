pub mod batch;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod statement;
pub mod tracker;
pub mod types;

pub use batch::{PendingSave, SaveTag};
pub use commands::{AdditionalCommand, CommandQueue};
pub use config::UowConfig;
pub use context::{Context, SaveMode};
pub use error::{ResourceType, UowError, UowErrorCode};
pub use executor::{ExecutionHandle, ExecutionResult, StatementExecutor};
pub use registry::{TableHandle, TableIdentity, TableRegistry, TableType};
pub use schema::{ColumnDef, ColumnKind, ColumnType, TableDescriptor};
pub use statement::{
    Batch, BatchKind, ConsistencyLevel, ExecutionPayload, PreparedId, PreparedStatement,
    QueryTrace, Statement,
};
pub use tracker::{MutationTracker, RowTracker, RowState, TrackingMode, UpdateMode};
pub use types::{Row, Value};
