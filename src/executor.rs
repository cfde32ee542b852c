use crate::error::UowError;
use crate::registry::TableIdentity;
use crate::schema::TableDescriptor;
use crate::statement::{ConsistencyLevel, ExecutionPayload, PreparedStatement, QueryTrace};

/// Opaque token linking a `begin_execute` call to its `end_execute`.
/// Issued by the execution layer; this crate never inspects the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionHandle(pub u64);

#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub trace: Option<QueryTrace>,
}

/// The statement-execution capability this layer is written against.
///
/// Implementations own connections, retries, and consistency enforcement;
/// this crate only hands over payloads and consumes results. The begin/end
/// pair is an explicit continuation: `begin_execute` returns a handle and
/// `end_execute` retrieves the outcome, blocking only at that boundary.
pub trait StatementExecutor {
    fn execute(
        &self,
        payload: ExecutionPayload,
        consistency: ConsistencyLevel,
        tracing: bool,
    ) -> Result<ExecutionResult, UowError>;

    fn begin_execute(
        &self,
        payload: ExecutionPayload,
        consistency: ConsistencyLevel,
        tracing: bool,
    ) -> Result<ExecutionHandle, UowError>;

    fn end_execute(&self, handle: ExecutionHandle) -> Result<ExecutionResult, UowError>;

    fn prepare(&self, cql: &str) -> Result<PreparedStatement, UowError>;

    /// Protocol-capability probe: whether the negotiated protocol supports
    /// structured batch statements. When false the legacy literal script
    /// encoding is used instead.
    fn supports_structured_batch(&self) -> bool;

    /// Provisions one table. Implementations must surface an existing table
    /// as [`UowError::AlreadyExists`] so the caller can treat provisioning
    /// as idempotent.
    fn create_table_if_not_exists(
        &self,
        identity: &TableIdentity,
        descriptor: &TableDescriptor,
    ) -> Result<(), UowError>;
}
