use crate::batch::{assemble, PendingSave, SaveTag};
use crate::commands::{AdditionalCommand, CommandQueue};
use crate::config::UowConfig;
use crate::error::UowError;
use crate::executor::{ExecutionResult, StatementExecutor};
use crate::registry::{TableHandle, TableRegistry, TableType};
use crate::schema::TableDescriptor;
use crate::statement::{ConsistencyLevel, ExecutionPayload, QueryTrace, Statement};
use crate::tracker::{MutationTracker, TrackingMode, UpdateMode};
use crate::types::{Row, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// One statement per pending mutation, executed individually.
    OneByOne,
    /// Per-class batch payloads, at most one request per write class.
    Batch,
}

/// The unit of work. Owns the table registry and the additional-command
/// queue, routes row lifecycle calls to the per-table trackers, and drives
/// the three save strategies against the execution capability.
///
/// A context is single-caller: it performs no internal locking, and exactly
/// one batch save may be in flight between a begin/end pair.
pub struct Context<E: StatementExecutor> {
    id: u64,
    config: UowConfig,
    executor: E,
    registry: TableRegistry,
    commands: CommandQueue,
    batch_in_flight: bool,
}

impl<E: StatementExecutor> Context<E> {
    pub fn new(executor: E, config: UowConfig) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            config,
            executor,
            registry: TableRegistry::default(),
            commands: CommandQueue::default(),
            batch_in_flight: false,
        }
    }

    pub fn config(&self) -> &UowConfig {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn command_queue(&self) -> &CommandQueue {
        &self.commands
    }

    /// Registers a table under the descriptor's own name and keyspace
    /// (falling back to the configured default keyspace). Idempotent per
    /// resolved identity.
    pub fn register(&mut self, descriptor: TableDescriptor) -> Result<TableHandle, UowError> {
        self.register_as(descriptor, None, None)
    }

    pub fn register_as(
        &mut self,
        descriptor: TableDescriptor,
        name_hint: Option<&str>,
        keyspace_hint: Option<&str>,
    ) -> Result<TableHandle, UowError> {
        self.registry.register(
            descriptor,
            name_hint,
            keyspace_hint,
            self.config.default_keyspace.as_deref(),
        )
    }

    pub fn classify(&self, handle: &TableHandle) -> Result<TableType, UowError> {
        self.registry.classify(handle)
    }

    /// Issues provisioning DDL for every registered table. An existing table
    /// is not an error: provisioning is idempotent.
    pub fn create_all_if_not_exist(&self) -> Result<(), UowError> {
        for (identity, entry) in self.registry.iter() {
            match self
                .executor
                .create_table_if_not_exists(identity, &entry.descriptor)
            {
                Err(err) if err.is_already_exists() => {
                    debug!(table = %identity, "table already exists, skipping");
                }
                other => other?,
            }
        }
        Ok(())
    }

    // Row lifecycle, routed to the owning tracker.

    pub fn add_new(
        &mut self,
        handle: &TableHandle,
        row: Row,
        tracking_mode: TrackingMode,
    ) -> Result<(), UowError> {
        self.tracker_mut(handle)?.add_new(row, tracking_mode)
    }

    pub fn attach(
        &mut self,
        handle: &TableHandle,
        row: Row,
        update_mode: UpdateMode,
        tracking_mode: TrackingMode,
    ) -> Result<(), UowError> {
        self.tracker_mut(handle)?.attach(row, update_mode, tracking_mode)
    }

    pub fn update(
        &mut self,
        handle: &TableHandle,
        key: &[Value],
        changes: &[(&str, Value)],
    ) -> Result<(), UowError> {
        self.tracker_mut(handle)?.update(key, changes)
    }

    pub fn delete(
        &mut self,
        handle: &TableHandle,
        key: &[Value],
        tracking_mode: TrackingMode,
    ) -> Result<(), UowError> {
        self.tracker_mut(handle)?.delete(key, tracking_mode)
    }

    pub fn detach(&mut self, handle: &TableHandle, key: &[Value]) -> Result<bool, UowError> {
        Ok(self.tracker_mut(handle)?.detach(key))
    }

    pub fn enable_tracing(
        &mut self,
        handle: &TableHandle,
        key: &[Value],
        enabled: bool,
    ) -> Result<(), UowError> {
        self.tracker_mut(handle)?.enable_tracing(key, enabled)
    }

    pub fn trace(
        &self,
        handle: &TableHandle,
        key: &[Value],
    ) -> Result<Option<&QueryTrace>, UowError> {
        Ok(self.tracker_ref(handle)?.trace(key))
    }

    pub fn all_traces(&self, handle: &TableHandle) -> Result<Vec<&QueryTrace>, UowError> {
        Ok(self.tracker_ref(handle)?.all_traces().collect())
    }

    pub fn pending_count(&self, handle: &TableHandle) -> Result<usize, UowError> {
        let tracker: &dyn MutationTracker = self.tracker_ref(handle)?;
        Ok(tracker.pending_count())
    }

    pub fn total_pending(&self) -> usize {
        self.registry
            .iter()
            .map(|(_, entry)| {
                let tracker: &dyn MutationTracker = &entry.tracker;
                tracker.pending_count()
            })
            .sum::<usize>()
            + self.commands.len()
    }

    /// Queues a free-standing write command for the next save cycle.
    pub fn append_command(&mut self, command: AdditionalCommand) -> Result<(), UowError> {
        // Classify now so a command bound to an unregistered table fails at
        // append time rather than mid-save.
        self.registry.class_of(&command.table)?;
        self.commands.append(command);
        Ok(())
    }

    // Save strategies.

    /// Saves pending work using the configured default consistency.
    pub fn save_changes(&mut self, mode: SaveMode, table_type: TableType) -> Result<(), UowError> {
        self.save_changes_with(self.config.default_consistency, mode, table_type)
    }

    /// Synchronous save. `Batch` dispatches up to one request per write
    /// class matched by the filter (never a mixed batch); `OneByOne` runs
    /// each mutation as its own prepared statement.
    pub fn save_changes_with(
        &mut self,
        consistency: ConsistencyLevel,
        mode: SaveMode,
        table_type: TableType,
    ) -> Result<(), UowError> {
        if self.batch_in_flight {
            return Err(UowError::ContractViolation(
                "save_changes called while an async batch save is in flight".into(),
            ));
        }
        match mode {
            SaveMode::Batch => {
                for class in [TableType::Counter, TableType::Standard] {
                    if table_type.matches(class) {
                        self.save_class_sync(class, consistency)?;
                    }
                }
                Ok(())
            }
            SaveMode::OneByOne => self.save_one_by_one(consistency, table_type),
        }
    }

    /// Begin half of the asynchronous batch save for one write class.
    /// Returns `None` when the class has nothing to write; the returned
    /// handle must be passed to [`Context::end_save_changes_batch`] before
    /// another batch save can start. Tracker and queue state stay untouched
    /// until the end half confirms the write.
    pub fn begin_save_changes_batch(
        &mut self,
        table_type: TableType,
        consistency: ConsistencyLevel,
    ) -> Result<Option<PendingSave>, UowError> {
        if !table_type.is_single_class() {
            return Err(UowError::ContractViolation(
                "begin_save_changes_batch requires a single table class, not All".into(),
            ));
        }
        if self.batch_in_flight {
            return Err(UowError::ContractViolation(
                "a batch save is already in flight for this context".into(),
            ));
        }
        let assembled =
            match assemble(&self.registry, &self.commands, table_type, self.structured())? {
                Some(assembled) => assembled,
                None => return Ok(None),
            };
        let handle =
            self.executor
                .begin_execute(assembled.payload, consistency, assembled.tracing)?;
        self.batch_in_flight = true;
        Ok(Some(PendingSave {
            context_id: self.id,
            handle,
            tag: assembled.tag,
        }))
    }

    /// End half: retrieves the execution outcome and reconciles. On failure
    /// the error propagates unmodified and neither trackers nor the command
    /// queue change, so retrying the save re-attempts identical work. A
    /// handle issued by another context is rejected with the handle carried
    /// in the error, so the issuing context can still end its save.
    pub fn end_save_changes_batch(&mut self, pending: PendingSave) -> Result<(), UowError> {
        if pending.context_id != self.id {
            return Err(UowError::ForeignPendingSave {
                pending: Box::new(pending),
            });
        }
        self.batch_in_flight = false;
        let result = self.executor.end_execute(pending.handle)?;
        self.reconcile(pending.tag, result);
        Ok(())
    }

    fn structured(&self) -> bool {
        self.executor.supports_structured_batch() && !self.config.force_legacy_batch
    }

    fn save_class_sync(
        &mut self,
        class: TableType,
        consistency: ConsistencyLevel,
    ) -> Result<(), UowError> {
        let assembled = match assemble(&self.registry, &self.commands, class, self.structured())? {
            Some(assembled) => assembled,
            None => return Ok(()),
        };
        let result = self
            .executor
            .execute(assembled.payload, consistency, assembled.tracing)?;
        self.reconcile(assembled.tag, result);
        Ok(())
    }

    fn save_one_by_one(
        &mut self,
        consistency: ConsistencyLevel,
        filter: TableType,
    ) -> Result<(), UowError> {
        let executor = &self.executor;
        for (_, entry) in self.registry.iter_mut() {
            if filter.matches(entry.table_type) {
                let tracker: &mut dyn MutationTracker = &mut entry.tracker;
                tracker.execute_one_by_one(executor, consistency)?;
            }
        }

        let (included, leftover) = self
            .commands
            .partition(filter, |id| self.registry.class_of(id))?;
        for command in included {
            self.executor.execute(
                ExecutionPayload::Statement(Statement::Simple {
                    cql: command.cql,
                    values: command.values,
                }),
                consistency,
                command.tracing,
            )?;
        }
        self.commands.replace(leftover);
        Ok(())
    }

    /// Post-confirmation reconciliation: trackers of the saved class
    /// transition exactly the rows the payload carried, the command queue
    /// becomes the leftover set. Runs only after the execution layer
    /// reported success; rows tracked after assembly are left pending.
    fn reconcile(&mut self, tag: SaveTag, result: ExecutionResult) {
        let SaveTag {
            table_classification,
            class_saved,
            contributed_rows,
            leftover_commands,
        } = tag;
        for (identity, class) in &table_classification {
            if *class != class_saved {
                continue;
            }
            if let Some(keys) = contributed_rows.get(identity) {
                if let Some(entry) = self.registry.entry_mut(identity) {
                    let tracker: &mut dyn MutationTracker = &mut entry.tracker;
                    tracker.mark_batch_complete(result.trace.clone(), keys);
                }
            }
        }
        self.commands.replace(leftover_commands);
        debug!(class = ?class_saved, "save cycle reconciled");
    }

    fn tracker_mut(
        &mut self,
        handle: &TableHandle,
    ) -> Result<&mut crate::tracker::RowTracker, UowError> {
        let not_found = self.registry.not_found(handle.identity());
        self.registry
            .entry_mut(handle.identity())
            .map(|entry| &mut entry.tracker)
            .ok_or(not_found)
    }

    fn tracker_ref(&self, handle: &TableHandle) -> Result<&crate::tracker::RowTracker, UowError> {
        self.registry
            .entry(handle.identity())
            .map(|entry| &entry.tracker)
            .ok_or_else(|| self.registry.not_found(handle.identity()))
    }
}
