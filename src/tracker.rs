use crate::error::UowError;
use crate::executor::StatementExecutor;
use crate::registry::{TableIdentity, TableType};
use crate::schema::{quote_identifier, ColumnType, TableDescriptor};
use crate::statement::{BatchBuilder, ConsistencyLevel, QueryTrace, Statement};
use crate::types::{Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    New,
    Attached,
    Deleted,
}

/// How an attached row is rewritten on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Rewrite every regular column from the tracked row.
    AllOrNone,
    /// Write only columns recorded through `update`.
    ModifiedOnly,
}

/// What happens to a row after the save that includes it is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    DetachAfterSave,
    KeepAttachedAfterSave,
}

#[derive(Debug, Clone)]
struct Tracked {
    key: Vec<Value>,
    row: Row,
    state: RowState,
    update_mode: UpdateMode,
    tracking_mode: TrackingMode,
    /// (column index, value). For standard tables the value mirrors the row
    /// cell; for counter tables it is the increment delta.
    changes: Vec<(usize, Value)>,
    tracing: bool,
}

/// The slice of a tracker the save orchestration consumes. Keeping the save
/// path behind this seam means batch assembly never depends on how rows are
/// attached or how change sets are recorded.
pub trait MutationTracker {
    /// Appends every pending mutation to the batch under assembly. Returns
    /// whether any contributed mutation requested tracing.
    fn append_pending(&self, builder: &mut BatchBuilder) -> Result<bool, UowError>;

    /// Keys of the rows `append_pending` would contribute right now. Batch
    /// assembly snapshots these so completion later only touches rows that
    /// were actually sent.
    fn pending_keys(&self) -> Vec<Vec<Value>>;

    /// Executes pending mutations individually through prepared statements,
    /// completing each row as its statement succeeds.
    fn execute_one_by_one(
        &mut self,
        executor: &dyn StatementExecutor,
        consistency: ConsistencyLevel,
    ) -> Result<(), UowError>;

    /// Reconciles after a confirmed batch write: the listed rows transition
    /// per their tracking mode and the batch trace is retained per row. Rows
    /// that became pending after assembly are not listed and stay pending.
    fn mark_batch_complete(&mut self, trace: Option<QueryTrace>, keys: &[Vec<Value>]);

    fn pending_count(&self) -> usize;
}

/// Per-table change tracker over schema-aligned rows.
pub struct RowTracker {
    identity: TableIdentity,
    descriptor: TableDescriptor,
    class: TableType,
    entries: Vec<Tracked>,
    traces: Vec<(Vec<Value>, QueryTrace)>,
}

impl RowTracker {
    pub(crate) fn new(
        identity: TableIdentity,
        descriptor: TableDescriptor,
        class: TableType,
    ) -> Self {
        Self {
            identity,
            descriptor,
            class,
            entries: Vec::new(),
            traces: Vec::new(),
        }
    }

    fn key_positions(&self) -> Vec<usize> {
        self.descriptor
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_key())
            .map(|(i, _)| i)
            .collect()
    }

    fn extract_key(&self, row: &Row) -> Result<Vec<Value>, UowError> {
        if row.values.len() != self.descriptor.columns.len() {
            return Err(UowError::ContractViolation(format!(
                "row for {} has {} values, schema has {} columns",
                self.identity,
                row.values.len(),
                self.descriptor.columns.len()
            )));
        }
        let mut key = Vec::new();
        for idx in self.key_positions() {
            let column = &self.descriptor.columns[idx];
            match row.values.get(idx) {
                Some(Value::Null) | None => {
                    return Err(UowError::MissingPrimaryKey {
                        table: self.identity.as_str().to_string(),
                        column: column.name.clone(),
                    });
                }
                Some(value) => key.push(value.clone()),
            }
        }
        Ok(key)
    }

    fn position(&self, key: &[Value]) -> Option<usize> {
        self.entries.iter().position(|t| t.key == key)
    }

    /// Tracks a pending INSERT. Re-adding a key already tracked replaces the
    /// previous pending entry. Counter tables reject inserts: the store has
    /// no counter INSERT, increments go through `attach` + `update`.
    pub fn add_new(&mut self, row: Row, tracking_mode: TrackingMode) -> Result<(), UowError> {
        if self.class == TableType::Counter {
            return Err(UowError::ContractViolation(format!(
                "table {} is counter-classified and does not accept inserts",
                self.identity
            )));
        }
        let key = self.extract_key(&row)?;
        let tracked = Tracked {
            key,
            row,
            state: RowState::New,
            update_mode: UpdateMode::AllOrNone,
            tracking_mode,
            changes: Vec::new(),
            tracing: false,
        };
        match self.position(&tracked.key) {
            Some(i) => self.entries[i] = tracked,
            None => self.entries.push(tracked),
        }
        Ok(())
    }

    /// Tracks an existing row. With `AllOrNone` the whole row is rewritten at
    /// save time; with `ModifiedOnly` nothing is written until `update`
    /// records a change.
    pub fn attach(
        &mut self,
        row: Row,
        update_mode: UpdateMode,
        tracking_mode: TrackingMode,
    ) -> Result<(), UowError> {
        let key = self.extract_key(&row)?;
        let tracked = Tracked {
            key,
            row,
            state: RowState::Attached,
            update_mode,
            tracking_mode,
            changes: Vec::new(),
            tracing: false,
        };
        match self.position(&tracked.key) {
            Some(i) => self.entries[i] = tracked,
            None => self.entries.push(tracked),
        }
        Ok(())
    }

    /// Records column changes on an attached row. On counter tables every
    /// change is an increment delta and must be a `BigInt`.
    pub fn update(&mut self, key: &[Value], changes: &[(&str, Value)]) -> Result<(), UowError> {
        let table = self.identity.as_str().to_string();
        let counter_table = self.class == TableType::Counter;
        let i = self.position(key).ok_or_else(|| {
            UowError::ContractViolation(format!("update on a row not tracked by {table}"))
        })?;
        if self.entries[i].state != RowState::Attached {
            return Err(UowError::ContractViolation(format!(
                "update on a row of {table} that is not in the attached state"
            )));
        }

        // Validate all changes before touching the entry so a bad column
        // name leaves the change set untouched.
        let mut resolved = Vec::with_capacity(changes.len());
        for (name, value) in changes {
            let idx = self
                .descriptor
                .column_index(name)
                .ok_or_else(|| UowError::ColumnNotFound {
                    table: table.clone(),
                    column: name.to_string(),
                })?;
            let column = &self.descriptor.columns[idx];
            if column.is_key() {
                return Err(UowError::ContractViolation(format!(
                    "primary key column '{name}' of {table} cannot be updated"
                )));
            }
            if counter_table && !matches!(value, Value::BigInt(_)) {
                return Err(UowError::ContractViolation(format!(
                    "counter increment for '{name}' of {table} must be a BigInt delta"
                )));
            }
            resolved.push((idx, value.clone()));
        }

        let entry = &mut self.entries[i];
        for (idx, value) in resolved {
            if !counter_table {
                entry.row.values[idx] = value.clone();
            }
            match entry.changes.iter_mut().find(|(existing, _)| *existing == idx) {
                Some((_, existing)) => {
                    if counter_table {
                        // Consecutive increments on one cell accumulate.
                        if let (Value::BigInt(a), Value::BigInt(b)) = (&*existing, &value) {
                            *existing = Value::BigInt(a + b);
                        }
                    } else {
                        *existing = value;
                    }
                }
                None => entry.changes.push((idx, value)),
            }
        }
        Ok(())
    }

    /// Tracks a pending DELETE by primary key.
    pub fn delete(&mut self, key: &[Value], tracking_mode: TrackingMode) -> Result<(), UowError> {
        let positions = self.key_positions();
        if key.len() != positions.len() || key.iter().any(|v| matches!(v, Value::Null)) {
            return Err(UowError::MissingPrimaryKey {
                table: self.identity.as_str().to_string(),
                column: self.descriptor.columns[positions[key.len().min(positions.len() - 1)]]
                    .name
                    .clone(),
            });
        }
        match self.position(key) {
            Some(i) => {
                let entry = &mut self.entries[i];
                entry.state = RowState::Deleted;
                entry.tracking_mode = tracking_mode;
                entry.changes.clear();
            }
            None => {
                // Delete of an untracked key only needs the key columns;
                // non-key cells stay Null in the placeholder row.
                let mut values = vec![Value::Null; self.descriptor.columns.len()];
                for (slot, idx) in positions.iter().enumerate() {
                    values[*idx] = key[slot].clone();
                }
                self.entries.push(Tracked {
                    key: key.to_vec(),
                    row: Row::from_values(values),
                    state: RowState::Deleted,
                    update_mode: UpdateMode::AllOrNone,
                    tracking_mode,
                    changes: Vec::new(),
                    tracing: false,
                });
            }
        }
        Ok(())
    }

    /// Removes a tracked row without writing anything. Returns whether the
    /// key was tracked.
    pub fn detach(&mut self, key: &[Value]) -> bool {
        match self.position(key) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn enable_tracing(&mut self, key: &[Value], enabled: bool) -> Result<(), UowError> {
        let i = self.position(key).ok_or_else(|| {
            UowError::ContractViolation(format!(
                "tracing toggle on a row not tracked by {}",
                self.identity
            ))
        })?;
        self.entries[i].tracing = enabled;
        Ok(())
    }

    /// Trace recorded for a key by the most recent confirmed save.
    pub fn trace(&self, key: &[Value]) -> Option<&QueryTrace> {
        self.traces
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, t)| t)
    }

    pub fn all_traces(&self) -> impl Iterator<Item = &QueryTrace> {
        self.traces.iter().map(|(_, t)| t)
    }

    fn where_clause(&self) -> (String, Vec<usize>) {
        let mut clause = String::new();
        let positions = self.key_positions();
        for (i, idx) in positions.iter().enumerate() {
            if i > 0 {
                clause.push_str(" AND ");
            }
            clause.push_str(&quote_identifier(&self.descriptor.columns[*idx].name));
            clause.push_str(" = ?");
        }
        (clause, positions)
    }

    /// Renders one entry's pending mutation as parameterized CQL, or `None`
    /// when the entry has nothing to write (attached with no recorded
    /// changes, or nothing updatable).
    fn render(&self, entry: &Tracked) -> Option<(String, Vec<Value>)> {
        match entry.state {
            RowState::New => {
                let mut cols = String::new();
                let mut marks = String::new();
                let mut values = Vec::with_capacity(self.descriptor.columns.len());
                for (i, col) in self.descriptor.columns.iter().enumerate() {
                    if i > 0 {
                        cols.push_str(", ");
                        marks.push_str(", ");
                    }
                    cols.push_str(&quote_identifier(&col.name));
                    marks.push('?');
                    values.push(entry.row.values[i].clone());
                }
                Some((
                    format!("INSERT INTO {} ({cols}) VALUES ({marks})", self.identity),
                    values,
                ))
            }
            RowState::Attached => {
                let counter_table = self.class == TableType::Counter;
                let targets: Vec<(usize, Value)> = if counter_table
                    || entry.update_mode == UpdateMode::ModifiedOnly
                {
                    entry.changes.clone()
                } else {
                    self.descriptor
                        .columns
                        .iter()
                        .enumerate()
                        .filter(|(_, c)| !c.is_key())
                        .map(|(i, _)| (i, entry.row.values[i].clone()))
                        .collect()
                };
                if targets.is_empty() {
                    return None;
                }

                let mut set = String::new();
                let mut values = Vec::with_capacity(targets.len() + entry.key.len());
                for (i, (idx, value)) in targets.iter().enumerate() {
                    if i > 0 {
                        set.push_str(", ");
                    }
                    let name = quote_identifier(&self.descriptor.columns[*idx].name);
                    if counter_table {
                        set.push_str(&format!("{name} = {name} + ?"));
                    } else {
                        set.push_str(&format!("{name} = ?"));
                    }
                    values.push(value.clone());
                }
                let (clause, _) = self.where_clause();
                values.extend(entry.key.iter().cloned());
                Some((
                    format!("UPDATE {} SET {set} WHERE {clause}", self.identity),
                    values,
                ))
            }
            RowState::Deleted => {
                let (clause, _) = self.where_clause();
                Some((
                    format!("DELETE FROM {} WHERE {clause}", self.identity),
                    entry.key.clone(),
                ))
            }
        }
    }

    fn is_pending(&self, entry: &Tracked) -> bool {
        match entry.state {
            RowState::New | RowState::Deleted => true,
            RowState::Attached => {
                if self.class == TableType::Counter
                    || entry.update_mode == UpdateMode::ModifiedOnly
                {
                    !entry.changes.is_empty()
                } else {
                    self.descriptor.columns.iter().any(|c| !c.is_key())
                }
            }
        }
    }

    fn complete_entry(entry: &mut Tracked) -> bool {
        // Returns whether the entry leaves the tracker.
        match (entry.state, entry.tracking_mode) {
            (RowState::Deleted, _) | (_, TrackingMode::DetachAfterSave) => true,
            (_, TrackingMode::KeepAttachedAfterSave) => {
                // The row stays attached but is clean until the next update.
                entry.state = RowState::Attached;
                entry.update_mode = UpdateMode::ModifiedOnly;
                entry.changes.clear();
                false
            }
        }
    }
}

impl MutationTracker for RowTracker {
    fn append_pending(&self, builder: &mut BatchBuilder) -> Result<bool, UowError> {
        let mut tracing = false;
        for entry in &self.entries {
            if let Some((cql, values)) = self.render(entry) {
                builder.push(&cql, values)?;
                tracing |= entry.tracing;
            }
        }
        Ok(tracing)
    }

    fn execute_one_by_one(
        &mut self,
        executor: &dyn StatementExecutor,
        consistency: ConsistencyLevel,
    ) -> Result<(), UowError> {
        let mut i = 0;
        while i < self.entries.len() {
            if !self.is_pending(&self.entries[i]) {
                i += 1;
                continue;
            }
            let (cql, values) = match self.render(&self.entries[i]) {
                Some(rendered) => rendered,
                None => {
                    i += 1;
                    continue;
                }
            };
            let prepared = executor.prepare(&cql)?;
            let result = executor.execute(
                crate::statement::ExecutionPayload::Statement(Statement::Bound {
                    prepared: prepared.id,
                    values,
                }),
                consistency,
                self.entries[i].tracing,
            )?;

            let entry = &mut self.entries[i];
            if let Some(trace) = result.trace {
                self.traces.push((entry.key.clone(), trace));
            }
            if Self::complete_entry(entry) {
                self.entries.remove(i);
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    fn pending_keys(&self) -> Vec<Vec<Value>> {
        self.entries
            .iter()
            .filter(|e| self.is_pending(e))
            .map(|e| e.key.clone())
            .collect()
    }

    fn mark_batch_complete(&mut self, trace: Option<QueryTrace>, keys: &[Vec<Value>]) {
        let mut i = 0;
        while i < self.entries.len() {
            if !self.is_pending(&self.entries[i]) || !keys.contains(&self.entries[i].key) {
                i += 1;
                continue;
            }
            if let Some(trace) = &trace {
                let key = self.entries[i].key.clone();
                self.traces.push((key, trace.clone()));
            }
            if Self::complete_entry(&mut self.entries[i]) {
                self.entries.remove(i);
            } else {
                i += 1;
            }
        }
    }

    fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| self.is_pending(e)).count()
    }
}
