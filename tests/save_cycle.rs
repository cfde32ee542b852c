use std::cell::{Cell, RefCell};
use uow::{
    AdditionalCommand, ColumnDef, ColumnType, ConsistencyLevel, Context, ExecutionHandle,
    ExecutionPayload, ExecutionResult, PreparedId, PreparedStatement, QueryTrace, Row, SaveMode,
    TableDescriptor, TableHandle, TableIdentity, TableType, TrackingMode, UowConfig, UowError,
    UowErrorCode, UpdateMode, Value,
};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Call {
    payload: ExecutionPayload,
    consistency: ConsistencyLevel,
    tracing: bool,
}

/// Records everything crossing the execution boundary; failure and trace
/// behavior are scripted per test.
struct RecordingExecutor {
    structured: bool,
    calls: RefCell<Vec<Call>>,
    ended: RefCell<Vec<ExecutionHandle>>,
    in_flight: RefCell<Vec<(ExecutionHandle, Call)>>,
    fail_next_end: Cell<bool>,
    trace: Option<QueryTrace>,
    provisioned: RefCell<Vec<String>>,
}

impl RecordingExecutor {
    fn new(structured: bool) -> Self {
        Self {
            structured,
            calls: RefCell::new(Vec::new()),
            ended: RefCell::new(Vec::new()),
            in_flight: RefCell::new(Vec::new()),
            fail_next_end: Cell::new(false),
            trace: None,
            provisioned: RefCell::new(Vec::new()),
        }
    }

    fn with_trace(mut self, trace: QueryTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    fn executed(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }
}

impl uow::StatementExecutor for RecordingExecutor {
    fn execute(
        &self,
        payload: ExecutionPayload,
        consistency: ConsistencyLevel,
        tracing: bool,
    ) -> Result<ExecutionResult, UowError> {
        self.calls.borrow_mut().push(Call {
            payload,
            consistency,
            tracing,
        });
        Ok(ExecutionResult {
            trace: if tracing { self.trace.clone() } else { None },
        })
    }

    fn begin_execute(
        &self,
        payload: ExecutionPayload,
        consistency: ConsistencyLevel,
        tracing: bool,
    ) -> Result<ExecutionHandle, UowError> {
        let handle = ExecutionHandle(self.in_flight.borrow().len() as u64 + 1);
        self.in_flight.borrow_mut().push((
            handle,
            Call {
                payload,
                consistency,
                tracing,
            },
        ));
        Ok(handle)
    }

    fn end_execute(&self, handle: ExecutionHandle) -> Result<ExecutionResult, UowError> {
        if self.fail_next_end.replace(false) {
            return Err(UowError::Unavailable {
                message: "coordinator went away".into(),
            });
        }
        let call = self
            .in_flight
            .borrow()
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, call)| call.clone())
            .expect("unknown execution handle");
        self.ended.borrow_mut().push(handle);
        let tracing = call.tracing;
        self.calls.borrow_mut().push(call);
        Ok(ExecutionResult {
            trace: if tracing { self.trace.clone() } else { None },
        })
    }

    fn prepare(&self, cql: &str) -> Result<PreparedStatement, UowError> {
        Ok(PreparedStatement {
            id: PreparedId(cql.len() as u64),
            cql: cql.to_string(),
        })
    }

    fn supports_structured_batch(&self) -> bool {
        self.structured
    }

    fn create_table_if_not_exists(
        &self,
        identity: &TableIdentity,
        _descriptor: &TableDescriptor,
    ) -> Result<(), UowError> {
        let mut provisioned = self.provisioned.borrow_mut();
        if provisioned.iter().any(|p| p == identity.as_str()) {
            return Err(UowError::AlreadyExists {
                resource_type: uow::ResourceType::Table,
                resource_id: identity.as_str().to_string(),
            });
        }
        provisioned.push(identity.as_str().to_string());
        Ok(())
    }
}

fn events_descriptor() -> TableDescriptor {
    TableDescriptor::new(
        "events",
        vec![
            ColumnDef::partition_key("id", ColumnType::BigInt),
            ColumnDef::regular("payload", ColumnType::Text),
        ],
    )
}

fn hits_descriptor() -> TableDescriptor {
    TableDescriptor::new(
        "hits",
        vec![
            ColumnDef::partition_key("page", ColumnType::Text),
            ColumnDef::regular("views", ColumnType::Counter),
        ],
    )
}

fn two_class_context(structured: bool) -> (Context<RecordingExecutor>, TableHandle, TableHandle) {
    let mut ctx = Context::new(
        RecordingExecutor::new(structured),
        UowConfig::default().with_default_keyspace("app"),
    );
    let events = ctx.register(events_descriptor()).unwrap();
    let hits = ctx.register(hits_descriptor()).unwrap();

    ctx.add_new(
        &events,
        Row::from_values(vec![Value::BigInt(1), Value::Text("a".into())]),
        TrackingMode::DetachAfterSave,
    )
    .unwrap();
    ctx.add_new(
        &events,
        Row::from_values(vec![Value::BigInt(2), Value::Text("b".into())]),
        TrackingMode::DetachAfterSave,
    )
    .unwrap();
    ctx.attach(
        &hits,
        Row::from_values(vec![Value::Text("/home".into()), Value::Null]),
        UpdateMode::ModifiedOnly,
        TrackingMode::KeepAttachedAfterSave,
    )
    .unwrap();
    ctx.update(
        &hits,
        &[Value::Text("/home".into())],
        &[("views", Value::BigInt(1))],
    )
    .unwrap();

    (ctx, events, hits)
}

#[test]
fn all_filter_issues_one_request_per_populated_class() {
    let (mut ctx, events, hits) = two_class_context(true);
    assert_eq!(ctx.total_pending(), 3);

    ctx.save_changes_with(ConsistencyLevel::LocalQuorum, SaveMode::Batch, TableType::All)
        .unwrap();

    let calls = ctx.executor().executed();
    assert_eq!(calls.len(), 2, "one request per write class");
    let mut counter_batches = 0;
    let mut logged_batches = 0;
    for call in &calls {
        assert_eq!(call.consistency, ConsistencyLevel::LocalQuorum);
        match &call.payload {
            ExecutionPayload::Batch(batch) => match batch.kind {
                uow::BatchKind::Counter => {
                    counter_batches += 1;
                    assert_eq!(batch.statements.len(), 1);
                }
                uow::BatchKind::Logged => {
                    logged_batches += 1;
                    assert_eq!(batch.statements.len(), 2);
                }
            },
            other => panic!("expected structured batch, got {other:?}"),
        }
    }
    assert_eq!((counter_batches, logged_batches), (1, 1));

    assert_eq!(ctx.pending_count(&events).unwrap(), 0);
    assert_eq!(ctx.pending_count(&hits).unwrap(), 0);
    assert_eq!(ctx.total_pending(), 0);
}

#[test]
fn counter_and_standard_mutations_never_share_a_payload() {
    let (mut ctx, _, _) = two_class_context(false);
    ctx.save_changes(SaveMode::Batch, TableType::All).unwrap();

    for call in ctx.executor().executed() {
        match call.payload {
            ExecutionPayload::Script(script) => {
                let touches_events = script.contains("\"events\"");
                let touches_hits = script.contains("\"hits\"");
                assert!(
                    touches_events != touches_hits,
                    "classes mixed in one payload:\n{script}"
                );
            }
            other => panic!("expected legacy script, got {other:?}"),
        }
    }
}

#[test]
fn empty_context_issues_no_requests() {
    let mut ctx = Context::new(RecordingExecutor::new(true), UowConfig::default());
    ctx.save_changes(SaveMode::Batch, TableType::All).unwrap();
    ctx.save_changes(SaveMode::OneByOne, TableType::All).unwrap();
    assert!(ctx.executor().executed().is_empty());
}

#[test]
fn legacy_script_is_bit_exact() {
    let mut ctx = Context::new(
        RecordingExecutor::new(false),
        UowConfig::default().with_default_keyspace("app"),
    );
    let events = ctx.register(events_descriptor()).unwrap();
    ctx.add_new(
        &events,
        Row::from_values(vec![Value::BigInt(7), Value::Text("o'brien".into())]),
        TrackingMode::DetachAfterSave,
    )
    .unwrap();

    ctx.save_changes(SaveMode::Batch, TableType::Standard).unwrap();

    let calls = ctx.executor().executed();
    assert_eq!(calls.len(), 1);
    match &calls[0].payload {
        ExecutionPayload::Script(script) => assert_eq!(
            script,
            "BEGIN BATCH\n\
             INSERT INTO \"app\".\"events\" (\"id\", \"payload\") VALUES (7, 'o''brien')\n\
             APPLY BATCH"
        ),
        other => panic!("expected legacy script, got {other:?}"),
    }
}

#[test]
fn force_legacy_batch_overrides_the_capability_probe() {
    let mut ctx = Context::new(
        RecordingExecutor::new(true),
        UowConfig::default()
            .with_default_keyspace("app")
            .with_force_legacy_batch(true),
    );
    let events = ctx.register(events_descriptor()).unwrap();
    ctx.add_new(
        &events,
        Row::from_values(vec![Value::BigInt(1), Value::Text("a".into())]),
        TrackingMode::DetachAfterSave,
    )
    .unwrap();
    ctx.save_changes(SaveMode::Batch, TableType::Standard).unwrap();
    assert!(matches!(
        ctx.executor().executed()[0].payload,
        ExecutionPayload::Script(_)
    ));
}

#[test]
fn non_matching_command_survives_a_single_class_save() {
    let mut ctx = Context::new(
        RecordingExecutor::new(true),
        UowConfig::default().with_default_keyspace("app"),
    );
    let events = ctx.register(events_descriptor()).unwrap();
    let hits = ctx.register(hits_descriptor()).unwrap();
    ctx.add_new(
        &events,
        Row::from_values(vec![Value::BigInt(1), Value::Text("a".into())]),
        TrackingMode::DetachAfterSave,
    )
    .unwrap();
    let counter_command = AdditionalCommand::new(
        hits.identity().clone(),
        "UPDATE \"app\".\"hits\" SET \"views\" = \"views\" + ? WHERE \"page\" = ?",
        vec![Value::BigInt(1), Value::Text("/x".into())],
    );
    ctx.append_command(counter_command.clone()).unwrap();

    ctx.save_changes(SaveMode::Batch, TableType::Standard).unwrap();

    assert_eq!(ctx.executor().executed().len(), 1);
    assert_eq!(ctx.command_queue().items(), &[counter_command.clone()]);

    // The follow-up counter save picks the command up and drains the queue.
    ctx.save_changes(SaveMode::Batch, TableType::Counter).unwrap();
    assert!(ctx.command_queue().is_empty());
    assert_eq!(ctx.executor().executed().len(), 2);
}

#[test]
fn command_on_counter_table_alone_sends_nothing_under_standard_filter() {
    let mut ctx = Context::new(
        RecordingExecutor::new(true),
        UowConfig::default().with_default_keyspace("app"),
    );
    let hits = ctx.register(hits_descriptor()).unwrap();
    ctx.append_command(AdditionalCommand::new(
        hits.identity().clone(),
        "UPDATE \"app\".\"hits\" SET \"views\" = \"views\" + ? WHERE \"page\" = ?",
        vec![Value::BigInt(1), Value::Text("/x".into())],
    ))
    .unwrap();

    ctx.save_changes(SaveMode::Batch, TableType::Standard).unwrap();

    assert!(ctx.executor().executed().is_empty());
    assert_eq!(ctx.command_queue().len(), 1);
}

#[test]
fn async_save_reconciles_only_after_end() {
    let (mut ctx, events, hits) = two_class_context(true);

    let pending = ctx
        .begin_save_changes_batch(TableType::Standard, ConsistencyLevel::Quorum)
        .unwrap()
        .expect("standard work is pending");

    // Begin must not touch tracker state.
    assert_eq!(ctx.pending_count(&events).unwrap(), 2);
    assert_eq!(ctx.pending_count(&hits).unwrap(), 1);

    ctx.end_save_changes_batch(pending).unwrap();
    assert_eq!(ctx.executor().ended.borrow().len(), 1);
    assert_eq!(ctx.pending_count(&events).unwrap(), 0);
    assert_eq!(ctx.pending_count(&hits).unwrap(), 1, "counter class untouched");
}

#[test]
fn row_added_after_begin_stays_pending_for_the_next_save() {
    let mut ctx = Context::new(
        RecordingExecutor::new(true),
        UowConfig::default().with_default_keyspace("app"),
    );
    let events = ctx.register(events_descriptor()).unwrap();
    ctx.add_new(
        &events,
        Row::from_values(vec![Value::BigInt(1), Value::Text("a".into())]),
        TrackingMode::DetachAfterSave,
    )
    .unwrap();

    let pending = ctx
        .begin_save_changes_batch(TableType::Standard, ConsistencyLevel::Quorum)
        .unwrap()
        .expect("row 1 is pending");
    // Tracked after assembly: this row is not in the dispatched payload.
    ctx.add_new(
        &events,
        Row::from_values(vec![Value::BigInt(2), Value::Text("b".into())]),
        TrackingMode::DetachAfterSave,
    )
    .unwrap();
    ctx.end_save_changes_batch(pending).unwrap();

    assert_eq!(ctx.pending_count(&events).unwrap(), 1, "row 2 is still unsent");

    ctx.save_changes(SaveMode::Batch, TableType::Standard).unwrap();
    assert_eq!(ctx.pending_count(&events).unwrap(), 0);
    let calls = ctx.executor().executed();
    assert_eq!(calls.len(), 2);
    match &calls[1].payload {
        ExecutionPayload::Batch(batch) => assert_eq!(batch.statements.len(), 1),
        other => panic!("expected structured batch, got {other:?}"),
    }
}

#[test]
fn failed_end_leaves_trackers_and_queue_unchanged() {
    let (mut ctx, events, hits) = two_class_context(true);
    let stray = AdditionalCommand::new(
        hits.identity().clone(),
        "UPDATE \"app\".\"hits\" SET \"views\" = \"views\" + ? WHERE \"page\" = ?",
        vec![Value::BigInt(4), Value::Text("/y".into())],
    );
    ctx.append_command(stray.clone()).unwrap();

    let pending = ctx
        .begin_save_changes_batch(TableType::Standard, ConsistencyLevel::Quorum)
        .unwrap()
        .expect("standard work is pending");
    ctx.executor().fail_next_end.set(true);

    let err = ctx.end_save_changes_batch(pending).unwrap_err();
    assert_eq!(err.code(), UowErrorCode::Unavailable);

    // Identical work is re-attempted on retry.
    assert_eq!(ctx.pending_count(&events).unwrap(), 2);
    assert_eq!(ctx.command_queue().items(), &[stray.clone()]);

    let retry = ctx
        .begin_save_changes_batch(TableType::Standard, ConsistencyLevel::Quorum)
        .unwrap()
        .expect("retry sees the same pending work");
    ctx.end_save_changes_batch(retry).unwrap();
    assert_eq!(ctx.pending_count(&events).unwrap(), 0);
    assert_eq!(ctx.command_queue().items(), &[stray]);
}

#[test]
fn traces_are_recorded_for_traced_rows_after_confirmation() {
    let trace = QueryTrace {
        trace_id: Uuid::from_bytes([9u8; 16]),
        coordinator: Some("10.0.0.1".into()),
        duration_micros: Some(1200),
    };
    let mut ctx = Context::new(
        RecordingExecutor::new(true).with_trace(trace.clone()),
        UowConfig::default().with_default_keyspace("app"),
    );
    let events = ctx.register(events_descriptor()).unwrap();
    let key = [Value::BigInt(1)];
    ctx.add_new(
        &events,
        Row::from_values(vec![Value::BigInt(1), Value::Text("a".into())]),
        TrackingMode::KeepAttachedAfterSave,
    )
    .unwrap();
    ctx.enable_tracing(&events, &key, true).unwrap();

    let pending = ctx
        .begin_save_changes_batch(TableType::Standard, ConsistencyLevel::Quorum)
        .unwrap()
        .expect("pending insert");
    assert!(ctx.trace(&events, &key).unwrap().is_none(), "not before end");

    ctx.end_save_changes_batch(pending).unwrap();
    assert_eq!(ctx.trace(&events, &key).unwrap(), Some(&trace));
    assert_eq!(ctx.all_traces(&events).unwrap().len(), 1);
}

#[test]
fn one_by_one_executes_rows_and_matching_commands_individually() {
    let (mut ctx, events, hits) = two_class_context(true);
    let standard_command = AdditionalCommand::new(
        events.identity().clone(),
        "DELETE FROM \"app\".\"events\" WHERE \"id\" = ?",
        vec![Value::BigInt(9)],
    );
    let counter_command = AdditionalCommand::new(
        hits.identity().clone(),
        "UPDATE \"app\".\"hits\" SET \"views\" = \"views\" + ? WHERE \"page\" = ?",
        vec![Value::BigInt(1), Value::Text("/z".into())],
    );
    ctx.append_command(standard_command).unwrap();
    ctx.append_command(counter_command.clone()).unwrap();

    ctx.save_changes(SaveMode::OneByOne, TableType::Standard).unwrap();

    let calls = ctx.executor().executed();
    // Two tracked inserts plus the matching command, each its own request.
    assert_eq!(calls.len(), 3);
    assert!(calls
        .iter()
        .all(|c| matches!(c.payload, ExecutionPayload::Statement(_))));
    assert_eq!(ctx.pending_count(&events).unwrap(), 0);
    assert_eq!(ctx.pending_count(&hits).unwrap(), 1, "filtered out");
    assert_eq!(ctx.command_queue().items(), &[counter_command]);
}

#[test]
fn provisioning_is_idempotent() {
    let mut ctx = Context::new(
        RecordingExecutor::new(true),
        UowConfig::default().with_default_keyspace("app"),
    );
    ctx.register(events_descriptor()).unwrap();
    ctx.register(hits_descriptor()).unwrap();

    ctx.create_all_if_not_exist().unwrap();
    // The second pass sees AlreadyExists for every table and swallows it.
    ctx.create_all_if_not_exist().unwrap();
    assert_eq!(ctx.executor().provisioned.borrow().len(), 2);
}

#[test]
fn default_consistency_comes_from_config() {
    let mut ctx = Context::new(
        RecordingExecutor::new(true),
        UowConfig::default()
            .with_default_keyspace("app")
            .with_default_consistency(ConsistencyLevel::EachQuorum),
    );
    let events = ctx.register(events_descriptor()).unwrap();
    ctx.add_new(
        &events,
        Row::from_values(vec![Value::BigInt(1), Value::Text("a".into())]),
        TrackingMode::DetachAfterSave,
    )
    .unwrap();
    ctx.save_changes(SaveMode::Batch, TableType::All).unwrap();
    assert_eq!(
        ctx.executor().executed()[0].consistency,
        ConsistencyLevel::EachQuorum
    );
}
