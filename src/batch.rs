use crate::commands::{AdditionalCommand, CommandQueue};
use crate::error::UowError;
use crate::executor::ExecutionHandle;
use crate::registry::{TableIdentity, TableRegistry, TableType};
use crate::statement::{BatchBuilder, BatchKind, ExecutionPayload};
use crate::tracker::MutationTracker;
use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Continuation state carried from the begin half of an async save to its
/// end half: the classification snapshot taken at assembly time, the class
/// the request covers, the row keys each table contributed to the payload,
/// and the commands that did not match it. Tracker and queue state is only
/// touched once the write is confirmed, using exactly this record, so rows
/// tracked after assembly stay pending for the next save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveTag {
    pub table_classification: HashMap<TableIdentity, TableType>,
    pub class_saved: TableType,
    pub contributed_rows: HashMap<TableIdentity, Vec<Vec<Value>>>,
    pub leftover_commands: Vec<AdditionalCommand>,
}

/// Handle for one in-flight batch save. Only the context that issued it can
/// end it; the stamp makes a foreign handle detectable.
#[derive(Debug)]
pub struct PendingSave {
    pub(crate) context_id: u64,
    pub(crate) handle: ExecutionHandle,
    pub(crate) tag: SaveTag,
}

pub(crate) struct AssembledSave {
    pub(crate) payload: ExecutionPayload,
    pub(crate) tracing: bool,
    pub(crate) tag: SaveTag,
}

/// Builds the batch payload for one write class: every matching tracker
/// appends its pending mutations, then matching additional commands follow
/// in queue order. Returns `None` when the class has nothing to write, so no
/// empty request is ever dispatched; neither trackers nor the queue are
/// mutated here.
pub(crate) fn assemble(
    registry: &TableRegistry,
    queue: &CommandQueue,
    class: TableType,
    structured: bool,
) -> Result<Option<AssembledSave>, UowError> {
    debug_assert!(class.is_single_class());
    let kind = match class {
        TableType::Counter => BatchKind::Counter,
        _ => BatchKind::Logged,
    };
    let mut builder = BatchBuilder::new(kind, structured);
    let mut tracing = false;
    let mut contributed_rows: HashMap<TableIdentity, Vec<Vec<Value>>> = HashMap::new();

    for (identity, entry) in registry.iter() {
        if entry.table_type == class {
            let tracker: &dyn MutationTracker = &entry.tracker;
            tracing |= tracker.append_pending(&mut builder)?;
            let keys = tracker.pending_keys();
            if !keys.is_empty() {
                contributed_rows.insert(identity.clone(), keys);
            }
        }
    }

    let (included, leftover) = queue.partition(class, |id| registry.class_of(id))?;
    for command in included {
        builder.push(&command.cql, command.values)?;
        tracing |= command.tracing;
    }

    let statements = builder.len();
    let payload = match builder.into_payload() {
        Some(payload) => payload,
        None => return Ok(None),
    };
    debug!(class = ?class, statements, structured, "assembled batch payload");

    Ok(Some(AssembledSave {
        payload,
        tracing,
        tag: SaveTag {
            table_classification: registry.classification_map(),
            class_saved: class,
            contributed_rows,
            leftover_commands: leftover,
        },
    }))
}
