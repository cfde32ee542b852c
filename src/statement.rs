use crate::error::UowError;
use crate::types::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConsistencyLevel {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalOne,
    LocalQuorum,
    EachQuorum,
}

impl std::fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConsistencyLevel::Any => "ANY",
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Two => "TWO",
            ConsistencyLevel::Three => "THREE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::All => "ALL",
            ConsistencyLevel::LocalOne => "LOCAL_ONE",
            ConsistencyLevel::LocalQuorum => "LOCAL_QUORUM",
            ConsistencyLevel::EachQuorum => "EACH_QUORUM",
        };
        write!(f, "{name}")
    }
}

/// Handle to a statement prepared by the execution layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PreparedId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreparedStatement {
    pub id: PreparedId,
    pub cql: String,
}

/// One write statement: either raw CQL with positional values, or a bound
/// form referencing a previously prepared statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Statement {
    Simple { cql: String, values: Vec<Value> },
    Bound { prepared: PreparedId, values: Vec<Value> },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BatchKind {
    Logged,
    Counter,
}

/// Structured batch payload: one parameterized sub-statement per mutation,
/// tagged so counter and non-counter writes never mix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Batch {
    pub kind: BatchKind,
    pub statements: Vec<Statement>,
}

/// What actually crosses the execution boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionPayload {
    Statement(Statement),
    Batch(Batch),
    /// Legacy literal script (`BEGIN [COUNTER] BATCH .. APPLY BATCH`).
    Script(String),
}

/// Trace handle returned by the execution layer for a traced write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryTrace {
    pub trace_id: Uuid,
    pub coordinator: Option<String>,
    pub duration_micros: Option<u64>,
}

/// Substitutes each `?` placeholder with the literal form of the matching
/// value. Quote-aware: `?` inside a double-quoted identifier or a
/// single-quoted string literal is left alone. User-supplied command text
/// may carry string literals, so both quote forms are tracked; doubled
/// quotes act as escapes in either.
pub(crate) fn inline_literals(cql: &str, values: &[Value]) -> Result<String, UowError> {
    enum Quote {
        None,
        Identifier,
        Literal,
    }
    let mut out = String::with_capacity(cql.len() + values.len() * 8);
    let mut next = values.iter();
    let mut quote = Quote::None;
    for ch in cql.chars() {
        match quote {
            Quote::None => match ch {
                '"' => {
                    quote = Quote::Identifier;
                    out.push(ch);
                }
                '\'' => {
                    quote = Quote::Literal;
                    out.push(ch);
                }
                '?' => {
                    let value = next.next().ok_or_else(|| {
                        UowError::ContractViolation(format!(
                            "statement '{cql}' has more placeholders than values"
                        ))
                    })?;
                    out.push_str(&value.cql_literal());
                }
                _ => out.push(ch),
            },
            Quote::Identifier => {
                if ch == '"' {
                    quote = Quote::None;
                }
                out.push(ch);
            }
            Quote::Literal => {
                if ch == '\'' {
                    quote = Quote::None;
                }
                out.push(ch);
            }
        }
    }
    if next.next().is_some() {
        return Err(UowError::ContractViolation(format!(
            "statement '{cql}' has fewer placeholders than values"
        )));
    }
    Ok(out)
}

/// Accumulates the mutations of one save class into a payload, in one of the
/// two supported encodings. The variant is picked once per save from the
/// execution layer's capability probe (plus the config override) and never
/// changes mid-assembly.
#[derive(Debug)]
pub enum BatchBuilder {
    Script { kind: BatchKind, lines: Vec<String> },
    Structured(Batch),
}

impl BatchBuilder {
    pub fn new(kind: BatchKind, structured: bool) -> Self {
        if structured {
            BatchBuilder::Structured(Batch {
                kind,
                statements: Vec::new(),
            })
        } else {
            BatchBuilder::Script {
                kind,
                lines: Vec::new(),
            }
        }
    }

    pub fn push(&mut self, cql: &str, values: Vec<Value>) -> Result<(), UowError> {
        match self {
            BatchBuilder::Script { lines, .. } => {
                lines.push(inline_literals(cql, &values)?);
            }
            BatchBuilder::Structured(batch) => {
                batch.statements.push(Statement::Simple {
                    cql: cql.to_string(),
                    values,
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        match self {
            BatchBuilder::Script { lines, .. } => lines.len(),
            BatchBuilder::Structured(batch) => batch.statements.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finalizes the payload; `None` when nothing was appended, so empty
    /// classes never produce a request.
    pub fn into_payload(self) -> Option<ExecutionPayload> {
        if self.is_empty() {
            return None;
        }
        match self {
            BatchBuilder::Script { kind, lines } => {
                let header = match kind {
                    BatchKind::Logged => "BEGIN BATCH",
                    BatchKind::Counter => "BEGIN COUNTER BATCH",
                };
                let mut script = String::from(header);
                for line in &lines {
                    script.push('\n');
                    script.push_str(line);
                }
                script.push_str("\nAPPLY BATCH");
                Some(ExecutionPayload::Script(script))
            }
            BatchBuilder::Structured(batch) => Some(ExecutionPayload::Batch(batch)),
        }
    }
}
