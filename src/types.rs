use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// A CQL column value as tracked on the client side.
///
/// `Timestamp` carries milliseconds since the epoch, matching the wire
/// convention of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Text(CompactString),
    BigInt(i64),
    Int(i32),
    Double(f64),
    Boolean(bool),
    Uuid(Uuid),
    Timestamp(i64),
    Blob(Vec<u8>),
    Null,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn from_values(values: Vec<Value>) -> Self {
        Self { values }
    }
}

impl Value {
    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int(_) => 2,
            Value::BigInt(_) => 3,
            Value::Timestamp(_) => 4,
            Value::Double(_) => 5,
            Value::Uuid(_) => 6,
            Value::Text(_) => 7,
            Value::Blob(_) => 8,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Value::Text(_) => "Text",
            Value::BigInt(_) => "BigInt",
            Value::Int(_) => "Int",
            Value::Double(_) => "Double",
            Value::Boolean(_) => "Boolean",
            Value::Uuid(_) => "Uuid",
            Value::Timestamp(_) => "Timestamp",
            Value::Blob(_) => "Blob",
            Value::Null => "Null",
        }
    }

    /// Renders the value as a CQL literal for the legacy batch script,
    /// which inlines values instead of binding parameters.
    pub fn cql_literal(&self) -> String {
        match self {
            Value::Text(v) => {
                let mut out = String::with_capacity(v.len() + 2);
                out.push('\'');
                for ch in v.chars() {
                    if ch == '\'' {
                        out.push('\'');
                    }
                    out.push(ch);
                }
                out.push('\'');
                out
            }
            Value::BigInt(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Double(v) => {
                if v.is_finite() {
                    v.to_string()
                } else {
                    // The store rejects non-finite doubles; NULL keeps the
                    // script parseable instead of emitting `NaN`.
                    "NULL".to_string()
                }
            }
            Value::Boolean(v) => {
                if *v {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            Value::Uuid(v) => v.hyphenated().to_string(),
            Value::Timestamp(v) => v.to_string(),
            Value::Blob(v) => {
                let mut out = String::with_capacity(2 + v.len() * 2);
                out.push_str("0x");
                for b in v {
                    out.push_str(&format!("{b:02x}"));
                }
                out
            }
            Value::Null => "NULL".to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank_cmp = self.kind_rank().cmp(&other.kind_rank());
        if rank_cmp != Ordering::Equal {
            return rank_cmp;
        }

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::BigInt(a), Value::BigInt(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::Uuid(a), Value::Uuid(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}
