use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Typed value stored under a named bin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BinValue {
    Nil,
    Integer(i64),
    Float(f64),
    Text(CompactString),
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    List(Vec<BinValue>),
    Map(BTreeMap<String, BinValue>),
}

impl BinValue {
    fn kind_rank(&self) -> u8 {
        match self {
            BinValue::Nil => 0,
            BinValue::Integer(_) => 1,
            BinValue::Float(_) => 2,
            BinValue::Text(_) => 3,
            BinValue::Bytes(_) => 4,
            BinValue::List(_) => 5,
            BinValue::Map(_) => 6,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            BinValue::Nil => "nil",
            BinValue::Integer(_) => "integer",
            BinValue::Float(_) => "float",
            BinValue::Text(_) => "string",
            BinValue::Bytes(_) => "bytes",
            BinValue::List(_) => "list",
            BinValue::Map(_) => "map",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, BinValue::Nil)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, BinValue::Integer(_) | BinValue::Float(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BinValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BinValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BinValue::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }
}

impl PartialEq for BinValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BinValue {}

impl PartialOrd for BinValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BinValue {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank_cmp = self.kind_rank().cmp(&other.kind_rank());
        if rank_cmp != Ordering::Equal {
            return rank_cmp;
        }

        match (self, other) {
            (BinValue::Nil, BinValue::Nil) => Ordering::Equal,
            (BinValue::Integer(a), BinValue::Integer(b)) => a.cmp(b),
            (BinValue::Float(a), BinValue::Float(b)) => a.total_cmp(b),
            (BinValue::Text(a), BinValue::Text(b)) => a.cmp(b),
            (BinValue::Bytes(a), BinValue::Bytes(b)) => a.cmp(b),
            (BinValue::List(a), BinValue::List(b)) => a.cmp(b),
            (BinValue::Map(a), BinValue::Map(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl From<i64> for BinValue {
    fn from(value: i64) -> Self {
        BinValue::Integer(value)
    }
}

impl From<i32> for BinValue {
    fn from(value: i32) -> Self {
        BinValue::Integer(value as i64)
    }
}

impl From<u32> for BinValue {
    fn from(value: u32) -> Self {
        BinValue::Integer(value as i64)
    }
}

impl From<f64> for BinValue {
    fn from(value: f64) -> Self {
        BinValue::Float(value)
    }
}

impl From<&str> for BinValue {
    fn from(value: &str) -> Self {
        BinValue::Text(value.into())
    }
}

impl From<String> for BinValue {
    fn from(value: String) -> Self {
        BinValue::Text(value.into())
    }
}

impl From<Vec<u8>> for BinValue {
    fn from(value: Vec<u8>) -> Self {
        BinValue::Bytes(value)
    }
}

impl From<Vec<BinValue>> for BinValue {
    fn from(value: Vec<BinValue>) -> Self {
        BinValue::List(value)
    }
}

impl From<BTreeMap<String, BinValue>> for BinValue {
    fn from(value: BTreeMap<String, BinValue>) -> Self {
        BinValue::Map(value)
    }
}
