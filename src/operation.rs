use crate::error::ClientError;
use crate::record::BinValue;
use serde::{Deserialize, Serialize};

pub const MAX_BIN_NAME_LEN: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Read,
    Write,
    Append,
    Prepend,
    Increment,
    Touch,
}

impl OperationKind {
    /// Write-class operations implicitly create a missing record.
    pub fn is_write_class(self) -> bool {
        matches!(
            self,
            OperationKind::Write
                | OperationKind::Append
                | OperationKind::Prepend
                | OperationKind::Increment
        )
    }

    pub fn is_read(self) -> bool {
        matches!(self, OperationKind::Read)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
            OperationKind::Append => "append",
            OperationKind::Prepend => "prepend",
            OperationKind::Increment => "increment",
            OperationKind::Touch => "touch",
        }
    }
}

/// One atomic action applied to one bin inside an operate call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub bin_name: Option<String>,
    pub value: Option<BinValue>,
}

impl Operation {
    pub fn read(bin: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Read,
            bin_name: Some(bin.into()),
            value: None,
        }
    }

    pub fn write(bin: impl Into<String>, value: impl Into<BinValue>) -> Self {
        Self::with_value(OperationKind::Write, bin, value)
    }

    pub fn append(bin: impl Into<String>, value: impl Into<BinValue>) -> Self {
        Self::with_value(OperationKind::Append, bin, value)
    }

    pub fn prepend(bin: impl Into<String>, value: impl Into<BinValue>) -> Self {
        Self::with_value(OperationKind::Prepend, bin, value)
    }

    pub fn increment(bin: impl Into<String>, value: impl Into<BinValue>) -> Self {
        Self::with_value(OperationKind::Increment, bin, value)
    }

    pub fn touch() -> Self {
        Self {
            kind: OperationKind::Touch,
            bin_name: None,
            value: None,
        }
    }

    fn with_value(kind: OperationKind, bin: impl Into<String>, value: impl Into<BinValue>) -> Self {
        Self {
            kind,
            bin_name: Some(bin.into()),
            value: Some(value.into()),
        }
    }

    /// Checks the request shape only; server-side semantics (missing record,
    /// non-numeric target bin, overflow) are reported by the cluster.
    pub fn validate(&self, position: usize) -> Result<(), ClientError> {
        if self.kind == OperationKind::Touch {
            if self.bin_name.is_some() || self.value.is_some() {
                return Err(ClientError::InvalidArgument(format!(
                    "operation {position}: touch takes no bin or value"
                )));
            }
            return Ok(());
        }

        let bin = self.bin_name.as_deref().ok_or_else(|| {
            ClientError::InvalidArgument(format!(
                "operation {position}: {} requires a bin name",
                self.kind.as_str()
            ))
        })?;
        validate_bin_name(bin)?;

        match (self.kind, &self.value) {
            (OperationKind::Read, None) => Ok(()),
            (OperationKind::Read, Some(_)) => Err(ClientError::InvalidArgument(format!(
                "operation {position}: read on '{bin}' must not carry a value"
            ))),
            (_, None) => Err(ClientError::InvalidArgument(format!(
                "operation {position}: {} on '{bin}' requires a value",
                self.kind.as_str()
            ))),
            (OperationKind::Increment, Some(v)) if !v.is_numeric() => {
                Err(ClientError::InvalidArgument(format!(
                    "operation {position}: increment on '{bin}' requires a numeric value, got {}",
                    v.type_name()
                )))
            }
            (OperationKind::Append | OperationKind::Prepend, Some(v))
                if !matches!(v, BinValue::Text(_) | BinValue::Bytes(_)) =>
            {
                Err(ClientError::InvalidArgument(format!(
                    "operation {position}: {} on '{bin}' requires a string or bytes value, got {}",
                    self.kind.as_str(),
                    v.type_name()
                )))
            }
            _ => Ok(()),
        }
    }
}

pub fn validate_bin_name(bin: &str) -> Result<(), ClientError> {
    if bin.is_empty() {
        return Err(ClientError::InvalidArgument(
            "bin name must not be empty".into(),
        ));
    }
    if bin.len() > MAX_BIN_NAME_LEN {
        return Err(ClientError::InvalidArgument(format!(
            "bin name '{bin}' exceeds {MAX_BIN_NAME_LEN} bytes"
        )));
    }
    Ok(())
}

/// Validates a whole operate request: non-empty, every entry well formed.
pub fn validate_operations(operations: &[Operation]) -> Result<(), ClientError> {
    if operations.is_empty() {
        return Err(ClientError::InvalidArgument(
            "operate requires at least one operation".into(),
        ));
    }
    for (position, op) in operations.iter().enumerate() {
        op.validate(position)?;
    }
    Ok(())
}
