use crate::error::ClientError;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::hash::{Hash, Hasher};

pub const MAX_NAMESPACE_LEN: usize = 31;
pub const MAX_SET_LEN: usize = 63;
pub const PARTITION_COUNT: u16 = 4096;
pub const DIGEST_LEN: usize = 20;

/// User-supplied part of a key. Equality is by type and value, so
/// `Integer(1)` and `Float(1.0)` address different records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserKey {
    Integer(i64),
    Float(f64),
    Text(CompactString),
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
}

impl UserKey {
    fn type_tag(&self) -> u8 {
        match self {
            UserKey::Integer(_) => 1,
            UserKey::Float(_) => 2,
            UserKey::Text(_) => 3,
            UserKey::Bytes(_) => 4,
        }
    }

    fn digest_bytes(&self) -> Vec<u8> {
        match self {
            UserKey::Integer(v) => v.to_be_bytes().to_vec(),
            UserKey::Float(v) => v.to_bits().to_be_bytes().to_vec(),
            UserKey::Text(s) => s.as_bytes().to_vec(),
            UserKey::Bytes(b) => b.clone(),
        }
    }
}

impl PartialEq for UserKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (UserKey::Integer(a), UserKey::Integer(b)) => a == b,
            (UserKey::Float(a), UserKey::Float(b)) => a.to_bits() == b.to_bits(),
            (UserKey::Text(a), UserKey::Text(b)) => a == b,
            (UserKey::Bytes(a), UserKey::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for UserKey {}

impl Hash for UserKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_tag().hash(state);
        match self {
            UserKey::Integer(v) => v.hash(state),
            UserKey::Float(v) => v.to_bits().hash(state),
            UserKey::Text(s) => s.hash(state),
            UserKey::Bytes(b) => b.hash(state),
        }
    }
}

impl std::fmt::Display for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserKey::Integer(v) => write!(f, "{v}"),
            UserKey::Float(v) => write!(f, "{v:?}"),
            UserKey::Text(s) => write!(f, "\"{s}\""),
            UserKey::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

impl From<i64> for UserKey {
    fn from(value: i64) -> Self {
        UserKey::Integer(value)
    }
}

impl From<i32> for UserKey {
    fn from(value: i32) -> Self {
        UserKey::Integer(value as i64)
    }
}

impl From<f64> for UserKey {
    fn from(value: f64) -> Self {
        UserKey::Float(value)
    }
}

impl From<&str> for UserKey {
    fn from(value: &str) -> Self {
        UserKey::Text(value.into())
    }
}

impl From<String> for UserKey {
    fn from(value: String) -> Self {
        UserKey::Text(value.into())
    }
}

impl From<Vec<u8>> for UserKey {
    fn from(value: Vec<u8>) -> Self {
        UserKey::Bytes(value)
    }
}

/// Record address: namespace, set and user key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub namespace: String,
    pub set: String,
    pub user_key: UserKey,
}

impl Key {
    pub fn new(
        namespace: impl Into<String>,
        set: impl Into<String>,
        user_key: impl Into<UserKey>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            set: set.into(),
            user_key: user_key.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        validate_namespace_and_set(&self.namespace, &self.set)
    }

    /// 20-byte digest over set, key type and key bytes. The namespace is not
    /// part of the digest; it selects the storage container instead.
    pub fn digest(&self) -> [u8; DIGEST_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(self.set.as_bytes());
        hasher.update([self.user_key.type_tag()]);
        hasher.update(self.user_key.digest_bytes());
        let full = hasher.finalize();
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&full[..DIGEST_LEN]);
        out
    }

    pub fn partition_id(&self) -> u16 {
        let digest = self.digest();
        u16::from_le_bytes([digest[0], digest[1]]) % PARTITION_COUNT
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.set, self.user_key)
    }
}

pub(crate) fn validate_namespace_and_set(namespace: &str, set: &str) -> Result<(), ClientError> {
    if namespace.is_empty() {
        return Err(ClientError::InvalidArgument(
            "namespace must not be empty".into(),
        ));
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(ClientError::InvalidArgument(format!(
            "namespace '{namespace}' exceeds {MAX_NAMESPACE_LEN} bytes"
        )));
    }
    if set.len() > MAX_SET_LEN {
        return Err(ClientError::InvalidArgument(format!(
            "set '{set}' exceeds {MAX_SET_LEN} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Key, PARTITION_COUNT, UserKey};
    use std::collections::HashSet;

    #[test]
    fn keys_compare_by_type_and_value() {
        assert_eq!(Key::new("test", "demo", 1), Key::new("test", "demo", 1_i64));
        assert_ne!(Key::new("test", "demo", 1), Key::new("test", "demo", 1.0));
        assert_ne!(Key::new("test", "demo", 1), Key::new("test", "demo", "1"));
        assert_ne!(Key::new("test", "a", 1), Key::new("test", "b", 1));

        let set: HashSet<Key> = [
            Key::new("test", "demo", 1),
            Key::new("test", "demo", 1),
            Key::new("test", "demo", 2.5),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn digest_is_stable_and_partition_in_range() {
        let key = Key::new("test", "demo", "hello");
        assert_eq!(key.digest(), Key::new("other", "demo", "hello").digest());
        assert_ne!(key.digest(), Key::new("test", "demo", b"hello".to_vec()).digest());
        assert!(key.partition_id() < PARTITION_COUNT);
    }

    #[test]
    fn validation_rejects_empty_namespace() {
        assert!(Key::new("", "demo", 1).validate().is_err());
        assert!(Key::new("test", "", 1).validate().is_ok());
        assert!(Key::new("n".repeat(32), "demo", 1).validate().is_err());
    }

    #[test]
    fn display_marks_key_types() {
        assert_eq!(Key::new("test", "demo", 7).to_string(), "test:demo:7");
        assert_eq!(Key::new("test", "demo", "a").to_string(), "test:demo:\"a\"");
        assert_eq!(UserKey::Bytes(vec![0xab]).to_string(), "0xab");
    }
}
