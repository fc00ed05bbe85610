pub mod key;
pub mod value;

pub use key::{Key, UserKey};
pub use value::BinValue;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Bins = BTreeMap<String, BinValue>;

/// A record as returned to callers. An empty `bins` map with a present key
/// means "exists, no data returned".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: Key,
    pub generation: u32,
    pub expiration: u32,
    pub bins: Bins,
}

impl Record {
    pub fn new(key: Key, generation: u32, expiration: u32, bins: Bins) -> Self {
        Self {
            key,
            generation,
            expiration,
            bins,
        }
    }

    pub fn header_only(key: Key, generation: u32, expiration: u32) -> Self {
        Self::new(key, generation, expiration, Bins::new())
    }

    pub fn bin(&self, name: &str) -> Option<&BinValue> {
        self.bins.get(name)
    }

    pub fn is_header_only(&self) -> bool {
        self.bins.is_empty()
    }
}

/// Builds a bin map from `(name, value)` pairs.
pub fn bins<I, N, V>(pairs: I) -> Bins
where
    I: IntoIterator<Item = (N, V)>,
    N: Into<String>,
    V: Into<BinValue>,
{
    pairs
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .collect()
}
