use crate::ClusterClient;
use crate::error::ClientError;
use crate::index::IndexType;
use crate::job::JobKind;
use crate::operation::validate_bin_name;
use crate::policy::{QueryPolicy, ScanPriority, validate_scan_percent};
use crate::query::executor::{self, Execution};
use crate::record::BinValue;
use crate::record::key::validate_namespace_and_set;
use crate::udf::validate_module_name;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadKind {
    Scan,
    Query,
}

/// Value side of an indexed equality filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterValue {
    Integer(i64),
    Text(CompactString),
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Integer(value as i64)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.into())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value.into())
    }
}

/// Filter over one indexed bin. Ranges are numeric and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    Equal { bin: String, value: FilterValue },
    Range { bin: String, low: i64, high: i64 },
}

impl Filter {
    pub fn bin(&self) -> &str {
        match self {
            Filter::Equal { bin, .. } | Filter::Range { bin, .. } => bin,
        }
    }

    /// Index type a secondary index must have to serve this filter.
    pub fn index_type(&self) -> IndexType {
        match self {
            Filter::Equal {
                value: FilterValue::Text(_),
                ..
            } => IndexType::String,
            Filter::Equal {
                value: FilterValue::Integer(_),
                ..
            }
            | Filter::Range { .. } => IndexType::Numeric,
        }
    }

    pub fn matches(&self, value: &BinValue) -> bool {
        match (self, value) {
            (
                Filter::Equal {
                    value: FilterValue::Integer(expected),
                    ..
                },
                BinValue::Integer(actual),
            ) => expected == actual,
            (
                Filter::Equal {
                    value: FilterValue::Text(expected),
                    ..
                },
                BinValue::Text(actual),
            ) => expected == actual,
            (Filter::Range { low, high, .. }, BinValue::Integer(actual)) => {
                (*low..=*high).contains(actual)
            }
            _ => false,
        }
    }

    fn validate(&self) -> Result<(), ClientError> {
        validate_bin_name(self.bin())?;
        if let Filter::Range { bin, low, high } = self
            && low > high
        {
            return Err(ClientError::InvalidArgument(format!(
                "range filter on '{bin}' has low {low} > high {high}"
            )));
        }
        Ok(())
    }
}

pub struct BinRef(String);

pub fn bin(name: &str) -> BinRef {
    BinRef(name.to_string())
}

impl BinRef {
    pub fn equal(self, value: impl Into<FilterValue>) -> Filter {
        Filter::Equal {
            bin: self.0,
            value: value.into(),
        }
    }

    pub fn range(self, low: i64, high: i64) -> Filter {
        Filter::Range {
            bin: self.0,
            low,
            high,
        }
    }
}

/// Server-side function attached to a scan or query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdfCall {
    pub module: String,
    pub function: String,
    pub args: Vec<BinValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Share of each partition to sample, 1..=100.
    pub percent: u8,
    pub priority: ScanPriority,
    pub concurrent: bool,
    /// Return keys and metadata only.
    pub no_bins: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            percent: 100,
            priority: ScanPriority::Auto,
            concurrent: false,
            no_bins: false,
        }
    }
}

/// Fully built read request, independent of the order the builder calls
/// were made in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadSpec {
    pub kind: ReadKind,
    pub namespace: String,
    pub set: String,
    /// `None` selects every bin.
    pub projection: Option<BTreeSet<String>>,
    pub filter: Option<Filter>,
    pub order_by: Vec<(String, Order)>,
    pub udf: Option<UdfCall>,
    pub background: bool,
    pub scan: ScanOptions,
}

impl ReadSpec {
    fn new(kind: ReadKind, namespace: &str, set: &str) -> Self {
        Self {
            kind,
            namespace: namespace.to_string(),
            set: set.to_string(),
            projection: None,
            filter: None,
            order_by: Vec::new(),
            udf: None,
            background: false,
            scan: ScanOptions::default(),
        }
    }

    pub fn scan(namespace: &str, set: &str) -> Self {
        Self::new(ReadKind::Scan, namespace, set)
    }

    pub fn query(namespace: &str, set: &str) -> Self {
        Self::new(ReadKind::Query, namespace, set)
    }

    pub fn job_kind(&self) -> JobKind {
        match self.kind {
            ReadKind::Scan => JobKind::Scan,
            ReadKind::Query => JobKind::Query,
        }
    }

    pub fn is_projected(&self, bin: &str) -> bool {
        self.projection
            .as_ref()
            .is_none_or(|projection| projection.contains(bin))
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        validate_namespace_and_set(&self.namespace, &self.set)?;
        if let Some(projection) = &self.projection {
            for bin in projection {
                validate_bin_name(bin)?;
            }
        }
        if let Some(filter) = &self.filter {
            if self.kind == ReadKind::Scan {
                return Err(ClientError::InvalidArgument(
                    "scans do not accept a filter".into(),
                ));
            }
            filter.validate()?;
        }
        for (bin, _) in &self.order_by {
            validate_bin_name(bin)?;
        }
        if let Some(udf) = &self.udf {
            validate_module_name(&udf.module)?;
            if udf.function.is_empty() {
                return Err(ClientError::InvalidArgument(
                    "udf function name must not be empty".into(),
                ));
            }
        }
        if self.background && self.udf.is_none() {
            return Err(ClientError::InvalidArgument(
                "background execution requires an applied udf".into(),
            ));
        }
        validate_scan_percent(self.scan.percent)?;
        Ok(())
    }

    fn select(&mut self, bins: &[&str]) {
        if bins.is_empty() {
            return;
        }
        self.projection
            .get_or_insert_with(BTreeSet::new)
            .extend(bins.iter().map(|b| b.to_string()));
    }

    fn apply(&mut self, module: &str, function: &str, args: Vec<BinValue>) {
        self.udf = Some(UdfCall {
            module: module.to_string(),
            function: function.to_string(),
            args,
        });
    }
}

/// Secondary-index query builder. Nothing reaches the cluster until `exec`.
#[derive(Clone)]
pub struct Query<'c> {
    client: &'c ClusterClient,
    spec: ReadSpec,
}

impl<'c> Query<'c> {
    pub(crate) fn new(client: &'c ClusterClient, namespace: &str, set: &str) -> Self {
        Self {
            client,
            spec: ReadSpec::query(namespace, set),
        }
    }

    /// Adds bins to the projection. Repeated calls accumulate.
    pub fn select(mut self, bins: &[&str]) -> Self {
        self.spec.select(bins);
        self
    }

    pub fn where_(mut self, filter: Filter) -> Self {
        self.spec.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, bin: &str, order: Order) -> Self {
        self.spec.order_by.push((bin.to_string(), order));
        self
    }

    pub fn apply(mut self, module: &str, function: &str, args: Vec<BinValue>) -> Self {
        self.spec.apply(module, function, args);
        self
    }

    pub fn set_background(mut self, background: bool) -> Self {
        self.spec.background = background;
        self
    }

    pub fn spec(&self) -> &ReadSpec {
        &self.spec
    }

    pub fn into_spec(self) -> ReadSpec {
        self.spec
    }

    pub async fn exec(self) -> Result<Execution, ClientError> {
        let policy = self.client.policies().query.clone();
        self.exec_with_policy(policy).await
    }

    pub async fn exec_with_policy(self, policy: QueryPolicy) -> Result<Execution, ClientError> {
        executor::execute(self.client, self.spec, policy).await
    }
}

/// Full-set scan builder.
#[derive(Clone)]
pub struct Scan<'c> {
    client: &'c ClusterClient,
    spec: ReadSpec,
}

impl<'c> Scan<'c> {
    pub(crate) fn new(client: &'c ClusterClient, namespace: &str, set: &str) -> Self {
        Self {
            client,
            spec: ReadSpec::scan(namespace, set),
        }
    }

    pub fn select(mut self, bins: &[&str]) -> Self {
        self.spec.select(bins);
        self
    }

    pub fn apply(mut self, module: &str, function: &str, args: Vec<BinValue>) -> Self {
        self.spec.apply(module, function, args);
        self
    }

    pub fn set_background(mut self, background: bool) -> Self {
        self.spec.background = background;
        self
    }

    pub fn percent(mut self, percent: u8) -> Self {
        self.spec.scan.percent = percent;
        self
    }

    pub fn priority(mut self, priority: ScanPriority) -> Self {
        self.spec.scan.priority = priority;
        self
    }

    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.spec.scan.concurrent = concurrent;
        self
    }

    pub fn no_bins(mut self, no_bins: bool) -> Self {
        self.spec.scan.no_bins = no_bins;
        self
    }

    pub fn spec(&self) -> &ReadSpec {
        &self.spec
    }

    pub fn into_spec(self) -> ReadSpec {
        self.spec
    }

    pub async fn exec(self) -> Result<Execution, ClientError> {
        let policy = self.client.policies().query.clone();
        self.exec_with_policy(policy).await
    }

    pub async fn exec_with_policy(self, policy: QueryPolicy) -> Result<Execution, ClientError> {
        executor::execute(self.client, self.spec, policy).await
    }
}
