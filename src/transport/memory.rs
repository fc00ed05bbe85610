//! In-process cluster used by tests, benches and embedders.
//!
//! Records are routed to nodes by partition id. Nodes can be taken offline,
//! module uploads propagate to nodes one after another, and background jobs
//! advance one step per poll so callers can observe every state.

use crate::config::Host;
use crate::error::{ClientError, ServerErrorKind};
use crate::index::IndexDefinition;
use crate::job::{JobId, JobKind, JobStatus};
use crate::operation::{Operation, OperationKind};
use crate::policy::{ExistsAction, GenerationPolicy, InfoPolicy, QueryPolicy, WritePolicy};
use crate::query::plan::{Order, ReadKind, ReadSpec};
use crate::record::key::PARTITION_COUNT;
use crate::record::{BinValue, Bins, Key, Record};
use crate::transport::{
    BatchReadMode, BatchRequest, ModuleListing, OperateRequest, RawBatchEntry, RawJobInfo,
    RawRecord, RawRow, RawScanResponse, ReadRequest, Transport, WriteRequest,
};
use crate::udf::{UdfLanguage, content_hash};
use async_trait::async_trait;
use compact_str::CompactString;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::debug;

/// Record UDF: rewrites the bins of one record in place.
pub type TransformFn = Arc<dyn Fn(&mut Bins, &[BinValue]) + Send + Sync>;
/// Stream UDF: reduces the matched records to one value.
pub type AggregateFn = Arc<dyn Fn(&[Record], &[BinValue]) -> BinValue + Send + Sync>;

/// Body of a registered server-side function.
#[derive(Clone)]
pub enum UdfFunction {
    Transform(TransformFn),
    Aggregate(AggregateFn),
}

impl UdfFunction {
    pub fn transform<F>(f: F) -> Self
    where
        F: Fn(&mut Bins, &[BinValue]) + Send + Sync + 'static,
    {
        UdfFunction::Transform(Arc::new(f))
    }

    pub fn aggregate<F>(f: F) -> Self
    where
        F: Fn(&[Record], &[BinValue]) -> BinValue + Send + Sync + 'static,
    {
        UdfFunction::Aggregate(Arc::new(f))
    }
}

impl std::fmt::Debug for UdfFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UdfFunction::Transform(_) => f.write_str("UdfFunction::Transform"),
            UdfFunction::Aggregate(_) => f.write_str("UdfFunction::Aggregate"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryClusterConfig {
    pub nodes: usize,
    /// Node `i` loads a module `module_propagation * (i + 1)` after upload.
    pub module_propagation: Duration,
    /// Polls answered with `JobNotFound` before a new job becomes visible.
    pub job_visibility_polls: u32,
    /// Progress added per poll while a job runs.
    pub job_progress_step: u8,
    /// Finished jobs kept for polling; older ones are forgotten and answer
    /// `JobNotFound`.
    pub finished_job_retention: usize,
}

impl Default for MemoryClusterConfig {
    fn default() -> Self {
        Self {
            nodes: 3,
            module_propagation: Duration::from_millis(20),
            job_visibility_polls: 1,
            job_progress_step: 50,
            finished_job_retention: 256,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredRecord {
    generation: u32,
    expiration: u32,
    /// TTL of the last write that set one; re-applied by later writes and
    /// touches that carry none.
    ttl_secs: Option<u32>,
    bins: Bins,
}

#[derive(Debug, Clone)]
struct StoredModule {
    content_hash: String,
    language: UdfLanguage,
    uploaded_at: Instant,
}

struct StoredJob {
    kind: JobKind,
    keys: Vec<Key>,
    transform: TransformFn,
    args: Vec<BinValue>,
    polls: u32,
    status: JobStatus,
    progress: u8,
    /// Set by `set_job_status`; a pinned job stops advancing.
    pinned: bool,
}

#[derive(Debug, Clone, Copy)]
struct NodeState {
    online: bool,
    stalled: bool,
}

struct ClusterState {
    connected: bool,
    nodes: Vec<NodeState>,
    records: HashMap<Key, StoredRecord>,
    indexes: HashMap<(String, String), IndexDefinition>,
    modules: BTreeMap<String, StoredModule>,
    functions: HashMap<(String, String), UdfFunction>,
    jobs: HashMap<JobId, StoredJob>,
    finished_jobs: VecDeque<JobId>,
}

pub struct MemoryCluster {
    config: MemoryClusterConfig,
    state: Mutex<ClusterState>,
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new(MemoryClusterConfig::default())
    }
}

impl MemoryCluster {
    pub fn new(config: MemoryClusterConfig) -> Self {
        let nodes = vec![
            NodeState {
                online: true,
                stalled: false,
            };
            config.nodes.max(1)
        ];
        Self {
            config,
            state: Mutex::new(ClusterState {
                connected: false,
                nodes,
                records: HashMap::new(),
                indexes: HashMap::new(),
                modules: BTreeMap::new(),
                functions: HashMap::new(),
                jobs: HashMap::new(),
                finished_jobs: VecDeque::new(),
            }),
        }
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Node owning the partition of `key`.
    pub fn node_for(&self, key: &Key) -> usize {
        node_index(key, self.state.lock().nodes.len())
    }

    pub fn set_node_online(&self, node: usize, online: bool) {
        if let Some(state) = self.state.lock().nodes.get_mut(node) {
            state.online = online;
        }
    }

    /// A stalled node never finishes loading modules.
    pub fn stall_node(&self, node: usize, stalled: bool) {
        if let Some(state) = self.state.lock().nodes.get_mut(node) {
            state.stalled = stalled;
        }
    }

    /// Binds a Rust function body to `module`/`function`. The module itself
    /// still has to be uploaded and active before it can be applied. Either
    /// the filename or its stem may be given.
    pub fn register_function(&self, module: &str, function: &str, body: UdfFunction) {
        let stem = UdfLanguage::default().module_stem(module);
        self.state
            .lock()
            .functions
            .insert((stem.to_string(), function.to_string()), body);
    }

    /// Forces a running job into `Failed`. Returns false for unknown or
    /// already finished jobs.
    pub fn fail_job(&self, job_id: &JobId) -> bool {
        let mut state = self.state.lock();
        match state.jobs.get_mut(job_id) {
            Some(job) if !job.status.is_terminal() => {
                job.status = JobStatus::Failed;
                state.retire_job(job_id.clone(), self.config.finished_job_retention);
                true
            }
            _ => false,
        }
    }

    /// Overwrites the reported status of a job, bypassing the state machine,
    /// and stops it from advancing. Used to inject faults such as a status
    /// moving backwards.
    pub fn set_job_status(&self, job_id: &JobId, status: JobStatus, progress: u8) -> bool {
        let mut state = self.state.lock();
        match state.jobs.get_mut(job_id) {
            Some(job) => {
                let finishes = status.is_terminal() && !job.status.is_terminal();
                job.status = status;
                job.progress = progress;
                job.pinned = true;
                if finishes {
                    state.retire_job(job_id.clone(), self.config.finished_job_retention);
                }
                true
            }
            None => false,
        }
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().records.len()
    }

    fn node_loaded(&self, node: usize, state: &NodeState, module: &StoredModule) -> bool {
        !state.stalled
            && module.uploaded_at.elapsed() >= self.config.module_propagation * (node as u32 + 1)
    }

    fn listing(&self, state: &ClusterState, filename: &str, module: &StoredModule) -> ModuleListing {
        ModuleListing {
            filename: filename.to_string(),
            content_hash: module.content_hash.clone(),
            language: module.language,
            node_loaded: state
                .nodes
                .iter()
                .enumerate()
                .map(|(i, node)| self.node_loaded(i, node, module))
                .collect(),
        }
    }

    fn resolve_function(
        &self,
        state: &ClusterState,
        module: &str,
        function: &str,
    ) -> Result<UdfFunction, ClientError> {
        let (filename, stored) = find_module(state, module)
            .ok_or_else(|| ClientError::server(ServerErrorKind::ModuleNotFound, module))?;
        if !self.listing(state, filename, stored).loaded_on_all_nodes() {
            return Err(ClientError::server(
                ServerErrorKind::ModuleNotActive,
                format!("module '{filename}' is not loaded on every node"),
            ));
        }
        let stem = stored.language.module_stem(filename);
        state
            .functions
            .get(&(stem.to_string(), function.to_string()))
            .cloned()
            .ok_or_else(|| {
                ClientError::server(
                    ServerErrorKind::InvalidRequest,
                    format!("function '{function}' not found in module '{module}'"),
                )
            })
    }
}

/// Looks a module up by its filename or by its stem (`test_udf` for
/// `test_udf.lua`).
fn find_module<'s>(state: &'s ClusterState, module: &str) -> Option<(&'s str, &'s StoredModule)> {
    if let Some((filename, stored)) = state.modules.get_key_value(module) {
        return Some((filename.as_str(), stored));
    }
    state
        .modules
        .iter()
        .find(|(filename, stored)| stored.language.module_stem(filename) == module)
        .map(|(filename, stored)| (filename.as_str(), stored))
}

fn node_index(key: &Key, nodes: usize) -> usize {
    key.partition_id() as usize % nodes.max(1)
}

fn now_epoch_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

impl ClusterState {
    fn ensure_connected(&self) -> Result<(), ClientError> {
        if self.connected {
            Ok(())
        } else {
            Err(ClientError::Transport("cluster not connected".into()))
        }
    }

    fn ensure_key_reachable(&self, key: &Key) -> Result<(), ClientError> {
        let node = node_index(key, self.nodes.len());
        if self.nodes[node].online {
            Ok(())
        } else {
            Err(ClientError::Transport(format!(
                "node {node} owning partition {} is unreachable",
                key.partition_id()
            )))
        }
    }

    /// Queues a finished job and forgets the oldest beyond `retention`.
    fn retire_job(&mut self, job_id: JobId, retention: usize) {
        self.finished_jobs.push_back(job_id);
        while self.finished_jobs.len() > retention.max(1) {
            if let Some(expired) = self.finished_jobs.pop_front() {
                self.jobs.remove(&expired);
                debug!(job_id = %expired, "memory cluster job expired");
            }
        }
    }

    fn ensure_all_nodes_online(&self) -> Result<(), ClientError> {
        match self.nodes.iter().position(|node| !node.online) {
            Some(node) => Err(ClientError::Transport(format!("node {node} is unreachable"))),
            None => Ok(()),
        }
    }
}

fn check_write_policy(
    key: &Key,
    existing: Option<&StoredRecord>,
    policy: &WritePolicy,
) -> Result<(), ClientError> {
    match (policy.exists, existing) {
        (ExistsAction::Create, Some(_)) => {
            return Err(ClientError::server(
                ServerErrorKind::RecordExists,
                key.to_string(),
            ));
        }
        (ExistsAction::UpdateOnly | ExistsAction::Replace, None) => {
            return Err(ClientError::RecordNotFound {
                key: key.to_string(),
            });
        }
        _ => {}
    }
    let current = existing.map_or(0, |record| record.generation);
    let generation_ok = match policy.generation {
        GenerationPolicy::Ignore => true,
        GenerationPolicy::ExpectEq(expected) => current == expected,
        GenerationPolicy::ExpectGt(expected) => expected > current,
    };
    if !generation_ok {
        return Err(ClientError::server(
            ServerErrorKind::GenerationMismatch,
            format!("{key} is at generation {current}"),
        ));
    }
    Ok(())
}

/// Expiration after a write and the TTL to remember with it.
fn next_expiration(policy: &WritePolicy, existing: Option<&StoredRecord>) -> (u32, Option<u32>) {
    match policy.ttl_secs.or_else(|| existing.and_then(|record| record.ttl_secs)) {
        Some(ttl) => (now_epoch_secs().saturating_add(ttl), Some(ttl)),
        None => (existing.map_or(0, |record| record.expiration), None),
    }
}

fn type_mismatch(bin: &str, expected: &BinValue, actual: &BinValue) -> ClientError {
    ClientError::TypeMismatch {
        bin: bin.to_string(),
        expected: expected.type_name().to_string(),
        actual: actual.type_name().to_string(),
    }
}

fn operand<'o>(op: &'o Operation, bin: &str) -> Result<&'o BinValue, ClientError> {
    op.value.as_ref().ok_or_else(|| {
        ClientError::server(
            ServerErrorKind::InvalidRequest,
            format!("{} on '{bin}' carries no value", op.kind.as_str()),
        )
    })
}

fn apply_operation(
    bins: &mut Bins,
    op: &Operation,
    reads: &mut Vec<(String, BinValue)>,
) -> Result<(), ClientError> {
    let Some(bin) = op.bin_name.as_deref() else {
        return Ok(());
    };
    match op.kind {
        OperationKind::Read => {
            if let Some(value) = bins.get(bin) {
                reads.push((bin.to_string(), value.clone()));
            }
        }
        OperationKind::Write => match operand(op, bin)? {
            BinValue::Nil => {
                bins.remove(bin);
            }
            value => {
                bins.insert(bin.to_string(), value.clone());
            }
        },
        OperationKind::Append | OperationKind::Prepend => {
            let value = operand(op, bin)?;
            let prepend = op.kind == OperationKind::Prepend;
            let merged = match (bins.get(bin), value) {
                (None, value) => value.clone(),
                (Some(BinValue::Text(current)), BinValue::Text(extra)) => {
                    let mut text = CompactString::default();
                    let (first, second) = if prepend {
                        (extra, current)
                    } else {
                        (current, extra)
                    };
                    text.push_str(first);
                    text.push_str(second);
                    BinValue::Text(text)
                }
                (Some(BinValue::Bytes(current)), BinValue::Bytes(extra)) => {
                    let (first, second) = if prepend {
                        (extra, current)
                    } else {
                        (current, extra)
                    };
                    BinValue::Bytes([first.as_slice(), second.as_slice()].concat())
                }
                (Some(current), value) => return Err(type_mismatch(bin, value, current)),
            };
            bins.insert(bin.to_string(), merged);
        }
        OperationKind::Increment => {
            let value = operand(op, bin)?;
            let next = match (bins.get(bin), value) {
                (None, value) => value.clone(),
                (Some(BinValue::Integer(current)), BinValue::Integer(by)) => BinValue::Integer(
                    current
                        .checked_add(*by)
                        .ok_or_else(|| ClientError::Overflow {
                            bin: bin.to_string(),
                        })?,
                ),
                (Some(BinValue::Float(current)), BinValue::Float(by)) => {
                    let sum = current + by;
                    if !sum.is_finite() {
                        return Err(ClientError::Overflow {
                            bin: bin.to_string(),
                        });
                    }
                    BinValue::Float(sum)
                }
                (Some(current), value) => return Err(type_mismatch(bin, value, current)),
            };
            bins.insert(bin.to_string(), next);
        }
        OperationKind::Touch => {}
    }
    Ok(())
}

fn project(bins: &Bins, projection: Option<&[String]>) -> Vec<(String, BinValue)> {
    bins.iter()
        .filter(|(name, _)| projection.is_none_or(|wanted| wanted.iter().any(|w| w == *name)))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

#[async_trait]
impl Transport for MemoryCluster {
    async fn connect(&self, hosts: &[Host]) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.connected = true;
        debug!(seeds = hosts.len(), nodes = state.nodes.len(), "memory cluster connected");
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.state.lock().connected = false;
        Ok(())
    }

    async fn operate(&self, req: OperateRequest) -> Result<RawRecord, ClientError> {
        let mut state = self.state.lock();
        state.ensure_connected()?;
        state.ensure_key_reachable(&req.key)?;

        let existing = state.records.get(&req.key);
        let creates = req
            .operations
            .first()
            .is_some_and(|op| op.kind.is_write_class());
        if existing.is_none() && !creates {
            return Err(ClientError::RecordNotFound {
                key: req.key.to_string(),
            });
        }
        let mutates = req
            .operations
            .iter()
            .any(|op| op.kind.is_write_class() || op.kind == OperationKind::Touch);
        if mutates {
            check_write_policy(&req.key, existing, &req.policy)?;
        }

        let mut bins = existing.map(|r| r.bins.clone()).unwrap_or_default();
        let mut reads = Vec::new();
        for op in &req.operations {
            apply_operation(&mut bins, op, &mut reads)?;
        }

        let generation = existing.map_or(0, |r| r.generation);
        if !mutates {
            let expiration = existing.map_or(0, |r| r.expiration);
            return Ok(RawRecord {
                generation,
                expiration,
                bins: reads,
            });
        }

        let (expiration, ttl_secs) = next_expiration(&req.policy, existing);
        let generation = generation.wrapping_add(1).max(1);
        if bins.is_empty() {
            state.records.remove(&req.key);
        } else {
            state.records.insert(
                req.key,
                StoredRecord {
                    generation,
                    expiration,
                    ttl_secs,
                    bins,
                },
            );
        }
        Ok(RawRecord {
            generation,
            expiration,
            bins: reads,
        })
    }

    async fn read(&self, req: ReadRequest) -> Result<Option<RawRecord>, ClientError> {
        let state = self.state.lock();
        state.ensure_connected()?;
        state.ensure_key_reachable(&req.key)?;
        Ok(state.records.get(&req.key).map(|record| RawRecord {
            generation: record.generation,
            expiration: record.expiration,
            bins: if req.header_only {
                Vec::new()
            } else {
                project(&record.bins, req.projection.as_deref())
            },
        }))
    }

    async fn write(&self, req: WriteRequest) -> Result<RawRecord, ClientError> {
        let mut state = self.state.lock();
        state.ensure_connected()?;
        state.ensure_key_reachable(&req.key)?;
        let existing = state.records.get(&req.key);
        check_write_policy(&req.key, existing, &req.policy)?;

        let mut bins = match req.policy.exists {
            ExistsAction::Replace | ExistsAction::CreateOrReplace => Bins::new(),
            _ => existing.map(|r| r.bins.clone()).unwrap_or_default(),
        };
        for (name, value) in req.bins {
            if value.is_nil() {
                bins.remove(&name);
            } else {
                bins.insert(name, value);
            }
        }
        let generation = existing
            .map_or(0, |r| r.generation)
            .wrapping_add(1)
            .max(1);
        let (expiration, ttl_secs) = next_expiration(&req.policy, existing);
        if bins.is_empty() {
            state.records.remove(&req.key);
        } else {
            state.records.insert(
                req.key,
                StoredRecord {
                    generation,
                    expiration,
                    ttl_secs,
                    bins,
                },
            );
        }
        Ok(RawRecord::header(generation, expiration))
    }

    async fn remove(&self, key: Key, policy: WritePolicy) -> Result<bool, ClientError> {
        let mut state = self.state.lock();
        state.ensure_connected()?;
        state.ensure_key_reachable(&key)?;
        let Some(existing) = state.records.get(&key) else {
            return Ok(false);
        };
        let generation_policy = WritePolicy {
            exists: ExistsAction::Update,
            ..policy
        };
        check_write_policy(&key, Some(existing), &generation_policy)?;
        Ok(state.records.remove(&key).is_some())
    }

    async fn batch(&self, req: BatchRequest) -> Result<Vec<RawBatchEntry>, ClientError> {
        let state = self.state.lock();
        state.ensure_connected()?;
        Ok(req
            .keys
            .iter()
            .map(|key| {
                if let Err(err) = state.ensure_key_reachable(key) {
                    return RawBatchEntry::Failed(err);
                }
                match state.records.get(key) {
                    None => RawBatchEntry::NotFound,
                    Some(record) => RawBatchEntry::Found(RawRecord {
                        generation: record.generation,
                        expiration: record.expiration,
                        bins: match &req.mode {
                            BatchReadMode::Exists => Vec::new(),
                            BatchReadMode::AllBins => project(&record.bins, None),
                            BatchReadMode::Bins(wanted) => project(&record.bins, Some(wanted.as_slice())),
                        },
                    }),
                }
            })
            .collect())
    }

    async fn scan(
        &self,
        spec: ReadSpec,
        _policy: QueryPolicy,
    ) -> Result<RawScanResponse, ClientError> {
        let mut state = self.state.lock();
        state.ensure_connected()?;
        state.ensure_all_nodes_online()?;

        if let Some(filter) = &spec.filter {
            let indexed = state.indexes.values().any(|index| {
                index.namespace == spec.namespace
                    && index.set == spec.set
                    && index.bin == filter.bin()
                    && index.index_type == filter.index_type()
            });
            if !indexed {
                return Err(ClientError::IndexNotFound {
                    namespace: spec.namespace.clone(),
                    name: filter.bin().to_string(),
                });
            }
        }

        let function = spec
            .udf
            .as_ref()
            .map(|udf| self.resolve_function(&state, &udf.module, &udf.function))
            .transpose()?;

        let percent = u32::from(spec.scan.percent);
        let mut matched: Vec<(&Key, &StoredRecord)> = state
            .records
            .iter()
            .filter(|(key, _)| {
                key.namespace == spec.namespace && (spec.set.is_empty() || key.set == spec.set)
            })
            .filter(|(key, _)| {
                u32::from(key.partition_id()) * 100 < u32::from(PARTITION_COUNT) * percent
            })
            .filter(|(_, record)| match (&spec.filter, spec.kind) {
                (Some(filter), ReadKind::Query) => record
                    .bins
                    .get(filter.bin())
                    .is_some_and(|value| filter.matches(value)),
                _ => true,
            })
            .collect();
        matched.sort_by_cached_key(|(key, _)| key.digest());
        if !spec.order_by.is_empty() {
            matched.sort_by(|(_, a), (_, b)| {
                spec.order_by
                    .iter()
                    .map(|(bin, order)| {
                        let ord = a.bins.get(bin).cmp(&b.bins.get(bin));
                        match order {
                            Order::Asc => ord,
                            Order::Desc => ord.reverse(),
                        }
                    })
                    .find(|ord| ord.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let args = spec.udf.as_ref().map(|u| u.args.clone()).unwrap_or_default();
        if spec.background {
            let Some(UdfFunction::Transform(transform)) = function else {
                return Err(ClientError::server(
                    ServerErrorKind::InvalidRequest,
                    "background execution requires a record udf",
                ));
            };
            let keys: Vec<Key> = matched.iter().map(|(key, _)| (*key).clone()).collect();
            let job_id = JobId::new(uuid::Uuid::new_v4().to_string());
            debug!(job_id = %job_id, records = keys.len(), "memory cluster job accepted");
            state.jobs.insert(
                job_id.clone(),
                StoredJob {
                    kind: spec.job_kind(),
                    keys,
                    transform,
                    args,
                    polls: 0,
                    status: JobStatus::Pending,
                    progress: 0,
                    pinned: false,
                },
            );
            return Ok(RawScanResponse::Job(job_id));
        }

        let rows = match function {
            None => matched
                .into_iter()
                .map(|(key, record)| RawRow::Record {
                    key: key.clone(),
                    record: RawRecord {
                        generation: record.generation,
                        expiration: record.expiration,
                        bins: if spec.scan.no_bins {
                            Vec::new()
                        } else {
                            record
                                .bins
                                .iter()
                                .filter(|(name, _)| spec.is_projected(name))
                                .map(|(name, value)| (name.clone(), value.clone()))
                                .collect()
                        },
                    },
                })
                .collect(),
            Some(UdfFunction::Aggregate(aggregate)) => {
                if matched.is_empty() {
                    Vec::new()
                } else {
                    let records: Vec<Record> = matched
                        .into_iter()
                        .map(|(key, r)| {
                            Record::new(key.clone(), r.generation, r.expiration, r.bins.clone())
                        })
                        .collect();
                    vec![RawRow::Value(aggregate(&records, &args))]
                }
            }
            Some(UdfFunction::Transform(_)) => {
                return Err(ClientError::server(
                    ServerErrorKind::Unsupported,
                    "record udf requires background execution",
                ));
            }
        };
        Ok(RawScanResponse::Rows(rows))
    }

    async fn poll_job(
        &self,
        job_id: JobId,
        _policy: InfoPolicy,
    ) -> Result<RawJobInfo, ClientError> {
        let mut guard = self.state.lock();
        guard.ensure_connected()?;
        let state = &mut *guard;
        let not_found = || ClientError::JobNotFound {
            job_id: job_id.to_string(),
        };
        let job = state.jobs.get_mut(&job_id).ok_or_else(not_found)?;
        job.polls = job.polls.saturating_add(1);
        if job.polls <= self.config.job_visibility_polls {
            return Err(not_found());
        }

        let first_visible = job.polls == self.config.job_visibility_polls + 1;
        let mut finished = false;
        if !first_visible && !job.pinned && !job.status.is_terminal() {
            job.progress = job
                .progress
                .saturating_add(self.config.job_progress_step.max(1))
                .min(100);
            job.status = JobStatus::InProgress;
            if job.progress == 100 {
                for key in &job.keys {
                    if let Some(record) = state.records.get_mut(key) {
                        (job.transform)(&mut record.bins, &job.args);
                        record.generation = record.generation.wrapping_add(1).max(1);
                    }
                }
                job.status = JobStatus::Completed;
                finished = true;
            }
        }

        let total = job.keys.len() as u64;
        let records_scanned = match job.status {
            JobStatus::Completed => total,
            _ => total * u64::from(job.progress) / 100,
        };
        let info = RawJobInfo {
            kind: job.kind,
            status: job.status,
            progress_percent: job.progress,
            records_scanned,
        };
        if finished {
            state.retire_job(job_id, self.config.finished_job_retention);
        }
        Ok(info)
    }

    async fn put_module(
        &self,
        filename: String,
        content: Vec<u8>,
        language: UdfLanguage,
        _policy: InfoPolicy,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.ensure_connected()?;
        state.modules.insert(
            filename,
            StoredModule {
                content_hash: content_hash(&content),
                language,
                uploaded_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn remove_module(
        &self,
        filename: String,
        _policy: InfoPolicy,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.ensure_connected()?;
        match state.modules.remove(&filename) {
            Some(_) => Ok(()),
            None => Err(ClientError::server(
                ServerErrorKind::ModuleNotFound,
                filename,
            )),
        }
    }

    async fn list_modules(&self, _policy: InfoPolicy) -> Result<Vec<ModuleListing>, ClientError> {
        let state = self.state.lock();
        state.ensure_connected()?;
        Ok(state
            .modules
            .iter()
            .map(|(filename, module)| self.listing(&state, filename, module))
            .collect())
    }

    async fn create_index(
        &self,
        definition: IndexDefinition,
        _policy: InfoPolicy,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.ensure_connected()?;
        let slot = (definition.namespace.clone(), definition.name.clone());
        if state.indexes.contains_key(&slot) {
            return Err(ClientError::server(
                ServerErrorKind::IndexAlreadyExists,
                definition.name,
            ));
        }
        state.indexes.insert(slot, definition);
        Ok(())
    }

    async fn drop_index(
        &self,
        namespace: String,
        index_name: String,
        _policy: InfoPolicy,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.ensure_connected()?;
        match state.indexes.remove(&(namespace.clone(), index_name.clone())) {
            Some(_) => Ok(()),
            None => Err(ClientError::IndexNotFound {
                namespace,
                name: index_name,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{StoredRecord, apply_operation, next_expiration, now_epoch_secs};
    use crate::error::ErrorCode;
    use crate::operation::Operation;
    use crate::config::ClientConfig;
    use crate::policy::Policies;
    use crate::record::{BinValue, Bins};

    #[test]
    fn write_without_ttl_reapplies_the_stored_one() {
        let policy = Policies::from_config(&ClientConfig::default()).write;
        let stale = StoredRecord {
            generation: 1,
            expiration: 5,
            ttl_secs: Some(60),
            bins: Bins::new(),
        };
        let before = now_epoch_secs();
        let (expiration, ttl) = next_expiration(&policy, Some(&stale));
        assert_eq!(ttl, Some(60));
        assert!(expiration >= before + 60);

        let (expiration, ttl) = next_expiration(&policy.clone().with_ttl_secs(10), Some(&stale));
        assert_eq!(ttl, Some(10));
        assert!(expiration >= before + 10 && expiration < before + 60);

        let never = StoredRecord {
            ttl_secs: None,
            expiration: 0,
            ..stale
        };
        assert_eq!(next_expiration(&policy, Some(&never)), (0, None));
        assert_eq!(next_expiration(&policy, None), (0, None));
    }

    #[test]
    fn operations_see_earlier_effects() {
        let mut bins = Bins::new();
        let mut reads = Vec::new();
        for op in [
            Operation::write("x", 5),
            Operation::increment("x", 3),
            Operation::read("x"),
            Operation::append("s", "b"),
            Operation::prepend("s", "a"),
            Operation::read("s"),
        ] {
            apply_operation(&mut bins, &op, &mut reads).expect("apply");
        }
        assert_eq!(
            reads,
            vec![
                ("x".to_string(), BinValue::Integer(8)),
                ("s".to_string(), BinValue::from("ab")),
            ]
        );
    }

    #[test]
    fn increment_errors_are_typed() {
        let mut bins = Bins::new();
        bins.insert("s".into(), BinValue::from("text"));
        bins.insert("n".into(), BinValue::Integer(i64::MAX));
        let mut reads = Vec::new();
        let err = apply_operation(&mut bins, &Operation::increment("s", 1), &mut reads)
            .expect_err("string bin");
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
        let err = apply_operation(&mut bins, &Operation::increment("n", 1), &mut reads)
            .expect_err("overflow");
        assert_eq!(err.code(), ErrorCode::Overflow);
        assert_eq!(bins.get("n"), Some(&BinValue::Integer(i64::MAX)));
    }
}
