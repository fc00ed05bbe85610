use crate::ClusterClient;
use crate::error::ClientError;
use crate::job::Job;
use crate::policy::QueryPolicy;
use crate::query::plan::ReadSpec;
use crate::record::{BinValue, Bins, Record};
use crate::transport::{RawRow, RawScanResponse};
use tracing::debug;

/// One row of a foreground result. Rows produced by an applied aggregation
/// carry a bare value instead of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultRow {
    Record(Record),
    Value(BinValue),
}

impl ResultRow {
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            ResultRow::Record(record) => Some(record),
            ResultRow::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&BinValue> {
        match self {
            ResultRow::Value(value) => Some(value),
            ResultRow::Record(_) => None,
        }
    }
}

/// Finite, single-pass sequence of result rows. Re-run `exec` to iterate again.
#[derive(Debug)]
pub struct ResultStream {
    rows: std::vec::IntoIter<ResultRow>,
}

impl ResultStream {
    fn new(rows: Vec<ResultRow>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }

    /// Remaining record rows; value rows are skipped.
    pub fn records(self) -> Vec<Record> {
        self.filter_map(|row| match row {
            ResultRow::Record(record) => Some(record),
            ResultRow::Value(_) => None,
        })
        .collect()
    }

    /// Remaining value rows; record rows are skipped.
    pub fn values(self) -> Vec<BinValue> {
        self.filter_map(|row| match row {
            ResultRow::Value(value) => Some(value),
            ResultRow::Record(_) => None,
        })
        .collect()
    }
}

impl Iterator for ResultStream {
    type Item = ResultRow;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for ResultStream {}

/// What `exec` produced: rows for a foreground run, a job handle otherwise.
#[derive(Debug)]
pub enum Execution {
    Rows(ResultStream),
    Job(Job),
}

impl Execution {
    pub fn into_rows(self) -> Result<ResultStream, ClientError> {
        match self {
            Execution::Rows(rows) => Ok(rows),
            Execution::Job(job) => Err(ClientError::InvalidArgument(format!(
                "execution is background job '{}', not a row stream",
                job.id
            ))),
        }
    }

    pub fn into_job(self) -> Result<Job, ClientError> {
        match self {
            Execution::Job(job) => Ok(job),
            Execution::Rows(_) => Err(ClientError::InvalidArgument(
                "execution ran in the foreground; no job was created".into(),
            )),
        }
    }
}

pub(crate) async fn execute(
    client: &ClusterClient,
    spec: ReadSpec,
    policy: QueryPolicy,
) -> Result<Execution, ClientError> {
    spec.validate()?;
    if spec.background {
        return client.jobs().submit(spec).await.map(Execution::Job);
    }

    let transport = client.transport()?;
    debug!(
        namespace = %spec.namespace,
        set = %spec.set,
        kind = ?spec.kind,
        filtered = spec.filter.is_some(),
        udf = spec.udf.is_some(),
        "foreground read"
    );
    let response = transport.scan(spec.clone(), policy).await?;
    let raw_rows = match response {
        RawScanResponse::Rows(rows) => rows,
        RawScanResponse::Job(job_id) => {
            return Err(ClientError::Transport(format!(
                "foreground request answered with job '{job_id}'"
            )));
        }
    };
    let rows = assemble_rows(&spec, raw_rows)?;
    debug!(rows = rows.len(), "foreground read complete");
    Ok(Execution::Rows(ResultStream::new(rows)))
}

fn assemble_rows(spec: &ReadSpec, raw_rows: Vec<RawRow>) -> Result<Vec<ResultRow>, ClientError> {
    raw_rows
        .into_iter()
        .map(|row| match row {
            RawRow::Record { key, record } => {
                let bins: Bins = if spec.scan.no_bins {
                    Bins::new()
                } else {
                    record
                        .bins
                        .into_iter()
                        .filter(|(name, _)| spec.is_projected(name))
                        .collect()
                };
                Ok(ResultRow::Record(Record::new(
                    key,
                    record.generation,
                    record.expiration,
                    bins,
                )))
            }
            RawRow::Value(value) if spec.udf.is_some() => Ok(ResultRow::Value(value)),
            RawRow::Value(_) => Err(ClientError::Transport(
                "value row returned for a read without an applied udf".into(),
            )),
        })
        .collect()
}
