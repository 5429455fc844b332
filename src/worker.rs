use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::MetadataClient;
use crate::domain::{AttributePair, HttpMethod, Record, Task, TaskId};
use crate::error::FetchFailure;
use crate::queue::WorkQueue;
use crate::store::{OccurrenceTable, ResultStore};

const MAX_LOGGED_BODY: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTask {
    pub id: TaskId,
    pub url: String,
    pub reason: FetchFailure,
}

/// Failures of every worker in a batch. Shared, so entries logged by a
/// worker that later panics are kept.
#[derive(Debug, Default)]
pub struct FailureLog {
    failed: Mutex<Vec<FailedTask>>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, failed: FailedTask) {
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failed);
    }

    /// All failures, ordered by task id.
    pub fn into_sorted(self) -> Vec<FailedTask> {
        let mut failed = self
            .failed
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        failed.sort_by_key(|task| task.id);
        failed
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Turns one task into a record, or says why it could not.
pub fn fetch_record<C>(client: &C, method: HttpMethod, task: &Task) -> Result<Record, FetchFailure>
where
    C: MetadataClient + ?Sized,
{
    let response = client.send(method, &task.url)?;
    if !response.is_success() {
        return Err(FetchFailure::BadStatus {
            status: response.status,
            body: truncate(&response.body),
        });
    }
    parse_record(task.id, &response.body)
}

/// Reads the `attributes` array of a metadata document. Every entry must be
/// valid before the record is accepted.
pub fn parse_record(id: TaskId, body: &str) -> Result<Record, FetchFailure> {
    let document: Value = serde_json::from_str(body)
        .map_err(|err| FetchFailure::malformed(format!("invalid JSON: {err}")))?;
    let attributes = document
        .get("attributes")
        .ok_or_else(|| FetchFailure::malformed("attributes not found"))?
        .as_array()
        .ok_or_else(|| FetchFailure::malformed("attributes is not an array"))?
        .iter()
        .enumerate()
        .map(|(index, item)| {
            AttributePair::deserialize(item)
                .map_err(|err| FetchFailure::malformed(format!("attribute {index}: {err}")))
        })
        .collect::<Result<Vec<_>, FetchFailure>>()?;
    Ok(Record { id, attributes })
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_LOGGED_BODY) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

pub struct FetchWorker<'a, C: ?Sized> {
    pub index: usize,
    pub method: HttpMethod,
    pub client: &'a C,
    pub queue: &'a WorkQueue,
    pub results: &'a ResultStore,
    pub occurrences: &'a OccurrenceTable,
    pub failures: &'a FailureLog,
}

impl<C> FetchWorker<'_, C>
where
    C: MetadataClient + ?Sized,
{
    /// Drains the queue. Returns once no task is left to claim.
    pub fn run(&self) -> WorkerSummary {
        let mut summary = WorkerSummary::default();
        while let Some(task) = self.queue.claim() {
            match fetch_record(self.client, self.method, &task) {
                Ok(record) => {
                    tracing::debug!(
                        worker = self.index,
                        task_id = %task.id,
                        attributes = record.attributes.len(),
                        "fetched metadata"
                    );
                    self.occurrences.record(&record.attributes);
                    self.results.append(record);
                    summary.succeeded += 1;
                }
                Err(reason) => {
                    tracing::warn!(
                        worker = self.index,
                        task_id = %task.id,
                        url = %task.url,
                        error = %reason,
                        "unable to get metadata"
                    );
                    self.failures.push(FailedTask {
                        id: task.id,
                        url: task.url.clone(),
                        reason,
                    });
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::AttributeValue;

    #[test]
    fn parse_record_reads_attributes_in_order() {
        let body = r#"{"name": "x", "attributes": [
            {"trait_type": "Background", "value": "Blue"},
            {"trait_type": "Level", "value": 3}
        ]}"#;
        let record = parse_record(TaskId::new(9), body).unwrap();
        assert_eq!(record.id, TaskId::new(9));
        assert_eq!(record.attributes.len(), 2);
        assert_eq!(record.attributes[0].trait_type, "Background");
        assert_eq!(record.attributes[1].value, AttributeValue::Integer(3));
    }

    #[test]
    fn parse_record_missing_attributes() {
        let err = parse_record(TaskId::new(1), "{}").unwrap_err();
        assert_eq!(err, FetchFailure::malformed("attributes not found"));
    }

    #[test]
    fn parse_record_rejects_invalid_json() {
        let err = parse_record(TaskId::new(1), "<html>").unwrap_err();
        assert_matches!(err, FetchFailure::MalformedResponse { .. });
    }

    #[test]
    fn parse_record_counts_null_as_a_value() {
        let body = r#"{"attributes": [
            {"trait_type": "Hat", "value": null},
            {"trait_type": "Eyes", "value": "Red"}
        ]}"#;
        let record = parse_record(TaskId::new(4), body).unwrap();
        assert_eq!(record.attributes[0].value, AttributeValue::Null);

        let occurrences = OccurrenceTable::new();
        occurrences.record(&record.attributes);
        assert_eq!(occurrences.count("Hat", &AttributeValue::Null), 1);
        assert_eq!(occurrences.count("Eyes", &AttributeValue::from("Red")), 1);
    }

    #[test]
    fn parse_record_rejects_nested_value() {
        let body = r#"{"attributes": [{"trait_type": "Hat", "value": {"color": "red"}}]}"#;
        let err = parse_record(TaskId::new(1), body).unwrap_err();
        assert_matches!(err, FetchFailure::MalformedResponse { message } if message.starts_with("attribute 0"));
    }

    #[test]
    fn parse_record_rejects_bad_entry() {
        let body = r#"{"attributes": [{"trait_type": "Eyes", "value": "Red"}, {"value": "x"}]}"#;
        let err = parse_record(TaskId::new(1), body).unwrap_err();
        assert_matches!(err, FetchFailure::MalformedResponse { message } if message.starts_with("attribute 1"));
    }

    #[test]
    fn parse_record_allows_empty_attributes() {
        let record = parse_record(TaskId::new(1), r#"{"attributes": []}"#).unwrap();
        assert!(record.attributes.is_empty());
    }

    #[test]
    fn failure_log_sorts_by_id() {
        let log = FailureLog::new();
        for id in [3, 1, 2] {
            log.push(FailedTask {
                id: TaskId::new(id),
                url: format!("http://localhost/{id}"),
                reason: FetchFailure::transport("refused"),
            });
        }
        let ids: Vec<u64> = log.into_sorted().iter().map(|task| task.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn truncate_long_bodies() {
        let body = "x".repeat(MAX_LOGGED_BODY + 10);
        let truncated = truncate(&body);
        assert_eq!(truncated.len(), MAX_LOGGED_BODY + 3);
        assert_eq!(truncate("short"), "short");
    }
}
