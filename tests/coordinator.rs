mod support;

use std::time::Duration;

use assert_matches::assert_matches;
use trait_census::coordinator::{Batch, Coordinator, FetchSettings};
use trait_census::domain::{AttributeValue, HttpMethod};
use trait_census::error::FetchFailure;

use support::{MockClient, Reply, document, task, url};

fn quiet(worker_count: usize) -> FetchSettings {
    FetchSettings {
        worker_count,
        monitor_interval: None,
        ..FetchSettings::default()
    }
}

fn red_client(count: u64) -> MockClient {
    (1..=count).fold(MockClient::new(), |client, id| {
        client.reply(&url(id), Reply::Json(document(&[("color", "red"), ("hat", "cap")])))
    })
}

#[test]
fn every_task_is_fetched_exactly_once() {
    for workers in [1, 2, 50, 200] {
        let coordinator = Coordinator::new(red_client(120), quiet(workers));
        let batch = coordinator.run((1..=120).map(task).collect(), HttpMethod::Get, workers);

        assert_eq!(batch.results().len(), 120, "workers={workers}");
        assert_eq!(batch.report().succeeded, 120);
        assert_eq!(batch.report().failure_count(), 0);
        let mut ids: Vec<u64> = batch.results().records().iter().map(|r| r.id.get()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=120).collect::<Vec<_>>());
    }
}

#[test]
fn client_sees_each_url_once() {
    let client = red_client(300).with_delay(Duration::from_millis(1));
    let coordinator = Coordinator::new(client, quiet(64));
    let batch = coordinator.run_batch((1..=300).map(task).collect());
    assert_eq!(batch.results().len(), 300);
    assert_eq!(coordinator.client().total_calls(), 300);
    assert!((1..=300).all(|id| coordinator.client().calls(&url(id)) == 1));
}

#[test]
fn concurrent_counts_are_not_lost() {
    let red = AttributeValue::from("red");
    for workers in [1, 2, 50, 200] {
        let coordinator = Coordinator::new(red_client(250), quiet(workers));
        let batch = coordinator.run_batch((1..=250).map(task).collect());
        let occurrence = batch.occurrence();
        assert_eq!(occurrence["color"][&red], 250, "workers={workers}");
        assert_eq!(occurrence["hat"][&AttributeValue::from("cap")], 250);
    }
}

#[test]
fn bad_status_is_dropped() {
    let client = red_client(5).reply(&url(3), Reply::Status(500, "upstream exploded".to_string()));
    let coordinator = Coordinator::new(client, quiet(4));
    let batch = coordinator.run_batch((1..=5).map(task).collect());

    assert_eq!(batch.results().len(), 4);
    let report = batch.report();
    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.failed[0].id.get(), 3);
    assert_eq!(
        report.failed[0].reason,
        FetchFailure::BadStatus {
            status: 500,
            body: "upstream exploded".to_string()
        }
    );
    assert_eq!(batch.occurrence()["color"][&AttributeValue::from("red")], 4);
}

#[test]
fn non_200_success_codes_are_dropped() {
    let client = red_client(2).reply(&url(2), Reply::Status(204, String::new()));
    let coordinator = Coordinator::new(client, quiet(2));
    let batch = coordinator.run_batch((1..=2).map(task).collect());
    assert_eq!(batch.results().len(), 1);
    assert_matches!(
        batch.report().failed[0].reason,
        FetchFailure::BadStatus { status: 204, .. }
    );
}

#[test]
fn missing_attributes_is_dropped() {
    let client = red_client(3).reply(&url(2), Reply::Json("{}".to_string()));
    let coordinator = Coordinator::new(client, quiet(3));
    let batch = coordinator.run_batch((1..=3).map(task).collect());

    assert_eq!(batch.results().len(), 2);
    assert_matches!(
        batch.report().failed[0].reason,
        FetchFailure::MalformedResponse { .. }
    );
}

#[test]
fn malformed_entry_leaves_no_partial_counts() {
    let body = r#"{"attributes": [{"trait_type": "eyes", "value": "green"}, {"trait_type": "mouth"}]}"#;
    let client = red_client(1).reply(&url(2), Reply::Json(body.to_string()));
    let coordinator = Coordinator::new(client, quiet(2));
    let batch = coordinator.run_batch((1..=2).map(task).collect());

    assert_eq!(batch.results().len(), 1);
    assert!(!batch.occurrence().contains_key("eyes"));
}

#[test]
fn transport_errors_are_dropped() {
    let client = red_client(4).reply(&url(1), Reply::Unreachable);
    let coordinator = Coordinator::new(client, quiet(2));
    let batch = coordinator.run_batch((1..=4).map(task).collect());
    assert_eq!(batch.results().len(), 3);
    assert_matches!(
        batch.report().failed[0].reason,
        FetchFailure::Transport { .. }
    );
}

#[test]
fn total_failure_still_returns() {
    let coordinator = Coordinator::new(MockClient::new(), quiet(8));
    let batch = coordinator.run_batch((1..=20).map(task).collect());
    assert!(batch.results().is_empty());
    assert!(batch.occurrence().is_empty());
    assert_eq!(batch.report().failure_count(), 20);
    let ids: Vec<u64> = batch.report().failed.iter().map(|f| f.id.get()).collect();
    assert_eq!(ids, (1..=20).collect::<Vec<_>>());
}

#[test]
fn empty_input_returns_immediately() {
    let coordinator = Coordinator::new(MockClient::new(), FetchSettings::default());
    let batch = coordinator.run_batch(Vec::new());
    assert!(batch.occurrence().is_empty());
    assert!(batch.responses().is_empty());
    assert_eq!(batch.report().submitted, 0);
}

fn failed_ids(batch: &Batch) -> Vec<u64> {
    batch.report().failed.iter().map(|f| f.id.get()).collect()
}

#[test]
fn worker_panic_does_not_hang_the_batch() {
    let client = red_client(6).reply(&url(4), Reply::Panic);
    let coordinator = Coordinator::new(client, quiet(3));
    let batch = coordinator.run_batch((1..=6).map(task).collect());
    assert_eq!(batch.results().len(), 5);
    assert_eq!(failed_ids(&batch), vec![4]);
    assert_eq!(batch.report().failed[0].reason, FetchFailure::Panicked);
}

#[test]
fn lone_worker_panicking_on_first_task_still_finishes() {
    let client = red_client(2).reply(&url(1), Reply::Panic);
    let coordinator = Coordinator::new(client, quiet(1));
    let batch = coordinator.run_batch((1..=2).map(task).collect());

    assert_eq!(batch.results().len(), 1);
    assert_eq!(batch.results().records()[0].id.get(), 2);
    assert_eq!(failed_ids(&batch), vec![1]);
    assert_eq!(coordinator.client().total_calls(), 2);
}

#[test]
fn every_worker_panicking_still_finishes() {
    let client = (1..=3).fold(red_client(8), |client, id| client.reply(&url(id), Reply::Panic));
    let coordinator = Coordinator::new(client, quiet(2));
    let batch = coordinator.run_batch((1..=8).map(task).collect());

    assert_eq!(batch.results().len(), 5);
    assert_eq!(failed_ids(&batch), vec![1, 2, 3]);
    assert!(
        batch
            .report()
            .failed
            .iter()
            .all(|failed| failed.reason == FetchFailure::Panicked)
    );
    assert!((1..=8).all(|id| coordinator.client().calls(&url(id)) == 1));
    assert_eq!(batch.occurrence()["color"][&AttributeValue::from("red")], 5);
}

#[test]
fn null_values_are_counted() {
    let body = r#"{"attributes": [{"trait_type": "hat", "value": null}, {"trait_type": "color", "value": "red"}]}"#;
    let client = red_client(2).reply(&url(2), Reply::Json(body.to_string()));
    let coordinator = Coordinator::new(client, quiet(2));
    let batch = coordinator.run_batch((1..=2).map(task).collect());

    assert_eq!(batch.results().len(), 2);
    let occurrence = batch.occurrence();
    assert_eq!(occurrence["hat"][&AttributeValue::Null], 1);
    assert_eq!(occurrence["hat"][&AttributeValue::from("cap")], 1);
    assert_eq!(occurrence["color"][&AttributeValue::from("red")], 2);
}

#[test]
fn duplicate_ids_are_reported_not_refetched() {
    let coordinator = Coordinator::new(red_client(2), quiet(4));
    let batch = coordinator.run_batch(vec![task(1), task(1), task(2)]);

    assert_eq!(batch.results().len(), 2);
    assert_eq!(coordinator.client().calls(&url(1)), 1);
    let report = batch.report();
    assert_eq!(report.submitted, 2);
    assert_eq!(report.duplicates.len(), 1);
    assert_eq!(report.duplicates[0].id.get(), 1);
    let ids: Vec<u64> = batch.rarity(10).scores.keys().map(|id| id.get()).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn runs_do_not_share_state() {
    let coordinator = Coordinator::new(red_client(3), quiet(2));
    let first = coordinator.run_batch((1..=3).map(task).collect());
    let second = coordinator.run_batch((1..=2).map(task).collect());
    let red = AttributeValue::from("red");
    assert_eq!(first.occurrence()["color"][&red], 3);
    assert_eq!(second.occurrence()["color"][&red], 2);
}

#[test]
fn occurrence_read_is_idempotent() {
    let coordinator = Coordinator::new(red_client(10), quiet(4));
    let batch = coordinator.run_batch((1..=10).map(task).collect());
    assert_eq!(batch.occurrence(), batch.occurrence());
}
