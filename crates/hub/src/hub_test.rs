use std::sync::Arc;

use chrono::Utc;
use coriolis_record::{Facility, LogRecord, RfcVersion, Severity};
use coriolis_writers::LogWriter;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::*;

fn record(app_name: &str, severity: Severity) -> LogRecord {
    LogRecord {
        timestamp: Utc::now(),
        hostname: "host1".into(),
        priority: Facility::User.as_u8() * 8 + severity.as_u8(),
        facility: Facility::User,
        severity,
        app_name: app_name.into(),
        proc_id: 0,
        message: "hello".into(),
        rfc: RfcVersion::Rfc5424,
    }
}

#[tokio::test]
async fn broadcast_reaches_matching_subscriber() {
    let cancel = CancellationToken::new();
    let (handle, task) = Hub::spawn(cancel.clone());

    let (entry, mut rx) = SubscriberEntry::new(FilterSpec::new(
        Some(Severity::Debug),
        Some("myapp".into()),
    ));
    handle.register(entry).await.unwrap();

    handle
        .write(record("myapp", Severity::Informational))
        .await
        .unwrap();

    let delivered = rx.recv().await.unwrap();
    assert_eq!(delivered.app_name, "myapp");
    assert_eq!(delivered.severity, Severity::Informational);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn filtered_out_records_are_not_delivered() {
    let cancel = CancellationToken::new();
    let (handle, task) = Hub::spawn(cancel.clone());

    // Ceiling 3: an informational (6) record must be suppressed.
    let (entry, mut rx) =
        SubscriberEntry::new(FilterSpec::new(Some(Severity::Error), Some("myapp".into())));
    handle.register(entry).await.unwrap();

    handle
        .write(record("myapp", Severity::Informational))
        .await
        .unwrap();
    handle.write(record("myapp", Severity::Alert)).await.unwrap();

    // Only the alert arrives; the informational record was dropped.
    let delivered = rx.recv().await.unwrap();
    assert_eq!(delivered.severity, Severity::Alert);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn broadcast_to_empty_hub_is_a_noop() {
    let cancel = CancellationToken::new();
    let (handle, task) = Hub::spawn(cancel.clone());

    handle
        .write(record("myapp", Severity::Informational))
        .await
        .unwrap();

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn unregister_closes_the_outbound_buffer() {
    let cancel = CancellationToken::new();
    let (handle, task) = Hub::spawn(cancel.clone());

    let (entry, mut rx) = SubscriberEntry::new(FilterSpec::default());
    let id = entry.id;
    handle.register(entry).await.unwrap();
    handle.unregister(id).await.unwrap();

    assert!(rx.recv().await.is_none());

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn slow_subscriber_is_evicted_and_others_keep_receiving() {
    let cancel = CancellationToken::new();
    let (handle, task) = Hub::spawn(cancel.clone());

    // A stuck subscriber with a tiny buffer that is never read.
    let (stuck_tx, mut stuck_rx) = mpsc::channel(1);
    let stuck = SubscriberEntry {
        id: Uuid::new_v4(),
        filter: Arc::new(RwLock::new(FilterSpec::default())),
        sender: stuck_tx,
    };
    handle.register(stuck).await.unwrap();

    let (healthy, mut healthy_rx) = SubscriberEntry::new(FilterSpec::default());
    handle.register(healthy).await.unwrap();

    // First record fills the stuck buffer; the second forces the 5s
    // enqueue timeout (auto-advanced under paused time) and eviction.
    handle
        .write(record("myapp", Severity::Informational))
        .await
        .unwrap();
    handle
        .write(record("myapp", Severity::Informational))
        .await
        .unwrap();

    assert!(healthy_rx.recv().await.is_some());
    assert!(healthy_rx.recv().await.is_some());

    // Eviction dropped the stuck sender: after draining its one buffered
    // record the channel reports closed.
    assert!(stuck_rx.recv().await.is_some());
    assert!(stuck_rx.recv().await.is_none());

    // Deliveries continue unaffected after the eviction.
    handle
        .write(record("myapp", Severity::Informational))
        .await
        .unwrap();
    assert!(healthy_rx.recv().await.is_some());

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn filter_updates_take_effect_between_broadcasts() {
    let cancel = CancellationToken::new();
    let (handle, task) = Hub::spawn(cancel.clone());

    let (entry, mut rx) = SubscriberEntry::new(FilterSpec::default());
    let filter = Arc::clone(&entry.filter);
    handle.register(entry).await.unwrap();

    handle
        .write(record("myapp", Severity::Informational))
        .await
        .unwrap();
    assert!(rx.recv().await.is_some());

    // Tighten the filter the way a reader task would.
    *filter.write() = FilterSpec::new(Some(Severity::Emergency), None);

    handle
        .write(record("myapp", Severity::Informational))
        .await
        .unwrap();
    handle
        .write(record("myapp", Severity::Emergency))
        .await
        .unwrap();

    let delivered = rx.recv().await.unwrap();
    assert_eq!(delivered.severity, Severity::Emergency);

    cancel.cancel();
    task.await.unwrap();
}
