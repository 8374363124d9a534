//! Scénarios de bout en bout sur l'évaluateur : dédup par épisode, réarmement,
//! seuil inclusif, lectures absentes, rétention et persistance.

use binwatch_devkit::{RecordingNotifier, TestHarness};
use binwatch_kernel::evaluator::PassKind;
use binwatch_kernel::models::{AlertState, Transition};
use binwatch_kernel::notify::{spawn_dispatcher, AlertMessage, Outbox};
use binwatch_kernel::registry::RegistryError;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

const T0: OffsetDateTime = datetime!(2026-09-01 06:00 UTC);

#[tokio::test]
async fn sustained_alarm_notifies_once() {
    let mut h = TestHarness::new();
    h.register("B1", 12.97, 77.59).await.unwrap();
    h.script("B1", &[Some(90), Some(92), Some(88)]);

    for i in 0..3 {
        h.pass(PassKind::Alerts, T0 + Duration::minutes(i)).await;
    }

    let alerts = h.expect_alerts(1).unwrap();
    assert_eq!(alerts[0].percent_full, 90);
    let history = h.history(T0).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].fired_at, T0);
}

#[tokio::test]
async fn drop_below_threshold_rearms_episode() {
    let mut h = TestHarness::new();
    h.register("B1", 0.0, 0.0).await.unwrap();
    h.script("B1", &[Some(90), Some(80), Some(95)]);

    let mut fired_at = Vec::new();
    for i in 0..3 {
        let at = T0 + Duration::hours(i);
        let report = h.pass(PassKind::Levels, at).await;
        if report.bins[0].transition == Transition::Opened {
            fired_at.push(i);
        }
    }

    assert_eq!(fired_at, vec![0, 2]);
    assert_eq!(h.expect_alerts(2).unwrap().len(), 2);
    let levels: Vec<u8> = h.history(T0 + Duration::hours(3)).await.iter().map(|r| r.percent_full).collect();
    assert_eq!(levels, vec![90, 95]);
}

#[tokio::test]
async fn threshold_boundary_is_inclusive() {
    let mut h = TestHarness::new();
    h.register("AT85", 0.0, 0.0).await.unwrap();
    h.register("AT84", 0.0, 0.0).await.unwrap();
    h.script("AT85", &[Some(85)]);
    h.script("AT84", &[Some(84)]);

    let report = h.pass(PassKind::Levels, T0).await;

    assert_eq!(report.bins.len(), 2);
    assert!(report.bins[0].alerting);
    assert!(!report.bins[1].alerting);
    assert!(h.state("AT85").await.is_alerted());
    assert_eq!(h.state("AT84").await, AlertState::Clear);
    assert_eq!(h.expect_alerts(1).unwrap()[0].bin_id, "AT85");
}

#[tokio::test]
async fn absent_reading_is_neutral() {
    let mut h = TestHarness::new();
    h.register("B1", 0.0, 0.0).await.unwrap();
    h.script("B1", &[Some(90), None, Some(93)]);

    h.pass(PassKind::Alerts, T0).await;
    let before = h.state("B1").await;

    let report = h.pass(PassKind::Alerts, T0 + Duration::minutes(5)).await;
    assert!(report.bins.is_empty());
    assert_eq!(report.unavailable, vec!["B1".to_string()]);
    assert_eq!(h.state("B1").await, before);

    h.pass(PassKind::Alerts, T0 + Duration::minutes(10)).await;
    assert_eq!(h.expect_alerts(1).unwrap().len(), 1);
    assert_eq!(h.history(T0).await.len(), 1);
}

#[tokio::test]
async fn one_bin_outage_does_not_abort_pass() {
    let mut h = TestHarness::new();
    for id in ["A", "B", "C"] {
        h.register(id, 0.0, 0.0).await.unwrap();
    }
    h.script("A", &[Some(99)]);
    h.script("B", &[None]);
    h.script("C", &[Some(86)]);

    let report = h.pass(PassKind::Alerts, T0).await;

    assert_eq!(h.source.calls(), vec!["A", "B", "C"]);
    let shown: Vec<&str> = report.bins.iter().map(|b| b.bin_id.as_str()).collect();
    assert_eq!(shown, vec!["A", "C"]);
    assert_eq!(report.unavailable, vec!["B".to_string()]);
    assert_eq!(h.expect_alerts(2).unwrap().len(), 2);
}

#[tokio::test]
async fn alerts_pass_hides_bins_below_threshold_but_clears_them() {
    let mut h = TestHarness::new();
    h.register("B1", 0.0, 0.0).await.unwrap();
    h.script("B1", &[Some(95), Some(20), Some(96)]);

    h.pass(PassKind::Alerts, T0).await;
    let report = h.pass(PassKind::Alerts, T0 + Duration::minutes(1)).await;
    assert!(report.bins.is_empty());
    assert_eq!(h.state("B1").await, AlertState::Clear);

    h.pass(PassKind::Alerts, T0 + Duration::minutes(2)).await;
    assert_eq!(h.expect_alerts(2).unwrap().len(), 2);
}

#[tokio::test]
async fn history_retention_window() {
    let h = TestHarness::new();
    h.register("B1", 0.0, 0.0).await.unwrap();
    h.register("B2", 0.0, 0.0).await.unwrap();
    h.script("B1", &[Some(90)]);
    h.script("B2", &[None, Some(90)]);

    h.pass(PassKind::Alerts, T0).await;
    h.pass(PassKind::Alerts, T0 + Duration::days(2)).await;

    let week = Duration::days(7);
    assert_eq!(h.history(T0 + week).await.len(), 2);
    assert_eq!(h.history(T0 + week + Duration::milliseconds(1)).await.len(), 1);

    let once = h.history(T0 + week + Duration::days(1)).await;
    let twice = h.history(T0 + week + Duration::days(1)).await;
    assert_eq!(once, twice);
    assert_eq!(once[0].bin_id, "B2");
}

#[tokio::test]
async fn state_survives_restart() {
    let mut h = TestHarness::new();
    h.register("B1", 48.85, 2.35).await.unwrap();
    h.register("B2", 45.76, 4.83).await.unwrap();
    h.script("B1", &[Some(90)]);
    h.script("B2", &[Some(30)]);
    h.pass(PassKind::Levels, T0).await;
    let history_before = h.history(T0).await;

    h.reopen(T0 + Duration::hours(1)).await;

    assert_eq!(h.bin_ids().await, vec!["B1", "B2"]);
    assert!(h.state("B1").await.is_alerted());
    assert_eq!(h.state("B2").await, AlertState::Clear);
    assert_eq!(h.history(T0).await, history_before);

    // toujours dans le même épisode après redémarrage : pas de nouvelle alerte
    h.script("B1", &[Some(97)]);
    h.pass(PassKind::Alerts, T0 + Duration::hours(2)).await;
    assert_eq!(h.expect_alerts(1).unwrap().len(), 1);
}

#[tokio::test]
async fn stale_history_is_pruned_on_restart() {
    let h = TestHarness::new();
    h.register("B1", 0.0, 0.0).await.unwrap();
    h.script("B1", &[Some(90)]);
    h.pass(PassKind::Alerts, T0).await;

    h.reopen(T0 + Duration::days(30)).await;
    assert!(h.history(T0 + Duration::days(30)).await.is_empty());
}

#[tokio::test]
async fn registry_rejects_duplicates_and_unknown_ids() {
    let h = TestHarness::new();
    h.register("B1", 0.0, 0.0).await.unwrap();

    assert!(matches!(h.register("B1", 1.0, 1.0).await, Err(RegistryError::DuplicateId(_))));
    assert!(matches!(
        h.evaluator.lock().await.remove_bin("ghost"),
        Err(RegistryError::NotFound(_))
    ));
    assert_eq!(h.bin_ids().await, vec!["B1"]);
}

#[tokio::test]
async fn delivery_failure_keeps_episode_fired() {
    let h = TestHarness::new();
    h.register("B1", 0.0, 0.0).await.unwrap();
    h.script("B1", &[Some(90)]);
    h.pass(PassKind::Alerts, T0).await;
    let history = h.history(T0).await;

    // rejoue le message à travers un dispatcher dont l'endpoint est en panne
    let notifier = RecordingNotifier::failing();
    let (outbox, rx) = Outbox::channel();
    let dispatcher = spawn_dispatcher(notifier.clone(), rx, h.health.clone());
    outbox.queue(AlertMessage::from_record(&history[0]));
    drop(outbox);
    dispatcher.await.unwrap();

    assert_eq!(notifier.attempted_bins(), vec!["B1".to_string()]);
    assert_eq!(h.health.deliveries(), (0, 1));
    assert!(h.state("B1").await.is_alerted());
    assert_eq!(h.history(T0).await.len(), 1);
}
