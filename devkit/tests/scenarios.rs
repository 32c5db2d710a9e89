//! Scénarios bout-en-bout : vue live + carte enregistreuse + source scriptée

use dispatch_devkit::{IncidentBuilder, MapOp, TestHarness};
use dispatch_tracker::map::MarkerRole;
use dispatch_tracker::models::{IncidentRecord, IncidentStatus, LatLng, Severity};
use dispatch_tracker::view::ViewStatus;
use std::time::Duration;

const HOSPITAL: (f64, f64) = (48.852, 2.348);
const PATIENT: (f64, f64) = (48.870, 2.360);

fn incident(id: &str, status: IncidentStatus, driver: Option<(f64, f64)>) -> IncidentRecord {
    let mut builder = IncidentBuilder::new(id)
        .severity(Severity::Critical)
        .status(status)
        .eta(6.0)
        .hospital("Hôtel-Dieu", HOSPITAL.0, HOSPITAL.1)
        .patient("Jeanne", PATIENT.0, PATIENT.1);
    if let Some((lat, lng)) = driver {
        builder = builder.driver("Marc", "AMB-12", lat, lng);
    }
    builder.build()
}

#[test]
fn scenario_driver_arrives_and_new_incident_appears() {
    let harness = TestHarness::new();
    harness.apply(vec![incident("1", IncidentStatus::Assigned, Some((48.860, 2.340)))]);
    harness.assert_selection(Some("1")).unwrap();
    let driver = harness.map.live_marker(MarkerRole::Driver).unwrap();
    harness.reset_calls();

    let report = harness
        .apply(vec![
            incident("1", IncidentStatus::DriverArrived, Some((48.869, 2.359))),
            incident("2", IncidentStatus::AwaitingDriverResponse, None),
        ])
        .unwrap();

    harness.assert_selection(Some("1")).unwrap();
    assert!(!report.selection_changed);
    assert_eq!(report.diff.added, vec!["2"]);

    // Chauffeur déplacé sur place, jamais recréé
    harness.assert_op_count(MapOp::CreateMarker, 0).unwrap();
    harness.assert_op_count(MapOp::RemoveMarker, 0).unwrap();
    harness.assert_op_count(MapOp::UpdatePosition, 1).unwrap();
    assert_eq!(harness.map.live_marker(MarkerRole::Driver), Some(driver));
    harness.assert_marker_at(MarkerRole::Driver, LatLng::new(48.869, 2.359)).unwrap();

    let entries = harness.view.lock().list_entries(time::OffsetDateTime::now_utc());
    let ids: Vec<_> = entries.iter().map(|e| (e.id.as_str(), e.selected)).collect();
    assert_eq!(ids, vec![("1", true), ("2", false)]);
}

#[test]
fn scenario_selected_incident_resolves() {
    let harness = TestHarness::new();
    harness.apply(vec![
        incident("1", IncidentStatus::Assigned, None),
        incident("2", IncidentStatus::Assigned, None),
    ]);
    harness.assert_selection(Some("1")).unwrap();

    let report = harness.apply(vec![incident("2", IncidentStatus::Assigned, None)]).unwrap();
    assert!(report.diff.was_resolved("1"));
    assert!(report.selection_changed);
    harness.assert_selection(Some("2")).unwrap();
}

#[test]
fn scenario_explicit_selection_then_poll() {
    let harness = TestHarness::new();
    let both = vec![
        incident("1", IncidentStatus::Assigned, None),
        incident("2", IncidentStatus::Assigned, None),
    ];
    harness.apply(both.clone());
    assert!(harness.select("2"));
    harness.apply(both);
    harness.assert_selection(Some("2")).unwrap();
}

#[test]
fn explicit_selection_falls_forward_when_it_resolves() {
    let harness = TestHarness::new();
    let at = |id: &str, lat: f64| {
        IncidentBuilder::new(id)
            .hospital("Hôtel-Dieu", HOSPITAL.0, HOSPITAL.1)
            .patient(id, lat, 2.36)
            .build()
    };
    harness.apply(vec![at("1", 48.861), at("2", 48.862), at("3", 48.863)]);
    assert!(harness.select("2"));
    harness.assert_marker_at(MarkerRole::Patient, LatLng::new(48.862, 2.36)).unwrap();
    let patient = harness.map.live_marker(MarkerRole::Patient).unwrap();
    harness.reset_calls();

    let report = harness.apply(vec![at("1", 48.861), at("3", 48.863)]).unwrap();
    assert_eq!(report.diff.resolved, vec!["2"]);
    assert!(report.selection_changed);
    harness.assert_selection(Some("1")).unwrap();

    // mêmes marqueurs, recadrés sur l'urgence 1
    harness.assert_op_count(MapOp::CreateMarker, 0).unwrap();
    harness.assert_op_count(MapOp::RemoveMarker, 0).unwrap();
    assert_eq!(harness.map.live_marker(MarkerRole::Patient), Some(patient));
    harness.assert_marker_at(MarkerRole::Patient, LatLng::new(48.861, 2.36)).unwrap();
    let sync = report.sync.unwrap();
    assert_eq!((sync.updated, sync.info_updated), (1, 1));
    harness.assert_op_count(MapOp::UpdateInfo, 1).unwrap();
}

#[test]
fn unchanged_snapshot_only_replaces_route() {
    let harness = TestHarness::new();
    let snapshot = vec![incident("1", IncidentStatus::Assigned, Some((48.860, 2.340)))];
    harness.apply(snapshot.clone());
    harness.assert_op_count(MapOp::CreateMarker, 3).unwrap();
    harness.reset_calls();

    harness.apply(snapshot);
    harness.assert_op_count(MapOp::CreateMarker, 0).unwrap();
    harness.assert_op_count(MapOp::RemoveMarker, 0).unwrap();
    harness.assert_op_count(MapOp::UpdatePosition, 0).unwrap();
    harness.assert_op_count(MapOp::UpdateInfo, 0).unwrap();
    harness.assert_op_count(MapOp::RemoveRoute, 1).unwrap();
    harness.assert_op_count(MapOp::DrawRoute, 1).unwrap();
    harness.assert_op_count(MapOp::FitBounds, 1).unwrap();
    assert_eq!(harness.map.live_route_count(), 1);
}

#[test]
fn switching_selection_refreshes_marker_info() {
    let harness = TestHarness::new();
    let other = IncidentBuilder::new("2")
        .hospital("Pitié-Salpêtrière", 48.838, 2.364)
        .patient("Paul", PATIENT.0, PATIENT.1)
        .build();
    harness.apply(vec![incident("1", IncidentStatus::Assigned, None), other]);
    harness.reset_calls();

    harness.select("2");
    harness.assert_op_count(MapOp::CreateMarker, 0).unwrap();
    harness.assert_op_count(MapOp::UpdatePosition, 1).unwrap();
    harness.assert_op_count(MapOp::UpdateInfo, 2).unwrap();
    harness.assert_marker_at(MarkerRole::Hospital, LatLng::new(48.838, 2.364)).unwrap();
}

#[test]
fn driver_leaving_removes_marker_and_route() {
    let harness = TestHarness::new();
    harness.apply(vec![incident("1", IncidentStatus::Assigned, Some((48.860, 2.340)))]);
    assert_eq!(harness.map.live_route_count(), 1);

    harness.apply(vec![incident("1", IncidentStatus::Assigned, None)]);
    harness.assert_no_marker(MarkerRole::Driver).unwrap();
    assert_eq!(harness.map.live_route_count(), 0);
    assert_eq!(harness.map.live_marker_count(), 2);
}

#[test]
fn provider_failure_halts_sync_for_the_session() {
    let harness = TestHarness::new();
    harness.map.fail_on(MapOp::DrawRoute);
    harness.apply(vec![incident("1", IncidentStatus::Assigned, Some((48.860, 2.340)))]);
    assert!(matches!(harness.status(), ViewStatus::MapFailed { .. }));
    harness.reset_calls();

    harness.apply(vec![incident("1", IncidentStatus::Assigned, Some((48.861, 2.341)))]);
    harness.select("1");
    harness.assert_map_untouched().unwrap();
    harness.assert_selection(Some("1")).unwrap();
}

#[test]
fn teardown_removes_everything_once() {
    let harness = TestHarness::new();
    harness.apply(vec![incident("1", IncidentStatus::Assigned, Some((48.860, 2.340)))]);
    harness.teardown();
    assert_eq!(harness.map.live_marker_count(), 0);
    assert_eq!(harness.map.live_route_count(), 0);
    assert_eq!(harness.status(), ViewStatus::Closed);

    harness.reset_calls();
    harness.teardown();
    harness.apply(vec![incident("3", IncidentStatus::Assigned, None)]);
    harness.assert_map_untouched().unwrap();
}

#[tokio::test(start_paused = true)]
async fn polling_drives_the_view() {
    let harness = TestHarness::new();
    harness
        .source
        .respond(vec![incident("1", IncidentStatus::Assigned, Some((48.860, 2.340)))])
        .respond(vec![
            incident("1", IncidentStatus::DriverArrived, Some((48.869, 2.359))),
            incident("2", IncidentStatus::AwaitingDriverResponse, None),
        ]);
    let poller = harness.start_polling(Duration::from_secs(5));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(harness.status(), ViewStatus::Live);
    harness.assert_selection(Some("1")).unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.source.calls(), 2);
    assert_eq!(harness.view.lock().snapshot().len(), 2);
    harness.assert_op_count(MapOp::CreateMarker, 3).unwrap();
    harness.assert_marker_at(MarkerRole::Driver, LatLng::new(48.869, 2.359)).unwrap();
    assert_eq!(harness.source.requested_facilities()[0], dispatch_devkit::test_utils::TEST_FACILITY);

    poller.stop().await;
    harness.teardown();
}

#[tokio::test(start_paused = true)]
async fn numeric_ids_and_sloppy_records_from_the_wire() {
    let harness = TestHarness::new();
    harness
        .source
        .respond_json(serde_json::json!([
            {"id": 1, "status": "assigned", "patientLocation": {"lat": 48.87, "lng": 2.36}},
            {"id": 2, "status": "assigned", "severity": null}
        ]))
        .respond_json(serde_json::json!([
            {"id": 1, "status": "driver_arrived", "patientLocation": {"lat": 48.87, "lng": 2.36}},
            {"id": 2, "status": "assigned", "createdAt": "not a date"},
            {"id": 3, "status": "awaiting_driver_response"}
        ]));
    let poller = harness.start_polling(Duration::from_secs(5));

    tokio::time::sleep(Duration::from_millis(10)).await;
    harness.assert_selection(Some("1")).unwrap();
    assert_eq!(harness.view.lock().snapshot().len(), 2);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let ids: Vec<String> = harness.view.lock().snapshot().records().iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec!["1", "3"]);
    assert_eq!(harness.health.report().failures, 0);
    harness.assert_selection(Some("1")).unwrap();
    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn explicit_selection_between_polls_survives() {
    let harness = TestHarness::new();
    harness.source.respond(vec![
        incident("1", IncidentStatus::Assigned, None),
        incident("2", IncidentStatus::Assigned, None),
    ]);
    let poller = harness.start_polling(Duration::from_secs(5));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(harness.select("2"));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.source.calls(), 3);
    harness.assert_selection(Some("2")).unwrap();
    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_keeps_last_snapshot_until_recovery() {
    let harness = TestHarness::new();
    harness
        .source
        .respond(vec![incident("1", IncidentStatus::Assigned, None)])
        .fail(503, "backend restarting")
        .respond(vec![incident("2", IncidentStatus::Assigned, None)]);
    let poller = harness.start_polling(Duration::from_secs(5));

    tokio::time::sleep(Duration::from_secs(6)).await;
    harness.assert_selection(Some("1")).unwrap();
    assert!(harness.view.lock().last_fetch_error().is_some());
    assert_eq!(harness.health.report().failures, 1);
    assert_eq!(harness.status(), ViewStatus::Live);

    tokio::time::sleep(Duration::from_secs(5)).await;
    harness.assert_selection(Some("2")).unwrap();
    assert!(harness.view.lock().last_fetch_error().is_none());
    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_with_fetch_in_flight_never_touches_the_map() {
    let harness = TestHarness::new();
    harness
        .source
        .respond(vec![incident("1", IncidentStatus::Assigned, Some((48.860, 2.340)))])
        .respond_after(
            Duration::from_secs(3),
            vec![incident("1", IncidentStatus::Assigned, Some((48.869, 2.359)))],
        );
    let poller = harness.start_polling(Duration::from_secs(5));

    // second fetch lancé à t=5, réponse attendue à t=8
    tokio::time::sleep(Duration::from_millis(5_500)).await;
    poller.stop().await;
    harness.teardown();
    harness.reset_calls();

    tokio::time::sleep(Duration::from_secs(10)).await;
    harness.assert_map_untouched().unwrap();
    assert_eq!(harness.source.calls(), 2);
    assert_eq!(harness.health.report().discarded_results, 1);
}

#[tokio::test(start_paused = true)]
async fn late_result_after_teardown_is_ignored() {
    let harness = TestHarness::new();
    harness
        .source
        .respond(vec![incident("1", IncidentStatus::Assigned, None)])
        .respond_after(Duration::from_secs(3), vec![incident("9", IncidentStatus::Assigned, None)]);
    let poller = harness.start_polling(Duration::from_secs(5));

    tokio::time::sleep(Duration::from_millis(5_500)).await;
    harness.teardown();
    harness.reset_calls();

    tokio::time::sleep(Duration::from_secs(4)).await;
    harness.assert_map_untouched().unwrap();
    harness.assert_selection(Some("1")).unwrap();
    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn map_ready_after_first_poll() {
    let harness = TestHarness::without_map();
    harness.source.respond(vec![incident("1", IncidentStatus::Assigned, None)]);
    let poller = harness.start_polling(Duration::from_secs(5));

    tokio::time::sleep(Duration::from_millis(10)).await;
    harness.assert_map_untouched().unwrap();

    harness.attach_map();
    harness.assert_marker_at(MarkerRole::Patient, LatLng::new(PATIENT.0, PATIENT.1)).unwrap();
    poller.stop().await;
}
