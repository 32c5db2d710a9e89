/**
 * TRACKER VIEW - État de la vue live : dernier snapshot, sélection, overlays
 *
 * RÔLE :
 * Compose les étapes d'un cycle de poll : diff -> réconciliation -> plan -> sync.
 * Partagée derrière un seul Mutex (SharedView) : un cycle de poll et une sélection
 * explicite ne s'entrelacent jamais.
 *
 * CYCLE DE VIE :
 * - Loading   : pas encore de snapshot
 * - Live      : au moins un snapshot appliqué
 * - MapFailed : la carte n'a pas pu s'initialiser ou a échoué, sync arrêtée pour la session
 * - Closed    : teardown fait, plus aucune mutation acceptée
 */

use crate::map::{MapError, MapProvider, MarkerRole};
use crate::models::{eta_text, time_ago, IncidentRecord, IncidentStatus, Severity, Snapshot};
use crate::overlay::{plan, OverlaySpec};
use crate::poller::PollSink;
use crate::selection::{reconcile, SnapshotDiff};
use crate::source::FetchError;
use crate::state::SharedView;
use crate::sync::{OverlaySynchronizer, SyncReport};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ViewStatus {
    Loading,
    Live,
    MapFailed { reason: String },
    Closed,
}

/// Résultat d'un cycle de poll appliqué
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub diff: SnapshotDiff,
    pub selection: Option<String>,
    pub selection_changed: bool,
    pub sync: Option<SyncReport>,
}

/// Ligne de la liste des urgences, ordre serveur
#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub id: String,
    pub selected: bool,
    pub severity: Severity,
    pub severity_label: &'static str,
    pub status: IncidentStatus,
    pub status_label: &'static str,
    pub eta: Option<String>,
    pub time_ago: Option<String>,
    pub patient_name: Option<String>,
    pub hospital_name: Option<String>,
    pub driver_name: Option<String>,
    pub vehicle_number: Option<String>,
}

pub struct TrackerView {
    snapshot: Snapshot,
    received_snapshot: bool,
    selection: Option<String>,
    last_diff: SnapshotDiff,
    synchronizer: OverlaySynchronizer,
    map: Option<Box<dyn MapProvider>>,
    map_failure: Option<String>,
    last_fetch_error: Option<String>,
    closed: bool,
}

impl TrackerView {
    pub fn new() -> Self {
        Self::with_synchronizer(
            OverlaySynchronizer::new().with_click_handler(Arc::new(|role: MarkerRole| {
                info!("[view] {} marker clicked", role);
            })),
        )
    }

    pub fn with_synchronizer(synchronizer: OverlaySynchronizer) -> Self {
        Self {
            snapshot: Snapshot::default(),
            received_snapshot: false,
            selection: None,
            last_diff: SnapshotDiff::default(),
            synchronizer,
            map: None,
            map_failure: None,
            last_fetch_error: None,
            closed: false,
        }
    }

    pub fn status(&self) -> ViewStatus {
        if self.closed {
            ViewStatus::Closed
        } else if let Some(reason) = &self.map_failure {
            ViewStatus::MapFailed { reason: reason.clone() }
        } else if !self.received_snapshot {
            ViewStatus::Loading
        } else {
            ViewStatus::Live
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Carte prête : on rend immédiatement la sélection courante
    pub fn attach_map(&mut self, map: Box<dyn MapProvider>) -> Option<SyncReport> {
        if self.closed || self.map_failure.is_some() {
            return None;
        }
        self.map = Some(map);
        self.refresh_overlays()
    }

    /// Échec d'initialisation de la carte : terminal, pas de nouvelle tentative
    pub fn map_failed(&mut self, err: &MapError) {
        error!("[view] map unavailable: {}", err);
        self.map = None;
        self.map_failure = Some(err.to_string());
    }

    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> Option<CycleReport> {
        if self.closed {
            debug!("[view] snapshot ignored, view closed");
            return None;
        }

        let diff = SnapshotDiff::between(&self.snapshot, &snapshot);
        for id in &diff.added {
            info!("[view] new incident {}", id);
        }
        for id in &diff.resolved {
            info!("[view] incident {} no longer active", id);
        }

        let next = reconcile(self.selection.as_deref(), &snapshot);
        let selection_changed = next != self.selection;
        if selection_changed {
            info!("[view] selection {:?} -> {:?}", self.selection, next);
        }

        self.snapshot = snapshot;
        self.received_snapshot = true;
        self.selection = next;
        self.last_fetch_error = None;
        self.last_diff = diff.clone();

        let sync = self.refresh_overlays();
        Some(CycleReport {
            diff,
            selection: self.selection.clone(),
            selection_changed,
            sync,
        })
    }

    pub fn fetch_failed(&mut self, err: &FetchError) {
        if self.closed {
            return;
        }
        self.last_fetch_error = Some(err.to_string());
    }

    /// Sélection par l'opérateur : prioritaire, conservée tant que l'urgence reste active
    pub fn select_explicit(&mut self, id: &str) -> bool {
        if self.closed {
            return false;
        }
        if self.selection.as_deref() != Some(id) {
            info!("[view] operator selected {}", id);
            self.selection = Some(id.to_string());
            self.refresh_overlays();
        }
        true
    }

    fn refresh_overlays(&mut self) -> Option<SyncReport> {
        if self.synchronizer.is_halted() {
            return None;
        }
        let selected = self.selection.as_deref().and_then(|id| self.snapshot.get(id));
        let spec = plan(selected);
        let map = self.map.as_mut()?;
        match self.synchronizer.sync(map.as_mut(), &spec) {
            Ok(report) => Some(report),
            Err(e) => {
                self.map_failure = Some(e.to_string());
                None
            }
        }
    }

    /// Arrêt de la vue : overlays retirés, plus aucune mutation ensuite
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        if let Some(map) = self.map.as_mut() {
            self.synchronizer.teardown(map.as_mut());
        }
        self.map = None;
        self.closed = true;
        info!("[view] torn down");
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    pub fn selected_record(&self) -> Option<&IncidentRecord> {
        self.selection.as_deref().and_then(|id| self.snapshot.get(id))
    }

    pub fn overlay_spec(&self) -> OverlaySpec {
        plan(self.selected_record())
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn last_diff(&self) -> &SnapshotDiff {
        &self.last_diff
    }

    pub fn last_fetch_error(&self) -> Option<&str> {
        self.last_fetch_error.as_deref()
    }

    pub fn list_entries(&self, now: OffsetDateTime) -> Vec<ListEntry> {
        self.snapshot
            .records()
            .iter()
            .map(|r| ListEntry {
                id: r.id.clone(),
                selected: self.selection.as_deref() == Some(r.id.as_str()),
                severity: r.severity,
                severity_label: r.severity.label(),
                status: r.status,
                status_label: r.status.label(),
                eta: eta_text(r.eta_minutes),
                time_ago: r.created_at.map(|created| time_ago(created, now)),
                patient_name: r.patient_name.clone(),
                hospital_name: r.hospital_name.clone(),
                driver_name: r.driver_name.clone(),
                vehicle_number: r.vehicle_number.clone(),
            })
            .collect()
    }
}

impl Default for TrackerView {
    fn default() -> Self {
        Self::new()
    }
}

impl PollSink for SharedView {
    fn apply(&mut self, snapshot: Snapshot) {
        self.lock().apply_snapshot(snapshot);
    }

    fn fetch_failed(&mut self, error: &FetchError) {
        self.lock().fetch_failed(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::SceneMap;
    use crate::models::LatLng;
    use time::macros::datetime;

    fn record(id: &str, status: IncidentStatus, driver: Option<LatLng>) -> IncidentRecord {
        IncidentRecord {
            id: id.into(),
            severity: Severity::Critical,
            status,
            eta_minutes: Some(4.0),
            created_at: Some(datetime!(2024-05-01 10:00 UTC)),
            hospital_location: Some(LatLng::new(48.84, 2.30)),
            patient_location: Some(LatLng::new(48.87, 2.36)),
            driver_location: driver,
            hospital_name: Some("Hôtel-Dieu".into()),
            patient_name: None,
            driver_name: None,
            vehicle_number: None,
        }
    }

    fn live_view() -> (TrackerView, crate::map::SceneReader) {
        let map = SceneMap::new();
        let reader = map.reader();
        let mut view = TrackerView::new();
        view.attach_map(Box::new(map));
        (view, reader)
    }

    #[test]
    fn test_status_progression() {
        let mut view = TrackerView::new();
        assert_eq!(view.status(), ViewStatus::Loading);
        view.apply_snapshot(Snapshot::new(vec![]));
        assert_eq!(view.status(), ViewStatus::Live);
        view.teardown();
        assert_eq!(view.status(), ViewStatus::Closed);
    }

    #[test]
    fn test_driver_updated_in_place_and_new_entry_unselected() {
        let (mut view, reader) = live_view();
        let d1 = LatLng::new(48.86, 2.34);
        view.apply_snapshot(Snapshot::new(vec![record("1", IncidentStatus::Assigned, Some(d1))]));
        assert_eq!(view.selection(), Some("1"));
        let driver_before = reader.state().marker(MarkerRole::Driver).unwrap().handle;

        let d2 = LatLng::new(48.865, 2.35);
        let report = view
            .apply_snapshot(Snapshot::new(vec![
                record("1", IncidentStatus::DriverArrived, Some(d2)),
                record("2", IncidentStatus::AwaitingDriverResponse, None),
            ]))
            .unwrap();

        assert_eq!(view.selection(), Some("1"));
        assert!(!report.selection_changed);
        assert_eq!(report.diff.added, vec!["2"]);
        let sync = report.sync.unwrap();
        assert_eq!((sync.created, sync.removed, sync.updated), (0, 0, 1));

        let driver = reader.state().marker(MarkerRole::Driver).cloned().unwrap();
        assert_eq!(driver.handle, driver_before);
        assert_eq!(driver.position, d2);

        let entries = view.list_entries(datetime!(2024-05-01 10:05 UTC));
        assert_eq!(entries.len(), 2);
        assert!(entries[0].selected);
        assert!(!entries[1].selected);
        assert_eq!(entries[1].status_label, "Awaiting driver response");
        assert_eq!(entries[0].time_ago.as_deref(), Some("5 min ago"));
    }

    #[test]
    fn test_selection_falls_forward_when_incident_resolves() {
        let (mut view, _reader) = live_view();
        view.apply_snapshot(Snapshot::new(vec![
            record("1", IncidentStatus::Assigned, None),
            record("2", IncidentStatus::Assigned, None),
        ]));
        assert_eq!(view.selection(), Some("1"));

        let report = view
            .apply_snapshot(Snapshot::new(vec![record("2", IncidentStatus::Assigned, None)]))
            .unwrap();
        assert!(report.diff.was_resolved("1"));
        assert_eq!(view.selection(), Some("2"));
    }

    #[test]
    fn test_explicit_selection_survives_next_poll() {
        let (mut view, _reader) = live_view();
        let snap = Snapshot::new(vec![
            record("1", IncidentStatus::Assigned, None),
            record("2", IncidentStatus::Assigned, None),
        ]);
        view.apply_snapshot(snap.clone());
        assert!(view.select_explicit("2"));
        view.apply_snapshot(snap);
        assert_eq!(view.selection(), Some("2"));
    }

    #[test]
    fn test_empty_snapshot_clears_overlays() {
        let (mut view, reader) = live_view();
        view.apply_snapshot(Snapshot::new(vec![record("1", IncidentStatus::Assigned, Some(LatLng::new(1.0, 1.0)))]));
        assert_eq!(reader.state().markers.len(), 3);

        view.apply_snapshot(Snapshot::new(vec![]));
        assert_eq!(view.selection(), None);
        let state = reader.state();
        assert!(state.markers.is_empty());
        assert!(state.routes.is_empty());
    }

    #[test]
    fn test_fetch_failure_keeps_state() {
        let (mut view, _reader) = live_view();
        view.apply_snapshot(Snapshot::new(vec![record("1", IncidentStatus::Assigned, None)]));
        view.fetch_failed(&FetchError::Timeout(4000));
        assert_eq!(view.selection(), Some("1"));
        assert_eq!(view.snapshot().len(), 1);
        assert!(view.last_fetch_error().is_some());
    }

    #[test]
    fn test_map_failure_is_terminal() {
        let mut view = TrackerView::new();
        view.map_failed(&MapError::Init("tiles unreachable".into()));
        assert!(matches!(view.status(), ViewStatus::MapFailed { .. }));

        // la liste continue de vivre, la carte non
        let report = view
            .apply_snapshot(Snapshot::new(vec![record("1", IncidentStatus::Assigned, None)]))
            .unwrap();
        assert!(report.sync.is_none());
        assert!(view.attach_map(Box::new(SceneMap::new())).is_none());
        assert_eq!(view.selection(), Some("1"));
    }

    #[test]
    fn test_closed_view_ignores_mutations() {
        let (mut view, reader) = live_view();
        view.apply_snapshot(Snapshot::new(vec![record("1", IncidentStatus::Assigned, None)]));
        view.teardown();
        assert!(reader.state().markers.is_empty());

        assert!(view
            .apply_snapshot(Snapshot::new(vec![record("9", IncidentStatus::Assigned, None)]))
            .is_none());
        assert!(!view.select_explicit("9"));
        assert_eq!(view.selection(), Some("1"));
        assert!(reader.state().markers.is_empty());
    }
}
