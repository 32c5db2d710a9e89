/*!
Test Harness pour la vue live

Assemble une vue partagée, une carte enregistreuse et une source scriptée
pour rejouer des scénarios de poll complets :
- cycles appliqués à la main (`apply`) ou via le vrai PollScheduler
- assertions sur la sélection et sur les marqueurs réellement rendus
*/

use crate::map_stub::{MapOp, RecordingMap};
use crate::source_stub::ScriptedSource;
use anyhow::Result;
use dispatch_tracker::health::PollHealth;
use dispatch_tracker::map::MarkerRole;
use dispatch_tracker::models::{IncidentRecord, LatLng, Snapshot};
use dispatch_tracker::poller::{PollHandle, PollScheduler};
use dispatch_tracker::state::{new_view, SharedView};
use dispatch_tracker::view::{CycleReport, ViewStatus};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_FACILITY: &str = "facility-test";

/// Harness de test complet : vue + carte + source
pub struct TestHarness {
    pub view: SharedView,
    pub map: RecordingMap,
    pub source: ScriptedSource,
    pub health: PollHealth,
}

impl TestHarness {
    /// Vue avec carte déjà attachée
    pub fn new() -> Self {
        let harness = Self::without_map();
        harness.view.lock().attach_map(Box::new(harness.map.clone()));
        harness
    }

    /// Vue dont la carte n'est pas (encore) prête
    pub fn without_map() -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        Self {
            view: new_view(),
            map: RecordingMap::new(),
            source: ScriptedSource::new(),
            health: PollHealth::new(),
        }
    }

    pub fn attach_map(&self) {
        self.view.lock().attach_map(Box::new(self.map.clone()));
    }

    /// Applique un cycle de poll comme si le backend avait répondu `records`
    pub fn apply(&self, records: Vec<IncidentRecord>) -> Option<CycleReport> {
        self.view.lock().apply_snapshot(Snapshot::normalize(records))
    }

    /// Clic opérateur sur une ligne de la liste
    pub fn select(&self, id: &str) -> bool {
        self.view.lock().select_explicit(id)
    }

    /// Démarre le vrai scheduler sur la source scriptée, la vue en sink
    pub fn start_polling(&self, interval: Duration) -> PollHandle {
        PollScheduler::new(interval, self.health.clone()).start(
            Arc::new(self.source.clone()),
            TEST_FACILITY.to_string(),
            self.view.clone(),
        )
    }

    pub fn teardown(&self) {
        self.view.lock().teardown();
    }

    pub fn selection(&self) -> Option<String> {
        self.view.lock().selection().map(str::to_string)
    }

    pub fn status(&self) -> ViewStatus {
        self.view.lock().status()
    }

    pub fn assert_selection(&self, expected: Option<&str>) -> Result<()> {
        let actual = self.selection();
        if actual.as_deref() != expected {
            anyhow::bail!("Selection mismatch: expected {:?}, got {:?}", expected, actual);
        }
        log::info!("✅ Selection is {:?}", expected);
        Ok(())
    }

    /// Vérifie la position rendue sur la carte (pas seulement planifiée)
    pub fn assert_marker_at(&self, role: MarkerRole, expected: LatLng) -> Result<()> {
        match self.map.live_position(role) {
            Some(actual) if actual == expected => {
                log::info!("✅ {} marker at {:?}", role, expected);
                Ok(())
            }
            Some(actual) => anyhow::bail!("{} marker at {:?}, expected {:?}", role, actual, expected),
            None => anyhow::bail!("No {} marker rendered", role),
        }
    }

    pub fn assert_no_marker(&self, role: MarkerRole) -> Result<()> {
        if let Some(handle) = self.map.live_marker(role) {
            anyhow::bail!("{} marker still rendered as {}", role, handle);
        }
        Ok(())
    }

    /// Vérifie qu'aucun appel carte n'a été émis depuis le dernier `reset_calls`
    pub fn assert_map_untouched(&self) -> Result<()> {
        let calls = self.map.calls();
        if !calls.is_empty() {
            anyhow::bail!("Expected no map calls, got {:?}", calls);
        }
        Ok(())
    }

    pub fn assert_op_count(&self, op: MapOp, expected: usize) -> Result<()> {
        let actual = self.map.count(op);
        if actual != expected {
            anyhow::bail!("{:?}: expected {} calls, got {}", op, expected, actual);
        }
        Ok(())
    }

    pub fn reset_calls(&self) {
        self.map.clear();
        log::info!("🧹 Map call log reset");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
