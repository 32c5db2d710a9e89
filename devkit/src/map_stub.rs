/*!
Carte enregistreuse pour tests sans moteur cartographique

Implémente `MapProvider` en journalisant chaque appel, pour vérifier que le
synchroniseur n'émet que le diff minimal. Une opération peut être configurée
pour échouer afin de tester l'arrêt définitif de la synchronisation.
*/

use dispatch_tracker::map::{MapError, MapProvider, MarkerClickCallback, MarkerHandle, MarkerInfo, MarkerRole, RouteHandle};
use dispatch_tracker::models::LatLng;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapOp {
    CreateMarker,
    UpdatePosition,
    UpdateInfo,
    RemoveMarker,
    DrawRoute,
    RemoveRoute,
    FitBounds,
    OnMarkerClick,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapCall {
    CreateMarker { handle: MarkerHandle, role: MarkerRole, position: LatLng },
    UpdatePosition { handle: MarkerHandle, position: LatLng },
    UpdateInfo { handle: MarkerHandle, info: MarkerInfo },
    RemoveMarker { handle: MarkerHandle },
    DrawRoute { handle: RouteHandle, path: Vec<LatLng> },
    RemoveRoute { handle: RouteHandle },
    FitBounds { positions: Vec<LatLng> },
    OnMarkerClick { handle: MarkerHandle },
}

impl MapCall {
    pub fn op(&self) -> MapOp {
        match self {
            MapCall::CreateMarker { .. } => MapOp::CreateMarker,
            MapCall::UpdatePosition { .. } => MapOp::UpdatePosition,
            MapCall::UpdateInfo { .. } => MapOp::UpdateInfo,
            MapCall::RemoveMarker { .. } => MapOp::RemoveMarker,
            MapCall::DrawRoute { .. } => MapOp::DrawRoute,
            MapCall::RemoveRoute { .. } => MapOp::RemoveRoute,
            MapCall::FitBounds { .. } => MapOp::FitBounds,
            MapCall::OnMarkerClick { .. } => MapOp::OnMarkerClick,
        }
    }
}

#[derive(Default)]
struct Recorder {
    next_id: u64,
    calls: Vec<MapCall>,
    live_markers: HashMap<MarkerHandle, (MarkerRole, LatLng)>,
    live_routes: HashSet<RouteHandle>,
    failing: HashSet<MapOp>,
}

impl Recorder {
    fn check(&self, op: MapOp) -> Result<(), MapError> {
        if self.failing.contains(&op) {
            return Err(MapError::Publish(format!("injected failure on {:?}", op)));
        }
        Ok(())
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Carte enregistreuse ; les clones partagent le même journal
#[derive(Clone, Default)]
pub struct RecordingMap {
    inner: Arc<Mutex<Recorder>>,
}

impl RecordingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fait échouer toutes les prochaines opérations `op`
    pub fn fail_on(&self, op: MapOp) {
        self.inner.lock().failing.insert(op);
    }

    pub fn calls(&self) -> Vec<MapCall> {
        self.inner.lock().calls.clone()
    }

    pub fn count(&self, op: MapOp) -> usize {
        self.inner.lock().calls.iter().filter(|c| c.op() == op).count()
    }

    pub fn total_calls(&self) -> usize {
        self.inner.lock().calls.len()
    }

    pub fn live_marker(&self, role: MarkerRole) -> Option<MarkerHandle> {
        self.inner
            .lock()
            .live_markers
            .iter()
            .find(|(_, (r, _))| *r == role)
            .map(|(h, _)| *h)
    }

    /// Position rendue du marqueur de ce rôle
    pub fn live_position(&self, role: MarkerRole) -> Option<LatLng> {
        self.inner
            .lock()
            .live_markers
            .values()
            .find(|(r, _)| *r == role)
            .map(|(_, p)| *p)
    }

    pub fn live_marker_count(&self) -> usize {
        self.inner.lock().live_markers.len()
    }

    pub fn live_route_count(&self) -> usize {
        self.inner.lock().live_routes.len()
    }

    /// Vide le journal (l'état rendu est conservé)
    pub fn clear(&self) {
        self.inner.lock().calls.clear();
    }
}

impl MapProvider for RecordingMap {
    fn create_marker(&mut self, role: MarkerRole, position: LatLng, _info: &MarkerInfo) -> Result<MarkerHandle, MapError> {
        let mut rec = self.inner.lock();
        rec.check(MapOp::CreateMarker)?;
        let handle = MarkerHandle(rec.next_id());
        rec.live_markers.insert(handle, (role, position));
        rec.calls.push(MapCall::CreateMarker { handle, role, position });
        log::debug!("🗺️ [MOCK] create {} marker {}", role, handle);
        Ok(handle)
    }

    fn update_marker_position(&mut self, handle: MarkerHandle, position: LatLng) -> Result<(), MapError> {
        let mut rec = self.inner.lock();
        rec.check(MapOp::UpdatePosition)?;
        let (_, current) = rec.live_markers.get_mut(&handle).ok_or(MapError::UnknownMarker(handle))?;
        *current = position;
        rec.calls.push(MapCall::UpdatePosition { handle, position });
        Ok(())
    }

    fn update_marker_info(&mut self, handle: MarkerHandle, info: &MarkerInfo) -> Result<(), MapError> {
        let mut rec = self.inner.lock();
        rec.check(MapOp::UpdateInfo)?;
        if !rec.live_markers.contains_key(&handle) {
            return Err(MapError::UnknownMarker(handle));
        }
        rec.calls.push(MapCall::UpdateInfo { handle, info: info.clone() });
        Ok(())
    }

    fn remove_marker(&mut self, handle: MarkerHandle) -> Result<(), MapError> {
        let mut rec = self.inner.lock();
        rec.check(MapOp::RemoveMarker)?;
        rec.live_markers.remove(&handle).ok_or(MapError::UnknownMarker(handle))?;
        rec.calls.push(MapCall::RemoveMarker { handle });
        Ok(())
    }

    fn draw_route(&mut self, path: &[LatLng]) -> Result<RouteHandle, MapError> {
        let mut rec = self.inner.lock();
        rec.check(MapOp::DrawRoute)?;
        let handle = RouteHandle(rec.next_id());
        rec.live_routes.insert(handle);
        rec.calls.push(MapCall::DrawRoute { handle, path: path.to_vec() });
        Ok(handle)
    }

    fn remove_route(&mut self, handle: RouteHandle) -> Result<(), MapError> {
        let mut rec = self.inner.lock();
        rec.check(MapOp::RemoveRoute)?;
        if !rec.live_routes.remove(&handle) {
            return Err(MapError::UnknownRoute(handle));
        }
        rec.calls.push(MapCall::RemoveRoute { handle });
        Ok(())
    }

    fn fit_bounds(&mut self, positions: &[LatLng]) -> Result<(), MapError> {
        let mut rec = self.inner.lock();
        rec.check(MapOp::FitBounds)?;
        rec.calls.push(MapCall::FitBounds { positions: positions.to_vec() });
        Ok(())
    }

    fn on_marker_click(&mut self, handle: MarkerHandle, _callback: MarkerClickCallback) -> Result<(), MapError> {
        let mut rec = self.inner.lock();
        rec.check(MapOp::OnMarkerClick)?;
        rec.calls.push(MapCall::OnMarkerClick { handle });
        Ok(())
    }
}
