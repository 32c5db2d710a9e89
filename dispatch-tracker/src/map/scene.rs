/**
 * SCENE MAP - Carte en mémoire
 *
 * RÔLE :
 * Garde exactement ce qu'un moteur cartographique afficherait (marqueurs, tracé,
 * viewport, bulle d'info ouverte) pour que la couche HTTP et les tests l'inspectent.
 */

use super::{Bounds, MapError, MapProvider, MarkerClickCallback, MarkerHandle, MarkerInfo, MarkerRole, RouteHandle};
use crate::models::LatLng;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneMarker {
    pub handle: MarkerHandle,
    pub role: MarkerRole,
    pub position: LatLng,
    pub info: MarkerInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneRoute {
    pub handle: RouteHandle,
    pub path: Vec<LatLng>,
}

/// Compteurs d'opérations reçues, utiles pour vérifier les diffs minimaux
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OpCounters {
    pub markers_created: u32,
    pub markers_updated: u32,
    pub markers_removed: u32,
    pub routes_drawn: u32,
    pub routes_removed: u32,
    pub bounds_fitted: u32,
}

/// Vue sérialisable de la scène (GET /map)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SceneState {
    pub markers: Vec<SceneMarker>,
    pub routes: Vec<SceneRoute>,
    pub viewport: Option<Bounds>,
    pub open_popup: Option<MarkerHandle>,
    pub ops: OpCounters,
}

impl SceneState {
    pub fn marker(&self, role: MarkerRole) -> Option<&SceneMarker> {
        self.markers.iter().find(|m| m.role == role)
    }
}

type SharedCallback = Arc<dyn Fn(MarkerHandle) + Send + Sync>;

#[derive(Default)]
struct SceneInner {
    next_id: u64,
    markers: BTreeMap<MarkerHandle, SceneMarker>,
    routes: BTreeMap<RouteHandle, SceneRoute>,
    viewport: Option<Bounds>,
    open_popup: Option<MarkerHandle>,
    click_listeners: HashMap<MarkerHandle, SharedCallback>,
    ops: OpCounters,
}

impl SceneInner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn state(&self) -> SceneState {
        SceneState {
            markers: self.markers.values().cloned().collect(),
            routes: self.routes.values().cloned().collect(),
            viewport: self.viewport,
            open_popup: self.open_popup,
            ops: self.ops,
        }
    }
}

pub struct SceneMap {
    inner: Arc<Mutex<SceneInner>>,
}

/// Accès en lecture (et clic simulé) à une scène détenue par la vue
#[derive(Clone)]
pub struct SceneReader {
    inner: Arc<Mutex<SceneInner>>,
}

impl SceneMap {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SceneInner::default())),
        }
    }

    pub fn reader(&self) -> SceneReader {
        SceneReader {
            inner: self.inner.clone(),
        }
    }
}

impl Default for SceneMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneReader {
    pub fn state(&self) -> SceneState {
        self.inner.lock().state()
    }

    /// Clic sur un marqueur : ouvre sa bulle d'info puis notifie le listener.
    /// Le listener est appelé hors verrou.
    pub fn click(&self, handle: MarkerHandle) -> Result<(), MapError> {
        let listener = {
            let mut inner = self.inner.lock();
            if !inner.markers.contains_key(&handle) {
                return Err(MapError::UnknownMarker(handle));
            }
            inner.open_popup = Some(handle);
            inner.click_listeners.get(&handle).cloned()
        };
        if let Some(listener) = listener {
            listener(handle);
        }
        Ok(())
    }

    pub fn close_popup(&self) {
        self.inner.lock().open_popup = None;
    }
}

impl MapProvider for SceneMap {
    fn create_marker(&mut self, role: MarkerRole, position: LatLng, info: &MarkerInfo) -> Result<MarkerHandle, MapError> {
        let mut inner = self.inner.lock();
        let handle = MarkerHandle(inner.next_id());
        inner.markers.insert(handle, SceneMarker { handle, role, position, info: info.clone() });
        inner.ops.markers_created += 1;
        Ok(handle)
    }

    fn update_marker_position(&mut self, handle: MarkerHandle, position: LatLng) -> Result<(), MapError> {
        let mut inner = self.inner.lock();
        let marker = inner.markers.get_mut(&handle).ok_or(MapError::UnknownMarker(handle))?;
        marker.position = position;
        inner.ops.markers_updated += 1;
        Ok(())
    }

    fn update_marker_info(&mut self, handle: MarkerHandle, info: &MarkerInfo) -> Result<(), MapError> {
        let mut inner = self.inner.lock();
        let marker = inner.markers.get_mut(&handle).ok_or(MapError::UnknownMarker(handle))?;
        marker.info = info.clone();
        Ok(())
    }

    fn remove_marker(&mut self, handle: MarkerHandle) -> Result<(), MapError> {
        let mut inner = self.inner.lock();
        inner.markers.remove(&handle).ok_or(MapError::UnknownMarker(handle))?;
        inner.click_listeners.remove(&handle);
        if inner.open_popup == Some(handle) {
            inner.open_popup = None;
        }
        inner.ops.markers_removed += 1;
        Ok(())
    }

    fn draw_route(&mut self, path: &[LatLng]) -> Result<RouteHandle, MapError> {
        let mut inner = self.inner.lock();
        let handle = RouteHandle(inner.next_id());
        inner.routes.insert(handle, SceneRoute { handle, path: path.to_vec() });
        inner.ops.routes_drawn += 1;
        Ok(handle)
    }

    fn remove_route(&mut self, handle: RouteHandle) -> Result<(), MapError> {
        let mut inner = self.inner.lock();
        inner.routes.remove(&handle).ok_or(MapError::UnknownRoute(handle))?;
        inner.ops.routes_removed += 1;
        Ok(())
    }

    fn fit_bounds(&mut self, positions: &[LatLng]) -> Result<(), MapError> {
        let mut inner = self.inner.lock();
        if let Some(bounds) = Bounds::from_points(positions) {
            inner.viewport = Some(bounds);
        }
        inner.ops.bounds_fitted += 1;
        Ok(())
    }

    fn on_marker_click(&mut self, handle: MarkerHandle, callback: MarkerClickCallback) -> Result<(), MapError> {
        let mut inner = self.inner.lock();
        if !inner.markers.contains_key(&handle) {
            return Err(MapError::UnknownMarker(handle));
        }
        inner.click_listeners.insert(handle, Arc::from(callback));
        Ok(())
    }
}
