/**
 * OVERLAY SYNCHRONIZER - Diff entre overlays désirés et overlays rendus
 *
 * RÔLE : seul détenteur des handles rendus (rôle -> marqueur, une route).
 * Chaque appel émet le minimum d'opérations vers le MapProvider :
 * - rôle disparu       -> remove
 * - rôle nouveau       -> create (+ listener de clic, une seule fois)
 * - position changée   -> update en place, jamais destroy/recreate
 * - bulle d'info changée -> update_marker_info, la bulle ouverte reste attachée
 * - route              -> remplacée à chaque appel si désirée, retirée sinon
 * - cadrage            -> seulement s'il reste au moins un marqueur
 *
 * Une erreur du provider est terminale : le synchroniseur s'arrête et
 * n'appelle plus jamais la carte (MapError::Halted).
 */

use crate::map::{MapError, MapProvider, MarkerHandle, MarkerInfo, MarkerRole, RouteHandle};
use crate::models::LatLng;
use crate::overlay::OverlaySpec;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub type MarkerClickHandler = Arc<dyn Fn(MarkerRole) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: u32,
    pub updated: u32,
    /// Bulles d'info rafraîchies (compté à part des déplacements)
    pub info_updated: u32,
    pub removed: u32,
    pub route_drawn: bool,
    pub route_removed: bool,
    pub bounds_fitted: bool,
}

#[derive(Debug, Clone)]
struct RenderedMarker {
    handle: MarkerHandle,
    position: LatLng,
    info: MarkerInfo,
}

pub struct OverlaySynchronizer {
    markers: BTreeMap<MarkerRole, RenderedMarker>,
    route: Option<RouteHandle>,
    halted: bool,
    on_click: Option<MarkerClickHandler>,
}

impl OverlaySynchronizer {
    pub fn new() -> Self {
        Self {
            markers: BTreeMap::new(),
            route: None,
            halted: false,
            on_click: None,
        }
    }

    pub fn with_click_handler(mut self, handler: MarkerClickHandler) -> Self {
        self.on_click = Some(handler);
        self
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn rendered_handle(&self, role: MarkerRole) -> Option<MarkerHandle> {
        self.markers.get(&role).map(|m| m.handle)
    }

    pub fn rendered_route(&self) -> Option<RouteHandle> {
        self.route
    }

    pub fn sync(&mut self, map: &mut dyn MapProvider, desired: &OverlaySpec) -> Result<SyncReport, MapError> {
        if self.halted {
            return Err(MapError::Halted);
        }
        match self.apply(map, desired) {
            Ok(report) => {
                debug!("[sync] {:?}", report);
                Ok(report)
            }
            Err(e) => {
                error!("[sync] map provider failed, halting overlay sync: {}", e);
                self.halted = true;
                Err(e)
            }
        }
    }

    fn apply(&mut self, map: &mut dyn MapProvider, desired: &OverlaySpec) -> Result<SyncReport, MapError> {
        let mut report = SyncReport::default();

        let stale: Vec<MarkerRole> = self
            .markers
            .keys()
            .filter(|role| !desired.markers.contains_key(role))
            .copied()
            .collect();
        for role in stale {
            if let Some(rendered) = self.markers.get(&role) {
                map.remove_marker(rendered.handle)?;
            }
            self.markers.remove(&role);
            report.removed += 1;
        }

        for (role, spec) in &desired.markers {
            match self.markers.get_mut(role) {
                Some(rendered) => {
                    if rendered.position != spec.position {
                        map.update_marker_position(rendered.handle, spec.position)?;
                        rendered.position = spec.position;
                        report.updated += 1;
                    }
                    if rendered.info != spec.info {
                        map.update_marker_info(rendered.handle, &spec.info)?;
                        rendered.info = spec.info.clone();
                        report.info_updated += 1;
                    }
                }
                None => {
                    let handle = map.create_marker(*role, spec.position, &spec.info)?;
                    if let Some(handler) = &self.on_click {
                        let handler = handler.clone();
                        let role = *role;
                        map.on_marker_click(handle, Box::new(move |_| handler(role)))?;
                    }
                    self.markers.insert(
                        *role,
                        RenderedMarker {
                            handle,
                            position: spec.position,
                            info: spec.info.clone(),
                        },
                    );
                    report.created += 1;
                }
            }
        }

        if let Some(old) = self.route.take() {
            map.remove_route(old)?;
            report.route_removed = true;
        }
        if let Some(path) = &desired.route {
            self.route = Some(map.draw_route(path)?);
            report.route_drawn = true;
        }

        if let Some(points) = &desired.fit_bounds {
            if !self.markers.is_empty() {
                map.fit_bounds(points)?;
                report.bounds_fitted = true;
            }
        }

        Ok(report)
    }

    /// Retire tout ce qui est rendu et rend le synchroniseur inerte
    pub fn teardown(&mut self, map: &mut dyn MapProvider) {
        if !self.halted {
            for (role, rendered) in std::mem::take(&mut self.markers) {
                if let Err(e) = map.remove_marker(rendered.handle) {
                    warn!("[sync] teardown: failed to remove {} marker: {}", role, e);
                }
            }
            if let Some(route) = self.route.take() {
                if let Err(e) = map.remove_route(route) {
                    warn!("[sync] teardown: failed to remove route: {}", e);
                }
            }
        }
        self.markers.clear();
        self.route = None;
        self.halted = true;
    }
}

impl Default for OverlaySynchronizer {
    fn default() -> Self {
        Self::new()
    }
}
