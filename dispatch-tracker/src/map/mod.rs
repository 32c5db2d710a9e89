/**
 * MAP - Interface étroite vers le moteur cartographique
 *
 * RÔLE :
 * Le coeur ne dessine rien lui-même : il consomme un MapProvider qui sait créer,
 * déplacer, retirer des marqueurs, tracer une route et cadrer le viewport.
 *
 * ADAPTATEURS :
 * - SceneMap : scène en mémoire (exposée via GET /map)
 * - MqttMap  : SceneMap + publication de chaque opération sur MQTT pour un client carte
 *
 * L'initialisation est asynchrone et peut échouer : l'échec est terminal pour la vue.
 */

pub mod mqtt;
pub mod scene;

use crate::config::{MapBackend, MapConf};
use crate::models::LatLng;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use mqtt::MqttMap;
pub use scene::{SceneMap, SceneReader, SceneState};

/// Rôle d'un marqueur : au plus un marqueur par rôle est rendu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerRole {
    Hospital,
    Patient,
    Driver,
}

impl MarkerRole {
    pub fn label(self) -> &'static str {
        match self {
            MarkerRole::Hospital => "hospital",
            MarkerRole::Patient => "patient",
            MarkerRole::Driver => "driver",
        }
    }
}

impl fmt::Display for MarkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Contenu de la bulle d'info d'un marqueur
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerInfo {
    pub title: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteHandle(pub u64);

impl fmt::Display for MarkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "marker#{}", self.0)
    }
}

impl fmt::Display for RouteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route#{}", self.0)
    }
}

pub type MarkerClickCallback = Box<dyn Fn(MarkerHandle) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Map initialization failed: {0}")]
    Init(String),
    #[error("Unknown marker: {0}")]
    UnknownMarker(MarkerHandle),
    #[error("Unknown route: {0}")]
    UnknownRoute(RouteHandle),
    #[error("Map command publish failed: {0}")]
    Publish(String),
    #[error("Map synchronization halted after a previous failure")]
    Halted,
}

/// Capacités consommées par le synchroniseur d'overlays
pub trait MapProvider: Send {
    fn create_marker(&mut self, role: MarkerRole, position: LatLng, info: &MarkerInfo) -> Result<MarkerHandle, MapError>;

    fn update_marker_position(&mut self, handle: MarkerHandle, position: LatLng) -> Result<(), MapError>;

    /// Remplace le contenu de la bulle d'info sans recréer le marqueur
    fn update_marker_info(&mut self, handle: MarkerHandle, info: &MarkerInfo) -> Result<(), MapError>;

    fn remove_marker(&mut self, handle: MarkerHandle) -> Result<(), MapError>;

    fn draw_route(&mut self, path: &[LatLng]) -> Result<RouteHandle, MapError>;

    fn remove_route(&mut self, handle: RouteHandle) -> Result<(), MapError>;

    fn fit_bounds(&mut self, positions: &[LatLng]) -> Result<(), MapError>;

    fn on_marker_click(&mut self, handle: MarkerHandle, callback: MarkerClickCallback) -> Result<(), MapError>;
}

/// Boîte englobante sud-ouest / nord-est
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Bounds {
    pub fn from_points(points: &[LatLng]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bounds = Bounds { south_west: *first, north_east: *first };
        for p in rest {
            bounds.south_west.lat = bounds.south_west.lat.min(p.lat);
            bounds.south_west.lng = bounds.south_west.lng.min(p.lng);
            bounds.north_east.lat = bounds.north_east.lat.max(p.lat);
            bounds.north_east.lng = bounds.north_east.lng.max(p.lng);
        }
        Some(bounds)
    }

    pub fn contains(&self, p: LatLng) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&p.lat)
            && (self.south_west.lng..=self.north_east.lng).contains(&p.lng)
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }
}

/// Initialise l'adaptateur carte choisi en config.
/// Retourne le provider et un lecteur de la scène pour l'API HTTP.
pub async fn init_map(conf: &MapConf) -> Result<(Box<dyn MapProvider>, SceneReader), MapError> {
    match conf.backend {
        MapBackend::Scene => {
            let scene = SceneMap::new();
            let reader = scene.reader();
            Ok((Box::new(scene), reader))
        }
        MapBackend::Mqtt => {
            let map = MqttMap::connect(conf).await?;
            let reader = map.reader();
            Ok((Box::new(map), reader))
        }
    }
}
