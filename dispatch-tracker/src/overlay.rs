/**
 * OVERLAY PLANNER - Overlays désirés pour l'urgence sélectionnée
 *
 * Fonction pure : record sélectionné -> OverlaySpec (marqueurs, route, cadrage).
 * - un marqueur par rôle dont la position est connue
 * - route seulement si chauffeur ET hôpital sont connus :
 *   chauffeur -> patient (si connu) -> hôpital, quels que soient sévérité et statut
 * - cadrage sur exactement les positions des marqueurs inclus
 */

use crate::map::{MarkerInfo, MarkerRole};
use crate::models::{eta_text, IncidentRecord, LatLng};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerSpec {
    pub position: LatLng,
    pub info: MarkerInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverlaySpec {
    pub markers: BTreeMap<MarkerRole, MarkerSpec>,
    pub route: Option<Vec<LatLng>>,
    /// Positions à englober ; None = viewport inchangé
    pub fit_bounds: Option<Vec<LatLng>>,
}

impl OverlaySpec {
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty() && self.route.is_none()
    }
}

pub fn plan(selected: Option<&IncidentRecord>) -> OverlaySpec {
    let Some(record) = selected else {
        return OverlaySpec::default();
    };

    let mut markers = BTreeMap::new();
    if let Some(position) = record.hospital_location {
        markers.insert(MarkerRole::Hospital, MarkerSpec { position, info: hospital_info(record) });
    }
    if let Some(position) = record.patient_location {
        markers.insert(MarkerRole::Patient, MarkerSpec { position, info: patient_info(record) });
    }
    if let Some(position) = record.driver_location {
        markers.insert(MarkerRole::Driver, MarkerSpec { position, info: driver_info(record) });
    }

    let route = match (record.driver_location, record.hospital_location) {
        (Some(driver), Some(hospital)) => {
            let mut path = vec![driver];
            path.extend(record.patient_location);
            path.push(hospital);
            Some(path)
        }
        _ => None,
    };

    let fit_bounds = if markers.is_empty() {
        None
    } else {
        Some(markers.values().map(|m| m.position).collect())
    };

    OverlaySpec { markers, route, fit_bounds }
}

fn hospital_info(record: &IncidentRecord) -> MarkerInfo {
    MarkerInfo {
        title: record.hospital_name.clone().unwrap_or_else(|| "Hospital".to_string()),
        detail: None,
    }
}

fn patient_info(record: &IncidentRecord) -> MarkerInfo {
    MarkerInfo {
        title: record.patient_name.clone().unwrap_or_else(|| "Patient".to_string()),
        detail: Some(format!("{} - {}", record.severity.label(), record.status.label())),
    }
}

fn driver_info(record: &IncidentRecord) -> MarkerInfo {
    let title = match (&record.driver_name, &record.vehicle_number) {
        (Some(name), Some(vehicle)) => format!("{name} ({vehicle})"),
        (Some(name), None) => name.clone(),
        (None, Some(vehicle)) => vehicle.clone(),
        (None, None) => "Driver".to_string(),
    };
    MarkerInfo {
        title,
        detail: eta_text(record.eta_minutes).map(|eta| format!("ETA {eta}")),
    }
}
