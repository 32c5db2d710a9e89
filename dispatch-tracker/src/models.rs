/**
 * MODELS - Enregistrements d'urgence tels que reçus du backend
 *
 * RÔLE : Types du domaine (IncidentRecord, Snapshot, LatLng) + normalisation
 * d'un snapshot brut avant qu'il n'entre dans la vue.
 *
 * NORMALISATION :
 * - statuts terminaux (completed, cancelled...) retirés : jamais gardés en mémoire
 * - ids dupliqués : on garde la première occurrence
 * - coordonnées invalides et ETA négatif : traités comme absents
 */

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use time::OffsetDateTime;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Severe,
    Moderate,
    Mild,
    #[serde(other)]
    Unknown,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Unknown
    }
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Severe => "Severe",
            Severity::Moderate => "Moderate",
            Severity::Mild => "Mild",
            Severity::Unknown => "Unknown",
        }
    }
}

/// Statut d'une urgence active. `Closed` n'existe que sur le fil : tout statut
/// inconnu ou terminal y tombe, et `Snapshot::normalize` retire ces records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    AwaitingDriverResponse,
    Assigned,
    DriverArrived,
    #[serde(other)]
    Closed,
}

impl IncidentStatus {
    pub fn is_live(self) -> bool {
        !matches!(self, IncidentStatus::Closed)
    }

    pub fn label(self) -> &'static str {
        match self {
            IncidentStatus::AwaitingDriverResponse => "Awaiting driver response",
            IncidentStatus::Assigned => "Driver assigned",
            IncidentStatus::DriverArrived => "Driver arrived",
            IncidentStatus::Closed => "Closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    #[serde(deserialize_with = "id_from_text_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub severity: Severity,
    pub status: IncidentStatus,
    #[serde(default)]
    pub eta_minutes: Option<f64>,
    /// Affichage seulement ("il y a ..."), absent toléré
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub hospital_location: Option<LatLng>,
    #[serde(default)]
    pub patient_location: Option<LatLng>,
    #[serde(default)]
    pub driver_location: Option<LatLng>,
    #[serde(default)]
    pub hospital_name: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub vehicle_number: Option<String>,
}

/// Le backend envoie l'id en texte ou en nombre selon la source
fn id_from_text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireId {
        Text(String),
        Number(serde_json::Number),
    }

    match WireId::deserialize(deserializer)? {
        WireId::Text(id) => Ok(id),
        WireId::Number(n) => Ok(n.to_string()),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl IncidentRecord {
    fn sanitize(mut self) -> Self {
        for slot in [
            &mut self.hospital_location,
            &mut self.patient_location,
            &mut self.driver_location,
        ] {
            if let Some(pos) = *slot {
                if !pos.is_valid() {
                    warn!("[models] incident {} has invalid coordinates {:?}, ignored", self.id, pos);
                    *slot = None;
                }
            }
        }
        if let Some(eta) = self.eta_minutes {
            if !eta.is_finite() || eta < 0.0 {
                self.eta_minutes = None;
            }
        }
        self
    }
}

/// Liste ordonnée (ordre serveur) des urgences actives issue d'un poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    records: Vec<IncidentRecord>,
}

impl Snapshot {
    pub fn new(records: Vec<IncidentRecord>) -> Self {
        Self { records }
    }

    /// Applique les règles de normalisation à une liste brute du backend
    pub fn normalize(raw: Vec<IncidentRecord>) -> Self {
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(raw.len());
        for record in raw {
            if !record.status.is_live() {
                continue;
            }
            if !seen.insert(record.id.clone()) {
                warn!("[models] duplicate incident id {} in snapshot, keeping first", record.id);
                continue;
            }
            records.push(record.sanitize());
        }
        Self { records }
    }

    pub fn records(&self) -> &[IncidentRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn first(&self) -> Option<&IncidentRecord> {
        self.records.first()
    }

    pub fn get(&self, id: &str) -> Option<&IncidentRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> HashSet<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }
}

pub fn eta_text(eta_minutes: Option<f64>) -> Option<String> {
    let eta = eta_minutes?;
    if eta < 1.0 {
        Some("<1 min".to_string())
    } else {
        Some(format!("{} min", eta.round() as u64))
    }
}

/// Texte "il y a ..." pour la liste, relatif à `now`
pub fn time_ago(created_at: OffsetDateTime, now: OffsetDateTime) -> String {
    let secs = (now - created_at).whole_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{} min ago", secs / 60),
        3_600..=86_399 => format!("{} h ago", secs / 3_600),
        _ => format!("{} d ago", secs / 86_400),
    }
}
