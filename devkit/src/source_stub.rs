/*!
Source d'urgences scriptée

Remplace le backend HTTP dans les tests : chaque appel consomme la prochaine
réponse de la file (avec une latence optionnelle). File vide = la dernière
réponse est rejouée, comme un backend dont l'état ne bouge plus.
*/

use async_trait::async_trait;
use dispatch_tracker::models::{IncidentRecord, IncidentStatus, LatLng, Severity, Snapshot};
use dispatch_tracker::source::{parse_snapshot, FetchError, IncidentSource};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::macros::datetime;
use time::OffsetDateTime;

#[derive(Debug, Clone)]
enum Response {
    Records(Vec<IncidentRecord>),
    Body(Vec<u8>),
    Failure { status: u16, body: String },
}

#[derive(Debug, Clone)]
struct Step {
    response: Response,
    delay: Duration,
}

#[derive(Default)]
struct Script {
    queue: VecDeque<Step>,
    last: Option<Step>,
}

#[derive(Default)]
struct Inner {
    script: Mutex<Script>,
    calls: AtomicU32,
    facilities: Mutex<Vec<String>>,
}

/// Les clones partagent la même file et les mêmes compteurs
#[derive(Clone, Default)]
pub struct ScriptedSource {
    inner: Arc<Inner>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajoute une réponse réussie (liste brute, normalisée à la lecture)
    pub fn respond(&self, records: Vec<IncidentRecord>) -> &Self {
        self.push(Response::Records(records), Duration::ZERO)
    }

    pub fn respond_after(&self, delay: Duration, records: Vec<IncidentRecord>) -> &Self {
        self.push(Response::Records(records), delay)
    }

    /// Ajoute un corps JSON brut, décodé comme le ferait le client HTTP
    pub fn respond_json(&self, body: serde_json::Value) -> &Self {
        self.push(Response::Body(body.to_string().into_bytes()), Duration::ZERO)
    }

    /// Ajoute une réponse en erreur HTTP
    pub fn fail(&self, status: u16, body: &str) -> &Self {
        self.push(Response::Failure { status, body: body.to_string() }, Duration::ZERO)
    }

    fn push(&self, response: Response, delay: Duration) -> &Self {
        self.inner.script.lock().queue.push_back(Step { response, delay });
        self
    }

    pub fn calls(&self) -> u32 {
        self.inner.calls.load(Ordering::SeqCst)
    }

    pub fn requested_facilities(&self) -> Vec<String> {
        self.inner.facilities.lock().clone()
    }

    pub fn pending(&self) -> usize {
        self.inner.script.lock().queue.len()
    }

    fn next_step(&self) -> Option<Step> {
        let mut script = self.inner.script.lock();
        match script.queue.pop_front() {
            Some(step) => {
                script.last = Some(step.clone());
                Some(step)
            }
            None => script.last.clone(),
        }
    }
}

#[async_trait]
impl IncidentSource for ScriptedSource {
    async fn fetch_active_incidents(&self, facility_id: &str) -> Result<Snapshot, FetchError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.facilities.lock().push(facility_id.to_string());

        // Le verrou est relâché avant l'attente
        let Some(step) = self.next_step() else {
            return Ok(Snapshot::default());
        };
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        match step.response {
            Response::Records(records) => {
                log::debug!("📥 [MOCK] serving {} incidents for {}", records.len(), facility_id);
                Ok(Snapshot::normalize(records))
            }
            Response::Body(bytes) => {
                log::debug!("📥 [MOCK] serving {} raw bytes for {}", bytes.len(), facility_id);
                parse_snapshot(&bytes)
            }
            Response::Failure { status, body } => {
                log::debug!("💥 [MOCK] serving HTTP {} for {}", status, facility_id);
                Err(FetchError::Status { status, body })
            }
        }
    }
}

/// Construction fluide d'un IncidentRecord pour les tests
#[derive(Debug, Clone)]
pub struct IncidentBuilder {
    record: IncidentRecord,
}

impl IncidentBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            record: IncidentRecord {
                id: id.to_string(),
                severity: Severity::Moderate,
                status: IncidentStatus::Assigned,
                eta_minutes: None,
                created_at: Some(datetime!(2024-05-01 10:00 UTC)),
                hospital_location: None,
                patient_location: None,
                driver_location: None,
                hospital_name: None,
                patient_name: None,
                driver_name: None,
                vehicle_number: None,
            },
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.record.severity = severity;
        self
    }

    pub fn status(mut self, status: IncidentStatus) -> Self {
        self.record.status = status;
        self
    }

    pub fn eta(mut self, minutes: f64) -> Self {
        self.record.eta_minutes = Some(minutes);
        self
    }

    pub fn created_at(mut self, at: OffsetDateTime) -> Self {
        self.record.created_at = Some(at);
        self
    }

    pub fn hospital(mut self, name: &str, lat: f64, lng: f64) -> Self {
        self.record.hospital_name = Some(name.to_string());
        self.record.hospital_location = Some(LatLng::new(lat, lng));
        self
    }

    pub fn patient(mut self, name: &str, lat: f64, lng: f64) -> Self {
        self.record.patient_name = Some(name.to_string());
        self.record.patient_location = Some(LatLng::new(lat, lng));
        self
    }

    pub fn driver(mut self, name: &str, vehicle: &str, lat: f64, lng: f64) -> Self {
        self.record.driver_name = Some(name.to_string());
        self.record.vehicle_number = Some(vehicle.to_string());
        self.record.driver_location = Some(LatLng::new(lat, lng));
        self
    }

    /// Déplace le chauffeur sans toucher à son identité
    pub fn driver_at(mut self, lat: f64, lng: f64) -> Self {
        self.record.driver_location = Some(LatLng::new(lat, lng));
        self
    }

    pub fn build(self) -> IncidentRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_replays_last_response() {
        let source = ScriptedSource::new();
        source
            .respond(vec![IncidentBuilder::new("a").build()])
            .fail(503, "maintenance");

        assert_eq!(source.fetch_active_incidents("fac").await.unwrap().len(), 1);
        assert!(matches!(
            source.fetch_active_incidents("fac").await,
            Err(FetchError::Status { status: 503, .. })
        ));
        assert!(source.fetch_active_incidents("fac").await.is_err());
        assert_eq!(source.calls(), 3);
        assert_eq!(source.pending(), 0);
        assert_eq!(source.requested_facilities(), vec!["fac", "fac", "fac"]);
    }

    #[tokio::test]
    async fn test_empty_script_yields_empty_snapshot() {
        let source = ScriptedSource::new();
        assert!(source.fetch_active_incidents("fac").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_responses_are_normalized() {
        let source = ScriptedSource::new();
        source.respond(vec![
            IncidentBuilder::new("a").build(),
            IncidentBuilder::new("a").build(),
            IncidentBuilder::new("b").status(IncidentStatus::Closed).build(),
        ]);
        let snapshot = source.fetch_active_incidents("fac").await.unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_raw_json_goes_through_the_wire_decoder() {
        let source = ScriptedSource::new();
        source.respond_json(serde_json::json!({
            "data": [
                {"id": 1, "status": "assigned", "severity": null},
                {"id": 2, "status": "awaiting_driver_response", "createdAt": "2024-05-01T10:00:00Z"},
                {"id": 3}
            ]
        }));
        let snapshot = source.fetch_active_incidents("fac").await.unwrap();
        let ids: Vec<&str> = snapshot.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(snapshot.get("1").unwrap().severity, Severity::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_response() {
        let source = ScriptedSource::new();
        source.respond_after(Duration::from_secs(3), vec![IncidentBuilder::new("a").build()]);

        let started = tokio::time::Instant::now();
        let snapshot = source.fetch_active_incidents("fac").await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
