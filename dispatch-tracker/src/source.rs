/**
 * SNAPSHOT FETCHER - Source des urgences actives
 *
 * RÔLE : un appel réseau par tick de polling -> Snapshot normalisé ou FetchError.
 * Le backend répond soit un tableau JSON brut, soit {"data": [...]}.
 * Un record illisible est ignoré (warn), les autres passent.
 *
 * ENDPOINT : GET {base_url}/facilities/{facility_id}/incidents/active
 */

use crate::config::BackendConf;
use crate::models::{IncidentRecord, Snapshot};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("Unexpected payload shape: {0}")]
    Shape(String),
    #[error("Fetch timed out after {0}ms")]
    Timeout(u64),
}

/// Contrat consommé par le Poll Scheduler
#[async_trait]
pub trait IncidentSource: Send + Sync {
    async fn fetch_active_incidents(&self, facility_id: &str) -> Result<Snapshot, FetchError>;
}

/// Décode le corps de réponse record par record : un enregistrement mal formé
/// est logué puis ignoré, il ne fait pas tomber le reste du snapshot.
pub fn parse_snapshot(body: &[u8]) -> Result<Snapshot, FetchError> {
    let items = match serde_json::from_slice::<Value>(body)? {
        Value::Array(items) => items,
        Value::Object(mut fields) => match fields.remove("data") {
            Some(Value::Array(items)) => items,
            _ => return Err(FetchError::Shape("object without a \"data\" array".into())),
        },
        other => return Err(FetchError::Shape(format!("unexpected JSON {}", json_kind(&other)))),
    };

    let total = items.len();
    let records: Vec<IncidentRecord> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<IncidentRecord>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("[source] record #{} skipped: {}", index, e);
                None
            }
        })
        .collect();
    if records.len() < total {
        warn!("[source] {} of {} records unreadable", total - records.len(), total);
    }
    Ok(Snapshot::normalize(records))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub struct HttpIncidentSource {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout_ms: u64,
}

impl HttpIncidentSource {
    pub fn new(conf: &BackendConf) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(conf.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: conf.base_url.trim_end_matches('/').to_string(),
            token: conf.token.clone(),
            timeout_ms: conf.timeout_ms,
        })
    }

    pub fn endpoint(&self, facility_id: &str) -> String {
        format!("{}/facilities/{}/incidents/active", self.base_url, facility_id)
    }
}

#[async_trait]
impl IncidentSource for HttpIncidentSource {
    async fn fetch_active_incidents(&self, facility_id: &str) -> Result<Snapshot, FetchError> {
        let url = self.endpoint(facility_id);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout_ms)
            } else {
                FetchError::Request(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let bytes = response.bytes().await?;
        let snapshot = parse_snapshot(&bytes)?;
        debug!("[source] {} active incidents from {}", snapshot.len(), url);
        Ok(snapshot)
    }
}
