/**
 * DISPATCH TRACKER - Point d'entrée de la vue live des urgences
 *
 * RÔLE : Orchestration : config, source backend, carte, polling, HTTP.
 * Arrêt propre sur Ctrl-C : polling stoppé puis vue démontée, aucune mutation après.
 *
 * ARCHITECTURE : Poll 5s -> réconciliation sélection -> plan overlays -> sync carte.
 */

use anyhow::{Context, Result};
use dispatch_tracker::config::load_config;
use dispatch_tracker::health::PollHealth;
use dispatch_tracker::http::{build_router, AppState};
use dispatch_tracker::map::init_map;
use dispatch_tracker::poller::PollScheduler;
use dispatch_tracker::source::{HttpIncidentSource, IncidentSource};
use dispatch_tracker::state::new_view;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dispatch_tracker=info")),
        )
        .init();

    let cfg = load_config().await;
    cfg.validate().context("invalid tracker configuration")?;

    let source: Arc<dyn IncidentSource> =
        Arc::new(HttpIncidentSource::new(&cfg.backend).context("failed to build backend client")?);

    let view = new_view();

    // carte : un échec est terminal pour la vue, la liste continue d'être pollée
    let scene = match init_map(&cfg.map).await {
        Ok((map, reader)) => {
            view.lock().attach_map(map);
            info!("[tracker] map ready ({:?})", cfg.map.backend);
            Some(reader)
        }
        Err(e) => {
            view.lock().map_failed(&e);
            None
        }
    };

    let health = PollHealth::new();
    let poller = PollScheduler::new(cfg.poll_interval(), health.clone())
        .start(source, cfg.facility_id.clone(), view.clone());

    let app = build_router(AppState {
        view: view.clone(),
        health,
        scene,
        facility_id: cfg.facility_id.clone(),
    });

    let listener = TcpListener::bind(&cfg.http.listen)
        .await
        .with_context(|| format!("failed to bind {}", cfg.http.listen))?;
    info!("[tracker] listening on http://{}", cfg.http.listen);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("[tracker] failed to listen for shutdown signal: {}", e);
            }
        })
        .await;

    poller.stop().await;
    view.lock().teardown();
    info!("[tracker] shutdown complete");

    served.context("http server failed")
}
