/**
 * POLL SCHEDULER - Polling périodique du backend, sans chevauchement
 *
 * RÔLE : une tâche tokio qui déclenche un fetch par tick (5s par défaut, premier
 * fetch immédiat) et transmet le résultat au PollSink (la vue).
 *
 * GARANTIES :
 * - jamais deux fetch en vol : un tick pendant un fetch est ignoré (compté, pas empilé)
 * - après stop(), un résultat arrivant en retard est jeté sans toucher l'état
 * - un échec est logué puis remonté au sink ; le tick suivant retente (pas de backoff)
 */

use crate::health::PollHealth;
use crate::models::Snapshot;
use crate::source::{FetchError, IncidentSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Destinataire des résultats de poll. Appelé depuis la tâche de polling,
/// jamais deux fois en parallèle.
pub trait PollSink: Send + 'static {
    fn apply(&mut self, snapshot: Snapshot);

    fn fetch_failed(&mut self, error: &FetchError);
}

pub struct PollScheduler {
    interval: Duration,
    health: PollHealth,
}

pub struct PollHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Arrête le polling et attend la fin de la tâche.
    /// Un fetch en vol est abandonné, son résultat n'est jamais appliqué.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            error!("[poller] polling task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl PollScheduler {
    pub fn new(interval: Duration, health: PollHealth) -> Self {
        Self { interval, health }
    }

    pub fn start<S: PollSink>(self, source: Arc<dyn IncidentSource>, facility_id: String, mut sink: S) -> PollHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let PollScheduler { interval, health } = self;
        info!("[poller] polling facility {} every {}ms", facility_id, interval.as_millis());

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                health.record_tick();
                health.record_fetch_started();

                let fetch = source.fetch_active_incidents(&facility_id);
                tokio::pin!(fetch);
                let result = loop {
                    tokio::select! {
                        biased;
                        _ = stop_rx.changed() => {
                            health.record_discarded();
                            debug!("[poller] stopped with a fetch in flight, result discarded");
                            return;
                        }
                        result = &mut fetch => break result,
                        _ = ticker.tick() => {
                            health.record_tick();
                            health.record_skipped_tick();
                            debug!("[poller] tick skipped, previous fetch still outstanding");
                        }
                    }
                };

                if *stop_rx.borrow() {
                    health.record_discarded();
                    break;
                }

                match result {
                    Ok(snapshot) => {
                        health.record_success();
                        sink.apply(snapshot);
                    }
                    Err(e) => {
                        warn!("[poller] fetch failed, keeping last known snapshot: {}", e);
                        health.record_failure(&e.to_string());
                        sink.fetch_failed(&e);
                    }
                }
            }
            info!("[poller] polling stopped");
        });

        PollHandle { stop_tx, task }
    }
}
