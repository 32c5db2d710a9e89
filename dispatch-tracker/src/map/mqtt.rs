/**
 * MQTT MAP - Adaptateur carte publiant chaque opération sur le bus MQTT
 *
 * RÔLE : Un client carte distant (dashboard) s'abonne au topic de commandes et
 * rejoue create/update/remove/route/fit. La scène locale reste la source de vérité
 * pour les handles et l'API GET /map.
 *
 * FONCTIONNEMENT :
 * - connect() attend le ConnAck du broker (timeout config) : sinon MapError::Init
 * - les clics remontent sur le topic click : {"handle": 3}
 *
 * COUPURE BROKER : les commandes s'accumulent dans la file du client (queue_capacity).
 * File pleine -> try_publish échoue -> MapError::Publish, ce qui arrête la sync carte
 * pour la session. Une sync émet 3 à 7 commandes : à 5s de poll, 4096 tiennent entre
 * ~50 min et ~2 h de coupure, une coupure courte n'est donc pas fatale.
 */

use super::scene::{SceneMap, SceneReader};
use super::{Bounds, MapError, MapProvider, MarkerClickCallback, MarkerHandle, MarkerInfo, MarkerRole, RouteHandle};
use crate::config::MapConf;
use crate::models::LatLng;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Commandes publiées vers le client carte
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MapCommand {
    CreateMarker {
        handle: MarkerHandle,
        role: MarkerRole,
        position: LatLng,
        info: MarkerInfo,
    },
    UpdateMarker {
        handle: MarkerHandle,
        position: LatLng,
    },
    UpdateMarkerInfo {
        handle: MarkerHandle,
        info: MarkerInfo,
    },
    RemoveMarker {
        handle: MarkerHandle,
    },
    DrawRoute {
        handle: RouteHandle,
        path: Vec<LatLng>,
    },
    RemoveRoute {
        handle: RouteHandle,
    },
    FitBounds {
        bounds: Bounds,
    },
}

#[derive(Debug, Deserialize)]
struct MarkerClickIn {
    handle: MarkerHandle,
}

pub struct MqttMap {
    scene: SceneMap,
    client: AsyncClient,
    command_topic: String,
    eventloop_task: JoinHandle<()>,
}

impl MqttMap {
    pub async fn connect(conf: &MapConf) -> Result<Self, MapError> {
        let mqtt = &conf.mqtt;
        let client_id = format!("dispatch-map-{}", uuid::Uuid::new_v4());
        let mut opts = MqttOptions::new(client_id, &mqtt.host, mqtt.port);
        opts.set_keep_alive(Duration::from_secs(15));

        let (client, mut eventloop) = AsyncClient::new(opts, mqtt.queue_capacity.max(1));
        let scene = SceneMap::new();
        let reader = scene.reader();
        let click_topic = mqtt.click_topic.clone();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

        let eventloop_task = tokio::spawn(async move {
            let mut ready_tx = Some(ready_tx);
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                        let result = if ack.code == ConnectReturnCode::Success {
                            Ok(())
                        } else {
                            Err(format!("broker refused connection: {:?}", ack.code))
                        };
                        if let Some(tx) = ready_tx.take() {
                            let _ = tx.send(result);
                        }
                    }
                    Ok(Event::Incoming(Incoming::Publish(p))) if p.topic == click_topic => {
                        handle_click(&reader, &p.payload);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if let Some(tx) = ready_tx.take() {
                            let _ = tx.send(Err(e.to_string()));
                            return;
                        }
                        warn!("[map] MQTT error: {:?}", e);
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });

        let init_timeout = Duration::from_millis(conf.init_timeout_ms);
        let outcome = match tokio::time::timeout(init_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(reason),
            Ok(Err(_)) => Err("event loop ended before ConnAck".to_string()),
            Err(_) => Err(format!("no ConnAck within {}ms", conf.init_timeout_ms)),
        };
        if let Err(reason) = outcome {
            eventloop_task.abort();
            return Err(MapError::Init(format!("{}:{} - {}", mqtt.host, mqtt.port, reason)));
        }

        client
            .subscribe(mqtt.click_topic.as_str(), QoS::AtLeastOnce)
            .await
            .map_err(|e| MapError::Init(e.to_string()))?;

        info!("[map] connected to MQTT {}:{}, publishing on {}", mqtt.host, mqtt.port, mqtt.command_topic);
        Ok(Self {
            scene,
            client,
            command_topic: mqtt.command_topic.clone(),
            eventloop_task,
        })
    }

    pub fn reader(&self) -> SceneReader {
        self.scene.reader()
    }

    fn publish(&self, command: &MapCommand) -> Result<(), MapError> {
        let payload = serde_json::to_vec(command).map_err(|e| MapError::Publish(e.to_string()))?;
        self.client
            .try_publish(self.command_topic.as_str(), QoS::AtLeastOnce, false, payload)
            .map_err(|e| MapError::Publish(e.to_string()))
    }
}

impl Drop for MqttMap {
    fn drop(&mut self) {
        self.eventloop_task.abort();
    }
}

fn handle_click(reader: &SceneReader, payload: &[u8]) {
    match serde_json::from_slice::<MarkerClickIn>(payload) {
        Ok(click) => {
            if let Err(e) = reader.click(click.handle) {
                debug!("[map] click ignored: {}", e);
            }
        }
        Err(e) => warn!("[map] invalid click payload: {}", e),
    }
}

impl MapProvider for MqttMap {
    fn create_marker(&mut self, role: MarkerRole, position: LatLng, info: &MarkerInfo) -> Result<MarkerHandle, MapError> {
        let handle = self.scene.create_marker(role, position, info)?;
        self.publish(&MapCommand::CreateMarker {
            handle,
            role,
            position,
            info: info.clone(),
        })?;
        Ok(handle)
    }

    fn update_marker_position(&mut self, handle: MarkerHandle, position: LatLng) -> Result<(), MapError> {
        self.scene.update_marker_position(handle, position)?;
        self.publish(&MapCommand::UpdateMarker { handle, position })
    }

    fn update_marker_info(&mut self, handle: MarkerHandle, info: &MarkerInfo) -> Result<(), MapError> {
        self.scene.update_marker_info(handle, info)?;
        self.publish(&MapCommand::UpdateMarkerInfo { handle, info: info.clone() })
    }

    fn remove_marker(&mut self, handle: MarkerHandle) -> Result<(), MapError> {
        self.scene.remove_marker(handle)?;
        self.publish(&MapCommand::RemoveMarker { handle })
    }

    fn draw_route(&mut self, path: &[LatLng]) -> Result<RouteHandle, MapError> {
        let handle = self.scene.draw_route(path)?;
        self.publish(&MapCommand::DrawRoute { handle, path: path.to_vec() })?;
        Ok(handle)
    }

    fn remove_route(&mut self, handle: RouteHandle) -> Result<(), MapError> {
        self.scene.remove_route(handle)?;
        self.publish(&MapCommand::RemoveRoute { handle })
    }

    fn fit_bounds(&mut self, positions: &[LatLng]) -> Result<(), MapError> {
        self.scene.fit_bounds(positions)?;
        match Bounds::from_points(positions) {
            Some(bounds) => self.publish(&MapCommand::FitBounds { bounds }),
            None => Ok(()),
        }
    }

    fn on_marker_click(&mut self, handle: MarkerHandle, callback: MarkerClickCallback) -> Result<(), MapError> {
        self.scene.on_marker_click(handle, callback)
    }
}
