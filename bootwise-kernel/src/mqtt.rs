use crate::bridge::{RpcBridge, RpcResponse};
use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::ports::JsonStore;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, warn};

pub mod topics {
    pub const TASK_REQUEST: &str = "bootwise/tasks/request@v1";
    pub const WORKFLOW_REQUEST: &str = "bootwise/workflows/request@v1";
    pub const RPC_RESPONSE: &str = "bootwise/rpc/response@v1";
    pub const NODE_ADDED: &str = "bootwise/nodes/added@v1";
    pub const CATALOG_CREATED: &str = "bootwise/catalogs/created@v1";
    pub const SWITCH_ERROR: &str = "bootwise/profiles/switch-error@v1";
}

/// Outbound half of the bus. Implemented by the real client and by test doubles.
#[async_trait]
pub trait MqttPublisher: Send + Sync {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()>;
}

#[async_trait]
impl MqttPublisher for AsyncClient {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        self.publish(topic, QoS::AtLeastOnce, false, payload).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct CatalogCreated {
    pub node_id: String,
    #[serde(default)]
    pub source: Option<String>,
}

pub fn create_mqtt_client(cfg: &MqttConf) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));
    AsyncClient::new(opts, 64)
}

/// Routes one inbound publish. Returns false for topics nobody handles.
pub fn handle_incoming(topic: &str, payload: &[u8], bridge: &RpcBridge, store: Option<&JsonStore>) -> bool {
    match topic {
        topics::RPC_RESPONSE => {
            match serde_json::from_slice::<RpcResponse>(payload) {
                Ok(resp) => bridge.handle_response(resp),
                Err(e) => warn!(error = %e, "invalid rpc response payload"),
            }
            true
        }
        topics::CATALOG_CREATED => {
            match serde_json::from_slice::<CatalogCreated>(payload) {
                Ok(evt) => {
                    if let Some(store) = store {
                        if let Err(e) = store.record_catalog(&evt.node_id) {
                            error!(node_id = %evt.node_id, error = %e, "failed to record catalog");
                        }
                    }
                    debug!(node_id = %evt.node_id, source = ?evt.source, "catalog created");
                }
                Err(e) => warn!(error = %e, "invalid catalog event payload"),
            }
            true
        }
        _ => false,
    }
}

pub fn spawn_mqtt_listener(
    client: AsyncClient,
    mut eventloop: EventLoop,
    bridge: Arc<RpcBridge>,
    store: Option<Arc<JsonStore>>,
    health: HealthTracker,
) -> JoinHandle<()> {
    task::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    // subscriptions are lost on reconnect with a clean session
                    for topic in [topics::RPC_RESPONSE, topics::CATALOG_CREATED] {
                        if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
                            error!(topic, error = ?e, "mqtt subscribe failed");
                        }
                    }
                    health.mark_mqtt_connected();
                    info!("mqtt connected");
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    if !handle_incoming(&p.topic, &p.payload, &bridge, store.as_deref()) {
                        debug!(topic = %p.topic, "ignoring publish");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = ?e, "mqtt connection error");
                    health.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    })
}
