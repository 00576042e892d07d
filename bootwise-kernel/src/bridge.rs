/**
 * RPC BRIDGE - Request/response over the MQTT bus
 *
 * ROLE:
 * The task and workflow engines only speak MQTT. The bridge gives the
 * resolver an awaitable call: publish a command carrying a request_id, park a
 * oneshot sender, and complete it when the correlated response comes back.
 *
 * OPERATION:
 * - request() registers the pending slot before publishing
 * - handle_response() is called by the MQTT listener for every response
 * - a response that does not arrive in time yields RequestTimedOut and the
 *   slot is dropped, so a late answer is logged and discarded
 */

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{KernelError, KernelResult};
use crate::mqtt::MqttPublisher;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcResponse {
    Success {
        request_id: String,
        #[serde(default)]
        data: Value,
    },
    Error {
        request_id: String,
        error: String,
    },
}

impl RpcResponse {
    pub fn request_id(&self) -> &str {
        match self {
            RpcResponse::Success { request_id, .. } | RpcResponse::Error { request_id, .. } => request_id,
        }
    }
}

pub struct RpcBridge {
    publisher: Arc<dyn MqttPublisher>,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<RpcResponse>>>>,
    timeout: Duration,
}

impl RpcBridge {
    pub fn new(publisher: Arc<dyn MqttPublisher>, timeout: Duration) -> Self {
        Self {
            publisher,
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub fn handle_response(&self, response: RpcResponse) {
        let sender = self.pending.lock().remove(response.request_id());
        match sender {
            Some(sender) => {
                let request_id = response.request_id().to_string();
                if sender.send(response).is_err() {
                    debug!(%request_id, "caller dropped before response arrived");
                }
            }
            None => warn!(request_id = %response.request_id(), "response for unknown request"),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Publishes the command built by `build` (given the fresh request id) and
    /// waits for its response.
    pub async fn request<C, F>(&self, topic: &str, build: F) -> KernelResult<Value>
    where
        C: Serialize,
        F: FnOnce(String) -> C,
    {
        let request_id = Uuid::new_v4().to_string();
        let payload = serde_json::to_vec(&build(request_id.clone()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        if let Err(e) = self.publisher.send(topic, payload).await {
            self.pending.lock().remove(&request_id);
            return Err(KernelError::upstream(format!("publish to {topic} failed: {e}")));
        }

        match timeout(self.timeout, rx).await {
            Ok(Ok(RpcResponse::Success { data, .. })) => Ok(data),
            Ok(Ok(RpcResponse::Error { error, .. })) => Err(KernelError::upstream(error)),
            Ok(Err(_)) => {
                self.pending.lock().remove(&request_id);
                Err(KernelError::upstream("response channel closed"))
            }
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(KernelError::timed_out(format!("request {request_id} on {topic} timed out")))
            }
        }
    }
}
