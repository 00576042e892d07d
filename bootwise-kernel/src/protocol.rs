//! Contracts with the external task/workflow engine and the event bus, plus
//! their MQTT-backed implementations.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::debug;

use crate::bridge::RpcBridge;
use crate::error::{KernelError, KernelResult};
use crate::models::{DiscoveryConfiguration, Node, NodeEvent, TaskGraphInstance};
use crate::mqtt::{topics, MqttPublisher};

#[async_trait]
pub trait TaskProtocol: Send + Sync {
    /// Profile the active task wants the node to boot, if it has chosen one.
    async fn request_profile(&self, node_id: &str) -> KernelResult<Option<String>>;

    async fn request_properties(&self, node_id: &str) -> KernelResult<Value>;

    /// Succeeds when a task is currently running against the node.
    async fn active_task_exists(&self, node_id: &str) -> KernelResult<()>;
}

#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    /// `lock_target` is the node the new graph should be nested under; `None`
    /// submits an independent graph that takes its own lock.
    async fn create_and_run_graph(
        &self,
        config: DiscoveryConfiguration,
        lock_target: Option<String>,
    ) -> KernelResult<()>;

    async fn find_active_graph_for_target(&self, node_id: &str) -> KernelResult<Option<TaskGraphInstance>>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_node_event(&self, node: &Node, event: NodeEvent) -> KernelResult<()>;

    /// Forwards a failure report sent by a switch task runner.
    async fn publish_switch_error(&self, report: &Value) -> KernelResult<()>;
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum TaskCommand<'a> {
    RequestProfile { request_id: String, node_id: &'a str },
    RequestProperties { request_id: String, node_id: &'a str },
    ActiveTaskExists { request_id: String, node_id: &'a str },
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum WorkflowCommand<'a> {
    RunGraph {
        request_id: String,
        graph: &'a DiscoveryConfiguration,
        lock_target: Option<&'a str>,
    },
    FindActiveGraph { request_id: String, node_id: &'a str },
}

pub struct MqttTaskProtocol {
    bridge: Arc<RpcBridge>,
}

impl MqttTaskProtocol {
    pub fn new(bridge: Arc<RpcBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl TaskProtocol for MqttTaskProtocol {
    async fn request_profile(&self, node_id: &str) -> KernelResult<Option<String>> {
        let data = self
            .bridge
            .request(topics::TASK_REQUEST, |request_id| TaskCommand::RequestProfile { request_id, node_id })
            .await?;
        match data {
            Value::Null => Ok(None),
            Value::String(s) if s.is_empty() => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(KernelError::upstream(format!("unexpected profile answer: {other}"))),
        }
    }

    async fn request_properties(&self, node_id: &str) -> KernelResult<Value> {
        self.bridge
            .request(topics::TASK_REQUEST, |request_id| TaskCommand::RequestProperties { request_id, node_id })
            .await
    }

    async fn active_task_exists(&self, node_id: &str) -> KernelResult<()> {
        self.bridge
            .request(topics::TASK_REQUEST, |request_id| TaskCommand::ActiveTaskExists { request_id, node_id })
            .await
            .map(|_| ())
    }
}

pub struct MqttWorkflowRunner {
    bridge: Arc<RpcBridge>,
}

impl MqttWorkflowRunner {
    pub fn new(bridge: Arc<RpcBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl WorkflowRunner for MqttWorkflowRunner {
    async fn create_and_run_graph(
        &self,
        config: DiscoveryConfiguration,
        lock_target: Option<String>,
    ) -> KernelResult<()> {
        self.bridge
            .request(topics::WORKFLOW_REQUEST, |request_id| WorkflowCommand::RunGraph {
                request_id,
                graph: &config,
                lock_target: lock_target.as_deref(),
            })
            .await?;
        debug!(graph = %config.name, node_id = %config.options.defaults.node_id, "graph submitted");
        Ok(())
    }

    async fn find_active_graph_for_target(&self, node_id: &str) -> KernelResult<Option<TaskGraphInstance>> {
        let data = self
            .bridge
            .request(topics::WORKFLOW_REQUEST, |request_id| WorkflowCommand::FindActiveGraph { request_id, node_id })
            .await?;
        if data.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(data)?))
    }
}

#[derive(Serialize)]
struct NodeEventMessage<'a> {
    event: NodeEvent,
    node: &'a Node,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

pub struct MqttEventPublisher {
    publisher: Arc<dyn MqttPublisher>,
}

impl MqttEventPublisher {
    pub fn new(publisher: Arc<dyn MqttPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl EventPublisher for MqttEventPublisher {
    async fn publish_node_event(&self, node: &Node, event: NodeEvent) -> KernelResult<()> {
        let payload = serde_json::to_vec(&NodeEventMessage {
            event,
            node,
            timestamp: OffsetDateTime::now_utc(),
        })?;
        self.publisher
            .send(topics::NODE_ADDED, payload)
            .await
            .map_err(|e| KernelError::upstream(format!("node event publish failed: {e}")))
    }

    async fn publish_switch_error(&self, report: &Value) -> KernelResult<()> {
        let payload = serde_json::to_vec(report)?;
        self.publisher
            .send(topics::SWITCH_ERROR, payload)
            .await
            .map_err(|e| KernelError::upstream(format!("switch error publish failed: {e}")))
    }
}
