use axum::http::StatusCode;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

use crate::error::{KernelError, KernelResult};
use crate::models::{Node, NodeType, Options, ProfileDescriptor, TaskGraphInstance};
use crate::protocol::{TaskProtocol, WorkflowRunner};

pub const REDIRECT_PROFILE: &str = "redirect.ipxe";
pub const IDLE_PROFILE: &str = "ipxe-info.ipxe";
pub const SWITCH_TASKRUNNER: &str = "taskrunner.py";
pub const IDLE_MESSAGE: &str = "No active workflow and bootSettings, continue to boot";

/// Flattens a `kargs` map into `key=value key=value` so templates can drop it
/// straight onto a kernel command line. A missing `kargs` becomes null.
pub fn convert_properties(properties: Value) -> Options {
    let mut props = match properties {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    match props.get("kargs") {
        Some(Value::Object(kargs)) => {
            let line = kargs
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => format!("{k}={s}"),
                    other => format!("{k}={other}"),
                })
                .collect::<Vec<_>>()
                .join(" ");
            props.insert("kargs".into(), Value::String(line));
        }
        Some(_) => {}
        None => {
            props.insert("kargs".into(), Value::Null);
        }
    }
    props
}

pub struct ProfileResolver {
    workflows: Arc<dyn WorkflowRunner>,
    tasks: Arc<dyn TaskProtocol>,
}

impl ProfileResolver {
    pub fn new(workflows: Arc<dyn WorkflowRunner>, tasks: Arc<dyn TaskProtocol>) -> Self {
        Self { workflows, tasks }
    }

    pub async fn resolve_profile(&self, node: &Node) -> KernelResult<ProfileDescriptor> {
        match self.workflows.find_active_graph_for_target(&node.id).await? {
            Some(graph) => self.from_workflow(node, graph).await,
            None => from_boot_settings(node),
        }
    }

    async fn from_workflow(&self, node: &Node, graph: TaskGraphInstance) -> KernelResult<ProfileDescriptor> {
        // Switches skip the microkernel and fetch their task runner directly.
        let default_profile = match node.node_type {
            NodeType::Switch => SWITCH_TASKRUNNER,
            NodeType::Compute => REDIRECT_PROFILE,
        };

        let (profile, properties) = tokio::join!(
            self.tasks.request_profile(&node.id),
            self.tasks.request_properties(&node.id)
        );

        let fetched = profile
            .or_else(|e| match node.node_type {
                NodeType::Switch => Ok(None),
                NodeType::Compute => Err(e),
            })
            .and_then(|profile| properties.map(|props| (profile, props)));

        let (profile, properties) = match fetched {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    node_id = %node.id,
                    graph = ?graph,
                    error = %e,
                    "Unable to retrieve workflow properties"
                );
                return Err(KernelError::rendering(
                    "Unable to retrieve workflow properties",
                    StatusCode::SERVICE_UNAVAILABLE,
                ));
            }
        };

        let options = match node.node_type {
            NodeType::Compute => convert_properties(properties),
            NodeType::Switch => {
                let mut opts = Options::new();
                opts.insert("identifier".into(), Value::String(node.id.clone()));
                opts
            }
        };

        Ok(ProfileDescriptor {
            profile: profile.filter(|p| !p.is_empty()).unwrap_or_else(|| default_profile.to_string()),
            options,
            context: Some(graph.context),
            ignore_lookup: false,
        })
    }
}

fn from_boot_settings(node: &Node) -> KernelResult<ProfileDescriptor> {
    match &node.boot_settings {
        Some(settings) => match (&settings.profile, &settings.options) {
            (Some(profile), Some(options)) => {
                let profile = profile.as_deref().filter(|p| !p.is_empty()).unwrap_or(REDIRECT_PROFILE);
                Ok(ProfileDescriptor::new(profile, options.clone()))
            }
            _ => Err(KernelError::rendering(
                "Unable to retrieve valid node bootSettings",
                StatusCode::INTERNAL_SERVER_ERROR,
            )),
        },
        None => {
            let mut options = Options::new();
            options.insert("message".into(), Value::String(IDLE_MESSAGE.into()));
            Ok(ProfileDescriptor::new(IDLE_PROFILE, options))
        }
    }
}
