//! Builders for the nodes and graphs scenarios start from.

use bootwise_kernel::models::{BootSettings, Node, NodeType, Options, TaskGraphInstance};
use serde_json::Value;

pub fn compute_node(id: &str, macs: &[&str]) -> Node {
    Node::new(id, macs.iter().map(|m| m.to_string()).collect(), NodeType::Compute)
}

pub fn switch_node(id: &str, mac: &str) -> Node {
    Node::new(id, vec![mac.to_string()], NodeType::Switch)
}

pub fn with_boot_settings(mut node: Node, profile: Option<&str>, options: Option<Value>) -> Node {
    node.boot_settings = Some(BootSettings {
        profile: profile.map(|p| Some(p.to_string())),
        options: options.and_then(|v| v.as_object().cloned()),
    });
    node
}

pub fn options(value: Value) -> Options {
    value.as_object().cloned().unwrap_or_default()
}

pub fn graph(instance_id: &str, context: Value) -> TaskGraphInstance {
    TaskGraphInstance {
        instance_id: Some(instance_id.to_string()),
        name: Some("Graph.InstallOS".to_string()),
        context,
    }
}
