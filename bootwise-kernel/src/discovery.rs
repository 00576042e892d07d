use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{KernelError, KernelResult};
use crate::models::{
    DiscoveryConfiguration, DiscoveryContext, GraphDefaults, GraphSubmissionOptions, GraphTarget, Node,
    NodeType, ResolveOptions, VendorDiscoveryGraph,
};
use crate::ports::LookupStore;
use crate::protocol::{TaskProtocol, WorkflowRunner};

pub const SKU_DISCOVERY_GRAPH: &str = "Graph.SKU.Discovery";
pub const SWITCH_DISCOVERY_GRAPH: &str = "Graph.SKU.Switch.Discovery.Active";

/// First attempt plus two retries.
pub const DISCOVERY_START_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchVendor {
    Cisco,
    Brocade,
    Arista,
}

impl SwitchVendor {
    pub fn parse(name: &str) -> KernelResult<Self> {
        let vendor = name.to_lowercase();
        match vendor.as_str() {
            "cisco" => Ok(SwitchVendor::Cisco),
            "brocade" => Ok(SwitchVendor::Brocade),
            "arista" => Ok(SwitchVendor::Arista),
            _ => Err(KernelError::bad_request(format!("Unknown switch vendor {vendor}"))),
        }
    }

    pub fn discovery_graph(self) -> &'static str {
        match self {
            SwitchVendor::Cisco => "Graph.Switch.Discovery.Cisco.Poap",
            SwitchVendor::Brocade => "Graph.Switch.Discovery.Brocade.Ztp",
            SwitchVendor::Arista => "Graph.Switch.Discovery.Arista.Ztp",
        }
    }
}

fn defaults_for(node_id: &str) -> GraphDefaults {
    GraphDefaults {
        graph_options: GraphTarget { target: node_id.to_string() },
        node_id: node_id.to_string(),
    }
}

pub fn compute_discovery_configuration(node_id: &str) -> DiscoveryConfiguration {
    DiscoveryConfiguration {
        name: SKU_DISCOVERY_GRAPH.to_string(),
        options: GraphSubmissionOptions { defaults: defaults_for(node_id), vendor_discovery_graph: None },
        context: None,
    }
}

pub fn switch_discovery_configuration(node_id: &str, vendor: SwitchVendor) -> DiscoveryConfiguration {
    DiscoveryConfiguration {
        name: SWITCH_DISCOVERY_GRAPH.to_string(),
        options: GraphSubmissionOptions {
            defaults: defaults_for(node_id),
            vendor_discovery_graph: Some(VendorDiscoveryGraph {
                graph_name: vendor.discovery_graph().to_string(),
            }),
        },
        context: None,
    }
}

pub fn discovery_configuration(node: &Node, opts: &ResolveOptions) -> KernelResult<DiscoveryConfiguration> {
    match node.node_type {
        NodeType::Switch => {
            let vendor = opts
                .switch_vendor
                .as_deref()
                .ok_or_else(|| KernelError::bad_request("Switch vendor is required for switch discovery"))?;
            Ok(switch_discovery_configuration(&node.id, SwitchVendor::parse(vendor)?))
        }
        NodeType::Compute => Ok(compute_discovery_configuration(&node.id)),
    }
}

pub struct DiscoveryTrigger {
    workflows: Arc<dyn WorkflowRunner>,
    tasks: Arc<dyn TaskProtocol>,
    lookups: Arc<dyn LookupStore>,
}

impl DiscoveryTrigger {
    pub fn new(
        workflows: Arc<dyn WorkflowRunner>,
        tasks: Arc<dyn TaskProtocol>,
        lookups: Arc<dyn LookupStore>,
    ) -> Self {
        Self { workflows, tasks, lookups }
    }

    pub async fn trigger(&self, node: Node, opts: &ResolveOptions) -> KernelResult<Node> {
        let mut configuration = discovery_configuration(&node, opts)?;

        // The proxy lookup runs detached. If it has not finished by the time the
        // graph is submitted, the graph goes out without a proxy context.
        let proxy_lookup = self.spawn_proxy_lookup(node.id.clone());
        tokio::task::yield_now().await;
        if proxy_lookup.is_finished() {
            if let Ok(Some(proxy)) = proxy_lookup.await {
                configuration.context = Some(DiscoveryContext { proxy });
            }
        }

        // The discovery graph locks the node itself, so it is not nested under a target.
        self.workflows.create_and_run_graph(configuration, None).await?;
        info!(node_id = %node.id, node_type = node.node_type.as_str(), "discovery graph started");

        self.wait_for_discovery_start(&node.id).await?;
        Ok(node)
    }

    fn spawn_proxy_lookup(&self, node_id: String) -> JoinHandle<Option<String>> {
        let lookups = self.lookups.clone();
        tokio::spawn(async move {
            match lookups.node_id_to_proxy(&node_id).await {
                Ok(proxy) => proxy,
                Err(e) => {
                    warn!(%node_id, error = %e, "proxy lookup failed");
                    None
                }
            }
        })
    }

    /// The workflow runner acknowledges a graph before its tasks subscribe to
    /// the bus, so the first property requests may time out.
    pub async fn wait_for_discovery_start(&self, node_id: &str) -> KernelResult<()> {
        let mut attempt = 1;
        loop {
            match self.tasks.request_properties(node_id).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_timeout() && attempt < DISCOVERY_START_ATTEMPTS => {
                    debug!(node_id, attempt, "discovery not started yet, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_vendor_table_is_case_insensitive() {
        assert_eq!(SwitchVendor::parse("CISCO").unwrap(), SwitchVendor::Cisco);
        assert_eq!(SwitchVendor::parse("Arista").unwrap().discovery_graph(), "Graph.Switch.Discovery.Arista.Ztp");
        assert_eq!(SwitchVendor::parse("brocade").unwrap().discovery_graph(), "Graph.Switch.Discovery.Brocade.Ztp");
    }

    #[test]
    fn test_unknown_vendor_names_the_vendor() {
        let err = SwitchVendor::parse("QUANTUM").unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadRequest);
        assert!(err.message.contains("quantum"));
    }

    #[test]
    fn test_switch_configuration_shape() {
        let cfg = switch_discovery_configuration("sw1", SwitchVendor::Cisco);
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "Graph.SKU.Switch.Discovery.Active",
                "options": {
                    "defaults": {"graphOptions": {"target": "sw1"}, "nodeId": "sw1"},
                    "vendor-discovery-graph": {"graphName": "Graph.Switch.Discovery.Cisco.Poap"}
                }
            })
        );
    }

    #[test]
    fn test_compute_configuration_has_no_vendor_graph() {
        let json = serde_json::to_value(compute_discovery_configuration("n1")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "Graph.SKU.Discovery",
                "options": {"defaults": {"graphOptions": {"target": "n1"}, "nodeId": "n1"}}
            })
        );
    }
}
