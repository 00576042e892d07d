/**
 * IDENTITY RESOLVER - MAC addresses to a durable node record
 *
 * ROLE:
 * Every booting device is identified by the MACs it reports. This module
 * finds the matching node (or creates it) and makes sure a discovery graph
 * is driving any node that has not been inventoried yet.
 *
 * STATES:
 * - not found                               -> create, announce, discover
 * - found, undiscovered, no active task     -> discover
 * - found, undiscovered, active task        -> return as is
 * - found, discovered                       -> return as is
 *
 * The "active task" check is advisory: any check failure is read as "no
 * active task". Two devices racing here may both trigger discovery; the
 * workflow engine's per-node lock deduplicates them.
 */

use std::sync::Arc;
use tracing::{debug, info};

use crate::discovery::DiscoveryTrigger;
use crate::error::KernelResult;
use crate::models::{NewNode, Node, NodeEvent, ResolveOptions};
use crate::ports::{LookupStore, NodeStore};
use crate::protocol::{EventPublisher, TaskProtocol};

pub struct IdentityResolver {
    nodes: Arc<dyn NodeStore>,
    lookups: Arc<dyn LookupStore>,
    tasks: Arc<dyn TaskProtocol>,
    events: Arc<dyn EventPublisher>,
    discovery: DiscoveryTrigger,
}

impl IdentityResolver {
    pub fn new(
        nodes: Arc<dyn NodeStore>,
        lookups: Arc<dyn LookupStore>,
        tasks: Arc<dyn TaskProtocol>,
        events: Arc<dyn EventPublisher>,
        discovery: DiscoveryTrigger,
    ) -> Self {
        Self { nodes, lookups, tasks, events, discovery }
    }

    pub async fn resolve_node(&self, macs: &[String], opts: &ResolveOptions) -> KernelResult<Node> {
        let Some(node) = self.nodes.find_by_identifier(macs).await? else {
            return self.create_node_and_run_discovery(macs, opts).await;
        };

        if self.nodes.discovered(&node).await? {
            return Ok(node);
        }

        match self.tasks.active_task_exists(&node.id).await {
            Ok(()) => {
                debug!(node_id = %node.id, "discovery already running");
                Ok(node)
            }
            Err(e) => {
                debug!(node_id = %node.id, error = %e, "no active task, starting discovery");
                self.discovery.trigger(node, opts).await
            }
        }
    }

    async fn create_node_and_run_discovery(&self, macs: &[String], opts: &ResolveOptions) -> KernelResult<Node> {
        let mut node = self
            .nodes
            .create(NewNode {
                name: macs.join(","),
                identifiers: macs.to_vec(),
                node_type: opts.node_type,
            })
            .await?;
        self.events.publish_node_event(&node, NodeEvent::Added).await?;

        for mac in macs {
            self.lookups.upsert_node_to_mac(&node.id, mac).await?;
        }
        info!(node_id = %node.id, macs = %node.name, "new node registered");

        // Lets the caller hand out the redirect again instead of racing the
        // discovery graph's first state change.
        node.new_record = true;
        self.discovery.trigger(node, opts).await
    }
}
