/**
 * DATA PORTS - Persistence contracts consumed by the profile pipeline
 *
 * ROLE:
 * Defines the two stores the resolver talks to: the node store (durable node
 * identities keyed by MAC) and the lookup store (IP <-> MAC <-> proxy
 * associations used to tell relayed devices apart).
 *
 * OPERATION:
 * - NodeStore / LookupStore = async traits, held as Arc<dyn ...> in the kernel context
 * - JsonStore = bundled implementation, JSON file on disk + in-memory cache
 * - StoreStats = counters surfaced by /system/health
 *
 * Both traits are object safe so tests can swap in in-memory doubles.
 */

pub mod json_store;

use async_trait::async_trait;

use crate::error::KernelResult;
use crate::models::{LookupRecord, NewNode, Node};

pub use json_store::JsonStore;

#[async_trait]
pub trait NodeStore: Send + Sync {
    /// First node whose identifiers intersect `macs`.
    async fn find_by_identifier(&self, macs: &[String]) -> KernelResult<Option<Node>>;

    async fn create(&self, node: NewNode) -> KernelResult<Node>;

    /// A node counts as discovered once at least one catalog references it.
    async fn discovered(&self, node: &Node) -> KernelResult<bool>;
}

#[async_trait]
pub trait LookupStore: Send + Sync {
    async fn upsert_node_to_mac(&self, node_id: &str, mac: &str) -> KernelResult<()>;

    /// Binds `ip` to `mac`, releasing it from any other MAC.
    async fn upsert_ip_to_mac(&self, ip: &str, mac: &str) -> KernelResult<()>;

    async fn upsert_proxy_to_mac(&self, proxy: &str, mac: &str) -> KernelResult<()>;

    /// Matches `term` against IP, MAC or node id.
    async fn find_one_by_term(&self, term: &str) -> KernelResult<Option<LookupRecord>>;

    async fn node_id_to_proxy(&self, node_id: &str) -> KernelResult<Option<String>>;
}

pub trait StoreStats: Send + Sync {
    fn node_count(&self) -> usize;
    fn lookup_count(&self) -> usize;
}
