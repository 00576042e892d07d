/**
 * JSON STORE - File-backed node and lookup store
 *
 * ROLE:
 * Default persistence for a single kernel: every node, every lookup record and
 * the catalog counters live in one JSON document.
 *
 * OPERATION:
 * - Whole document cached in memory behind a mutex
 * - Rewritten (pretty-printed) after each mutation that changed something
 * - Node ids are UUID v4
 * - Catalog counters are fed by the MQTT listener on catalog events
 *
 * EXAMPLE DOCUMENT:
 * ```json
 * {
 *   "nodes": [{"id": "…", "name": "52:54:be:ef:00:01", "identifiers": ["52:54:be:ef:00:01"], "type": "compute"}],
 *   "lookups": [{"macAddress": "52:54:be:ef:00:01", "ipAddress": "172.31.128.5", "node": "…"}],
 *   "catalogs": {"…": 3}
 * }
 * ```
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};
use uuid::Uuid;

use super::{LookupStore, NodeStore, StoreStats};
use crate::error::KernelResult;
use crate::models::{LookupRecord, NewNode, Node};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    lookups: Vec<LookupRecord>,
    #[serde(default)]
    catalogs: HashMap<String, u32>,
}

impl StoreDocument {
    fn lookup_for_mac(&mut self, mac: &str) -> &mut LookupRecord {
        if let Some(idx) = self.lookups.iter().position(|r| r.mac_address == mac) {
            &mut self.lookups[idx]
        } else {
            self.lookups.push(LookupRecord { mac_address: mac.to_string(), ..Default::default() });
            let last = self.lookups.len() - 1;
            &mut self.lookups[last]
        }
    }
}

pub struct JsonStore {
    storage_path: PathBuf,
    cache: Mutex<StoreDocument>,
}

impl JsonStore {
    pub fn new<P: Into<PathBuf>>(storage_path: P) -> KernelResult<Self> {
        let path = storage_path.into();
        let store = Self {
            storage_path: path.clone(),
            cache: Mutex::new(StoreDocument::default()),
        };

        store.load_from_disk()?;
        info!(path = %path.display(), "json store ready");
        Ok(store)
    }

    fn load_from_disk(&self) -> KernelResult<()> {
        if !self.storage_path.exists() {
            if let Some(parent) = self.storage_path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(&self.storage_path, serde_json::to_string_pretty(&StoreDocument::default())?)?;
        }

        let content = fs::read_to_string(&self.storage_path)?;
        let doc: StoreDocument = if content.trim().is_empty() {
            StoreDocument::default()
        } else {
            serde_json::from_str(&content)?
        };

        *self.cache.lock() = doc;
        Ok(())
    }

    // Called with the cache lock held so concurrent writers cannot reorder snapshots.
    fn save_to_disk(&self, doc: &StoreDocument) -> KernelResult<()> {
        let json = serde_json::to_string_pretty(doc)?;
        fs::write(&self.storage_path, json)?;
        Ok(())
    }

    /// Applies `f` and persists the document when it reports a change.
    fn mutate<T>(&self, f: impl FnOnce(&mut StoreDocument) -> (bool, T)) -> KernelResult<T> {
        let mut doc = self.cache.lock();
        let (changed, out) = f(&mut doc);
        if changed {
            self.save_to_disk(&doc)?;
        }
        Ok(out)
    }

    pub fn record_catalog(&self, node_id: &str) -> KernelResult<u32> {
        let count = self.mutate(|doc| {
            let entry = doc.catalogs.entry(node_id.to_string()).or_insert(0);
            *entry += 1;
            (true, *entry)
        })?;
        debug!(node_id, count, "catalog recorded");
        Ok(count)
    }

    pub fn lookups(&self) -> Vec<LookupRecord> {
        self.cache.lock().lookups.clone()
    }
}

#[async_trait]
impl NodeStore for JsonStore {
    async fn find_by_identifier(&self, macs: &[String]) -> KernelResult<Option<Node>> {
        let doc = self.cache.lock();
        Ok(doc
            .nodes
            .iter()
            .find(|n| n.identifiers.iter().any(|id| macs.contains(id)))
            .cloned())
    }

    async fn create(&self, new: NewNode) -> KernelResult<Node> {
        let mut node = Node::new(Uuid::new_v4().to_string(), new.identifiers, new.node_type);
        node.name = new.name;
        let created = node.clone();
        self.mutate(move |doc| {
            doc.nodes.push(node);
            (true, ())
        })?;
        info!(node_id = %created.id, name = %created.name, "node created");
        Ok(created)
    }

    async fn discovered(&self, node: &Node) -> KernelResult<bool> {
        Ok(self.cache.lock().catalogs.get(&node.id).copied().unwrap_or(0) > 0)
    }
}

#[async_trait]
impl LookupStore for JsonStore {
    async fn upsert_node_to_mac(&self, node_id: &str, mac: &str) -> KernelResult<()> {
        self.mutate(|doc| {
            let record = doc.lookup_for_mac(mac);
            if record.node.as_deref() == Some(node_id) {
                return (false, ());
            }
            record.node = Some(node_id.to_string());
            (true, ())
        })
    }

    async fn upsert_ip_to_mac(&self, ip: &str, mac: &str) -> KernelResult<()> {
        self.mutate(|doc| {
            let mut changed = false;
            for other in doc.lookups.iter_mut().filter(|r| r.mac_address != mac) {
                if other.ip_address.as_deref() == Some(ip) {
                    other.ip_address = None;
                    changed = true;
                }
            }
            let record = doc.lookup_for_mac(mac);
            if record.ip_address.as_deref() != Some(ip) {
                record.ip_address = Some(ip.to_string());
                changed = true;
            }
            (changed, ())
        })
    }

    async fn upsert_proxy_to_mac(&self, proxy: &str, mac: &str) -> KernelResult<()> {
        self.mutate(|doc| {
            let record = doc.lookup_for_mac(mac);
            if record.proxy.as_deref() == Some(proxy) {
                return (false, ());
            }
            record.proxy = Some(proxy.to_string());
            (true, ())
        })
    }

    async fn find_one_by_term(&self, term: &str) -> KernelResult<Option<LookupRecord>> {
        let doc = self.cache.lock();
        Ok(doc
            .lookups
            .iter()
            .find(|r| {
                r.ip_address.as_deref() == Some(term)
                    || r.mac_address == term
                    || r.node.as_deref() == Some(term)
            })
            .cloned())
    }

    async fn node_id_to_proxy(&self, node_id: &str) -> KernelResult<Option<String>> {
        let doc = self.cache.lock();
        Ok(doc
            .lookups
            .iter()
            .filter(|r| r.node.as_deref() == Some(node_id))
            .find_map(|r| r.proxy.clone()))
    }
}

impl StoreStats for JsonStore {
    fn node_count(&self) -> usize {
        self.cache.lock().nodes.len()
    }

    fn lookup_count(&self) -> usize {
        self.cache.lock().lookups.len()
    }
}
