/*!
In-memory stand-ins for the node store and the task/workflow engines

Each mock can be scripted before a scenario and counts the calls it receives,
so tests can assert both on outcomes and on how the pipeline got there.
*/

use async_trait::async_trait;
use bootwise_kernel::error::{KernelError, KernelResult};
use bootwise_kernel::models::{DiscoveryConfiguration, NewNode, Node, TaskGraphInstance};
use bootwise_kernel::ports::NodeStore;
use bootwise_kernel::protocol::{TaskProtocol, WorkflowRunner};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct MockNodeStore {
    nodes: Mutex<Vec<Node>>,
    discovered: Mutex<HashSet<String>>,
    next_id: AtomicUsize,
    pub create_calls: AtomicUsize,
}

impl MockNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, node: Node) {
        self.nodes.lock().unwrap().push(node);
    }

    /// As if a catalog had been recorded for the node.
    pub fn mark_discovered(&self, node_id: &str) {
        self.discovered.lock().unwrap().insert(node_id.to_string());
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.lock().unwrap().clone()
    }

    pub fn created(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeStore for MockNodeStore {
    async fn find_by_identifier(&self, macs: &[String]) -> KernelResult<Option<Node>> {
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.identifiers.iter().any(|id| macs.contains(id)))
            .cloned())
    }

    async fn create(&self, new: NewNode) -> KernelResult<Node> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let id = format!("node-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut node = Node::new(id, new.identifiers, new.node_type);
        node.name = new.name;
        self.insert(node.clone());
        Ok(node)
    }

    async fn discovered(&self, node: &Node) -> KernelResult<bool> {
        Ok(self.discovered.lock().unwrap().contains(&node.id))
    }
}

/// Scripted answer for one protocol call.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Ok(T),
    TimedOut,
    Failed(String),
}

impl<T> Outcome<T> {
    fn into_result(self) -> KernelResult<T> {
        match self {
            Outcome::Ok(v) => Ok(v),
            Outcome::TimedOut => Err(KernelError::timed_out("mock request timed out")),
            Outcome::Failed(msg) => Err(KernelError::upstream(msg)),
        }
    }
}

/// Task engine double. `request_properties` answers from a queue first, then
/// falls back to the default outcome.
pub struct MockTaskProtocol {
    properties_queue: Mutex<VecDeque<Outcome<Value>>>,
    properties_default: Mutex<Outcome<Value>>,
    profile: Mutex<Outcome<Option<String>>>,
    active_task: Mutex<Outcome<()>>,
    pub properties_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub active_task_calls: AtomicUsize,
}

impl Default for MockTaskProtocol {
    fn default() -> Self {
        Self {
            properties_queue: Mutex::new(VecDeque::new()),
            properties_default: Mutex::new(Outcome::Ok(serde_json::json!({}))),
            profile: Mutex::new(Outcome::Ok(None)),
            active_task: Mutex::new(Outcome::Failed("no active task".into())),
            properties_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
            active_task_calls: AtomicUsize::new(0),
        }
    }
}

impl MockTaskProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_properties(&self, outcome: Outcome<Value>) {
        self.properties_queue.lock().unwrap().push_back(outcome);
    }

    pub fn set_properties(&self, outcome: Outcome<Value>) {
        *self.properties_default.lock().unwrap() = outcome;
    }

    pub fn set_profile(&self, outcome: Outcome<Option<String>>) {
        *self.profile.lock().unwrap() = outcome;
    }

    pub fn set_active_task(&self, outcome: Outcome<()>) {
        *self.active_task.lock().unwrap() = outcome;
    }

    pub fn properties_count(&self) -> usize {
        self.properties_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskProtocol for MockTaskProtocol {
    async fn request_profile(&self, _node_id: &str) -> KernelResult<Option<String>> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.profile.lock().unwrap().clone().into_result()
    }

    async fn request_properties(&self, _node_id: &str) -> KernelResult<Value> {
        self.properties_calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.properties_queue.lock().unwrap().pop_front();
        match queued {
            Some(outcome) => outcome.into_result(),
            None => self.properties_default.lock().unwrap().clone().into_result(),
        }
    }

    async fn active_task_exists(&self, _node_id: &str) -> KernelResult<()> {
        self.active_task_calls.fetch_add(1, Ordering::SeqCst);
        self.active_task.lock().unwrap().clone().into_result()
    }
}

#[derive(Default)]
pub struct MockWorkflowRunner {
    submissions: Mutex<Vec<(DiscoveryConfiguration, Option<String>)>>,
    active_graph: Mutex<Option<TaskGraphInstance>>,
    fail_submit: Mutex<Option<String>>,
}

impl MockWorkflowRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active_graph(&self, graph: Option<TaskGraphInstance>) {
        *self.active_graph.lock().unwrap() = graph;
    }

    pub fn fail_submissions(&self, message: &str) {
        *self.fail_submit.lock().unwrap() = Some(message.to_string());
    }

    pub fn submissions(&self) -> Vec<(DiscoveryConfiguration, Option<String>)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkflowRunner for MockWorkflowRunner {
    async fn create_and_run_graph(
        &self,
        config: DiscoveryConfiguration,
        lock_target: Option<String>,
    ) -> KernelResult<()> {
        if let Some(msg) = self.fail_submit.lock().unwrap().clone() {
            return Err(KernelError::upstream(msg));
        }
        self.submissions.lock().unwrap().push((config, lock_target));
        Ok(())
    }

    async fn find_active_graph_for_target(&self, _node_id: &str) -> KernelResult<Option<TaskGraphInstance>> {
        Ok(self.active_graph.lock().unwrap().clone())
    }
}
