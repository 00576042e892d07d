use parking_lot::Mutex;
use std::sync::Arc;

use crate::config::KernelConfig;
use crate::ports::{LookupStore, NodeStore};
use crate::protocol::{EventPublisher, TaskProtocol, WorkflowRunner};
use crate::render::ProfileLibrary;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Collaborators shared by every stage of the pipeline.
#[derive(Clone)]
pub struct KernelContext {
    pub config: Arc<KernelConfig>,
    pub nodes: Arc<dyn NodeStore>,
    pub lookups: Arc<dyn LookupStore>,
    pub tasks: Arc<dyn TaskProtocol>,
    pub workflows: Arc<dyn WorkflowRunner>,
    pub events: Arc<dyn EventPublisher>,
    pub library: ProfileLibrary,
}
