/*!
Test harness for the Bootwise kernel

Wires a KernelContext out of in-memory doubles:
- nodes: MockNodeStore
- lookups: a real JsonStore in a temp directory
- tasks / workflows: scriptable engine mocks
- events: the real MQTT event publisher over MockMqttClient
- library: the shipped profile templates copied into a temp directory
*/

use anyhow::Result;
use axum::Router;
use bootwise_kernel::config::KernelConfig;
use bootwise_kernel::health::HealthTracker;
use bootwise_kernel::http::{self, AppState};
use bootwise_kernel::ports::JsonStore;
use bootwise_kernel::protocol::MqttEventPublisher;
use bootwise_kernel::render::ProfileLibrary;
use bootwise_kernel::service::ProfileService;
use bootwise_kernel::state::KernelContext;
use std::sync::Arc;
use tempfile::TempDir;

use crate::mocks::{MockNodeStore, MockTaskProtocol, MockWorkflowRunner};
use crate::mqtt_stub::MockMqttClient;

const SHIPPED_PROFILES: [(&str, &str); 4] = [
    ("boilerplate.ipxe", include_str!("../../bootwise-kernel/profiles/boilerplate.ipxe")),
    ("redirect.ipxe", include_str!("../../bootwise-kernel/profiles/redirect.ipxe")),
    ("ipxe-info.ipxe", include_str!("../../bootwise-kernel/profiles/ipxe-info.ipxe")),
    ("taskrunner.py", include_str!("../../bootwise-kernel/profiles/taskrunner.py")),
];

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

pub struct TestHarness {
    pub config: Arc<KernelConfig>,
    pub nodes: Arc<MockNodeStore>,
    pub lookups: Arc<JsonStore>,
    pub tasks: Arc<MockTaskProtocol>,
    pub workflows: Arc<MockWorkflowRunner>,
    pub mqtt_client: Arc<MockMqttClient>,
    pub health: HealthTracker,
    pub library: ProfileLibrary,
    dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Result<Self> {
        init_test_logging();

        let dir = tempfile::tempdir()?;
        let profiles_dir = dir.path().join("profiles");
        std::fs::create_dir_all(&profiles_dir)?;
        for (name, body) in SHIPPED_PROFILES {
            std::fs::write(profiles_dir.join(name), body)?;
        }

        let lookups = Arc::new(JsonStore::new(dir.path().join("data/bootwise.json"))?);

        Ok(Self {
            config: Arc::new(config),
            nodes: Arc::new(MockNodeStore::new()),
            lookups,
            tasks: Arc::new(MockTaskProtocol::new()),
            workflows: Arc::new(MockWorkflowRunner::new()),
            mqtt_client: Arc::new(MockMqttClient::new()),
            health: HealthTracker::new(),
            library: ProfileLibrary::new(profiles_dir),
            dir,
        })
    }

    pub fn context(&self) -> KernelContext {
        KernelContext {
            config: self.config.clone(),
            nodes: self.nodes.clone(),
            lookups: self.lookups.clone(),
            tasks: self.tasks.clone(),
            workflows: self.workflows.clone(),
            events: Arc::new(MqttEventPublisher::new(self.mqtt_client.clone())),
            library: self.library.clone(),
        }
    }

    pub fn service(&self) -> ProfileService {
        ProfileService::new(self.context())
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            service: Arc::new(self.service()),
            health: self.health.clone(),
            stats: Some(self.lookups.clone()),
            proxy_headers: self.config.proxy_headers.clone(),
        }
    }

    pub fn router(&self) -> Router {
        http::build_router(self.app_state())
    }

    pub fn temp_path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_seeds_shipped_profiles() {
        let harness = TestHarness::new().unwrap();
        let names: Vec<_> = harness.library.list().await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["boilerplate.ipxe", "ipxe-info.ipxe", "redirect.ipxe", "taskrunner.py"]);
    }
}
