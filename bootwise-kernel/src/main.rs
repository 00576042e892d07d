/**
 * BOOTWISE KERNEL - Entry point
 *
 * ROLE: wires config, the JSON store, the MQTT bus (RPC bridge + listener)
 * and the HTTP API into one process.
 *
 * The task and workflow engines live on the other side of the bus; this
 * process only decides what each booting device gets.
 */

use bootwise_kernel::bridge::RpcBridge;
use bootwise_kernel::config::load_config;
use bootwise_kernel::health::HealthTracker;
use bootwise_kernel::http::{self, AppState};
use bootwise_kernel::mqtt::{self, MqttPublisher};
use bootwise_kernel::ports::JsonStore;
use bootwise_kernel::protocol::{MqttEventPublisher, MqttTaskProtocol, MqttWorkflowRunner};
use bootwise_kernel::render::ProfileLibrary;
use bootwise_kernel::service::ProfileService;
use bootwise_kernel::state::KernelContext;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,bootwise_kernel=debug")),
        )
        .init();

    let config = Arc::new(load_config().await);

    let store = Arc::new(JsonStore::new(&config.storage.data_file)?);

    let health = HealthTracker::new();

    let (client, eventloop) = mqtt::create_mqtt_client(&config.mqtt);
    let publisher: Arc<dyn MqttPublisher> = Arc::new(client.clone());
    let bridge = Arc::new(RpcBridge::new(
        publisher.clone(),
        Duration::from_millis(config.mqtt.request_timeout_ms),
    ));
    mqtt::spawn_mqtt_listener(client, eventloop, bridge.clone(), Some(store.clone()), health.clone());

    let ctx = KernelContext {
        config: config.clone(),
        nodes: store.clone(),
        lookups: store.clone(),
        tasks: Arc::new(MqttTaskProtocol::new(bridge.clone())),
        workflows: Arc::new(MqttWorkflowRunner::new(bridge)),
        events: Arc::new(MqttEventPublisher::new(publisher)),
        library: ProfileLibrary::new(&config.profiles.dir),
    };

    let app_state = AppState {
        service: Arc::new(ProfileService::new(ctx)),
        health,
        stats: Some(store),
        proxy_headers: config.proxy_headers.clone(),
    };
    let app = http::build_router(app_state);

    let listener = TcpListener::bind(&config.http.bind).await?;
    info!(addr = %config.http.bind, "listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
