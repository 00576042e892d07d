use bootwise_devkit::fixtures::compute_node;
use bootwise_devkit::{Outcome, TestHarness};
use bootwise_kernel::discovery::DiscoveryTrigger;
use bootwise_kernel::identity::IdentityResolver;
use bootwise_kernel::lookup::{LookupMapper, LookupRequest};
use bootwise_kernel::models::{NodeType, ResolveOptions};
use bootwise_kernel::mqtt::topics;
use bootwise_kernel::ports::LookupStore;
use bootwise_kernel::protocol::MqttEventPublisher;
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn resolver(harness: &TestHarness) -> IdentityResolver {
    let discovery = DiscoveryTrigger::new(harness.workflows.clone(), harness.tasks.clone(), harness.lookups.clone());
    IdentityResolver::new(
        harness.nodes.clone(),
        harness.lookups.clone(),
        harness.tasks.clone(),
        Arc::new(MqttEventPublisher::new(harness.mqtt_client.clone())),
        discovery,
    )
}

fn macs(list: &[&str]) -> Vec<String> {
    list.iter().map(|m| m.to_string()).collect()
}

#[tokio::test]
async fn test_unknown_macs_create_announce_and_discover() {
    let harness = TestHarness::new().unwrap();

    let node = resolver(&harness)
        .resolve_node(&macs(&["aa:01", "aa:02"]), &ResolveOptions::compute())
        .await
        .unwrap();

    assert!(node.new_record);
    assert_eq!(node.name, "aa:01,aa:02");
    assert_eq!(node.node_type, NodeType::Compute);
    assert_eq!(harness.nodes.created(), 1);

    let added: Value = harness.mqtt_client.get_last_json_message(topics::NODE_ADDED).unwrap().unwrap();
    assert_eq!(added["event"], "added");
    assert_eq!(added["node"]["id"], node.id.as_str());

    for mac in ["aa:01", "aa:02"] {
        let record = harness.lookups.find_one_by_term(mac).await.unwrap().unwrap();
        assert_eq!(record.node.as_deref(), Some(node.id.as_str()));
    }
    assert_eq!(harness.workflows.submissions().len(), 1);
}

#[tokio::test]
async fn test_discovered_node_is_returned_as_is() {
    let harness = TestHarness::new().unwrap();
    harness.nodes.insert(compute_node("n1", &["aa:01"]));
    harness.nodes.mark_discovered("n1");

    let node = resolver(&harness)
        .resolve_node(&macs(&["aa:01"]), &ResolveOptions::compute())
        .await
        .unwrap();

    assert_eq!(node.id, "n1");
    assert!(!node.new_record);
    assert_eq!(harness.tasks.active_task_calls.load(Ordering::SeqCst), 0);
    assert!(harness.workflows.submissions().is_empty());
    assert!(harness.mqtt_client.get_published_messages().is_empty());
}

#[tokio::test]
async fn test_undiscovered_node_with_active_task_is_left_alone() {
    let harness = TestHarness::new().unwrap();
    harness.nodes.insert(compute_node("n1", &["aa:01"]));
    harness.tasks.set_active_task(Outcome::Ok(()));

    let node = resolver(&harness)
        .resolve_node(&macs(&["zz:99", "aa:01"]), &ResolveOptions::compute())
        .await
        .unwrap();

    assert_eq!(node.id, "n1");
    assert_eq!(harness.tasks.active_task_calls.load(Ordering::SeqCst), 1);
    assert!(harness.workflows.submissions().is_empty());
}

#[tokio::test]
async fn test_failed_active_task_check_triggers_discovery() {
    let harness = TestHarness::new().unwrap();
    harness.nodes.insert(compute_node("n1", &["aa:01"]));
    harness.tasks.set_active_task(Outcome::TimedOut);

    resolver(&harness)
        .resolve_node(&macs(&["aa:01"]), &ResolveOptions::compute())
        .await
        .unwrap();

    let submissions = harness.workflows.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].0.options.defaults.graph_options.target, "n1");
    assert_eq!(harness.nodes.created(), 0);
}

#[tokio::test]
async fn test_event_publish_failure_surfaces() {
    let harness = TestHarness::new().unwrap();
    harness.mqtt_client.set_offline(true);

    let err = resolver(&harness)
        .resolve_node(&macs(&["aa:01"]), &ResolveOptions::compute())
        .await
        .unwrap_err();

    assert!(err.message.contains("node event publish failed"));
    assert!(harness.workflows.submissions().is_empty());
}

#[tokio::test]
async fn test_repeated_lookup_registration_is_idempotent() {
    let harness = TestHarness::new().unwrap();
    let mapper = LookupMapper::new(harness.lookups.clone());
    let req = LookupRequest {
        macs: Some(macs(&["aa:01", "aa:02"])),
        ips: Some(macs(&["", "10.0.0.7"])),
        requester_ip: Some("10.0.0.7".into()),
        proxy: None,
    };

    mapper.set_lookup(&req).await.unwrap();
    let first = harness.lookups.lookups();
    mapper.set_lookup(&req).await.unwrap();
    let second = harness.lookups.lookups();

    assert_eq!(first, second);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].mac_address, "aa:02");
    assert_eq!(second[0].ip_address.as_deref(), Some("10.0.0.7"));
}
