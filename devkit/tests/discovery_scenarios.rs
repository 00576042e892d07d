use bootwise_devkit::fixtures::{compute_node, switch_node};
use bootwise_devkit::{Outcome, TestHarness};
use bootwise_kernel::discovery::{DiscoveryTrigger, SKU_DISCOVERY_GRAPH, SWITCH_DISCOVERY_GRAPH};
use bootwise_kernel::error::ErrorKind;
use bootwise_kernel::models::{DiscoveryContext, ResolveOptions};
use bootwise_kernel::ports::LookupStore;

fn trigger(harness: &TestHarness) -> DiscoveryTrigger {
    DiscoveryTrigger::new(harness.workflows.clone(), harness.tasks.clone(), harness.lookups.clone())
}

#[tokio::test]
async fn test_two_start_timeouts_then_success() {
    let harness = TestHarness::new().unwrap();
    harness.tasks.queue_properties(Outcome::TimedOut);
    harness.tasks.queue_properties(Outcome::TimedOut);

    let node = trigger(&harness)
        .trigger(compute_node("n1", &["aa:bb"]), &ResolveOptions::compute())
        .await
        .unwrap();

    assert_eq!(node.id, "n1");
    assert_eq!(harness.tasks.properties_count(), 3);

    let submissions = harness.workflows.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].0.name, SKU_DISCOVERY_GRAPH);
    assert_eq!(submissions[0].0.options.defaults.node_id, "n1");
    assert_eq!(submissions[0].1, None);
}

#[tokio::test]
async fn test_third_timeout_fails_the_trigger() {
    let harness = TestHarness::new().unwrap();
    harness.tasks.set_properties(Outcome::TimedOut);

    let err = trigger(&harness)
        .trigger(compute_node("n1", &["aa:bb"]), &ResolveOptions::compute())
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(harness.tasks.properties_count(), 3);
}

#[tokio::test]
async fn test_non_timeout_start_check_error_is_not_retried() {
    let harness = TestHarness::new().unwrap();
    harness.tasks.queue_properties(Outcome::Failed("graph rejected".into()));

    let err = trigger(&harness)
        .trigger(compute_node("n1", &["aa:bb"]), &ResolveOptions::compute())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Upstream);
    assert_eq!(harness.tasks.properties_count(), 1);
}

#[tokio::test]
async fn test_unknown_switch_vendor_submits_nothing() {
    let harness = TestHarness::new().unwrap();

    let err = trigger(&harness)
        .trigger(switch_node("sw1", "00:11"), &ResolveOptions::switch(Some("QUANTUM")))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::BadRequest);
    assert!(err.message.to_lowercase().contains("quantum"));
    assert!(harness.workflows.submissions().is_empty());
    assert_eq!(harness.tasks.properties_count(), 0);
}

#[tokio::test]
async fn test_switch_vendor_selects_sub_graph() {
    let harness = TestHarness::new().unwrap();

    trigger(&harness)
        .trigger(switch_node("sw1", "00:11"), &ResolveOptions::switch(Some("Brocade")))
        .await
        .unwrap();

    let (config, lock_target) = harness.workflows.submissions().remove(0);
    assert_eq!(config.name, SWITCH_DISCOVERY_GRAPH);
    assert_eq!(
        config.options.vendor_discovery_graph.unwrap().graph_name,
        "Graph.Switch.Discovery.Brocade.Ztp"
    );
    assert!(lock_target.is_none());
}

#[tokio::test]
async fn test_submission_failure_propagates() {
    let harness = TestHarness::new().unwrap();
    harness.workflows.fail_submissions("engine offline");

    let err = trigger(&harness)
        .trigger(compute_node("n1", &["aa:bb"]), &ResolveOptions::compute())
        .await
        .unwrap_err();

    assert_eq!(err.message, "engine offline");
    assert_eq!(harness.tasks.properties_count(), 0);
}

#[tokio::test]
async fn test_recorded_proxy_reaches_discovery_context() {
    let harness = TestHarness::new().unwrap();
    harness.lookups.upsert_node_to_mac("n1", "aa:bb").await.unwrap();
    harness.lookups.upsert_proxy_to_mac("http://12.1.1.1:7070", "aa:bb").await.unwrap();

    trigger(&harness)
        .trigger(compute_node("n1", &["aa:bb"]), &ResolveOptions::compute())
        .await
        .unwrap();

    let submissions = harness.workflows.submissions();
    assert_eq!(
        submissions[0].0.context,
        Some(DiscoveryContext { proxy: "http://12.1.1.1:7070".into() })
    );
}

#[tokio::test]
async fn test_no_recorded_proxy_leaves_context_empty() {
    let harness = TestHarness::new().unwrap();
    harness.lookups.upsert_node_to_mac("n1", "aa:bb").await.unwrap();

    trigger(&harness)
        .trigger(compute_node("n1", &["aa:bb"]), &ResolveOptions::compute())
        .await
        .unwrap();

    assert!(harness.workflows.submissions()[0].0.context.is_none());
}
