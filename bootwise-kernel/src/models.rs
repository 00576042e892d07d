use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

pub type Options = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Compute,
    Switch,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Compute => "compute",
            NodeType::Switch => "switch",
        }
    }
}

/// Keeps an explicit `null` apart from a missing key.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Persisted fallback for nodes without an active workflow.
/// Both keys are expected together; a node carrying only one of them is corrupt.
/// `profile` may be present but null or empty, which means the redirect script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BootSettings {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub profile: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Options>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub identifiers: Vec<String>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(rename = "bootSettings", default, skip_serializing_if = "Option::is_none")]
    pub boot_settings: Option<BootSettings>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Set only on the request that created the record.
    #[serde(skip)]
    pub new_record: bool,
}

impl Node {
    /// A fresh, bootSettings-less node named after its identifiers.
    pub fn new(id: impl Into<String>, identifiers: Vec<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            name: identifiers.join(","),
            identifiers,
            node_type,
            boot_settings: None,
            created_at: OffsetDateTime::now_utc(),
            new_record: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub name: String,
    pub identifiers: Vec<String>,
    pub node_type: NodeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeEvent {
    Added,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRecord {
    #[serde(rename = "macAddress")]
    pub mac_address: String,
    #[serde(rename = "ipAddress", default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

// Workflow submission descriptor. Field names follow the workflow engine's graph schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfiguration {
    pub name: String,
    pub options: GraphSubmissionOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<DiscoveryContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSubmissionOptions {
    pub defaults: GraphDefaults,
    #[serde(
        rename = "vendor-discovery-graph",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub vendor_discovery_graph: Option<VendorDiscoveryGraph>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefaults {
    #[serde(rename = "graphOptions")]
    pub graph_options: GraphTarget,
    #[serde(rename = "nodeId")]
    pub node_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphTarget {
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorDiscoveryGraph {
    #[serde(rename = "graphName")]
    pub graph_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryContext {
    pub proxy: String,
}

/// Read-only view of a running task graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskGraphInstance {
    #[serde(rename = "instanceId", default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub context: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileDescriptor {
    pub profile: String,
    pub options: Options,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(skip)]
    pub ignore_lookup: bool,
}

impl ProfileDescriptor {
    pub fn new(profile: impl Into<String>, options: Options) -> Self {
        Self {
            profile: profile.into(),
            options,
            context: None,
            ignore_lookup: false,
        }
    }
}

/// Caller-supplied hints used when a node has to be created or rediscovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    pub node_type: NodeType,
    pub switch_vendor: Option<String>,
}

impl ResolveOptions {
    pub fn compute() -> Self {
        Self { node_type: NodeType::Compute, switch_vendor: None }
    }

    /// The vendor is only checked if the switch turns out to need discovery.
    pub fn switch(vendor: Option<&str>) -> Self {
        Self { node_type: NodeType::Switch, switch_vendor: vendor.map(str::to_string) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_serializes_with_engine_field_names() {
        let node = Node {
            id: "n1".into(),
            name: "aa:bb".into(),
            identifiers: vec!["aa:bb".into()],
            node_type: NodeType::Switch,
            boot_settings: Some(BootSettings { profile: Some(Some("p".into())), options: Some(Options::new()) }),
            created_at: OffsetDateTime::UNIX_EPOCH,
            new_record: true,
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "switch");
        assert_eq!(json["bootSettings"]["profile"], "p");
        assert!(json.get("new_record").is_none());

        let back: Node = serde_json::from_value(json).unwrap();
        assert!(!back.new_record);
    }

    #[test]
    fn test_empty_boot_settings_parse_as_missing_fields() {
        let settings: BootSettings = serde_json::from_str("{}").unwrap();
        assert!(settings.profile.is_none());
        assert!(settings.options.is_none());
    }

    #[test]
    fn test_null_profile_is_present_but_empty() {
        let settings: BootSettings = serde_json::from_str(r#"{"profile": null, "options": {}}"#).unwrap();
        assert_eq!(settings.profile, Some(None));
        assert_eq!(settings.options, Some(Options::new()));
    }
}
