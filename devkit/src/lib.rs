/*!
# Bootwise DevKit - test doubles for the kernel

Runs the profile pipeline without a broker, a workflow engine or a database:
- MQTT stub recording every publish
- scriptable node store and task/workflow engine mocks
- node and graph fixtures
- a harness that wires them into a KernelContext and an HTTP router
*/

pub mod fixtures;
pub mod mocks;
pub mod mqtt_stub;
pub mod test_utils;

pub use mocks::{MockNodeStore, MockTaskProtocol, MockWorkflowRunner, Outcome};
pub use mqtt_stub::{BootwiseMessageBuilder, MockMqttClient};
pub use test_utils::TestHarness;
