/*!
Mock MQTT client for running the kernel without a broker

Records every publish so tests can assert on what went out on the bus, and
builds the inbound payloads the task/workflow engines would send back.
*/

use anyhow::Result;
use async_trait::async_trait;
use bootwise_kernel::mqtt::MqttPublisher;
use serde_json::Value;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Stands in for rumqttc::AsyncClient behind the MqttPublisher trait.
#[derive(Clone, Default)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    fail_publish: Arc<Mutex<bool>>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following publish fail, as if the broker dropped us.
    pub fn set_offline(&self, offline: bool) {
        *self.fail_publish.lock().unwrap() = offline;
    }

    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().unwrap().clone()
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        match self.find_messages_by_topic(topic).last() {
            Some(last_msg) => Ok(Some(serde_json::from_slice(&last_msg.payload)?)),
            None => Ok(None),
        }
    }

    pub fn clear(&self) {
        self.published_messages.lock().unwrap().clear();
    }
}

#[async_trait]
impl MqttPublisher for MockMqttClient {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if *self.fail_publish.lock().unwrap() {
            anyhow::bail!("mock broker offline");
        }
        tracing::debug!(topic, bytes = payload.len(), "[mock] published");
        self.published_messages.lock().unwrap().push(MockMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}

/// Payloads the engines on the far side of the bus would publish.
pub struct BootwiseMessageBuilder;

impl BootwiseMessageBuilder {
    pub fn rpc_success(request_id: &str, data: Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": "success",
            "request_id": request_id,
            "data": data
        }))
        .unwrap()
    }

    pub fn rpc_error(request_id: &str, error: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": "error",
            "request_id": request_id,
            "error": error
        }))
        .unwrap()
    }

    pub fn catalog_created(node_id: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({ "node_id": node_id, "source": "dmi" })).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_records_publishes() {
        let client = MockMqttClient::new();
        client.send("bootwise/nodes/added@v1", b"{\"event\":\"added\"}".to_vec()).await.unwrap();
        client.send("other", b"x".to_vec()).await.unwrap();

        assert_eq!(client.get_published_messages().len(), 2);
        let last: Option<Value> = client.get_last_json_message("bootwise/nodes/added@v1").unwrap();
        assert_eq!(last.unwrap()["event"], "added");
    }

    #[tokio::test]
    async fn test_offline_client_fails_publish() {
        let client = MockMqttClient::new();
        client.set_offline(true);
        assert!(client.send("t", vec![]).await.is_err());
        assert!(client.get_published_messages().is_empty());
    }
}
