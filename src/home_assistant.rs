use crate::config::Config;
use crate::publisher::Publisher;
use serde_derive::{Deserialize, Serialize};
use std::time::Duration;

/// Publishes MQTT messages through Home Assistant's `mqtt.publish` service.
pub struct HomeAssistantAPI {
    endpoint_url: String,
    auth_token: String,
    topic_prefix: String,
    request_timeout: Duration,
    client: reqwest::Client,
}

impl HomeAssistantAPI {
    pub fn new(config: &Config) -> Self {
        Self {
            endpoint_url: config.ha_url.trim_end_matches('/').to_string(),
            auth_token: config.ha_token.clone(),
            topic_prefix: config.topic_prefix.clone(),
            request_timeout: config.timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn topic(&self, topic_suffix: &str) -> String {
        format!("{}/{}", self.topic_prefix, topic_suffix)
    }

    pub async fn publish_mqtt(&self, request: &MqttPublishRequest) -> Result<(), anyhow::Error> {
        if self.endpoint_url.is_empty() {
            anyhow::bail!("No HA connection");
        }
        self.client
            .post(format!("{}/api/services/mqtt/publish", self.endpoint_url))
            .bearer_auth(&self.auth_token)
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl Publisher for HomeAssistantAPI {
    async fn publish(&self, topic_suffix: &str, payload: String, retain: bool) -> anyhow::Result<()> {
        let request = MqttPublishRequest {
            topic: self.topic(topic_suffix),
            payload,
            retain,
        };
        self.publish_mqtt(&request).await
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttPublishRequest {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}
