use std::future::Future;
use tracing::warn;

pub const TOPIC_VALUE: &str = "value";
pub const TOPIC_CONSUMPTION: &str = "consumptionLitrePerMin";
pub const TOPIC_LAST_UPDATE_TIME: &str = "lastUpdateTime";

/// Message bus the derived meter values are pushed to.
pub trait Publisher: Send + Sync + 'static {
    fn publish(
        &self,
        topic_suffix: &str,
        payload: String,
        retain: bool,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Publishes the meter topics. Failures are logged, never returned.
pub struct ConsumptionPublisher<P> {
    publisher: P,
}

impl<P: Publisher> ConsumptionPublisher<P> {
    pub fn new(publisher: P) -> Self {
        Self { publisher }
    }

    pub fn inner(&self) -> &P {
        &self.publisher
    }

    pub async fn publish_values(&self, value: f64, consumption_per_minute: f64) {
        self.publish_retained(TOPIC_VALUE, value.to_string()).await;
        self.publish_retained(TOPIC_CONSUMPTION, consumption_per_minute.to_string())
            .await;
        self.publish_last_update_time().await;
    }

    /// Signals "no flow" without touching the cumulative value.
    pub async fn publish_zero_consumption(&self) {
        self.publish_retained(TOPIC_CONSUMPTION, 0.0f64.to_string())
            .await;
        self.publish_last_update_time().await;
    }

    async fn publish_last_update_time(&self) {
        self.publish_retained(TOPIC_LAST_UPDATE_TIME, local_timestamp())
            .await;
    }

    async fn publish_retained(&self, topic_suffix: &str, payload: String) {
        if let Err(e) = self.publisher.publish(topic_suffix, payload, true).await {
            warn!("Failed to publish {topic_suffix}: {e:#}");
        }
    }
}

/// Local wall-clock time with second precision, e.g. `2024-03-01T12:30:05`.
pub fn local_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<(String, String, bool)>>,
        fail: bool,
    }

    impl Publisher for Recorder {
        async fn publish(&self, topic_suffix: &str, payload: String, retain: bool) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("broker down");
            }
            self.messages
                .lock()
                .unwrap()
                .push((topic_suffix.to_string(), payload, retain));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_values() {
        let publisher = ConsumptionPublisher::new(Recorder::default());
        publisher.publish_values(5.5691, 4.2).await;

        let messages = publisher.inner().messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], ("value".to_string(), "5.5691".to_string(), true));
        assert_eq!(
            messages[1],
            ("consumptionLitrePerMin".to_string(), "4.2".to_string(), true)
        );
        assert_eq!(messages[2].0, "lastUpdateTime");
        assert!(messages[2].2);
    }

    #[tokio::test]
    async fn test_publish_zero_consumption() {
        let publisher = ConsumptionPublisher::new(Recorder::default());
        publisher.publish_zero_consumption().await;

        let messages = publisher.inner().messages.lock().unwrap().clone();
        let topics: Vec<&str> = messages.iter().map(|m| m.0.as_str()).collect();
        assert_eq!(topics, ["consumptionLitrePerMin", "lastUpdateTime"]);
        assert_eq!(messages[0].1, "0");
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let publisher = ConsumptionPublisher::new(Recorder {
            fail: true,
            ..Recorder::default()
        });
        publisher.publish_values(1.0, 0.0).await;
        publisher.publish_zero_consumption().await;
    }

    #[test]
    fn test_local_timestamp_format() {
        let timestamp = local_timestamp();
        assert_eq!(timestamp.len(), "2024-03-01T12:30:05".len());
        assert!(chrono::NaiveDateTime::parse_from_str(&timestamp, "%Y-%m-%dT%H:%M:%S").is_ok());
    }
}
