//! Outbound side: commands published to the device topic.

use std::future::Future;

use relayhub_app::ports::CommandTransport;
use relayhub_domain::command::OutboundCommand;
use relayhub_domain::error::RelayHubError;
use rumqttc::{AsyncClient, QoS};

use crate::error::MqttError;

/// [`CommandTransport`] publishing encoded frames over MQTT.
///
/// Every device listens on the same topic and filters by the device id in
/// the frame header.
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
    topic: String,
}

impl MqttTransport {
    pub fn new(client: AsyncClient, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
        }
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Ask the broker for a clean disconnect.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::Client`] when the connection is already gone.
    pub async fn disconnect(&self) -> Result<(), MqttError> {
        self.client.disconnect().await.map_err(MqttError::Client)
    }
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl CommandTransport for MqttTransport {
    fn send(
        &self,
        command: OutboundCommand,
    ) -> impl Future<Output = Result<(), RelayHubError>> + Send {
        async move {
            let frame = command.encode()?;
            self.client
                .publish(self.topic.as_str(), QoS::AtLeastOnce, false, frame)
                .await
                .map_err(MqttError::Client)?;
            Ok(())
        }
    }
}
