//! MQTT adapter error types.

use relayhub_domain::error::RelayHubError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The rumqttc client could not queue a request.
    #[error("MQTT client error: {0}")]
    Client(#[source] rumqttc::ClientError),

    /// The connection to the broker failed.
    #[error("MQTT connection error: {0}")]
    Connection(#[source] rumqttc::ConnectionError),
}

impl MqttError {
    /// Convert into a [`RelayHubError::Transport`] for propagation across
    /// port boundaries.
    pub fn into_domain(self) -> RelayHubError {
        RelayHubError::Transport(Box::new(self))
    }
}

impl From<MqttError> for RelayHubError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}
