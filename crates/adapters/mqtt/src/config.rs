//! MQTT adapter configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the MQTT adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Topic the server publishes command frames on.
    pub to_device_topic: String,
    /// Topic devices publish their frames on.
    pub to_server_topic: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Pause before polling again after a connection error, in seconds.
    pub reconnect_delay_secs: u16,
    /// Capacity of the outgoing request queue.
    pub channel_capacity: usize,
    /// Frames received but not yet handled; newer frames are dropped past it.
    pub inbound_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "relayhub".to_string(),
            to_device_topic: "toDevice".to_string(),
            to_server_topic: "toServer".to_string(),
            keep_alive_secs: 30,
            reconnect_delay_secs: 5,
            channel_capacity: 64,
            inbound_capacity: 256,
        }
    }
}

impl MqttConfig {
    /// Client options for rumqttc.
    #[must_use]
    pub fn options(&self) -> rumqttc::MqttOptions {
        let mut options =
            rumqttc::MqttOptions::new(&self.client_id, &self.broker_host, self.broker_port);
        options.set_keep_alive(Duration::from_secs(u64::from(self.keep_alive_secs)));
        options
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.reconnect_delay_secs))
    }
}
