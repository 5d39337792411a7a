//! # relayhub-adapter-mqtt
//!
//! MQTT adapter: carries device frames between relayhub and the devices.
//!
//! ## Responsibilities
//! - Connect to an MQTT broker and keep reconnecting when the link drops
//! - Publish every outbound command, encoded as a wire frame, to the device topic
//! - Subscribe to the server topic and feed every received frame to an
//!   [`InboundFrameHandler`](relayhub_app::ports::InboundFrameHandler)
//!
//! ## Dependency rule
//! Same as other adapters: depends on `relayhub-app` and `relayhub-domain`.

pub mod config;
pub mod error;
pub mod listener;
pub mod transport;

pub use config::MqttConfig;
pub use error::MqttError;
pub use listener::MqttConnection;
pub use transport::MqttTransport;

/// Create the client side and the connection side of one broker session.
///
/// Nothing touches the network until [`MqttConnection::run`] polls the
/// connection; commands sent before that are queued.
#[must_use]
pub fn connect(config: &MqttConfig) -> (MqttTransport, MqttConnection) {
    let (client, eventloop) = rumqttc::AsyncClient::new(config.options(), config.channel_capacity);
    let transport = MqttTransport::new(client.clone(), config.to_device_topic.clone());
    let connection = MqttConnection::new(
        client,
        eventloop,
        config.to_server_topic.clone(),
        config.reconnect_delay(),
        config.inbound_capacity,
    );
    (transport, connection)
}
