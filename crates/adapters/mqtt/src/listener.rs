//! Inbound side: the broker event loop.
//!
//! The poll loop never runs frame handling itself. Handlers publish replies
//! through the same client, and those publishes only leave the request
//! queue while the event loop is polled, so received frames are forwarded
//! to a separate worker task over a bounded queue.

use std::time::Duration;

use relayhub_app::ports::InboundFrameHandler;
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, Publish, QoS};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use crate::error::MqttError;

/// The polling half of a broker session.
///
/// rumqttc only makes progress while the event loop is polled, so this must
/// be running for [`MqttTransport`](crate::MqttTransport) sends to leave
/// the process.
pub struct MqttConnection {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    reconnect_delay: Duration,
    inbound_capacity: usize,
}

impl MqttConnection {
    pub fn new(
        client: AsyncClient,
        eventloop: EventLoop,
        topic: impl Into<String>,
        reconnect_delay: Duration,
        inbound_capacity: usize,
    ) -> Self {
        Self {
            client,
            eventloop,
            topic: topic.into(),
            reconnect_delay,
            inbound_capacity,
        }
    }

    /// Poll the broker until `shutdown` flips to `true`, its sender is
    /// dropped, or a requested disconnect went out.
    ///
    /// The subscription is renewed on every `ConnAck`, so it survives
    /// reconnects. Connection errors are logged and retried after the
    /// reconnect delay. Frames arriving while the inbound queue is full are
    /// dropped with a warning. Frames already queued are still handled
    /// before this returns.
    pub async fn run<H>(self, handler: H, mut shutdown: watch::Receiver<bool>)
    where
        H: InboundFrameHandler + Send + Sync + 'static,
    {
        let Self {
            client,
            mut eventloop,
            topic,
            reconnect_delay,
            inbound_capacity,
        } = self;
        let (frames, queue) = mpsc::channel(inbound_capacity.max(1));
        let worker = tokio::spawn(handle_frames(handler, queue));
        tracing::info!(%topic, "MQTT listener started");

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!(%topic, "connected to broker, subscribing");
                        tokio::spawn(subscribe(client.clone(), topic.clone()));
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match inbound_frame(&publish, &topic) {
                            Some(frame) => forward(&frames, frame),
                            None => tracing::debug!(topic = %publish.topic, "ignoring message on foreign topic"),
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        tracing::info!("disconnected from broker");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(err = %MqttError::Connection(err), delay_secs = reconnect_delay.as_secs(), "broker connection lost");
                        if wait_or_shutdown(reconnect_delay, &mut shutdown).await {
                            break;
                        }
                    }
                }
            }
        }

        // Replies to the frames still queued fail fast once the request
        // queue has no reader.
        drop(eventloop);
        drop(frames);
        if let Err(err) = worker.await {
            tracing::warn!(%err, "inbound frame worker ended abnormally");
        }
        tracing::info!("MQTT listener stopped");
    }
}

/// Run the handler over every queued frame, one at a time.
async fn handle_frames<H: InboundFrameHandler>(handler: H, mut queue: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = queue.recv().await {
        handler.handle_frame(frame).await;
    }
}

/// Queue a frame for the worker without waiting.
fn forward(frames: &mpsc::Sender<Vec<u8>>, frame: Vec<u8>) {
    match frames.try_send(frame) {
        Ok(()) => {}
        Err(TrySendError::Full(frame)) => {
            tracing::warn!(len = frame.len(), "inbound queue full, dropping frame");
        }
        Err(TrySendError::Closed(_)) => tracing::warn!("inbound frame worker is gone"),
    }
}

async fn subscribe(client: AsyncClient, topic: String) {
    if let Err(err) = client.subscribe(topic.as_str(), QoS::AtLeastOnce).await {
        tracing::warn!(err = %MqttError::Client(err), %topic, "subscribe failed");
    }
}

/// Sleep for `delay`, returning `true` early if shutdown was requested.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Payload of a message published on the server topic.
fn inbound_frame(publish: &Publish, topic: &str) -> Option<Vec<u8>> {
    (publish.topic == topic).then(|| publish.payload.to_vec())
}
