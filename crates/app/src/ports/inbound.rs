//! Inbound port: raw frames received from devices.

use std::future::Future;

/// Consumes frames as they arrive from the transport.
///
/// Implementations own error handling: a bad frame is logged and dropped,
/// it never stops the caller's receive loop.
pub trait InboundFrameHandler {
    fn handle_frame(&self, frame: Vec<u8>) -> impl Future<Output = ()> + Send;
}

impl<T: InboundFrameHandler + Send + Sync> InboundFrameHandler for std::sync::Arc<T> {
    fn handle_frame(&self, frame: Vec<u8>) -> impl Future<Output = ()> + Send {
        (**self).handle_frame(frame)
    }
}
