//! Event bus port: publish/subscribe for domain events.

use std::future::Future;

use relayhub_domain::error::RelayHubError;
use relayhub_domain::event::DeviceEvent;

/// Publishes domain events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: DeviceEvent) -> impl Future<Output = Result<(), RelayHubError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: DeviceEvent) -> impl Future<Output = Result<(), RelayHubError>> + Send {
        (**self).publish(event)
    }
}
