//! Transport port: delivery of commands to devices.

use std::future::Future;

use relayhub_domain::command::OutboundCommand;
use relayhub_domain::error::RelayHubError;

/// Sends outbound commands to the addressed device.
///
/// A failed send is never retried here: the condition that produced the
/// command persists and the next evaluation produces it again.
pub trait CommandTransport {
    /// Send one command, resolving once the transport accepted it.
    fn send(&self, command: OutboundCommand)
    -> impl Future<Output = Result<(), RelayHubError>> + Send;
}

impl<T: CommandTransport + Send + Sync> CommandTransport for std::sync::Arc<T> {
    fn send(
        &self,
        command: OutboundCommand,
    ) -> impl Future<Output = Result<(), RelayHubError>> + Send {
        (**self).send(command)
    }
}
