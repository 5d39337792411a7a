//! Command dispatch with per-command failure isolation.

use relayhub_domain::command::OutboundCommand;

use crate::ports::CommandTransport;

/// Counts of one dispatch round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    pub sent: usize,
    pub failed: usize,
}

impl SendReport {
    pub fn merge(&mut self, other: Self) {
        self.sent += other.sent;
        self.failed += other.failed;
    }
}

/// Send every command in order; a failure is logged and the rest still go out.
pub async fn send_all<T>(transport: &T, commands: Vec<OutboundCommand>) -> SendReport
where
    T: CommandTransport + Sync,
{
    let mut report = SendReport::default();
    for command in commands {
        let device_id = command.device_id();
        let command_type = command.command_type();
        match transport.send(command).await {
            Ok(()) => {
                tracing::debug!(%device_id, command = %command_type, "command sent");
                report.sent += 1;
            }
            Err(err) => {
                tracing::warn!(%err, %device_id, command = %command_type, "failed to send command");
                report.failed += 1;
            }
        }
    }
    report
}
