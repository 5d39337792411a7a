//! Clock port: source of the current instant.

use relayhub_domain::time::{self, Timestamp};

/// Supplies "now" to the services, which pass it on to the aggregate.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        time::now()
    }
}

impl<T: Clock> Clock for std::sync::Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}
