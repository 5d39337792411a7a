//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod clock;
pub mod event_bus;
pub mod inbound;
pub mod storage;
pub mod transport;

pub use clock::{Clock, SystemClock};
pub use event_bus::EventPublisher;
pub use inbound::InboundFrameHandler;
pub use storage::DeviceRepository;
pub use transport::CommandTransport;
