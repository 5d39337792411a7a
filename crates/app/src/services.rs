//! Application services: use-case implementations.
//!
//! Each service struct accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.

pub mod device_service;
pub mod dispatch;
pub mod inbound_dispatcher;
pub mod reconciliation;
pub mod unit_of_work;
