//! # relayhub-domain
//!
//! Pure domain model for the relayhub device backend.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Circuits** (switchable outputs with an actual and a desired state)
//! - Define the **Device** aggregate (liveness, configuration, circuit layout)
//!   and its reconciliation decision function
//! - Define **Events** emitted by the aggregate (started, shutdown, keepalive)
//! - Define the **Command** model exchanged with devices and its binary wire codec
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod circuit;
pub mod command;
pub mod device;
pub mod event;
