//! Shared data model and wire protocol for `ChatLink`.
//!
//! This crate defines the types exchanged between the `ChatLink` service and
//! its clients (message identity, delivery status, connection status, health)
//! plus the postcard-framed protocol spoken to the upstream chat gateway.

pub mod codec;
pub mod gateway;
pub mod message;
pub mod status;
