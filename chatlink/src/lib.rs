//! `ChatLink` — supervised chat-network bridge library.

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod health;
pub mod server;
pub mod session;
pub mod tracker;
