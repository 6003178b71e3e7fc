//! WebSocket client for the meshvoice signaling relay.
//!
//! Provides a `SignalChannel` backed by a remote relay server using
//! `tokio-tungstenite`. Handles heartbeats, request/reply correlation,
//! re-subscription after reconnect, and auto-reconnect with backoff.

mod client;
mod connection;
mod handler;
mod types;

pub use client::RelaySignalChannel;
