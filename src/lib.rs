//! Live Relay - relays Twitch stream start/end events to Discord servers.
//!
//! This library provides the webhook pipeline (verification, dedup ledgers,
//! fan-out, end markers), the slash commands that configure it, and the HTTP
//! clients for Twitch, Discord and X.

pub mod clock;
pub mod commands;
pub mod config;
pub mod gateways;
pub mod ledger;
pub mod notify;
pub mod server;
pub mod store;
pub mod types;
pub mod webhooks;

#[cfg(test)]
pub(crate) mod test_utils;
