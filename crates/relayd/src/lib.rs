//! Relay Daemon - Session registry, message routing and shutdown
//!
//! This crate provides the core infrastructure for the chat relay:
//! - `registry` - Session registry actor owning names and chat history
//! - `server` - TCP listener, per-session handlers and message routing
//! - `config` - Layered daemon configuration
//! - `assistant` - Pluggable text assistant for the AI commands
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       relayd daemon                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   ChatServer    │────▶│     RegistryActor           │   │
//! │  │ (TCP Listener)  │     │  (names, history owner)     │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ connections                 │ snapshots         │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ SessionHandler  │────▶│   Router                    │   │
//! │  │  (per client)   │     │   (per-session queues)      │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! Production code in this crate does not panic:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod assistant;
pub mod config;
pub mod registry;
pub mod server;
