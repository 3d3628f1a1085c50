//! # Scenario Simulation Server Library
//!
//! This library provides the server side of the real-time scenario simulation
//! engine. It keeps one live simulation per scenario, advances every aircraft
//! track along its planned route on a fixed tick, and streams the results to
//! connected websocket clients.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server owns the only copy of each scenario's state. Clients never move
//! aircraft themselves; they observe snapshots and, when permitted, send
//! lifecycle commands (`start`, `pause`, `stop`, `reset`).
//!
//! ### Session Management
//! Handles the complete lifecycle of an observer:
//! - Token resolution and control rights at connect time
//! - Lazy activation of the scenario on the first observer
//! - Command parsing, authorization and error replies
//! - Release of the scenario and its tick task on the last disconnect
//!
//! ### Broadcasting
//! Every tick publishes a snapshot to the scenario group. Accepted commands
//! are acknowledged to the scenario group and announced to the global monitor
//! group.
//!
//! ## Architecture Design
//!
//! ### Shared Registry
//! All scenario runtimes live in one registry behind a single async mutex.
//! Tick tasks and sessions both go through it, so command application and
//! track advancement never interleave inside a scenario. Directory reads are
//! done with the lock released.
//!
//! ### One Tick Task Per Active Scenario
//! The first observer spawns the tick task; the last one cancels it. The
//! state survives the disconnect, so a returning observer resumes where the
//! scenario was left.
//!
//! ### Websocket Transport
//! Connections are routed by path. Each connection runs a reader loop and a
//! writer task joined by an unbounded queue of pre-encoded JSON frames.
//!
//! ## Module Organization
//!
//! ### Track Module (`track`)
//! Route following for one aircraft: leg timing, interpolation, arrival.
//!
//! ### Registry Module (`registry`)
//! Scenario runtimes, the command state machine and observer counting.
//!
//! ### Scheduler Module (`scheduler`)
//! The per-scenario tick loop and its cancellation handle.
//!
//! ### Hub Module (`hub`)
//! Named broadcast groups of session queues.
//!
//! ### Session and Network Modules (`session`, `network`)
//! Transport-independent session logic and the websocket front end.
//!
//! ### Directory and Auth Modules (`directory`, `auth`)
//! Planned routes, principals and the control-permission chain.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use sim_server::config::ServerConfig;
//! use sim_server::directory::FileDirectory;
//! use sim_server::network::SimServer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let directory = Arc::new(FileDirectory::open("data/scenarios.json").await?);
//!
//!     // Observers connect to ws://127.0.0.1:8000/ws/simulation/<id>/
//!     // and monitors to ws://127.0.0.1:8000/ws/simulations/monitor/
//!     let server = SimServer::bind(&config, directory).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod hub;
pub mod network;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod track;
