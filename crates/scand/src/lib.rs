//! ArchaeoScan Daemon - sensor simulator and broadcast server
//!
//! This crate provides the core infrastructure for the ArchaeoScan daemon:
//! - `generator` - Bounded random-walk sensor simulator
//! - `registry` - Set of live dashboard connections
//! - `broadcast` - The periodic loop pushing one snapshot per tick
//! - `server` - HTTP/WebSocket gateway
//! - `ingest` - Latest reading posted by a physical ESP32 probe
//! - `monitor` - Process monitoring for CPU/memory tracking
//! - `config` - Layered daemon configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        scand daemon                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ ReadingGenerator│◀────│       BroadcastLoop         │   │
//! │  │ (random walks)  │     │  (one tick per interval)    │   │
//! │  └─────────────────┘     └──────────────┬──────────────┘   │
//! │                                         │ broadcast         │
//! │                                         ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  DaemonServer   │────▶│    ConnectionRegistry       │   │
//! │  │  (axum, /ws)    │     │  (id -> ConnectionHandle)   │   │
//! │  └────────┬────────┘     └─────────────────────────────┘   │
//! │           │ per client                                      │
//! │           ▼                                                 │
//! │  ┌─────────────────┐                                        │
//! │  │  stream writer  │  mpsc frames -> WebSocket text         │
//! │  └─────────────────┘                                        │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod broadcast;
pub mod config;
pub mod generator;
pub mod ingest;
pub mod monitor;
pub mod registry;
pub mod server;
