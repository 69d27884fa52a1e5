//! # Mole Core
//!
//! Capture, filter and history engine behind `mole`, a terminal inspector
//! for traffic flowing through an ngrok tunnel.
//!
//! ## Features
//!
//! - Live polling of the ngrok agent's inspection API
//! - Typed filter chains and free-text search over captured requests
//! - Durable SQLite history with sessions, stars and retention
//! - Browsing of past sessions with the same filters as live traffic
//! - JSON export of sessions and selected requests
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              Presentation (terminal / CLI)               │
//! ├──────────────────────────────────────────────────────────┤
//! │                 Inspector event loop (app)               │
//! │  ┌──────────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │  │ Capture  │──▶│   Session    │──▶│ Filter ─▶ Search │  │
//! │  │  Feed    │   │   Manager    │   │    (inspect)     │  │
//! │  └──────────┘   └──────────────┘   └──────────────────┘  │
//! │        │               ▲                                 │
//! │        ▼               │                                 │
//! │  ┌────────────────────────────┐                          │
//! │  │  Request Store (SQLite)    │──▶ JSON export           │
//! │  └────────────────────────────┘                          │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod app;
pub mod config;
pub mod feed;
pub mod inspect;
pub mod logging;
pub mod models;
pub mod session;
pub mod storage;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
