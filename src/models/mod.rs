//! Data models for Mole
//!
//! Shared by the capture feed, the inspection engines and the history store.

pub mod filter;
pub mod request;
pub mod session;

pub use filter::*;
pub use request::*;
pub use session::*;
