//! Inspector event loop and the interactive filter builder

pub mod builder;
mod driver;
mod inspector;

pub use builder::{BuilderError, BuilderInput, BuilderState, FilterBuilder};
pub use driver::run;
pub use inspector::{Command, Event, Inspector};
