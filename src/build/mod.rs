//! Per-session build state.
//!
//! - [`context`] - explicit context handed to every component
//! - [`layout`] - the `./app` directory layout

pub mod context;
pub mod layout;
