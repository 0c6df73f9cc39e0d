//! Core constants, types, traits and errors.
//!
//! Every other module depends on this one; it depends on nothing else in
//! the crate.

mod config;
mod constants;
mod error;
mod traits;
mod types;

pub use config::*;
pub use constants::*;
pub use error::*;
pub use traits::*;
pub use types::*;
