pub mod config;
pub mod error;
pub mod memory;
pub mod provider;

pub use error::{AsiatError, Result};
