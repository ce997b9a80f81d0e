pub mod api;
pub mod args;
pub mod cache;
pub mod codec;
pub mod commands;
mod config;
pub mod error;
pub mod filters;
pub mod installments;
pub mod model;
pub mod person;
pub mod pipeline;
pub mod store;
mod utils;
pub mod validation;

#[cfg(test)]
mod test;

pub use api::Mode;
pub use config::{CacheSettings, Config, Environment};
pub use error::{error_type, Error, ErrorType, IntoResult, Result};
