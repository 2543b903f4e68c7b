//! Request engine.
//!
//! The public surface is [`RequestEngine`] and its builder. Implementation details are split
//! into submodules under `src/client/`: the retry loops, failure classification, the retry
//! policy and the response validator.

pub mod builder;
pub mod core;
mod error_classification;
mod execution;
mod policy;
pub mod validation;

pub use builder::RequestEngineBuilder;
pub use core::{RequestEngine, ResponseHook};
pub use validation::{detect, rewrite_error_url_as_login, validate, ResponseView};
