#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod auth;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod jobs;
pub mod render;
pub mod request;
pub mod store;
pub mod tokens;

pub use config::Config;
pub use dispatch::{Dispatcher, JobRunner, Reply};
pub use error::{Error, ErrorKind, Result};
pub use store::Store;
