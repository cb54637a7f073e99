#![allow(clippy::new_without_default)]

pub mod config;
pub mod error;
pub mod oauth;
pub mod store;
pub mod util;
pub mod webapi;

pub use oauth::{AuthConfig, TokenProvider};
