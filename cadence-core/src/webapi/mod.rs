mod client;
pub mod model;

use std::sync::Arc;

pub use client::{WebApi, API_BASE_URL};

pub type WebApiHandle = Arc<WebApi>;
