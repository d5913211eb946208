//! HTTP route handlers.

pub mod convert;
pub mod download;
pub mod health;
pub mod progress;
