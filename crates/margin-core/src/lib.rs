//! Margin Core Components
//!
//! This crate provides the service layer for Margin: configuration
//! loading and the explicitly constructed index service the application
//! owns for one workspace session.

mod config;
mod error;
mod service;

pub use config::Config;
pub use error::CoreError;
pub use service::IndexService;
