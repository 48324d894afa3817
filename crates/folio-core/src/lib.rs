pub mod analytics;
pub mod config;
pub mod error;
pub mod event;
pub mod period;
pub mod reports;
pub mod visitor;
