pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod geo;
pub mod ingest;
pub mod realtime;
pub mod routes;
pub mod state;
