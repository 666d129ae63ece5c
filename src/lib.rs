pub mod api;
pub mod config;
pub mod error;
pub mod flows;
pub mod geo;
pub mod models;
pub mod observability;
pub mod state;
