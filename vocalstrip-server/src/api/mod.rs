//! HTTP API handlers for vocalstrip-server

pub mod health;
pub mod output;
pub mod process;

pub use health::health_routes;
pub use output::output_routes;
pub use process::process_routes;
