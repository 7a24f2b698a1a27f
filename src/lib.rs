//! tier0-feeder
//!
//! Daemon del feeder Tier0: arma el loop de control sobre los backends
//! Postgres de `feeder-persistence` y lo ejecuta periódicamente.

pub mod config;
pub mod errors;
pub mod schedule;
pub mod wiring;

pub use config::AppConfig;
pub use errors::AppError;
