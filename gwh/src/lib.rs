//! Front-end for the generic admission webhook: an axum server multiplexing
//! logical webhooks by URL path, a hot-reloading config loader and a one-shot
//! CLI mode. The rule engine itself lives in [`gwh_core`].

pub mod cli;
pub mod reload;
pub mod server;

pub use reload::ConfigLoader;
