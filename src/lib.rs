/*
 * Megadrome - Swap Engine for the Megadrome DEX on Monad
 * Core library exports and module declarations
 */

pub mod api;
pub mod config;
pub mod dex;
pub mod metrics;
pub mod models;
pub mod rpc;
pub mod service;
pub mod settings;
pub mod swap;
pub mod tokens;
pub mod utils;

pub use config::Config;
pub use models::*;
pub use service::SwapService;
