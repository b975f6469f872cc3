//! The multi-registry ResourceX client (C9): a local engine plus a
//! registry chain with freshness checking.

pub mod chain;
pub mod config;
pub mod engine;
pub mod http;

pub use config::{ClientConfig, ClientConfigInput};
pub use engine::Engine;
pub use http::{HttpRegistryClient, RegistryApi};
