#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(clippy::missing_errors_doc)]

mod schema;

pub use schema::{
    API_KEY_ENV, AgentDefaults, AgentsConfig, Config, ProviderConfig, ProvidersConfig,
    StorageBackend, StorageConfig,
};
