//! `RegSync` Client: the asynchronous operation engine and the registry
//! snapshot assembler built on it.
//!
//! The engine drives a [`RemoteGateway`] through submit, acknowledge and poll
//! with classified retries, pages cursor-based exports and fans work out under
//! a concurrency cap. [`SnapshotAssembler`] combines registry reads into one
//! referentially consistent [`Snapshot`](regsync_core::Snapshot).

pub mod config;
pub mod engine;
pub mod gateway;
pub mod registry;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use config::{ClientConfig, ConfigError, EngineConfig};
pub use engine::{bounded_for_each, for_each_page, AsyncOperationRunner, OperationOptions, PageScan};
pub use gateway::{RegistryGateway, RemoteGateway};
pub use registry::{
    RegistryPayload, RegistryRequest, RunnerRegistry, SnapshotAssembler, DEFAULT_MAX_CONCURRENCY,
};
pub use telemetry::{init_tracing, LogFormat};
