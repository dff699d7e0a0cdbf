//! Registry reads on top of the engine, and the snapshot assembler that
//! combines them.

pub mod adapter;
pub mod assembler;

pub use adapter::{RegistryPayload, RegistryRequest, RunnerRegistry};
pub use assembler::{SnapshotAssembler, DEFAULT_MAX_CONCURRENCY};
