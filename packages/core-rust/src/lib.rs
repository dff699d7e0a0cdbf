//! `RegSync` Core: error tree, retry classification, backoff schedules, the
//! operation data model and the registry snapshot.
//!
//! Nothing in this crate touches an async runtime or the network.

pub mod backoff;
pub mod classify;
pub mod clock;
pub mod endpoint;
pub mod error;
pub mod header;
pub mod model;
pub mod operation;
pub mod snapshot;

pub use backoff::{PollSchedule, PollStep, ResubmitSchedule, ScheduleError};
pub use classify::{Classification, ErrorClassifier, Transience};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use endpoint::{Endpoint, Stand};
pub use error::{codes, IndexedFailure, RegistryError};
pub use header::{ClientIdentity, OrganizationRole, RequestHeader};
pub use model::{
    Accommodation, Account, AccountReason, AddressObject, Building, BuildingKind, Contract,
    ContractKind, DeviceKind, DeviceStatus, MeterReading, MeteringDevice, Premises, ReasonKind,
};
pub use operation::{
    Acknowledgment, Cursor, OperationResult, Page, PageMarker, ReadyState, RemoteFault,
    RemoteRequest, Submission,
};
pub use snapshot::{Snapshot, SnapshotError};
