//! Collaborator traits at the edge of the engine.
//!
//! [`RemoteGateway`] is the raw submit/poll transport the runner drives.
//! [`RegistryGateway`] is what the snapshot assembler consumes: one opaque
//! asynchronous call per page or entity.

use async_trait::async_trait;
use regsync_core::{
    AddressObject, Account, Acknowledgment, Building, Contract, Cursor, MeteringDevice,
    OperationResult, Page, RegistryError, RemoteRequest, RequestHeader, Submission,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Transport for the submit/acknowledge/poll contract. Encoding, signing and
/// authentication live behind it.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    type Request: RemoteRequest;
    type Payload: Send;

    /// Submits a request and returns its acknowledgment.
    async fn submit(
        &self,
        submission: Submission<'_, Self::Request>,
    ) -> Result<Acknowledgment, RegistryError>;

    /// Asks once for the result of an acknowledged request. `Ok(None)` means
    /// not ready yet. Must not block longer than one bounded call.
    async fn poll_once(
        &self,
        header: RequestHeader,
        ack: &Acknowledgment,
    ) -> Result<Option<OperationResult<Self::Payload>>, RegistryError>;
}

/// Registry reads used by the snapshot assembler.
#[async_trait]
pub trait RegistryGateway: Send + Sync {
    /// One page of the supply contracts visible to the caller.
    async fn fetch_contracts_page(
        &self,
        cursor: Option<Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page<Contract>, RegistryError>;

    /// One page of the address objects of `contract`.
    async fn fetch_contract_addresses_page(
        &self,
        contract: &Contract,
        cursor: Option<Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page<AddressObject>, RegistryError>;

    /// A building with its full premises list.
    async fn fetch_building(
        &self,
        building_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Building, RegistryError>;

    /// One page of the accounts placed in a building.
    async fn fetch_building_accounts_page(
        &self,
        building_id: Uuid,
        cursor: Option<Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page<Account>, RegistryError>;

    /// One page of the metering devices installed in a building.
    async fn fetch_building_devices_page(
        &self,
        building_id: Uuid,
        cursor: Option<Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page<MeteringDevice>, RegistryError>;
}
