//! [`RegistryGateway`] on top of the asynchronous operation runner.
//!
//! Every registry call is one [`RegistryRequest`] submitted through a
//! [`RemoteGateway`] and polled to completion by [`AsyncOperationRunner`].
//! Exports may be resubmitted; imports are submitted once.

use std::sync::Arc;

use async_trait::async_trait;
use regsync_core::{
    Account, AddressObject, Building, Contract, Cursor, Endpoint, MeterReading, MeteringDevice,
    Page, RegistryError, RemoteRequest,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::engine::{AsyncOperationRunner, OperationOptions};
use crate::gateway::{RegistryGateway, RemoteGateway};

/// Registry requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryRequest {
    ExportContracts {
        cursor: Option<Cursor>,
    },
    ExportContractAddresses {
        contract_root_id: Uuid,
        contract_version_id: Uuid,
        cursor: Option<Cursor>,
    },
    ExportBuilding {
        building_id: Uuid,
    },
    ExportBuildingAccounts {
        building_id: Uuid,
        cursor: Option<Cursor>,
    },
    ExportBuildingDevices {
        building_id: Uuid,
        cursor: Option<Cursor>,
    },
    /// Places a device reading in the registry. Not idempotent.
    ImportMeterReading {
        reading: MeterReading,
    },
}

impl RemoteRequest for RegistryRequest {
    fn kind(&self) -> &'static str {
        match self {
            Self::ExportContracts { .. } => "export_contracts",
            Self::ExportContractAddresses { .. } => "export_contract_addresses",
            Self::ExportBuilding { .. } => "export_building",
            Self::ExportBuildingAccounts { .. } => "export_building_accounts",
            Self::ExportBuildingDevices { .. } => "export_building_devices",
            Self::ImportMeterReading { .. } => "import_meter_reading",
        }
    }

    fn endpoint(&self) -> Endpoint {
        match self {
            Self::ImportMeterReading { .. } => Endpoint::DeviceMeteringAsync,
            _ => Endpoint::HomeManagementAsync,
        }
    }
}

/// Decoded results of [`RegistryRequest`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryPayload {
    Contracts(Page<Contract>),
    Addresses(Page<AddressObject>),
    Building(Building),
    Accounts(Page<Account>),
    Devices(Page<MeteringDevice>),
    /// Registry acceptance time of an imported reading.
    ReadingAccepted { accepted_at_ms: u64 },
}

impl RegistryPayload {
    fn variant(&self) -> &'static str {
        match self {
            Self::Contracts(_) => "contracts",
            Self::Addresses(_) => "addresses",
            Self::Building(_) => "building",
            Self::Accounts(_) => "accounts",
            Self::Devices(_) => "devices",
            Self::ReadingAccepted { .. } => "reading accepted",
        }
    }
}

fn unexpected(request: &RegistryRequest, payload: &RegistryPayload) -> RegistryError {
    RegistryError::protocol(format!(
        "{} answered with a {} payload",
        request.kind(),
        payload.variant()
    ))
}

/// Runs registry calls through an [`AsyncOperationRunner`]. All reads are
/// restartable and the address export is expected to finish quickly. Imports
/// run single-shot, bounded by the configured write wait limit.
pub struct RunnerRegistry<G> {
    runner: AsyncOperationRunner<G>,
}

impl<G> RunnerRegistry<G>
where
    G: RemoteGateway<Request = RegistryRequest, Payload = RegistryPayload>,
{
    #[must_use]
    pub fn new(gateway: Arc<G>, config: Arc<ClientConfig>) -> Self {
        Self {
            runner: AsyncOperationRunner::new(gateway, config),
        }
    }

    #[must_use]
    pub fn runner(&self) -> &AsyncOperationRunner<G> {
        &self.runner
    }

    async fn call(
        &self,
        request: RegistryRequest,
        options: OperationOptions,
        cancel: &CancellationToken,
    ) -> Result<(RegistryRequest, RegistryPayload), RegistryError> {
        let payload = self.runner.run(&request, &options, cancel).await?;
        Ok((request, payload))
    }

    /// Imports one device reading and returns the time the registry accepted
    /// it. The request is never resubmitted, so a transient failure of the
    /// submission is returned to the caller.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Protocol`] for a malformed reading, before anything
    ///   is sent, or for an answer of the wrong kind.
    /// - [`RegistryError::WaitLimitExceeded`] when the configured write wait
    ///   limit elapses.
    /// - Any error of the submission or the result.
    pub async fn import_meter_reading(
        &self,
        reading: &MeterReading,
        cancel: &CancellationToken,
    ) -> Result<u64, RegistryError> {
        reading.check()?;
        let mut options = OperationOptions::single_shot();
        if let Some(limit) = self.runner.config().engine.write_wait_limit {
            options = options.with_wait_limit(limit);
        }
        let request = RegistryRequest::ImportMeterReading {
            reading: reading.clone(),
        };
        match self.call(request, options, cancel).await? {
            (_, RegistryPayload::ReadingAccepted { accepted_at_ms }) => Ok(accepted_at_ms),
            (request, other) => Err(unexpected(&request, &other)),
        }
    }
}

#[async_trait]
impl<G> RegistryGateway for RunnerRegistry<G>
where
    G: RemoteGateway<Request = RegistryRequest, Payload = RegistryPayload>,
{
    async fn fetch_contracts_page(
        &self,
        cursor: Option<Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page<Contract>, RegistryError> {
        let request = RegistryRequest::ExportContracts { cursor };
        match self.call(request, OperationOptions::restartable(), cancel).await? {
            (_, RegistryPayload::Contracts(page)) => Ok(page),
            (request, other) => Err(unexpected(&request, &other)),
        }
    }

    async fn fetch_contract_addresses_page(
        &self,
        contract: &Contract,
        cursor: Option<Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page<AddressObject>, RegistryError> {
        let request = RegistryRequest::ExportContractAddresses {
            contract_root_id: contract.root_id,
            contract_version_id: contract.version_id,
            cursor,
        };
        let options = OperationOptions::restartable().lightweight();
        match self.call(request, options, cancel).await? {
            (_, RegistryPayload::Addresses(page)) => Ok(page),
            (request, other) => Err(unexpected(&request, &other)),
        }
    }

    async fn fetch_building(
        &self,
        building_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Building, RegistryError> {
        let request = RegistryRequest::ExportBuilding { building_id };
        match self.call(request, OperationOptions::restartable(), cancel).await? {
            (_, RegistryPayload::Building(building)) => Ok(building),
            (request, other) => Err(unexpected(&request, &other)),
        }
    }

    async fn fetch_building_accounts_page(
        &self,
        building_id: Uuid,
        cursor: Option<Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page<Account>, RegistryError> {
        let request = RegistryRequest::ExportBuildingAccounts { building_id, cursor };
        match self.call(request, OperationOptions::restartable(), cancel).await? {
            (_, RegistryPayload::Accounts(page)) => Ok(page),
            (request, other) => Err(unexpected(&request, &other)),
        }
    }

    async fn fetch_building_devices_page(
        &self,
        building_id: Uuid,
        cursor: Option<Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page<MeteringDevice>, RegistryError> {
        let request = RegistryRequest::ExportBuildingDevices { building_id, cursor };
        match self.call(request, OperationOptions::restartable(), cancel).await? {
            (_, RegistryPayload::Devices(page)) => Ok(page),
            (request, other) => Err(unexpected(&request, &other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
