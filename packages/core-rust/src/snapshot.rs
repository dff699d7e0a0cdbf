//! The assembled registry snapshot and its queries.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write as _};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::model::{
    Account, AddressObject, Building, Contract, ContractKind, MeteringDevice, Premises,
};

/// Errors reading or writing a snapshot document.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// Contracts with every address, building, account and metering device
/// reachable from them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub contracts: Vec<Contract>,
    pub addresses: Vec<AddressObject>,
    pub buildings: Vec<Building>,
    pub accounts: Vec<Account>,
    pub devices: Vec<MeteringDevice>,
}

impl Snapshot {
    #[must_use]
    pub fn find_contract_by_number(&self, number: &str) -> Option<&Contract> {
        self.contracts.iter().find(|c| c.number == number)
    }

    /// Whether `account` belongs to any contract of the snapshot.
    #[must_use]
    pub fn is_account_linked_to_contracts(&self, account: &Account) -> bool {
        self.contracts.iter().any(|c| account.is_linked_to(c))
    }

    /// Whether `device` is bound to any account of the snapshot.
    #[must_use]
    pub fn is_device_linked_to_accounts(&self, device: &MeteringDevice) -> bool {
        self.accounts.iter().any(|a| device.is_linked_to_account(a))
    }

    pub fn addresses_of_contract<'a>(
        &'a self,
        contract: &'a Contract,
    ) -> impl Iterator<Item = &'a AddressObject> + 'a {
        self.addresses.iter().filter(move |a| a.is_linked_to(contract))
    }

    #[must_use]
    pub fn building(&self, building_id: Uuid) -> Option<&Building> {
        self.buildings.iter().find(|b| b.building_id == building_id)
    }

    #[must_use]
    pub fn building_of_premises(&self, premises_id: Uuid) -> Option<&Building> {
        self.buildings
            .iter()
            .find(|b| b.contains_premises(premises_id))
    }

    /// Building of the first accommodation that resolves to known premises.
    #[must_use]
    pub fn building_of_account(&self, account: &Account) -> Option<&Building> {
        account
            .premises_ids()
            .find_map(|id| self.building_of_premises(id))
    }

    /// Premises of the address object's building; empty when the building is
    /// unknown or a stub.
    #[must_use]
    pub fn premises_of_address(&self, address: &AddressObject) -> &[Premises] {
        self.building(address.building_id)
            .map(|b| b.premises.as_slice())
            .unwrap_or_default()
    }

    /// First premises the account is placed in, with its building.
    #[must_use]
    pub fn premises_of_account(&self, account: &Account) -> Option<(&Building, &Premises)> {
        account.premises_ids().find_map(|id| {
            self.buildings.iter().find_map(|b| {
                b.premises
                    .iter()
                    .find(|p| p.premises_id == id)
                    .map(|p| (b, p))
            })
        })
    }

    pub fn devices_of_account<'a>(
        &'a self,
        account: &'a Account,
    ) -> impl Iterator<Item = &'a MeteringDevice> + 'a {
        self.devices
            .iter()
            .filter(move |d| d.is_linked_to_account(account))
    }

    /// Devices that belong to `contract`: through its address objects for a
    /// public offer, through its accounts for non-residential premises.
    #[must_use]
    pub fn devices_of_contract(&self, contract: &Contract) -> Vec<&MeteringDevice> {
        match contract.kind {
            ContractKind::PublicOffer => {
                let addresses: Vec<&AddressObject> = self.addresses_of_contract(contract).collect();
                self.devices
                    .iter()
                    .filter(|d| addresses.iter().any(|a| d.is_linked_to_address(a)))
                    .collect()
            }
            ContractKind::NonResidential => {
                let accounts: Vec<&Account> = self
                    .accounts
                    .iter()
                    .filter(|a| a.is_linked_to(contract))
                    .collect();
                self.devices
                    .iter()
                    .filter(|d| accounts.iter().any(|a| d.is_linked_to_account(a)))
                    .collect()
            }
            ContractKind::Other => Vec::new(),
        }
    }

    /// Drops every account placed in premises of the given building. Returns
    /// the number removed.
    pub fn remove_building_accounts(&mut self, building_id: Uuid) -> usize {
        let Some(building) = self.building(building_id) else {
            return 0;
        };
        let premises: HashSet<Uuid> = building.premises.iter().map(|p| p.premises_id).collect();
        if premises.is_empty() {
            return 0;
        }

        let before = self.accounts.len();
        self.accounts
            .retain(|a| !a.premises_ids().any(|id| premises.contains(&id)));
        before - self.accounts.len()
    }

    /// Replaces the building's accounts with the active ones from `accounts`
    /// that belong to a contract of the snapshot. Returns the number kept.
    pub fn replace_building_accounts(
        &mut self,
        building_id: Uuid,
        accounts: impl IntoIterator<Item = Account>,
    ) -> usize {
        self.remove_building_accounts(building_id);
        let kept: Vec<Account> = accounts
            .into_iter()
            .filter(|a| a.is_active() && self.is_account_linked_to_contracts(a))
            .collect();
        let count = kept.len();
        self.accounts.extend(kept);
        count
    }

    /// # Errors
    ///
    /// Returns [`SnapshotError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// # Errors
    ///
    /// Returns [`SnapshotError::Json`] if the document is not a snapshot.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    /// # Errors
    ///
    /// Returns [`SnapshotError`] on I/O or serialization failure.
    pub fn write_json_file(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        debug!(path = %path.display(), snapshot = %self, "snapshot written");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`SnapshotError`] on I/O or deserialization failure.
    pub fn read_json_file(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Self = serde_json::from_reader(reader)?;
        debug!(path = %path.display(), snapshot = %snapshot, "snapshot loaded");
        Ok(snapshot)
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "contracts={} addresses={} buildings={} accounts={} devices={}",
            self.contracts.len(),
            self.addresses.len(),
            self.buildings.len(),
            self.accounts.len(),
            self.devices.len()
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
