//! Registry entities collected into a snapshot.
//!
//! These are decoded domain records; the link predicates here are the foreign
//! key joins used by the assembler's filters and by the snapshot queries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RegistryError;

/// Kind of supply contract, as far as device lookup is concerned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    /// Public offer to residents; devices are found through address objects.
    PublicOffer,
    /// Contract for non-residential premises; devices are found through
    /// accounts.
    NonResidential,
    #[default]
    Other,
}

/// Resource supply contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Identifier shared by all versions of the contract.
    pub root_id: Uuid,
    /// Identifier of this version.
    pub version_id: Uuid,
    pub number: String,
    #[serde(default)]
    pub kind: ContractKind,
}

/// A building (or premises within one) covered by a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressObject {
    pub contract_root_id: Uuid,
    pub contract_version_id: Uuid,
    /// FIAS identifier of the building.
    pub building_id: Uuid,
    pub object_id: Uuid,
    /// Building type code as delivered (`MKD`, `ZHD`, ...).
    #[serde(default)]
    pub building_type: Option<String>,
    #[serde(default)]
    pub apartment_number: Option<String>,
    #[serde(default)]
    pub room_number: Option<String>,
}

impl AddressObject {
    #[must_use]
    pub fn is_linked_to(&self, contract: &Contract) -> bool {
        self.contract_root_id == contract.root_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingKind {
    ApartmentBuilding,
    Residential,
}

/// Residential or non-residential premises within a building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Premises {
    pub premises_id: Uuid,
    pub residential: bool,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub terminated_at_ms: Option<u64>,
    #[serde(default)]
    pub annulment: Option<String>,
}

/// A building with its full premises list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    /// FIAS identifier.
    pub building_id: Uuid,
    /// `None` for a stub that could not be fetched.
    #[serde(default)]
    pub kind: Option<BuildingKind>,
    #[serde(default)]
    pub registry_number: Option<String>,
    #[serde(default)]
    pub premises: Vec<Premises>,
}

impl Building {
    /// A record carrying only the identifier, used when the registry refuses
    /// to return the building.
    #[must_use]
    pub fn stub(building_id: Uuid) -> Self {
        Self {
            building_id,
            kind: None,
            registry_number: None,
            premises: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_stub(&self) -> bool {
        self.kind.is_none() && self.registry_number.is_none() && self.premises.is_empty()
    }

    #[must_use]
    pub fn contains_premises(&self, premises_id: Uuid) -> bool {
        self.premises.iter().any(|p| p.premises_id == premises_id)
    }
}

/// Where an account is placed. Exactly one of the ids is normally set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accommodation {
    #[serde(default)]
    pub building_id: Option<Uuid>,
    #[serde(default)]
    pub premises_id: Option<Uuid>,
    #[serde(default)]
    pub living_room_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    #[default]
    SupplyContract,
    SocialTenancy,
    Contract,
}

/// Contract an account was opened under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountReason {
    #[serde(default)]
    pub kind: ReasonKind,
    /// Root or version id of the contract.
    pub contract_id: Uuid,
    #[serde(default)]
    pub contract_number: Option<String>,
}

/// Personal account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: Uuid,
    pub number: String,
    #[serde(default)]
    pub unified_number: Option<String>,
    #[serde(default)]
    pub created_at_ms: Option<u64>,
    #[serde(default)]
    pub closed_at_ms: Option<u64>,
    #[serde(default)]
    pub accommodations: Vec<Accommodation>,
    #[serde(default)]
    pub reasons: Vec<AccountReason>,
}

impl Account {
    /// An account is active until it has a closing date.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.closed_at_ms.is_none()
    }

    /// Whether any reason points at `contract` by root id, version id or
    /// contract number.
    #[must_use]
    pub fn is_linked_to(&self, contract: &Contract) -> bool {
        self.reasons.iter().any(|r| {
            r.contract_id == contract.version_id
                || r.contract_id == contract.root_id
                || r.contract_number.as_deref() == Some(contract.number.as_str())
        })
    }

    /// Premises ids of the account's accommodations.
    pub fn premises_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.accommodations.iter().filter_map(|a| a.premises_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    #[default]
    Active,
    Archived,
    Draft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    ResidentialPremises,
    NonResidentialPremises,
    /// Building-level collective device.
    Collective,
    CollectiveApartment,
    LivingRoom,
    ApartmentHouse,
}

/// Metering device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeteringDevice {
    pub device_id: Uuid,
    pub version_id: Uuid,
    #[serde(default)]
    pub status: DeviceStatus,
    pub kind: DeviceKind,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub account_ids: Vec<Uuid>,
    #[serde(default)]
    pub premises_ids: Vec<Uuid>,
    #[serde(default)]
    pub building_ids: Vec<Uuid>,
    #[serde(default)]
    pub living_room_ids: Vec<Uuid>,
}

impl MeteringDevice {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == DeviceStatus::Active
    }

    #[must_use]
    pub fn is_collective(&self) -> bool {
        self.kind == DeviceKind::Collective
    }

    #[must_use]
    pub fn is_linked_to_account(&self, account: &Account) -> bool {
        self.account_ids.contains(&account.account_id)
    }

    #[must_use]
    pub fn is_linked_to_address(&self, address: &AddressObject) -> bool {
        self.building_ids.contains(&address.building_id)
    }
}

/// Current reading of a metering device, one value per tariff zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterReading {
    pub device_root_id: Uuid,
    pub taken_at_ms: u64,
    /// Decimal values for tariff zones T1..T3.
    pub tariff_values: Vec<String>,
}

impl MeterReading {
    /// Most tariff zones a single reading may carry.
    pub const MAX_TARIFFS: usize = 3;

    /// # Errors
    ///
    /// Returns [`RegistryError::Protocol`] when the reading has no tariff
    /// values, more than [`Self::MAX_TARIFFS`], or a blank one.
    pub fn check(&self) -> Result<(), RegistryError> {
        let count = self.tariff_values.len();
        if count == 0 || count > Self::MAX_TARIFFS {
            return Err(RegistryError::protocol(format!(
                "reading of device {} carries {count} tariff values",
                self.device_root_id
            )));
        }
        if self.tariff_values.iter().any(|v| v.trim().is_empty()) {
            return Err(RegistryError::protocol(format!(
                "reading of device {} has a blank tariff value",
                self.device_root_id
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
