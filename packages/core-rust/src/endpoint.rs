//! Service endpoint paths and target stands.
//!
//! Path resolution is a pure function of the [`Endpoint`] value; the host
//! comes from the configured [`Stand`]. There is no process-wide registry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A remote service endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    OrgRegistry,
    OrgRegistryAsync,
    OrgRegistryCommon,
    OrgRegistryCommonAsync,
    NsiCommon,
    NsiCommonAsync,
    Nsi,
    NsiAsync,
    HomeManagement,
    HomeManagementAsync,
    DebtRequestsAsync,
    Bills,
    BillsAsync,
    Licenses,
    LicensesAsync,
    DeviceMetering,
    DeviceMeteringAsync,
    PaymentsAsync,
}

impl Endpoint {
    /// Path of the endpoint relative to the stand's host.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::OrgRegistry => "ext-bus-org-registry-service/services/OrgRegistry",
            Self::OrgRegistryAsync => "ext-bus-org-registry-service/services/OrgRegistryAsync",
            Self::OrgRegistryCommon => {
                "ext-bus-org-registry-common-service/services/OrgRegistryCommon"
            }
            Self::OrgRegistryCommonAsync => {
                "ext-bus-org-registry-common-service/services/OrgRegistryCommonAsync"
            }
            Self::NsiCommon => "ext-bus-nsi-common-service/services/NsiCommon",
            Self::NsiCommonAsync => "ext-bus-nsi-common-service/services/NsiCommonAsync",
            Self::Nsi => "ext-bus-nsi-service/services/Nsi",
            Self::NsiAsync => "ext-bus-nsi-service/services/NsiAsync",
            Self::HomeManagement => "ext-bus-home-management-service/services/HomeManagement",
            Self::HomeManagementAsync => {
                "ext-bus-home-management-service/services/HomeManagementAsync"
            }
            Self::DebtRequestsAsync => "ext-bus-debtreq-service/services/DebtRequestsAsync",
            Self::Bills => "ext-bus-bills-service/services/Bills",
            Self::BillsAsync => "ext-bus-bills-service/services/BillsAsync",
            Self::Licenses => "ext-bus-licenses-service/services/Licenses",
            Self::LicensesAsync => "ext-bus-licenses-service/services/LicensesAsync",
            Self::DeviceMetering => "ext-bus-device-metering-service/services/DeviceMetering",
            Self::DeviceMeteringAsync => {
                "ext-bus-device-metering-service/services/DeviceMeteringAsync"
            }
            Self::PaymentsAsync => "ext-bus-payment-service/services/PaymentAsync",
        }
    }

    /// Whether the endpoint follows the submit/acknowledge/poll contract.
    #[must_use]
    pub fn is_async(self) -> bool {
        matches!(
            self,
            Self::OrgRegistryAsync
                | Self::OrgRegistryCommonAsync
                | Self::NsiCommonAsync
                | Self::NsiAsync
                | Self::HomeManagementAsync
                | Self::DebtRequestsAsync
                | Self::BillsAsync
                | Self::LicensesAsync
                | Self::DeviceMeteringAsync
                | Self::PaymentsAsync
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Target installation of the remote registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stand {
    /// Production installation.
    #[default]
    Production,
    /// Integration testing installation.
    Testing,
    /// Local plain-HTTP tunnel forwarding to one of the above.
    Tunnel,
}

impl Stand {
    /// Host (and port, where non-standard) of the stand.
    #[must_use]
    pub fn host(self) -> &'static str {
        match self {
            Self::Production => "api.dom.gosuslugi.ru",
            Self::Testing => "sit01.dom.test.gosuslugi.ru:10081",
            Self::Tunnel => "127.0.0.1:8080",
        }
    }

    #[must_use]
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Tunnel => "http",
            Self::Production | Self::Testing => "https",
        }
    }

    /// Absolute URI of `endpoint` on this stand.
    #[must_use]
    pub fn endpoint_uri(self, endpoint: Endpoint) -> String {
        format!("{}://{}/{}", self.scheme(), self.host(), endpoint.path())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
