//! Test doubles shared by the engine and assembler tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use regsync_core::{
    codes, Accommodation, Account, AccountReason, Acknowledgment, AddressObject, Building,
    BuildingKind, Contract, ContractKind, Cursor, DeviceKind, DeviceStatus, Endpoint,
    MeteringDevice, OperationResult, Page, Premises, ReasonKind, RegistryError, RemoteFault,
    RemoteRequest, RequestHeader, Submission,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::gateway::{RegistryGateway, RemoteGateway};
use crate::registry::{RegistryPayload, RegistryRequest};

// ---------------------------------------------------------------------------
// ScriptedGateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TestRequest {
    pub name: &'static str,
    pub endpoint: Endpoint,
}

impl RemoteRequest for TestRequest {
    fn kind(&self) -> &'static str {
        self.name
    }

    fn endpoint(&self) -> Endpoint {
        self.endpoint
    }
}

pub(crate) type PollReply = Result<Option<OperationResult<String>>, RegistryError>;

/// Replays queued replies. An empty submit queue acknowledges, an empty poll
/// queue reports "not ready".
#[derive(Default)]
pub(crate) struct ScriptedGateway {
    submit_replies: Mutex<VecDeque<Result<(), RegistryError>>>,
    poll_replies: Mutex<VecDeque<PollReply>>,
    submissions: Mutex<Vec<(RequestHeader, String)>>,
    polls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit_fails(self, err: RegistryError) -> Self {
        self.submit_replies.lock().push_back(Err(err));
        self
    }

    pub fn not_ready(self, times: usize) -> Self {
        {
            let mut polls = self.poll_replies.lock();
            for _ in 0..times {
                polls.push_back(Ok(None));
            }
        }
        self
    }

    pub fn poll_fails(self, err: RegistryError) -> Self {
        self.poll_replies.lock().push_back(Err(err));
        self
    }

    pub fn poll_returns(self, result: OperationResult<String>) -> Self {
        self.poll_replies.lock().push_back(Ok(Some(result)));
        self
    }

    pub fn ready(self, payload: &str) -> Self {
        self.poll_returns(OperationResult::ready(payload.to_string()))
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    pub fn message_ids(&self) -> Vec<Uuid> {
        self.submissions
            .lock()
            .iter()
            .map(|(h, _)| h.message_id)
            .collect()
    }

    pub fn uris(&self) -> Vec<String> {
        self.submissions
            .lock()
            .iter()
            .map(|(_, uri)| uri.clone())
            .collect()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteGateway for ScriptedGateway {
    type Request = TestRequest;
    type Payload = String;

    async fn submit(
        &self,
        submission: Submission<'_, TestRequest>,
    ) -> Result<Acknowledgment, RegistryError> {
        let n = {
            let mut submissions = self.submissions.lock();
            submissions.push((submission.header, submission.uri));
            submissions.len()
        };
        let reply = self.submit_replies.lock().pop_front();
        match reply {
            Some(Err(err)) => Err(err),
            Some(Ok(())) | None => Acknowledgment::new(format!("ack-{n}")),
        }
    }

    async fn poll_once(
        &self,
        _header: RequestHeader,
        _ack: &Acknowledgment,
    ) -> Result<Option<OperationResult<String>>, RegistryError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let reply = self.poll_replies.lock().pop_front();
        reply.unwrap_or(Ok(None))
    }
}

// ---------------------------------------------------------------------------
// FakeRegistry
// ---------------------------------------------------------------------------

/// In-memory registry contents.
#[derive(Debug, Clone, Default)]
pub(crate) struct RegistryGraph {
    pub contracts: Vec<Contract>,
    pub addresses: Vec<AddressObject>,
    pub buildings: Vec<Building>,
    pub accounts: HashMap<Uuid, Vec<Account>>,
    pub devices: HashMap<Uuid, Vec<MeteringDevice>>,
    /// Buildings the registry refuses to return, with the error code.
    pub refused: HashMap<Uuid, &'static str>,
}

impl RegistryGraph {
    fn addresses_of(&self, contract_root_id: Uuid) -> Vec<AddressObject> {
        self.addresses
            .iter()
            .filter(|a| a.contract_root_id == contract_root_id)
            .cloned()
            .collect()
    }

    fn building(&self, building_id: Uuid) -> Result<Building, RegistryError> {
        if let Some(code) = self.refused.get(&building_id) {
            return Err(RegistryError::remote(*code, "refused"));
        }
        self.buildings
            .iter()
            .find(|b| b.building_id == building_id)
            .cloned()
            .ok_or_else(|| RegistryError::remote(codes::NOT_IN_REGISTRY, "not in registry"))
    }

    fn accounts_of(&self, building_id: Uuid) -> Vec<Account> {
        self.accounts.get(&building_id).cloned().unwrap_or_default()
    }

    fn devices_of(&self, building_id: Uuid) -> Vec<MeteringDevice> {
        self.devices.get(&building_id).cloned().unwrap_or_default()
    }
}

/// One page of `items`, answering "no objects" for an empty listing like the
/// real registry does.
fn page_of<T: Clone>(items: &[T], cursor: Option<Cursor>, page_size: usize) -> Result<Page<T>, RegistryError> {
    if items.is_empty() {
        return Err(RegistryError::remote(
            codes::NO_OBJECTS_FOR_EXPORT,
            "no objects for export",
        ));
    }
    let start = match cursor {
        None => 0,
        Some(c) => c
            .as_str()
            .parse::<usize>()
            .map_err(|_| RegistryError::protocol("bad cursor"))?,
    };
    if start >= items.len() {
        return Err(RegistryError::protocol("cursor past the end"));
    }
    let end = (start + page_size).min(items.len());
    let page = items[start..end].to_vec();
    if end == items.len() {
        Ok(Page::last(page))
    } else {
        Ok(Page::next(page, Cursor::new(end.to_string())?))
    }
}

/// Serves a [`RegistryGraph`] in pages of `page_size`.
pub(crate) struct FakeRegistry {
    graph: RegistryGraph,
    page_size: usize,
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeRegistry {
    pub fn new(graph: RegistryGraph, page_size: usize) -> Self {
        Self {
            graph,
            page_size,
            delay: Duration::ZERO,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call takes `delay` of (paused) tokio time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn call<T>(
        &self,
        cancel: &CancellationToken,
        answer: impl FnOnce() -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let slept = tokio::select! {
            () = cancel.cancelled() => Err(RegistryError::Cancelled),
            () = tokio::time::sleep(self.delay) => Ok(()),
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        slept?;
        answer()
    }
}

#[async_trait]
impl RegistryGateway for FakeRegistry {
    async fn fetch_contracts_page(
        &self,
        cursor: Option<Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page<Contract>, RegistryError> {
        self.call(cancel, || page_of(&self.graph.contracts, cursor, self.page_size))
            .await
    }

    async fn fetch_contract_addresses_page(
        &self,
        contract: &Contract,
        cursor: Option<Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page<AddressObject>, RegistryError> {
        let addresses = self.graph.addresses_of(contract.root_id);
        self.call(cancel, || page_of(&addresses, cursor, self.page_size))
            .await
    }

    async fn fetch_building(
        &self,
        building_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Building, RegistryError> {
        self.call(cancel, || {
            self.graph
                .building(building_id)
                .map_err(|e| e.context("export building"))
        })
        .await
    }

    async fn fetch_building_accounts_page(
        &self,
        building_id: Uuid,
        cursor: Option<Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page<Account>, RegistryError> {
        let accounts = self.graph.accounts_of(building_id);
        self.call(cancel, || page_of(&accounts, cursor, self.page_size))
            .await
    }

    async fn fetch_building_devices_page(
        &self,
        building_id: Uuid,
        cursor: Option<Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page<MeteringDevice>, RegistryError> {
        let devices = self.graph.devices_of(building_id);
        self.call(cancel, || page_of(&devices, cursor, self.page_size))
            .await
    }
}

// ---------------------------------------------------------------------------
// GraphGateway
// ---------------------------------------------------------------------------

/// Serves a [`RegistryGraph`] over the submit/poll protocol. Every poll
/// answers with a ready result; registry errors arrive as faults inside it.
pub(crate) struct GraphGateway {
    graph: RegistryGraph,
    page_size: usize,
    pending: Mutex<HashMap<String, RegistryRequest>>,
    submissions: AtomicUsize,
}

impl GraphGateway {
    pub fn new(graph: RegistryGraph, page_size: usize) -> Self {
        Self {
            graph,
            page_size,
            pending: Mutex::default(),
            submissions: AtomicUsize::new(0),
        }
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    fn answer(&self, request: &RegistryRequest) -> Result<RegistryPayload, RegistryError> {
        let size = self.page_size;
        match request {
            RegistryRequest::ExportContracts { cursor } => {
                page_of(&self.graph.contracts, cursor.clone(), size).map(RegistryPayload::Contracts)
            }
            RegistryRequest::ExportContractAddresses {
                contract_root_id,
                cursor,
                ..
            } => {
                let addresses = self.graph.addresses_of(*contract_root_id);
                page_of(&addresses, cursor.clone(), size).map(RegistryPayload::Addresses)
            }
            RegistryRequest::ExportBuilding { building_id } => {
                self.graph.building(*building_id).map(RegistryPayload::Building)
            }
            RegistryRequest::ExportBuildingAccounts { building_id, cursor } => {
                let accounts = self.graph.accounts_of(*building_id);
                page_of(&accounts, cursor.clone(), size).map(RegistryPayload::Accounts)
            }
            RegistryRequest::ExportBuildingDevices { building_id, cursor } => {
                let devices = self.graph.devices_of(*building_id);
                page_of(&devices, cursor.clone(), size).map(RegistryPayload::Devices)
            }
            RegistryRequest::ImportMeterReading { .. } => {
                Err(RegistryError::protocol("graph gateway serves exports only"))
            }
        }
    }
}

#[async_trait]
impl RemoteGateway for GraphGateway {
    type Request = RegistryRequest;
    type Payload = RegistryPayload;

    async fn submit(
        &self,
        submission: Submission<'_, RegistryRequest>,
    ) -> Result<Acknowledgment, RegistryError> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        let ack = Acknowledgment::new(format!("op-{n}"))?;
        self.pending
            .lock()
            .insert(ack.correlation_id().to_string(), submission.request.clone());
        Ok(ack)
    }

    async fn poll_once(
        &self,
        _header: RequestHeader,
        ack: &Acknowledgment,
    ) -> Result<Option<OperationResult<RegistryPayload>>, RegistryError> {
        let request = self.pending.lock().remove(ack.correlation_id());
        let Some(request) = request else {
            return Err(RegistryError::protocol(format!(
                "unknown acknowledgment {}",
                ack.correlation_id()
            )));
        };
        match self.answer(&request) {
            Ok(payload) => Ok(Some(OperationResult::ready(payload))),
            Err(err) => match err.code() {
                Some(code) => Ok(Some(OperationResult::failed(vec![RemoteFault {
                    code: code.to_string(),
                    description: err.to_string(),
                }]))),
                None => Err(err),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Sample graph
// ---------------------------------------------------------------------------

fn contract(number: &str, kind: ContractKind) -> Contract {
    Contract {
        root_id: Uuid::new_v4(),
        version_id: Uuid::new_v4(),
        number: number.to_string(),
        kind,
    }
}

fn address(contract: &Contract, building_id: Uuid) -> AddressObject {
    AddressObject {
        contract_root_id: contract.root_id,
        contract_version_id: contract.version_id,
        building_id,
        object_id: Uuid::new_v4(),
        building_type: Some("MKD".to_string()),
        apartment_number: None,
        room_number: None,
    }
}

fn account(number: &str, premises_id: Uuid, reason: AccountReason, closed: bool) -> Account {
    Account {
        account_id: Uuid::new_v4(),
        number: number.to_string(),
        unified_number: None,
        created_at_ms: Some(1),
        closed_at_ms: closed.then_some(2),
        accommodations: vec![Accommodation {
            premises_id: Some(premises_id),
            ..Accommodation::default()
        }],
        reasons: vec![reason],
    }
}

fn by_root(c: &Contract) -> AccountReason {
    AccountReason {
        kind: ReasonKind::SupplyContract,
        contract_id: c.root_id,
        contract_number: None,
    }
}

fn device(
    serial: &str,
    kind: DeviceKind,
    status: DeviceStatus,
    account_ids: Vec<Uuid>,
    building_id: Uuid,
) -> MeteringDevice {
    MeteringDevice {
        device_id: Uuid::new_v4(),
        version_id: Uuid::new_v4(),
        status,
        kind,
        serial_number: Some(serial.to_string()),
        account_ids,
        premises_ids: vec![],
        building_ids: vec![building_id],
        living_room_ids: vec![],
    }
}

fn premises() -> Premises {
    Premises {
        premises_id: Uuid::new_v4(),
        residential: true,
        number: Some("1".to_string()),
        terminated_at_ms: None,
        annulment: None,
    }
}

/// Ids of the sample graph's buildings.
pub(crate) struct SampleBuildings {
    /// Access denied.
    pub b1: Uuid,
    pub b2: Uuid,
    /// Not in registry.
    pub b3: Uuid,
}

/// Contracts `C1` (public offer) and `C2` (non-residential) are meant to be
/// retained, `SKIP-3` to be filtered out. Accounts `A1`, `A3`, `A5` and devices
/// `D1`, `D3`, `D5`, `D6` are the reachable, active ones.
pub(crate) fn sample_graph() -> (RegistryGraph, SampleBuildings) {
    let c1 = contract("C1", ContractKind::PublicOffer);
    let c2 = contract("C2", ContractKind::NonResidential);
    let c3 = contract("SKIP-3", ContractKind::Other);

    let ids = SampleBuildings {
        b1: Uuid::new_v4(),
        b2: Uuid::new_v4(),
        b3: Uuid::new_v4(),
    };
    let b2_premises = vec![premises(), premises()];
    let b1_premises = premises().premises_id;

    let a1 = account("A1", b1_premises, by_root(&c1), false);
    let a2 = account("A2", b1_premises, by_root(&c1), true);
    let a3 = account(
        "A3",
        b2_premises[0].premises_id,
        AccountReason {
            kind: ReasonKind::Contract,
            contract_id: Uuid::new_v4(),
            contract_number: Some("C2".to_string()),
        },
        false,
    );
    let a4 = account("A4", b2_premises[1].premises_id, by_root(&c3), false);
    let a5 = account(
        "A5",
        b2_premises[1].premises_id,
        AccountReason {
            kind: ReasonKind::SupplyContract,
            contract_id: c1.version_id,
            contract_number: None,
        },
        false,
    );

    let devices_b1 = vec![
        device("D1", DeviceKind::ResidentialPremises, DeviceStatus::Active, vec![a1.account_id], ids.b1),
        device("D2", DeviceKind::ResidentialPremises, DeviceStatus::Archived, vec![a1.account_id], ids.b1),
    ];
    let devices_b2 = vec![
        device("D3", DeviceKind::Collective, DeviceStatus::Active, vec![], ids.b2),
        device("D4", DeviceKind::NonResidentialPremises, DeviceStatus::Active, vec![a4.account_id], ids.b2),
        device("D5", DeviceKind::NonResidentialPremises, DeviceStatus::Active, vec![a3.account_id], ids.b2),
    ];
    let devices_b3 = vec![device("D6", DeviceKind::Collective, DeviceStatus::Active, vec![], ids.b3)];

    let graph = RegistryGraph {
        addresses: vec![
            address(&c1, ids.b1),
            address(&c1, ids.b2),
            address(&c2, ids.b2),
            address(&c2, ids.b3),
            address(&c3, ids.b3),
        ],
        buildings: vec![Building {
            building_id: ids.b2,
            kind: Some(BuildingKind::ApartmentBuilding),
            registry_number: Some("B2".to_string()),
            premises: b2_premises,
        }],
        contracts: vec![c1, c2, c3],
        accounts: HashMap::from([(ids.b1, vec![a1, a2]), (ids.b2, vec![a3, a4, a5])]),
        devices: HashMap::from([(ids.b1, devices_b1), (ids.b2, devices_b2), (ids.b3, devices_b3)]),
        refused: HashMap::from([(ids.b1, codes::ACCESS_DENIED)]),
    };
    (graph, ids)
}
