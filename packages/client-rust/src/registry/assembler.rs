//! Builds one consistent [`Snapshot`] of the registry.
//!
//! Phases run strictly in order; inside a phase the per-contract or
//! per-building fetches fan out with a bounded concurrency level:
//!
//! 1. contracts accepted by the caller's predicate,
//! 2. address objects of every retained contract,
//! 3. distinct buildings referenced by those addresses,
//! 4. every building with its premises (stubbed when the registry refuses it),
//! 5. active accounts of every building that belong to a retained contract,
//! 6. active devices of every building that are collective or bound to a
//!    retained account.
//!
//! Nothing is published unless every phase completes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use regsync_core::{
    codes, Account, AddressObject, Building, ClockSource, Contract, MeteringDevice,
    RegistryError, Snapshot, SystemClock,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::{bounded_for_each, for_each_page, PageScan};
use crate::gateway::RegistryGateway;

/// Default fan-out width; the registry starts refusing requests well above it.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

// ---------------------------------------------------------------------------
// Phase helpers
// ---------------------------------------------------------------------------

/// `done/total` reporting for one fan-out phase.
struct Progress {
    phase: &'static str,
    done: AtomicUsize,
    total: usize,
}

impl Progress {
    fn new(phase: &'static str, total: usize) -> Self {
        info!(phase, total, "phase started");
        Self {
            phase,
            done: AtomicUsize::new(0),
            total,
        }
    }

    fn step(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        info!(phase = self.phase, "#{done}/{}", self.total);
    }
}

/// Accumulates records from concurrent fetches, keeping the first copy of
/// each id.
struct Collected<T> {
    seen: HashSet<Uuid>,
    items: Vec<T>,
}

impl<T> Collected<T> {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            items: Vec::new(),
        }
    }

    fn extend(&mut self, records: Vec<T>, id: impl Fn(&T) -> Uuid) {
        for record in records {
            if self.seen.insert(id(&record)) {
                self.items.push(record);
            }
        }
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), RegistryError> {
    if cancel.is_cancelled() {
        Err(RegistryError::Cancelled)
    } else {
        Ok(())
    }
}

fn within(err: RegistryError, context: impl Into<String>) -> RegistryError {
    if err.is_cancelled() {
        RegistryError::Cancelled
    } else {
        err.context(context)
    }
}

/// A building the registry will not hand out still appears in the snapshot,
/// with only its id.
fn is_degradable(err: &RegistryError) -> bool {
    err.contains_code(codes::NOT_IN_REGISTRY) || err.contains_code(codes::ACCESS_DENIED)
}

fn distinct_buildings(addresses: &[AddressObject]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    addresses
        .iter()
        .map(|a| a.building_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

// ---------------------------------------------------------------------------
// SnapshotAssembler
// ---------------------------------------------------------------------------

/// Orchestrates the registry reads that make up one [`Snapshot`].
pub struct SnapshotAssembler<R> {
    registry: Arc<R>,
    clock: Arc<dyn ClockSource>,
}

impl<R: RegistryGateway> SnapshotAssembler<R> {
    #[must_use]
    pub fn new(registry: Arc<R>) -> Self {
        Self {
            registry,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for the snapshot timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Assembles a snapshot of every contract accepted by `predicate` and
    /// everything reachable from it.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Cancelled`] if `cancel` fires; partial results are
    ///   dropped.
    /// - Any fetch failure other than a refused building, wrapped with the
    ///   phase it happened in.
    pub async fn assemble<P>(
        &self,
        predicate: P,
        max_concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, RegistryError>
    where
        P: Fn(&Contract) -> bool,
    {
        let span = info_span!(
            "assemble_snapshot",
            max_concurrency,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let result = self.run_phases(&predicate, max_concurrency, cancel).await;

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = start.elapsed().as_millis() as u64;
            let outcome = if result.is_ok() { "ok" } else { "error" };
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::Span::current().record("outcome", outcome);

            match &result {
                Ok(snapshot) => info!(duration_ms, %snapshot, "snapshot assembled"),
                Err(RegistryError::Cancelled) => warn!(duration_ms, "snapshot assembly cancelled"),
                Err(err) => error!(duration_ms, trail = %err.describe(), "snapshot assembly failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// [`assemble`](Self::assemble) with the concurrency limit taken from
    /// `config`.
    ///
    /// # Errors
    ///
    /// As [`assemble`](Self::assemble).
    pub async fn assemble_with<P>(
        &self,
        config: &EngineConfig,
        predicate: P,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, RegistryError>
    where
        P: Fn(&Contract) -> bool,
    {
        self.assemble(predicate, config.max_concurrency, cancel).await
    }

    async fn run_phases<P>(
        &self,
        predicate: &P,
        max_concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, RegistryError>
    where
        P: Fn(&Contract) -> bool,
    {
        let started_at_ms = self.clock.now_ms();

        let contracts = self.contracts(predicate, cancel).await?;
        ensure_live(cancel)?;

        let addresses = self.addresses(&contracts, max_concurrency, cancel).await?;
        ensure_live(cancel)?;

        let building_ids = distinct_buildings(&addresses);
        info!(buildings = building_ids.len(), "distinct buildings referenced");

        let buildings = self.buildings(&building_ids, max_concurrency, cancel).await?;
        ensure_live(cancel)?;

        let accounts = self
            .accounts(&building_ids, &contracts, max_concurrency, cancel)
            .await?;
        ensure_live(cancel)?;

        let devices = self
            .devices(&building_ids, &accounts, max_concurrency, cancel)
            .await?;
        ensure_live(cancel)?;

        Ok(Snapshot {
            started_at_ms,
            finished_at_ms: self.clock.now_ms(),
            contracts,
            addresses,
            buildings,
            accounts,
            devices,
        })
    }

    /// Phase 1.
    async fn contracts<P>(
        &self,
        predicate: &P,
        cancel: &CancellationToken,
    ) -> Result<Vec<Contract>, RegistryError>
    where
        P: Fn(&Contract) -> bool,
    {
        let registry = &*self.registry;
        let mut retained = Vec::new();
        let mut skipped = 0usize;

        let scan = for_each_page(
            |cursor| registry.fetch_contracts_page(cursor, cancel),
            |contract| {
                if predicate(&contract) {
                    retained.push(contract);
                } else {
                    skipped += 1;
                }
            },
            cancel,
        )
        .await
        .map_err(|err| within(err, "export contracts"))?;

        info!(
            visible = scan.count(),
            retained = retained.len(),
            skipped,
            "contracts exported"
        );
        Ok(retained)
    }

    /// Phase 2. Addresses are returned grouped by contract, in contract order.
    async fn addresses(
        &self,
        contracts: &[Contract],
        max_concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<AddressObject>, RegistryError> {
        let registry = &*self.registry;
        let collected: Mutex<Vec<(usize, Vec<AddressObject>)>> = Mutex::new(Vec::new());
        let progress = Progress::new("contract addresses", contracts.len());
        let (collected_ref, progress_ref) = (&collected, &progress);

        bounded_for_each(
            contracts.iter().enumerate(),
            max_concurrency,
            |(position, contract)| async move {
                let mut found = Vec::new();
                let scan = for_each_page(
                    |cursor| registry.fetch_contract_addresses_page(contract, cursor, cancel),
                    |address| found.push(address),
                    cancel,
                )
                .await
                .map_err(|err| {
                    within(err, format!("export addresses of contract {}", contract.number))
                })?;
                if scan == PageScan::NothingFound {
                    debug!(contract = %contract.number, "contract has no address objects");
                }
                collected_ref.lock().push((position, found));
                progress_ref.step();
                Ok(())
            },
            cancel,
        )
        .await
        .map_err(|err| within(err, "export contract addresses"))?;

        // Contract order, so that building order is stable between runs.
        let mut per_contract = collected.into_inner();
        per_contract.sort_by_key(|(position, _)| *position);
        Ok(per_contract.into_iter().flat_map(|(_, found)| found).collect())
    }

    /// Phase 4. The result follows the order of `building_ids`.
    async fn buildings(
        &self,
        building_ids: &[Uuid],
        max_concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Building>, RegistryError> {
        let registry = &*self.registry;
        let collected: Mutex<Vec<Building>> = Mutex::new(Vec::new());
        let progress = Progress::new("buildings", building_ids.len());
        let stubs = AtomicUsize::new(0);
        let (collected_ref, progress_ref, stubs_ref) = (&collected, &progress, &stubs);

        bounded_for_each(
            building_ids.iter().copied(),
            max_concurrency,
            |building_id| async move {
                let building = match registry.fetch_building(building_id, cancel).await {
                    Ok(building) => building,
                    Err(err) if is_degradable(&err) => {
                        warn!(
                            %building_id,
                            trail = %err.describe(),
                            "building unavailable, keeping a stub"
                        );
                        stubs_ref.fetch_add(1, Ordering::Relaxed);
                        Building::stub(building_id)
                    }
                    Err(err) => return Err(within(err, format!("export building {building_id}"))),
                };
                collected_ref.lock().push(building);
                progress_ref.step();
                Ok(())
            },
            cancel,
        )
        .await
        .map_err(|err| within(err, "export buildings"))?;

        let position: HashMap<Uuid, usize> = building_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();
        let mut buildings = collected.into_inner();
        buildings.sort_by_key(|b| position.get(&b.building_id).copied().unwrap_or(usize::MAX));

        info!(
            buildings = buildings.len(),
            stubs = stubs.load(Ordering::Relaxed),
            "buildings exported"
        );
        Ok(buildings)
    }

    /// Phase 5.
    async fn accounts(
        &self,
        building_ids: &[Uuid],
        contracts: &[Contract],
        max_concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Account>, RegistryError> {
        let registry = &*self.registry;
        let collected = Mutex::new(Collected::new());
        let progress = Progress::new("accounts", building_ids.len());
        let (collected_ref, progress_ref) = (&collected, &progress);

        bounded_for_each(
            building_ids.iter().copied(),
            max_concurrency,
            |building_id| async move {
                let mut kept = Vec::new();
                let mut dropped = 0usize;
                for_each_page(
                    |cursor| registry.fetch_building_accounts_page(building_id, cursor, cancel),
                    |account: Account| {
                        if account.is_active() && contracts.iter().any(|c| account.is_linked_to(c)) {
                            kept.push(account);
                        } else {
                            dropped += 1;
                        }
                    },
                    cancel,
                )
                .await
                .map_err(|err| within(err, format!("export accounts of building {building_id}")))?;
                debug!(%building_id, kept = kept.len(), dropped, "building accounts filtered");
                collected_ref.lock().extend(kept, |a| a.account_id);
                progress_ref.step();
                Ok(())
            },
            cancel,
        )
        .await
        .map_err(|err| within(err, "export accounts"))?;

        let accounts = collected.into_inner().items;
        info!(accounts = accounts.len(), "accounts exported");
        Ok(accounts)
    }

    /// Phase 6.
    async fn devices(
        &self,
        building_ids: &[Uuid],
        accounts: &[Account],
        max_concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<MeteringDevice>, RegistryError> {
        let registry = &*self.registry;
        let account_ids: HashSet<Uuid> = accounts.iter().map(|a| a.account_id).collect();
        let collected = Mutex::new(Collected::new());
        let progress = Progress::new("metering devices", building_ids.len());
        let (account_ids_ref, collected_ref, progress_ref) = (&account_ids, &collected, &progress);

        bounded_for_each(
            building_ids.iter().copied(),
            max_concurrency,
            |building_id| async move {
                let mut kept = Vec::new();
                let mut dropped = 0usize;
                for_each_page(
                    |cursor| registry.fetch_building_devices_page(building_id, cursor, cancel),
                    |device: MeteringDevice| {
                        let reachable = device.is_collective()
                            || device.account_ids.iter().any(|id| account_ids_ref.contains(id));
                        if device.is_active() && reachable {
                            kept.push(device);
                        } else {
                            dropped += 1;
                        }
                    },
                    cancel,
                )
                .await
                .map_err(|err| within(err, format!("export devices of building {building_id}")))?;
                debug!(%building_id, kept = kept.len(), dropped, "building devices filtered");
                collected_ref.lock().extend(kept, |d| d.device_id);
                progress_ref.step();
                Ok(())
            },
            cancel,
        )
        .await
        .map_err(|err| within(err, "export metering devices"))?;

        let devices = collected.into_inner().items;
        info!(devices = devices.len(), "metering devices exported");
        Ok(devices)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
