//! In-process collaborators with a small demo plant.
//!
//! Four facilities (PHX, ATL, MUN, TYO) stock one catalog part per repair
//! role. Every role is stocked everywhere except the spindle cartridge,
//! which only MUN and TYO carry, so spindle repairs at PHX exercise the
//! cross-facility transfer path.
//!
//! State lives behind a plain mutex: every operation is a short,
//! non-blocking read-modify-write and no lock is held across an await.

use async_trait::async_trait;
use chrono::{Datelike, Duration};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::notify::LogNotifier;
use super::services::*;
use super::WorkflowServices;
use crate::clock::SharedClock;
use crate::types::{short_id, FaultType, ReservedPart};

/// Facilities of the demo plant.
pub const FACILITIES: [&str; 4] = ["PHX", "ATL", "MUN", "TYO"];

const DEFAULT_STOCK: u32 = 4;
const TRANSFER_HOURS: i64 = 48;

/// (role, sku, name, unit price)
const CATALOG: &[(&str, &str, &str, f64)] = &[
    ("spindle_bearing", "SKU-BRG-7420", "Spindle Bearing SKF-7420", 1250.00),
    ("ball_screw_bearing", "SKU-BRG-3205", "Ball Screw Support Bearing", 420.00),
    ("spindle_seal", "SKU-SEL-1100", "Spindle Labyrinth Seal", 95.00),
    ("spindle_motor", "SKU-MTR-5500", "Spindle Motor 15kW", 6800.00),
    ("motor_controller", "SKU-CTL-2200", "Servo Motor Controller", 2150.00),
    ("encoder", "SKU-ENC-0400", "Rotary Encoder 4096ppr", 640.00),
    ("contactor", "SKU-ELC-0110", "Motor Contactor 40A", 180.00),
    ("overload_relay", "SKU-ELC-0120", "Thermal Overload Relay", 145.00),
    ("spindle_cartridge", "SKU-SPN-9000", "Spindle Cartridge Assembly", 9400.00),
    ("spindle_drawbar", "SKU-SPN-9010", "Spindle Drawbar Kit", 780.00),
    ("coolant_pump", "SKU-CLT-3000", "Coolant Pump 0.75kW", 560.00),
    ("coolant_pump_hp", "SKU-CLT-3010", "High-Pressure Coolant Pump", 1900.00),
    ("coolant_filter", "SKU-CLT-3020", "Coolant Filter Cartridge", 65.00),
    ("coolant_sensor", "SKU-CLT-3030", "Coolant Flow Sensor", 210.00),
    ("coolant_chiller", "SKU-CLT-3040", "Coolant Chiller Unit", 4200.00),
    ("power_supply", "SKU-PWR-2400", "24V DC Power Supply", 320.00),
    ("circuit_breaker", "SKU-ELC-0200", "Circuit Breaker 63A", 240.00),
    ("surge_protector", "SKU-ELC-0210", "Surge Protection Device", 190.00),
    ("emc_filter", "SKU-ELC-0220", "EMC Line Filter", 275.00),
];

/// Shipping preference from each facility, closest first.
fn proximity(facility_id: &str) -> &'static [&'static str] {
    match facility_id {
        "PHX" => &["ATL", "MUN", "TYO"],
        "ATL" => &["PHX", "MUN", "TYO"],
        "MUN" => &["ATL", "PHX", "TYO"],
        "TYO" => &["PHX", "ATL", "MUN"],
        _ => &FACILITIES,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ============================================================================
// Plant bundle
// ============================================================================

/// Concrete handles to every simulated collaborator, so tests can inspect
/// stock, work orders and sent notifications.
#[derive(Clone)]
pub struct SimulatedPlant {
    pub inventory: Arc<SimulatedInventory>,
    pub logistics: Arc<SimulatedLogistics>,
    pub maintenance: Arc<SimulatedMaintenance>,
    pub compliance: Arc<SimulatedCompliance>,
    pub notifier: Arc<LogNotifier>,
}

impl SimulatedPlant {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            inventory: Arc::new(SimulatedInventory::demo()),
            logistics: Arc::new(SimulatedLogistics::new(Arc::clone(&clock))),
            maintenance: Arc::new(SimulatedMaintenance::new(Arc::clone(&clock))),
            compliance: Arc::new(SimulatedCompliance::new(clock)),
            notifier: Arc::new(LogNotifier::new()),
        }
    }

    pub fn services(&self) -> WorkflowServices {
        WorkflowServices {
            inventory: self.inventory.clone(),
            logistics: self.logistics.clone(),
            maintenance: self.maintenance.clone(),
            compliance: self.compliance.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

// ============================================================================
// Inventory
// ============================================================================

#[derive(Debug, Clone)]
struct Held {
    facility_id: String,
    part: ReservedPart,
}

#[derive(Default)]
struct InventoryState {
    /// (facility, sku) -> units on hand
    stock: HashMap<(String, String), u32>,
    reservations: HashMap<String, Vec<Held>>,
}

pub struct SimulatedInventory {
    state: Mutex<InventoryState>,
}

impl SimulatedInventory {
    pub fn empty() -> Self {
        Self {
            state: Mutex::new(InventoryState::default()),
        }
    }

    pub fn demo() -> Self {
        let inventory = Self::empty();
        for facility in FACILITIES {
            for (role, sku, _, _) in CATALOG {
                let units = match (*role, facility) {
                    ("spindle_cartridge", "PHX" | "ATL") => 0,
                    ("spindle_cartridge", "TYO") => 1,
                    ("spindle_cartridge", _) => 2,
                    _ => DEFAULT_STOCK,
                };
                inventory.set_stock(facility, sku, units);
            }
        }
        inventory
    }

    pub fn set_stock(&self, facility_id: &str, sku: &str, units: u32) {
        lock(&self.state)
            .stock
            .insert((facility_id.to_string(), sku.to_string()), units);
    }

    pub fn stock(&self, facility_id: &str, sku: &str) -> u32 {
        Self::on_hand(&lock(&self.state), facility_id, sku)
    }

    pub fn reservation(&self, key: &str) -> Option<Vec<ReservedPart>> {
        lock(&self.state)
            .reservations
            .get(key)
            .map(|held| held.iter().map(|h| h.part.clone()).collect())
    }

    pub fn reservation_count(&self) -> usize {
        lock(&self.state).reservations.len()
    }

    fn on_hand(state: &InventoryState, facility_id: &str, sku: &str) -> u32 {
        state
            .stock
            .get(&(facility_id.to_string(), sku.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Inventory for SimulatedInventory {
    async fn compatible_parts(
        &self,
        facility_id: &str,
        fault: FaultType,
    ) -> Result<Vec<CatalogPart>, ServiceError> {
        let state = lock(&self.state);
        let parts = fault
            .part_roles()
            .iter()
            .filter_map(|role| CATALOG.iter().find(|(r, ..)| r == role))
            .map(|(role, sku, name, price)| CatalogPart {
                sku: (*sku).to_string(),
                name: (*name).to_string(),
                role: (*role).to_string(),
                unit_price: *price,
                local_stock: Self::on_hand(&state, facility_id, sku),
                total_stock: FACILITIES
                    .iter()
                    .map(|f| Self::on_hand(&state, f, sku))
                    .sum(),
            })
            .collect();
        Ok(parts)
    }

    async fn nearest_stock(
        &self,
        sku: &str,
        facility_id: &str,
        quantity: u32,
    ) -> Result<Option<String>, ServiceError> {
        let state = lock(&self.state);
        Ok(proximity(facility_id)
            .iter()
            .filter(|f| **f != facility_id)
            .find(|f| Self::on_hand(&state, f, sku) >= quantity)
            .map(|f| (*f).to_string()))
    }

    async fn reserve(
        &self,
        key: &str,
        parts: &[PartRequest],
    ) -> Result<Vec<ReservedPart>, ServiceError> {
        let mut state = lock(&self.state);
        if let Some(held) = state.reservations.get(key) {
            tracing::debug!(key, "Reservation already held");
            return Ok(held.iter().map(|h| h.part.clone()).collect());
        }

        for part in parts {
            let available = Self::on_hand(&state, &part.facility_id, &part.sku);
            if available < part.quantity {
                return Err(ServiceError::InsufficientStock {
                    sku: part.sku.clone(),
                    facility_id: part.facility_id.clone(),
                    requested: part.quantity,
                    available,
                });
            }
        }

        let reservation_id = short_id("RSV");
        let mut held = Vec::with_capacity(parts.len());
        for part in parts {
            if let Some(units) = state
                .stock
                .get_mut(&(part.facility_id.clone(), part.sku.clone()))
            {
                *units -= part.quantity;
            }
            held.push(Held {
                facility_id: part.facility_id.clone(),
                part: ReservedPart {
                    sku: part.sku.clone(),
                    name: part.name.clone(),
                    quantity: part.quantity,
                    unit_price: part.unit_price,
                    reservation_id: reservation_id.clone(),
                },
            });
        }
        let reserved = held.iter().map(|h| h.part.clone()).collect();
        state.reservations.insert(key.to_string(), held);
        tracing::info!(key, %reservation_id, lines = parts.len(), "Parts reserved");
        Ok(reserved)
    }

    async fn release(&self, key: &str) -> Result<usize, ServiceError> {
        let mut state = lock(&self.state);
        let Some(held) = state.reservations.remove(key) else {
            return Ok(0);
        };
        for h in &held {
            *state
                .stock
                .entry((h.facility_id.clone(), h.part.sku.clone()))
                .or_insert(0) += h.part.quantity;
        }
        tracing::info!(key, lines = held.len(), "Reservation released");
        Ok(held.len())
    }
}

// ============================================================================
// Logistics
// ============================================================================

pub struct SimulatedLogistics {
    clock: SharedClock,
    transfers: Mutex<HashMap<String, TransferOrder>>,
}

impl SimulatedLogistics {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            transfers: Mutex::new(HashMap::new()),
        }
    }

    pub fn transfer_count(&self) -> usize {
        lock(&self.transfers).len()
    }
}

#[async_trait]
impl Logistics for SimulatedLogistics {
    async fn transfer(
        &self,
        key: &str,
        from_facility: &str,
        to_facility: &str,
        parts: &[PartRequest],
    ) -> Result<TransferOrder, ServiceError> {
        let mut transfers = lock(&self.transfers);
        if let Some(existing) = transfers.get(key) {
            return Ok(existing.clone());
        }
        let order = TransferOrder {
            transfer_id: short_id("TRF"),
            from_facility: from_facility.to_string(),
            to_facility: to_facility.to_string(),
            skus: parts.iter().map(|p| p.sku.clone()).collect(),
            estimated_arrival: self.clock.now() + Duration::hours(TRANSFER_HOURS),
        };
        tracing::info!(
            key,
            transfer_id = %order.transfer_id,
            from = from_facility,
            to = to_facility,
            "Cross-facility transfer arranged"
        );
        transfers.insert(key.to_string(), order.clone());
        Ok(order)
    }
}

// ============================================================================
// Maintenance
// ============================================================================

pub struct SimulatedMaintenance {
    clock: SharedClock,
    sequence: AtomicU32,
    orders: Mutex<HashMap<String, WorkOrder>>,
    shutdowns: Mutex<HashMap<String, ShutdownConfirmation>>,
    fail_next: AtomicUsize,
}

impl SimulatedMaintenance {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            sequence: AtomicU32::new(0),
            orders: Mutex::new(HashMap::new()),
            shutdowns: Mutex::new(HashMap::new()),
            fail_next: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` work-order requests fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn work_orders(&self) -> Vec<WorkOrder> {
        let mut orders: Vec<_> = lock(&self.orders).values().cloned().collect();
        orders.sort_by(|a, b| a.work_order_id.cmp(&b.work_order_id));
        orders
    }

    pub fn work_order_count(&self) -> usize {
        lock(&self.orders).len()
    }

    pub fn shutdown_count(&self) -> usize {
        lock(&self.shutdowns).len()
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Maintenance for SimulatedMaintenance {
    async fn create_work_order(
        &self,
        key: &str,
        request: WorkOrderRequest,
    ) -> Result<WorkOrder, ServiceError> {
        let mut orders = lock(&self.orders);
        if let Some(existing) = orders.get(key) {
            tracing::debug!(key, work_order_id = %existing.work_order_id, "Work order already exists");
            return Ok(existing.clone());
        }
        if self.take_failure() {
            return Err(ServiceError::Unavailable {
                service: "maintenance",
                reason: "scheduler rejected the request".into(),
            });
        }

        let now = self.clock.now();
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let order = WorkOrder {
            work_order_id: format!("WO-{}-{n:05}", now.year()),
            equipment_id: request.equipment_id,
            facility_id: request.facility_id,
            priority: request.priority,
            description: request.description,
            parts: request.parts,
            created_at: now,
            due_by: request.due_by,
        };
        tracing::info!(
            key,
            work_order_id = %order.work_order_id,
            priority = %order.priority,
            "Work order created"
        );
        orders.insert(key.to_string(), order.clone());
        Ok(order)
    }

    async fn confirm_shutdown(
        &self,
        key: &str,
        equipment_id: &str,
    ) -> Result<ShutdownConfirmation, ServiceError> {
        let mut shutdowns = lock(&self.shutdowns);
        let confirmation = shutdowns
            .entry(key.to_string())
            .or_insert_with(|| ShutdownConfirmation {
                equipment_id: equipment_id.to_string(),
                confirmed_at: self.clock.now(),
            });
        Ok(confirmation.clone())
    }
}

// ============================================================================
// Compliance
// ============================================================================

pub struct SimulatedCompliance {
    clock: SharedClock,
}

impl SimulatedCompliance {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl Compliance for SimulatedCompliance {
    async fn verify(
        &self,
        equipment_id: &str,
        facility_id: &str,
        fault: FaultType,
    ) -> Result<ComplianceVerification, ServiceError> {
        let framework = match facility_id {
            "TYO" => RegulatoryFramework::Iso13485,
            "MUN" => RegulatoryFramework::As9100,
            _ => RegulatoryFramework::Faa,
        };
        // Faults touching drive electronics invalidate the machine's
        // qualification until re-certified.
        let status = match fault {
            FaultType::Motor | FaultType::Electrical => ComplianceStatus::HoldRequired,
            FaultType::Spindle => ComplianceStatus::ReviewNeeded,
            FaultType::Bearing | FaultType::Coolant | FaultType::General => {
                ComplianceStatus::Cleared
            }
        };
        Ok(ComplianceVerification {
            equipment_id: equipment_id.to_string(),
            status,
            framework,
            material_batch_id: format!(
                "BATCH-{facility_id}-{}",
                self.clock.now().format("%Y%m%d")
            ),
        })
    }
}
