//! Branch points of the response workflows.
//!
//! Each branch is a closed enum produced by exactly one decision function,
//! so the workflows dispatch with a `match` instead of inspecting results
//! ad hoc:
//!
//! - [`assess_urgency`] -> [`Urgency`]
//! - [`assess_parts`] -> [`PartsAssessment`]
//! - [`route_compliance`] -> [`ComplianceRouting`]

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use super::services::{
    CatalogPart, Compliance, ComplianceVerification, Inventory, PartRequest, ServiceError,
    WorkOrderPriority,
};
use crate::config::WorkflowConfig;
use crate::types::FaultType;

/// Most part lines a single repair reserves (one per role, primary roles
/// first).
pub const MAX_PARTS: usize = 3;

/// Units reserved per part line.
pub const PART_QUANTITY: u32 = 1;

// ============================================================================
// Urgency
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Urgency {
    /// Remaining useful life is too short to wait for a planned slot.
    Immediate { rul_hours: f64 },
    /// Repair can be planned within `schedule_within_hours`.
    Deferrable {
        rul_hours: f64,
        schedule_within_hours: f64,
    },
}

impl Urgency {
    pub fn rul_hours(&self) -> f64 {
        match self {
            Urgency::Immediate { rul_hours } | Urgency::Deferrable { rul_hours, .. } => *rul_hours,
        }
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, Urgency::Immediate { .. })
    }

    pub fn priority(&self) -> WorkOrderPriority {
        match self {
            Urgency::Immediate { .. } => WorkOrderPriority::Emergency,
            Urgency::Deferrable { .. } => WorkOrderPriority::Scheduled,
        }
    }

    /// Wording used in recommended actions.
    pub fn label(&self) -> &'static str {
        match self {
            Urgency::Immediate { .. } => "emergency",
            Urgency::Deferrable { .. } => "preventive",
        }
    }

    /// Deadline for the work order.
    pub fn due_by(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let hours = match self {
            Urgency::Immediate { rul_hours } => *rul_hours,
            Urgency::Deferrable {
                schedule_within_hours,
                ..
            } => *schedule_within_hours,
        };
        now + Duration::minutes((hours * 60.0).round() as i64)
    }
}

/// Remaining useful life scales linearly from the full horizon at zero
/// probability to nothing at certainty.
pub fn assess_urgency(failure_probability: f64, policy: &WorkflowConfig) -> Urgency {
    let p = failure_probability.clamp(0.0, 1.0);
    let rul_hours = (1.0 - p) * policy.rul_horizon_hours;
    if rul_hours < policy.immediate_rul_hours {
        Urgency::Immediate { rul_hours }
    } else {
        Urgency::Deferrable {
            rul_hours,
            schedule_within_hours: (rul_hours - policy.immediate_rul_hours)
                .max(policy.immediate_rul_hours),
        }
    }
}

// ============================================================================
// Parts
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PartsAssessment {
    /// Everything the repair needs is on hand at the equipment's facility.
    Available { parts: Vec<PartRequest>, cost: f64 },
    /// Some lines must come from `nearest_facility`. `needed` lists those
    /// lines (held at their source), `local` the lines on hand.
    Unavailable {
        local: Vec<PartRequest>,
        needed: Vec<PartRequest>,
        nearest_facility: String,
        cost: f64,
    },
}

impl PartsAssessment {
    /// Every line to reserve, local first.
    pub fn lines(&self) -> Vec<PartRequest> {
        match self {
            PartsAssessment::Available { parts, .. } => parts.clone(),
            PartsAssessment::Unavailable { local, needed, .. } => {
                local.iter().chain(needed).cloned().collect()
            }
        }
    }

    pub fn cost(&self) -> f64 {
        match self {
            PartsAssessment::Available { cost, .. } | PartsAssessment::Unavailable { cost, .. } => {
                *cost
            }
        }
    }

    /// Sentence appended to recommended actions.
    pub fn describe(&self) -> String {
        match self {
            PartsAssessment::Available { .. } => "Parts available locally.".to_string(),
            PartsAssessment::Unavailable {
                nearest_facility, ..
            } => format!("Parts need cross-facility procurement from {nearest_facility}."),
        }
    }
}

/// Parts plus labor; a repair with no parts is not costed.
pub fn estimate_cost(parts: &[PartRequest], policy: &WorkflowConfig) -> f64 {
    if parts.is_empty() {
        return 0.0;
    }
    parts.iter().map(PartRequest::line_cost).sum::<f64>() + policy.labor_cost()
}

/// One catalog part per role, in catalog order, capped at [`MAX_PARTS`].
pub fn select_parts(catalog: &[CatalogPart]) -> Vec<&CatalogPart> {
    let mut seen = HashSet::new();
    catalog
        .iter()
        .filter(|p| seen.insert(p.role.as_str()))
        .take(MAX_PARTS)
        .collect()
}

pub async fn assess_parts(
    inventory: &dyn Inventory,
    facility_id: &str,
    fault: FaultType,
    policy: &WorkflowConfig,
) -> Result<PartsAssessment, ServiceError> {
    let catalog = inventory.compatible_parts(facility_id, fault).await?;

    let mut local = Vec::new();
    let mut needed = Vec::new();
    for part in select_parts(&catalog) {
        if part.local_stock >= PART_QUANTITY {
            local.push(PartRequest::from_catalog(part, facility_id, PART_QUANTITY));
            continue;
        }
        match inventory
            .nearest_stock(&part.sku, facility_id, PART_QUANTITY)
            .await?
        {
            Some(source) => needed.push(PartRequest::from_catalog(part, &source, PART_QUANTITY)),
            None => tracing::warn!(sku = %part.sku, facility_id, "No stock anywhere, skipping part"),
        }
    }

    if needed.is_empty() {
        let cost = estimate_cost(&local, policy);
        return Ok(PartsAssessment::Available { parts: local, cost });
    }

    let nearest_facility = needed[0].facility_id.clone();
    let all: Vec<_> = local.iter().chain(&needed).cloned().collect();
    Ok(PartsAssessment::Unavailable {
        cost: estimate_cost(&all, policy),
        local,
        needed,
        nearest_facility,
    })
}

// ============================================================================
// Compliance
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ComplianceRouting {
    Regulated(ComplianceVerification),
    Unregulated,
}

impl ComplianceRouting {
    /// Summary fragment, empty for unregulated equipment.
    pub fn describe(&self) -> Option<String> {
        match self {
            ComplianceRouting::Regulated(v) => Some(format!(
                "Compliance: {} ({}) | Batch: {}",
                v.status, v.framework, v.material_batch_id
            )),
            ComplianceRouting::Unregulated => None,
        }
    }
}

pub async fn route_compliance(
    compliance: &dyn Compliance,
    policy: &WorkflowConfig,
    equipment_id: &str,
    facility_id: &str,
    fault: FaultType,
) -> Result<ComplianceRouting, ServiceError> {
    if !policy.is_regulated(equipment_id) {
        return Ok(ComplianceRouting::Unregulated);
    }
    let verification = compliance.verify(equipment_id, facility_id, fault).await?;
    Ok(ComplianceRouting::Regulated(verification))
}

// ============================================================================
// Text
// ============================================================================

pub fn recommended_action(urgency: &Urgency, fault: FaultType, parts: &PartsAssessment) -> String {
    format!(
        "Schedule {} maintenance for {fault} fault. {}",
        urgency.label(),
        parts.describe()
    )
}

/// Probability as a whole percentage.
pub fn percent(probability: f64) -> i64 {
    (probability * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::workflow::simulated::{SimulatedCompliance, SimulatedInventory};
    use std::sync::Arc;

    #[test]
    fn test_urgency_split_on_remaining_life() {
        let policy = WorkflowConfig::default();
        // (1 - 0.93) * 240 = 16.8 h
        match assess_urgency(0.93, &policy) {
            Urgency::Immediate { rul_hours } => assert!((rul_hours - 16.8).abs() < 1e-9),
            other => panic!("expected immediate, got {other:?}"),
        }
        // (1 - 0.6) * 240 = 96 h
        let deferrable = assess_urgency(0.6, &policy);
        assert_eq!(
            deferrable,
            Urgency::Deferrable {
                rul_hours: 96.0,
                schedule_within_hours: 72.0
            }
        );
        assert_eq!(deferrable.priority(), WorkOrderPriority::Scheduled);
        assert!(assess_urgency(1.5, &policy).is_immediate());
    }

    #[test]
    fn test_cost_includes_labor_only_with_parts() {
        let policy = WorkflowConfig::default();
        assert_eq!(estimate_cost(&[], &policy), 0.0);
        let line = PartRequest {
            sku: "S".into(),
            name: "n".into(),
            quantity: 2,
            unit_price: 100.0,
            facility_id: "PHX".into(),
        };
        assert_eq!(estimate_cost(&[line], &policy), 200.0 + 6.0 * 75.0);
    }

    #[test]
    fn test_select_parts_one_per_role() {
        let part = |sku: &str, role: &str| CatalogPart {
            sku: sku.into(),
            name: sku.into(),
            role: role.into(),
            unit_price: 1.0,
            local_stock: 1,
            total_stock: 1,
        };
        let catalog = [
            part("A1", "a"),
            part("A2", "a"),
            part("B", "b"),
            part("C", "c"),
            part("D", "d"),
        ];
        let skus: Vec<_> = select_parts(&catalog).iter().map(|p| p.sku.as_str()).collect();
        assert_eq!(skus, ["A1", "B", "C"]);
    }

    #[tokio::test]
    async fn test_bearing_parts_available_at_phx() {
        let inventory = SimulatedInventory::demo();
        let policy = WorkflowConfig::default();
        let assessment = assess_parts(&inventory, "PHX", FaultType::Bearing, &policy)
            .await
            .unwrap();
        match &assessment {
            PartsAssessment::Available { parts, cost } => {
                assert_eq!(parts.len(), 3);
                assert!((cost - (1250.0 + 420.0 + 95.0 + 450.0)).abs() < 1e-9);
            }
            other => panic!("expected available, got {other:?}"),
        }
        assert_eq!(
            recommended_action(&assess_urgency(0.6, &policy), FaultType::Bearing, &assessment),
            "Schedule preventive maintenance for BEARING fault. Parts available locally."
        );
    }

    #[tokio::test]
    async fn test_spindle_cartridge_comes_from_another_facility() {
        let inventory = SimulatedInventory::demo();
        let policy = WorkflowConfig::default();
        let assessment = assess_parts(&inventory, "PHX", FaultType::Spindle, &policy)
            .await
            .unwrap();
        let PartsAssessment::Unavailable {
            local,
            needed,
            nearest_facility,
            ..
        } = &assessment
        else {
            panic!("expected unavailable, got {assessment:?}");
        };
        assert_eq!(nearest_facility, "MUN");
        assert_eq!(needed.len(), 1);
        assert_eq!(needed[0].sku, "SKU-SPN-9000");
        assert_eq!(local.len(), 2);
        assert_eq!(assessment.lines().len(), 3);
        assert!(assessment
            .describe()
            .ends_with("cross-facility procurement from MUN."));
    }

    #[tokio::test]
    async fn test_compliance_only_for_regulated_prefixes() {
        let compliance = SimulatedCompliance::new(Arc::new(SystemClock));
        let policy = WorkflowConfig::default();

        let phx = route_compliance(&compliance, &policy, "PHX-CNC-007", "PHX", FaultType::Bearing)
            .await
            .unwrap();
        assert_eq!(phx, ComplianceRouting::Unregulated);
        assert!(phx.describe().is_none());

        let tyo = route_compliance(&compliance, &policy, "TYO-CNC-001", "TYO", FaultType::Bearing)
            .await
            .unwrap();
        assert!(tyo
            .describe()
            .unwrap()
            .starts_with("Compliance: CLEARED (ISO_13485)"));
    }
}
