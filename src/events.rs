use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::TenantId;

/// action keys for state-changing operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    LeaseCreated,
    LeaseTermsUpdated,
    LeaseStatusChanged,
    InstallmentsGenerated,
    InstallmentStatusesRecalculated,
    InstallmentsDeleted,
    PaymentCreated,
    PaymentAllocated,
    PaymentStatusChanged,
    PenaltyCalculated,
    PenaltyOverridden,
    PenaltyDeleted,
    PenaltyJustificationAttached,
    DepositCreated,
    DepositMovementRecorded,
    PenaltySweepCompleted,
}

impl AuditAction {
    /// stable dotted key for downstream consumers
    pub fn key(&self) -> &'static str {
        match self {
            AuditAction::LeaseCreated => "lease.created",
            AuditAction::LeaseTermsUpdated => "lease.terms_updated",
            AuditAction::LeaseStatusChanged => "lease.status_changed",
            AuditAction::InstallmentsGenerated => "installments.generated",
            AuditAction::InstallmentStatusesRecalculated => "installments.recalculated",
            AuditAction::InstallmentsDeleted => "installments.deleted",
            AuditAction::PaymentCreated => "payment.created",
            AuditAction::PaymentAllocated => "payment.allocated",
            AuditAction::PaymentStatusChanged => "payment.status_changed",
            AuditAction::PenaltyCalculated => "penalty.calculated",
            AuditAction::PenaltyOverridden => "penalty.overridden",
            AuditAction::PenaltyDeleted => "penalty.deleted",
            AuditAction::PenaltyJustificationAttached => "penalty.justification_attached",
            AuditAction::DepositCreated => "deposit.created",
            AuditAction::DepositMovementRecorded => "deposit.movement_recorded",
            AuditAction::PenaltySweepCompleted => "scheduler.sweep_completed",
        }
    }
}

/// one structured audit event per state-changing operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor: String,
    pub tenant_id: TenantId,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// pluggable destination for audit events
///
/// Failures never roll back the business operation; the engine logs them
/// and continues.
pub trait AuditSink {
    fn record(&mut self, event: &AuditEvent) -> Result<(), AuditSinkError>;
}

#[derive(Debug, thiserror::Error)]
#[error("audit sink failure: {message}")]
pub struct AuditSinkError {
    pub message: String,
}

/// in-memory trail for collecting events during operations
#[derive(Debug, Default)]
pub struct AuditTrail {
    events: Vec<AuditEvent>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: AuditEvent) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<AuditEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }
}
