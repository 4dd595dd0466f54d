use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde_json::json;
use uuid::Uuid;

use crate::decimal::Money;
use crate::deposit::{self, DepositMovement, MovementRequest, SecurityDeposit};
use crate::errors::{BillingError, Result};
use crate::events::{AuditAction, AuditEvent, AuditSink, AuditTrail};
use crate::installments::{self, Installment};
use crate::lease::{Lease, PenaltyTerms};
use crate::payments::{self, AllocationOutcome, NewPayment, Payment};
use crate::penalty::{self, Penalty};
use crate::scheduler::{PenaltySweep, SweepOutcome};
use crate::store::BillingStore;
use crate::types::{
    BillingFrequency, InstallmentId, JustificationRef, LeaseId, LeaseStatus, PaymentId,
    PaymentStatus, PenaltyId, TenantId,
};

/// request to create a lease
#[derive(Debug, Clone)]
pub struct NewLeaseRequest {
    pub tenant_id: TenantId,
    pub lease_number: String,
    pub property_id: Uuid,
    pub renter_id: Uuid,
    pub owner_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub move_in_date: Option<NaiveDate>,
    pub move_out_date: Option<NaiveDate>,
    pub frequency: BillingFrequency,
    pub due_day: u8,
    pub currency: String,
    pub rent_amount: Money,
    pub service_charge_amount: Money,
    pub deposit_amount: Money,
    pub penalty_terms: Option<PenaltyTerms>,
}

/// partial update of a lease's financial terms
#[derive(Debug, Clone, Default)]
pub struct LeaseTermsUpdate {
    pub rent_amount: Option<Money>,
    pub service_charge_amount: Option<Money>,
    pub deposit_amount: Option<Money>,
    pub due_day: Option<u8>,
    pub end_date: Option<NaiveDate>,
    pub penalty_terms: Option<PenaltyTerms>,
}

/// facade over the billing and collections engine
///
/// Owns the backing store and the audit trail; every state-changing
/// operation emits one structured audit event. A pluggable sink may
/// forward events elsewhere; sink failures are logged and never roll back
/// the business operation.
pub struct BillingEngine {
    store: BillingStore,
    trail: AuditTrail,
    sink: Option<Box<dyn AuditSink>>,
    sweep: PenaltySweep,
}

impl Default for BillingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BillingEngine {
    pub fn new() -> Self {
        Self {
            store: BillingStore::new(),
            trail: AuditTrail::new(),
            sink: None,
            sweep: PenaltySweep::new(),
        }
    }

    pub fn with_sink(sink: Box<dyn AuditSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::new()
        }
    }

    pub fn store(&self) -> &BillingStore {
        &self.store
    }

    pub fn audit_events(&self) -> &[AuditEvent] {
        self.trail.events()
    }

    pub fn take_audit_events(&mut self) -> Vec<AuditEvent> {
        self.trail.take_events()
    }

    fn emit(
        &mut self,
        actor: &str,
        tenant_id: TenantId,
        action: AuditAction,
        entity_type: &str,
        entity_id: Uuid,
        payload: serde_json::Value,
        time_provider: &SafeTimeProvider,
    ) {
        let event = AuditEvent {
            actor: actor.to_string(),
            tenant_id,
            action,
            entity_type: entity_type.to_string(),
            entity_id,
            payload,
            timestamp: time_provider.now(),
        };
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = sink.record(&event) {
                // audit failure must never block the business operation
                tracing::warn!(action = event.action.key(), error = %err, "audit sink failed");
            }
        }
        self.trail.emit(event);
    }

    // --- leases ---

    pub fn create_lease(
        &mut self,
        request: NewLeaseRequest,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Lease> {
        let now = time_provider.now();
        let lease = Lease {
            id: Uuid::new_v4(),
            tenant_id: request.tenant_id,
            lease_number: request.lease_number,
            property_id: request.property_id,
            renter_id: request.renter_id,
            owner_id: request.owner_id,
            start_date: request.start_date,
            end_date: request.end_date,
            move_in_date: request.move_in_date,
            move_out_date: request.move_out_date,
            frequency: request.frequency,
            due_day: request.due_day,
            currency: request.currency,
            rent_amount: request.rent_amount,
            service_charge_amount: request.service_charge_amount,
            deposit_amount: request.deposit_amount,
            penalty_terms: request.penalty_terms,
            status: LeaseStatus::Draft,
            ended_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_lease(lease.clone())?;

        self.emit(
            actor,
            lease.tenant_id,
            AuditAction::LeaseCreated,
            "lease",
            lease.id,
            json!({
                "lease_number": lease.lease_number,
                "rent_amount": lease.rent_amount,
                "currency": lease.currency,
            }),
            time_provider,
        );
        Ok(lease)
    }

    pub fn update_lease_terms(
        &mut self,
        tenant_id: TenantId,
        lease_id: LeaseId,
        update: LeaseTermsUpdate,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Lease> {
        let now = time_provider.now();
        let current = self.store.lease(tenant_id, lease_id)?;

        if current.status.is_terminal() {
            return Err(BillingError::LeaseTerminal {
                status: current.status,
            });
        }

        // mutate a copy so a rejected update never reaches the store
        let mut lease = current.clone();
        if let Some(rent) = update.rent_amount {
            lease.rent_amount = rent;
        }
        if let Some(service) = update.service_charge_amount {
            lease.service_charge_amount = service;
        }
        if let Some(deposit) = update.deposit_amount {
            lease.deposit_amount = deposit;
        }
        if let Some(due_day) = update.due_day {
            lease.due_day = due_day;
        }
        if let Some(end_date) = update.end_date {
            lease.end_date = Some(end_date);
        }
        if let Some(terms) = update.penalty_terms {
            lease.penalty_terms = Some(terms);
        }
        lease.updated_at = now;
        lease.validate()?;
        *self.store.lease_mut(tenant_id, lease_id)? = lease.clone();

        self.emit(
            actor,
            tenant_id,
            AuditAction::LeaseTermsUpdated,
            "lease",
            lease_id,
            json!({
                "rent_amount": lease.rent_amount,
                "service_charge_amount": lease.service_charge_amount,
                "deposit_amount": lease.deposit_amount,
                "due_day": lease.due_day,
            }),
            time_provider,
        );
        Ok(lease)
    }

    pub fn transition_lease(
        &mut self,
        tenant_id: TenantId,
        lease_id: LeaseId,
        next: LeaseStatus,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Lease> {
        let now = time_provider.now();
        let lease = self.store.lease_mut(tenant_id, lease_id)?;
        let previous = lease.status;
        lease.transition(next, now)?;
        let lease = lease.clone();

        self.emit(
            actor,
            tenant_id,
            AuditAction::LeaseStatusChanged,
            "lease",
            lease_id,
            json!({ "from": previous, "to": next }),
            time_provider,
        );
        Ok(lease)
    }

    // --- installments ---

    pub fn generate_installments(
        &mut self,
        tenant_id: TenantId,
        lease_id: LeaseId,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Vec<Installment>> {
        let now = time_provider.now();
        let created = installments::generate(&mut self.store, tenant_id, lease_id, now)?;

        self.emit(
            actor,
            tenant_id,
            AuditAction::InstallmentsGenerated,
            "lease",
            lease_id,
            json!({ "count": created.len() }),
            time_provider,
        );
        Ok(created)
    }

    pub fn recalculate_statuses(
        &mut self,
        tenant_id: TenantId,
        lease_id: LeaseId,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<usize> {
        let now = time_provider.now();
        let changed = installments::recalculate_statuses(
            &mut self.store,
            tenant_id,
            lease_id,
            now.date_naive(),
            now,
        )?;

        if changed > 0 {
            self.emit(
                actor,
                tenant_id,
                AuditAction::InstallmentStatusesRecalculated,
                "lease",
                lease_id,
                json!({ "changed": changed }),
                time_provider,
            );
        }
        Ok(changed)
    }

    pub fn delete_installments(
        &mut self,
        tenant_id: TenantId,
        lease_id: LeaseId,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<usize> {
        let today = time_provider.now().date_naive();
        let deleted = installments::delete_all(&mut self.store, tenant_id, lease_id, today)?;

        self.emit(
            actor,
            tenant_id,
            AuditAction::InstallmentsDeleted,
            "lease",
            lease_id,
            json!({ "count": deleted }),
            time_provider,
        );
        Ok(deleted)
    }

    // --- penalties ---

    pub fn calculate_penalty(
        &mut self,
        tenant_id: TenantId,
        installment_id: InstallmentId,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Penalty> {
        let now = time_provider.now();
        let record = penalty::calculate(
            &mut self.store,
            tenant_id,
            installment_id,
            actor,
            now.date_naive(),
            now,
        )?;

        self.emit(
            actor,
            tenant_id,
            AuditAction::PenaltyCalculated,
            "penalty",
            record.id,
            json!({
                "installment_id": installment_id,
                "amount": record.amount,
                "days_late": record.days_late,
                "mode": record.mode,
            }),
            time_provider,
        );
        Ok(record)
    }

    pub fn override_penalty(
        &mut self,
        tenant_id: TenantId,
        installment_id: InstallmentId,
        amount: Money,
        reason: &str,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Penalty> {
        let now = time_provider.now();
        let record = penalty::override_amount(
            &mut self.store,
            tenant_id,
            installment_id,
            amount,
            reason,
            actor,
            now.date_naive(),
            now,
        )?;

        self.emit(
            actor,
            tenant_id,
            AuditAction::PenaltyOverridden,
            "penalty",
            record.id,
            json!({
                "installment_id": installment_id,
                "amount": amount,
                "reason": reason,
            }),
            time_provider,
        );
        Ok(record)
    }

    pub fn delete_penalty(
        &mut self,
        tenant_id: TenantId,
        penalty_id: PenaltyId,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Penalty> {
        let now = time_provider.now();
        let removed =
            penalty::delete(&mut self.store, tenant_id, penalty_id, now.date_naive(), now)?;

        self.emit(
            actor,
            tenant_id,
            AuditAction::PenaltyDeleted,
            "penalty",
            penalty_id,
            json!({ "installment_id": removed.installment_id }),
            time_provider,
        );
        Ok(removed)
    }

    pub fn attach_penalty_justification(
        &mut self,
        tenant_id: TenantId,
        penalty_id: PenaltyId,
        justification: JustificationRef,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Penalty> {
        let now = time_provider.now();
        let file_name = justification.file_name.clone();
        let record = penalty::attach_justification(
            &mut self.store,
            tenant_id,
            penalty_id,
            justification,
            now,
        )?;

        self.emit(
            actor,
            tenant_id,
            AuditAction::PenaltyJustificationAttached,
            "penalty",
            penalty_id,
            json!({ "file_name": file_name }),
            time_provider,
        );
        Ok(record)
    }

    // --- payments ---

    pub fn create_payment(
        &mut self,
        request: NewPayment,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Payment> {
        let tenant_id = request.tenant_id;
        let (payment, created) =
            payments::create_payment(&mut self.store, request, time_provider.now())?;

        // idempotent replays have no side effects, including audit
        if created {
            self.emit(
                actor,
                tenant_id,
                AuditAction::PaymentCreated,
                "payment",
                payment.id,
                json!({
                    "amount": payment.amount,
                    "method": payment.method,
                    "idempotency_key": payment.idempotency_key,
                }),
                time_provider,
            );
        }
        Ok(payment)
    }

    pub fn allocate_payment(
        &mut self,
        tenant_id: TenantId,
        payment_id: PaymentId,
        installment_ids: &[InstallmentId],
        amounts: Option<&HashMap<InstallmentId, Money>>,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<AllocationOutcome> {
        let now = time_provider.now();
        let outcome = payments::allocate(
            &mut self.store,
            tenant_id,
            payment_id,
            installment_ids,
            amounts,
            now.date_naive(),
            now,
        )?;

        self.emit(
            actor,
            tenant_id,
            AuditAction::PaymentAllocated,
            "payment",
            payment_id,
            json!({
                "allocations": outcome
                    .allocations
                    .iter()
                    .map(|a| json!({ "installment_id": a.installment_id, "amount": a.amount }))
                    .collect::<Vec<_>>(),
                "remaining_unallocated": outcome.remaining_unallocated,
            }),
            time_provider,
        );
        Ok(outcome)
    }

    pub fn update_payment_status(
        &mut self,
        tenant_id: TenantId,
        payment_id: PaymentId,
        status: PaymentStatus,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Payment> {
        let payment = payments::update_status(
            &mut self.store,
            tenant_id,
            payment_id,
            status,
            time_provider.now(),
        )?;

        self.emit(
            actor,
            tenant_id,
            AuditAction::PaymentStatusChanged,
            "payment",
            payment_id,
            json!({ "status": status }),
            time_provider,
        );
        Ok(payment)
    }

    // --- deposits ---

    pub fn create_deposit(
        &mut self,
        tenant_id: TenantId,
        lease_id: LeaseId,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<SecurityDeposit> {
        let deposit = deposit::create(&mut self.store, tenant_id, lease_id, time_provider.now())?;

        self.emit(
            actor,
            tenant_id,
            AuditAction::DepositCreated,
            "deposit",
            deposit.id,
            json!({ "lease_id": lease_id, "target_amount": deposit.target_amount }),
            time_provider,
        );
        Ok(deposit)
    }

    pub fn record_deposit_movement(
        &mut self,
        tenant_id: TenantId,
        request: MovementRequest,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<(DepositMovement, SecurityDeposit)> {
        let (movement, deposit) = deposit::record_movement(
            &mut self.store,
            tenant_id,
            request,
            actor,
            time_provider.now(),
        )?;

        self.emit(
            actor,
            tenant_id,
            AuditAction::DepositMovementRecorded,
            "deposit",
            deposit.id,
            json!({
                "movement_type": movement.movement_type,
                "amount": movement.amount,
                "collected": deposit.collected,
            }),
            time_provider,
        );
        Ok((movement, deposit))
    }

    // --- scheduler ---

    /// on-demand entry point for the daily penalty sweep
    pub fn run_penalty_sweep(
        &mut self,
        scope: Option<TenantId>,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> SweepOutcome {
        let outcome = self.sweep.run(&mut self.store, scope, time_provider);

        let mut per_tenant: BTreeMap<TenantId, (usize, usize)> = BTreeMap::new();
        for penalty in &outcome.penalties {
            per_tenant.entry(penalty.tenant_id).or_default().0 += 1;
        }
        for error in &outcome.errors {
            per_tenant.entry(error.tenant_id).or_default().1 += 1;
        }
        for (tenant_id, (processed, errors)) in per_tenant {
            self.emit(
                actor,
                tenant_id,
                AuditAction::PenaltySweepCompleted,
                "tenant",
                tenant_id,
                json!({ "processed": processed, "errors": errors }),
                time_provider,
            );
        }
        outcome
    }
}
