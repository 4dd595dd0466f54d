use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::store::BillingStore;
use crate::types::{
    AllocationId, InstallmentId, InstallmentStatus, LeaseId, MobileMoneyDetails, PaymentId,
    PaymentMethod, PaymentStatus, TenantId,
};

/// an amount received from a renter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub tenant_id: TenantId,
    pub lease_id: Option<LeaseId>,
    pub renter_id: Option<Uuid>,
    pub method: PaymentMethod,
    pub amount: Money,
    pub currency: String,
    /// unique per tenant; replays return the stored record unchanged
    pub idempotency_key: String,
    pub status: PaymentStatus,
    pub mobile_money: Option<MobileMoneyDetails>,
    pub provider_reference: Option<String>,
    pub succeeded_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// the portion of a payment applied to one installment; append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub id: AllocationId,
    pub tenant_id: TenantId,
    pub payment_id: PaymentId,
    pub installment_id: InstallmentId,
    pub amount: Money,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// request to record a payment
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub tenant_id: TenantId,
    pub lease_id: Option<LeaseId>,
    pub renter_id: Option<Uuid>,
    pub method: PaymentMethod,
    pub amount: Money,
    pub currency: String,
    pub idempotency_key: String,
    pub mobile_money: Option<MobileMoneyDetails>,
    pub provider_reference: Option<String>,
}

/// result of one allocate call
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationOutcome {
    pub payment_id: PaymentId,
    pub allocations: Vec<PaymentAllocation>,
    /// payment amount still unallocated after this call
    pub remaining_unallocated: Money,
}

/// record a payment, idempotently
///
/// A replay under the same (tenant, idempotency key) returns the stored
/// record with no side effects. New payments are persisted as Success:
/// manually recorded payments have no gateway-pending window. The returned
/// flag is true when a row was actually created.
pub fn create_payment(
    store: &mut BillingStore,
    new: NewPayment,
    now: DateTime<Utc>,
) -> Result<(Payment, bool)> {
    if new.idempotency_key.trim().is_empty() {
        return Err(BillingError::MissingReference {
            message: "idempotency key is required".to_string(),
        });
    }

    if let Some(existing) = store.payment_by_key(new.tenant_id, &new.idempotency_key) {
        return Ok((existing.clone(), false));
    }

    if !new.amount.is_positive() {
        return Err(BillingError::InvalidAmount { amount: new.amount });
    }

    if let Some(lease_id) = new.lease_id {
        let lease = store.lease(new.tenant_id, lease_id)?;
        if lease.currency != new.currency {
            return Err(BillingError::CurrencyMismatch {
                expected: lease.currency.clone(),
                provided: new.currency,
            });
        }
    }

    let payment = Payment {
        id: Uuid::new_v4(),
        tenant_id: new.tenant_id,
        lease_id: new.lease_id,
        renter_id: new.renter_id,
        method: new.method,
        amount: new.amount,
        currency: new.currency,
        idempotency_key: new.idempotency_key,
        status: PaymentStatus::Success,
        mobile_money: new.mobile_money,
        provider_reference: new.provider_reference,
        succeeded_at: Some(now),
        failed_at: None,
        canceled_at: None,
        created_at: now,
        updated_at: now,
    };
    store.insert_payment(payment.clone())?;
    Ok((payment, true))
}

/// allocate a payment across installments, oldest due date first
///
/// The plan is validated in full before anything is written, so a failed
/// call leaves no partial rows. Caller-specified per-installment amounts
/// cap the automatic split but never exceed outstanding balances.
pub fn allocate(
    store: &mut BillingStore,
    tenant_id: TenantId,
    payment_id: PaymentId,
    installment_ids: &[InstallmentId],
    amounts: Option<&HashMap<InstallmentId, Money>>,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<AllocationOutcome> {
    let payment = store.payment(tenant_id, payment_id)?.clone();

    let already_allocated = store.allocated_for_payment(payment_id);
    if already_allocated >= payment.amount {
        return Err(BillingError::PaymentFullyAllocated { payment_id });
    }
    let mut remaining = payment.amount - already_allocated;

    if let Some(amounts) = amounts {
        for amount in amounts.values() {
            if amount.is_negative() {
                return Err(BillingError::InvalidAmount { amount: *amount });
            }
        }
    }

    // load the requested installments, scoped to the payment's lease when set
    let mut targets = Vec::with_capacity(installment_ids.len());
    for &id in installment_ids {
        let installment = store.installment(tenant_id, id)?;
        if let Some(lease_id) = payment.lease_id {
            if installment.lease_id != lease_id {
                return Err(BillingError::InstallmentNotFound { id });
            }
        }
        if installment.status == InstallmentStatus::Canceled {
            continue;
        }
        targets.push(installment.clone());
    }

    // deterministic tie-break for automatic allocation
    targets.sort_by_key(|i| (i.due_date, i.period_year, i.period_month, i.id));

    let mut plan: Vec<(InstallmentId, Money)> = Vec::new();
    for installment in &targets {
        if !remaining.is_positive() {
            break;
        }
        let outstanding = installment.total_due() - store.allocated_to_installment(installment.id);
        if !outstanding.is_positive() {
            continue;
        }

        let mut portion = outstanding.min(remaining);
        if let Some(requested) = amounts.and_then(|m| m.get(&installment.id)) {
            portion = portion.min(*requested);
        }
        if !portion.is_positive() {
            continue;
        }

        plan.push((installment.id, portion));
        remaining -= portion;
    }

    if plan.is_empty() {
        return Err(BillingError::NoAllocationPossible { payment_id });
    }

    // apply the validated plan as a unit
    let mut allocations = Vec::with_capacity(plan.len());
    for (installment_id, amount) in plan {
        let allocation = PaymentAllocation {
            id: Uuid::new_v4(),
            tenant_id,
            payment_id,
            installment_id,
            amount,
            currency: payment.currency.clone(),
            created_at: now,
        };
        store.insert_allocation(allocation.clone());

        let allocated_total = store.allocated_to_installment(installment_id);
        let installment = store.installment_mut(tenant_id, installment_id)?;
        installment.amount_paid = allocated_total;
        let derived = installment.derived_status(today);
        if derived == InstallmentStatus::Paid && installment.paid_at.is_none() {
            installment.paid_at = Some(now);
        }
        installment.status = derived;
        installment.updated_at = now;

        allocations.push(allocation);
    }

    Ok(AllocationOutcome {
        payment_id,
        allocations,
        remaining_unallocated: remaining,
    })
}

/// transition a payment's status, stamping its timestamp exactly once
pub fn update_status(
    store: &mut BillingStore,
    tenant_id: TenantId,
    payment_id: PaymentId,
    status: PaymentStatus,
    now: DateTime<Utc>,
) -> Result<Payment> {
    let payment = store.payment_mut(tenant_id, payment_id)?;

    if payment.status == status {
        // re-setting the same status never re-stamps
        return Ok(payment.clone());
    }

    payment.status = status;
    match status {
        PaymentStatus::Success if payment.succeeded_at.is_none() => {
            payment.succeeded_at = Some(now);
        }
        PaymentStatus::Failed if payment.failed_at.is_none() => {
            payment.failed_at = Some(now);
        }
        PaymentStatus::Canceled if payment.canceled_at.is_none() => {
            payment.canceled_at = Some(now);
        }
        _ => {}
    }
    payment.updated_at = now;
    Ok(payment.clone())
}
