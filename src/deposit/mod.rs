use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::store::BillingStore;
use crate::types::{
    DepositId, DepositMovementType, InstallmentId, LeaseId, MovementId, PaymentId, TenantId,
};

/// security deposit for one lease, with derived running totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityDeposit {
    pub id: DepositId,
    pub tenant_id: TenantId,
    /// one deposit per lease, enforced unique
    pub lease_id: LeaseId,
    pub currency: String,
    pub target_amount: Money,
    /// sum of collect and signed adjustment movements
    pub collected: Money,
    pub held: Money,
    pub refunded: Money,
    pub forfeited: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SecurityDeposit {
    /// balance still available for refund or forfeiture
    pub fn available(&self) -> Money {
        self.collected - self.refunded - self.forfeited
    }
}

/// one append-only ledger entry; immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositMovement {
    pub id: MovementId,
    pub tenant_id: TenantId,
    pub deposit_id: DepositId,
    pub movement_type: DepositMovementType,
    /// signed only for Adjustment movements
    pub amount: Money,
    pub payment_id: Option<PaymentId>,
    pub installment_id: Option<InstallmentId>,
    pub note: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// request to append a movement to a lease's deposit ledger
#[derive(Debug, Clone)]
pub struct MovementRequest {
    pub lease_id: LeaseId,
    pub movement_type: DepositMovementType,
    pub amount: Money,
    pub payment_id: Option<PaymentId>,
    pub installment_id: Option<InstallmentId>,
    pub note: Option<String>,
}

/// open the deposit ledger for a lease, once
pub fn create(
    store: &mut BillingStore,
    tenant_id: TenantId,
    lease_id: LeaseId,
    now: DateTime<Utc>,
) -> Result<SecurityDeposit> {
    let lease = store.lease(tenant_id, lease_id)?;

    if store.deposit_for_lease(lease_id).is_some() {
        return Err(BillingError::DepositAlreadyExists { lease_id });
    }

    let deposit = SecurityDeposit {
        id: Uuid::new_v4(),
        tenant_id,
        lease_id,
        currency: lease.currency.clone(),
        target_amount: lease.deposit_amount,
        collected: Money::ZERO,
        held: Money::ZERO,
        refunded: Money::ZERO,
        forfeited: Money::ZERO,
        created_at: now,
        updated_at: now,
    };
    store.insert_deposit(deposit.clone())?;
    Ok(deposit)
}

/// append a movement and update the deposit's running totals as one step
///
/// All validation happens before any field mutates, so a rejected movement
/// leaves the ledger untouched.
pub fn record_movement(
    store: &mut BillingStore,
    tenant_id: TenantId,
    request: MovementRequest,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<(DepositMovement, SecurityDeposit)> {
    let deposit = store
        .deposit_for_lease(request.lease_id)
        .filter(|d| d.tenant_id == tenant_id)
        .cloned()
        .ok_or(BillingError::DepositNotFound {
            lease_id: request.lease_id,
        })?;

    let amount = request.amount;
    match request.movement_type {
        DepositMovementType::Collect => {
            if store.deposit_has_collect(deposit.id) {
                return Err(BillingError::DepositAlreadyCollected {
                    lease_id: request.lease_id,
                });
            }
            if amount != deposit.target_amount {
                return Err(BillingError::CollectAmountMismatch {
                    target: deposit.target_amount,
                    provided: amount,
                });
            }
            let payment_id = request.payment_id.ok_or(BillingError::MissingReference {
                message: "collect movement requires a payment reference".to_string(),
            })?;
            store.payment(tenant_id, payment_id)?;
        }
        DepositMovementType::Hold | DepositMovementType::Refund | DepositMovementType::Forfeit => {
            if !amount.is_positive() {
                return Err(BillingError::InvalidAmount { amount });
            }
            if matches!(
                request.movement_type,
                DepositMovementType::Refund | DepositMovementType::Forfeit
            ) && amount > deposit.available()
            {
                return Err(BillingError::InsufficientDepositBalance {
                    available: deposit.available(),
                    requested: amount,
                });
            }
        }
        DepositMovementType::Release => {
            if !amount.is_positive() {
                return Err(BillingError::InvalidAmount { amount });
            }
            if amount > deposit.held {
                return Err(BillingError::InsufficientDepositBalance {
                    available: deposit.held,
                    requested: amount,
                });
            }
        }
        DepositMovementType::Adjustment => {
            // signed: positive increases the collected balance, negative decreases
            if amount.is_zero() {
                return Err(BillingError::InvalidAmount { amount });
            }
            if (deposit.collected + amount).is_negative()
                || (deposit.available() + amount).is_negative()
            {
                return Err(BillingError::InsufficientDepositBalance {
                    available: deposit.available(),
                    requested: amount.abs(),
                });
            }
        }
    }

    let movement = DepositMovement {
        id: Uuid::new_v4(),
        tenant_id,
        deposit_id: deposit.id,
        movement_type: request.movement_type,
        amount,
        payment_id: request.payment_id,
        installment_id: request.installment_id,
        note: request.note,
        created_by: actor.to_string(),
        created_at: now,
    };
    store.insert_movement(movement.clone());

    let deposit = store.deposit_mut(tenant_id, deposit.id)?;
    match request.movement_type {
        DepositMovementType::Collect => deposit.collected += amount,
        DepositMovementType::Hold => deposit.held += amount,
        DepositMovementType::Release => deposit.held -= amount,
        DepositMovementType::Refund => deposit.refunded += amount,
        DepositMovementType::Forfeit => deposit.forfeited += amount,
        DepositMovementType::Adjustment => deposit.collected += amount,
    }
    deposit.updated_at = now;

    Ok((movement, deposit.clone()))
}
