use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::deposit::{DepositMovement, SecurityDeposit};
use crate::errors::{BillingError, Result};
use crate::installments::Installment;
use crate::lease::{Lease, PenaltyRule};
use crate::payments::{Payment, PaymentAllocation};
use crate::penalty::Penalty;
use crate::types::{
    DepositId, DepositMovementType, InstallmentFilter, InstallmentId, InstallmentStatus, LeaseId,
    PaymentFilter, PaymentId, PenaltyId, TenantId,
};

/// aggregated balance position of one lease
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseBalance {
    pub total_due: Money,
    pub total_paid: Money,
    pub outstanding: Money,
    pub overdue_count: usize,
}

/// in-memory tenant-scoped backing store
///
/// Engines validate completely before mutating, so every multi-row
/// operation is observably all-or-nothing under the single-writer `&mut`
/// discipline.
#[derive(Debug, Default)]
pub struct BillingStore {
    leases: HashMap<LeaseId, Lease>,
    lease_numbers: HashMap<(TenantId, String), LeaseId>,

    installments: HashMap<InstallmentId, Installment>,
    installment_periods: HashMap<(LeaseId, i32, u32), InstallmentId>,

    payments: HashMap<PaymentId, Payment>,
    idempotency: HashMap<(TenantId, String), PaymentId>,
    allocations: Vec<PaymentAllocation>,

    penalties: HashMap<PenaltyId, Penalty>,
    /// insertion-ordered penalty ids per installment; the last is current
    penalty_index: HashMap<InstallmentId, Vec<PenaltyId>>,

    deposits: HashMap<DepositId, SecurityDeposit>,
    deposit_by_lease: HashMap<LeaseId, DepositId>,
    movements: Vec<DepositMovement>,

    penalty_rules: HashMap<TenantId, PenaltyRule>,
}

impl BillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- leases ---

    pub fn insert_lease(&mut self, lease: Lease) -> Result<()> {
        lease.validate()?;
        let number_key = (lease.tenant_id, lease.lease_number.clone());
        if self.lease_numbers.contains_key(&number_key) {
            return Err(BillingError::DuplicateLeaseNumber {
                number: lease.lease_number,
            });
        }
        self.lease_numbers.insert(number_key, lease.id);
        self.leases.insert(lease.id, lease);
        Ok(())
    }

    pub fn lease(&self, tenant_id: TenantId, id: LeaseId) -> Result<&Lease> {
        self.leases
            .get(&id)
            .filter(|l| l.tenant_id == tenant_id)
            .ok_or(BillingError::LeaseNotFound { id })
    }

    pub fn lease_mut(&mut self, tenant_id: TenantId, id: LeaseId) -> Result<&mut Lease> {
        self.leases
            .get_mut(&id)
            .filter(|l| l.tenant_id == tenant_id)
            .ok_or(BillingError::LeaseNotFound { id })
    }

    pub fn list_leases(&self, tenant_id: TenantId) -> Vec<&Lease> {
        let mut leases: Vec<&Lease> = self
            .leases
            .values()
            .filter(|l| l.tenant_id == tenant_id)
            .collect();
        leases.sort_by(|a, b| a.lease_number.cmp(&b.lease_number));
        leases
    }

    /// tenants known to the store, in deterministic order
    pub fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self.leases.values().map(|l| l.tenant_id).collect();
        tenants.sort();
        tenants.dedup();
        tenants
    }

    // --- installments ---

    pub fn insert_installment(&mut self, installment: Installment) -> Result<()> {
        let period_key = (
            installment.lease_id,
            installment.period_year,
            installment.period_month,
        );
        if self.installment_periods.contains_key(&period_key) {
            return Err(BillingError::DuplicateInstallmentPeriod {
                lease_id: installment.lease_id,
                year: installment.period_year,
                month: installment.period_month,
            });
        }
        self.installment_periods.insert(period_key, installment.id);
        self.installments.insert(installment.id, installment);
        Ok(())
    }

    pub fn installment(&self, tenant_id: TenantId, id: InstallmentId) -> Result<&Installment> {
        self.installments
            .get(&id)
            .filter(|i| i.tenant_id == tenant_id)
            .ok_or(BillingError::InstallmentNotFound { id })
    }

    pub fn installment_mut(
        &mut self,
        tenant_id: TenantId,
        id: InstallmentId,
    ) -> Result<&mut Installment> {
        self.installments
            .get_mut(&id)
            .filter(|i| i.tenant_id == tenant_id)
            .ok_or(BillingError::InstallmentNotFound { id })
    }

    pub fn has_installments(&self, lease_id: LeaseId) -> bool {
        self.installments.values().any(|i| i.lease_id == lease_id)
    }

    pub fn installments_for_lease(&self, lease_id: LeaseId) -> Vec<&Installment> {
        let mut installments: Vec<&Installment> = self
            .installments
            .values()
            .filter(|i| i.lease_id == lease_id)
            .collect();
        installments.sort_by_key(|i| (i.period_year, i.period_month));
        installments
    }

    pub fn list_installments(
        &self,
        tenant_id: TenantId,
        filter: &InstallmentFilter,
        today: NaiveDate,
    ) -> Vec<&Installment> {
        let mut installments: Vec<&Installment> = self
            .installments
            .values()
            .filter(|i| i.tenant_id == tenant_id)
            .filter(|i| filter.lease_id.map_or(true, |l| i.lease_id == l))
            .filter(|i| filter.status.map_or(true, |s| i.status == s))
            .filter(|i| filter.period_year.map_or(true, |y| i.period_year == y))
            .filter(|i| filter.period_month.map_or(true, |m| i.period_month == m))
            .filter(|i| {
                !filter.overdue_only
                    || (i.due_date < today
                        && i.amount_paid < i.total_due()
                        && i.status != InstallmentStatus::Canceled)
            })
            .collect();
        installments.sort_by_key(|i| (i.due_date, i.period_year, i.period_month, i.id));
        installments
    }

    pub fn remove_installments_for_lease(&mut self, lease_id: LeaseId) -> usize {
        let ids: Vec<InstallmentId> = self
            .installments
            .values()
            .filter(|i| i.lease_id == lease_id)
            .map(|i| i.id)
            .collect();
        for id in &ids {
            self.installments.remove(id);
        }
        self.installment_periods.retain(|(l, _, _), _| *l != lease_id);
        ids.len()
    }

    /// overdue, not fully paid installments, ordered (tenant, due date, id)
    pub fn overdue_installments(
        &self,
        scope: Option<TenantId>,
        today: NaiveDate,
    ) -> Vec<(TenantId, InstallmentId)> {
        let mut overdue: Vec<(TenantId, NaiveDate, InstallmentId)> = self
            .installments
            .values()
            .filter(|i| scope.map_or(true, |t| i.tenant_id == t))
            .filter(|i| i.status != InstallmentStatus::Canceled)
            .filter(|i| i.due_date < today && i.amount_paid < i.total_due())
            .map(|i| (i.tenant_id, i.due_date, i.id))
            .collect();
        overdue.sort();
        overdue
            .into_iter()
            .map(|(tenant, _, id)| (tenant, id))
            .collect()
    }

    // --- payments & allocations ---

    pub fn insert_payment(&mut self, payment: Payment) -> Result<()> {
        let key = (payment.tenant_id, payment.idempotency_key.clone());
        if self.idempotency.contains_key(&key) {
            return Err(BillingError::DuplicateIdempotencyKey {
                key: payment.idempotency_key,
            });
        }
        self.idempotency.insert(key, payment.id);
        self.payments.insert(payment.id, payment);
        Ok(())
    }

    pub fn payment(&self, tenant_id: TenantId, id: PaymentId) -> Result<&Payment> {
        self.payments
            .get(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .ok_or(BillingError::PaymentNotFound { id })
    }

    pub fn payment_mut(&mut self, tenant_id: TenantId, id: PaymentId) -> Result<&mut Payment> {
        self.payments
            .get_mut(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .ok_or(BillingError::PaymentNotFound { id })
    }

    pub fn payment_by_key(&self, tenant_id: TenantId, key: &str) -> Option<&Payment> {
        self.idempotency
            .get(&(tenant_id, key.to_string()))
            .and_then(|id| self.payments.get(id))
    }

    pub fn payment_count(&self) -> usize {
        self.payments.len()
    }

    pub fn list_payments(&self, tenant_id: TenantId, filter: &PaymentFilter) -> Vec<&Payment> {
        let mut payments: Vec<&Payment> = self
            .payments
            .values()
            .filter(|p| p.tenant_id == tenant_id)
            .filter(|p| filter.lease_id.map_or(true, |l| p.lease_id == Some(l)))
            .filter(|p| filter.renter_id.map_or(true, |r| p.renter_id == Some(r)))
            .filter(|p| filter.status.map_or(true, |s| p.status == s))
            .filter(|p| filter.method.map_or(true, |m| p.method == m))
            .collect();
        payments.sort_by_key(|p| (p.created_at, p.id));
        payments
    }

    pub fn insert_allocation(&mut self, allocation: PaymentAllocation) {
        self.allocations.push(allocation);
    }

    pub fn allocations_for_payment(&self, payment_id: PaymentId) -> Vec<&PaymentAllocation> {
        self.allocations
            .iter()
            .filter(|a| a.payment_id == payment_id)
            .collect()
    }

    /// total amount a payment has already allocated, across all calls
    pub fn allocated_for_payment(&self, payment_id: PaymentId) -> Money {
        self.allocations
            .iter()
            .filter(|a| a.payment_id == payment_id)
            .fold(Money::ZERO, |acc, a| acc + a.amount)
    }

    /// total amount allocated to an installment, across all payments
    pub fn allocated_to_installment(&self, installment_id: InstallmentId) -> Money {
        self.allocations
            .iter()
            .filter(|a| a.installment_id == installment_id)
            .fold(Money::ZERO, |acc, a| acc + a.amount)
    }

    // --- penalties ---

    pub fn insert_penalty(&mut self, penalty: Penalty) {
        self.penalty_index
            .entry(penalty.installment_id)
            .or_default()
            .push(penalty.id);
        self.penalties.insert(penalty.id, penalty);
    }

    pub fn penalty(&self, tenant_id: TenantId, id: PenaltyId) -> Result<&Penalty> {
        self.penalties
            .get(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .ok_or(BillingError::PenaltyNotFound { id })
    }

    pub fn penalty_mut(&mut self, tenant_id: TenantId, id: PenaltyId) -> Result<&mut Penalty> {
        self.penalties
            .get_mut(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .ok_or(BillingError::PenaltyNotFound { id })
    }

    /// the latest penalty record for an installment, if any
    pub fn current_penalty(&self, installment_id: InstallmentId) -> Option<&Penalty> {
        self.penalty_index
            .get(&installment_id)
            .and_then(|ids| ids.last())
            .and_then(|id| self.penalties.get(id))
    }

    pub fn penalties_for_installment(&self, installment_id: InstallmentId) -> Vec<&Penalty> {
        self.penalty_index
            .get(&installment_id)
            .map(|ids| ids.iter().filter_map(|id| self.penalties.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn penalty_total_for_installment(&self, installment_id: InstallmentId) -> Money {
        self.penalties_for_installment(installment_id)
            .iter()
            .fold(Money::ZERO, |acc, p| acc + p.amount)
    }

    pub fn remove_penalty(&mut self, tenant_id: TenantId, id: PenaltyId) -> Result<Penalty> {
        let penalty = self
            .penalties
            .get(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .ok_or(BillingError::PenaltyNotFound { id })?
            .clone();
        self.penalties.remove(&id);
        if let Some(ids) = self.penalty_index.get_mut(&penalty.installment_id) {
            ids.retain(|pid| *pid != id);
        }
        Ok(penalty)
    }

    /// tenant default penalty rule, lazily created on first use
    pub fn penalty_rule_or_default(
        &mut self,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) -> &PenaltyRule {
        self.penalty_rules
            .entry(tenant_id)
            .or_insert_with(|| PenaltyRule::new_default(tenant_id, now))
    }

    // --- deposits ---

    pub fn insert_deposit(&mut self, deposit: SecurityDeposit) -> Result<()> {
        if self.deposit_by_lease.contains_key(&deposit.lease_id) {
            return Err(BillingError::DepositAlreadyExists {
                lease_id: deposit.lease_id,
            });
        }
        self.deposit_by_lease.insert(deposit.lease_id, deposit.id);
        self.deposits.insert(deposit.id, deposit);
        Ok(())
    }

    pub fn deposit_mut(
        &mut self,
        tenant_id: TenantId,
        id: DepositId,
    ) -> Result<&mut SecurityDeposit> {
        let lease_id = self
            .deposits
            .get(&id)
            .map(|d| d.lease_id)
            .unwrap_or_default();
        self.deposits
            .get_mut(&id)
            .filter(|d| d.tenant_id == tenant_id)
            .ok_or(BillingError::DepositNotFound { lease_id })
    }

    pub fn deposit_for_lease(&self, lease_id: LeaseId) -> Option<&SecurityDeposit> {
        self.deposit_by_lease
            .get(&lease_id)
            .and_then(|id| self.deposits.get(id))
    }

    pub fn insert_movement(&mut self, movement: DepositMovement) {
        self.movements.push(movement);
    }

    pub fn movements_for_deposit(&self, deposit_id: DepositId) -> Vec<&DepositMovement> {
        self.movements
            .iter()
            .filter(|m| m.deposit_id == deposit_id)
            .collect()
    }

    pub fn deposit_has_collect(&self, deposit_id: DepositId) -> bool {
        self.movements
            .iter()
            .any(|m| m.deposit_id == deposit_id && m.movement_type == DepositMovementType::Collect)
    }

    // --- aggregates ---

    /// balance summary across a lease's non-canceled installments
    pub fn lease_balance(
        &self,
        tenant_id: TenantId,
        lease_id: LeaseId,
        today: NaiveDate,
    ) -> Result<LeaseBalance> {
        self.lease(tenant_id, lease_id)?;

        let mut balance = LeaseBalance {
            total_due: Money::ZERO,
            total_paid: Money::ZERO,
            outstanding: Money::ZERO,
            overdue_count: 0,
        };
        for installment in self.installments_for_lease(lease_id) {
            if installment.status == InstallmentStatus::Canceled {
                continue;
            }
            balance.total_due += installment.total_due();
            balance.total_paid += installment.amount_paid;
            balance.outstanding += installment.outstanding();
            if installment.due_date < today && installment.amount_paid < installment.total_due() {
                balance.overdue_count += 1;
            }
        }
        Ok(balance)
    }
}
