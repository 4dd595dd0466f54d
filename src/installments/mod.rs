use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::schedule::billing_periods;
use crate::store::BillingStore;
use crate::types::{InstallmentId, InstallmentStatus, LeaseId, TenantId};

/// days a lease must have been ended before its installments may be deleted
pub const DELETE_COOLING_OFF_DAYS: u64 = 30;

/// one billing period's charge against a lease
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub tenant_id: TenantId,
    pub lease_id: LeaseId,
    /// unique (lease, year, month) pair
    pub period_year: i32,
    pub period_month: u32,
    pub due_date: NaiveDate,
    pub currency: String,

    pub rent_amount: Money,
    pub service_amount: Money,
    pub other_fees_amount: Money,
    /// mutated only by the penalty engine
    pub penalty_amount: Money,
    /// mutated only by the payment allocator; monotonically non-decreasing
    pub amount_paid: Money,

    pub status: InstallmentStatus,
    /// stamped on the transition into Paid
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Installment {
    /// rent + service + other fees + penalty
    pub fn total_due(&self) -> Money {
        self.rent_amount + self.service_amount + self.other_fees_amount + self.penalty_amount
    }

    /// total due minus amount paid, floored at zero
    pub fn outstanding(&self) -> Money {
        (self.total_due() - self.amount_paid).max(Money::ZERO)
    }

    /// balance excluding penalty, used by percent-of-balance penalties
    /// and the minimum-balance suppression check
    pub fn balance_before_penalty(&self) -> Money {
        (self.rent_amount + self.service_amount + self.other_fees_amount - self.amount_paid)
            .max(Money::ZERO)
    }

    /// derive the status this installment should carry as of `today`
    pub fn derived_status(&self, today: NaiveDate) -> InstallmentStatus {
        derive_status(self.due_date, self.total_due(), self.amount_paid, today)
    }
}

/// pure status derivation from (due date, total due, amount paid, today)
pub fn derive_status(
    due_date: NaiveDate,
    total_due: Money,
    amount_paid: Money,
    today: NaiveDate,
) -> InstallmentStatus {
    if amount_paid >= total_due {
        InstallmentStatus::Paid
    } else if due_date < today {
        InstallmentStatus::Overdue
    } else if amount_paid.is_positive() {
        InstallmentStatus::Partial
    } else {
        InstallmentStatus::Due
    }
}

/// generate the full installment schedule for a lease, strictly once
pub fn generate(
    store: &mut BillingStore,
    tenant_id: TenantId,
    lease_id: LeaseId,
    now: DateTime<Utc>,
) -> Result<Vec<Installment>> {
    let lease = store.lease(tenant_id, lease_id)?.clone();

    if lease.status.is_terminal() {
        return Err(BillingError::LeaseTerminal {
            status: lease.status,
        });
    }
    if store.has_installments(lease_id) {
        return Err(BillingError::InstallmentsAlreadyGenerated { lease_id });
    }

    let periods = billing_periods(
        lease.start_date,
        lease.end_date,
        lease.frequency,
        lease.due_day,
    )?;

    let mut created = Vec::with_capacity(periods.len());
    for period in &periods {
        let installment = Installment {
            id: Uuid::new_v4(),
            tenant_id,
            lease_id,
            period_year: period.year,
            period_month: period.month,
            due_date: period.due_date,
            currency: lease.currency.clone(),
            rent_amount: lease.rent_amount,
            service_amount: lease.service_charge_amount,
            other_fees_amount: Money::ZERO,
            penalty_amount: Money::ZERO,
            amount_paid: Money::ZERO,
            status: InstallmentStatus::Draft,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        created.push(installment);
    }

    for installment in &created {
        store.insert_installment(installment.clone())?;
    }

    Ok(created)
}

/// re-derive the status of every non-canceled installment of a lease
///
/// Idempotent: only installments whose derived status differs from the
/// stored one are touched. Returns the number of changed rows.
pub fn recalculate_statuses(
    store: &mut BillingStore,
    tenant_id: TenantId,
    lease_id: LeaseId,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<usize> {
    store.lease(tenant_id, lease_id)?;

    let ids: Vec<InstallmentId> = store
        .installments_for_lease(lease_id)
        .iter()
        .filter(|i| i.status != InstallmentStatus::Canceled)
        .map(|i| i.id)
        .collect();

    let mut changed = 0;
    for id in ids {
        let installment = store.installment_mut(tenant_id, id)?;
        let derived = installment.derived_status(today);
        if derived != installment.status {
            installment.status = derived;
            installment.updated_at = now;
            changed += 1;
        }
    }

    Ok(changed)
}

/// delete every installment of a lease, guarded by the cooling-off window
/// and by existing payment allocations
pub fn delete_all(
    store: &mut BillingStore,
    tenant_id: TenantId,
    lease_id: LeaseId,
    today: NaiveDate,
) -> Result<usize> {
    let lease = store.lease(tenant_id, lease_id)?;

    if let Some(ended_at) = lease.ended_at {
        let cooling_off_until = ended_at
            .date_naive()
            .checked_add_days(Days::new(DELETE_COOLING_OFF_DAYS))
            .ok_or_else(|| BillingError::InvalidDate {
                message: "cooling-off window overflow".to_string(),
            })?;
        if today < cooling_off_until {
            return Err(BillingError::CoolingOffActive {
                until: cooling_off_until,
            });
        }
    }

    let allocated = store
        .installments_for_lease(lease_id)
        .iter()
        .filter(|i| store.allocated_to_installment(i.id).is_positive())
        .count();
    if allocated > 0 {
        return Err(BillingError::DeleteBlockedByAllocations { allocated });
    }

    Ok(store.remove_installments_for_lease(lease_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::Lease;
    use crate::payments::{allocate, create_payment, NewPayment};
    use crate::types::{BillingFrequency, LeaseStatus, PaymentMethod};
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed_lease(store: &mut BillingStore) -> (TenantId, LeaseId) {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let tenant_id = Uuid::new_v4();
        let lease = Lease {
            id: Uuid::new_v4(),
            tenant_id,
            lease_number: "L-001".to_string(),
            property_id: Uuid::new_v4(),
            renter_id: Uuid::new_v4(),
            owner_id: None,
            start_date: date(2026, 1, 1),
            end_date: Some(date(2026, 3, 31)),
            move_in_date: None,
            move_out_date: None,
            frequency: BillingFrequency::Monthly,
            due_day: 5,
            currency: "XOF".to_string(),
            rent_amount: Money::from_major(150_000),
            service_charge_amount: Money::from_major(10_000),
            deposit_amount: Money::ZERO,
            penalty_terms: None,
            status: LeaseStatus::Active,
            ended_at: None,
            created_at: now,
            updated_at: now,
        };
        let lease_id = lease.id;
        store.insert_lease(lease).unwrap();
        (tenant_id, lease_id)
    }

    #[test]
    fn test_status_derivation() {
        let due = date(2026, 3, 5);
        let total = Money::from_major(160_000);

        // fully paid wins regardless of date
        assert_eq!(
            derive_status(due, total, total, date(2026, 4, 1)),
            InstallmentStatus::Paid
        );
        // past due and unpaid
        assert_eq!(
            derive_status(due, total, Money::ZERO, date(2026, 3, 6)),
            InstallmentStatus::Overdue
        );
        // partially paid before due date
        assert_eq!(
            derive_status(due, total, Money::from_major(1), date(2026, 3, 5)),
            InstallmentStatus::Partial
        );
        // unpaid before due date
        assert_eq!(
            derive_status(due, total, Money::ZERO, date(2026, 3, 5)),
            InstallmentStatus::Due
        );
    }

    #[test]
    fn test_status_derivation_is_a_fixed_point() {
        let due = date(2026, 3, 5);
        let total = Money::from_major(160_000);
        let paid = Money::from_major(60_000);
        let today = date(2026, 2, 1);

        let first = derive_status(due, total, paid, today);
        for _ in 0..5 {
            assert_eq!(derive_status(due, total, paid, today), first);
        }
    }

    #[test]
    fn test_partial_past_due_is_overdue() {
        let due = date(2026, 3, 5);
        let total = Money::from_major(100);
        assert_eq!(
            derive_status(due, total, Money::from_major(40), date(2026, 3, 10)),
            InstallmentStatus::Overdue
        );
    }

    #[test]
    fn test_outstanding_floors_at_zero() {
        let installment = Installment {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            lease_id: Uuid::new_v4(),
            period_year: 2026,
            period_month: 1,
            due_date: date(2026, 1, 5),
            currency: "XOF".to_string(),
            rent_amount: Money::from_major(100),
            service_amount: Money::ZERO,
            other_fees_amount: Money::ZERO,
            penalty_amount: Money::ZERO,
            amount_paid: Money::from_major(150),
            status: InstallmentStatus::Paid,
            paid_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(installment.outstanding(), Money::ZERO);
    }

    #[test]
    fn test_generate_copies_lease_amounts() {
        let mut store = BillingStore::new();
        let (tenant, lease_id) = seed_lease(&mut store);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let created = generate(&mut store, tenant, lease_id, now).unwrap();
        assert_eq!(created.len(), 3);
        for installment in &created {
            assert_eq!(installment.status, InstallmentStatus::Draft);
            assert_eq!(installment.rent_amount, Money::from_major(150_000));
            assert_eq!(installment.service_amount, Money::from_major(10_000));
            assert_eq!(installment.amount_paid, Money::ZERO);
        }
    }

    #[test]
    fn test_recalculate_persists_only_changes() {
        let mut store = BillingStore::new();
        let (tenant, lease_id) = seed_lease(&mut store);
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 0, 0, 0).unwrap();
        generate(&mut store, tenant, lease_id, now).unwrap();

        // on feb 10 the first two periods are past due, the third is not
        let changed =
            recalculate_statuses(&mut store, tenant, lease_id, date(2026, 2, 10), now).unwrap();
        assert_eq!(changed, 3);

        // a second pass finds nothing to change
        let changed =
            recalculate_statuses(&mut store, tenant, lease_id, date(2026, 2, 10), now).unwrap();
        assert_eq!(changed, 0);
    }

    #[test]
    fn test_delete_blocked_during_cooling_off() {
        let mut store = BillingStore::new();
        let (tenant, lease_id) = seed_lease(&mut store);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        generate(&mut store, tenant, lease_id, now).unwrap();

        let ended_at = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
        let lease = store.lease_mut(tenant, lease_id).unwrap();
        lease.transition(LeaseStatus::Ended, ended_at).unwrap();

        let err = delete_all(&mut store, tenant, lease_id, date(2026, 4, 15)).unwrap_err();
        assert!(matches!(
            err,
            BillingError::CoolingOffActive { until } if until == date(2026, 5, 1)
        ));

        // 30 days after the end the window is open
        let deleted = delete_all(&mut store, tenant, lease_id, date(2026, 5, 1)).unwrap();
        assert_eq!(deleted, 3);
        assert!(!store.has_installments(lease_id));
    }

    #[test]
    fn test_delete_blocked_by_allocations() {
        let mut store = BillingStore::new();
        let (tenant, lease_id) = seed_lease(&mut store);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let created = generate(&mut store, tenant, lease_id, now).unwrap();

        let (payment, _) = create_payment(
            &mut store,
            NewPayment {
                tenant_id: tenant,
                lease_id: Some(lease_id),
                renter_id: None,
                method: PaymentMethod::Cash,
                amount: Money::from_major(50_000),
                currency: "XOF".to_string(),
                idempotency_key: "K1".to_string(),
                mobile_money: None,
                provider_reference: None,
            },
            now,
        )
        .unwrap();
        allocate(
            &mut store,
            tenant,
            payment.id,
            &[created[0].id],
            None,
            date(2026, 1, 2),
            now,
        )
        .unwrap();

        let err = delete_all(&mut store, tenant, lease_id, date(2026, 1, 2)).unwrap_err();
        assert!(matches!(err, BillingError::DeleteBlockedByAllocations { allocated: 1 }));
    }
}
