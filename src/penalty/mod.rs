use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{BillingError, Result};
use crate::installments::Installment;
use crate::lease::PenaltyTerms;
use crate::store::BillingStore;
use crate::types::{InstallmentId, InstallmentStatus, JustificationRef, PenaltyId, PenaltyMode, TenantId};

/// computed or overridden late fee for one installment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Penalty {
    pub id: PenaltyId,
    pub tenant_id: TenantId,
    pub installment_id: InstallmentId,
    pub days_late: u32,
    /// mode snapshot at calculation time
    pub mode: PenaltyMode,
    pub rate: Option<Rate>,
    pub fixed_amount: Option<Money>,
    pub amount: Money,
    /// frozen from automatic recalculation when set
    pub manual_override: bool,
    pub override_reason: Option<String>,
    /// structured document reference, kept apart from the reason text
    pub justification: Option<JustificationRef>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// resolve the penalty terms for an installment's lease:
/// lease override first, tenant default rule second
pub fn resolve_terms(
    store: &mut BillingStore,
    tenant_id: TenantId,
    installment: &Installment,
    now: DateTime<Utc>,
) -> Result<PenaltyTerms> {
    let lease = store.lease(tenant_id, installment.lease_id)?;
    match &lease.penalty_terms {
        Some(terms) => Ok(terms.clone()),
        None => Ok(store.penalty_rule_or_default(tenant_id, now).terms.clone()),
    }
}

/// compute the penalty amount for an installment under the given terms
///
/// The balance used for PercentOfBalance and for the minimum-balance
/// suppression check is rent + service + other fees - amount paid,
/// excluding any previously applied penalty.
pub fn compute_amount(terms: &PenaltyTerms, installment: &Installment) -> Money {
    let balance = installment.balance_before_penalty();

    if let Some(min_balance) = terms.min_balance {
        if balance < min_balance {
            return Money::ZERO;
        }
    }

    let raw = match terms.mode {
        PenaltyMode::FixedAmount => terms.fixed_amount.unwrap_or(Money::ZERO),
        PenaltyMode::PercentOfRent => installment
            .rent_amount
            .apply_rate(terms.rate.unwrap_or(Rate::ZERO)),
        PenaltyMode::PercentOfBalance => balance.apply_rate(terms.rate.unwrap_or(Rate::ZERO)),
    };

    match terms.cap_amount {
        Some(cap) => raw.min(cap),
        None => raw,
    }
}

/// calculate (or recalculate in place) the penalty for an overdue installment
///
/// Fails with `NotOverdue` until `today > due_date + grace_days`. A record
/// carrying the manual-override flag is returned untouched. The
/// installment's penalty amount and status are refreshed in the same call.
pub fn calculate(
    store: &mut BillingStore,
    tenant_id: TenantId,
    installment_id: InstallmentId,
    actor: &str,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Penalty> {
    let installment = store.installment(tenant_id, installment_id)?.clone();
    if installment.status == InstallmentStatus::Canceled {
        return Err(BillingError::InstallmentNotBillable {
            installment_id,
            status: installment.status,
        });
    }

    let terms = resolve_terms(store, tenant_id, &installment, now)?;

    let grace_end = installment
        .due_date
        .checked_add_days(Days::new(terms.grace_days as u64))
        .ok_or_else(|| BillingError::InvalidDate {
            message: "grace window overflow".to_string(),
        })?;
    if today <= grace_end {
        return Err(BillingError::NotOverdue {
            installment_id,
            due_date: installment.due_date,
            grace_days: terms.grace_days,
        });
    }

    let days_late = (today - installment.due_date).num_days().max(0) as u32;
    let amount = compute_amount(&terms, &installment);

    let penalty = match store.current_penalty(installment_id) {
        Some(existing) if existing.manual_override => existing.clone(),
        Some(existing) => {
            let id = existing.id;
            let record = store.penalty_mut(tenant_id, id)?;
            record.days_late = days_late;
            record.mode = terms.mode;
            record.rate = terms.rate;
            record.fixed_amount = terms.fixed_amount;
            record.amount = amount;
            record.updated_at = now;
            record.clone()
        }
        None => {
            let record = Penalty {
                id: Uuid::new_v4(),
                tenant_id,
                installment_id,
                days_late,
                mode: terms.mode,
                rate: terms.rate,
                fixed_amount: terms.fixed_amount,
                amount,
                manual_override: false,
                override_reason: None,
                justification: None,
                created_by: actor.to_string(),
                created_at: now,
                updated_at: now,
            };
            store.insert_penalty(record.clone());
            record
        }
    };

    refresh_installment(store, tenant_id, installment_id, today, now)?;
    Ok(penalty)
}

/// manually override an installment's penalty with a justified amount
///
/// Overrides are sticky: subsequent automatic recalculation skips the
/// record until the override is deleted.
pub fn override_amount(
    store: &mut BillingStore,
    tenant_id: TenantId,
    installment_id: InstallmentId,
    amount: Money,
    reason: &str,
    actor: &str,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Penalty> {
    if amount.is_negative() {
        return Err(BillingError::InvalidAmount { amount });
    }
    if reason.trim().is_empty() {
        return Err(BillingError::OverrideReasonRequired);
    }

    let installment = store.installment(tenant_id, installment_id)?.clone();
    let terms = resolve_terms(store, tenant_id, &installment, now)?;
    let days_late = (today - installment.due_date).num_days().max(0) as u32;

    let penalty = match store.current_penalty(installment_id) {
        Some(existing) => {
            let id = existing.id;
            let record = store.penalty_mut(tenant_id, id)?;
            record.amount = amount;
            record.days_late = days_late;
            record.manual_override = true;
            record.override_reason = Some(reason.to_string());
            record.updated_at = now;
            record.clone()
        }
        None => {
            let record = Penalty {
                id: Uuid::new_v4(),
                tenant_id,
                installment_id,
                days_late,
                mode: terms.mode,
                rate: terms.rate,
                fixed_amount: terms.fixed_amount,
                amount,
                manual_override: true,
                override_reason: Some(reason.to_string()),
                justification: None,
                created_by: actor.to_string(),
                created_at: now,
                updated_at: now,
            };
            store.insert_penalty(record.clone());
            record
        }
    };

    refresh_installment(store, tenant_id, installment_id, today, now)?;
    Ok(penalty)
}

/// delete a penalty record and re-derive the installment's totals
pub fn delete(
    store: &mut BillingStore,
    tenant_id: TenantId,
    penalty_id: PenaltyId,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Penalty> {
    let removed = store.remove_penalty(tenant_id, penalty_id)?;
    refresh_installment(store, tenant_id, removed.installment_id, today, now)?;
    Ok(removed)
}

/// attach (or replace) the justification document reference on a penalty
///
/// Only the reference changes; the override amount is never touched.
pub fn attach_justification(
    store: &mut BillingStore,
    tenant_id: TenantId,
    penalty_id: PenaltyId,
    justification: JustificationRef,
    now: DateTime<Utc>,
) -> Result<Penalty> {
    let record = store.penalty_mut(tenant_id, penalty_id)?;
    record.justification = Some(justification);
    record.updated_at = now;
    Ok(record.clone())
}

/// sync the installment's penalty amount and status with its penalty records
fn refresh_installment(
    store: &mut BillingStore,
    tenant_id: TenantId,
    installment_id: InstallmentId,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<()> {
    let total = store.penalty_total_for_installment(installment_id);
    let installment = store.installment_mut(tenant_id, installment_id)?;
    installment.penalty_amount = total;
    installment.status = installment.derived_status(today);
    installment.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::Lease;
    use crate::types::{BillingFrequency, LeaseStatus};
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    fn seed(terms: Option<PenaltyTerms>) -> (BillingStore, TenantId, InstallmentId) {
        let mut store = BillingStore::new();
        let tenant_id = Uuid::new_v4();
        let lease = Lease {
            id: Uuid::new_v4(),
            tenant_id,
            lease_number: "L-001".to_string(),
            property_id: Uuid::new_v4(),
            renter_id: Uuid::new_v4(),
            owner_id: None,
            start_date: date(2026, 1, 1),
            end_date: Some(date(2026, 12, 31)),
            move_in_date: None,
            move_out_date: None,
            frequency: BillingFrequency::Monthly,
            due_day: 5,
            currency: "XOF".to_string(),
            rent_amount: Money::from_major(100_000),
            service_charge_amount: Money::ZERO,
            deposit_amount: Money::ZERO,
            penalty_terms: terms,
            status: LeaseStatus::Active,
            ended_at: None,
            created_at: now(),
            updated_at: now(),
        };
        let lease_id = lease.id;
        store.insert_lease(lease).unwrap();

        let installment = Installment {
            id: Uuid::new_v4(),
            tenant_id,
            lease_id,
            period_year: 2026,
            period_month: 2,
            due_date: date(2026, 2, 5),
            currency: "XOF".to_string(),
            rent_amount: Money::from_major(100_000),
            service_amount: Money::ZERO,
            other_fees_amount: Money::ZERO,
            penalty_amount: Money::ZERO,
            amount_paid: Money::ZERO,
            status: InstallmentStatus::Overdue,
            paid_at: None,
            created_at: now(),
            updated_at: now(),
        };
        let installment_id = installment.id;
        store.insert_installment(installment).unwrap();

        (store, tenant_id, installment_id)
    }

    fn percent_of_balance(rate: u32) -> PenaltyTerms {
        PenaltyTerms {
            grace_days: 0,
            mode: PenaltyMode::PercentOfBalance,
            rate: Some(Rate::from_percentage(rate)),
            fixed_amount: None,
            cap_amount: None,
            min_balance: None,
        }
    }

    #[test]
    fn test_not_overdue_within_grace() {
        let mut terms = percent_of_balance(2);
        terms.grace_days = 15;
        let (mut store, tenant, installment) = seed(Some(terms));

        // due 2026-02-05, grace 15 days: 2026-02-20 still inside
        let err = calculate(&mut store, tenant, installment, "t", date(2026, 2, 20), now())
            .unwrap_err();
        assert!(matches!(err, BillingError::NotOverdue { grace_days: 15, .. }));

        // the day after the grace boundary is penalizable
        let penalty =
            calculate(&mut store, tenant, installment, "t", date(2026, 2, 21), now()).unwrap();
        assert_eq!(penalty.days_late, 16);
        assert_eq!(penalty.amount, Money::from_major(2_000));
    }

    #[test]
    fn test_fixed_amount_mode() {
        let terms = PenaltyTerms {
            grace_days: 0,
            mode: PenaltyMode::FixedAmount,
            rate: None,
            fixed_amount: Some(Money::from_major(5_000)),
            cap_amount: None,
            min_balance: None,
        };
        let (mut store, tenant, installment) = seed(Some(terms));

        let penalty =
            calculate(&mut store, tenant, installment, "t", date(2026, 2, 10), now()).unwrap();
        assert_eq!(penalty.amount, Money::from_major(5_000));
    }

    #[test]
    fn test_percent_of_rent_mode() {
        let terms = PenaltyTerms {
            grace_days: 0,
            mode: PenaltyMode::PercentOfRent,
            rate: Some(Rate::from_percentage(10)),
            fixed_amount: None,
            cap_amount: None,
            min_balance: None,
        };
        let (mut store, tenant, installment) = seed(Some(terms));

        let penalty =
            calculate(&mut store, tenant, installment, "t", date(2026, 2, 10), now()).unwrap();
        assert_eq!(penalty.amount, Money::from_major(10_000));
    }

    #[test]
    fn test_cap_clamps_from_above() {
        let mut terms = percent_of_balance(50);
        terms.cap_amount = Some(Money::from_major(10_000));
        let (mut store, tenant, installment) = seed(Some(terms));

        // 50% of 100,000 would be 50,000; the cap clamps it to exactly 10,000
        let penalty =
            calculate(&mut store, tenant, installment, "t", date(2026, 2, 10), now()).unwrap();
        assert_eq!(penalty.amount, Money::from_major(10_000));
    }

    #[test]
    fn test_min_balance_suppresses_penalty() {
        let mut terms = percent_of_balance(2);
        terms.min_balance = Some(Money::from_major(200_000));
        let (mut store, tenant, installment) = seed(Some(terms));

        let penalty =
            calculate(&mut store, tenant, installment, "t", date(2026, 2, 10), now()).unwrap();
        assert_eq!(penalty.amount, Money::ZERO);
    }

    #[test]
    fn test_recalculation_updates_in_place() {
        let (mut store, tenant, installment) = seed(Some(percent_of_balance(2)));

        let first =
            calculate(&mut store, tenant, installment, "t", date(2026, 2, 10), now()).unwrap();
        let second =
            calculate(&mut store, tenant, installment, "t", date(2026, 2, 20), now()).unwrap();

        // same record, refreshed days-late
        assert_eq!(first.id, second.id);
        assert_eq!(second.days_late, 15);
        assert_eq!(store.penalties_for_installment(installment).len(), 1);
    }

    #[test]
    fn test_manual_override_is_sticky() {
        let (mut store, tenant, installment) = seed(Some(percent_of_balance(2)));

        let overridden = override_amount(
            &mut store,
            tenant,
            installment,
            Money::from_major(500),
            "negotiated with renter",
            "manager",
            date(2026, 2, 10),
            now(),
        )
        .unwrap();
        assert!(overridden.manual_override);

        // automatic recalculation skips the overridden record
        let after =
            calculate(&mut store, tenant, installment, "t", date(2026, 2, 25), now()).unwrap();
        assert_eq!(after.id, overridden.id);
        assert_eq!(after.amount, Money::from_major(500));

        let stored = store.installment(tenant, installment).unwrap();
        assert_eq!(stored.penalty_amount, Money::from_major(500));
    }

    #[test]
    fn test_override_requires_reason() {
        let (mut store, tenant, installment) = seed(Some(percent_of_balance(2)));

        let err = override_amount(
            &mut store,
            tenant,
            installment,
            Money::from_major(500),
            "   ",
            "manager",
            date(2026, 2, 10),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, BillingError::OverrideReasonRequired));
    }

    #[test]
    fn test_calculate_syncs_installment() {
        let (mut store, tenant, installment) = seed(Some(percent_of_balance(2)));

        calculate(&mut store, tenant, installment, "t", date(2026, 2, 10), now()).unwrap();

        let stored = store.installment(tenant, installment).unwrap();
        assert_eq!(stored.penalty_amount, Money::from_major(2_000));
        assert_eq!(stored.total_due(), Money::from_major(102_000));
        assert_eq!(stored.status, InstallmentStatus::Overdue);
    }

    #[test]
    fn test_delete_recomputes_installment() {
        let (mut store, tenant, installment) = seed(Some(percent_of_balance(2)));

        let penalty =
            calculate(&mut store, tenant, installment, "t", date(2026, 2, 10), now()).unwrap();
        delete(&mut store, tenant, penalty.id, date(2026, 2, 10), now()).unwrap();

        let stored = store.installment(tenant, installment).unwrap();
        assert_eq!(stored.penalty_amount, Money::ZERO);
        assert!(store.penalties_for_installment(installment).is_empty());
    }

    #[test]
    fn test_justification_replaces_without_touching_amount() {
        let (mut store, tenant, installment) = seed(Some(percent_of_balance(2)));

        let penalty = override_amount(
            &mut store,
            tenant,
            installment,
            Money::from_major(500),
            "damage settlement",
            "manager",
            date(2026, 2, 10),
            now(),
        )
        .unwrap();

        let first = JustificationRef {
            file_name: "settlement.pdf".to_string(),
            url: "https://files.example/settlement.pdf".to_string(),
            uploaded_by: "manager".to_string(),
            uploaded_at: now(),
        };
        attach_justification(&mut store, tenant, penalty.id, first, now()).unwrap();

        let second = JustificationRef {
            file_name: "settlement-v2.pdf".to_string(),
            url: "https://files.example/settlement-v2.pdf".to_string(),
            uploaded_by: "manager".to_string(),
            uploaded_at: now(),
        };
        let updated =
            attach_justification(&mut store, tenant, penalty.id, second.clone(), now()).unwrap();

        assert_eq!(updated.justification, Some(second));
        assert_eq!(updated.amount, Money::from_major(500));
    }

    #[test]
    fn test_tenant_default_rule_lazily_created() {
        // no lease-level terms: 0 grace days, 2% of balance
        let (mut store, tenant, installment) = seed(None);

        let penalty =
            calculate(&mut store, tenant, installment, "t", date(2026, 2, 10), now()).unwrap();
        assert_eq!(penalty.mode, PenaltyMode::PercentOfBalance);
        assert_eq!(penalty.amount, Money::from_major(2_000));
    }
}
