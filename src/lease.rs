use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{BillingError, Result};
use crate::types::{BillingFrequency, LeaseId, LeaseStatus, PenaltyMode, TenantId};

/// penalty terms, configured per lease or per tenant default rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyTerms {
    /// days after the due date during which no penalty accrues
    pub grace_days: u32,
    pub mode: PenaltyMode,
    /// rate for the percentage modes
    pub rate: Option<Rate>,
    /// amount for the fixed mode
    pub fixed_amount: Option<Money>,
    /// clamps the computed penalty from above
    pub cap_amount: Option<Money>,
    /// suppresses the penalty when the outstanding balance is below it
    pub min_balance: Option<Money>,
}

impl PenaltyTerms {
    /// documented tenant default: no grace, 2% of outstanding balance
    pub fn tenant_default() -> Self {
        Self {
            grace_days: 0,
            mode: PenaltyMode::PercentOfBalance,
            rate: Some(Rate::from_percentage(2)),
            fixed_amount: None,
            cap_amount: None,
            min_balance: None,
        }
    }
}

/// tenant-level default penalty rule, lazily created on first use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyRule {
    pub tenant_id: TenantId,
    pub terms: PenaltyTerms,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl PenaltyRule {
    pub fn new_default(tenant_id: TenantId, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            terms: PenaltyTerms::tenant_default(),
            active: true,
            created_at: now,
        }
    }
}

/// rental lease: the commercial contract driving the billing schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub id: LeaseId,
    pub tenant_id: TenantId,
    /// unique per tenant
    pub lease_number: String,
    pub property_id: Uuid,
    pub renter_id: Uuid,
    pub owner_id: Option<Uuid>,

    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub move_in_date: Option<NaiveDate>,
    pub move_out_date: Option<NaiveDate>,

    pub frequency: BillingFrequency,
    /// due-day-of-month, clamped to the last valid day of short months
    pub due_day: u8,
    pub currency: String,
    pub rent_amount: Money,
    pub service_charge_amount: Money,
    pub deposit_amount: Money,
    /// lease-level override of the tenant default rule
    pub penalty_terms: Option<PenaltyTerms>,

    pub status: LeaseStatus,
    /// stamped when the lease reaches Ended
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lease {
    /// validate commercial terms before persisting
    pub fn validate(&self) -> Result<()> {
        if self.due_day < 1 || self.due_day > 31 {
            return Err(BillingError::InvalidDueDay {
                day: self.due_day,
            });
        }

        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(BillingError::InvalidDate {
                    message: format!("end date {} precedes start date {}", end, self.start_date),
                });
            }
        }

        if self.rent_amount.is_negative()
            || self.service_charge_amount.is_negative()
            || self.deposit_amount.is_negative()
        {
            return Err(BillingError::InvalidAmount {
                amount: self
                    .rent_amount
                    .min(self.service_charge_amount)
                    .min(self.deposit_amount),
            });
        }

        Ok(())
    }

    /// apply a lifecycle transition validated against the fixed table
    pub fn transition(&mut self, next: LeaseStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(BillingError::InvalidStatusTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        if next == LeaseStatus::Ended {
            self.ended_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_lease() -> Lease {
        Lease {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            lease_number: "L-2026-001".to_string(),
            property_id: Uuid::new_v4(),
            renter_id: Uuid::new_v4(),
            owner_id: None,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: Some(NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()),
            move_in_date: None,
            move_out_date: None,
            frequency: BillingFrequency::Monthly,
            due_day: 5,
            currency: "XOF".to_string(),
            rent_amount: Money::from_major(150_000),
            service_charge_amount: Money::from_major(10_000),
            deposit_amount: Money::from_major(300_000),
            penalty_terms: None,
            status: LeaseStatus::Draft,
            ended_at: None,
            created_at: Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_validate_due_day() {
        let mut lease = test_lease();
        lease.due_day = 0;
        assert!(lease.validate().is_err());
        lease.due_day = 32;
        assert!(lease.validate().is_err());
        lease.due_day = 31;
        assert!(lease.validate().is_ok());
    }

    #[test]
    fn test_validate_date_order() {
        let mut lease = test_lease();
        lease.end_date = Some(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert!(lease.validate().is_err());
    }

    #[test]
    fn test_transition_stamps_ended_at() {
        let mut lease = test_lease();
        let now = Utc::now();

        lease.transition(LeaseStatus::Active, now).unwrap();
        lease.transition(LeaseStatus::Ended, now).unwrap();
        assert_eq!(lease.ended_at, Some(now));

        // terminal states are absorbing
        assert!(lease.transition(LeaseStatus::Active, now).is_err());
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut lease = test_lease();
        let err = lease.transition(LeaseStatus::Suspended, Utc::now()).unwrap_err();
        assert!(matches!(err, BillingError::InvalidStatusTransition { .. }));
        assert_eq!(lease.status, LeaseStatus::Draft);
    }

    #[test]
    fn test_tenant_default_rule() {
        let terms = PenaltyTerms::tenant_default();
        assert_eq!(terms.grace_days, 0);
        assert_eq!(terms.mode, PenaltyMode::PercentOfBalance);
        assert_eq!(terms.rate, Some(Rate::from_percentage(2)));
    }
}
