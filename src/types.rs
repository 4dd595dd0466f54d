use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// unique identifier for an agency tenant
pub type TenantId = Uuid;
/// unique identifier for a lease
pub type LeaseId = Uuid;
/// unique identifier for an installment
pub type InstallmentId = Uuid;
/// unique identifier for a payment
pub type PaymentId = Uuid;
/// unique identifier for a payment allocation
pub type AllocationId = Uuid;
/// unique identifier for a penalty record
pub type PenaltyId = Uuid;
/// unique identifier for a security deposit
pub type DepositId = Uuid;
/// unique identifier for a deposit movement
pub type MovementId = Uuid;

/// billing frequency for a lease
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingFrequency {
    Monthly,
    Quarterly,
    Semiannual,
    Annual,
}

impl BillingFrequency {
    /// calendar months covered by one billing period
    pub fn months_per_period(&self) -> u32 {
        match self {
            BillingFrequency::Monthly => 1,
            BillingFrequency::Quarterly => 3,
            BillingFrequency::Semiannual => 6,
            BillingFrequency::Annual => 12,
        }
    }
}

/// lease lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseStatus {
    /// created but not yet in force
    Draft,
    /// in force and billable
    Active,
    /// temporarily paused
    Suspended,
    /// ran to completion
    Ended,
    /// terminated before taking effect or mid-term
    Canceled,
}

impl LeaseStatus {
    /// terminal statuses are absorbing
    pub fn is_terminal(&self) -> bool {
        matches!(self, LeaseStatus::Ended | LeaseStatus::Canceled)
    }

    /// fixed lifecycle transition table
    pub fn can_transition_to(&self, next: LeaseStatus) -> bool {
        use LeaseStatus::*;
        matches!(
            (self, next),
            (Draft, Active)
                | (Draft, Canceled)
                | (Active, Suspended)
                | (Active, Ended)
                | (Active, Canceled)
                | (Suspended, Active)
                | (Suspended, Ended)
                | (Suspended, Canceled)
        )
    }
}

/// installment status, derived from (today, due date, total due, amount paid)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentStatus {
    /// freshly generated, not yet billed
    Draft,
    /// awaiting payment, due date not passed
    Due,
    /// partially paid
    Partial,
    /// fully paid
    Paid,
    /// past due date and not fully paid
    Overdue,
    /// excluded from billing
    Canceled,
}

/// payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Canceled,
    Refunded,
    PartiallyRefunded,
}

/// how a payment was received
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    MobileMoney,
    Check,
    Card,
}

/// mobile-money details carried on a payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileMoneyDetails {
    pub operator: String,
    pub phone: String,
}

/// penalty calculation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PenaltyMode {
    /// flat configured amount, independent of balance
    FixedAmount,
    /// rent amount times rate
    PercentOfRent,
    /// outstanding balance (excluding penalty) times rate
    PercentOfBalance,
}

/// security-deposit ledger movement type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositMovementType {
    /// single-shot collection of the target amount
    Collect,
    /// earmark part of the balance
    Hold,
    /// release an earmark
    Release,
    /// return funds to the renter
    Refund,
    /// retain funds against damages or arrears
    Forfeit,
    /// signed correction of the collected balance
    Adjustment,
}

/// structured reference to an uploaded justification document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JustificationRef {
    pub file_name: String,
    pub url: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

/// explicit filter for installment queries; every field independently optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallmentFilter {
    pub lease_id: Option<LeaseId>,
    pub status: Option<InstallmentStatus>,
    pub period_year: Option<i32>,
    pub period_month: Option<u32>,
    pub overdue_only: bool,
}

/// explicit filter for payment queries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentFilter {
    pub lease_id: Option<LeaseId>,
    pub renter_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
    pub method: Option<PaymentMethod>,
}
