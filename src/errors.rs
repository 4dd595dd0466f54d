use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{InstallmentStatus, LeaseStatus};

#[derive(Error, Debug)]
pub enum BillingError {
    // validation errors: rejected before any mutation
    #[error("invalid due day: {day} (must be 1-31)")]
    InvalidDueDay {
        day: u8,
    },

    #[error("invalid date: {message}")]
    InvalidDate {
        message: String,
    },

    #[error("invalid lease duration: no billing period fits between {start} and {end}")]
    InvalidLeaseDuration {
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("invalid amount: {amount}")]
    InvalidAmount {
        amount: Money,
    },

    #[error("missing required reference: {message}")]
    MissingReference {
        message: String,
    },

    #[error("override reason is required")]
    OverrideReasonRequired,

    #[error("currency mismatch: expected {expected}, got {provided}")]
    CurrencyMismatch {
        expected: String,
        provided: String,
    },

    // invariant violations: never partially applied
    #[error("duplicate lease number: {number}")]
    DuplicateLeaseNumber {
        number: String,
    },

    #[error("invalid lease status transition: {from:?} -> {to:?}")]
    InvalidStatusTransition {
        from: LeaseStatus,
        to: LeaseStatus,
    },

    #[error("lease is in terminal status {status:?}")]
    LeaseTerminal {
        status: LeaseStatus,
    },

    #[error("installments already generated for lease {lease_id}")]
    InstallmentsAlreadyGenerated {
        lease_id: Uuid,
    },

    #[error("installment already exists for lease {lease_id} period {year}-{month:02}")]
    DuplicateInstallmentPeriod {
        lease_id: Uuid,
        year: i32,
        month: u32,
    },

    #[error("duplicate idempotency key: {key}")]
    DuplicateIdempotencyKey {
        key: String,
    },

    #[error("installment deletion blocked: {allocated} installment(s) carry payment allocations")]
    DeleteBlockedByAllocations {
        allocated: usize,
    },

    #[error("installment deletion blocked: cooling-off until {until}")]
    CoolingOffActive {
        until: NaiveDate,
    },

    #[error("deposit already exists for lease {lease_id}")]
    DepositAlreadyExists {
        lease_id: Uuid,
    },

    #[error("deposit already collected for lease {lease_id}")]
    DepositAlreadyCollected {
        lease_id: Uuid,
    },

    #[error("collect amount must equal deposit target: target {target}, provided {provided}")]
    CollectAmountMismatch {
        target: Money,
        provided: Money,
    },

    #[error("insufficient deposit balance: available {available}, requested {requested}")]
    InsufficientDepositBalance {
        available: Money,
        requested: Money,
    },

    // not-yet-eligible: distinguished from invariant violations by message only
    #[error("installment {installment_id} is not overdue: due {due_date}, grace {grace_days} day(s)")]
    NotOverdue {
        installment_id: Uuid,
        due_date: NaiveDate,
        grace_days: u32,
    },

    #[error("payment {payment_id} is already fully allocated")]
    PaymentFullyAllocated {
        payment_id: Uuid,
    },

    #[error("no allocation possible: no requested installment has an outstanding balance")]
    NoAllocationPossible {
        payment_id: Uuid,
    },

    #[error("installment {installment_id} has status {status:?}")]
    InstallmentNotBillable {
        installment_id: Uuid,
        status: InstallmentStatus,
    },

    // not-found
    #[error("lease not found: {id}")]
    LeaseNotFound {
        id: Uuid,
    },

    #[error("installment not found: {id}")]
    InstallmentNotFound {
        id: Uuid,
    },

    #[error("payment not found: {id}")]
    PaymentNotFound {
        id: Uuid,
    },

    #[error("penalty not found: {id}")]
    PenaltyNotFound {
        id: Uuid,
    },

    #[error("security deposit not found for lease {lease_id}")]
    DepositNotFound {
        lease_id: Uuid,
    },
}

pub type Result<T> = std::result::Result<T, BillingError>;
