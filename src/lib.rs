pub mod decimal;
pub mod deposit;
pub mod engine;
pub mod errors;
pub mod events;
pub mod installments;
pub mod lease;
pub mod payments;
pub mod penalty;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod types;

// re-export key types
pub use decimal::{Money, Rate};
pub use deposit::{DepositMovement, MovementRequest, SecurityDeposit};
pub use engine::{BillingEngine, LeaseTermsUpdate, NewLeaseRequest};
pub use errors::{BillingError, Result};
pub use events::{AuditAction, AuditEvent, AuditSink, AuditSinkError, AuditTrail};
pub use installments::Installment;
pub use lease::{Lease, PenaltyRule, PenaltyTerms};
pub use payments::{AllocationOutcome, NewPayment, Payment, PaymentAllocation};
pub use penalty::Penalty;
pub use schedule::{billing_periods, BillingPeriod};
pub use scheduler::{PenaltySweep, SweepError, SweepOutcome};
pub use store::{BillingStore, LeaseBalance};
pub use types::{
    BillingFrequency, DepositMovementType, InstallmentFilter, InstallmentId,
    InstallmentStatus, JustificationRef, LeaseId, LeaseStatus, MobileMoneyDetails,
    PaymentFilter, PaymentId, PaymentMethod, PaymentStatus, PenaltyId, PenaltyMode,
    TenantId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
