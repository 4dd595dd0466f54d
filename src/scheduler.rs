use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};

use crate::errors::BillingError;
use crate::penalty::{self, Penalty};
use crate::store::BillingStore;
use crate::types::{InstallmentId, TenantId};

/// per-installment failure collected during a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepError {
    pub tenant_id: TenantId,
    pub installment_id: InstallmentId,
    pub message: String,
}

/// result of one penalty sweep run
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub processed: usize,
    pub errors: Vec<SweepError>,
    pub penalties: Vec<Penalty>,
}

/// daily penalty sweep over overdue installments
///
/// An injected service with no global state: the trigger mechanism (cron,
/// timer, manual endpoint) is the caller's concern. The sweep itself is a
/// pure function of the store, the clock, and an optional tenant scope.
#[derive(Debug, Default)]
pub struct PenaltySweep;

impl PenaltySweep {
    pub fn new() -> Self {
        Self
    }

    /// calculate penalties for every overdue installment, tenant by tenant
    ///
    /// Per-installment failures are collected, never raised: one malformed
    /// installment must not block the rest of the tenant base.
    /// Installments still inside their grace window are skipped silently.
    pub fn run(
        &self,
        store: &mut BillingStore,
        scope: Option<TenantId>,
        time_provider: &SafeTimeProvider,
    ) -> SweepOutcome {
        let now = time_provider.now();
        let today = now.date_naive();

        let mut outcome = SweepOutcome::default();
        for (tenant_id, installment_id) in store.overdue_installments(scope, today) {
            match penalty::calculate(store, tenant_id, installment_id, "scheduler", today, now) {
                Ok(penalty) => {
                    outcome.processed += 1;
                    outcome.penalties.push(penalty);
                }
                Err(BillingError::NotOverdue { .. }) => {
                    // overdue but within grace: nothing to apply yet
                    tracing::debug!(%installment_id, "sweep skipped installment within grace");
                }
                Err(err) => {
                    tracing::debug!(%installment_id, error = %err, "sweep item failed");
                    outcome.errors.push(SweepError {
                        tenant_id,
                        installment_id,
                        message: err.to_string(),
                    });
                }
            }
        }

        outcome
    }
}
