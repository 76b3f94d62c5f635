//! Payment statistics
//!
//! Summary figures over a member's payment requests.

use rust_decimal::Decimal;
use serde::Serialize;

use super::member::PaymentRequest;

/// Number of requests listed under `recent_payments`
const RECENT_PAYMENTS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentMethodCounts {
    pub cash: usize,
    pub bank_transfer: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentStats {
    pub total_payments: usize,
    pub total_amount: Decimal,
    pub pending_payments: usize,
    pub approved_payments: usize,
    pub payment_methods: PaymentMethodCounts,
    pub recent_payments: Vec<PaymentRequest>,
}

impl PaymentStats {
    /// Summarize payment requests. Requests without an amount count as zero.
    pub fn calculate(payments: &[PaymentRequest]) -> Self {
        let count_status = |status: &str| {
            payments
                .iter()
                .filter(|p| p.status.as_deref() == Some(status))
                .count()
        };
        let count_method = |method: &str| {
            payments
                .iter()
                .filter(|p| p.payment_method.as_deref() == Some(method))
                .count()
        };

        let mut recent: Vec<PaymentRequest> = payments.to_vec();
        // Newest first; undated requests sink to the end
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(RECENT_PAYMENTS);

        Self {
            total_payments: payments.len(),
            total_amount: payments.iter().filter_map(|p| p.amount).sum(),
            pending_payments: count_status("pending"),
            approved_payments: count_status("approved"),
            payment_methods: PaymentMethodCounts {
                cash: count_method("cash"),
                bank_transfer: count_method("bank_transfer"),
            },
            recent_payments: recent,
        }
    }
}
