use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::presentation::{BillingClient, BillingError};

/// Mock ledger client recording debits.
pub struct MockBillingClient {
    debits: Mutex<Vec<(String, String, String)>>,
    debit_count: AtomicUsize,
    reject_insufficient: Mutex<bool>,
}

impl MockBillingClient {
    pub fn new() -> Self {
        Self {
            debits: Mutex::new(Vec::new()),
            debit_count: AtomicUsize::new(0),
            reject_insufficient: Mutex::new(false),
        }
    }

    /// Make every subsequent debit fail with `InsufficientPoints`.
    pub fn reject_with_insufficient_points(&self) {
        *self.reject_insufficient.lock().unwrap() = true;
    }

    /// Number of successful debits recorded.
    pub fn debit_count(&self) -> usize {
        self.debit_count.load(Ordering::SeqCst)
    }

    /// All recorded debits as (user_id, presentation_id, job_id).
    pub fn debits(&self) -> Vec<(String, String, String)> {
        self.debits.lock().unwrap().clone()
    }
}

impl Default for MockBillingClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BillingClient for MockBillingClient {
    async fn debit_export(
        &self,
        user_id: &str,
        presentation_id: &str,
        job_id: &str,
    ) -> Result<(), BillingError> {
        if *self.reject_insufficient.lock().unwrap() {
            return Err(BillingError::InsufficientPoints(user_id.to_string()));
        }
        self.debits.lock().unwrap().push((
            user_id.to_string(),
            presentation_id.to_string(),
            job_id.to_string(),
        ));
        self.debit_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
