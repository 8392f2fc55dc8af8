//! Mock Payment Provider
//!
//! For tests and local development. Mints fake hosted-checkout URLs and
//! remembers what it was asked for.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{PaymentProvider, ProviderSession, ProviderSessionRequest};
use crate::error::{PaymentError, Result};

/// Mock provider with an optional forced failure
pub struct MockPaymentProvider {
    requests: Mutex<Vec<ProviderSessionRequest>>,
    counter: AtomicU64,
    failing: AtomicBool,
}

impl Default for MockPaymentProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Make subsequent calls fail like a provider outage
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ProviderSessionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_session(&self, request: &ProviderSessionRequest) -> Result<ProviderSession> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PaymentError::Provider("mock provider unavailable".into()));
        }

        self.requests
            .lock()
            .map_err(|_| PaymentError::Provider("mock provider lock poisoned".into()))?
            .push(request.clone());

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = format!("cs_mock_{n:06}");

        Ok(ProviderSession {
            checkout_url: format!("https://pay.mock.test/checkout/{session_id}"),
            session_id,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
