//! Scriptable delivery transport for tests.

use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::{DeliveryError, DeliveryResult};
use super::DeliveryTransport;

/// One call observed by the mock, with the wall time it arrived at.
#[derive(Debug, Clone)]
pub struct RecordedDelivery {
    pub at: Instant,
    pub body: Vec<u8>,
    pub signature: String,
    pub failed: bool,
}

#[derive(Default)]
struct MockInner {
    deliveries: Vec<RecordedDelivery>,
    fail_remaining: u32,
}

/// Records every delivery attempt; failures injectable.
#[derive(Default)]
pub struct MockDeliveryTransport {
    inner: Mutex<MockInner>,
}

impl MockDeliveryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` deliveries fail with a 503 (`u32::MAX` = always fail).
    pub fn fail_next(&self, n: u32) {
        self.inner.lock().fail_remaining = n;
    }

    pub fn deliveries(&self) -> Vec<RecordedDelivery> {
        self.inner.lock().deliveries.clone()
    }

    pub fn delivery_count(&self) -> usize {
        self.inner.lock().deliveries.len()
    }
}

#[async_trait]
impl DeliveryTransport for MockDeliveryTransport {
    async fn deliver(&self, body: &[u8], signature: &str) -> DeliveryResult<()> {
        let mut inner = self.inner.lock();
        let fail = inner.fail_remaining > 0;
        if fail && inner.fail_remaining != u32::MAX {
            inner.fail_remaining -= 1;
        }
        inner.deliveries.push(RecordedDelivery {
            at: Instant::now(),
            body: body.to_vec(),
            signature: signature.to_string(),
            failed: fail,
        });
        if fail {
            return Err(DeliveryError::Status(503));
        }
        Ok(())
    }
}
