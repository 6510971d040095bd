use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::{ProcessError, ProcessOutput, WorkItem};

/// Performs one processing attempt for a queued message.
#[async_trait::async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, item: &WorkItem) -> Result<ProcessOutput, ProcessError>;
}

/// Stand-in for a real backend: waits, then fails for a reproducible fraction of attempts.
#[derive(Debug, Clone)]
pub struct SimulatedProcessor {
    delay: Duration,
    failure_rate: f64,
}

impl SimulatedProcessor {
    pub fn new(delay: Duration, failure_rate: f64) -> Self {
        Self {
            delay,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    /// Same item and attempt always give the same answer.
    pub fn should_fail(&self, item: &WorkItem) -> bool {
        if self.failure_rate <= 0.0 {
            return false;
        }
        if self.failure_rate >= 1.0 {
            return true;
        }
        let mut hasher = Sha256::new();
        hasher.update(item.id.to_le_bytes());
        hasher.update(item.retries.to_le_bytes());
        hasher.update(item.content.as_bytes());
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let roll = u64::from_le_bytes(head) as f64 / u64::MAX as f64;
        roll < self.failure_rate
    }
}

impl Default for SimulatedProcessor {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 0.1)
    }
}

#[async_trait::async_trait]
impl Processor for SimulatedProcessor {
    async fn process(&self, item: &WorkItem) -> Result<ProcessOutput, ProcessError> {
        tokio::time::sleep(self.delay).await;
        if self.should_fail(item) {
            return Err(ProcessError::Simulated);
        }
        Ok(ProcessOutput {
            reply: Some(format!("processed: {}", item.content)),
        })
    }
}
