//! Scripted confirmer for tests and demos.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{ConfirmationRequest, Confirmer};
use crate::error::{Result, SqlGateError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Answers every request with a fixed decision and records what it was asked.
#[derive(Debug)]
pub struct MockConfirmer {
    approve: bool,
    delay: Option<Duration>,
    failures: Mutex<VecDeque<SqlGateError>>,
    requests: Mutex<Vec<ConfirmationRequest>>,
}

impl MockConfirmer {
    fn answering(approve: bool) -> Self {
        Self {
            approve,
            delay: None,
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn approving() -> Self {
        Self::answering(true)
    }

    pub fn rejecting() -> Self {
        Self::answering(false)
    }

    /// Waits this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes the next confirmation fail with the given error.
    pub fn fail_next(&self, error: SqlGateError) {
        lock(&self.failures).push_back(error);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ConfirmationRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl Confirmer for MockConfirmer {
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<bool> {
        lock(&self.requests).push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = lock(&self.failures).pop_front() {
            return Err(error);
        }
        Ok(self.approve)
    }
}
