use async_trait::async_trait;
use tracing::warn;

use super::{ConfirmationRequest, Confirmer};
use crate::error::Result;

/// Rejects every request that needs confirmation.
///
/// For unattended deployments where nobody can answer a prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectConfirmer;

#[async_trait]
impl Confirmer for RejectConfirmer {
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<bool> {
        warn!("Rejecting without prompt: {}", request.summary());
        Ok(false)
    }
}
