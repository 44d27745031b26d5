use crate::services::ports::{MailError, MailTransport, OutgoingEmail};
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::Mutex;

/// Keeps sent emails in memory. Recipients registered with `reject` fail with a transport error.
#[derive(Debug, Default)]
pub struct MemoryMailTransport {
    sent: Mutex<Vec<OutgoingEmail>>,
    rejected: Mutex<HashSet<String>>,
}

impl MemoryMailTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reject(&self, address: &str) {
        self.rejected.lock().await.insert(address.to_string());
    }

    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MailTransport for MemoryMailTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        if self.rejected.lock().await.contains(&email.to) {
            return Err(MailError::Transport(format!("550 mailbox unavailable: {}", email.to)));
        }
        self.sent.lock().await.push(email.clone());
        Ok(())
    }

    async fn check(&self) -> Result<(), MailError> {
        Ok(())
    }
}
