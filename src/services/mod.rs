pub mod delivery_service;
pub mod health_service;
pub mod newsletter_service;
pub mod ports;

use crate::services::ports::{
    ClientRepository, DeliveryLogRepository, MessageRepository, NewsletterRepository, PeriodicTaskRegistry,
};
use std::sync::Arc;

/// The storage ports shared by the services.
#[derive(Clone, Debug)]
pub struct Repositories {
    pub newsletters: Arc<dyn NewsletterRepository>,
    pub clients: Arc<dyn ClientRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub logs: Arc<dyn DeliveryLogRepository>,
    pub registry: Arc<dyn PeriodicTaskRegistry>,
}

impl Repositories {
    #[must_use]
    pub fn postgres(pool: &crate::adapters::database::DbPool) -> Self {
        use crate::adapters::database::{
            PgClientRepository, PgDeliveryLogRepository, PgMessageRepository, PgNewsletterRepository,
            PgPeriodicTaskRegistry,
        };

        Self {
            newsletters: Arc::new(PgNewsletterRepository::new(pool.clone())),
            clients: Arc::new(PgClientRepository::new(pool.clone())),
            messages: Arc::new(PgMessageRepository::new(pool.clone())),
            logs: Arc::new(PgDeliveryLogRepository::new(pool.clone())),
            registry: Arc::new(PgPeriodicTaskRegistry::new(pool.clone())),
        }
    }

    /// Every port backed by the same in-memory store.
    #[must_use]
    pub fn in_memory(store: &Arc<crate::adapters::memory::MemoryStore>) -> Self {
        Self {
            newsletters: Arc::clone(store) as Arc<dyn NewsletterRepository>,
            clients: Arc::clone(store) as Arc<dyn ClientRepository>,
            messages: Arc::clone(store) as Arc<dyn MessageRepository>,
            logs: Arc::clone(store) as Arc<dyn DeliveryLogRepository>,
            registry: Arc::clone(store) as Arc<dyn PeriodicTaskRegistry>,
        }
    }
}
