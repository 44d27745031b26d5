//! In-process storage implementing every repository port. Used by tests and local dry runs.

use crate::domain::client::{Client, NewClient};
use crate::domain::delivery_log::{DeliveryLog, NewDeliveryLog};
use crate::domain::message::{Message, NewMessage};
use crate::domain::newsletter::{NewNewsletter, Newsletter, NewsletterStatus};
use crate::domain::schedule::{CrontabSchedule, PeriodicTask, RecurrenceSpec, ScheduledTask};
use crate::error::{AppError, Result};
use crate::services::ports::{
    ClientRepository, DeliveryLogRepository, MessageRepository, NewsletterRepository, PeriodicTaskRegistry,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use time::OffsetDateTime;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    newsletters: BTreeMap<i64, Newsletter>,
    newsletter_clients: BTreeMap<i64, BTreeSet<i64>>,
    newsletter_messages: BTreeMap<i64, BTreeSet<i64>>,
    clients: BTreeMap<i64, Client>,
    messages: BTreeMap<i64, Message>,
    logs: Vec<DeliveryLog>,
    schedules: Vec<CrontabSchedule>,
    tasks: BTreeMap<i64, PeriodicTask>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored crontab schedules.
    pub async fn schedule_count(&self) -> usize {
        self.state.lock().await.schedules.len()
    }

    /// Every log row, oldest first.
    pub async fn all_logs(&self) -> Vec<DeliveryLog> {
        self.state.lock().await.logs.clone()
    }
}

#[async_trait]
impl NewsletterRepository for MemoryStore {
    async fn create(&self, newsletter: NewNewsletter) -> Result<Newsletter> {
        let mut state = self.state.lock().await;

        let links_exist = newsletter.client_ids.iter().all(|id| state.clients.contains_key(id))
            && newsletter.message_ids.iter().all(|id| state.messages.contains_key(id));
        if !links_exist {
            return Err(AppError::NotFound);
        }

        let id = state.next_id();
        let created = Newsletter {
            id,
            frequency: newsletter.frequency,
            time: newsletter.time,
            created_at: OffsetDateTime::now_utc(),
            finish_date: newsletter.finish_date,
            finish_time: newsletter.finish_time,
            status: NewsletterStatus::Created,
            is_active: true,
        };
        state.newsletters.insert(id, created.clone());
        state.newsletter_clients.insert(id, newsletter.client_ids.into_iter().collect());
        state.newsletter_messages.insert(id, newsletter.message_ids.into_iter().collect());
        Ok(created)
    }

    async fn get(&self, id: i64) -> Result<Option<Newsletter>> {
        Ok(self.state.lock().await.newsletters.get(&id).cloned())
    }

    async fn update_status(&self, id: i64, status: NewsletterStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        let newsletter = state.newsletters.get_mut(&id).ok_or(AppError::NotFound)?;
        newsletter.status = status;
        Ok(())
    }

    async fn set_active(&self, id: i64, is_active: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let newsletter = state.newsletters.get_mut(&id).ok_or(AppError::NotFound)?;
        newsletter.is_active = is_active;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.newsletters.remove(&id).ok_or(AppError::NotFound)?;
        state.newsletter_clients.remove(&id);
        state.newsletter_messages.remove(&id);
        state.logs.retain(|log| log.newsletter_id != id);
        Ok(())
    }
}

#[async_trait]
impl ClientRepository for MemoryStore {
    async fn create(&self, client: NewClient) -> Result<Client> {
        let mut state = self.state.lock().await;
        if state.clients.values().any(|c| c.email == client.email) {
            return Err(AppError::Conflict(format!("client {} already exists", client.email)));
        }

        let id = state.next_id();
        let created = Client {
            id,
            email: client.email,
            first_name: client.first_name,
            last_name: client.last_name,
            middle_name: client.middle_name,
            comment: client.comment,
            is_active: true,
        };
        state.clients.insert(id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: i64) -> Result<Option<Client>> {
        Ok(self.state.lock().await.clients.get(&id).cloned())
    }

    async fn list_for_newsletter(&self, newsletter_id: i64) -> Result<Vec<Client>> {
        let state = self.state.lock().await;
        Ok(state
            .newsletter_clients
            .get(&newsletter_id)
            .map(|ids| ids.iter().filter_map(|id| state.clients.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    async fn set_active(&self, id: i64, is_active: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let client = state.clients.get_mut(&id).ok_or(AppError::NotFound)?;
        client.is_active = is_active;
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn create(&self, message: NewMessage) -> Result<Message> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let created = Message { id, subject: message.subject, body: message.body };
        state.messages.insert(id, created.clone());
        Ok(created)
    }

    async fn list_for_newsletter(&self, newsletter_id: i64) -> Result<Vec<Message>> {
        let state = self.state.lock().await;
        Ok(state
            .newsletter_messages
            .get(&newsletter_id)
            .map(|ids| ids.iter().filter_map(|id| state.messages.get(id).cloned()).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl DeliveryLogRepository for MemoryStore {
    async fn append(&self, entry: NewDeliveryLog) -> Result<bool> {
        let mut state = self.state.lock().await;
        let duplicate = state.logs.iter().any(|log| {
            log.newsletter_id == entry.newsletter_id
                && log.message_id == entry.message_id
                && log.client_id == entry.client_id
                && log.fire_at == entry.fire_at
        });
        if duplicate {
            return Ok(false);
        }

        let id = state.next_id();
        state.logs.push(DeliveryLog {
            id,
            newsletter_id: entry.newsletter_id,
            message_id: entry.message_id,
            client_id: entry.client_id,
            status: entry.status,
            server_response: entry.server_response,
            fire_at: entry.fire_at,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(true)
    }

    async fn recorded_pairs(&self, newsletter_id: i64, fire_at: OffsetDateTime) -> Result<HashSet<(i64, i64)>> {
        Ok(self
            .state
            .lock()
            .await
            .logs
            .iter()
            .filter(|log| log.newsletter_id == newsletter_id && log.fire_at == fire_at)
            .map(|log| (log.message_id, log.client_id))
            .collect())
    }

    async fn list_for_newsletter(&self, newsletter_id: i64, limit: i64) -> Result<Vec<DeliveryLog>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .state
            .lock()
            .await
            .logs
            .iter()
            .rev()
            .filter(|log| log.newsletter_id == newsletter_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PeriodicTaskRegistry for MemoryStore {
    async fn schedule_or_get(&self, spec: RecurrenceSpec) -> Result<CrontabSchedule> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.schedules.iter().find(|s| s.spec == spec) {
            return Ok(existing.clone());
        }

        let schedule = CrontabSchedule { id: state.next_id(), spec };
        state.schedules.push(schedule.clone());
        Ok(schedule)
    }

    async fn register(&self, name: &str, schedule_id: i64, newsletter_id: i64) -> Result<PeriodicTask> {
        let mut state = self.state.lock().await;
        if state.tasks.values().any(|t| t.name == name) {
            return Err(AppError::Conflict(format!("periodic task {name} already exists")));
        }

        let id = state.next_id();
        let task = PeriodicTask {
            id,
            name: name.to_string(),
            schedule_id,
            newsletter_id,
            last_run_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        state.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<PeriodicTask>> {
        Ok(self.state.lock().await.tasks.values().find(|t| t.name == name).cloned())
    }

    async fn find_by_newsletter(&self, newsletter_id: i64) -> Result<Option<PeriodicTask>> {
        Ok(self.state.lock().await.tasks.values().find(|t| t.newsletter_id == newsletter_id).cloned())
    }

    async fn delete(&self, task_id: i64) -> Result<()> {
        self.state.lock().await.tasks.remove(&task_id);
        Ok(())
    }

    async fn list_scheduled(&self) -> Result<Vec<ScheduledTask>> {
        let state = self.state.lock().await;
        state
            .tasks
            .values()
            .map(|task| {
                let schedule = state.schedules.iter().find(|s| s.id == task.schedule_id).ok_or(AppError::Internal)?;
                Ok(ScheduledTask { task: task.clone(), spec: schedule.spec })
            })
            .collect()
    }

    async fn claim_run(
        &self,
        task_id: i64,
        previous: Option<OffsetDateTime>,
        fired_at: OffsetDateTime,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(&task_id) {
            Some(task) if task.last_run_at == previous => {
                task.last_run_at = Some(fired_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_run(
        &self,
        task_id: i64,
        claimed: OffsetDateTime,
        previous: Option<OffsetDateTime>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(&task_id) {
            Some(task) if task.last_run_at == Some(claimed) => {
                task.last_run_at = previous;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schedule::CronField;

    fn daily_at(hour: u8) -> RecurrenceSpec {
        RecurrenceSpec {
            minute: 0,
            hour,
            day_of_week: CronField::Any,
            day_of_month: CronField::Any,
            month_of_year: CronField::Any,
        }
    }

    #[tokio::test]
    async fn test_schedule_or_get_deduplicates() {
        let store = MemoryStore::new();

        let first = store.schedule_or_get(daily_at(9)).await.unwrap();
        let second = store.schedule_or_get(daily_at(9)).await.unwrap();
        let other = store.schedule_or_get(daily_at(10)).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first.id, other.id);
        assert_eq!(store.schedule_count().await, 2);
    }

    #[tokio::test]
    async fn test_claim_run_is_compare_and_set() {
        let store = MemoryStore::new();
        let schedule = store.schedule_or_get(daily_at(9)).await.unwrap();
        let task = store.register("Newsletter #1", schedule.id, 1).await.unwrap();
        let fired = OffsetDateTime::now_utc();

        assert!(store.claim_run(task.id, None, fired).await.unwrap());
        assert!(!store.claim_run(task.id, None, fired).await.unwrap());
        assert!(store.claim_run(task.id, Some(fired), fired + time::Duration::DAY).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_run_restores_previous_firing() {
        let store = MemoryStore::new();
        let schedule = store.schedule_or_get(daily_at(9)).await.unwrap();
        let task = store.register("Newsletter #1", schedule.id, 1).await.unwrap();
        let fired = OffsetDateTime::now_utc();
        store.claim_run(task.id, None, fired).await.unwrap();

        assert!(!store.release_run(task.id, fired + time::Duration::DAY, None).await.unwrap());
        assert!(store.release_run(task.id, fired, None).await.unwrap());
        assert!(store.claim_run(task.id, None, fired).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_log_is_ignored() {
        let store = MemoryStore::new();
        let fire_at = OffsetDateTime::now_utc();

        assert!(store.append(NewDeliveryLog::delivered(1, 2, 3, fire_at)).await.unwrap());
        assert!(!store.append(NewDeliveryLog::failed(1, 2, 3, fire_at, "again")).await.unwrap());
        assert_eq!(store.all_logs().await.len(), 1);
    }
}
