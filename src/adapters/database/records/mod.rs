pub mod client;
pub mod delivery_log;
pub mod message;
pub mod newsletter;
pub mod schedule;

pub use client::ClientRecord;
pub use delivery_log::DeliveryLogRecord;
pub use message::MessageRecord;
pub use newsletter::NewsletterRecord;
pub use schedule::{CrontabScheduleRecord, PeriodicTaskRecord, ScheduledTaskRecord};
