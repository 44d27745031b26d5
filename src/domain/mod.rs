pub mod client;
pub mod delivery_log;
pub mod message;
pub mod newsletter;
pub mod schedule;
