pub mod health;
pub mod newsletter;
