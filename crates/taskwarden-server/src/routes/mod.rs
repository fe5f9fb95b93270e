pub mod health;
pub mod triggers;
pub mod webhooks;
