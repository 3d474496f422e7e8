pub mod channel_sync;
pub mod coordinator;
pub mod notifier;
