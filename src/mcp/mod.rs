pub mod catalog;
pub mod notifier;
pub mod protocol;
pub mod server;
