//! Pending mailbox: durable FIFO of user messages awaiting a consumer.

#[allow(clippy::module_inception)]
mod mailbox;
mod store;

pub use mailbox::PendingMailbox;
pub use store::{FileStore, MailboxStore, MemoryStore};
