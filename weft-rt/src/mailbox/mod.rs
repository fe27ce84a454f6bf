//! Bounded actor mailboxes with close signalling and backpressure.
//!
//! Every actor owns exactly one mailbox: a bounded multi-producer
//! single-consumer FIFO. Senders block (or fail fast via `try_send`) when
//! the mailbox is full; `close()` is idempotent and wakes both senders and
//! the receiver, which drains buffered envelopes before reporting closed.

pub mod bounded;
pub mod error;

pub use bounded::{mailbox, Mailbox, MailboxCounters, MailboxSender, DEFAULT_MAILBOX_CAPACITY};
pub use error::MailboxError;
