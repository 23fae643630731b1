//! In-memory adapters for the storage and payout ports. Every operation that
//! the Postgres adapters make atomic (CAS status writes, unread increments,
//! review uniqueness) runs under a single write-lock scope here, so the
//! concurrency contracts hold and can be exercised without a database.

pub mod conversations;
pub mod deals;
pub mod events;
pub mod payouts;
pub mod profiles;
pub mod reviews;

pub use conversations::InMemoryConversations;
pub use deals::InMemoryDeals;
pub use events::InMemoryEvents;
pub use payouts::{FailingPayouts, LedgerPayouts};
pub use profiles::InMemoryProfiles;
pub use reviews::InMemoryReviews;
