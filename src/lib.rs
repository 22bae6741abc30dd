//! # Smokers' Table
//!
//! The cigarette smokers problem solved with nothing but a shared,
//! tag-addressed message queue: no locks, no semaphores, no condition
//! variables in the protocol itself.
//!
//! One **seller** draws two distinct ingredients per round. Three
//! **smokers** each hold an endless stock of one ingredient and need the
//! other two. Smoker `i` holds ingredient `i`, so the seller's draw names its
//! target directly: the smoker holding the third ingredient.
//!
//! ## Protocol
//!
//! ```text
//! seller                                   smoker T
//! ------                                   --------
//! draw {a, b}, T = third(a, b)
//! send    DELIVER(T)  "a:b"                send    REQUEST(T)
//! recv    REQUEST(T)             <-------
//! send    GRANT(T)               ------->  recv    GRANT(T)
//!                                          recv    DELIVER(T)
//!                                          roll
//! recv    DONE(T)                <-------  send    DONE(T)
//! next round                               smoke, next round
//! ```
//!
//! Every receive is **selective** on an exact tag, so the seller waits for
//! the target's request specifically, and each smoker wakes only for its own
//! grant. Because the seller never draws again before the target's `DONE`,
//! at most one smoker is ever at the table.
//!
//! ## Transports
//!
//! - [`LocalMailbox`]: per-tag queues on the heap, for participants that are
//!   threads of one process.
//! - [`SysvMailbox`]: a System V message queue, for participants that are
//!   separate processes. `msgrcv` with a positive type gives selective
//!   receive natively.
//!
//! Destroying the mailbox is the only way to stop a participant from the
//! outside: every pending or later operation fails, and the participant's
//! loop returns a [`RoleError`].
//!
//! ## Modules
//!
//! - [`addressing`]: tags and target selection.
//! - [`ingredient`]: ingredients, smoker ids, the delivery payload codec.
//! - [`seller`] / [`smoker`]: the two role loops.
//! - [`config`]: pacing and run length.
//!
//! ## License
//!
//! Licensed under the terms of the **GNU Lesser General Public License**,
//! version 3.0, or (at your option) any later version.
//!
//! See <https://www.gnu.org/licenses/lgpl-3.0.html> for details.

#[cfg(not(unix))]
compile_error!("This crate only supports Unix-like operating systems.");

pub mod addressing;
pub mod config;
mod error;
pub mod ingredient;
mod local;
mod mailbox;
pub mod seller;
pub mod smoker;
mod sysv;

#[cfg(test)]
mod testing;

pub use addressing::{Phase, Tag, tag, target_smoker};
pub use config::{Pacing, RoleConfig};
pub use error::{AddressingError, ChannelError, PayloadError, RoleError};
pub use ingredient::{Ingredient, IngredientPair, SmokerId};
pub use local::{LocalMailbox, local_mailbox};
pub use mailbox::{Mailbox, Message, PAYLOAD_SIZE, Payload};
pub use seller::{RandomSupply, RoundOutcome, Seller, Supply, run_producer};
pub use smoker::{Smoker, run_consumer};
pub use sysv::SysvMailbox;
