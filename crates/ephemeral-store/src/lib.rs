//! TTL-bounded arena for ephemeral login records.
//!
//! This crate provides:
//! - `TtlStore`: a keyed arena whose entries become invisible at their expiry
//!   instant, with an explicit sweep that reclaims them
//! - Atomic single-use consumption for challenge and state tokens
//! - An injectable `Clock` so expiry is deterministic under test

mod clock;
mod error;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConsumeError, StoreError};
pub use store::{Consumable, TtlStore};
