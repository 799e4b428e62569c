//! In-memory seat-hold cache: who is holding which seat, and for how long.
//!
//! [`SeatCacheService`] is the only entry point that mutates state. The hold
//! table is authoritative; the connection index is a reverse lookup that is
//! reconciled against it whenever it is read.

pub mod index;
pub mod key;
pub mod service;
pub mod table;

pub use index::{ConnectionIndex, IndexedHold};
pub use key::{GroupKey, SeatKey};
pub use service::{CurrentSeatView, SeatCacheService, SelectionOutcome};
pub use table::{HoldEnd, HoldExpiry, HoldListener, SeatHold, SeatHoldTable};
