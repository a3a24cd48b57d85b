//! Persistence for the two kinds of data timekeep keeps:
//!  - The program registry, a single json document listing what to track.
//!  - Time entries, stored through [entry_store::LocalEntryStore] as one
//!    newline-delimited json file per UTC day. An entry without an end
//!    timestamp is the one currently being timed and is always the last
//!    line of its file.

pub mod entities;
pub mod entry_store;
pub mod registry;
