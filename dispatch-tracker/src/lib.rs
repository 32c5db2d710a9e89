//! Dispatch tracker: live view of the active emergency incidents of a facility.
//!
//! Poll cycle: `poller` -> `source` -> `selection` -> `overlay` -> `sync` -> `map`.
//! Everything that mutates lives in [`view::TrackerView`], shared as [`state::SharedView`].

pub mod config;
pub mod health;
pub mod http;
pub mod map;
pub mod models;
pub mod overlay;
pub mod poller;
pub mod selection;
pub mod source;
pub mod state;
pub mod sync;
pub mod view;
