mod client;
mod gate;
pub mod policy;

pub use client::{RefreshClient, RefreshError};
pub(crate) use gate::{GateOutcome, RefreshGate, RefreshJob};
