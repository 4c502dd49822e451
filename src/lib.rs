//! Rotating payout scheduling for tontine groups.
//!
//! Turns a group configuration and a member snapshot into the periods of a
//! cycle, the recipient of each period, and a status-tagged ledger of
//! contribution and payout events. Everything here is pure computation;
//! storage, clocks and randomness come in as inputs.

pub mod allocation;
pub mod clock;
pub mod error;
pub mod ledger;
pub mod models;
pub mod planner;
pub mod report;
pub mod schedule;

pub use allocation::allocate;
pub use error::{Result, ScheduleError};
pub use ledger::{build_ledger, reclassify, Ledger, LedgerOptions, PayoutTiming};
pub use planner::{plan_cycle, CyclePlan};
pub use schedule::{cycle_length_for, generate_periods};
