//! Monitor status engine: schedule arithmetic, the unit state machine, and
//! duration statistics.
//!
//! Everything in this crate is pure computation over in-memory values.
//! Persistence, probing, and alert delivery live behind collaborator
//! interfaces in the server crate; the clock is always injected so tests
//! can simulate arbitrary time.

pub mod error;
pub mod machine;
pub mod schedule;
pub mod stats;
pub mod window;
