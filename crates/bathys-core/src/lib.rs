//! Bathys Core -- the electrical network of a submarine simulator.
//!
//! This crate holds the power grid (junctions joined by segments), the
//! propagation pass that decides what is powered, shorted or overloaded, and
//! the text command protocol every junction and external device speaks.
//!
//! # Propagation
//!
//! Each call to [`propagation::propagate_power`] recomputes all derived state
//! from scratch:
//!
//! 1. **Reset** -- Clear fault flags, memoized paths and segment loads.
//! 2. **Shorts** -- Flood from every shorted segment and mark what it reaches.
//! 3. **Conflicts** -- Flood from every live source; two sources meeting
//!    overenergize everything both reach.
//! 4. **Paths** -- Breadth-first search records each junction's shortest path
//!    back to a source.
//! 5. **Loads** -- Every junction adds its draw to each segment on its path.
//! 6. **Settle** -- Segments nobody loaded read zero.
//! 7. **Overload** -- A source whose feed exceeds capacity shuts down and
//!    everything it fed goes under-powered.
//! 8. **Publish** -- Cache `HasPower` and supplied totals on every junction.
//!
//! # Command Lines
//!
//! ```text
//! PUMP1.ON SET true
//! BUS_A.POWERPORT_2 DISABLE
//! BATTERY.CHARGE ENABLE 1
//! ```
//!
//! The [`dispatcher::Dispatcher`] splits a line on its first `.` and routes the
//! remainder to the handler with that name.
//!
//! # Key Types
//!
//! - [`grid::PowerGrid`] -- Arena of junctions and segments.
//! - [`junction::Junction`] -- One configurable node: bus, switch, source or load.
//! - [`segment::Segment`] -- An undirected edge with a status and a load.
//! - [`command::CommandHandler`] -- The text protocol every device implements.
//! - [`snapshot::GridSnapshot`] -- Derived state captured for comparison.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.

pub mod command;
pub mod dispatcher;
pub mod fixed;
pub mod grid;
pub mod id;
pub mod junction;
pub mod part;
pub mod propagation;
pub mod segment;
pub mod snapshot;
pub mod tuning;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
