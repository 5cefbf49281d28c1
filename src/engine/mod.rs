//! Engine module housing the frame loop.
//!
//! `clock` provides the time sources every component is driven by; `core`
//! owns the components and routes events between them once per frame.

pub mod clock;
pub mod core;

pub use clock::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use core::{Engine, Frame};
