//! Shared building blocks for the helix robot crates.
//!
//! Nothing in here knows about drivetrains or mechanisms: these are the small
//! pieces several subsystems lean on, such as memoized values that should not
//! be recomputed every tick, lookup tables, joystick shaping helpers and
//! alliance-relative field geometry.

pub mod cache;
pub mod error;
pub mod field;
pub mod math;

pub use cache::{Cache, CountingCache};
pub use error::CommonError;
pub use field::{Alliance, AllianceFlip, FieldLayout};
pub use math::InterpolatingTable;
