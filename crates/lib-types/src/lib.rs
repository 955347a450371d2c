//! # lib-types
//!
//! Core type definitions for the IBIS Forge buffer-model pipeline.
//!
//! This crate provides foundational types used throughout the workspace:
//! - Physical units and the engineering-notation number parser
//! - `TypMinMax` process-corner triples with "fill only unset slots" semantics
//! - The buffer-model graph (global defaults, models, components, pins)
//! - Waveform sets decoded from simulator transient output
//! - Atomic file writes shared by every stage that produces output

pub mod units;
pub mod tmm;
pub mod model;
pub mod waveform;
pub mod atomic;

pub use units::*;
pub use tmm::*;
pub use model::*;
pub use waveform::*;
pub use atomic::write_atomic;
