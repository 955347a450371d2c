//! # lib-spice
//!
//! Everything on the transistor-level side of IBIS Forge:
//! - Netlist node extraction and subcircuit synthesis
//! - Correlation deck assembly for I/O and 3-state models
//! - External simulator execution with timeout
//! - Fixed-width transient waveform decoding

pub mod error;
pub mod netlist;
pub mod deck;
pub mod runner;
pub mod tr0;

pub use error::{SpiceError, SpiceResult};
pub use netlist::{prepare_subcircuit, synthesize_subcircuit, SubcircuitDescriptor};
pub use deck::{
    build_correlation, deck_stem, render_deck, CorrelationContext, CorrelationResult, CorrelationStatus,
    DeckTemplate, NearestRailResolver, SupplyResolver,
};
pub use runner::{CommandRunner, RunOutput, RunnerConfig, SimulatorRunner};
pub use tr0::{decode_waveform, decode_waveform_file};
