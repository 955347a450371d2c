//! # lib-ibis
//!
//! IBIS buffer-model processing for IBIS Forge.
//!
//! This crate provides:
//! - The data completion engine that resolves the global -> model ->
//!   component default chain and links pins to models
//! - A table extractor for `.ibs` model-description files
//! - A writer that renders a resolved graph back out as `.ibs` text

pub mod error;
pub mod completion;
pub mod tables;
pub mod writer;

pub use error::{LinkError, ParseError};
pub use completion::{complete, CompletionReport};
pub use tables::{extract_tables, extract_tables_from_path, select_indices, TableRecord};
pub use writer::{write_ibis, write_ibis_file, IbisHeader};
