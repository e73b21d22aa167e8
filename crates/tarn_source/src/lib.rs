//! Source file management and span tracking for diagnostics.
//!
//! The [`SourceDb`] owns all loaded source text; [`FileId`] and [`Span`]
//! track where AST nodes came from so that elaboration errors and warnings
//! can point back at source locations. Nodes synthesized by the elaborator
//! carry [`Span::DUMMY`].

#![warn(missing_docs)]

pub mod file_id;
pub mod source_db;
pub mod span;

pub use file_id::FileId;
pub use source_db::{Location, SourceDb};
pub use span::Span;
