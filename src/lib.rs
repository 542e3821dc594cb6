//! # scene-import Library
//!
//! A streaming XML importer for multi-file CAD-interchange document graphs.
//! Each file is validated against a declarative schema (ordered sequences and
//! unordered choices with occurrence bounds) with one token of lookahead,
//! while a fixed pool of worker threads races to claim cross-file references
//! discovered during parsing, guaranteeing each file is parsed exactly once.

pub mod archive;
pub mod convert;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod schema;
pub mod token;

pub use archive::{Archive, MemoryArchive};
pub use convert::{FromXmlValue, parse, parse_list};
pub use engine::{ParseContext, validate_document, validate_element};
pub use error::{ConversionError, ImportError, Result};
pub use pipeline::{ImportConfig, ImportOutcome, ImportStats, ParsedFile, import};
pub use resolver::{DependencyRegistry, FileId};
pub use schema::{ChildRule, DocumentSchema, LeafAction, Occurs, SchemaNode};
pub use token::{Event, TokenSource, XmlTokenSource};
