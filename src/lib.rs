//! flatrec library
//!
//! Declarative mapping between flat-file records and structured beans.
//!
//! This library provides tools for:
//! - Describing fixed-width and delimited record layouts, programmatically or
//!   from a JSON schema document
//! - Matching physical lines to records by length, field content or script
//! - Assembling multi-line records with repeating lines and segments into
//!   nested beans under cardinality rules
//! - Converting field text to typed values and back through named converters
//! - Writing populated beans back into the same flat layout
//! - Dispatching a whole stream to per-record callbacks with error recovery
//!
//! ```no_run
//! use flatrec::{FileParser, SchemaLoader};
//! use std::fs::File;
//!
//! # fn main() -> flatrec::Result<()> {
//! let format = SchemaLoader::new().load_path("orders.json".as_ref())?;
//! let stats = FileParser::new(&format)
//!     .on_record("order", |record| {
//!         println!("{:?}", record.bean("order"));
//!         Ok(())
//!     })
//!     .parse_reader(File::open("orders.txt")?)?;
//! println!("{} records", stats.records_matched);
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod config;
pub mod constants;
pub mod conversion;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod models;
pub mod parser;
pub mod schema;
pub mod script;
pub mod tokenizer;
pub mod writer;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use binding::{BeanRegistry, PropertyKind, PropertySink, TypeDescriptor};
pub use config::{Encoding, FormatConfig};
pub use conversion::{ConversionOptions, ConversionRegistry, Decimal};
pub use dispatch::FileParser;
pub use error::{FlatrecError, Result};
pub use identity::{FieldIdentity, Identity, LengthIdentity, ScriptIdentity};
pub use models::{Bean, BeanMap, MatchedRecord, ParseStats, Value};
pub use parser::{LineSource, RecordReader};
pub use schema::{
    Cardinality, CardinalityMode, FileFormat, Line, Record, RecordDefinition, RecordElement,
    SchemaLoader, SegmentElement,
};
pub use script::{ScriptRef, ScriptRegistry};
pub use writer::{RecordWriter, write_record};
