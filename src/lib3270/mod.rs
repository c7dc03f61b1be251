//! IBM 3270 data-stream engine
//!
//! The heart of the emulator: decoding host records into presentation
//! space mutations and encoding the terminal's replies, per RFC 1576,
//! RFC 2355 and the 3270 Data Stream Programmer's Reference (GA23-0059).
//!
//! # Architecture
//!
//! - [`codes`] - command codes, order codes, AID keys, attribute bits
//! - [`addressing`] - 12/14/16-bit buffer address codec
//! - [`field`] - field attributes and the ordered field chain
//! - [`display`] - the presentation space (cells, cursor, AID state)
//! - [`parser`] - inbound data-stream parsing
//! - [`sf`] - structured fields and the Query Reply
//! - [`writer`] - Read Buffer / Read Modified reply generation
//!
//! The dependency order runs leaves-first: addressing and codes feed the
//! field and display models, which the parser and writer operate on. The
//! Telnet and TN3270E layers live outside this module and hand in one
//! framed record at a time.

pub mod addressing;
pub mod codes;
pub mod display;
pub mod field;
pub mod parser;
pub mod sf;
pub mod writer;

// Re-exports for easy access
pub use codes::{AidKey, CommandCode, OrderCode};
pub use display::{Cell, CharAttrs, Display3270, InputInhibit, ScreenSize, ScreenSnapshot};
pub use field::{ExtendedAttributes, Field, FieldChain};
pub use parser::{parse_record, ParseOutcome, QueryRequest, ReadCommand};
