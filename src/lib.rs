//! tn3270r - a pure-software IBM 3270 emulation core
//!
//! This crate implements the three subsystems at the center of a TN3270
//! terminal emulator: the Telnet/TN3270E negotiator and record framer,
//! the 3270 data-stream parser and writer, and the presentation-space /
//! field model with modified-data tracking. Everything else a full
//! client needs (rendering, scripting, CLI) sits outside and drives the
//! [`session::Session`] API over any reliable byte stream.
//!
//! ```rust,no_run
//! use tn3270r::session::{Session, SessionConfig};
//! use tn3270r::lib3270::AidKey;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = tokio::net::TcpStream::connect("host:23").await?;
//! let mut session = Session::open(transport, SessionConfig::default(), None).await?;
//!
//! session.wait_for_host_record().await?;
//! session.type_string("LOGON APPLID(TSO)").map_err(|e| format!("{e:?}"))?;
//! session.send_key(AidKey::Enter).await?;
//! # Ok(())
//! # }
//! ```

/// EBCDIC code-page conversion (CP037, CP1047, Graphic Escape)
pub mod ebcdic;

/// Structured error types
pub mod error;

/// Operator keystroke processing
pub mod keyboard;

/// LIB3270: the 3270 data-stream engine and screen model
pub mod lib3270;

/// Session façade over an async transport
pub mod session;

/// Telnet framing and Q-method option negotiation
pub mod telnet;

/// TN3270E device/function negotiation and record headers
pub mod tn3270e;

/// Diagnostic trace events and sinks
pub mod trace;

// Re-export the types embedders touch most
pub use error::{TN3270Error, TN3270Result};
pub use session::{Session, SessionConfig};
