//! Error handling for tn3270r
//!
//! Structured error types for the negotiation, parsing and session layers.
//! The data-stream parser itself never raises to the caller; malformed
//! records become trace diagnostics (see `lib3270::parser`), so the types
//! here cover the failures that do propagate: the transport, the Telnet
//! layer and the TN3270E handshake.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Top-level error type for tn3270r operations
#[derive(Debug)]
pub enum TN3270Error {
    /// Telnet protocol errors
    Telnet(TelnetError),
    /// Negotiation failures (no operating mode could be elected)
    Negotiation(NegotiationError),
    /// 3270 data stream errors
    Protocol(ProtocolError),
    /// Session lifecycle errors
    Session(SessionError),
}

/// Telnet layer errors
#[derive(Debug)]
pub enum TelnetError {
    /// IAC followed by a byte that is not a command
    InvalidCommand { byte: u8 },
    /// Subnegotiation dropped for being malformed
    MalformedSubnegotiation { option: u8 },
    /// Transport delivered EOF mid-negotiation
    UnexpectedEof,
}

/// Negotiation failures surfaced by `Session::open`
#[derive(Debug)]
pub enum NegotiationError {
    /// No mode (not even NVT) could be established
    CannotNegotiate { reason: String },
    /// The per-handshake timeout elapsed before any mode was elected
    Timeout { timeout_secs: u64 },
    /// Server rejected the offered device type
    DeviceTypeRejected { reason_code: u8 },
    /// Function negotiation did not converge within two exchanges
    FunctionsDiverged,
}

/// 3270 data stream errors
#[derive(Debug)]
pub enum ProtocolError {
    /// Record began with a byte that is not a 3270 command
    UnknownCommand { code: u8 },
    /// An order needed more bytes than the record held
    TruncatedOrder { order: u8, needed: usize },
    /// Order byte below 0x40 with no defined meaning
    UnknownOrder { code: u8 },
    /// Structured field shorter than its own length prefix
    TruncatedStructuredField { id: u8, declared: usize, available: usize },
    /// TN3270E record shorter than its 5-byte header
    ShortTn3270eRecord { length: usize },
}

/// Session lifecycle errors
#[derive(Debug)]
pub enum SessionError {
    /// Transport closed (read returned EOF or an IO error)
    TransportClosed { reason: String },
    /// Operation attempted on a closed session
    Closed,
}

impl fmt::Display for TN3270Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TN3270Error::Telnet(err) => write!(f, "Telnet error: {err}"),
            TN3270Error::Negotiation(err) => write!(f, "Negotiation error: {err}"),
            TN3270Error::Protocol(err) => write!(f, "Protocol error: {err}"),
            TN3270Error::Session(err) => write!(f, "Session error: {err}"),
        }
    }
}

impl fmt::Display for TelnetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelnetError::InvalidCommand { byte } =>
                write!(f, "invalid byte 0x{byte:02X} after IAC"),
            TelnetError::MalformedSubnegotiation { option } =>
                write!(f, "malformed subnegotiation for option {option}"),
            TelnetError::UnexpectedEof =>
                write!(f, "transport closed mid-negotiation"),
        }
    }
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationError::CannotNegotiate { reason } =>
                write!(f, "cannot negotiate any operating mode: {reason}"),
            NegotiationError::Timeout { timeout_secs } =>
                write!(f, "negotiation timed out after {timeout_secs}s"),
            NegotiationError::DeviceTypeRejected { reason_code } =>
                write!(f, "device type rejected, reason 0x{reason_code:02X}"),
            NegotiationError::FunctionsDiverged =>
                write!(f, "TN3270E function negotiation did not converge"),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnknownCommand { code } =>
                write!(f, "unknown 3270 command 0x{code:02X}"),
            ProtocolError::TruncatedOrder { order, needed } =>
                write!(f, "order 0x{order:02X} truncated, {needed} more bytes needed"),
            ProtocolError::UnknownOrder { code } =>
                write!(f, "unknown order 0x{code:02X}"),
            ProtocolError::TruncatedStructuredField { id, declared, available } =>
                write!(f, "structured field 0x{id:02X} declares {declared} bytes, {available} available"),
            ProtocolError::ShortTn3270eRecord { length } =>
                write!(f, "TN3270E record of {length} bytes is shorter than its header"),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::TransportClosed { reason } =>
                write!(f, "transport closed: {reason}"),
            SessionError::Closed =>
                write!(f, "session is closed"),
        }
    }
}

impl StdError for TN3270Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            TN3270Error::Telnet(err) => Some(err),
            TN3270Error::Negotiation(err) => Some(err),
            TN3270Error::Protocol(err) => Some(err),
            TN3270Error::Session(err) => Some(err),
        }
    }
}

impl StdError for TelnetError {}
impl StdError for NegotiationError {}
impl StdError for ProtocolError {}
impl StdError for SessionError {}

impl From<TelnetError> for TN3270Error {
    fn from(err: TelnetError) -> Self {
        TN3270Error::Telnet(err)
    }
}

impl From<NegotiationError> for TN3270Error {
    fn from(err: NegotiationError) -> Self {
        TN3270Error::Negotiation(err)
    }
}

impl From<ProtocolError> for TN3270Error {
    fn from(err: ProtocolError) -> Self {
        TN3270Error::Protocol(err)
    }
}

impl From<SessionError> for TN3270Error {
    fn from(err: SessionError) -> Self {
        TN3270Error::Session(err)
    }
}

impl From<io::Error> for TN3270Error {
    fn from(err: io::Error) -> Self {
        TN3270Error::Session(SessionError::TransportClosed {
            reason: err.to_string(),
        })
    }
}

/// Result type alias for tn3270r operations
pub type TN3270Result<T> = Result<T, TN3270Error>;
