//! Negotiation and data-stream trace recording
//!
//! A narrow sink interface for ordered diagnostic events. The core calls
//! the sink unconditionally; embedders that do not care pass [`NopSink`]
//! and the calls cost one virtual dispatch. [`TraceRecorder`] keeps the
//! events in memory with timestamps relative to its creation, for tests
//! and for diff tooling that compares negotiation transcripts.

use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

/// Direction of a traced protocol exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// One diagnostic event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    /// A WILL/WONT/DO/DONT exchange
    Telnet {
        direction: Direction,
        command: &'static str,
        option: u8,
    },
    /// A subnegotiation payload (IAC SB .. IAC SE)
    Subneg {
        option: u8,
        payload_hex: String,
        length: usize,
    },
    /// An operating-mode election or downgrade
    ModeDecision {
        requested: &'static str,
        chosen: &'static str,
        fallback: bool,
    },
    /// A TN3270E record header, either direction
    Tn3270eHeader {
        data_type: u8,
        seq: u16,
        flags: u8,
    },
    /// A parsed 3270 command or order
    Order {
        command: &'static str,
        address: u16,
        length: usize,
    },
    /// A recoverable diagnostic
    Error { message: String },
}

/// Timestamped event as stored by the recorder
#[derive(Debug, Clone, Serialize)]
pub struct TimedEvent {
    /// Seconds since recorder creation (monotonic)
    pub ts: f64,
    #[serde(flatten)]
    pub event: TraceEvent,
}

/// Sink for trace events. One operation; implementations must be cheap.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: TraceEvent);
}

/// A sink that drops everything
#[derive(Debug, Default)]
pub struct NopSink;

impl TraceSink for NopSink {
    fn record(&self, _event: TraceEvent) {}
}

/// Ordered in-memory recorder with monotonic relative timestamps
#[derive(Debug)]
pub struct TraceRecorder {
    start: Instant,
    events: Mutex<Vec<TimedEvent>>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Copy of all recorded events, in arrival order
    pub fn events(&self) -> Vec<TimedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the full log as a JSON array
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&*self.events.lock().unwrap())
    }
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceSink for TraceRecorder {
    fn record(&self, event: TraceEvent) {
        let ts = self.start.elapsed().as_secs_f64();
        self.events.lock().unwrap().push(TimedEvent { ts, event });
    }
}

/// Hex-dump helper for subnegotiation payload previews
pub fn hex_preview(payload: &[u8]) -> String {
    const PREVIEW_LEN: usize = 32;
    payload
        .iter()
        .take(PREVIEW_LEN)
        .map(|b| format!("{b:02x}"))
        .collect()
}
