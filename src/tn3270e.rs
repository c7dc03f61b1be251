//! TN3270E negotiation and record headers (RFC 2355)
//!
//! A small state machine layered over the Telnet option exchange. Once
//! the TN3270E option is agreed, the client asks for a device type, the
//! server assigns one (optionally with an LU name), and the two sides
//! settle a function set. Every record then carries a 5-byte header:
//! data type, request flag, response flag and a big-endian sequence
//! number. The negotiator owns that sequence counter and builds the
//! RESPONSE acknowledgements when the RESPONSES function is active.

use crate::error::{NegotiationError, ProtocolError};
use crate::lib3270::display::ScreenSize;
use crate::trace::{TraceEvent, TraceSink};

/// Subnegotiation command codes
pub const TN3270E_ASSOCIATE: u8 = 0;
pub const TN3270E_CONNECT: u8 = 1;
pub const TN3270E_DEVICE_TYPE: u8 = 2;
pub const TN3270E_FUNCTIONS: u8 = 3;
pub const TN3270E_IS: u8 = 4;
pub const TN3270E_REASON: u8 = 5;
pub const TN3270E_REJECT: u8 = 6;
pub const TN3270E_REQUEST: u8 = 7;
pub const TN3270E_SEND: u8 = 8;

/// Record header data types
pub const DT_3270_DATA: u8 = 0x00;
pub const DT_SCS_DATA: u8 = 0x01;
pub const DT_RESPONSE: u8 = 0x02;
pub const DT_BIND_IMAGE: u8 = 0x03;
pub const DT_UNBIND: u8 = 0x04;
pub const DT_NVT_DATA: u8 = 0x05;
pub const DT_REQUEST: u8 = 0x06;
pub const DT_SSCP_LU_DATA: u8 = 0x07;
pub const DT_PRINT_EOJ: u8 = 0x08;

/// Request-flag values (outbound header byte 1)
pub const REQUEST_FLAG_NONE: u8 = 0x00;
pub const REQUEST_FLAG_ERR_COND_CLEARED: u8 = 0x00;

/// Response-flag values on data records (header byte 2)
pub const RESPONSE_FLAG_NO_RESPONSE: u8 = 0x00;
pub const RESPONSE_FLAG_ERROR_RESPONSE: u8 = 0x01;
pub const RESPONSE_FLAG_ALWAYS_RESPONSE: u8 = 0x02;

/// Response-flag values on RESPONSE records
pub const RESPONSE_POSITIVE: u8 = 0x00;
pub const RESPONSE_NEGATIVE: u8 = 0x01;

/// Status byte carried by a positive RESPONSE record
pub const POSITIVE_DEVICE_END: u8 = 0x00;
/// Status byte carried by a negative RESPONSE record
pub const NEGATIVE_COMMAND_REJECT: u8 = 0x00;

/// Negotiable TN3270E functions, kept as a bitmask of the code values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FunctionSet(u8);

pub const FUNC_BIND_IMAGE: u8 = 0;
pub const FUNC_DATA_STREAM_CTL: u8 = 1;
pub const FUNC_RESPONSES: u8 = 2;
pub const FUNC_SCS_CTL_CODES: u8 = 3;
pub const FUNC_SYSREQ: u8 = 4;

impl FunctionSet {
    pub const EMPTY: FunctionSet = FunctionSet(0);

    pub fn new(codes: &[u8]) -> Self {
        let mut set = Self::EMPTY;
        for &code in codes {
            set = set.with(code);
        }
        set
    }

    pub fn with(self, code: u8) -> Self {
        if code <= FUNC_SYSREQ {
            FunctionSet(self.0 | (1 << code))
        } else {
            self
        }
    }

    pub fn contains(&self, code: u8) -> bool {
        code <= FUNC_SYSREQ && (self.0 & (1 << code)) != 0
    }

    pub fn intersect(&self, other: FunctionSet) -> FunctionSet {
        FunctionSet(self.0 & other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Wire form: the function codes in ascending order
    pub fn to_wire(&self) -> Vec<u8> {
        (0..=FUNC_SYSREQ).filter(|&c| self.contains(c)).collect()
    }

    /// Parse a wire-form code list; codes above SYSREQ are dropped
    pub fn from_wire(codes: &[u8]) -> Self {
        Self::new(codes)
    }
}

/// The 5-byte header in front of every TN3270E record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tn3270eHeader {
    pub data_type: u8,
    pub request_flag: u8,
    pub response_flag: u8,
    pub seq: u16,
}

impl Tn3270eHeader {
    pub fn new(data_type: u8, seq: u16) -> Self {
        Self {
            data_type,
            request_flag: REQUEST_FLAG_NONE,
            response_flag: RESPONSE_FLAG_NO_RESPONSE,
            seq,
        }
    }

    /// Split a TN3270E record into header and payload
    pub fn parse(record: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        if record.len() < 5 {
            return Err(ProtocolError::ShortTn3270eRecord { length: record.len() });
        }
        let header = Self {
            data_type: record[0],
            request_flag: record[1],
            response_flag: record[2],
            seq: u16::from_be_bytes([record[3], record[4]]),
        };
        Ok((header, &record[5..]))
    }

    pub fn encode(&self) -> [u8; 5] {
        let seq = self.seq.to_be_bytes();
        [self.data_type, self.request_flag, self.response_flag, seq[0], seq[1]]
    }
}

/// Where the handshake stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the TN3270E option to come up
    Start,
    /// SEND DEVICE-TYPE is out, waiting for DEVICE-TYPE IS/REJECT
    DeviceTypeSent,
    /// FUNCTIONS REQUEST is out
    FunctionsSent,
    /// Agreement reached
    Bound,
    /// Downgraded to basic 3270
    Failed,
}

/// What a subnegotiation exchange produced
#[derive(Debug, Default)]
pub struct NegotiationStep {
    /// Payload to send back inside IAC SB TN3270E ... IAC SE
    pub reply: Option<Vec<u8>>,
    /// The handshake finished
    pub bound: bool,
    /// The handshake failed; downgrade to basic 3270
    pub failed: Option<NegotiationError>,
}

/// Client-side TN3270E negotiator
#[derive(Debug)]
pub struct Tn3270eNegotiator {
    phase: Phase,
    requested_functions: FunctionSet,
    device_type: Option<String>,
    lu_name: Option<String>,
    functions: FunctionSet,
    seq: u16,
    counter_rounds: u8,
}

impl Tn3270eNegotiator {
    pub fn new(requested_functions: FunctionSet) -> Self {
        Self {
            phase: Phase::Start,
            requested_functions,
            device_type: None,
            lu_name: None,
            functions: FunctionSet::EMPTY,
            seq: 0,
            counter_rounds: 0,
        }
    }

    /// Step 1 of the handshake: ask the server for a device type.
    /// Returns the subnegotiation payload to send.
    pub fn start(&mut self) -> Vec<u8> {
        self.phase = Phase::DeviceTypeSent;
        vec![TN3270E_SEND, TN3270E_DEVICE_TYPE]
    }

    pub fn is_bound(&self) -> bool {
        self.phase == Phase::Bound
    }

    /// The handshake has not started yet
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Start
    }

    /// The handshake ended in REJECT or divergence
    pub fn handshake_failed(&self) -> bool {
        self.phase == Phase::Failed
    }

    pub fn device_type(&self) -> Option<&str> {
        self.device_type.as_deref()
    }

    pub fn lu_name(&self) -> Option<&str> {
        self.lu_name.as_deref()
    }

    pub fn functions(&self) -> FunctionSet {
        self.functions
    }

    /// Screen size for the negotiated device type
    pub fn negotiated_size(&self) -> Option<ScreenSize> {
        let device = self.device_type.as_deref()?;
        let model = parse_device_model(device)?;
        ScreenSize::from_model(model)
    }

    /// Sequence number for the next outbound record; increments only for
    /// records that ask for a definite response.
    pub fn next_seq(&mut self, expects_response: bool) -> u16 {
        let seq = self.seq;
        if expects_response {
            self.seq = self.seq.wrapping_add(1);
        }
        seq
    }

    /// Process one TN3270E subnegotiation payload from the server.
    pub fn handle_subnegotiation(&mut self, payload: &[u8], sink: &dyn TraceSink) -> NegotiationStep {
        let mut step = NegotiationStep::default();
        let Some(&command) = payload.first() else {
            return step;
        };

        match (command, payload.get(1).copied()) {
            (TN3270E_DEVICE_TYPE, Some(TN3270E_IS)) => {
                self.handle_device_type_is(&payload[2..], sink, &mut step);
            }
            (TN3270E_DEVICE_TYPE, Some(TN3270E_REJECT)) => {
                let reason_code = match (payload.get(2), payload.get(3)) {
                    (Some(&TN3270E_REASON), Some(&code)) => code,
                    _ => 0xFF,
                };
                self.phase = Phase::Failed;
                step.failed = Some(NegotiationError::DeviceTypeRejected { reason_code });
            }
            (TN3270E_FUNCTIONS, Some(TN3270E_IS)) => {
                if self.phase == Phase::FunctionsSent {
                    self.functions = FunctionSet::from_wire(&payload[2..]);
                    self.phase = Phase::Bound;
                    step.bound = true;
                } else {
                    sink.record(TraceEvent::Error {
                        message: "FUNCTIONS IS outside function negotiation".into(),
                    });
                }
            }
            (TN3270E_FUNCTIONS, Some(TN3270E_REQUEST)) => {
                self.handle_functions_request(&payload[2..], &mut step);
            }
            (TN3270E_SEND, Some(TN3270E_DEVICE_TYPE)) => {
                // A server-side prompt; answer by restarting step 1.
                step.reply = Some(self.start());
            }
            _ => {
                sink.record(TraceEvent::Error {
                    message: format!("unhandled TN3270E subnegotiation 0x{command:02X}"),
                });
            }
        }
        step
    }

    /// DEVICE-TYPE IS <type> [CONNECT <lu>]
    fn handle_device_type_is(&mut self, body: &[u8], sink: &dyn TraceSink, step: &mut NegotiationStep) {
        let connect_at = body.iter().position(|&b| b == TN3270E_CONNECT);
        let type_bytes = &body[..connect_at.unwrap_or(body.len())];
        let device = String::from_utf8_lossy(type_bytes).to_string();

        if parse_device_model(&device).is_none() {
            sink.record(TraceEvent::Error {
                message: format!("server assigned unsupported device type {device}"),
            });
            self.phase = Phase::Failed;
            step.failed = Some(NegotiationError::CannotNegotiate {
                reason: format!("unsupported device type {device}"),
            });
            return;
        }

        self.device_type = Some(device);
        self.lu_name = connect_at.map(|at| String::from_utf8_lossy(&body[at + 1..]).to_string());

        // Step 3: propose our function set.
        let mut reply = vec![TN3270E_FUNCTIONS, TN3270E_REQUEST];
        reply.extend_from_slice(&self.requested_functions.to_wire());
        self.phase = Phase::FunctionsSent;
        step.reply = Some(reply);
    }

    /// Server counter-proposal: answer IS with the intersection of the
    /// two proposals. A second counter-proposal means the exchange is
    /// not converging, and the session falls back to basic 3270.
    fn handle_functions_request(&mut self, codes: &[u8], step: &mut NegotiationStep) {
        self.counter_rounds += 1;
        if self.counter_rounds >= 2 {
            self.phase = Phase::Failed;
            step.failed = Some(NegotiationError::FunctionsDiverged);
            return;
        }
        let proposed = FunctionSet::from_wire(codes);
        let agreed = self.requested_functions.intersect(proposed);
        self.functions = agreed;
        let mut reply = vec![TN3270E_FUNCTIONS, TN3270E_IS];
        reply.extend_from_slice(&agreed.to_wire());
        self.phase = Phase::Bound;
        step.reply = Some(reply);
        step.bound = true;
    }

    /// Build the RESPONSE record acknowledging `seq`, when the RESPONSES
    /// function is active. Returns header bytes plus the status byte.
    pub fn build_response(&self, seq: u16, positive: bool) -> Vec<u8> {
        let header = Tn3270eHeader {
            data_type: DT_RESPONSE,
            request_flag: REQUEST_FLAG_NONE,
            response_flag: if positive { RESPONSE_POSITIVE } else { RESPONSE_NEGATIVE },
            seq,
        };
        let mut record = header.encode().to_vec();
        record.push(if positive { POSITIVE_DEVICE_END } else { NEGATIVE_COMMAND_REJECT });
        record
    }

    /// Whether an inbound data record must be acknowledged
    pub fn needs_response(&self, header: &Tn3270eHeader) -> bool {
        self.functions.contains(FUNC_RESPONSES)
            && matches!(
                header.response_flag,
                RESPONSE_FLAG_ERROR_RESPONSE | RESPONSE_FLAG_ALWAYS_RESPONSE
            )
            && header.data_type != DT_RESPONSE
    }
}

/// Model digit of a supported device type string: 3278/3279 models 2-5,
/// with or without the "-E" extended suffix.
pub fn parse_device_model(device: &str) -> Option<u8> {
    let rest = device
        .strip_prefix("IBM-3278-")
        .or_else(|| device.strip_prefix("IBM-3279-"))?;
    let model_part = rest.strip_suffix("-E").unwrap_or(rest);
    match model_part {
        "2" => Some(2),
        "3" => Some(3),
        "4" => Some(4),
        "5" => Some(5),
        _ => None,
    }
}

/// Extract the default and alternate presentation-space sizes from a
/// BIND-IMAGE payload (the BIND RU without its TN3270E header). Offsets
/// 20-23 carry default rows/cols and alternate rows/cols when the RU is
/// long enough; nonsense dimensions are rejected.
pub fn parse_bind_image(payload: &[u8]) -> Option<(ScreenSize, ScreenSize)> {
    if payload.len() < 24 {
        return None;
    }
    let (rd, cd, ra, ca) = (payload[20], payload[21], payload[22], payload[23]);
    if rd == 0 || cd == 0 || ra == 0 || ca == 0 {
        return None;
    }
    let default = ScreenSize::Custom { rows: rd as u16, cols: cd as u16 };
    let alternate = ScreenSize::Custom { rows: ra as u16, cols: ca as u16 };
    if default.buffer_size() > 16384 || alternate.buffer_size() > 16384 {
        return None;
    }
    Some((default, alternate))
}
