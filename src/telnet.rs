//! Telnet framing and option negotiation
//!
//! The boundary layer between the transport byte stream and 3270
//! records. Handles IAC interpretation in every mode, tracks per-option
//! negotiation state with the RFC 1143 Q-method (no oscillation on any
//! finite exchange), frames records on IAC EOR with IAC-IAC escaping,
//! and elects the operating mode: NVT until BINARY, END-OF-RECORD and
//! TERMINAL-TYPE are agreed, TN3270E on top of that once the TN3270E
//! subnegotiation binds a device type.
//!
//! TN3270E subnegotiation payloads are not interpreted here; they are
//! queued for the `tn3270e` state machine, which observes this layer's
//! mode election.

use std::collections::{HashMap, VecDeque};

use log::{debug, warn};

use crate::trace::{Direction, TraceEvent, TraceSink};

/// Telnet command codes (RFC 854)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetCommand {
    /// Interpret As Command - 255 (0xFF)
    IAC = 255,
    /// Don't - 254 (0xFE)
    DONT = 254,
    /// Do - 253 (0xFD)
    DO = 253,
    /// Won't - 252 (0xFC)
    WONT = 252,
    /// Will - 251 (0xFB)
    WILL = 251,
    /// Subnegotiation Begin - 250 (0xFA)
    SB = 250,
    /// Go Ahead - 249 (0xF9)
    GA = 249,
    /// Are You There - 246 (0xF6)
    AYT = 246,
    /// Interrupt Process - 244 (0xF4)
    IP = 244,
    /// Break - 243 (0xF3)
    BRK = 243,
    /// No Operation - 241 (0xF1)
    NOP = 241,
    /// Subnegotiation End - 240 (0xF0)
    SE = 240,
    /// End of Record - 239 (0xEF)
    EOR = 239,
}

impl TelnetCommand {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            255 => Some(TelnetCommand::IAC),
            254 => Some(TelnetCommand::DONT),
            253 => Some(TelnetCommand::DO),
            252 => Some(TelnetCommand::WONT),
            251 => Some(TelnetCommand::WILL),
            250 => Some(TelnetCommand::SB),
            249 => Some(TelnetCommand::GA),
            246 => Some(TelnetCommand::AYT),
            244 => Some(TelnetCommand::IP),
            243 => Some(TelnetCommand::BRK),
            241 => Some(TelnetCommand::NOP),
            240 => Some(TelnetCommand::SE),
            239 => Some(TelnetCommand::EOR),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            TelnetCommand::IAC => "IAC",
            TelnetCommand::DONT => "DONT",
            TelnetCommand::DO => "DO",
            TelnetCommand::WONT => "WONT",
            TelnetCommand::WILL => "WILL",
            TelnetCommand::SB => "SB",
            TelnetCommand::GA => "GA",
            TelnetCommand::AYT => "AYT",
            TelnetCommand::IP => "IP",
            TelnetCommand::BRK => "BRK",
            TelnetCommand::NOP => "NOP",
            TelnetCommand::SE => "SE",
            TelnetCommand::EOR => "EOR",
        }
    }
}

/// Telnet options this negotiator tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelnetOption {
    Binary = 0,
    SuppressGoAhead = 3,
    TimingMark = 6,
    TerminalType = 24,
    EndOfRecord = 25,
    TN3270E = 40,
}

impl TelnetOption {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TelnetOption::Binary),
            3 => Some(TelnetOption::SuppressGoAhead),
            6 => Some(TelnetOption::TimingMark),
            24 => Some(TelnetOption::TerminalType),
            25 => Some(TelnetOption::EndOfRecord),
            40 => Some(TelnetOption::TN3270E),
            _ => None,
        }
    }
}

/// TERMINAL-TYPE subnegotiation verbs
const TTYPE_IS: u8 = 0;
const TTYPE_SEND: u8 = 1;

/// Q-method option state (RFC 1143). The `Opposite` variants remember a
/// reversal requested while an answer is still in flight, which is what
/// prevents negotiation loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum QState {
    #[default]
    No,
    WantNoEmpty,
    WantNoOpposite,
    WantYesEmpty,
    WantYesOpposite,
    Yes,
}

impl QState {
    fn is_yes(self) -> bool {
        self == QState::Yes
    }
}

/// Negotiation state for one option: our side and the remote side
#[derive(Debug, Clone, Copy, Default)]
struct OptionState {
    us: QState,
    him: QState,
}

/// Operating mode elected by negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    /// Line-oriented Network Virtual Terminal (the initial mode)
    Nvt,
    /// 3270 data streams framed by IAC EOR
    Basic3270,
    /// TN3270E with 5-byte record headers
    Tn3270e,
}

impl OperatingMode {
    pub fn name(&self) -> &'static str {
        match self {
            OperatingMode::Nvt => "nvt",
            OperatingMode::Basic3270 => "basic-3270",
            OperatingMode::Tn3270e => "tn3270e",
        }
    }

    /// Records are IAC EOR framed in both 3270 modes
    pub fn is_record_mode(&self) -> bool {
        !matches!(self, OperatingMode::Nvt)
    }
}

/// Byte-scanner state, persistent across reads
#[derive(Debug)]
enum ScanState {
    Data,
    SeenIac,
    CommandOption(TelnetCommand),
    SubnegOption,
    Subneg { option: u8, payload: Vec<u8>, seen_iac: bool },
}

/// The Telnet framer and option state machine.
///
/// `feed` consumes transport bytes; completed records, NVT data, queued
/// TN3270E subnegotiations and pending responses are drained through
/// their respective accessors.
#[derive(Debug)]
pub struct TelnetNegotiator {
    options: HashMap<TelnetOption, OptionState>,
    mode: OperatingMode,
    scan: ScanState,

    /// Record under construction (already IAC-unescaped)
    record_buf: Vec<u8>,

    /// Completed inbound records
    records: VecDeque<Vec<u8>>,

    /// Inbound data while in NVT mode
    nvt_buf: Vec<u8>,

    /// Bytes owed to the transport
    output: Vec<u8>,

    /// TN3270E subnegotiation payloads for the TN3270E state machine
    tn3270e_subnegs: VecDeque<Vec<u8>>,

    /// Recoverable framing error: ignore bytes until the next EOR
    discard_until_eor: bool,

    /// The TN3270E module reported a bound device type
    tn3270e_bound: bool,

    /// Offer TN3270E at all (the session's `extended` switch)
    enable_tn3270e: bool,

    /// Type reported in TERMINAL-TYPE IS
    terminal_type: String,
}

impl TelnetNegotiator {
    pub fn new(enable_tn3270e: bool, terminal_type: &str) -> Self {
        Self {
            options: HashMap::new(),
            mode: OperatingMode::Nvt,
            scan: ScanState::Data,
            record_buf: Vec::new(),
            records: VecDeque::new(),
            nvt_buf: Vec::new(),
            output: Vec::new(),
            tn3270e_subnegs: VecDeque::new(),
            discard_until_eor: false,
            tn3270e_bound: false,
            enable_tn3270e,
            terminal_type: terminal_type.to_string(),
        }
    }

    /// Options we are willing to enable on our side
    fn us_supported(&self, option: TelnetOption) -> bool {
        match option {
            TelnetOption::Binary
            | TelnetOption::SuppressGoAhead
            | TelnetOption::TimingMark
            | TelnetOption::TerminalType
            | TelnetOption::EndOfRecord => true,
            TelnetOption::TN3270E => self.enable_tn3270e,
        }
    }

    /// Options we want the remote side to enable
    fn him_supported(&self, option: TelnetOption) -> bool {
        matches!(
            option,
            TelnetOption::Binary | TelnetOption::SuppressGoAhead | TelnetOption::EndOfRecord
        )
    }

    /// Open the conversation: offer our options and ask for the remote's.
    pub fn initiate(&mut self, sink: &dyn TraceSink) {
        let offers = [
            TelnetOption::TerminalType,
            TelnetOption::Binary,
            TelnetOption::EndOfRecord,
        ];
        for option in offers {
            self.ask_will(option, sink);
        }
        if self.enable_tn3270e {
            self.ask_will(TelnetOption::TN3270E, sink);
        }
        for option in [TelnetOption::Binary, TelnetOption::EndOfRecord] {
            self.ask_do(option, sink);
        }
    }

    fn ask_will(&mut self, option: TelnetOption, sink: &dyn TraceSink) {
        let state = self.options.entry(option).or_default();
        if state.us == QState::No {
            state.us = QState::WantYesEmpty;
            self.send_command(TelnetCommand::WILL, option as u8, sink);
        }
    }

    fn ask_do(&mut self, option: TelnetOption, sink: &dyn TraceSink) {
        let state = self.options.entry(option).or_default();
        if state.him == QState::No {
            state.him = QState::WantYesEmpty;
            self.send_command(TelnetCommand::DO, option as u8, sink);
        }
    }

    /// Current operating mode
    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    /// True when both sides agreed on an option (our side for WILL-type
    /// options, the remote side for DO-type)
    pub fn is_enabled_us(&self, option: TelnetOption) -> bool {
        self.options.get(&option).map(|s| s.us.is_yes()).unwrap_or(false)
    }

    pub fn is_enabled_him(&self, option: TelnetOption) -> bool {
        self.options.get(&option).map(|s| s.him.is_yes()).unwrap_or(false)
    }

    /// True while any option negotiation is awaiting an answer
    pub fn has_pending_options(&self) -> bool {
        self.options.values().any(|s| {
            !matches!(s.us, QState::No | QState::Yes) || !matches!(s.him, QState::No | QState::Yes)
        })
    }

    /// The TN3270E module reports the device type bound / unbound
    pub fn set_tn3270e_bound(&mut self, bound: bool, sink: &dyn TraceSink) {
        self.tn3270e_bound = bound;
        self.elect_mode(sink);
    }

    /// Drain bytes owed to the transport
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Next complete inbound 3270 record
    pub fn next_record(&mut self) -> Option<Vec<u8>> {
        self.records.pop_front()
    }

    /// Drain NVT-mode inbound data
    pub fn take_nvt_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.nvt_buf)
    }

    /// Next queued TN3270E subnegotiation payload
    pub fn next_tn3270e_subneg(&mut self) -> Option<Vec<u8>> {
        self.tn3270e_subnegs.pop_front()
    }

    /// Frame and queue an outbound record: IAC escaping plus IAC EOR
    pub fn send_record(&mut self, record: &[u8]) {
        for &byte in record {
            self.output.push(byte);
            if byte == TelnetCommand::IAC as u8 {
                self.output.push(TelnetCommand::IAC as u8);
            }
        }
        self.output.push(TelnetCommand::IAC as u8);
        self.output.push(TelnetCommand::EOR as u8);
    }

    /// Queue an outbound subnegotiation (payload is IAC-escaped here)
    pub fn send_subnegotiation(&mut self, option: u8, payload: &[u8], sink: &dyn TraceSink) {
        sink.record(TraceEvent::Subneg {
            option,
            payload_hex: crate::trace::hex_preview(payload),
            length: payload.len(),
        });
        self.output.push(TelnetCommand::IAC as u8);
        self.output.push(TelnetCommand::SB as u8);
        self.output.push(option);
        for &byte in payload {
            self.output.push(byte);
            if byte == TelnetCommand::IAC as u8 {
                self.output.push(TelnetCommand::IAC as u8);
            }
        }
        self.output.push(TelnetCommand::IAC as u8);
        self.output.push(TelnetCommand::SE as u8);
    }

    /// Send an ATTN as a Telnet BREAK (basic TN3270 convention)
    pub fn send_break(&mut self) {
        self.output.push(TelnetCommand::IAC as u8);
        self.output.push(TelnetCommand::BRK as u8);
    }

    /// Consume transport bytes, advancing the scanner
    pub fn feed(&mut self, data: &[u8], sink: &dyn TraceSink) {
        for &byte in data {
            self.feed_byte(byte, sink);
        }
    }

    fn feed_byte(&mut self, byte: u8, sink: &dyn TraceSink) {
        match std::mem::replace(&mut self.scan, ScanState::Data) {
            ScanState::Data => {
                if byte == TelnetCommand::IAC as u8 {
                    self.scan = ScanState::SeenIac;
                } else {
                    self.push_data(byte);
                }
            }
            ScanState::SeenIac => match TelnetCommand::from_u8(byte) {
                Some(TelnetCommand::IAC) => {
                    // Escaped data byte 0xFF
                    self.push_data(0xFF);
                }
                Some(cmd @ (TelnetCommand::WILL | TelnetCommand::WONT | TelnetCommand::DO | TelnetCommand::DONT)) => {
                    self.scan = ScanState::CommandOption(cmd);
                }
                Some(TelnetCommand::SB) => {
                    self.scan = ScanState::SubnegOption;
                }
                Some(TelnetCommand::EOR) => {
                    self.complete_record(sink);
                }
                Some(TelnetCommand::NOP) | Some(TelnetCommand::GA) => {}
                Some(other) => {
                    debug!("ignoring telnet command {}", other.name());
                }
                None => {
                    // Not a command: recoverable framing error.
                    sink.record(TraceEvent::Error {
                        message: format!("invalid byte 0x{byte:02X} after IAC, discarding to EOR"),
                    });
                    if self.mode.is_record_mode() {
                        self.record_buf.clear();
                        self.discard_until_eor = true;
                    }
                }
            },
            ScanState::CommandOption(cmd) => {
                self.handle_negotiation(cmd, byte, sink);
            }
            ScanState::SubnegOption => {
                self.scan = ScanState::Subneg {
                    option: byte,
                    payload: Vec::new(),
                    seen_iac: false,
                };
            }
            ScanState::Subneg { option, mut payload, seen_iac } => {
                if seen_iac {
                    match TelnetCommand::from_u8(byte) {
                        Some(TelnetCommand::SE) => {
                            self.handle_subnegotiation(option, payload, sink);
                        }
                        Some(TelnetCommand::IAC) => {
                            payload.push(0xFF);
                            self.scan = ScanState::Subneg { option, payload, seen_iac: false };
                        }
                        _ => {
                            // No SE: drop the subnegotiation, keep going.
                            sink.record(TraceEvent::Error {
                                message: format!(
                                    "malformed subnegotiation for option {option}, discarded"
                                ),
                            });
                        }
                    }
                } else if byte == TelnetCommand::IAC as u8 {
                    self.scan = ScanState::Subneg { option, payload, seen_iac: true };
                } else {
                    payload.push(byte);
                    self.scan = ScanState::Subneg { option, payload, seen_iac: false };
                }
            }
        }
    }

    fn push_data(&mut self, byte: u8) {
        if self.discard_until_eor {
            return;
        }
        if self.mode.is_record_mode() {
            self.record_buf.push(byte);
        } else {
            self.nvt_buf.push(byte);
        }
    }

    fn complete_record(&mut self, sink: &dyn TraceSink) {
        if self.discard_until_eor {
            self.discard_until_eor = false;
            self.record_buf.clear();
            return;
        }
        if self.mode.is_record_mode() {
            let record = std::mem::take(&mut self.record_buf);
            if !record.is_empty() {
                self.records.push_back(record);
            }
        } else {
            sink.record(TraceEvent::Error {
                message: "EOR received in NVT mode".into(),
            });
        }
    }

    fn send_command(&mut self, cmd: TelnetCommand, option: u8, sink: &dyn TraceSink) {
        sink.record(TraceEvent::Telnet {
            direction: Direction::Outbound,
            command: cmd.name(),
            option,
        });
        self.output.push(TelnetCommand::IAC as u8);
        self.output.push(cmd as u8);
        self.output.push(option);
    }

    fn handle_negotiation(&mut self, cmd: TelnetCommand, option_byte: u8, sink: &dyn TraceSink) {
        sink.record(TraceEvent::Telnet {
            direction: Direction::Inbound,
            command: cmd.name(),
            option: option_byte,
        });

        let Some(option) = TelnetOption::from_u8(option_byte) else {
            // Unknown option: refuse whichever way it was asked.
            match cmd {
                TelnetCommand::WILL => self.send_command(TelnetCommand::DONT, option_byte, sink),
                TelnetCommand::DO => self.send_command(TelnetCommand::WONT, option_byte, sink),
                _ => {}
            }
            return;
        };

        match cmd {
            TelnetCommand::WILL => self.handle_will(option, sink),
            TelnetCommand::WONT => self.handle_wont(option, sink),
            TelnetCommand::DO => self.handle_do(option, sink),
            TelnetCommand::DONT => self.handle_dont(option, sink),
            _ => unreachable!("negotiation commands only"),
        }
        self.elect_mode(sink);
    }

    /// RFC 1143, receiving WILL (about the remote side)
    fn handle_will(&mut self, option: TelnetOption, sink: &dyn TraceSink) {
        let accept = self.him_supported(option);
        let state = self.options.entry(option).or_default();
        let (new_him, reply) = match state.him {
            QState::No => {
                if accept {
                    (QState::Yes, Some(TelnetCommand::DO))
                } else {
                    (QState::No, Some(TelnetCommand::DONT))
                }
            }
            QState::WantNoEmpty => {
                warn!("DONT {option:?} answered by WILL");
                (QState::No, None)
            }
            QState::WantNoOpposite => {
                warn!("DONT {option:?} answered by WILL, queue raced");
                (QState::Yes, None)
            }
            QState::WantYesEmpty => (QState::Yes, None),
            QState::WantYesOpposite => (QState::WantNoEmpty, Some(TelnetCommand::DONT)),
            QState::Yes => (QState::Yes, None),
        };
        state.him = new_him;
        if let Some(cmd) = reply {
            self.send_command(cmd, option as u8, sink);
        }
    }

    /// RFC 1143, receiving WONT
    fn handle_wont(&mut self, option: TelnetOption, sink: &dyn TraceSink) {
        let state = self.options.entry(option).or_default();
        let (new_him, reply) = match state.him {
            QState::No => (QState::No, None),
            QState::WantNoEmpty => (QState::No, None),
            QState::WantNoOpposite => (QState::WantYesEmpty, Some(TelnetCommand::DO)),
            QState::WantYesEmpty | QState::WantYesOpposite => (QState::No, None),
            QState::Yes => (QState::No, Some(TelnetCommand::DONT)),
        };
        state.him = new_him;
        if let Some(cmd) = reply {
            self.send_command(cmd, option as u8, sink);
        }
    }

    /// RFC 1143, receiving DO (about our side)
    fn handle_do(&mut self, option: TelnetOption, sink: &dyn TraceSink) {
        let accept = self.us_supported(option);
        let state = self.options.entry(option).or_default();
        let (new_us, reply) = match state.us {
            QState::No => {
                if accept {
                    (QState::Yes, Some(TelnetCommand::WILL))
                } else {
                    (QState::No, Some(TelnetCommand::WONT))
                }
            }
            QState::WantNoEmpty => {
                warn!("WONT {option:?} answered by DO");
                (QState::No, None)
            }
            QState::WantNoOpposite => {
                warn!("WONT {option:?} answered by DO, queue raced");
                (QState::Yes, None)
            }
            QState::WantYesEmpty => (QState::Yes, None),
            QState::WantYesOpposite => (QState::WantNoEmpty, Some(TelnetCommand::WONT)),
            QState::Yes => (QState::Yes, None),
        };
        state.us = new_us;
        if let Some(cmd) = reply {
            self.send_command(cmd, option as u8, sink);
        }
    }

    /// RFC 1143, receiving DONT
    fn handle_dont(&mut self, option: TelnetOption, sink: &dyn TraceSink) {
        let state = self.options.entry(option).or_default();
        let (new_us, reply) = match state.us {
            QState::No => (QState::No, None),
            QState::WantNoEmpty => (QState::No, None),
            QState::WantNoOpposite => (QState::WantYesEmpty, Some(TelnetCommand::WILL)),
            QState::WantYesEmpty | QState::WantYesOpposite => (QState::No, None),
            QState::Yes => (QState::No, Some(TelnetCommand::WONT)),
        };
        state.us = new_us;
        if let Some(cmd) = reply {
            self.send_command(cmd, option as u8, sink);
        }
    }

    fn handle_subnegotiation(&mut self, option: u8, payload: Vec<u8>, sink: &dyn TraceSink) {
        sink.record(TraceEvent::Subneg {
            option,
            payload_hex: crate::trace::hex_preview(&payload),
            length: payload.len(),
        });
        match TelnetOption::from_u8(option) {
            Some(TelnetOption::TerminalType) => {
                if payload.first() == Some(&TTYPE_SEND) {
                    let mut reply = vec![TTYPE_IS];
                    reply.extend_from_slice(self.terminal_type.as_bytes());
                    self.send_subnegotiation(TelnetOption::TerminalType as u8, &reply, sink);
                }
            }
            Some(TelnetOption::TN3270E) => {
                self.tn3270e_subnegs.push_back(payload);
            }
            _ => {
                debug!("unhandled subnegotiation for option {option}");
            }
        }
    }

    /// Recompute the operating mode from option state; report transitions.
    fn elect_mode(&mut self, sink: &dyn TraceSink) {
        let binary = self.is_enabled_us(TelnetOption::Binary) && self.is_enabled_him(TelnetOption::Binary);
        let eor = self.is_enabled_us(TelnetOption::EndOfRecord) && self.is_enabled_him(TelnetOption::EndOfRecord);
        let ttype = self.is_enabled_us(TelnetOption::TerminalType);
        let tn3270e = self.is_enabled_us(TelnetOption::TN3270E);

        if !tn3270e {
            self.tn3270e_bound = false;
        }

        let new_mode = if tn3270e && self.tn3270e_bound {
            OperatingMode::Tn3270e
        } else if binary && eor && ttype {
            OperatingMode::Basic3270
        } else {
            OperatingMode::Nvt
        };

        if new_mode != self.mode {
            let fallback = rank(new_mode) < rank(self.mode);
            sink.record(TraceEvent::ModeDecision {
                requested: self.mode.name(),
                chosen: new_mode.name(),
                fallback,
            });
            if fallback {
                // Downgrades drop whatever record was in flight.
                self.record_buf.clear();
            }
            self.mode = new_mode;
        }
    }
}

fn rank(mode: OperatingMode) -> u8 {
    match mode {
        OperatingMode::Nvt => 0,
        OperatingMode::Basic3270 => 1,
        OperatingMode::Tn3270e => 2,
    }
}
