//! 3270 Data Stream Parser
//!
//! Consumes one framed host record and applies it to the presentation
//! space. A record is one command byte, an optional Write Control
//! Character, and a run of orders and EBCDIC data.
//!
//! The parser never raises to its caller. Malformed records (truncated
//! orders, unknown order bytes) abort processing at the point of damage,
//! leave the mutations already applied, and emit an error event on the
//! trace sink; an unknown command discards the whole record the same way.
//! This mirrors the forgiveness of the real hardware.

use log::debug;

use super::codes::*;
use super::display::{CharAttrs, Display3270};
use super::field::ExtendedAttributes;
use super::sf::{self, SfAction};
use crate::trace::{TraceEvent, TraceSink};

/// Read command left pending by a record, to be answered by the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCommand {
    Buffer,
    Modified,
    ModifiedAll,
}

/// Query Reply solicited by a Read Partition structured field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRequest {
    /// Query: enumerate everything supported
    All,
    /// Query List: the requested QR codes
    List(Vec<u8>),
}

/// What a record asked of the session beyond screen mutation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    /// RB/RM/RMA wants a reply built from the screen
    pub pending_read: Option<ReadCommand>,

    /// Read Partition Query wants a Query Reply
    pub query: Option<QueryRequest>,

    /// Set Reply Mode selected a new reply mode
    pub reply_mode: Option<u8>,

    /// WCC requested the printer be started
    pub start_printer: bool,
}

/// Parse one inbound record against the display.
pub fn parse_record(record: &[u8], display: &mut Display3270, sink: &dyn TraceSink) -> ParseOutcome {
    let mut parser = DataStreamParser {
        data: record,
        pos: 0,
        display,
        sink,
        addr: 0,
        ic_cursor: None,
        char_attrs: CharAttrs::default(),
        ge_pending: false,
        last_was_data: false,
        outcome: ParseOutcome::default(),
    };
    parser.parse();
    parser.outcome
}

struct DataStreamParser<'a> {
    data: &'a [u8],
    pos: usize,
    display: &'a mut Display3270,
    sink: &'a dyn TraceSink,

    /// Write pointer (buffer address), distinct from the cursor
    addr: u16,

    /// Cursor requested by an IC order, applied when the record ends
    ic_cursor: Option<u16>,

    /// Character attributes scoped by SA orders, until end of record
    char_attrs: CharAttrs,

    /// A GE order arms the alternate set for exactly one data byte
    ge_pending: bool,

    /// PT nulls the rest of the field only when it follows data
    last_was_data: bool,

    outcome: ParseOutcome,
}

impl<'a> DataStreamParser<'a> {
    fn parse(&mut self) {
        let Some(&cmd_byte) = self.data.first() else {
            return;
        };
        self.pos = 1;

        let Some(command) = CommandCode::from_u8(cmd_byte) else {
            self.diagnostic(format!("unknown command 0x{cmd_byte:02X}, record discarded"));
            return;
        };

        self.sink.record(TraceEvent::Order {
            command: command_name(command),
            address: 0,
            length: self.data.len(),
        });

        match command {
            CommandCode::Write => self.process_write(false, false),
            CommandCode::EraseWrite => self.process_write(true, false),
            CommandCode::EraseWriteAlternate => self.process_write(true, true),
            CommandCode::ReadBuffer => self.outcome.pending_read = Some(ReadCommand::Buffer),
            CommandCode::ReadModified => self.outcome.pending_read = Some(ReadCommand::Modified),
            CommandCode::ReadModifiedAll => {
                self.outcome.pending_read = Some(ReadCommand::ModifiedAll)
            }
            CommandCode::EraseAllUnprotected => {
                self.display.erase_all_unprotected();
            }
            CommandCode::WriteStructuredField => self.process_structured_fields(),
        }
    }

    /// Write, Erase/Write or Erase/Write Alternate
    fn process_write(&mut self, erase: bool, alternate: bool) {
        // A write means the host consumed the last operator input.
        self.display.clear_aid();
        self.display.lock_keyboard();

        let Some(wcc) = self.next_byte() else {
            self.diagnostic("record ends before WCC".into());
            return;
        };

        if erase {
            let size = if alternate {
                self.display.alternate_size()
            } else {
                self.display.default_size()
            };
            self.display.resize(size);
        }

        if (wcc & WCC_ALARM) != 0 {
            self.display.set_alarm(true);
        }
        if (wcc & WCC_START_PRINTER) != 0 {
            self.outcome.start_printer = true;
        }

        self.addr = self.display.cursor();
        self.process_orders_and_data();

        // The cursor follows the write pointer unless IC pinned it.
        let cursor = self.ic_cursor.unwrap_or(self.addr);
        self.display.set_cursor(cursor);

        // Keyboard restore and MDT reset take effect after the orders.
        if (wcc & WCC_RESTORE) != 0 {
            self.display.unlock_keyboard();
        }
        if (wcc & WCC_RESET_MDT) != 0 {
            self.display.reset_mdt();
        }
    }

    fn process_orders_and_data(&mut self) {
        while self.pos < self.data.len() {
            let byte = self.data[self.pos];
            // NUL is a data byte (the empty cell); everything else below
            // 0x40 is order space.
            if byte >= 0x40 || byte == 0x00 {
                self.pos += 1;
                let ge = self.ge_pending;
                self.ge_pending = false;
                self.display.write_data(self.addr, byte, ge, self.char_attrs);
                self.addr = self.display.wrap(self.addr as usize + 1);
                self.last_was_data = true;
                continue;
            }

            // Everything below 0x40 is an order (or a hole in the order set).
            let Some(order) = OrderCode::from_u8(byte) else {
                self.diagnostic(format!("unknown order 0x{byte:02X}, record aborted"));
                self.pos = self.data.len();
                return;
            };
            self.pos += 1;

            // GE is a no-op when an order follows it.
            if order != OrderCode::GraphicEscape {
                self.ge_pending = false;
            }

            if !self.process_order(order) {
                // Truncated order: discard the remainder, keep the state.
                self.pos = self.data.len();
                return;
            }
            if order != OrderCode::ProgramTab {
                self.last_was_data = false;
            }
        }
    }

    /// Returns false when the record ended inside the order's operands.
    fn process_order(&mut self, order: OrderCode) -> bool {
        match order {
            OrderCode::SetBufferAddress => {
                let Some(address) = self.read_address() else {
                    return self.truncated(ORDER_SBA);
                };
                self.sink.record(TraceEvent::Order {
                    command: "SBA",
                    address,
                    length: 0,
                });
                self.addr = address;
                true
            }
            OrderCode::StartField => {
                let Some(attr) = self.next_byte() else {
                    return self.truncated(ORDER_SF);
                };
                self.display
                    .set_field_attribute(self.addr, attr, ExtendedAttributes::default());
                self.addr = self.display.wrap(self.addr as usize + 1);
                true
            }
            OrderCode::StartFieldExtended => self.process_start_field_extended(),
            OrderCode::SetAttribute => {
                let (Some(attr_type), Some(value)) = (self.next_byte(), self.next_byte()) else {
                    return self.truncated(ORDER_SA);
                };
                if !self.char_attrs.apply(attr_type, value) {
                    self.diagnostic(format!("SA with unsupported attribute type 0x{attr_type:02X}"));
                }
                true
            }
            OrderCode::ModifyField => self.process_modify_field(),
            OrderCode::InsertCursor => {
                self.ic_cursor = Some(self.addr);
                true
            }
            OrderCode::ProgramTab => {
                self.process_program_tab();
                true
            }
            OrderCode::RepeatToAddress => self.process_repeat_to_address(),
            OrderCode::EraseUnprotectedToAddress => {
                let Some(stop) = self.read_address() else {
                    return self.truncated(ORDER_EUA);
                };
                self.display.erase_unprotected_to(self.addr, stop);
                self.addr = stop;
                true
            }
            OrderCode::GraphicEscape => {
                self.ge_pending = true;
                true
            }
        }
    }

    fn process_start_field_extended(&mut self) -> bool {
        let Some(count) = self.next_byte() else {
            return self.truncated(ORDER_SFE);
        };
        let mut base_attr = 0u8;
        let mut extended = ExtendedAttributes::new();
        for _ in 0..count {
            let (Some(attr_type), Some(value)) = (self.next_byte(), self.next_byte()) else {
                return self.truncated(ORDER_SFE);
            };
            if attr_type == XA_3270 {
                base_attr = value;
            } else if !extended.apply(attr_type, value) {
                // Unknown attribute type: skip the pair, keep going.
                debug!("SFE: skipping unknown attribute type 0x{attr_type:02X}");
            }
        }
        self.display.set_field_attribute(self.addr, base_attr, extended);
        self.addr = self.display.wrap(self.addr as usize + 1);
        true
    }

    /// MF updates the field whose attribute byte is at the write pointer.
    fn process_modify_field(&mut self) -> bool {
        let Some(count) = self.next_byte() else {
            return self.truncated(ORDER_MF);
        };
        if !self.display.cell(self.addr).is_field_attr {
            self.diagnostic(format!("MF at 0x{:04X}, not a field attribute", self.addr));
            // Operands still have to be consumed to stay in sync.
            for _ in 0..count {
                if self.next_byte().is_none() || self.next_byte().is_none() {
                    return self.truncated(ORDER_MF);
                }
            }
            return true;
        }

        let addr = self.addr;
        for _ in 0..count {
            let (Some(attr_type), Some(value)) = (self.next_byte(), self.next_byte()) else {
                return self.truncated(ORDER_MF);
            };
            if attr_type == XA_3270 {
                if let Some(field) = self.display.fields_mut().owner_of_mut(addr) {
                    field.base_attr = value;
                }
                // The attribute cell mirrors the base attribute.
                let extended = self
                    .display
                    .fields()
                    .field_at(addr)
                    .map(|f| f.extended.clone())
                    .unwrap_or_default();
                self.display.set_field_attribute(addr, value, extended);
            } else if let Some(field) = self.display.fields_mut().owner_of_mut(addr) {
                if !field.extended.apply(attr_type, value) {
                    debug!("MF: skipping unknown attribute type 0x{attr_type:02X}");
                }
            }
        }
        self.addr = self.display.wrap(addr as usize + 1);
        true
    }

    fn process_program_tab(&mut self) {
        // PT after data nulls the remainder of the current field first.
        if self.last_was_data && !self.display.fields().is_empty() {
            if let Some(field) = self.display.fields().owner_of(self.addr) {
                let end = self.display.fields().end_of(field);
                let size = self.display.buffer_size();
                let mut addr = self.addr;
                while addr != end {
                    if !self.display.cell(addr).is_field_attr {
                        self.display.write_data(addr, 0x00, false, CharAttrs::default());
                    }
                    addr = ((addr as usize + 1) % size) as u16;
                    if addr == self.addr {
                        break;
                    }
                }
            }
        }
        match self.display.next_unprotected_data_address(self.addr) {
            Some(next) => self.addr = next,
            None => {
                // No unprotected field: the pointer stays put.
            }
        }
    }

    fn process_repeat_to_address(&mut self) -> bool {
        let Some(stop) = self.read_address() else {
            return self.truncated(ORDER_RA);
        };
        let Some(mut fill) = self.next_byte() else {
            return self.truncated(ORDER_RA);
        };
        let mut ge = false;
        if fill == ORDER_GE {
            let Some(ge_fill) = self.next_byte() else {
                return self.truncated(ORDER_RA);
            };
            fill = ge_fill;
            ge = true;
        }
        self.sink.record(TraceEvent::Order {
            command: "RA",
            address: stop,
            length: 0,
        });
        self.display.repeat_to(self.addr, stop, fill, ge, self.char_attrs);
        self.addr = stop;
        true
    }

    fn process_structured_fields(&mut self) {
        let body = &self.data[self.pos..];
        for action in sf::parse_outbound(body, self.sink) {
            match action {
                SfAction::Query(request) => self.outcome.query = Some(request),
                SfAction::SetReplyMode(mode) => self.outcome.reply_mode = Some(mode),
                SfAction::EraseReset => {
                    let size = self.display.default_size();
                    self.display.resize(size);
                    self.display.unlock_keyboard();
                }
                SfAction::Outbound3270Ds(inner) => {
                    let nested = parse_record(&inner, self.display, self.sink);
                    if nested.pending_read.is_some() {
                        self.outcome.pending_read = nested.pending_read;
                    }
                    if nested.query.is_some() {
                        self.outcome.query = nested.query;
                    }
                }
            }
        }
        self.pos = self.data.len();
    }

    fn next_byte(&mut self) -> Option<u8> {
        let byte = self.data.get(self.pos).copied();
        if byte.is_some() {
            self.pos += 1;
        }
        byte
    }

    /// Two-byte buffer address, wrapped into the current buffer
    fn read_address(&mut self) -> Option<u16> {
        let b1 = self.next_byte()?;
        let b2 = self.next_byte()?;
        let raw = super::addressing::decode_address(b1, b2);
        Some(self.display.wrap(raw as usize))
    }

    fn truncated(&mut self, order: u8) -> bool {
        self.diagnostic(format!("order 0x{order:02X} truncated, record aborted"));
        false
    }

    fn diagnostic(&mut self, message: String) {
        debug!("parser: {message}");
        self.sink.record(TraceEvent::Error { message });
    }
}

fn command_name(command: CommandCode) -> &'static str {
    match command {
        CommandCode::Write => "W",
        CommandCode::EraseWrite => "EW",
        CommandCode::EraseWriteAlternate => "EWA",
        CommandCode::ReadBuffer => "RB",
        CommandCode::ReadModified => "RM",
        CommandCode::ReadModifiedAll => "RMA",
        CommandCode::EraseAllUnprotected => "EAU",
        CommandCode::WriteStructuredField => "WSF",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib3270::display::ScreenSize;
    use crate::trace::{NopSink, TraceRecorder};

    fn parse(record: &[u8], display: &mut Display3270) -> ParseOutcome {
        parse_record(record, display, &NopSink)
    }

    #[test]
    fn test_erase_write_with_data() {
        let mut display = Display3270::new();
        // EW, WCC keyboard-restore + reset-MDT, 'A', 'B'
        parse(&[0xF5, 0xC3, 0xC1, 0xC2], &mut display);

        assert_eq!(display.cell(0).ch, 0xC1);
        assert_eq!(display.cell(1).ch, 0xC2);
        assert_eq!(display.cursor(), 2);
        assert!(!display.is_keyboard_locked());
        assert!(display.fields().is_empty());
    }

    #[test]
    fn test_sba_then_data() {
        let mut display = Display3270::new();
        // EW, WCC, SBA (0,10), 'H', 'I'
        parse(&[0xF5, 0xC3, 0x11, 0x40, 0x4A, 0xC8, 0xC9], &mut display);

        assert_eq!(display.cell(10).ch, 0xC8);
        assert_eq!(display.cell(11).ch, 0xC9);
        assert_eq!(display.cursor(), 12);
    }

    #[test]
    fn test_start_field_protected() {
        let mut display = Display3270::new();
        // EW, WCC, SF protected, 'A'
        parse(&[0xF5, 0xC3, 0x1D, 0xF0, 0xC1], &mut display);

        assert!(display.cell(0).is_field_attr);
        assert!(display.fields().field_at(0).unwrap().is_protected());
        assert_eq!(display.cell(1).ch, 0xC1);
        assert_eq!(display.fields().len(), 1);
    }

    #[test]
    fn test_repeat_to_address_full_buffer() {
        let mut display = Display3270::new();
        // EW, WCC, RA to 0 (14-bit 00 00), fill space
        parse(&[0xF5, 0xC3, 0x3C, 0x00, 0x00, 0x40], &mut display);

        assert!((0..1920).all(|a| display.cell(a).ch == 0x40));
    }

    #[test]
    fn test_repeat_to_address_ge_fill() {
        let mut display = Display3270::new();
        // RA with GE-prefixed fill byte
        parse(&[0xF5, 0xC3, 0x3C, 0x40, 0x45, 0x08, 0xAD], &mut display);
        assert_eq!(display.cell(0).ch, 0xAD);
        assert!(display.cell(0).ge);
        assert_eq!(display.cell(5).ch, 0x00); // stop exclusive
    }

    #[test]
    fn test_write_keeps_buffer() {
        let mut display = Display3270::new();
        parse(&[0xF5, 0xC3, 0xC1, 0xC2], &mut display);
        // Plain Write starts at the cursor without erasing
        parse(&[0xF1, 0xC3, 0xC7], &mut display);

        assert_eq!(display.cell(0).ch, 0xC1); // survived
        assert_eq!(display.cell(2).ch, 0xC7); // cursor was at 2
    }

    #[test]
    fn test_erase_write_resets_alternate_size() {
        let mut display = Display3270::new();
        display.set_alternate_size(ScreenSize::Model4);

        parse(&[0x7E, 0xC3], &mut display); // EWA
        assert_eq!(display.buffer_size(), 3440);

        parse(&[0xF5, 0xC3], &mut display); // EW back to default
        assert_eq!(display.buffer_size(), 1920);
    }

    #[test]
    fn test_insert_cursor() {
        let mut display = Display3270::new();
        // SBA to 100, IC, then data moves the pointer but not the cursor
        parse(&[0xF5, 0xC3, 0x11, 0x41, 0x64, 0x13, 0xC1], &mut display);
        assert_eq!(display.cursor(), 100);
        assert_eq!(display.cell(100).ch, 0xC1);
    }

    #[test]
    fn test_sfe_extended_attributes() {
        let mut display = Display3270::new();
        // SFE with 3 pairs: 3270 attr, foreground red, highlight blink
        parse(
            &[0xF5, 0xC3, 0x29, 0x03, 0xC0, 0x20, 0x42, 0xF2, 0x41, 0xF1],
            &mut display,
        );

        let field = display.fields().field_at(0).unwrap();
        assert!(field.is_protected());
        assert_eq!(field.extended.foreground_color, Some(0xF2));
        assert_eq!(field.extended.highlighting, Some(0xF1));
    }

    #[test]
    fn test_sfe_unknown_pair_skipped() {
        let mut display = Display3270::new();
        parse(
            &[0xF5, 0xC3, 0x29, 0x02, 0x99, 0x01, 0xC0, 0x20, 0xC1],
            &mut display,
        );
        assert!(display.fields().field_at(0).unwrap().is_protected());
        assert_eq!(display.cell(1).ch, 0xC1);
    }

    #[test]
    fn test_sa_scopes_until_end_of_record() {
        let mut display = Display3270::new();
        // SA foreground red, 'A', SA foreground default-reset via XA_ALL, 'B'
        parse(
            &[0xF5, 0xC3, 0x28, 0x42, 0xF2, 0xC1, 0x28, 0x00, 0x00, 0xC2],
            &mut display,
        );
        assert_eq!(display.cell(0).attrs.foreground, Some(0xF2));
        assert!(display.cell(1).attrs.is_default());
    }

    #[test]
    fn test_ge_flags_one_data_byte() {
        let mut display = Display3270::new();
        parse(&[0xF5, 0xC3, 0x08, 0xC1, 0xC2], &mut display);
        assert!(display.cell(0).ge);
        assert!(!display.cell(1).ge);
    }

    #[test]
    fn test_ge_before_order_is_noop() {
        let mut display = Display3270::new();
        // GE immediately followed by SBA, then data: GE must not leak
        parse(&[0xF5, 0xC3, 0x08, 0x11, 0x40, 0x4A, 0xC1], &mut display);
        assert_eq!(display.cell(10).ch, 0xC1);
        assert!(!display.cell(10).ge);
    }

    #[test]
    fn test_program_tab_moves_to_unprotected() {
        let mut display = Display3270::new();
        // SF protected at 0, SF unprotected at 10, PT from 1
        parse(
            &[
                0xF5, 0xC3, 0x1D, 0xF0, // protected field at 0
                0x11, 0x40, 0x4A, 0x1D, 0x40, // unprotected field at 10
                0x11, 0x40, 0x41, // SBA 1
                0x05, // PT
                0xC1, // data lands at 11
            ],
            &mut display,
        );
        assert_eq!(display.cell(11).ch, 0xC1);
    }

    #[test]
    fn test_eua_clears_only_unprotected() {
        let mut display = Display3270::new();
        parse(
            &[
                0xF5, 0xC3, 0x1D, 0x40, 0xC1, 0xC2, // unprotected field, "AB"
                0x11, 0x40, 0x4A, 0x1D, 0xF0, 0xC3, // protected field at 10, "C"
            ],
            &mut display,
        );
        // EUA from 0 across the whole screen
        parse(&[0xF1, 0x00, 0x11, 0x40, 0x40, 0x12, 0x00, 0x00], &mut display);

        assert_eq!(display.cell(1).ch, 0x00);
        assert_eq!(display.cell(2).ch, 0x00);
        assert_eq!(display.cell(11).ch, 0xC3); // protected survives
    }

    #[test]
    fn test_erase_all_unprotected_command() {
        let mut display = Display3270::new();
        parse(&[0xF5, 0xC3, 0x1D, 0x40, 0xC1], &mut display);
        display.modify(1);
        assert_eq!(display.fields().modified_fields().count(), 1);

        parse(&[0x6F], &mut display);
        assert_eq!(display.cell(1).ch, 0x00);
        assert_eq!(display.fields().modified_fields().count(), 0);
        assert_eq!(display.cursor(), 1);
    }

    #[test]
    fn test_read_commands_set_pending() {
        let mut display = Display3270::new();
        assert_eq!(parse(&[0xF2], &mut display).pending_read, Some(ReadCommand::Buffer));
        assert_eq!(parse(&[0xF6], &mut display).pending_read, Some(ReadCommand::Modified));
        assert_eq!(parse(&[0x6E], &mut display).pending_read, Some(ReadCommand::ModifiedAll));
    }

    #[test]
    fn test_unknown_command_discards_record() {
        let mut display = Display3270::new();
        let recorder = TraceRecorder::new();
        let outcome = parse_record(&[0xAA, 0xC3, 0xC1], &mut display, &recorder);
        assert_eq!(outcome, ParseOutcome::default());
        assert_eq!(display.cell(0).ch, 0x00);
        assert!(recorder
            .events()
            .iter()
            .any(|e| matches!(&e.event, TraceEvent::Error { .. })));
    }

    #[test]
    fn test_unknown_order_aborts_keeping_state() {
        let mut display = Display3270::new();
        let recorder = TraceRecorder::new();
        // 'A' applied, then order 0x3F (unknown) aborts before 'B'
        parse_record(&[0xF5, 0xC3, 0xC1, 0x3F, 0xC2], &mut display, &recorder);
        assert_eq!(display.cell(0).ch, 0xC1);
        assert_eq!(display.cell(1).ch, 0x00);
        assert!(!recorder.is_empty());
    }

    #[test]
    fn test_truncated_order_keeps_applied_state() {
        let mut display = Display3270::new();
        // SBA missing its second address byte
        parse(&[0xF5, 0xC3, 0xC1, 0x11, 0x40], &mut display);
        assert_eq!(display.cell(0).ch, 0xC1);
    }

    #[test]
    fn test_host_write_does_not_set_mdt() {
        let mut display = Display3270::new();
        parse(&[0xF5, 0xC3, 0x1D, 0x40, 0xC1, 0xC2], &mut display);
        assert_eq!(display.fields().modified_fields().count(), 0);
    }

    #[test]
    fn test_wcc_reset_mdt_applies_after_orders() {
        let mut display = Display3270::new();
        parse(&[0xF5, 0xC3, 0x1D, 0x40, 0xC1], &mut display);
        display.modify(1);

        // Write with reset-MDT WCC
        parse(&[0xF1, 0x01], &mut display);
        assert_eq!(display.fields().modified_fields().count(), 0);
    }

    #[test]
    fn test_write_clears_aid_state() {
        let mut display = Display3270::new();
        display.set_aid(AidKey::Enter);
        parse(&[0xF1, 0x00], &mut display);
        assert_eq!(display.aid(), AidKey::NoAid);
    }

    #[test]
    fn test_modify_field_updates_in_place() {
        let mut display = Display3270::new();
        parse(&[0xF5, 0xC3, 0x1D, 0x40, 0xC1], &mut display);
        // SBA back to the attribute cell, MF to protected
        parse(&[0xF1, 0x00, 0x11, 0x40, 0x40, 0x2C, 0x01, 0xC0, 0x20], &mut display);

        let field = display.fields().field_at(0).unwrap();
        assert!(field.is_protected());
        assert_eq!(display.fields().len(), 1);
    }
}
