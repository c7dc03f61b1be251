//! Outbound 3270 data-stream generation
//!
//! Builds the terminal-to-host replies for Read Buffer, Read Modified and
//! Read Modified All. Replies open with the frozen AID and (except for
//! short-read AIDs) the cursor address in the session's negotiated
//! address width. A successful Read Modified or Read Modified All reply
//! clears MDT on every field.

use super::addressing::{encode_address, AddressMode};
use super::codes::*;
use super::display::{CharAttrs, Display3270};
use super::field::Field;

/// Read Buffer: AID + cursor + the full buffer in natural order.
///
/// Field attributes are re-encoded as inline SF orders at their
/// positions; character attributes become SA orders wherever they change
/// between cells; GE cells carry their Graphic Escape prefix. The full
/// buffer is always sent, trailing nulls included.
pub fn build_read_buffer(display: &Display3270, mode: AddressMode) -> Vec<u8> {
    let mut out = reply_header(display, mode);
    let mut current = CharAttrs::default();

    for addr in 0..display.buffer_size() as u16 {
        let cell = display.cell(addr);
        if cell.is_field_attr {
            out.push(ORDER_SF);
            out.push(cell.ch);
            continue;
        }
        push_attr_transitions(&mut out, &current, &cell.attrs);
        current = cell.attrs;
        if cell.ge {
            out.push(ORDER_GE);
        }
        out.push(cell.ch);
    }
    out
}

/// Read Modified: AID, cursor and the modified fields.
///
/// Clear and SysReq reply with the AID alone; PA keys with AID and
/// cursor. On a formatted screen each MDT field contributes an SBA to
/// its first data cell followed by its non-null data; an unformatted
/// screen contributes all non-null data with no SBA. Clears MDT.
pub fn build_read_modified(display: &mut Display3270, mode: AddressMode) -> Vec<u8> {
    build_modified_reply(display, mode, false)
}

/// Read Modified All: as Read Modified but every field is included
/// regardless of its MDT bit. Clears MDT.
pub fn build_read_modified_all(display: &mut Display3270, mode: AddressMode) -> Vec<u8> {
    build_modified_reply(display, mode, true)
}

fn build_modified_reply(display: &mut Display3270, mode: AddressMode, all_fields: bool) -> Vec<u8> {
    let aid = display.aid();
    let mut out = vec![aid.to_u8()];

    if aid == AidKey::Clear || aid == AidKey::SysReq {
        display.reset_mdt();
        return out;
    }

    let (c1, c2) = encode_address(reply_cursor(display), mode);
    out.push(c1);
    out.push(c2);

    if matches!(aid, AidKey::PA1 | AidKey::PA2 | AidKey::PA3) {
        display.reset_mdt();
        return out;
    }

    if display.fields().is_empty() {
        // Unformatted screen: all non-null data, no SBA orders.
        for addr in 0..display.buffer_size() as u16 {
            let cell = display.cell(addr);
            if cell.ch != 0x00 {
                if cell.ge {
                    out.push(ORDER_GE);
                }
                out.push(cell.ch);
            }
        }
    } else {
        let fields: Vec<Field> = display
            .fields()
            .iter()
            .filter(|f| all_fields || f.is_modified())
            .cloned()
            .collect();
        for field in fields {
            let start = display.fields().first_data_address(&field, display.buffer_size());
            out.push(ORDER_SBA);
            let (a1, a2) = encode_address(start, mode);
            out.push(a1);
            out.push(a2);
            push_field_data(&mut out, display, &field);
        }
    }

    display.reset_mdt();
    out
}

/// AID byte plus cursor address in the negotiated width
fn reply_header(display: &Display3270, mode: AddressMode) -> Vec<u8> {
    let mut out = vec![display.aid().to_u8()];
    let (c1, c2) = encode_address(reply_cursor(display), mode);
    out.push(c1);
    out.push(c2);
    out
}

/// The cursor frozen with the AID, or the live cursor when no AID is up
fn reply_cursor(display: &Display3270) -> u16 {
    if display.aid() == AidKey::NoAid {
        display.cursor()
    } else {
        display.aid_cursor()
    }
}

/// Non-null data bytes of a field, from its first data cell to the next
/// field attribute, wrapping once
fn push_field_data(out: &mut Vec<u8>, display: &Display3270, field: &Field) {
    let size = display.buffer_size();
    let start = (field.address as usize + 1) % size;
    let end = display.fields().end_of(field) as usize;
    let mut addr = start;
    while addr != end {
        let cell = display.cell(addr as u16);
        if !cell.is_field_attr && cell.ch != 0x00 {
            if cell.ge {
                out.push(ORDER_GE);
            }
            out.push(cell.ch);
        }
        addr = (addr + 1) % size;
    }
}

/// Emit SA orders for every attribute that differs between two cells
fn push_attr_transitions(out: &mut Vec<u8>, from: &CharAttrs, to: &CharAttrs) {
    if from == to {
        return;
    }
    if to.is_default() {
        out.push(ORDER_SA);
        out.push(XA_ALL);
        out.push(0x00);
        return;
    }
    for (attr_type, old, new) in [
        (XA_FOREGROUND, from.foreground, to.foreground),
        (XA_BACKGROUND, from.background, to.background),
        (XA_HIGHLIGHTING, from.highlighting, to.highlighting),
        (XA_CHARSET, from.charset, to.charset),
        (XA_TRANSPARENCY, from.transparency, to.transparency),
    ] {
        if old != new {
            out.push(ORDER_SA);
            out.push(attr_type);
            out.push(new.unwrap_or(0x00));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib3270::parser::parse_record;
    use crate::trace::NopSink;

    fn host(record: &[u8], display: &mut Display3270) {
        parse_record(record, display, &NopSink);
    }

    #[test]
    fn test_read_buffer_layout() {
        let mut display = Display3270::new();
        host(&[0xF5, 0xC3, 0xC1, 0xC2], &mut display);
        display.set_aid(AidKey::Enter);

        let reply = build_read_buffer(&display, AddressMode::Twelve);
        assert_eq!(reply[0], AID_ENTER);
        // cursor 2 in 12-bit coding
        assert_eq!((reply[1], reply[2]), (0x40, 0x42));
        assert_eq!(reply[3], 0xC1);
        assert_eq!(reply[4], 0xC2);
        // full buffer: AID + cursor + 1920 cells (no attrs, no SA runs)
        assert_eq!(reply.len(), 3 + 1920);
    }

    #[test]
    fn test_read_buffer_inlines_field_attributes() {
        let mut display = Display3270::new();
        host(&[0xF5, 0xC3, 0x1D, 0xF0, 0xC1], &mut display);

        let reply = build_read_buffer(&display, AddressMode::Twelve);
        // cell 0 re-encoded as SF order + attribute byte
        assert_eq!(reply[3], ORDER_SF);
        assert_eq!(reply[4], 0xF0);
        assert_eq!(reply[5], 0xC1);
    }

    #[test]
    fn test_read_buffer_emits_sa_transitions() {
        let mut display = Display3270::new();
        host(&[0xF5, 0xC3, 0x28, 0x42, 0xF2, 0xC1, 0x28, 0x00, 0x00, 0xC2], &mut display);

        let reply = build_read_buffer(&display, AddressMode::Twelve);
        // SA foreground red before 'A', SA reset before 'B'
        assert_eq!(&reply[3..9], &[ORDER_SA, XA_FOREGROUND, 0xF2, 0xC1, ORDER_SA, XA_ALL]);
    }

    #[test]
    fn test_read_modified_enter_with_typed_field() {
        let mut display = Display3270::new();
        // Unprotected field at 0, protected field at 10
        host(&[0xF5, 0xC3, 0x1D, 0x40, 0x11, 0x40, 0x4A, 0x1D, 0xF0], &mut display);

        // Operator types 'X' at address 1
        display.write_data(1, 0xE7, false, CharAttrs::default());
        display.modify(1);
        display.set_cursor(2);
        display.set_aid(AidKey::Enter);

        let reply = build_read_modified(&mut display, AddressMode::Twelve);
        assert_eq!(
            reply,
            vec![AID_ENTER, 0x40, 0x42, ORDER_SBA, 0x40, 0x41, 0xE7]
        );
        // MDT cleared by the reply
        assert_eq!(display.fields().modified_fields().count(), 0);
    }

    #[test]
    fn test_read_modified_clear_is_aid_only() {
        let mut display = Display3270::new();
        host(&[0xF5, 0xC3, 0x1D, 0x40, 0xC1], &mut display);
        display.modify(1);
        display.set_aid(AidKey::Clear);

        let reply = build_read_modified(&mut display, AddressMode::Twelve);
        assert_eq!(reply, vec![AID_CLEAR]);
    }

    #[test]
    fn test_read_modified_pa_is_aid_and_cursor() {
        let mut display = Display3270::new();
        display.set_cursor(5);
        display.set_aid(AidKey::PA1);

        let reply = build_read_modified(&mut display, AddressMode::Twelve);
        assert_eq!(reply, vec![AID_PA1, 0x40, 0x45]);
    }

    #[test]
    fn test_read_modified_unformatted_screen() {
        let mut display = Display3270::new();
        host(&[0xF5, 0xC3, 0xC8, 0xC9], &mut display);
        display.set_aid(AidKey::Enter);

        let reply = build_read_modified(&mut display, AddressMode::Twelve);
        assert_eq!(reply, vec![AID_ENTER, 0x40, 0x42, 0xC8, 0xC9]);
    }

    #[test]
    fn test_read_modified_all_ignores_mdt() {
        let mut display = Display3270::new();
        host(
            &[0xF5, 0xC3, 0x1D, 0x40, 0xC1, 0x11, 0x40, 0x4A, 0x1D, 0x40, 0xC2],
            &mut display,
        );
        // No operator input: no MDT anywhere
        display.set_aid(AidKey::Enter);

        let rm = build_read_modified(&mut display, AddressMode::Twelve);
        assert_eq!(rm.len(), 3); // AID + cursor only

        display.set_aid(AidKey::Enter);
        let rma = build_read_modified_all(&mut display, AddressMode::Twelve);
        // Both fields present with their data
        assert!(rma.len() > 3);
        assert_eq!(rma.iter().filter(|&&b| b == ORDER_SBA).count(), 2);
    }

    #[test]
    fn test_no_aid_reply_uses_live_cursor() {
        let mut display = Display3270::new();
        display.set_cursor(7);

        let reply = build_read_buffer(&display, AddressMode::Twelve);
        assert_eq!(reply[0], AID_NO_AID);
        assert_eq!((reply[1], reply[2]), (0x40, 0x47));
    }
}
