//! Operator input processing
//!
//! The session-level input path: keystrokes, cursor motion and AID keys
//! applied to the presentation space between host records. Typing into a
//! protected region does not change the screen; it locks the keyboard
//! with an inhibit reason the embedder can show on its status line, the
//! way the real hardware raises X-clock symbols.

use crate::ebcdic::CodePage;
use crate::lib3270::codes::AidKey;
use crate::lib3270::display::{Display3270, InputInhibit};

/// EBCDIC bytes a numeric-only field accepts: digits, minus, period
fn is_numeric_input(ch: u8) -> bool {
    matches!(ch, 0xF0..=0xF9 | 0x60 | 0x4B)
}

/// Type one EBCDIC code point at the cursor.
///
/// Field-attribute cells auto-skip to the next data cell. A protected
/// owner or a numeric rule violation locks the keyboard with the
/// matching inhibit reason and leaves the screen untouched. Successful
/// writes set the owning field's MDT and advance the cursor, skipping
/// over an auto-skip field boundary.
pub fn type_char(display: &mut Display3270, ch: u8) -> Result<(), InputInhibit> {
    let size = display.buffer_size();
    let start = display.cursor();
    let mut addr = start;

    // Auto-skip over field attribute cells.
    while display.cell(addr).is_field_attr {
        addr = ((addr as usize + 1) % size) as u16;
        if addr == start {
            display.inhibit_input(InputInhibit::NoField);
            return Err(InputInhibit::NoField);
        }
    }

    if let Some(owner) = display.fields().owner_of(addr) {
        if owner.is_protected() {
            display.inhibit_input(InputInhibit::Protected);
            return Err(InputInhibit::Protected);
        }
        if owner.is_numeric() && !is_numeric_input(ch) {
            display.inhibit_input(InputInhibit::NumericOnly);
            return Err(InputInhibit::NumericOnly);
        }
    }

    let attrs = display.cell(addr).attrs;
    display.write_data(addr, ch, false, attrs);
    display.modify(addr);

    let mut next = ((addr as usize + 1) % size) as u16;
    if display.cell(next).is_field_attr {
        // Landing on an auto-skip attribute jumps to the next unprotected
        // field; otherwise the cursor rests on the attribute cell and the
        // next keystroke skips it.
        let auto_skip = display
            .fields()
            .field_at(next)
            .map(|f| f.is_auto_skip())
            .unwrap_or(false);
        if auto_skip {
            if let Some(target) = display.next_unprotected_data_address(next) {
                next = target;
            }
        }
    }
    display.set_cursor(next);
    Ok(())
}

/// Type a string, converting through the session code page. Stops at the
/// first inhibited keystroke.
pub fn type_string(display: &mut Display3270, text: &str, page: CodePage) -> Result<(), InputInhibit> {
    for ch in text.chars() {
        type_char(display, page.encode(ch))?;
    }
    Ok(())
}

/// Move the cursor left one position, skipping field attribute cells.
/// Non-destructive, as on the real keyboard.
pub fn backspace(display: &mut Display3270) {
    let size = display.buffer_size();
    let mut addr = display.cursor();
    for _ in 0..size {
        addr = ((addr as usize + size - 1) % size) as u16;
        if !display.cell(addr).is_field_attr {
            break;
        }
    }
    display.set_cursor(addr);
}

/// Delete the character at the cursor, closing up the remainder of the
/// field. Inhibits on a protected field.
pub fn delete(display: &mut Display3270) -> Result<(), InputInhibit> {
    let addr = display.cursor();
    if display.cell(addr).is_field_attr {
        display.inhibit_input(InputInhibit::Protected);
        return Err(InputInhibit::Protected);
    }
    if let Some(owner) = display.fields().owner_of(addr) {
        if owner.is_protected() {
            display.inhibit_input(InputInhibit::Protected);
            return Err(InputInhibit::Protected);
        }
    }

    let size = display.buffer_size();
    let end = match display.fields().owner_of(addr) {
        Some(owner) => {
            let owner = owner.clone();
            display.fields().end_of(&owner)
        }
        None => addr, // unformatted: shift through the whole buffer
    };

    let mut cur = addr;
    loop {
        let next = ((cur as usize + 1) % size) as u16;
        if next == end || display.cell(next).is_field_attr {
            let attrs = display.cell(cur).attrs;
            display.write_data(cur, 0x00, false, attrs);
            break;
        }
        let moved = *display.cell(next);
        display.write_data(cur, moved.ch, moved.ge, moved.attrs);
        cur = next;
    }
    display.modify(addr);
    Ok(())
}

/// Erase Input key: clear every unprotected field and home the cursor
pub fn erase_input(display: &mut Display3270) {
    display.erase_all_unprotected();
}

/// Tab to the next unprotected field; home on an unformatted screen
pub fn tab(display: &mut Display3270) {
    let cursor = display.cursor();
    match display.next_unprotected_data_address(cursor) {
        Some(addr) => display.set_cursor(addr),
        None => display.set_cursor(0),
    }
}

/// Back-tab: to the start of the current field if the cursor is past it,
/// otherwise to the previous unprotected field
pub fn backtab(display: &mut Display3270) {
    if display.fields().is_empty() {
        display.set_cursor(0);
        return;
    }
    let size = display.buffer_size();
    let cursor = display.cursor();

    if let Some(owner) = display.fields().owner_of(cursor) {
        let first = ((owner.address as usize + 1) % size) as u16;
        if !owner.is_protected() && first != cursor && !display.cell(cursor).is_field_attr {
            display.set_cursor(first);
            return;
        }
        // Walk back from the current field's attribute byte.
        let mut probe = owner.address;
        for _ in 0..display.fields().len() {
            probe = match display
                .fields()
                .iter()
                .filter(|f| f.address < probe)
                .next_back()
            {
                Some(f) => f.address,
                None => match display.fields().iter().next_back() {
                    Some(f) => f.address,
                    None => break,
                },
            };
            if let Some(field) = display.fields().field_at(probe) {
                if !field.is_protected() {
                    display.set_cursor(((probe as usize + 1) % size) as u16);
                    return;
                }
            }
        }
    }
    display.set_cursor(display.first_unprotected_address());
}

/// Home: first unprotected position on the screen
pub fn home(display: &mut Display3270) {
    let addr = display.first_unprotected_address();
    display.set_cursor(addr);
}

/// Move the cursor to (row, col)
pub fn move_cursor(display: &mut Display3270, row: usize, col: usize) {
    let addr = display.size().coords_to_address(row % display.rows(), col % display.cols());
    display.set_cursor(addr);
}

/// Raise an AID: freeze the AID byte and cursor for the next read and
/// lock the keyboard until the host restores it. The Clear key also
/// wipes the screen locally before its AID goes up.
pub fn key(display: &mut Display3270, aid: AidKey) {
    if aid == AidKey::Clear {
        display.clear();
    }
    display.set_aid(aid);
    display.lock_keyboard();
}

/// Convenience for embedders that stay on the default code page
pub fn type_ascii(display: &mut Display3270, text: &str) -> Result<(), InputInhibit> {
    type_string(display, text, CodePage::Cp037)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib3270::codes::*;
    use crate::lib3270::field::ExtendedAttributes;

    fn formatted_display() -> Display3270 {
        let mut display = Display3270::new();
        // Unprotected field at 0, protected field at 10
        display.set_field_attribute(0, 0x00, ExtendedAttributes::default());
        display.set_field_attribute(10, ATTR_PROTECTED, ExtendedAttributes::default());
        display.unlock_keyboard();
        display
    }

    #[test]
    fn test_type_sets_mdt_and_advances() {
        let mut display = formatted_display();
        display.set_cursor(1);
        type_char(&mut display, 0xE7).unwrap();

        assert_eq!(display.cell(1).ch, 0xE7);
        assert_eq!(display.cursor(), 2);
        assert!(display.fields().field_at(0).unwrap().is_modified());
        assert!(!display.fields().field_at(10).unwrap().is_modified());
    }

    #[test]
    fn test_type_into_protected_inhibits() {
        let mut display = formatted_display();
        display.set_cursor(11);

        assert_eq!(type_char(&mut display, 0xC1), Err(InputInhibit::Protected));
        assert_eq!(display.cell(11).ch, 0x00);
        assert!(display.is_keyboard_locked());
        assert_eq!(display.inhibit_reason(), Some(InputInhibit::Protected));
    }

    #[test]
    fn test_type_on_attribute_cell_auto_skips() {
        let mut display = formatted_display();
        display.set_cursor(0); // the attribute cell itself
        type_char(&mut display, 0xC1).unwrap();
        assert_eq!(display.cell(1).ch, 0xC1);
    }

    #[test]
    fn test_numeric_field_rejects_letters() {
        let mut display = Display3270::new();
        display.set_field_attribute(0, ATTR_NUMERIC, ExtendedAttributes::default());
        display.unlock_keyboard();
        display.set_cursor(1);

        assert_eq!(type_char(&mut display, 0xC1), Err(InputInhibit::NumericOnly));
        assert_eq!(display.inhibit_reason(), Some(InputInhibit::NumericOnly));
        assert_eq!(display.cell(1).ch, 0x00);
    }

    #[test]
    fn test_numeric_field_accepts_digits_and_signs() {
        let mut display = Display3270::new();
        display.set_field_attribute(0, ATTR_NUMERIC, ExtendedAttributes::default());
        display.unlock_keyboard();
        display.set_cursor(1);

        type_char(&mut display, 0xF5).unwrap();
        type_char(&mut display, 0x60).unwrap(); // minus
        type_char(&mut display, 0x4B).unwrap(); // period
    }

    #[test]
    fn test_auto_skip_jumps_protected_numeric_boundary() {
        let mut display = Display3270::new();
        // Unprotected field at 0 with one data cell, auto-skip attribute at
        // 2, next unprotected field at 4
        display.set_field_attribute(0, 0x00, ExtendedAttributes::default());
        display.set_field_attribute(2, ATTR_PROTECTED | ATTR_NUMERIC, ExtendedAttributes::default());
        display.set_field_attribute(4, 0x00, ExtendedAttributes::default());
        display.unlock_keyboard();
        display.set_cursor(1);

        type_char(&mut display, 0xC1).unwrap();
        assert_eq!(display.cursor(), 5);
    }

    #[test]
    fn test_type_string_round_trip() {
        let mut display = formatted_display();
        display.set_cursor(1);
        type_string(&mut display, "HI", CodePage::Cp037).unwrap();
        assert_eq!(display.cell(1).ch, 0xC8);
        assert_eq!(display.cell(2).ch, 0xC9);
    }

    #[test]
    fn test_backspace_skips_attribute() {
        let mut display = formatted_display();
        display.set_cursor(1);
        backspace(&mut display);
        // Position 0 is an attribute; backspace lands on 1919
        assert_eq!(display.cursor(), 1919);
    }

    #[test]
    fn test_delete_closes_up_field() {
        let mut display = formatted_display();
        display.set_cursor(1);
        type_ascii(&mut display, "ABC").unwrap();

        display.set_cursor(1);
        delete(&mut display).unwrap();
        assert_eq!(display.cell(1).ch, 0xC2);
        assert_eq!(display.cell(2).ch, 0xC3);
        assert_eq!(display.cell(3).ch, 0x00);
    }

    #[test]
    fn test_tab_and_home() {
        let mut display = formatted_display();
        display.set_field_attribute(20, 0x00, ExtendedAttributes::default());
        display.set_cursor(1);

        tab(&mut display);
        assert_eq!(display.cursor(), 21);
        tab(&mut display);
        assert_eq!(display.cursor(), 1); // wraps past the protected field

        display.set_cursor(50);
        home(&mut display);
        assert_eq!(display.cursor(), 1);
    }

    #[test]
    fn test_backtab_to_field_start_then_previous() {
        let mut display = formatted_display();
        display.set_field_attribute(20, 0x00, ExtendedAttributes::default());
        display.set_cursor(25);

        backtab(&mut display);
        assert_eq!(display.cursor(), 21); // start of current field

        backtab(&mut display);
        assert_eq!(display.cursor(), 1); // previous unprotected field
    }

    #[test]
    fn test_erase_input() {
        let mut display = formatted_display();
        display.set_cursor(1);
        type_ascii(&mut display, "AB").unwrap();

        erase_input(&mut display);
        assert_eq!(display.cell(1).ch, 0x00);
        assert_eq!(display.cursor(), 1);
        assert_eq!(display.fields().modified_fields().count(), 0);
    }

    #[test]
    fn test_key_freezes_aid_and_locks() {
        let mut display = formatted_display();
        display.set_cursor(5);
        key(&mut display, AidKey::Enter);

        assert_eq!(display.aid(), AidKey::Enter);
        assert_eq!(display.aid_cursor(), 5);
        assert!(display.is_keyboard_locked());
    }

    #[test]
    fn test_clear_key_wipes_screen() {
        let mut display = formatted_display();
        display.set_cursor(1);
        type_ascii(&mut display, "AB").unwrap();

        key(&mut display, AidKey::Clear);
        assert_eq!(display.cell(1).ch, 0x00);
        assert!(display.fields().is_empty());
        assert_eq!(display.aid(), AidKey::Clear);
    }

    #[test]
    fn test_move_cursor() {
        let mut display = Display3270::new();
        move_cursor(&mut display, 1, 1);
        assert_eq!(display.cursor(), 81);
    }
}
