//! TN3270 Presentation Space
//!
//! The presentation space is a linear buffer of cells addressed row-major,
//! with the field chain, cursor, keyboard lock and AID state that make up
//! the authoritative screen model. The data-stream parser mutates it on
//! behalf of the host; the operator input processor mutates it on behalf
//! of the keyboard; the outbound writer reads it to build replies.

use serde::{Deserialize, Serialize};

use super::codes::*;
use super::field::{ExtendedAttributes, Field, FieldChain};
use crate::ebcdic::CodePage;

/// Standard 3270 screen sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScreenSize {
    /// Model 2: 24 rows x 80 columns (1920 characters)
    Model2,
    /// Model 3: 32 rows x 80 columns (2560 characters)
    Model3,
    /// Model 4: 43 rows x 80 columns (3440 characters)
    Model4,
    /// Model 5: 27 rows x 132 columns (3564 characters)
    Model5,
    /// Host-defined size (BIND-IMAGE alternate presentation space)
    Custom { rows: u16, cols: u16 },
}

impl ScreenSize {
    /// Screen size for a negotiated model number (2-5)
    pub fn from_model(model: u8) -> Option<Self> {
        match model {
            2 => Some(Self::Model2),
            3 => Some(Self::Model3),
            4 => Some(Self::Model4),
            5 => Some(Self::Model5),
            _ => None,
        }
    }

    /// Number of rows for this screen size
    pub fn rows(&self) -> usize {
        match self {
            Self::Model2 => 24,
            Self::Model3 => 32,
            Self::Model4 => 43,
            Self::Model5 => 27,
            Self::Custom { rows, .. } => *rows as usize,
        }
    }

    /// Number of columns for this screen size
    pub fn cols(&self) -> usize {
        match self {
            Self::Model2 | Self::Model3 | Self::Model4 => 80,
            Self::Model5 => 132,
            Self::Custom { cols, .. } => *cols as usize,
        }
    }

    /// Total buffer size (rows * cols)
    pub fn buffer_size(&self) -> usize {
        self.rows() * self.cols()
    }

    /// Convert buffer address to (row, col) coordinates
    pub fn address_to_coords(&self, address: u16) -> (usize, usize) {
        let addr = address as usize;
        (addr / self.cols(), addr % self.cols())
    }

    /// Convert (row, col) coordinates to buffer address
    pub fn coords_to_address(&self, row: usize, col: usize) -> u16 {
        ((row * self.cols()) + col) as u16
    }
}

/// Character attributes applied per cell by the SA order (and mirrored
/// from SFE for rendering). Unset values inherit from the owning field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharAttrs {
    pub foreground: Option<u8>,
    pub background: Option<u8>,
    pub highlighting: Option<u8>,
    pub charset: Option<u8>,
    pub transparency: Option<u8>,
}

impl CharAttrs {
    /// Apply one (type, value) pair; `XA_ALL` with value 0 resets the set.
    /// Returns false for types not tracked per cell.
    pub fn apply(&mut self, attr_type: u8, value: u8) -> bool {
        match attr_type {
            XA_ALL => *self = Self::default(),
            XA_FOREGROUND => self.foreground = Some(value),
            XA_BACKGROUND => self.background = Some(value),
            XA_HIGHLIGHTING => self.highlighting = Some(value),
            XA_CHARSET => self.charset = Some(value),
            XA_TRANSPARENCY => self.transparency = Some(value),
            _ => return false,
        }
        true
    }

    /// True when every attribute is unset
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// One cell of the presentation space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cell {
    /// EBCDIC code point (the attribute byte when `is_field_attr` is set)
    pub ch: u8,

    /// The cell holds a field attribute, not data
    pub is_field_attr: bool,

    /// Written through Graphic Escape (alternate character set)
    pub ge: bool,

    /// Per-cell character attributes from SA orders
    pub attrs: CharAttrs,
}

/// Reason the keyboard is input-inhibited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputInhibit {
    /// Keystroke landed in a protected field
    Protected,
    /// Non-digit keystroke in a numeric-only field
    NumericOnly,
    /// Field is full and the next field is protected
    TooLong,
    /// No unprotected field exists on a formatted screen
    NoField,
}

/// Immutable view of the screen handed to embedders
#[derive(Debug, Clone)]
pub struct ScreenSnapshot {
    pub rows: usize,
    pub cols: usize,
    pub cells: Vec<Cell>,
    pub fields: Vec<Field>,
    pub cursor: u16,
    pub aid: AidKey,
}

/// 3270 Presentation Space
///
/// Owns all cell and field storage for one session. The cursor is always
/// a valid buffer address; every mutation keeps it in range.
#[derive(Debug)]
pub struct Display3270 {
    /// Current screen size
    size: ScreenSize,

    /// Size restored by Erase/Write
    default_size: ScreenSize,

    /// Alternate size applied by Erase/Write Alternate
    alternate_size: ScreenSize,

    /// Cell storage
    buffer: Vec<Cell>,

    /// Cursor (buffer address)
    cursor: u16,

    /// Field chain
    fields: FieldChain,

    /// Keyboard locked state with optional inhibit reason
    keyboard_locked: bool,
    inhibit: Option<InputInhibit>,

    /// Alarm requested by the last WCC
    alarm: bool,

    /// AID state frozen by the last operator action
    aid: AidKey,
    aid_cursor: u16,
}

impl Display3270 {
    /// Create a Model 2 (24x80) display
    pub fn new() -> Self {
        Self::with_size(ScreenSize::Model2)
    }

    /// Create a display with the given default and alternate sizes equal
    pub fn with_size(size: ScreenSize) -> Self {
        Self {
            size,
            default_size: size,
            alternate_size: size,
            buffer: vec![Cell::default(); size.buffer_size()],
            cursor: 0,
            fields: FieldChain::new(),
            keyboard_locked: true,
            inhibit: None,
            alarm: false,
            aid: AidKey::NoAid,
            aid_cursor: 0,
        }
    }

    /// Set the alternate size used by Erase/Write Alternate
    pub fn set_alternate_size(&mut self, size: ScreenSize) {
        self.alternate_size = size;
    }

    pub fn alternate_size(&self) -> ScreenSize {
        self.alternate_size
    }

    /// The size Erase/Write restores
    pub fn default_size(&self) -> ScreenSize {
        self.default_size
    }

    pub fn size(&self) -> ScreenSize {
        self.size
    }

    pub fn rows(&self) -> usize {
        self.size.rows()
    }

    pub fn cols(&self) -> usize {
        self.size.cols()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Wrap an address into the buffer
    pub fn wrap(&self, address: usize) -> u16 {
        (address % self.buffer.len()) as u16
    }

    /// Clear every cell and field, home the cursor
    pub fn clear(&mut self) {
        self.buffer.fill(Cell::default());
        self.cursor = 0;
        self.fields.clear();
    }

    /// Resize the presentation space and clear it
    pub fn resize(&mut self, size: ScreenSize) {
        debug_assert!(size.buffer_size() > 0, "degenerate screen size");
        if size.buffer_size() == 0 {
            self.clear();
            return;
        }
        self.size = size;
        self.buffer = vec![Cell::default(); size.buffer_size()];
        self.cursor = 0;
        self.fields.clear();
    }

    /// Set the cursor; out-of-range addresses wrap
    pub fn set_cursor(&mut self, address: u16) {
        self.cursor = self.wrap(address as usize);
    }

    pub fn cursor(&self) -> u16 {
        self.cursor
    }

    /// Cursor as (row, col)
    pub fn cursor_position(&self) -> (usize, usize) {
        self.size.address_to_coords(self.cursor)
    }

    /// Read a cell
    pub fn cell(&self, address: u16) -> &Cell {
        &self.buffer[address as usize % self.buffer.len()]
    }

    /// Host write of one data byte. Overwriting a field-attribute cell
    /// turns it back into data and removes that field from the chain.
    /// Host writes never touch MDT.
    pub fn write_data(&mut self, address: u16, ch: u8, ge: bool, attrs: CharAttrs) {
        let addr = self.wrap(address as usize) as usize;
        if self.buffer[addr].is_field_attr {
            self.fields.remove_at(addr as u16);
        }
        self.buffer[addr] = Cell {
            ch,
            is_field_attr: false,
            ge,
            attrs,
        };
    }

    /// Write a field attribute cell and splice the field into the chain
    pub fn set_field_attribute(&mut self, address: u16, base_attr: u8, extended: ExtendedAttributes) {
        let addr = self.wrap(address as usize);
        self.buffer[addr as usize] = Cell {
            ch: base_attr,
            is_field_attr: true,
            ge: false,
            attrs: CharAttrs::default(),
        };
        self.fields.insert(Field::with_extended(addr, base_attr, extended));
    }

    /// Fill [start, stop) with a character, wrapping; stop == start fills
    /// the whole buffer exactly once. Host-write semantics apply.
    pub fn repeat_to(&mut self, start: u16, stop: u16, fill: u8, ge: bool, attrs: CharAttrs) {
        let size = self.buffer.len();
        let start = start as usize % size;
        let stop = stop as usize % size;
        let count = if stop == start {
            size
        } else if stop > start {
            stop - start
        } else {
            size - start + stop
        };
        for offset in 0..count {
            let addr = ((start + offset) % size) as u16;
            self.write_data(addr, fill, ge, attrs);
        }
    }

    /// Erase Unprotected to Address: null the data cells of unprotected
    /// fields in [start, stop), leave attribute cells alone, and clear
    /// MDT on every field touched.
    pub fn erase_unprotected_to(&mut self, start: u16, stop: u16) {
        let size = self.buffer.len();
        let start = start as usize % size;
        let stop = stop as usize % size;
        let count = if stop == start {
            size
        } else if stop > start {
            stop - start
        } else {
            size - start + stop
        };
        for offset in 0..count {
            let addr = ((start + offset) % size) as u16;
            if self.buffer[addr as usize].is_field_attr {
                continue;
            }
            let unprotected = self
                .fields
                .owner_of(addr)
                .map(|f| !f.is_protected())
                .unwrap_or(true);
            if unprotected {
                self.buffer[addr as usize].ch = 0x00;
                self.buffer[addr as usize].ge = false;
                if let Some(field) = self.fields.owner_of_mut(addr) {
                    field.set_modified(false);
                }
            }
        }
    }

    /// Erase All Unprotected: null every unprotected data cell, clear MDT
    /// on unprotected fields, cursor to the first unprotected position.
    pub fn erase_all_unprotected(&mut self) {
        let size = self.buffer.len() as u16;
        for addr in 0..size {
            if self.buffer[addr as usize].is_field_attr {
                continue;
            }
            let unprotected = self
                .fields
                .owner_of(addr)
                .map(|f| !f.is_protected())
                .unwrap_or(true);
            if unprotected {
                self.buffer[addr as usize].ch = 0x00;
                self.buffer[addr as usize].ge = false;
            }
        }
        let starts: Vec<u16> = self.fields.iter().map(|f| f.address).collect();
        for start in starts {
            if let Some(field) = self.fields.owner_of_mut(start) {
                if !field.is_protected() {
                    field.set_modified(false);
                }
            }
        }
        self.cursor = self.first_unprotected_address();
    }

    /// First data position of the first unprotected field scanning from
    /// address 0; address 0 on an unformatted screen.
    pub fn first_unprotected_address(&self) -> u16 {
        if self.fields.is_empty() {
            return 0;
        }
        let size = self.buffer.len();
        self.fields
            .iter()
            .find(|f| !f.is_protected())
            .map(|f| ((f.address as usize + 1) % size) as u16)
            .unwrap_or(0)
    }

    /// Program Tab target from `address`: first data position of the next
    /// unprotected field. None when the screen has no unprotected field.
    pub fn next_unprotected_data_address(&self, address: u16) -> Option<u16> {
        let size = self.buffer.len();
        self.fields
            .next_unprotected(address)
            .map(|f| ((f.address as usize + 1) % size) as u16)
    }

    /// Field chain access
    pub fn fields(&self) -> &FieldChain {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut FieldChain {
        &mut self.fields
    }

    /// Mark the field owning `address` as modified. Operator path only;
    /// host writes never call this.
    pub fn modify(&mut self, address: u16) {
        if let Some(field) = self.fields.owner_of_mut(address) {
            field.set_modified(true);
        }
    }

    /// Clear MDT on all fields (WCC reset-MDT, post-read reset)
    pub fn reset_mdt(&mut self) {
        self.fields.reset_mdt();
    }

    /// Lock the keyboard without an inhibit reason (host write in flight)
    pub fn lock_keyboard(&mut self) {
        self.keyboard_locked = true;
    }

    /// Lock the keyboard with an operator-visible inhibit reason
    pub fn inhibit_input(&mut self, reason: InputInhibit) {
        self.keyboard_locked = true;
        self.inhibit = Some(reason);
    }

    /// Unlock the keyboard and clear any inhibit reason
    pub fn unlock_keyboard(&mut self) {
        self.keyboard_locked = false;
        self.inhibit = None;
    }

    pub fn is_keyboard_locked(&self) -> bool {
        self.keyboard_locked
    }

    pub fn inhibit_reason(&self) -> Option<InputInhibit> {
        self.inhibit
    }

    pub fn set_alarm(&mut self, alarm: bool) {
        self.alarm = alarm;
    }

    pub fn is_alarm(&self) -> bool {
        self.alarm
    }

    /// Freeze the AID and the cursor address at the moment of the action
    pub fn set_aid(&mut self, aid: AidKey) {
        self.aid = aid;
        self.aid_cursor = self.cursor;
    }

    /// Clear the AID state (host processed the input)
    pub fn clear_aid(&mut self) {
        self.aid = AidKey::NoAid;
        self.aid_cursor = 0;
    }

    pub fn aid(&self) -> AidKey {
        self.aid
    }

    pub fn aid_cursor(&self) -> u16 {
        self.aid_cursor
    }

    /// Raw character bytes of the whole buffer, in natural order
    pub fn buffer_data(&self) -> Vec<u8> {
        self.buffer.iter().map(|cell| cell.ch).collect()
    }

    /// Immutable snapshot for embedders
    pub fn snapshot(&self) -> ScreenSnapshot {
        ScreenSnapshot {
            rows: self.rows(),
            cols: self.cols(),
            cells: self.buffer.clone(),
            fields: self.fields.iter().cloned().collect(),
            cursor: self.cursor,
            aid: self.aid,
        }
    }

    /// One row rendered as text through the given code page. Field
    /// attribute cells render as spaces.
    pub fn render_row(&self, row: usize, page: CodePage) -> Option<String> {
        if row >= self.rows() {
            return None;
        }
        let cols = self.cols();
        let start = row * cols;
        let mut result = String::with_capacity(cols);
        for cell in &self.buffer[start..start + cols] {
            if cell.is_field_attr || cell.ch == 0x00 {
                result.push(' ');
            } else {
                let ch = if cell.ge {
                    crate::ebcdic::decode_ge(cell.ch)
                } else {
                    page.decode(cell.ch)
                };
                result.push(if ch == char::REPLACEMENT_CHARACTER { ' ' } else { ch });
            }
        }
        Some(result)
    }
}

impl Default for Display3270 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_size_models() {
        assert_eq!(ScreenSize::Model2.rows(), 24);
        assert_eq!(ScreenSize::Model2.cols(), 80);
        assert_eq!(ScreenSize::Model2.buffer_size(), 1920);
        assert_eq!(ScreenSize::Model3.buffer_size(), 2560);
        assert_eq!(ScreenSize::Model4.buffer_size(), 3440);
        assert_eq!(ScreenSize::Model5.buffer_size(), 3564);
        assert_eq!(ScreenSize::from_model(2), Some(ScreenSize::Model2));
        assert_eq!(ScreenSize::from_model(9), None);
    }

    #[test]
    fn test_screen_size_coords() {
        let size = ScreenSize::Model2;
        assert_eq!(size.address_to_coords(0), (0, 0));
        assert_eq!(size.address_to_coords(80), (1, 0));
        assert_eq!(size.address_to_coords(81), (1, 1));
        assert_eq!(size.coords_to_address(1, 1), 81);
    }

    #[test]
    fn test_cursor_always_in_range() {
        let mut display = Display3270::new();
        display.set_cursor(1920);
        assert_eq!(display.cursor(), 0);
        display.set_cursor(1919);
        assert_eq!(display.cursor(), 1919);
    }

    #[test]
    fn test_host_write_never_sets_mdt() {
        let mut display = Display3270::new();
        display.set_field_attribute(0, 0, ExtendedAttributes::default());
        display.write_data(1, 0xC1, false, CharAttrs::default());
        assert!(!display.fields().field_at(0).unwrap().is_modified());
    }

    #[test]
    fn test_overwriting_attribute_removes_field() {
        let mut display = Display3270::new();
        display.set_field_attribute(5, ATTR_PROTECTED, ExtendedAttributes::default());
        assert_eq!(display.fields().len(), 1);
        assert!(display.cell(5).is_field_attr);

        display.write_data(5, 0xC1, false, CharAttrs::default());
        assert_eq!(display.fields().len(), 0);
        assert!(!display.cell(5).is_field_attr);
        assert_eq!(display.cell(5).ch, 0xC1);
    }

    #[test]
    fn test_repeat_to_wraps() {
        let mut display = Display3270::new();
        display.repeat_to(1918, 2, 0x40, false, CharAttrs::default());
        assert_eq!(display.cell(1918).ch, 0x40);
        assert_eq!(display.cell(1919).ch, 0x40);
        assert_eq!(display.cell(0).ch, 0x40);
        assert_eq!(display.cell(1).ch, 0x40);
        assert_eq!(display.cell(2).ch, 0x00); // stop is exclusive
    }

    #[test]
    fn test_repeat_to_same_address_fills_buffer() {
        let mut display = Display3270::new();
        display.repeat_to(0, 0, 0x40, false, CharAttrs::default());
        assert!((0..1920).all(|a| display.cell(a).ch == 0x40));
    }

    #[test]
    fn test_erase_all_unprotected() {
        let mut display = Display3270::new();
        display.set_field_attribute(0, 0, ExtendedAttributes::default()); // unprotected
        display.set_field_attribute(10, ATTR_PROTECTED, ExtendedAttributes::default());
        display.write_data(1, 0xC1, false, CharAttrs::default());
        display.write_data(11, 0xC2, false, CharAttrs::default());
        display.fields_mut().owner_of_mut(1).unwrap().set_modified(true);

        display.erase_all_unprotected();

        assert_eq!(display.cell(1).ch, 0x00);
        assert_eq!(display.cell(11).ch, 0xC2); // protected survives
        assert!(!display.fields().field_at(0).unwrap().is_modified());
        assert_eq!(display.cursor(), 1); // first unprotected data position
    }

    #[test]
    fn test_erase_unprotected_to_range() {
        let mut display = Display3270::new();
        display.set_field_attribute(0, 0, ExtendedAttributes::default());
        display.write_data(1, 0xC1, false, CharAttrs::default());
        display.write_data(5, 0xC2, false, CharAttrs::default());

        display.erase_unprotected_to(1, 5);
        assert_eq!(display.cell(1).ch, 0x00);
        assert_eq!(display.cell(5).ch, 0xC2); // stop exclusive
    }

    #[test]
    fn test_resize_clears() {
        let mut display = Display3270::new();
        display.write_data(0, 0xC1, false, CharAttrs::default());
        display.resize(ScreenSize::Model4);
        assert_eq!(display.buffer_size(), 3440);
        assert_eq!(display.cell(0).ch, 0x00);
        assert_eq!(display.cursor(), 0);
    }

    #[test]
    fn test_aid_state_freezes_cursor() {
        let mut display = Display3270::new();
        display.set_cursor(42);
        display.set_aid(AidKey::Enter);
        display.set_cursor(100);
        assert_eq!(display.aid(), AidKey::Enter);
        assert_eq!(display.aid_cursor(), 42);
        display.clear_aid();
        assert_eq!(display.aid(), AidKey::NoAid);
    }

    #[test]
    fn test_inhibit_reason() {
        let mut display = Display3270::new();
        display.unlock_keyboard();
        display.inhibit_input(InputInhibit::Protected);
        assert!(display.is_keyboard_locked());
        assert_eq!(display.inhibit_reason(), Some(InputInhibit::Protected));
        display.unlock_keyboard();
        assert_eq!(display.inhibit_reason(), None);
    }

    #[test]
    fn test_render_row() {
        let mut display = Display3270::new();
        display.write_data(0, 0xC8, false, CharAttrs::default()); // H
        display.write_data(1, 0xC9, false, CharAttrs::default()); // I
        let row = display.render_row(0, CodePage::Cp037).unwrap();
        assert!(row.starts_with("HI"));
        assert_eq!(row.len(), 80);
    }
}
