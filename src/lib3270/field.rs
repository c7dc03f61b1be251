//! Field attribute and field-chain logic for 3270
//!
//! A field begins at the cell carrying its attribute byte (written by an
//! SF or SFE order) and runs to the next field attribute, wrapping past
//! the end of the buffer. The chain is kept in an ordered map keyed by
//! start address; the owner of a position is the field whose start is the
//! greatest start at or below it, wrapping to the last field when the
//! position precedes every start. An unformatted screen (no fields) is
//! treated by callers as one implicit default field covering the buffer.

use std::collections::BTreeMap;

use super::codes::*;

/// A single field descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Buffer address of the field attribute byte
    pub address: u16,

    /// Base attribute byte (from SF order or the XA_3270 pair of SFE)
    pub base_attr: u8,

    /// Extended attributes (from SFE or MF orders)
    pub extended: ExtendedAttributes,
}

impl Field {
    /// Create a field with a base attribute only
    pub fn new(address: u16, base_attr: u8) -> Self {
        Self {
            address,
            base_attr,
            extended: ExtendedAttributes::default(),
        }
    }

    /// Create a field carrying extended attributes
    pub fn with_extended(address: u16, base_attr: u8, extended: ExtendedAttributes) -> Self {
        Self {
            address,
            base_attr,
            extended,
        }
    }

    /// Check if field is protected
    pub fn is_protected(&self) -> bool {
        (self.base_attr & ATTR_PROTECTED) != 0
    }

    /// Check if field is numeric-only
    pub fn is_numeric(&self) -> bool {
        (self.base_attr & ATTR_NUMERIC) != 0
    }

    /// Protected + numeric together means auto-skip
    pub fn is_auto_skip(&self) -> bool {
        self.is_protected() && self.is_numeric()
    }

    /// Check if field is hidden (non-display)
    pub fn is_hidden(&self) -> bool {
        (self.base_attr & ATTR_DISPLAY) == DISPLAY_HIDDEN
    }

    /// Check if field is intensified
    pub fn is_intensified(&self) -> bool {
        (self.base_attr & ATTR_DISPLAY) == DISPLAY_INTENSIFIED
    }

    /// Check if Modified Data Tag (MDT) is set
    pub fn is_modified(&self) -> bool {
        (self.base_attr & ATTR_MDT) != 0
    }

    /// Set or clear the Modified Data Tag (MDT)
    pub fn set_modified(&mut self, modified: bool) {
        if modified {
            self.base_attr |= ATTR_MDT;
        } else {
            self.base_attr &= !ATTR_MDT;
        }
    }
}

/// Extended field attributes carried by SFE and MF orders
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtendedAttributes {
    /// Highlighting (normal, blink, reverse, underscore)
    pub highlighting: Option<u8>,

    /// Foreground color
    pub foreground_color: Option<u8>,

    /// Background color
    pub background_color: Option<u8>,

    /// Character set
    pub charset: Option<u8>,

    /// Field validation (mandatory fill, mandatory entry, trigger)
    pub validation: Option<u8>,

    /// Field outlining
    pub outlining: Option<u8>,

    /// Transparency
    pub transparency: Option<u8>,
}

impl ExtendedAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one (type, value) pair from an SFE or MF order.
    /// Returns false for attribute types this implementation does not
    /// track, which the caller skips without failing the record.
    pub fn apply(&mut self, attr_type: u8, value: u8) -> bool {
        match attr_type {
            XA_HIGHLIGHTING => self.highlighting = Some(value),
            XA_FOREGROUND => self.foreground_color = Some(value),
            XA_BACKGROUND => self.background_color = Some(value),
            XA_CHARSET => self.charset = Some(value),
            XA_VALIDATION => self.validation = Some(value),
            XA_OUTLINING => self.outlining = Some(value),
            XA_TRANSPARENCY => self.transparency = Some(value),
            _ => return false,
        }
        true
    }

    /// True when no extended attribute is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The field chain: every field on the screen, ordered by start address.
///
/// Owner lookup is a predecessor search with wrap-around, so each cell has
/// exactly one owner whenever at least one field exists.
#[derive(Debug, Default)]
pub struct FieldChain {
    fields: BTreeMap<u16, Field>,
}

impl FieldChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fields on the screen
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the screen is unformatted (implicit default field)
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Insert or replace the field starting at `field.address`
    pub fn insert(&mut self, field: Field) {
        self.fields.insert(field.address, field);
    }

    /// Remove the field that starts exactly at `address`, if any.
    /// Used when host data overwrites a field-attribute cell.
    pub fn remove_at(&mut self, address: u16) -> Option<Field> {
        self.fields.remove(&address)
    }

    /// Drop every field (Erase/Write, Clear key)
    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// The field whose attribute byte sits exactly at `address`
    pub fn field_at(&self, address: u16) -> Option<&Field> {
        self.fields.get(&address)
    }

    /// The field owning `address`: greatest start <= address, wrapping to
    /// the last field when the position precedes every start. None on an
    /// unformatted screen.
    pub fn owner_of(&self, address: u16) -> Option<&Field> {
        self.fields
            .range(..=address)
            .next_back()
            .or_else(|| self.fields.iter().next_back())
            .map(|(_, f)| f)
    }

    /// Mutable owner lookup, same rules as [`owner_of`](Self::owner_of)
    pub fn owner_of_mut(&mut self, address: u16) -> Option<&mut Field> {
        let start = self
            .fields
            .range(..=address)
            .next_back()
            .or_else(|| self.fields.iter().next_back())
            .map(|(&start, _)| start)?;
        self.fields.get_mut(&start)
    }

    /// The next field strictly after `address`, wrapping to the first
    pub fn next_field(&self, address: u16) -> Option<&Field> {
        self.fields
            .range(address + 1..)
            .next()
            .or_else(|| self.fields.iter().next())
            .map(|(_, f)| f)
    }

    /// The next unprotected field strictly after `address`, wrapping once
    pub fn next_unprotected(&self, address: u16) -> Option<&Field> {
        self.fields
            .range(address + 1..)
            .chain(self.fields.range(..=address))
            .map(|(_, f)| f)
            .find(|f| !f.is_protected())
    }

    /// First data address of `field` (one past its attribute byte)
    pub fn first_data_address(&self, field: &Field, buffer_size: usize) -> u16 {
        ((field.address as usize + 1) % buffer_size) as u16
    }

    /// End of the region owned by `field`: the address of the next field
    /// attribute, or the field's own address once wrapped (whole buffer).
    pub fn end_of(&self, field: &Field) -> u16 {
        self.fields
            .range(field.address + 1..)
            .next()
            .or_else(|| self.fields.iter().next())
            .map(|(&start, _)| start)
            .unwrap_or(field.address)
    }

    /// All fields in start-address order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Field> {
        self.fields.values()
    }

    /// Fields with the MDT bit set, in start-address order
    pub fn modified_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values().filter(|f| f.is_modified())
    }

    /// Clear MDT on every field
    pub fn reset_mdt(&mut self) {
        for field in self.fields.values_mut() {
            field.set_modified(false);
        }
    }
}
