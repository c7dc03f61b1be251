//! 3270 Buffer Addressing
//!
//! Buffer addresses on the wire are two bytes; the high two bits of the
//! first byte select the encoding. Legacy 12-bit addresses pack six bits
//! per byte through a code table (GA23-0059 appendix); 14-bit addresses
//! carry the address in the low 14 bits; 16-bit addresses are raw
//! big-endian and appear only when negotiated for very large partitions.

/// Address encoding selected for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    /// Legacy 6-bits-per-byte coded addressing (max 4095)
    Twelve,
    /// Low 14 bits of the two bytes (max 16383)
    Fourteen,
    /// Raw big-endian (max 65535)
    Sixteen,
}

impl AddressMode {
    /// Pick the narrowest mode that can address every cell of a buffer.
    /// 12-bit is preferred up to 4096 cells for interoperability with
    /// legacy hosts, then 14-bit, then 16-bit.
    pub fn for_buffer(buffer_size: usize) -> Self {
        if buffer_size <= 4096 {
            AddressMode::Twelve
        } else if buffer_size <= 16384 {
            AddressMode::Fourteen
        } else {
            AddressMode::Sixteen
        }
    }
}

/// Decode a two-byte buffer address, selecting the mode from the high
/// two bits of the first byte: 00 is 14-bit, 01 is coded 12-bit, and
/// anything else is raw 16-bit.
pub fn decode_address(byte1: u8, byte2: u8) -> u16 {
    match byte1 >> 6 {
        0b00 => decode_14bit(byte1, byte2),
        0b01 => decode_12bit(byte1, byte2),
        _ => u16::from_be_bytes([byte1, byte2]),
    }
}

/// Encode an address in the requested mode.
///
/// The 12-bit and 14-bit encoders silently mask to their width; the
/// caller is responsible for having picked a mode wide enough for the
/// buffer (see [`AddressMode::for_buffer`]).
pub fn encode_address(address: u16, mode: AddressMode) -> (u8, u8) {
    match mode {
        AddressMode::Twelve => encode_12bit(address),
        AddressMode::Fourteen => encode_14bit(address),
        AddressMode::Sixteen => {
            let [b1, b2] = address.to_be_bytes();
            (b1, b2)
        }
    }
}

/// Decode a 12-bit buffer address from two coded bytes
pub fn decode_12bit(byte1: u8, byte2: u8) -> u16 {
    let high = decode_address_byte(byte1) as u16;
    let low = decode_address_byte(byte2) as u16;
    (high << 6) | low
}

/// Decode a 14-bit buffer address from two bytes
pub fn decode_14bit(byte1: u8, byte2: u8) -> u16 {
    (((byte1 & 0x3F) as u16) << 8) | byte2 as u16
}

/// Encode a 12-bit buffer address to two coded bytes
pub fn encode_12bit(address: u16) -> (u8, u8) {
    let high = ((address >> 6) & 0x3F) as u8;
    let low = (address & 0x3F) as u8;
    (encode_address_byte(high), encode_address_byte(low))
}

/// Encode a 14-bit buffer address to two bytes
pub fn encode_14bit(address: u16) -> (u8, u8) {
    (((address >> 8) & 0x3F) as u8, (address & 0xFF) as u8)
}

/// Decode a single coded address byte to its 6-bit value.
///
/// The code table maps each 6-bit value to a graphic EBCDIC character;
/// both the 0x40-0x7F and 0xC0-0xFF code ranges are accepted because the
/// table is symmetric across them.
fn decode_address_byte(byte: u8) -> u8 {
    match byte {
        0x40..=0x7F => byte - 0x40,
        0xC0..=0xFF => byte - 0xC0,
        _ => byte & 0x3F,
    }
}

/// Encode a 6-bit value to a coded address byte.
/// Only the 0x40-0x7F range is emitted.
fn encode_address_byte(value: u8) -> u8 {
    0x40 + (value & 0x3F)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mode_selection() {
        assert_eq!(AddressMode::for_buffer(24 * 80), AddressMode::Twelve);
        assert_eq!(AddressMode::for_buffer(27 * 132), AddressMode::Twelve);
        assert_eq!(AddressMode::for_buffer(4096), AddressMode::Twelve);
        assert_eq!(AddressMode::for_buffer(4097), AddressMode::Fourteen);
        assert_eq!(AddressMode::for_buffer(16384), AddressMode::Fourteen);
        assert_eq!(AddressMode::for_buffer(16385), AddressMode::Sixteen);
    }

    #[test]
    fn test_12bit_known_values() {
        // SBA 0x40 0x4A addresses cell 10 (row 0, col 10 on any width)
        assert_eq!(decode_12bit(0x40, 0x4A), 10);
        assert_eq!(encode_12bit(10), (0x40, 0x4A));
        // 0x5B,0x6F -> (0x1B << 6) | 0x2F
        assert_eq!(decode_12bit(0x5B, 0x6F), (0x1B << 6) | 0x2F);
    }

    #[test]
    fn test_12bit_alternate_code_range() {
        // Hosts may emit the 0xC0-0xFF code range for a byte; decode only.
        assert_eq!(decode_12bit(0x40, 0xCA), 10);
    }

    #[test]
    fn test_14bit_known_values() {
        assert_eq!(decode_14bit(0x00, 0x00), 0);
        assert_eq!(decode_14bit(0x07, 0x80), 0x0780);
        assert_eq!(encode_14bit(1919), (0x07, 0x7F));
    }

    #[test]
    fn test_mode_dispatch_by_top_bits() {
        // 00xxxxxx first byte: 14-bit
        assert_eq!(decode_address(0x00, 0x00), 0);
        // 01xxxxxx first byte: coded 12-bit
        assert_eq!(decode_address(0x40, 0x4A), 10);
        // 1xxxxxxx first byte: raw 16-bit
        assert_eq!(decode_address(0x80, 0x01), 0x8001);
    }

    proptest! {
        #[test]
        fn prop_12bit_round_trip(addr in 0u16..4096) {
            let (b1, b2) = encode_12bit(addr);
            prop_assert_eq!(decode_12bit(b1, b2), addr);
            prop_assert_eq!(decode_address(b1, b2), addr);
        }

        #[test]
        fn prop_14bit_round_trip(addr in 0u16..16384) {
            let (b1, b2) = encode_14bit(addr);
            prop_assert_eq!(decode_14bit(b1, b2), addr);
        }

        #[test]
        fn prop_16bit_round_trip(addr in 0u16..=u16::MAX) {
            let (b1, b2) = encode_address(addr, AddressMode::Sixteen);
            prop_assert_eq!(u16::from_be_bytes([b1, b2]), addr);
        }
    }
}
