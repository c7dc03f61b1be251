//! 3270 Structured Fields
//!
//! Write Structured Field records carry a sequence of length-prefixed,
//! id-tagged blocks. Decoding walks (length, id, body) triples and
//! dispatches on the id; unknown ids are skipped using only the length
//! field. The other direction is the Query Reply, the inbound record
//! describing terminal capabilities, built here from the live screen
//! geometry and code page.

use super::codes::*;
use super::display::ScreenSize;
use super::parser::QueryRequest;
use crate::ebcdic::CodePage;
use crate::trace::{TraceEvent, TraceSink};

/// Action decoded from one outbound structured field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SfAction {
    /// Read Partition Query / Query List
    Query(QueryRequest),
    /// Set Reply Mode
    SetReplyMode(u8),
    /// Erase/Reset to the implicit partition
    EraseReset,
    /// Outbound 3270DS: an encapsulated W/EW/EWA/EAU record
    Outbound3270Ds(Vec<u8>),
}

/// Partition id used by Read Partition Query
const QUERY_PARTITION: u8 = 0xFF;

/// Query List request types
const RP_REQTYPE_LIST: u8 = 0x00;
const RP_REQTYPE_EQUIVALENT: u8 = 0x40;
const RP_REQTYPE_ALL: u8 = 0x80;

/// QR codes this terminal supports, in Summary order
pub const SUPPORTED_QUERIES: [u8; 7] = [
    QR_SUMMARY,
    QR_USABLE_AREA,
    QR_CHARACTER_SETS,
    QR_COLOR,
    QR_HIGHLIGHTING,
    QR_REPLY_MODES,
    QR_IMPLICIT_PARTITION,
];

/// Walk the structured fields of a WSF record body.
///
/// A declared length of zero means the field extends to the end of the
/// record. Truncated fields end the walk with a diagnostic; everything
/// decoded before the damage is kept.
pub fn parse_outbound(body: &[u8], sink: &dyn TraceSink) -> Vec<SfAction> {
    let mut actions = Vec::new();
    let mut pos = 0;

    while pos < body.len() {
        if pos + 3 > body.len() {
            sink.record(TraceEvent::Error {
                message: format!("structured field header truncated at offset {pos}"),
            });
            break;
        }
        let declared = u16::from_be_bytes([body[pos], body[pos + 1]]) as usize;
        let id = body[pos + 2];
        let (sf_body, next) = if declared == 0 {
            (&body[pos + 3..], body.len())
        } else {
            if declared < 3 || pos + declared > body.len() {
                sink.record(TraceEvent::Error {
                    message: format!(
                        "structured field 0x{id:02X} declares {declared} bytes, {} available",
                        body.len() - pos
                    ),
                });
                break;
            }
            (&body[pos + 3..pos + declared], pos + declared)
        };
        pos = next;

        match id {
            SF_READ_PARTITION => {
                if let Some(action) = decode_read_partition(sf_body, sink) {
                    actions.push(action);
                }
            }
            SF_SET_REPLY_MODE => {
                // partition id, then the mode byte
                if let Some(&mode) = sf_body.get(1) {
                    actions.push(SfAction::SetReplyMode(mode));
                } else {
                    sink.record(TraceEvent::Error {
                        message: "Set Reply Mode without a mode byte".into(),
                    });
                }
            }
            SF_ERASE_RESET => actions.push(SfAction::EraseReset),
            SF_ACTIVATE_PARTITION => {
                // Only the implicit partition exists here.
                if sf_body.first().copied().unwrap_or(0) != 0 {
                    sink.record(TraceEvent::Error {
                        message: "Activate Partition for a partition other than 0".into(),
                    });
                }
            }
            SF_OUTBOUND_3270DS => {
                // partition id byte, then the encapsulated command
                if sf_body.len() > 1 {
                    actions.push(SfAction::Outbound3270Ds(sf_body[1..].to_vec()));
                }
            }
            _ => {
                sink.record(TraceEvent::Error {
                    message: format!("skipping unknown structured field 0x{id:02X}"),
                });
            }
        }
    }

    actions
}

fn decode_read_partition(body: &[u8], sink: &dyn TraceSink) -> Option<SfAction> {
    let (&partition, rest) = body.split_first()?;
    if partition != QUERY_PARTITION {
        sink.record(TraceEvent::Error {
            message: format!("Read Partition for unsupported partition 0x{partition:02X}"),
        });
        return None;
    }
    match rest.first().copied() {
        Some(RP_QUERY) => Some(SfAction::Query(QueryRequest::All)),
        Some(RP_QUERY_LIST) => {
            let reqtype = rest.get(1).copied().unwrap_or(RP_REQTYPE_ALL);
            match reqtype {
                RP_REQTYPE_ALL => Some(SfAction::Query(QueryRequest::All)),
                RP_REQTYPE_LIST | RP_REQTYPE_EQUIVALENT => {
                    Some(SfAction::Query(QueryRequest::List(rest[2..].to_vec())))
                }
                other => {
                    sink.record(TraceEvent::Error {
                        message: format!("Query List with unknown request type 0x{other:02X}"),
                    });
                    None
                }
            }
        }
        other => {
            sink.record(TraceEvent::Error {
                message: format!("Read Partition with unsupported type {other:02X?}"),
            });
            None
        }
    }
}

/// Build the inbound Query Reply record: AID 0x88 followed by one
/// structured field per supported (and requested) QR code.
pub fn build_query_reply(
    default_size: ScreenSize,
    alternate_size: ScreenSize,
    page: CodePage,
    request: &QueryRequest,
) -> Vec<u8> {
    let wanted: Vec<u8> = match request {
        QueryRequest::All => SUPPORTED_QUERIES.to_vec(),
        QueryRequest::List(codes) => SUPPORTED_QUERIES
            .iter()
            .copied()
            .filter(|code| codes.contains(code))
            .collect(),
    };

    let mut reply = vec![AID_STRUCTURED_FIELD];
    for code in wanted {
        let payload = match code {
            QR_SUMMARY => SUPPORTED_QUERIES.to_vec(),
            QR_USABLE_AREA => usable_area(default_size),
            QR_CHARACTER_SETS => character_sets(page),
            QR_COLOR => color(),
            QR_HIGHLIGHTING => highlighting(),
            QR_REPLY_MODES => vec![REPLY_MODE_FIELD, REPLY_MODE_EXTENDED, REPLY_MODE_CHARACTER],
            QR_IMPLICIT_PARTITION => implicit_partition(default_size, alternate_size),
            _ => continue,
        };
        push_query_reply(&mut reply, code, &payload);
    }
    reply
}

/// Append one Query Reply structured field: length, 0x81, QR code, payload
fn push_query_reply(out: &mut Vec<u8>, code: u8, payload: &[u8]) {
    let length = (4 + payload.len()) as u16;
    out.extend_from_slice(&length.to_be_bytes());
    out.push(0x81); // Query Reply SFID
    out.push(code);
    out.extend_from_slice(payload);
}

/// Usable Area: addressing flags, dimensions, measurement pair, cell
/// size and the buffer size.
fn usable_area(size: ScreenSize) -> Vec<u8> {
    let mut p = Vec::with_capacity(19);
    p.push(0x01); // 12/14-bit addressing allowed
    p.push(0x00); // variable cells not supported, matrix character cells
    p.extend_from_slice(&(size.cols() as u16).to_be_bytes());
    p.extend_from_slice(&(size.rows() as u16).to_be_bytes());
    p.push(0x01); // units: millimetres
    p.extend_from_slice(&[0x00, 0x0A, 0x02, 0xE5]); // Xr: distance numerator/denominator
    p.extend_from_slice(&[0x00, 0x02, 0x00, 0x6F]); // Yr
    p.push(0x09); // cell width in units
    p.push(0x0C); // cell height in units
    p.extend_from_slice(&(size.buffer_size() as u16).to_be_bytes());
    p
}

/// Character Sets: base EBCDIC set plus the GE (APL) set
fn character_sets(page: CodePage) -> Vec<u8> {
    let cpgid: u16 = match page {
        CodePage::Cp037 => 37,
        CodePage::Cp1047 => 1047,
    };
    let mut p = Vec::with_capacity(22);
    p.push(0x82); // GE and CGCSGID present
    p.push(0x00);
    p.push(0x09); // default character slot width
    p.push(0x0C); // default character slot height
    p.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // no LOAD PS formats
    p.push(0x07); // descriptor length
    // Base set: device set 0, LCID 0, GCSGID 697 + configured CPGID
    p.extend_from_slice(&[0x00, 0x00, 0x00]);
    p.extend_from_slice(&697u16.to_be_bytes());
    p.extend_from_slice(&cpgid.to_be_bytes());
    // GE set: device set 1, LCID 0xF1, GCSGID 963 / CPGID 310 (APL2)
    p.extend_from_slice(&[0x01, 0x00, 0xF1]);
    p.extend_from_slice(&963u16.to_be_bytes());
    p.extend_from_slice(&310u16.to_be_bytes());
    p
}

/// Color: default maps to green, then the seven base colors identity
fn color() -> Vec<u8> {
    let mut p = vec![0x00, 0x08];
    p.extend_from_slice(&[0x00, COLOR_GREEN]);
    for c in [COLOR_BLUE, COLOR_RED, COLOR_PINK, COLOR_GREEN, COLOR_TURQUOISE, COLOR_YELLOW, COLOR_WHITE] {
        p.extend_from_slice(&[c, c]);
    }
    p
}

/// Highlighting: default plus blink, reverse and underscore
fn highlighting() -> Vec<u8> {
    vec![
        0x04, // number of pairs
        0x00, HIGHLIGHT_NORMAL,
        HIGHLIGHT_BLINK, HIGHLIGHT_BLINK,
        HIGHLIGHT_REVERSE, HIGHLIGHT_REVERSE,
        HIGHLIGHT_UNDERSCORE, HIGHLIGHT_UNDERSCORE,
    ]
}

/// Implicit Partition: default and alternate screen dimensions
fn implicit_partition(default_size: ScreenSize, alternate_size: ScreenSize) -> Vec<u8> {
    let mut p = vec![0x00, 0x00]; // flags
    p.push(0x0B); // self-defining parameter length
    p.push(0x01); // implicit partition sizes
    p.push(0x00); // flags
    p.extend_from_slice(&(default_size.cols() as u16).to_be_bytes());
    p.extend_from_slice(&(default_size.rows() as u16).to_be_bytes());
    p.extend_from_slice(&(alternate_size.cols() as u16).to_be_bytes());
    p.extend_from_slice(&(alternate_size.rows() as u16).to_be_bytes());
    p
}
