//! Negotiation integration tests
//!
//! Drives the Telnet option state machine and the TN3270E negotiator
//! together, the way the session wires them: option agreement first,
//! then the DEVICE-TYPE / FUNCTIONS handshake, then framed records.

use tn3270r::telnet::{OperatingMode, TelnetNegotiator, TelnetOption};
use tn3270r::tn3270e::{
    FunctionSet, Tn3270eHeader, Tn3270eNegotiator, DT_3270_DATA, FUNC_BIND_IMAGE, FUNC_RESPONSES,
    RESPONSE_FLAG_ALWAYS_RESPONSE, TN3270E_CONNECT, TN3270E_DEVICE_TYPE, TN3270E_FUNCTIONS,
    TN3270E_IS, TN3270E_REASON, TN3270E_REJECT, TN3270E_REQUEST, TN3270E_SEND,
};
use tn3270r::trace::{NopSink, TraceEvent, TraceRecorder, TraceSink};

const IAC: u8 = 255;
const WILL: u8 = 251;
const WONT: u8 = 252;
const DO: u8 = 253;
const SB: u8 = 250;
const SE: u8 = 240;
const EOR_CMD: u8 = 239;

fn agree_basic(neg: &mut TelnetNegotiator, sink: &dyn TraceSink) {
    neg.initiate(sink);
    neg.take_output();
    neg.feed(
        &[
            IAC, DO, 0,
            IAC, DO, 24,
            IAC, DO, 25,
            IAC, WILL, 0,
            IAC, WILL, 25,
        ],
        sink,
    );
}

/// Run a complete successful handshake transcript against the two state
/// machines and check every negotiated artifact.
#[test]
fn tn3270e_handshake_success_transcript() {
    let recorder = TraceRecorder::new();
    let mut telnet = TelnetNegotiator::new(true, "IBM-3278-2-E");
    let mut tn3270e = Tn3270eNegotiator::new(FunctionSet::new(&[FUNC_BIND_IMAGE, FUNC_RESPONSES]));

    agree_basic(&mut telnet, &recorder);
    telnet.feed(&[IAC, DO, 40], &recorder);
    assert!(telnet.is_enabled_us(TelnetOption::TN3270E));

    // Client: SEND DEVICE-TYPE
    let payload = tn3270e.start();
    assert_eq!(payload, vec![TN3270E_SEND, TN3270E_DEVICE_TYPE]);
    telnet.send_subnegotiation(TelnetOption::TN3270E as u8, &payload, &recorder);
    telnet.take_output();

    // Server: DEVICE-TYPE IS "IBM-3279-2-E" CONNECT "LU01"
    let mut subneg = vec![IAC, SB, 40, TN3270E_DEVICE_TYPE, TN3270E_IS];
    subneg.extend_from_slice(b"IBM-3279-2-E");
    subneg.push(TN3270E_CONNECT);
    subneg.extend_from_slice(b"LU01");
    subneg.extend_from_slice(&[IAC, SE]);
    telnet.feed(&subneg, &recorder);

    let queued = telnet.next_tn3270e_subneg().expect("subneg queued");
    let step = tn3270e.handle_subnegotiation(&queued, &recorder);
    // Client answers FUNCTIONS REQUEST {BIND-IMAGE, RESPONSES}
    assert_eq!(
        step.reply,
        Some(vec![TN3270E_FUNCTIONS, TN3270E_REQUEST, 0, 2])
    );

    // Server: FUNCTIONS IS {BIND-IMAGE, RESPONSES}
    telnet.feed(&[IAC, SB, 40, TN3270E_FUNCTIONS, TN3270E_IS, 0, 2, IAC, SE], &recorder);
    let queued = telnet.next_tn3270e_subneg().unwrap();
    let step = tn3270e.handle_subnegotiation(&queued, &recorder);
    assert!(step.bound);

    telnet.set_tn3270e_bound(true, &recorder);
    assert_eq!(telnet.mode(), OperatingMode::Tn3270e);
    assert_eq!(tn3270e.device_type(), Some("IBM-3279-2-E"));
    assert_eq!(tn3270e.lu_name(), Some("LU01"));
    assert_eq!(
        tn3270e.functions(),
        FunctionSet::new(&[FUNC_BIND_IMAGE, FUNC_RESPONSES])
    );
    let size = tn3270e.negotiated_size().unwrap();
    assert_eq!((size.rows(), size.cols()), (24, 80));

    // The recorder saw the mode decisions and subnegotiation payloads.
    let events = recorder.events();
    assert!(events.iter().any(|e| matches!(e.event, TraceEvent::ModeDecision { .. })));
    assert!(events.iter().any(|e| matches!(e.event, TraceEvent::Subneg { option: 40, .. })));
}

#[test]
fn device_type_reject_downgrades_to_basic() {
    let mut telnet = TelnetNegotiator::new(true, "IBM-3278-2-E");
    let mut tn3270e = Tn3270eNegotiator::new(FunctionSet::EMPTY);

    agree_basic(&mut telnet, &NopSink);
    telnet.feed(&[IAC, DO, 40], &NopSink);
    tn3270e.start();

    telnet.feed(
        &[IAC, SB, 40, TN3270E_DEVICE_TYPE, TN3270E_REJECT, TN3270E_REASON, 0x04, IAC, SE],
        &NopSink,
    );
    let queued = telnet.next_tn3270e_subneg().unwrap();
    let step = tn3270e.handle_subnegotiation(&queued, &NopSink);
    assert!(step.failed.is_some());
    assert!(tn3270e.handshake_failed());

    // The session never promotes; basic 3270 keeps working.
    assert_eq!(telnet.mode(), OperatingMode::Basic3270);
}

#[test]
fn functions_divergence_aborts_after_two_exchanges() {
    let mut tn3270e = Tn3270eNegotiator::new(FunctionSet::new(&[FUNC_RESPONSES]));
    tn3270e.start();

    let mut device_is = vec![TN3270E_DEVICE_TYPE, TN3270E_IS];
    device_is.extend_from_slice(b"IBM-3278-2");
    tn3270e.handle_subnegotiation(&device_is, &NopSink);

    // First counter-proposal converges to the intersection
    let step = tn3270e.handle_subnegotiation(&[TN3270E_FUNCTIONS, TN3270E_REQUEST, 2, 4], &NopSink);
    assert!(step.bound);

    // A second one means no agreement: abort to basic
    let step = tn3270e.handle_subnegotiation(&[TN3270E_FUNCTIONS, TN3270E_REQUEST, 4], &NopSink);
    assert!(step.failed.is_some());
    assert!(tn3270e.handshake_failed());
}

#[test]
fn q_method_settles_on_any_finite_trace() {
    // Pathological interleavings must terminate with stable state and
    // bounded responses: at most one reply per received command.
    let traces: [&[u8]; 3] = [
        &[IAC, WILL, 0, IAC, WILL, 0, IAC, WILL, 0],
        &[IAC, WILL, 25, IAC, WONT, 25, IAC, WILL, 25, IAC, WONT, 25],
        &[IAC, DO, 0, IAC, 254, 0, IAC, DO, 0, IAC, 254, 0],
    ];
    for trace in traces {
        let mut neg = TelnetNegotiator::new(false, "IBM-3278-2");
        neg.initiate(&NopSink);
        neg.take_output();

        let commands = trace.len() / 3;
        neg.feed(trace, &NopSink);
        assert!(neg.take_output().len() <= commands * 3);

        // Re-feeding the final command is idempotent
        let tail = &trace[trace.len() - 3..];
        neg.feed(tail, &NopSink);
        neg.feed(tail, &NopSink);
        let second = neg.take_output();
        let before_binary = neg.is_enabled_him(TelnetOption::Binary);
        neg.feed(tail, &NopSink);
        assert_eq!(neg.is_enabled_him(TelnetOption::Binary), before_binary);
        drop(second);
    }
}

#[test]
fn records_flow_after_mode_election() {
    let mut neg = TelnetNegotiator::new(false, "IBM-3278-2");
    agree_basic(&mut neg, &NopSink);
    assert_eq!(neg.mode(), OperatingMode::Basic3270);

    // Two records, one with an escaped IAC, split awkwardly
    neg.feed(&[0xF5, 0xC3, IAC], &NopSink);
    neg.feed(&[IAC, IAC, EOR_CMD, 0xF1, 0x00, IAC, EOR_CMD], &NopSink);

    assert_eq!(neg.next_record().unwrap(), vec![0xF5, 0xC3, 0xFF]);
    assert_eq!(neg.next_record().unwrap(), vec![0xF1, 0x00]);
    assert!(neg.next_record().is_none());
}

#[test]
fn tn3270e_headers_round_trip_through_framing() {
    let mut neg = TelnetNegotiator::new(true, "IBM-3279-2-E");
    agree_basic(&mut neg, &NopSink);
    neg.feed(&[IAC, DO, 40], &NopSink);
    neg.set_tn3270e_bound(true, &NopSink);
    assert_eq!(neg.mode(), OperatingMode::Tn3270e);

    // Host record: header (3270-DATA, ALWAYS-RESPONSE, seq 7) + EW
    neg.feed(
        &[
            DT_3270_DATA, 0x00, RESPONSE_FLAG_ALWAYS_RESPONSE, 0x00, 0x07,
            0xF5, 0xC3, IAC, EOR_CMD,
        ],
        &NopSink,
    );
    let record = neg.next_record().unwrap();
    let (header, payload) = Tn3270eHeader::parse(&record).unwrap();
    assert_eq!(header.data_type, DT_3270_DATA);
    assert_eq!(header.seq, 7);
    assert_eq!(payload, &[0xF5, 0xC3]);

    // Ack goes back out with the same sequence number
    let tn3270e = {
        let mut n = Tn3270eNegotiator::new(FunctionSet::new(&[FUNC_RESPONSES]));
        n.start();
        let mut device_is = vec![TN3270E_DEVICE_TYPE, TN3270E_IS];
        device_is.extend_from_slice(b"IBM-3279-2-E");
        n.handle_subnegotiation(&device_is, &NopSink);
        n.handle_subnegotiation(&[TN3270E_FUNCTIONS, TN3270E_IS, 2], &NopSink);
        n
    };
    assert!(tn3270e.needs_response(&header));
    let ack = tn3270e.build_response(header.seq, true);
    neg.send_record(&ack);
    let wire = neg.take_output();
    assert_eq!(wire, vec![0x02, 0x00, 0x00, 0x00, 0x07, 0x00, IAC, EOR_CMD]);
}
