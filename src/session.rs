//! Session management
//!
//! The embedder-facing façade: one `Session` per connection, owning the
//! transport, the Telnet/TN3270E negotiators and the presentation space.
//! Everything runs on the caller's task; the only suspension points are
//! transport reads and writes. Operator actions are applied between host
//! records, never while one is being parsed.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio::time::timeout;

use crate::error::{SessionError, TN3270Result};
use crate::keyboard;
use crate::lib3270::addressing::AddressMode;
use crate::lib3270::codes::AidKey;
use crate::lib3270::display::{Display3270, InputInhibit, ScreenSize, ScreenSnapshot};
use crate::lib3270::parser::{self, ParseOutcome, QueryRequest, ReadCommand};
use crate::lib3270::sf;
use crate::lib3270::writer;
use crate::telnet::{OperatingMode, TelnetNegotiator, TelnetOption};
use crate::tn3270e::{
    self, FunctionSet, Tn3270eHeader, Tn3270eNegotiator, FUNC_BIND_IMAGE, FUNC_RESPONSES,
    FUNC_SYSREQ,
};
use crate::trace::{NopSink, TraceEvent, TraceSink};
use crate::ebcdic::CodePage;

/// Connection configuration handed to [`Session::open`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// Terminal model, 2-5 (24x80, 32x80, 43x80, 27x132)
    pub model: u8,
    /// Offer TN3270E and the "-E" terminal type
    pub extended: bool,
    /// Logical unit name to report (informational; the server assigns)
    pub lu_name: Option<String>,
    /// EBCDIC code page name ("037" or "1047")
    pub code_page: String,
    /// Budget for the whole Telnet + TN3270E handshake
    pub negotiation_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 23,
            model: 2,
            extended: true,
            lu_name: None,
            code_page: "037".to_string(),
            negotiation_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    /// Terminal type string offered in TERMINAL-TYPE and TN3270E
    pub fn terminal_type(&self) -> String {
        let model = if ScreenSize::from_model(self.model).is_some() {
            self.model
        } else {
            2
        };
        if self.extended {
            format!("IBM-3278-{model}-E")
        } else {
            format!("IBM-3278-{model}")
        }
    }
}

/// One TN3270 session over a reliable ordered byte stream.
pub struct Session<T> {
    transport: T,
    config: SessionConfig,
    telnet: TelnetNegotiator,
    tn3270e: Tn3270eNegotiator,
    display: Display3270,
    page: CodePage,
    addr_mode: AddressMode,
    sink: Arc<dyn TraceSink>,
    cancel: Arc<Notify>,

    /// Reply mode selected by Set Reply Mode (affects nothing yet except
    /// being reported back on request)
    reply_mode: u8,

    /// SCS-DATA printer bytes, exposed to the embedder
    printer: Vec<u8>,

    /// NVT-mode host output, exposed to the embedder
    nvt_data: Vec<u8>,

    /// A host record finished parsing since the last wait
    host_record_seen: bool,

    closed: bool,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Session<T> {
    /// Negotiate on an established transport and return the bound session.
    ///
    /// The handshake runs under `config.negotiation_timeout`. If the
    /// timeout elapses mid-handshake the session falls back to whatever
    /// mode is already established (TN3270E → basic 3270 → NVT); it only
    /// fails when the transport dies first.
    pub async fn open(
        transport: T,
        config: SessionConfig,
        sink: Option<Arc<dyn TraceSink>>,
    ) -> TN3270Result<Self> {
        let sink = sink.unwrap_or_else(|| Arc::new(NopSink));
        let size = ScreenSize::from_model(config.model).unwrap_or(ScreenSize::Model2);
        let page = CodePage::from_name(&config.code_page).unwrap_or_default();

        let mut requested = FunctionSet::new(&[FUNC_BIND_IMAGE, FUNC_RESPONSES, FUNC_SYSREQ]);
        if !config.extended {
            requested = FunctionSet::EMPTY;
        }

        let mut session = Self {
            telnet: TelnetNegotiator::new(config.extended, &config.terminal_type()),
            tn3270e: Tn3270eNegotiator::new(requested),
            display: Display3270::with_size(size),
            page,
            addr_mode: AddressMode::for_buffer(size.buffer_size()),
            sink,
            cancel: Arc::new(Notify::new()),
            reply_mode: 0,
            printer: Vec::new(),
            nvt_data: Vec::new(),
            host_record_seen: false,
            closed: false,
            transport,
            config,
        };

        session.telnet.initiate(session.sink.as_ref());
        session.flush().await?;

        let budget = session.config.negotiation_timeout;
        match timeout(budget, session.negotiate()).await {
            Ok(result) => result?,
            Err(_) => {
                // Timeout: settle for the mode already reached.
                session.sink.record(TraceEvent::ModeDecision {
                    requested: "tn3270e",
                    chosen: session.telnet.mode().name(),
                    fallback: true,
                });
            }
        }
        Ok(session)
    }

    async fn negotiate(&mut self) -> TN3270Result<()> {
        loop {
            if self.negotiation_settled() {
                return Ok(());
            }
            self.pump().await?;
        }
    }

    fn negotiation_settled(&self) -> bool {
        match self.telnet.mode() {
            OperatingMode::Tn3270e => true,
            _ => {
                // Settled when nothing is pending: every option answered
                // and no TN3270E handshake under way.
                !self.telnet.has_pending_options()
                    && (!self.telnet.is_enabled_us(TelnetOption::TN3270E)
                        || self.tn3270e.is_bound()
                        || self.tn3270e_failed())
            }
        }
    }

    fn tn3270e_failed(&self) -> bool {
        // After a REJECT the negotiator refuses further progress; the
        // telnet layer keeps mode at basic 3270.
        !self.tn3270e.is_bound() && self.tn3270e.handshake_failed()
    }

    /// Current operating mode
    pub fn mode(&self) -> OperatingMode {
        self.telnet.mode()
    }

    /// Negotiated device type, when TN3270E bound
    pub fn device_type(&self) -> Option<&str> {
        self.tn3270e.device_type()
    }

    /// Logical unit name assigned by the server
    pub fn lu_name(&self) -> Option<&str> {
        self.tn3270e.lu_name()
    }

    /// Agreed TN3270E function set
    pub fn functions(&self) -> FunctionSet {
        self.tn3270e.functions()
    }

    /// Handle used to abort a blocked read from another task
    pub fn cancel_handle(&self) -> Arc<Notify> {
        self.cancel.clone()
    }

    /// Immutable view of the screen
    pub fn screen_snapshot(&self) -> ScreenSnapshot {
        self.display.snapshot()
    }

    /// Direct read access for embedders that render the screen
    pub fn display(&self) -> &Display3270 {
        &self.display
    }

    /// Accumulated printer-session bytes (SCS-DATA records)
    pub fn take_printer_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.printer)
    }

    /// Accumulated NVT-mode host output
    pub fn take_nvt_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.nvt_data)
    }

    /// Suspend until the next host-originated screen update is complete.
    pub async fn wait_for_host_record(&mut self) -> TN3270Result<()> {
        if self.closed {
            return Err(SessionError::Closed.into());
        }
        loop {
            if self.host_record_seen {
                self.host_record_seen = false;
                return Ok(());
            }
            self.pump().await?;
        }
    }

    /// Raise an AID key and send the matching reply to the host.
    pub async fn send_key(&mut self, aid: AidKey) -> TN3270Result<()> {
        if self.closed {
            return Err(SessionError::Closed.into());
        }
        keyboard::key(&mut self.display, aid);
        let reply = writer::build_read_modified(&mut self.display, self.addr_mode);
        self.send_record(tn3270e::DT_3270_DATA, &reply);
        self.display.clear_aid();
        self.flush().await
    }

    /// Type text at the cursor through the session code page.
    pub fn type_string(&mut self, text: &str) -> Result<(), InputInhibit> {
        keyboard::type_string(&mut self.display, text, self.page)
    }

    /// Move the cursor to (row, col)
    pub fn move_cursor(&mut self, row: usize, col: usize) {
        keyboard::move_cursor(&mut self.display, row, col);
    }

    /// Operator Clear key: wipe the screen and send the Clear AID
    pub async fn clear(&mut self) -> TN3270Result<()> {
        self.send_key(AidKey::Clear).await
    }

    /// Attention: Telnet BREAK in basic mode, the SysReq AID when the
    /// SYSREQ function was negotiated
    pub async fn attn(&mut self) -> TN3270Result<()> {
        if self.mode() == OperatingMode::Tn3270e && self.functions().contains(FUNC_SYSREQ) {
            return self.send_key(AidKey::SysReq).await;
        }
        self.telnet.send_break();
        self.flush().await
    }

    /// Close the session. No further operations are accepted.
    pub async fn close(&mut self, reason: &str) -> TN3270Result<()> {
        if !self.closed {
            self.closed = true;
            self.sink.record(TraceEvent::Error {
                message: format!("session closed: {reason}"),
            });
            let _ = self.transport.shutdown().await;
        }
        Ok(())
    }

    /// One pump iteration: read transport bytes, run them through the
    /// framer, apply complete records, flush responses.
    async fn pump(&mut self) -> TN3270Result<()> {
        if self.closed {
            return Err(SessionError::Closed.into());
        }

        let mut buf = [0u8; 4096];
        let n = tokio::select! {
            result = self.transport.read(&mut buf) => result?,
            _ = self.cancel.notified() => {
                // Cancellation aborts the read; a partial record stays in
                // the framer and is discarded when the session closes.
                self.closed = true;
                return Err(SessionError::Closed.into());
            }
        };
        if n == 0 {
            self.closed = true;
            return Err(SessionError::TransportClosed {
                reason: "end of stream".to_string(),
            }
            .into());
        }

        self.telnet.feed(&buf[..n], self.sink.as_ref());
        self.drive_tn3270e_handshake();
        self.process_records();
        self.nvt_data.extend(self.telnet.take_nvt_data());
        self.flush().await
    }

    /// Kick or advance the TN3270E handshake from queued subnegotiations.
    fn drive_tn3270e_handshake(&mut self) {
        if self.telnet.is_enabled_us(TelnetOption::TN3270E) && self.tn3270e.is_idle() {
            let payload = self.tn3270e.start();
            self.telnet
                .send_subnegotiation(TelnetOption::TN3270E as u8, &payload, self.sink.as_ref());
        }

        while let Some(payload) = self.telnet.next_tn3270e_subneg() {
            let step = self.tn3270e.handle_subnegotiation(&payload, self.sink.as_ref());
            if let Some(reply) = step.reply {
                self.telnet
                    .send_subnegotiation(TelnetOption::TN3270E as u8, &reply, self.sink.as_ref());
            }
            if step.bound {
                if let Some(size) = self.tn3270e.negotiated_size() {
                    self.display = Display3270::with_size(size);
                    self.addr_mode = AddressMode::for_buffer(size.buffer_size());
                }
                self.telnet.set_tn3270e_bound(true, self.sink.as_ref());
            }
            if let Some(err) = step.failed {
                debug!("TN3270E handshake failed: {err}");
                self.telnet.set_tn3270e_bound(false, self.sink.as_ref());
            }
        }
    }

    /// Apply every complete inbound record.
    fn process_records(&mut self) {
        while let Some(record) = self.telnet.next_record() {
            match self.mode() {
                OperatingMode::Tn3270e => self.process_tn3270e_record(&record),
                _ => {
                    let outcome = parser::parse_record(&record, &mut self.display, self.sink.as_ref());
                    self.finish_outcome(outcome);
                    self.host_record_seen = true;
                }
            }
        }
    }

    fn process_tn3270e_record(&mut self, record: &[u8]) {
        let (header, payload) = match Tn3270eHeader::parse(record) {
            Ok(parts) => parts,
            Err(err) => {
                self.sink.record(TraceEvent::Error {
                    message: err.to_string(),
                });
                return;
            }
        };
        self.sink.record(TraceEvent::Tn3270eHeader {
            data_type: header.data_type,
            seq: header.seq,
            flags: header.response_flag,
        });

        match header.data_type {
            tn3270e::DT_3270_DATA => {
                let outcome = parser::parse_record(payload, &mut self.display, self.sink.as_ref());
                if self.tn3270e.needs_response(&header) {
                    let ack = self.tn3270e.build_response(header.seq, true);
                    self.telnet.send_record(&ack);
                }
                self.finish_outcome(outcome);
                self.host_record_seen = true;
            }
            tn3270e::DT_SCS_DATA => {
                self.printer.extend_from_slice(payload);
                if self.tn3270e.needs_response(&header) {
                    let ack = self.tn3270e.build_response(header.seq, true);
                    self.telnet.send_record(&ack);
                }
            }
            tn3270e::DT_BIND_IMAGE => {
                if let Some((default, alternate)) = tn3270e::parse_bind_image(payload) {
                    self.display = Display3270::with_size(default);
                    self.display.set_alternate_size(alternate);
                    self.addr_mode = AddressMode::for_buffer(
                        default.buffer_size().max(alternate.buffer_size()),
                    );
                }
            }
            tn3270e::DT_UNBIND => {
                self.telnet.set_tn3270e_bound(false, self.sink.as_ref());
            }
            tn3270e::DT_NVT_DATA => {
                self.nvt_data.extend_from_slice(payload);
            }
            tn3270e::DT_PRINT_EOJ => {
                debug!("printer end of job, {} bytes buffered", self.printer.len());
            }
            tn3270e::DT_RESPONSE => {
                // Acknowledgement of one of our requests; nothing owed.
            }
            other => {
                self.sink.record(TraceEvent::Error {
                    message: format!("unhandled TN3270E data type 0x{other:02X}"),
                });
            }
        }
    }

    /// Answer the read commands and queries a record left pending.
    fn finish_outcome(&mut self, outcome: ParseOutcome) {
        if let Some(mode) = outcome.reply_mode {
            self.reply_mode = mode;
        }
        if let Some(read) = outcome.pending_read {
            let reply = match read {
                ReadCommand::Buffer => writer::build_read_buffer(&self.display, self.addr_mode),
                ReadCommand::Modified => {
                    writer::build_read_modified(&mut self.display, self.addr_mode)
                }
                ReadCommand::ModifiedAll => {
                    writer::build_read_modified_all(&mut self.display, self.addr_mode)
                }
            };
            self.send_record(tn3270e::DT_3270_DATA, &reply);
            self.display.clear_aid();
        }
        if let Some(query) = outcome.query {
            let reply = self.build_query_reply(&query);
            self.send_record(tn3270e::DT_3270_DATA, &reply);
        }
    }

    fn build_query_reply(&self, request: &QueryRequest) -> Vec<u8> {
        sf::build_query_reply(
            self.display.default_size(),
            self.display.alternate_size(),
            self.page,
            request,
        )
    }

    /// Frame an outbound record, adding the TN3270E header when bound.
    fn send_record(&mut self, data_type: u8, payload: &[u8]) {
        if self.mode() == OperatingMode::Tn3270e {
            let header = Tn3270eHeader::new(data_type, self.tn3270e.next_seq(false));
            let mut record = header.encode().to_vec();
            record.extend_from_slice(payload);
            self.telnet.send_record(&record);
        } else {
            self.telnet.send_record(payload);
        }
    }

    async fn flush(&mut self) -> TN3270Result<()> {
        let bytes = self.telnet.take_output();
        if !bytes.is_empty() {
            self.transport.write_all(&bytes).await?;
            self.transport.flush().await?;
        }
        Ok(())
    }
}
