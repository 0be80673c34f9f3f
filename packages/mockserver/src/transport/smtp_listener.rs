// packages/mockserver/src/transport/smtp_listener.rs
//! SMTP transport adapter
//!
//! Speaks enough of RFC 5321 to accept mail from a client: greeting,
//! HELO/EHLO, MAIL, RCPT, DATA, RSET, NOOP, VRFY and QUIT. Every completed
//! DATA transaction is handed to the [`MailRecorder`]. Messages are never
//! relayed.
//!
//! Lines are framed as bytes. Commands are decoded lossily, message data is
//! kept exactly as received, so 8BITMIME bodies survive intact.

use crate::lifecycle::mail::{Envelope, MailRecorder};
use crate::utils::errors::{MockServerError, Result};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Longest accepted command or data line
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// What the connection handler does after feeding one line
#[derive(Debug, PartialEq)]
pub enum Step {
    /// Send this reply and keep reading
    Reply(String),

    /// Line consumed without a reply (message data)
    Continue,

    /// DATA finished; record the envelope, then reply
    Message(Envelope),

    /// Send this reply and close the connection
    Quit(String),
}

/// Per-connection SMTP dialogue state
#[derive(Debug)]
pub struct Session {
    peer: SocketAddr,
    hostname: String,
    greeted: bool,
    mailfrom: Option<String>,
    recipients: Vec<String>,

    /// Lines collected so far while in DATA mode
    data: Option<Vec<Vec<u8>>>,
}

impl Session {
    pub fn new(peer: SocketAddr, hostname: impl Into<String>) -> Self {
        Self {
            peer,
            hostname: hostname.into(),
            greeted: false,
            mailfrom: None,
            recipients: Vec::new(),
            data: None,
        }
    }

    pub fn greeting(&self) -> String {
        format!("220 {} Sentra Lab mock SMTP service ready", self.hostname)
    }

    /// Feed one line, without its line terminator
    pub fn feed(&mut self, line: &[u8]) -> Step {
        if let Some(lines) = self.data.as_mut() {
            if line == b"." {
                let lines = std::mem::take(lines);
                self.data = None;
                return Step::Message(self.finish(lines));
            }
            lines.push(line.strip_prefix(b".").unwrap_or(line).to_vec());
            return Step::Continue;
        }

        let line = String::from_utf8_lossy(line);
        let line = line.as_ref();

        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.trim()),
            None => (line.trim().to_ascii_uppercase(), ""),
        };

        match verb.as_str() {
            "HELO" | "EHLO" if arg.is_empty() => {
                Step::Reply(format!("501 Syntax: {} hostname", verb))
            }
            "HELO" => {
                self.greet();
                Step::Reply(format!("250 {}", self.hostname))
            }
            "EHLO" => {
                self.greet();
                Step::Reply(format!("250-{}\r\n250-8BITMIME\r\n250 HELP", self.hostname))
            }
            "MAIL" => self.mail(arg),
            "RCPT" => self.rcpt(arg),
            "DATA" => {
                if self.recipients.is_empty() {
                    return Step::Reply("503 Error: need RCPT command".to_string());
                }
                self.data = Some(Vec::new());
                Step::Reply("354 End data with <CR><LF>.<CR><LF>".to_string())
            }
            "RSET" => {
                self.reset_transaction();
                Step::Reply("250 OK".to_string())
            }
            "NOOP" => Step::Reply("250 OK".to_string()),
            "VRFY" => Step::Reply(
                "252 Cannot VRFY user, but will accept message and attempt delivery".to_string(),
            ),
            "QUIT" => Step::Quit("221 Bye".to_string()),
            "" => Step::Reply("500 Error: bad syntax".to_string()),
            _ => Step::Reply(format!("500 Error: command \"{}\" not recognized", verb)),
        }
    }

    fn greet(&mut self) {
        self.greeted = true;
        self.reset_transaction();
    }

    fn mail(&mut self, arg: &str) -> Step {
        if !self.greeted {
            return Step::Reply("503 Error: send HELO first".to_string());
        }
        if self.mailfrom.is_some() {
            return Step::Reply("503 Error: nested MAIL command".to_string());
        }
        match parse_path(arg, "FROM:") {
            Some(address) => {
                debug!("MAIL FROM {:?}", address);
                self.mailfrom = Some(address);
                Step::Reply("250 OK".to_string())
            }
            None => Step::Reply("501 Syntax: MAIL FROM:<address>".to_string()),
        }
    }

    fn rcpt(&mut self, arg: &str) -> Step {
        if self.mailfrom.is_none() {
            return Step::Reply("503 Error: need MAIL command".to_string());
        }
        match parse_path(arg, "TO:") {
            Some(address) if !address.is_empty() => {
                debug!("RCPT TO {:?}", address);
                self.recipients.push(address);
                Step::Reply("250 OK".to_string())
            }
            _ => Step::Reply("501 Syntax: RCPT TO:<address>".to_string()),
        }
    }

    fn finish(&mut self, lines: Vec<Vec<u8>>) -> Envelope {
        let envelope = Envelope {
            peer: self.peer,
            mailfrom: self.mailfrom.take().unwrap_or_default(),
            recipients: std::mem::take(&mut self.recipients),
            data: Bytes::from(lines.join(&b"\r\n"[..])),
        };
        self.reset_transaction();
        envelope
    }

    fn reset_transaction(&mut self) {
        self.mailfrom = None;
        self.recipients.clear();
        self.data = None;
    }
}

/// Address of `FROM:<a> params` / `TO:<a>`; `<>` is the empty address
fn parse_path(arg: &str, prefix: &str) -> Option<String> {
    let head = arg.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = arg[prefix.len()..].trim_start();

    if let Some(inner) = rest.strip_prefix('<') {
        let end = inner.find('>')?;
        return Some(inner[..end].trim().to_string());
    }

    rest.split_whitespace().next().map(str::to_string)
}

/// Accept loop and dialogue handling of one SMTP server
pub struct SmtpListener {
    recorder: MailRecorder,
    hostname: String,
    local_addr: SocketAddr,
}

impl SmtpListener {
    pub fn new(recorder: MailRecorder, hostname: impl Into<String>, local_addr: SocketAddr) -> Self {
        Self {
            recorder,
            hostname: hostname.into(),
            local_addr,
        }
    }

    /// Accept connections until `cancel` fires
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        cancel: CancellationToken,
        grace: Duration,
    ) {
        info!("SMTP server listening on {}", self.local_addr);
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let this = Arc::clone(&self);
                        tracker.spawn(async move {
                            debug!("Accepted SMTP connection from {}", peer);
                            if let Err(e) = this.handle_session(stream, peer).await {
                                warn!("SMTP session with {} failed: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }

        drop(listener);
        tracker.close();
        if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
            warn!("{} SMTP session(s) still open after {:?}", tracker.len(), grace);
        }

        info!("Stopping SMTP server at {}", self.local_addr);
    }

    async fn handle_session(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        let mut session = Session::new(peer, self.hostname.as_str());

        reply(&mut writer, &session.greeting()).await?;

        while read_line(&mut reader, &mut line).await? {
            match session.feed(&line) {
                Step::Continue => {}
                Step::Reply(text) => reply(&mut writer, &text).await?,
                Step::Message(envelope) => {
                    self.recorder.record(envelope);
                    reply(&mut writer, "250 OK").await?;
                }
                Step::Quit(text) => {
                    reply(&mut writer, &text).await?;
                    break;
                }
            }
        }

        writer.shutdown().await?;
        Ok(())
    }
}

/// Read one line into `buf` without its terminator; `false` at end of stream
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> Result<bool> {
    buf.clear();
    let limit = MAX_LINE_LENGTH as u64 + 2;
    if (&mut *reader).take(limit).read_until(b'\n', buf).await? == 0 {
        return Ok(false);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    if buf.len() > MAX_LINE_LENGTH {
        return Err(MockServerError::Protocol(format!(
            "line longer than {} bytes",
            MAX_LINE_LENGTH
        )));
    }
    Ok(true)
}

async fn reply<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> Result<()> {
    writer.write_all(text.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}
