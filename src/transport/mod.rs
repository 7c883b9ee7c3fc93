//! The transport layer (C1): a session-oriented API over VISA-like primitives, built
//! as an enum-of-backends so callers never branch on which transport is in use.

pub mod block;
pub mod raw;
#[cfg(feature = "visa")]
pub mod visa;

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::DEFAULT_TIMEOUT_MS;
use crate::error::{AcqError, TransportError};
use raw::{ByteStream, RawBackend};
#[cfg(feature = "visa")]
use visa::VisaBackend;

/// Tiered resource classes `auto_open` searches, in order. The `?*::INSTR` tier is
/// intentionally left out of this list; it would match everything and is disabled by
/// default.
const AUTO_OPEN_TIERS: [&str; 3] = ["USB?*::INSTR", "GPIB?*::INSTR", "TCPIP?*::INSTR"];

/// Per-candidate probe timeout used while searching during `auto_open`.
const PROBE_TIMEOUT_MS: u64 = 500;

enum Backend {
    Raw(RawBackend),
    #[cfg(feature = "visa")]
    Visa(VisaBackend),
}

impl Read for Backend {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Raw(r) => r.read(buf),
            #[cfg(feature = "visa")]
            Self::Visa(v) => v.read(buf),
        }
    }
}

impl Write for Backend {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Raw(r) => r.write(buf),
            #[cfg(feature = "visa")]
            Self::Visa(v) => v.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Raw(r) => r.flush(),
            #[cfg(feature = "visa")]
            Self::Visa(v) => v.flush(),
        }
    }
}

/// A session to an instrument: the resolved resource name, the I/O timeout, and the
/// bound backend. Only the producer thread ever touches a `Session` — it is `!Sync` by
/// construction, since `Backend` holds no internal locking.
pub struct Session {
    backend: Option<Backend>,
    resource_name: String,
    timeout_ms: u64,
    /// One-byte pushback buffer so `read_defblock`'s optional trailing-LF check never
    /// consumes a byte that belongs to the next message.
    pending_byte: Option<u8>,
}

impl Session {
    /// Wrap any stream the caller already has open (used by tests and by the `Raw`
    /// backend when no VISA resource string was given).
    pub fn from_stream(resource_name: impl Into<String>, stream: impl ByteStream + 'static) -> Self {
        Self {
            backend: Some(Backend::Raw(RawBackend::new(stream))),
            resource_name: resource_name.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            pending_byte: None,
        }
    }

    /// Open a named VISA resource.
    ///
    /// # Errors
    /// [`AcqError::Transport`] if the resource manager or instrument session could not
    /// be opened.
    #[cfg(feature = "visa")]
    pub fn open(resource_name: &str) -> Result<Self, AcqError> {
        info!(resource = resource_name, "opening instrument session");
        let backend = VisaBackend::new(resource_name)?;
        Ok(Self {
            backend: Some(Backend::Visa(backend)),
            resource_name: resource_name.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            pending_byte: None,
        })
    }

    #[cfg(not(feature = "visa"))]
    pub fn open(_resource_name: &str) -> Result<Self, AcqError> {
        Err(AcqError::NoVisa)
    }

    /// Search `USB -> GPIB -> TCPIP` resources for one whose `*IDN?` reply contains
    /// `idn_substring`, and open it.
    ///
    /// # Errors
    /// [`TransportError::NotFound`] if no candidate matched; other [`AcqError`]
    /// variants if resource enumeration itself failed.
    #[cfg(feature = "visa")]
    pub fn auto_open(idn_substring: &str) -> Result<Self, AcqError> {
        use visa_rs::{AsResourceManager, VisaString};

        let rm = visa_rs::DefaultRM::new().map_err(|e| TransportError::OpenRm(e.to_string()))?;
        for tier in AUTO_OPEN_TIERS {
            let Some(pattern) = VisaString::from_string(tier.to_string()) else {
                continue;
            };
            let Ok(candidates) = rm.find_res_list(&pattern) else {
                continue;
            };
            for candidate in candidates {
                let resource = candidate.to_string();
                debug!(resource, "probing candidate during auto_open");
                let Ok(mut session) = Self::open(&resource) else {
                    continue;
                };
                session.timeout_ms = PROBE_TIMEOUT_MS;
                let mut idn = [0u8; 256];
                if let Ok(n) = session.query("*IDN?", &mut idn) {
                    let reply = String::from_utf8_lossy(&idn[..n]);
                    if reply.contains(idn_substring) {
                        session.timeout_ms = DEFAULT_TIMEOUT_MS;
                        info!(resource, "matched instrument during auto_open");
                        return Ok(session);
                    }
                }
            }
        }
        Err(TransportError::NotFound(idn_substring.to_string()).into())
    }

    #[cfg(not(feature = "visa"))]
    pub fn auto_open(_idn_substring: &str) -> Result<Self, AcqError> {
        Err(AcqError::NoVisa)
    }

    /// The resolved resource string this session was opened with.
    #[must_use]
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// Close the instrument session (and, for the VISA backend, the resource manager
    /// behind it). Idempotent: closing an already-closed session is a no-op. A closed
    /// session rejects further `write`/`read`/`query` calls with a transport error;
    /// `reconnect` reopens it.
    pub fn close(&mut self) {
        if self.backend.take().is_some() {
            info!(resource = self.resource_name, "closed instrument session");
        }
        self.pending_byte = None;
    }

    /// Close and reopen with the stored resource name, verifying with `*IDN?`.
    ///
    /// # Errors
    /// [`AcqError::Transport`] if reopening or the verification query fails.
    pub fn reconnect(&mut self) -> Result<(), AcqError> {
        warn!(resource = self.resource_name, "reconnecting to instrument");
        #[cfg(feature = "visa")]
        {
            let reopened = Self::open(&self.resource_name)?;
            self.backend = reopened.backend;
            self.pending_byte = None;
        }
        let mut idn = [0u8; 256];
        self.query("*IDN?", &mut idn)?;
        info!(resource = self.resource_name, "reconnected");
        Ok(())
    }

    /// Binary write; loops over partial writes, failing if any individual write
    /// returns zero bytes.
    ///
    /// # Errors
    /// [`TransportError::Write`] on a zero-length write or I/O error.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), AcqError> {
        let mut written = 0;
        while written < bytes.len() {
            let backend = self
                .backend
                .as_mut()
                .ok_or_else(|| TransportError::Write("session is closed".into()))?;
            let n = backend
                .write(&bytes[written..])
                .map_err(|e| TransportError::Write(e.to_string()))?;
            if n == 0 {
                return Err(TransportError::Write("write returned 0 bytes".into()).into());
            }
            written = written.saturating_add(n);
        }
        Ok(())
    }

    /// Write a command, appending `\n` if the caller did not already include it.
    ///
    /// # Errors
    /// [`TransportError::Write`] on failure.
    pub fn writeline(&mut self, text: &str) -> Result<(), AcqError> {
        if text.ends_with('\n') {
            self.write(text.as_bytes())
        } else if text.len() < 256 {
            let mut buf = [0u8; 257];
            buf[..text.len()].copy_from_slice(text.as_bytes());
            buf[text.len()] = b'\n';
            self.write(&buf[..=text.len()])
        } else {
            let mut owned = text.to_string();
            owned.push('\n');
            self.write(owned.as_bytes())
        }
    }

    /// Read into `buf`. If `exact` is `false`, a single underlying read is issued and
    /// whatever arrived is returned. If `true`, loops until `buf` is full or the
    /// session timeout elapses.
    ///
    /// # Errors
    /// [`TransportError::Read`] on I/O error, or [`TransportError::Incomplete`] if
    /// `exact` was requested and the timeout elapsed first.
    pub fn read(&mut self, buf: &mut [u8], exact: bool) -> Result<usize, AcqError> {
        if !exact {
            return self.read_some(buf);
        }
        let deadline = Instant::now() + Duration::from_millis(self.timeout_ms.max(1));
        let mut got = 0;
        while got < buf.len() {
            if Instant::now() >= deadline {
                return Err(TransportError::Incomplete {
                    wanted: buf.len(),
                    got,
                }
                .into());
            }
            match self.read_some(&mut buf[got..]) {
                Ok(0) => continue,
                Ok(n) => got = got.saturating_add(n),
                Err(AcqError::Transport(TransportError::Read(_))) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(got)
    }

    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, AcqError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(b) = self.pending_byte.take() {
            buf[0] = b;
            return Ok(1);
        }
        let Some(backend) = self.backend.as_mut() else {
            return Err(TransportError::Read("session is closed".into()).into());
        };
        match backend.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(TransportError::Read(e.to_string()).into()),
        }
    }

    fn read_byte_blocking(&mut self, deadline: Instant) -> Result<u8, AcqError> {
        let mut one = [0u8; 1];
        loop {
            let n = self.read_some(&mut one)?;
            if n == 1 {
                return Ok(one[0]);
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Incomplete { wanted: 1, got: 0 }.into());
            }
        }
    }

    /// Write `cmd` followed by `\n`, then read the ASCII reply up to the trailing `\n`
    /// (exclusive), into `dst`. Returns the number of bytes written to `dst`.
    ///
    /// # Errors
    /// [`TransportError::Write`], [`TransportError::Read`], or
    /// [`TransportError::Truncated`] if the reply does not fit in `dst`.
    pub fn query(&mut self, cmd: &str, dst: &mut [u8]) -> Result<usize, AcqError> {
        self.writeline(cmd)?;
        let deadline = Instant::now() + Duration::from_millis(self.timeout_ms.max(1));
        let mut n = 0;
        loop {
            let b = self.read_byte_blocking(deadline)?;
            if b == b'\n' {
                break;
            }
            if b == b'\r' {
                continue;
            }
            if n >= dst.len() {
                return Err(TransportError::Truncated(dst.len()).into());
            }
            dst[n] = b;
            n = n.saturating_add(1);
        }
        Ok(n)
    }

    /// Read a SCPI definite-length block `#<n><len><payload>` into `dst`.
    ///
    /// If `len > dst.len()`, the payload (and its optional trailing LF) are still
    /// drained from the stream so the session remains synchronized, and
    /// [`TransportError::BufferTooSmall`] is returned. On success, returns the number
    /// of payload bytes written into `dst`.
    ///
    /// # Errors
    /// [`TransportError::MalformedBlock`] on a malformed header,
    /// [`TransportError::BufferTooSmall`] if `dst` is too small, or
    /// [`TransportError::Read`]/[`TransportError::Incomplete`] on I/O failure.
    pub fn read_defblock(&mut self, dst: &mut [u8]) -> Result<usize, AcqError> {
        let deadline = Instant::now() + Duration::from_millis(self.timeout_ms.max(1));
        let hash = self.read_byte_blocking(deadline)?;
        if hash != b'#' {
            return Err(TransportError::MalformedBlock(format!(
                "expected '#', got byte {hash:#04x}"
            ))
            .into());
        }
        let n_digit = self.read_byte_blocking(deadline)?;
        let n = block::parse_digit_count(n_digit)?;
        let mut len_digits = vec![0u8; n];
        for d in &mut len_digits {
            *d = self.read_byte_blocking(deadline)?;
        }
        let len = block::parse_len(&len_digits)?;

        if len > dst.len() {
            let mut remaining = len;
            let mut sink = [0u8; 4096];
            while remaining > 0 {
                let chunk = remaining.min(sink.len());
                let got = self.read(&mut sink[..chunk], true)?;
                remaining = remaining.saturating_sub(got);
            }
            self.consume_optional_lf(deadline)?;
            return Err(TransportError::BufferTooSmall {
                declared: len,
                capacity: dst.len(),
            }
            .into());
        }

        self.read(&mut dst[..len], true)?;
        self.consume_optional_lf(deadline)?;
        Ok(len)
    }

    fn consume_optional_lf(&mut self, deadline: Instant) -> Result<(), AcqError> {
        debug_assert!(self.pending_byte.is_none());
        match self.read_byte_blocking(deadline) {
            Ok(b'\n') => Ok(()),
            Ok(other) => {
                self.pending_byte = Some(other);
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }

    /// Override the per-call I/O timeout. Default is [`DEFAULT_TIMEOUT_MS`].
    pub fn set_timeout_ms(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
    }
}
