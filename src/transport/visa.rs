//! The VISA backend. Polls the status byte's MAV (message available) bit before every
//! non-blocking read rather than trusting a VISA read-timeout attribute to do the
//! right thing across every USB/GPIB/TCPIP transport.

use std::io::{Read, Write};
use std::ops::{Deref, DerefMut};

use visa_rs::{flags::AccessMode, AsResourceManager, VisaString, TIMEOUT_INFINITE};

use crate::error::{AcqError, TransportError};

/// Bit 4 (0x10) of the IEEE-488.2 status byte: message available in the output queue.
const STB_MAV: u16 = 0x10;

pub struct VisaBackend {
    _rm: visa_rs::DefaultRM,
    inst: visa_rs::Instrument,
    nonblocking: bool,
}

impl VisaBackend {
    /// Open a VISA resource by its resource string.
    ///
    /// # Errors
    /// [`AcqError::Transport`] if the resource manager, resource string, or instrument
    /// session could not be opened.
    pub fn new(resource_string: &str) -> Result<Self, AcqError> {
        let rm = visa_rs::DefaultRM::new()
            .map_err(|e| TransportError::OpenRm(e.to_string()))?;
        let Some(parsed) = VisaString::from_string(resource_string.to_string()) else {
            return Err(TransportError::OpenInstr {
                resource: resource_string.to_string(),
                details: "not a valid VISA resource string".to_string(),
            }
            .into());
        };
        let inst: visa_rs::Instrument = rm
            .open(&parsed, AccessMode::NO_LOCK, TIMEOUT_INFINITE)
            .map_err(|e| TransportError::OpenInstr {
                resource: resource_string.to_string(),
                details: e.to_string(),
            })?;
        Ok(Self {
            _rm: rm,
            inst,
            nonblocking: true,
        })
    }

    /// Toggle whether reads poll the status byte before blocking on the instrument.
    pub fn set_nonblocking(&mut self, enable: bool) {
        self.nonblocking = enable;
    }
}

impl Write for VisaBackend {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inst.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inst.flush()
    }
}

impl Read for VisaBackend {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.nonblocking {
            let stb = self
                .inst
                .read_stb()
                .map_err(|e| std::io::Error::other(format!("error reading STB: {e}")))?;
            if stb & STB_MAV == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WouldBlock,
                    "no message available",
                ));
            }
        }
        self.inst.read(buf)
    }
}

impl Deref for VisaBackend {
    type Target = visa_rs::Instrument;

    fn deref(&self) -> &Self::Target {
        &self.inst
    }
}

impl DerefMut for VisaBackend {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inst
    }
}
