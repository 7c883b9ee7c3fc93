//! The non-VISA backend: any owned `Read + Write + Send` stream (a [`TcpStream`], or a
//! test double), wrapped behind a trait object so the session layer can stay generic
//! over what it's actually talking to.
//!
//! [`TcpStream`]: std::net::TcpStream

use std::io::{Read, Write};
use std::ops::{Deref, DerefMut};

/// A stream this backend can drive: readable, writable, and sendable to the producer
/// thread.
pub trait ByteStream: Read + Write + Send {}
impl<T: Read + Write + Send> ByteStream for T {}

/// Owns a boxed [`ByteStream`] trait object so the transport layer does not need to be
/// generic over the concrete stream type.
pub struct RawBackend(Box<dyn ByteStream>);

impl RawBackend {
    /// Wrap any stream implementing [`ByteStream`].
    pub fn new(stream: impl ByteStream + 'static) -> Self {
        Self(Box::new(stream))
    }
}

impl Deref for RawBackend {
    type Target = Box<dyn ByteStream>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for RawBackend {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Read for RawBackend {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for RawBackend {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}
