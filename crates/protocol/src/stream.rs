//! Byte-stream adapters for RPC transports.
//!
//! The engine treats the wire format below its remote store as opaque; the
//! adapters here wrap whatever byte stream a transport provides.
//! [`CountingStream`] feeds wire-byte counters so transfer totals stay
//! observable, and [`CompressedStream`] pairs a streaming decompressor with
//! a compressor that flushes on every write, so request and response
//! boundaries are never buffered across calls.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

/// Counts bytes moving through an underlying stream.
#[derive(Debug)]
pub struct CountingStream<S> {
    inner: S,
    read_bytes: Arc<AtomicU64>,
    written_bytes: Arc<AtomicU64>,
}

impl<S> CountingStream<S> {
    /// Wraps `inner`, adding every transferred byte count to the supplied
    /// counters.
    #[must_use]
    pub fn new(inner: S, read_bytes: Arc<AtomicU64>, written_bytes: Arc<AtomicU64>) -> Self {
        Self {
            inner,
            read_bytes,
            written_bytes,
        }
    }

    /// Returns the wrapped stream.
    #[must_use]
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Read> Read for CountingStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read_bytes.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

impl<S: Write> Write for CountingStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written_bytes.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Transparent compression over a bidirectional byte stream.
///
/// Every write is followed by a sync flush so the peer can decode the
/// request immediately; nothing is held back waiting for more payload.
pub struct CompressedStream<R: Read, W: Write> {
    reader: DeflateDecoder<R>,
    writer: DeflateEncoder<W>,
}

impl<R: Read, W: Write> CompressedStream<R, W> {
    /// Wraps the receive and transmit halves of a transport.
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: DeflateDecoder::new(reader),
            writer: DeflateEncoder::new(writer, Compression::default()),
        }
    }
}

impl<R: Read, W: Write> Read for CompressedStream<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl<R: Read, W: Write> Write for CompressedStream<R, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.writer.flush()?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
