//! Bit-level output for entropy-coded segments.
//!
//! [`BitWriter`] accumulates Huffman codes in a 64-bit buffer and stores
//! complete words with JPEG byte stuffing (0xFF -> 0xFF 0x00). The bytes it
//! produces are handed to a [`Destination`], a bounded buffer in front of the
//! caller's `io::Write` sink.

use std::io::{ErrorKind, Write};

use crate::error::{Error, Result};

/// Size of the bit buffer in bits
const BIT_BUF_SIZE: i32 = 64;

/// Default capacity of the destination buffer.
pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 64 * 1024;

/// True if any byte of `x` is zero.
#[inline(always)]
const fn has_zero_byte(x: u64) -> bool {
    x.wrapping_sub(0x0101_0101_0101_0101) & !x & 0x8080_8080_8080_8080 != 0
}

/// Bounded output buffer draining into an `io::Write` sink.
///
/// The sink may apply backpressure by accepting zero bytes or returning
/// `WouldBlock`. The encoder cannot resume a partially written codestream, so
/// either case ends the session with [`Error::OutputSuspended`].
#[derive(Debug)]
pub struct Destination<W: Write> {
    sink: W,
    buffer: Vec<u8>,
    capacity: usize,
    bytes_written: u64,
}

impl<W: Write> Destination<W> {
    /// Creates a destination with a buffer of `capacity` bytes (at least 1).
    pub fn new(sink: W, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sink,
            buffer: Vec::with_capacity(capacity.min(DEFAULT_OUTPUT_BUFFER_SIZE)),
            capacity,
            bytes_written: 0,
        }
    }

    /// Appends `bytes`, draining to the sink whenever the buffer fills.
    ///
    /// `context` names the encoder stage in a suspension error.
    pub fn write_all(&mut self, mut bytes: &[u8], context: &'static str) -> Result<()> {
        while !bytes.is_empty() {
            if self.buffer.len() >= self.capacity {
                self.drain(context)?;
            }
            let len = (self.capacity - self.buffer.len()).min(bytes.len());
            self.buffer.extend_from_slice(&bytes[..len]);
            self.bytes_written += len as u64;
            bytes = &bytes[len..];
        }
        Ok(())
    }

    /// Moves every buffered byte into the sink.
    pub fn drain(&mut self, context: &'static str) -> Result<()> {
        let mut pos = 0;
        while pos < self.buffer.len() {
            match self.sink.write(&self.buffer[pos..]) {
                Ok(0) => return Err(Error::OutputSuspended { context }),
                Ok(n) => pos += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return Err(Error::OutputSuspended { context })
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.buffer.clear();
        Ok(())
    }

    /// Drains the buffer, flushes the sink and returns it.
    pub fn finish(mut self) -> Result<W> {
        self.drain("finish_compress")?;
        loop {
            match self.sink.flush() {
                Ok(()) => return Ok(self.sink),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return Err(Error::OutputSuspended {
                        context: "finish_compress",
                    })
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Total bytes accepted so far, buffered or drained.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Buffer capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Bit writer for entropy-coded scan data.
///
/// Writing a zero-length code marks the writer unhealthy: that is how a
/// symbol missing from its Huffman table shows up, and the scan encoder turns
/// it into [`Error::UnhealthyBitWriter`] once the scan is done.
#[derive(Debug)]
pub struct BitWriter {
    /// Stuffed output bytes not yet handed to the destination
    data: Vec<u8>,
    /// Bit accumulator, filled from the most significant bit
    put_buffer: u64,
    /// Number of free bits remaining in the accumulator
    free_bits: i32,
    healthy: bool,
}

impl BitWriter {
    /// Creates a new bit writer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a new bit writer with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            put_buffer: 0,
            free_bits: BIT_BUF_SIZE,
            healthy: true,
        }
    }

    /// Appends the low `nbits` bits of `bits`, most significant first.
    ///
    /// `nbits` of 0 or above 64 writes nothing and clears the healthy flag.
    #[inline]
    pub fn write_bits(&mut self, nbits: u32, bits: u64) {
        if nbits == 0 || nbits > 64 {
            self.healthy = false;
            return;
        }
        self.free_bits -= nbits as i32;
        if self.free_bits < 0 {
            let overflow = (-self.free_bits) as u32;
            self.put_buffer |= bits.checked_shr(overflow).unwrap_or(0);
            self.discharge();
            self.free_bits += BIT_BUF_SIZE;
            self.put_buffer = bits.checked_shl(self.free_bits as u32).unwrap_or(0);
        } else {
            self.put_buffer |= bits.checked_shl(self.free_bits as u32).unwrap_or(0);
        }
    }

    /// Stores the full accumulator word.
    #[inline]
    fn discharge(&mut self) {
        let word = self.put_buffer;
        if has_zero_byte(!word) {
            for byte in word.to_be_bytes() {
                self.emit_byte(byte);
            }
        } else {
            self.data.extend_from_slice(&word.to_be_bytes());
        }
    }

    #[inline]
    fn emit_byte(&mut self, byte: u8) {
        self.data.push(byte);
        if byte == 0xFF {
            self.data.push(0x00);
        }
    }

    /// Emits pending bits and pads the last partial byte with 1-bits.
    pub fn jump_to_byte_boundary(&mut self) {
        let pad_pattern = ((1u32 << (self.free_bits & 7)) - 1) as u8;
        while self.free_bits <= 56 {
            self.emit_byte((self.put_buffer >> 56) as u8);
            self.put_buffer <<= 8;
            self.free_bits += 8;
        }
        if self.free_bits < BIT_BUF_SIZE {
            let pad_mask = 0xFFu8 >> (BIT_BUF_SIZE - self.free_bits);
            let byte = ((self.put_buffer >> 56) as u8 & !pad_mask) | pad_pattern;
            self.emit_byte(byte);
        }
        self.put_buffer = 0;
        self.free_bits = BIT_BUF_SIZE;
    }

    /// Writes the two-byte marker `FF m` without stuffing.
    ///
    /// The writer must be byte aligned.
    pub fn emit_marker(&mut self, marker: u8) {
        debug_assert_eq!(self.free_bits, BIT_BUF_SIZE);
        self.data.push(0xFF);
        self.data.push(marker);
    }

    /// Moves the completed bytes into `dest`.
    pub fn empty_into<W: Write>(
        &mut self,
        dest: &mut Destination<W>,
        context: &'static str,
    ) -> Result<()> {
        dest.write_all(&self.data, context)?;
        self.data.clear();
        Ok(())
    }

    /// False once a zero-length code was written.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Number of completed bytes held by the writer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if no completed bytes are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Completed bytes held by the writer.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}
