//! Bounds-checked big-endian reader and writer over packet buffers.

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};

use crate::error::WireError;
use crate::protocol::ptp::dataset::{ClockIdentity, PortIdentity};
use crate::protocol::ptp::time::{TimeInternal, TimeRepresentation, V2TimeRepresentation};

/// Sequential reader that fails with [`WireError::TooShort`] instead of
/// reading past the end of the slice.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Start reading at offset 0.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Take the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(n).ok_or(WireError::TooShort {
            needed: usize::MAX,
            have: self.data.len(),
        })?;
        if end > self.data.len() {
            return Err(WireError::TooShort {
                needed: end,
                have: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Skip reserved bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), WireError> {
        self.take(n).map(|_| ())
    }

    /// Read one byte.
    pub fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    /// Read one signed byte.
    pub fn i8(&mut self) -> Result<i8, WireError> {
        Ok(i8::from_be_bytes([self.u8()?]))
    }

    /// Read a big-endian `u16`.
    pub fn u16(&mut self) -> Result<u16, WireError> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    /// Read a big-endian `i16`.
    pub fn i16(&mut self) -> Result<i16, WireError> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    /// Read a big-endian `u32`.
    pub fn u32(&mut self) -> Result<u32, WireError> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    /// Read a big-endian `i32`.
    pub fn i32(&mut self) -> Result<i32, WireError> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    /// Read a big-endian `i64`.
    pub fn i64(&mut self) -> Result<i64, WireError> {
        Ok(BigEndian::read_i64(self.take(8)?))
    }

    /// Read a fixed-size byte array.
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a v2 port identity (8 + 2 bytes).
    pub fn port_identity(&mut self) -> Result<PortIdentity, WireError> {
        let clock_identity = ClockIdentity(self.array()?);
        let port_number = self.u16()?;
        Ok(PortIdentity::new(clock_identity, port_number))
    }

    /// Read a v1 timestamp (4 + 4 bytes) and its half-epoch flag.
    pub fn v1_time(&mut self) -> Result<(TimeInternal, bool), WireError> {
        let repr = TimeRepresentation {
            seconds: self.u32()?,
            nanoseconds: self.u32()?,
        };
        Ok(repr.to_internal())
    }

    /// Read a v2 timestamp (2 + 4 + 4 bytes).
    pub fn v2_time(&mut self) -> Result<TimeInternal, WireError> {
        let repr = V2TimeRepresentation {
            epoch_number: self.u16()?,
            seconds: self.u32()?,
            nanoseconds: self.u32()?,
        };
        Ok(repr.to_internal())
    }
}

/// Big-endian writer into a growable buffer.
#[derive(Debug, Default)]
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    /// Writer with reserved capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write one byte.
    pub fn u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    /// Write one signed byte.
    pub fn i8(&mut self, v: i8) {
        self.buf.put_i8(v);
    }

    /// Write a big-endian `u16`.
    pub fn u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    /// Write a big-endian `i16`.
    pub fn i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    /// Write a big-endian `u32`.
    pub fn u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    /// Write a big-endian `i32`.
    pub fn i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    /// Write a big-endian `i64`.
    pub fn i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    /// Write raw bytes.
    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.put_slice(v);
    }

    /// Write `n` zero bytes.
    pub fn zeros(&mut self, n: usize) {
        self.buf.put_bytes(0, n);
    }

    /// Write a v2 port identity.
    pub fn port_identity(&mut self, id: &PortIdentity) {
        self.bytes(&id.clock_identity.0);
        self.u16(id.port_number);
    }

    /// Write a v1 timestamp.
    pub fn v1_time(&mut self, t: &TimeInternal, half_epoch: bool) {
        let repr = t.to_v1(half_epoch);
        self.u32(repr.seconds);
        self.u32(repr.nanoseconds);
    }

    /// Write a v2 timestamp.
    pub fn v2_time(&mut self, t: &TimeInternal, half_epoch: bool, epoch_number: u16) {
        let repr = t.to_v2(half_epoch, epoch_number);
        self.u16(repr.epoch_number);
        self.u32(repr.seconds);
        self.u32(repr.nanoseconds);
    }

    /// Overwrite a big-endian `u16` at `offset`.
    pub fn patch_u16(&mut self, offset: usize, v: u16) {
        BigEndian::write_u16(&mut self.buf[offset..offset + 2], v);
    }

    /// Finish and return the bytes.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}
