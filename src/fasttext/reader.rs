//! Little-endian reader for the fastText binary format
//!
//! Tracks how many bytes remain in the file so that length fields read from
//! a corrupt file are rejected as invalid data instead of being handed to the
//! allocator. Genuine allocation failures surface as
//! [`io::ErrorKind::OutOfMemory`].

use std::collections::TryReserveError;
use std::io::{self, Read};

/// Floats decoded per read call
const CHUNK_FLOATS: usize = 16 * 1024;

pub(crate) struct ModelReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> ModelReader<R> {
    /// Wrap `inner`, which holds `len` bytes
    pub(crate) fn new(inner: R, len: u64) -> Self {
        Self {
            inner,
            remaining: len,
        }
    }

    fn consume(&mut self, bytes: u64) -> io::Result<()> {
        if bytes > self.remaining {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "model file truncated: needed {} more bytes, {} left",
                    bytes, self.remaining
                ),
            ));
        }
        self.remaining -= bytes;
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        self.consume(N as u64)?;
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub(crate) fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub(crate) fn read_i8(&mut self) -> io::Result<i8> {
        Ok(i8::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_bool(&mut self) -> io::Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub(crate) fn read_i32(&mut self) -> io::Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_i64(&mut self) -> io::Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_f64(&mut self) -> io::Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Read a NUL-terminated byte string (terminator not included)
    pub(crate) fn read_cstring(&mut self) -> io::Result<Box<[u8]>> {
        let mut bytes = Vec::new();
        loop {
            match self.read_u8()? {
                0 => return Ok(bytes.into_boxed_slice()),
                b => bytes.push(b),
            }
        }
    }

    /// Read `len` raw bytes
    pub(crate) fn read_bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        self.consume(len as u64)?;
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(len).map_err(out_of_memory)?;
        bytes.resize(len, 0);
        self.inner.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    /// Read `len` little-endian f32 values
    pub(crate) fn read_f32_vec(&mut self, len: usize) -> io::Result<Vec<f32>> {
        let byte_len = (len as u64)
            .checked_mul(4)
            .ok_or_else(|| invalid_data("float array length overflows"))?;
        self.consume(byte_len)?;

        let mut values = Vec::new();
        values.try_reserve_exact(len).map_err(out_of_memory)?;

        let mut buf = vec![0u8; CHUNK_FLOATS.min(len.max(1)) * 4];
        let mut left = len;
        while left > 0 {
            let n = left.min(CHUNK_FLOATS);
            let chunk = &mut buf[..n * 4];
            self.inner.read_exact(chunk)?;
            values.extend(
                chunk
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            );
            left -= n;
        }
        Ok(values)
    }
}

/// Convert a length field, rejecting negative values
pub(crate) fn checked_len(value: i64, what: &str) -> io::Result<usize> {
    usize::try_from(value).map_err(|_| invalid_data(format!("negative {}: {}", what, value)))
}

pub(crate) fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

pub(crate) fn out_of_memory(err: TryReserveError) -> io::Error {
    io::Error::new(io::ErrorKind::OutOfMemory, err)
}
