//! Encode cursor.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::object::Object;
use crate::types::{
    PackedRange, BYTE_COUNT_MASK, CLASS_MASK, LONG_STRING_MARKER, MAP_OFFSET, MAX_MAP_COUNT,
    NEW_CLASS_TAG, NULL_TAG,
};

/// Writer encodes values into a growable, big-endian byte buffer.
///
/// The first error is latched: every write after it is a no-op, so a caller
/// can chain many writes and inspect [`Writer::status`] once at the end.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
    c: usize,
    offset: u32,
    err: Option<Error>,
    classes: HashMap<String, u32>,
}

macro_rules! fast_array_writers {
    ($($name:ident, $ty:ty, $size:expr, $put:ident;)*) => {
        $(
            #[doc = concat!("Writes `", stringify!($ty), "` elements with no length prefix.")]
            pub fn $name(&mut self, v: &[$ty]) {
                if let Some(dst) = self.slot($size * v.len()) {
                    BigEndian::$put(v, dst);
                }
            }
        )*
    };
}

impl Writer {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer whose backing store starts at `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            ..Self::default()
        }
    }

    /// Sets the absolute offset of this buffer inside its enclosing record.
    ///
    /// Class tags recorded by [`Writer::write_object_any`] include it.
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Number of bytes written.
    pub fn len(&self) -> usize {
        self.c
    }

    /// Returns true if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.c == 0
    }

    /// Size of the backing store.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Current write position.
    pub fn pos(&self) -> usize {
        self.c
    }

    /// Absolute offset of this buffer inside its enclosing record.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Returns the encoded bytes as a slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.c]
    }

    /// Consumes the writer and returns the encoded bytes.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.buf.truncate(self.c);
        self.buf
    }

    /// Resets the writer for reuse, keeping the backing store.
    pub fn reset(&mut self) {
        self.c = 0;
        self.err = None;
        self.classes.clear();
    }

    /// The latched error, if any.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Latches `err` unless an error is already latched.
    pub fn set_err(&mut self, err: Error) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    /// `Ok` while no error is latched, otherwise a copy of the latched error.
    pub fn status(&self) -> Result<()> {
        match &self.err {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Latches `err` (unless already latched) and hands it back for returning.
    pub(crate) fn fail(&mut self, err: Error) -> Error {
        self.set_err(err.clone());
        err
    }

    /// Grows the backing store by `n` bytes.
    ///
    /// A request at least as large as the current store doubles it first;
    /// smaller requests extend it by exactly `n`. Negative requests are a
    /// caller bug and are rejected without latching.
    pub fn grow(&mut self, n: isize) -> Result<()> {
        if n < 0 {
            return Err(Error::InvalidArgument(format!("negative growth request: {n}")));
        }
        self.status()?;
        self.grow_by(n as usize);
        Ok(())
    }

    fn grow_by(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let cap = self.buf.len();
        let new_cap = if n >= cap { 2 * cap + n } else { cap + n };
        self.buf.resize(new_cap, 0);
    }

    /// Reserves `n` bytes at the cursor and advances past them.
    fn slot(&mut self, n: usize) -> Option<&mut [u8]> {
        if self.err.is_some() {
            return None;
        }
        let end = self.c + n;
        if end > self.buf.len() {
            self.grow_by(end - self.buf.len());
        }
        let beg = self.c;
        self.c = end;
        Some(&mut self.buf[beg..end])
    }

    /// Writes raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        if let Some(dst) = self.slot(data.len()) {
            dst.copy_from_slice(data);
        }
    }

    /// Writes a bool as one byte.
    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(v as u8);
    }

    /// Writes a signed byte.
    pub fn write_i8(&mut self, v: i8) {
        self.write_u8(v as u8);
    }

    /// Writes an unsigned byte.
    pub fn write_u8(&mut self, v: u8) {
        if let Some(dst) = self.slot(1) {
            dst[0] = v;
        }
    }

    /// Writes a big-endian signed 16-bit integer.
    pub fn write_i16(&mut self, v: i16) {
        if let Some(dst) = self.slot(2) {
            BigEndian::write_i16(dst, v);
        }
    }

    /// Writes a big-endian unsigned 16-bit integer.
    pub fn write_u16(&mut self, v: u16) {
        if let Some(dst) = self.slot(2) {
            BigEndian::write_u16(dst, v);
        }
    }

    /// Writes a big-endian signed 32-bit integer.
    pub fn write_i32(&mut self, v: i32) {
        if let Some(dst) = self.slot(4) {
            BigEndian::write_i32(dst, v);
        }
    }

    /// Writes a big-endian unsigned 32-bit integer.
    pub fn write_u32(&mut self, v: u32) {
        if let Some(dst) = self.slot(4) {
            BigEndian::write_u32(dst, v);
        }
    }

    /// Writes a big-endian signed 64-bit integer.
    pub fn write_i64(&mut self, v: i64) {
        if let Some(dst) = self.slot(8) {
            BigEndian::write_i64(dst, v);
        }
    }

    /// Writes a big-endian unsigned 64-bit integer.
    pub fn write_u64(&mut self, v: u64) {
        if let Some(dst) = self.slot(8) {
            BigEndian::write_u64(dst, v);
        }
    }

    /// Writes a 32-bit float, bit pattern preserved.
    pub fn write_f32(&mut self, v: f32) {
        if let Some(dst) = self.slot(4) {
            BigEndian::write_f32(dst, v);
        }
    }

    /// Writes a 64-bit float, bit pattern preserved.
    pub fn write_f64(&mut self, v: f64) {
        if let Some(dst) = self.slot(8) {
            BigEndian::write_f64(dst, v);
        }
    }

    /// Writes a Double32 member: packed into `[xmin, xmax]` when the range
    /// carries a factor, truncated-mantissa when it carries a bit count,
    /// plain `f32` otherwise.
    pub fn write_f64_d32(&mut self, v: f64, range: Option<&PackedRange>) {
        match range {
            Some(r) if r.factor != 0.0 => self.write_u32(r.pack(v)),
            Some(r) => match r.mantissa_bits() {
                Some(nbits) => self.write_truncated(v as f32, nbits),
                None => self.write_f32(v as f32),
            },
            None => self.write_f32(v as f32),
        }
    }

    /// Writes a Float16 member. Without a range, 12 mantissa bits are kept.
    pub fn write_f32_f16(&mut self, v: f32, range: Option<&PackedRange>) {
        match range {
            Some(r) if r.factor != 0.0 => self.write_u32(r.pack(v as f64)),
            Some(r) => self.write_truncated(v, r.mantissa_bits().unwrap_or(12)),
            None => self.write_truncated(v, 12),
        }
    }

    fn write_truncated(&mut self, v: f32, nbits: u32) {
        let bits = v.to_bits();
        let exp = ((bits << 1) >> 24) as u8;
        let mut man = ((1u32 << (nbits + 1)) - 1) & (bits >> (23 - nbits - 1));
        man += 1;
        man >>= 1;
        if man & (1 << nbits) != 0 {
            man = (1 << nbits) - 1;
        }
        if v < 0.0 {
            man |= 1 << (nbits + 1);
        }
        self.write_u8(exp);
        self.write_u16(man as u16);
    }

    /// Writes a string with a 1-byte length, escalating to `0xFF` + `u32`
    /// for lengths of 255 and more.
    pub fn write_string(&mut self, v: &str) {
        let n = v.len();
        if n < LONG_STRING_MARKER as usize {
            self.write_u8(n as u8);
        } else {
            let Ok(len) = u32::try_from(n) else {
                self.set_err(Error::InvalidArgument(format!(
                    "string of {n} bytes does not fit a 32-bit length"
                )));
                return;
            };
            self.write_u8(LONG_STRING_MARKER);
            self.write_u32(len);
        }
        self.write_bytes(v.as_bytes());
    }

    /// Writes a NUL-terminated string, stopping at an embedded NUL.
    pub fn write_cstring(&mut self, v: &str) {
        let b = v.as_bytes();
        match b.iter().position(|&x| x == 0) {
            Some(i) => self.write_bytes(&b[..=i]),
            None => {
                self.write_bytes(b);
                self.write_u8(0);
            }
        }
    }

    /// Writes an element count as an `i32`. Counts past `i32::MAX` latch
    /// an invalid-argument error and write nothing.
    pub fn write_count(&mut self, n: usize) {
        match i32::try_from(n) {
            Ok(n) => self.write_i32(n),
            Err(_) => self.set_err(Error::InvalidArgument(format!(
                "count {n} does not fit a 32-bit length"
            ))),
        }
    }

    /// Writes an `i32` length followed by the elements.
    pub fn write_static_array_i32(&mut self, v: &[i32]) {
        self.write_count(v.len());
        self.write_fast_array_i32(v);
    }

    /// Writes bools as one byte each, with no length prefix.
    pub fn write_fast_array_bool(&mut self, v: &[bool]) {
        if let Some(dst) = self.slot(v.len()) {
            for (d, &s) in dst.iter_mut().zip(v) {
                *d = s as u8;
            }
        }
    }

    /// Writes signed bytes with no length prefix.
    pub fn write_fast_array_i8(&mut self, v: &[i8]) {
        if let Some(dst) = self.slot(v.len()) {
            for (d, &s) in dst.iter_mut().zip(v) {
                *d = s as u8;
            }
        }
    }

    /// Writes unsigned bytes with no length prefix.
    pub fn write_fast_array_u8(&mut self, v: &[u8]) {
        self.write_bytes(v);
    }

    fast_array_writers! {
        write_fast_array_i16, i16, 2, write_i16_into;
        write_fast_array_u16, u16, 2, write_u16_into;
        write_fast_array_i32, i32, 4, write_i32_into;
        write_fast_array_u32, u32, 4, write_u32_into;
        write_fast_array_i64, i64, 8, write_i64_into;
        write_fast_array_u64, u64, 8, write_u64_into;
        write_fast_array_f32, f32, 4, write_f32_into;
        write_fast_array_f64, f64, 8, write_f64_into;
    }

    /// Writes strings back to back, each with its own length prefix.
    pub fn write_fast_array_string(&mut self, v: &[String]) {
        for s in v {
            self.write_string(s);
        }
    }

    /// Opens an object record: byte count placeholder plus `version`.
    /// Returns the mark to hand to [`Writer::set_byte_count`].
    pub fn write_version(&mut self, version: i16) -> usize {
        let pos = self.c;
        self.write_u32(0);
        self.write_i16(version);
        pos
    }

    /// Opens a record for a class identified by streamer checksum rather
    /// than by version (version 0, then the checksum).
    pub fn write_version_checksum(&mut self, checksum: u32) -> usize {
        let pos = self.write_version(0);
        self.write_u32(checksum);
        pos
    }

    /// Closes the record opened at `beg`, back-patching its byte count.
    /// Returns the size of the whole record, byte count field included.
    pub fn set_byte_count(&mut self, beg: usize, class: &str) -> Result<usize> {
        self.status()?;
        if beg + 4 > self.c {
            let msg = format!("record mark {beg} past write position {} for {class}", self.c);
            return Err(self.fail(Error::InvalidArgument(msg)));
        }
        let count = self.c - beg - 4;
        if count > MAX_MAP_COUNT as usize {
            return Err(self.fail(Error::ByteCountTooLarge {
                class: class.to_string(),
                count: count as u64,
            }));
        }
        BigEndian::write_u32(&mut self.buf[beg..beg + 4], count as u32 | BYTE_COUNT_MASK);
        Ok(count + 4)
    }

    /// Writes a polymorphic member: byte count, class tag, then the object.
    /// `None` writes a null tag.
    ///
    /// A member that fails to encode leaves a partial record behind, so its
    /// error is latched and the rest of the buffer is refused.
    pub fn write_object_any(&mut self, obj: Option<&dyn Object>) -> Result<usize> {
        self.status()?;
        let Some(obj) = obj else {
            self.write_u32(NULL_TAG);
            return self.status().map(|_| 4);
        };
        let beg = self.c;
        self.write_u32(0);
        self.write_class(obj.class());
        if let Err(err) = obj.marshal_root(self) {
            return Err(self.fail(err));
        }
        self.set_byte_count(beg, obj.class())
    }

    fn write_class(&mut self, class: &str) {
        if let Some(&tag) = self.classes.get(class) {
            self.write_u32(tag | CLASS_MASK);
            return;
        }
        let tag = self.c as u32 + self.offset + MAP_OFFSET;
        self.classes.insert(class.to_string(), tag);
        self.write_u32(NEW_CLASS_TAG);
        self.write_cstring(class);
    }
}
