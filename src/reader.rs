//! Decode cursor.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder};
use tracing::warn;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::types::{
    PackedRange, BYTE_COUNT_MASK, CLASS_MASK, LONG_STRING_MARKER, MAP_OFFSET,
    MAX_CLASS_NAME_LEN, MAX_NESTING_DEPTH, NEW_CLASS_TAG, NULL_TAG,
};

/// Header of an object record as returned by [`Reader::read_version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frame {
    /// Class version stored in the record.
    pub version: i16,
    /// Position of the record's first byte.
    pub pos: usize,
    /// Bytes of version + payload; 0 when the record carries no byte count.
    pub byte_count: u32,
}

/// Reader decodes values from a big-endian byte buffer.
///
/// The first error is latched: every read after it returns the zero value of
/// its type and leaves the position untouched, so a caller can chain many
/// reads and inspect [`Reader::status`] once at the end.
pub struct Reader<'a> {
    buffer: &'a [u8],
    pos: usize,
    offset: u32,
    err: Option<Error>,
    classes: HashMap<u32, String>,
    ctx: Option<&'a Context>,
    /// Object records currently being decoded.
    depth: usize,
}

macro_rules! fast_array_readers {
    ($($name:ident, $ty:ty, $size:expr, $get:ident;)*) => {
        $(
            #[doc = concat!("Reads `n` `", stringify!($ty), "` elements with no length prefix.")]
            pub fn $name(&mut self, n: usize) -> Vec<$ty> {
                match n.checked_mul($size).and_then(|len| self.take(len)) {
                    Some(src) => {
                        let mut out = vec![<$ty>::default(); n];
                        BigEndian::$get(src, &mut out);
                        out
                    }
                    None => {
                        self.set_err(Error::UnexpectedEof);
                        Vec::new()
                    }
                }
            }
        )*
    };
}

impl<'a> Reader<'a> {
    /// Creates a new reader from a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            buffer: data,
            pos: 0,
            offset: 0,
            err: None,
            classes: HashMap::new(),
            ctx: None,
            depth: 0,
        }
    }

    /// Creates a reader able to decode polymorphic members through `ctx`.
    pub fn with_context(data: &'a [u8], ctx: &'a Context) -> Self {
        Self {
            ctx: Some(ctx),
            ..Self::new(data)
        }
    }

    /// Sets the absolute offset of this buffer inside its enclosing record.
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// The decode context, if one is attached.
    pub fn context(&self) -> Option<&'a Context> {
        self.ctx
    }

    /// Returns the current position in the buffer.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Moves to `pos`; positions past the end latch an end-of-data error.
    pub fn set_pos(&mut self, pos: usize) {
        if self.err.is_some() {
            return;
        }
        if pos > self.buffer.len() {
            self.set_err(Error::UnexpectedEof);
            return;
        }
        self.pos = pos;
    }

    /// Total size of the buffer.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the number of bytes remaining.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.pos
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

    /// Consumes `n` bytes, latching end-of-data on overrun.
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.err.is_some() {
            return None;
        }
        if n > self.remaining() {
            self.set_err(Error::UnexpectedEof);
            return None;
        }
        let bytes = &self.buffer[self.pos..self.pos + n];
        self.pos += n;
        Some(bytes)
    }

    /// Reads raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> &'a [u8] {
        self.take(n).unwrap_or_default()
    }

    /// Advances past `n` bytes.
    pub fn skip(&mut self, n: usize) {
        self.take(n);
    }

    /// Reads a one-byte bool; any non-zero byte is true.
    pub fn read_bool(&mut self) -> bool {
        self.read_u8() != 0
    }

    /// Reads a signed byte.
    pub fn read_i8(&mut self) -> i8 {
        self.read_u8() as i8
    }

    /// Reads an unsigned byte.
    pub fn read_u8(&mut self) -> u8 {
        self.take(1).map(|b| b[0]).unwrap_or_default()
    }

    /// Reads a big-endian signed 16-bit integer.
    pub fn read_i16(&mut self) -> i16 {
        self.take(2).map(BigEndian::read_i16).unwrap_or_default()
    }

    /// Reads a big-endian unsigned 16-bit integer.
    pub fn read_u16(&mut self) -> u16 {
        self.take(2).map(BigEndian::read_u16).unwrap_or_default()
    }

    /// Reads a big-endian signed 32-bit integer.
    pub fn read_i32(&mut self) -> i32 {
        self.take(4).map(BigEndian::read_i32).unwrap_or_default()
    }

    /// Reads a big-endian unsigned 32-bit integer.
    pub fn read_u32(&mut self) -> u32 {
        self.take(4).map(BigEndian::read_u32).unwrap_or_default()
    }

    /// Reads a big-endian signed 64-bit integer.
    pub fn read_i64(&mut self) -> i64 {
        self.take(8).map(BigEndian::read_i64).unwrap_or_default()
    }

    /// Reads a big-endian unsigned 64-bit integer.
    pub fn read_u64(&mut self) -> u64 {
        self.take(8).map(BigEndian::read_u64).unwrap_or_default()
    }

    /// Reads a 32-bit float, bit pattern preserved.
    pub fn read_f32(&mut self) -> f32 {
        self.take(4).map(BigEndian::read_f32).unwrap_or_default()
    }

    /// Reads a 64-bit float, bit pattern preserved.
    pub fn read_f64(&mut self) -> f64 {
        self.take(8).map(BigEndian::read_f64).unwrap_or_default()
    }

    /// Reads a Double32 member written with the same range.
    pub fn read_f64_d32(&mut self, range: Option<&PackedRange>) -> f64 {
        match range {
            Some(r) if r.factor != 0.0 => {
                let raw = self.read_u32();
                if self.err.is_some() {
                    return 0.0;
                }
                r.unpack(raw)
            }
            Some(r) => match r.mantissa_bits() {
                Some(nbits) => self.read_truncated(nbits) as f64,
                None => self.read_f32() as f64,
            },
            None => self.read_f32() as f64,
        }
    }

    /// Reads a Float16 member written with the same range.
    pub fn read_f32_f16(&mut self, range: Option<&PackedRange>) -> f32 {
        match range {
            Some(r) if r.factor != 0.0 => {
                let raw = self.read_u32();
                if self.err.is_some() {
                    return 0.0;
                }
                r.unpack(raw) as f32
            }
            Some(r) => self.read_truncated(r.mantissa_bits().unwrap_or(12)),
            None => self.read_truncated(12),
        }
    }

    fn read_truncated(&mut self, nbits: u32) -> f32 {
        let exp = self.read_u8() as u32;
        let man = self.read_u16() as u32;
        if self.err.is_some() {
            return 0.0;
        }
        let bits = (exp << 23) | ((man & ((1 << (nbits + 1)) - 1)) << (23 - nbits));
        let v = f32::from_bits(bits);
        if man & (1 << (nbits + 1)) != 0 {
            -v
        } else {
            v
        }
    }

    /// Reads a length-prefixed string (1-byte length, or `0xFF` + `u32`).
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn read_string(&mut self) -> String {
        let mut n = self.read_u8() as usize;
        if n == LONG_STRING_MARKER as usize {
            n = self.read_u32() as usize;
        }
        self.take(n)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }

    /// Reads a C string of at most `n` bytes. Stops after a NUL; otherwise
    /// consumes exactly `n` bytes.
    pub fn read_cstring(&mut self, n: usize) -> String {
        if self.err.is_some() {
            return String::new();
        }
        let rest = &self.buffer[self.pos..];
        let window = &rest[..n.min(rest.len())];
        match window.iter().position(|&b| b == 0) {
            Some(i) => {
                self.pos += i + 1;
                String::from_utf8_lossy(&window[..i]).into_owned()
            }
            None if window.len() == n => {
                self.pos += n;
                String::from_utf8_lossy(window).into_owned()
            }
            None => {
                self.set_err(Error::UnexpectedEof);
                String::new()
            }
        }
    }

    /// Reads an `i32` length followed by that many elements.
    pub fn read_static_array_i32(&mut self) -> Vec<i32> {
        let n = self.read_i32();
        if n < 0 {
            self.set_err(Error::custom(format!("negative array length {n}")));
            return Vec::new();
        }
        self.read_fast_array_i32(n as usize)
    }

    /// Reads `n` one-byte bools with no length prefix.
    pub fn read_fast_array_bool(&mut self, n: usize) -> Vec<bool> {
        self.take(n)
            .map(|b| b.iter().map(|&x| x != 0).collect())
            .unwrap_or_default()
    }

    /// Reads `n` signed bytes with no length prefix.
    pub fn read_fast_array_i8(&mut self, n: usize) -> Vec<i8> {
        self.take(n)
            .map(|b| b.iter().map(|&x| x as i8).collect())
            .unwrap_or_default()
    }

    /// Reads `n` unsigned bytes with no length prefix.
    pub fn read_fast_array_u8(&mut self, n: usize) -> Vec<u8> {
        self.take(n).map(<[u8]>::to_vec).unwrap_or_default()
    }

    fast_array_readers! {
        read_fast_array_i16, i16, 2, read_i16_into;
        read_fast_array_u16, u16, 2, read_u16_into;
        read_fast_array_i32, i32, 4, read_i32_into;
        read_fast_array_u32, u32, 4, read_u32_into;
        read_fast_array_i64, i64, 8, read_i64_into;
        read_fast_array_u64, u64, 8, read_u64_into;
        read_fast_array_f32, f32, 4, read_f32_into;
        read_fast_array_f64, f64, 8, read_f64_into;
    }

    /// Reads `n` length-prefixed strings, stopping early on error.
    pub fn read_fast_array_string(&mut self, n: usize) -> Vec<String> {
        let mut out = Vec::new();
        for _ in 0..n {
            if self.err.is_some() {
                break;
            }
            out.push(self.read_string());
        }
        out
    }

    /// Reads a record header: byte count (when flagged) and version.
    ///
    /// Records without the byte count flag are rewound to their first byte
    /// and report a byte count of 0. A version of 0 is followed by a
    /// streamer checksum, resolved to a class version when the attached
    /// context knows it.
    pub fn read_version(&mut self, class: &str) -> Frame {
        let pos = self.pos;
        let mut frame = Frame {
            pos,
            ..Frame::default()
        };
        if self.err.is_some() {
            return frame;
        }

        let bcnt = self.read_u32();
        if bcnt & BYTE_COUNT_MASK != 0 {
            frame.byte_count = bcnt & !BYTE_COUNT_MASK;
        } else if self.err.is_none() {
            self.pos = pos;
        }
        frame.version = self.read_i16();

        if frame.version == 0 && self.err.is_none() {
            let checksum = self.read_u32();
            let resolved = self
                .ctx
                .and_then(|ctx| ctx.streamers().by_checksum(class, checksum));
            if let Some(info) = resolved {
                frame.version = info.class_version() as i16;
            }
        }
        frame
    }

    /// Checks that the record started at `start` consumed exactly its byte
    /// count. A mismatch is latched and reported; fields already decoded are
    /// left as they are.
    pub fn check_byte_count(
        &mut self,
        pos: usize,
        byte_count: u32,
        start: usize,
        class: &str,
    ) -> Result<()> {
        self.status()?;
        if byte_count == 0 {
            return Ok(());
        }
        let expected = byte_count as u64 + 4;
        let actual = self.pos.saturating_sub(start) as u64;
        if actual == expected {
            return Ok(());
        }
        warn!(class, pos, expected, actual, "byte count mismatch");
        Err(self.fail(Error::byte_count_mismatch(class, expected, actual)))
    }

    /// Shorthand for [`Reader::check_byte_count`] on a frame read at its own start.
    pub fn check_frame(&mut self, frame: &Frame, class: &str) -> Result<()> {
        self.check_byte_count(frame.pos, frame.byte_count, frame.pos, class)
    }

    /// Skips a whole record using its byte count, returning its version.
    pub fn skip_object(&mut self, class: &str) -> Result<i16> {
        let frame = self.read_version(class);
        self.status()?;
        if frame.byte_count == 0 {
            return Err(self.fail(Error::custom(format!(
                "cannot skip {class}: record carries no byte count"
            ))));
        }
        self.set_pos(frame.pos + frame.byte_count as usize + 4);
        self.status()?;
        Ok(frame.version)
    }

    /// Decodes `obj` one nesting level down. Past [`MAX_NESTING_DEPTH`]
    /// levels the record is refused and the error latched.
    pub(crate) fn unmarshal_nested(&mut self, obj: &mut dyn Object) -> Result<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.fail(Error::NestingTooDeep(MAX_NESTING_DEPTH)));
        }
        self.depth += 1;
        let res = obj.unmarshal_root(self);
        self.depth -= 1;
        res
    }

    /// Peeks the version of the record at the cursor without consuming it.
    pub(crate) fn peek_version(&self) -> Option<i16> {
        let rest = self.buffer.get(self.pos..)?;
        let flagged = rest.len() >= 6 && BigEndian::read_u32(rest) & BYTE_COUNT_MASK != 0;
        let at = if flagged { 4 } else { 0 };
        rest.get(at..at + 2).map(BigEndian::read_i16)
    }

    /// Reads a polymorphic member written by [`Writer::write_object_any`].
    ///
    /// The concrete type is found through the class tag and built by the
    /// attached context. A member whose class cannot be built is skipped
    /// using its byte count and reported without latching, so reading can
    /// continue after it.
    ///
    /// [`Writer::write_object_any`]: crate::Writer::write_object_any
    pub fn read_object_any(&mut self) -> Result<Option<Box<dyn Object>>> {
        self.status()?;
        let beg = self.pos;
        let bcnt = self.read_u32();
        let (tag, byte_count, start) = if bcnt & BYTE_COUNT_MASK == 0 || bcnt == NEW_CLASS_TAG {
            (bcnt, 0, None)
        } else {
            let start = self.pos;
            (self.read_u32(), bcnt & !BYTE_COUNT_MASK, Some(start))
        };
        self.status()?;

        let class = if tag & CLASS_MASK == 0 {
            if tag == NULL_TAG {
                return Ok(None);
            }
            return Err(self.fail(Error::UnsupportedReference(tag)));
        } else if tag == NEW_CLASS_TAG {
            let class = self.read_cstring(MAX_CLASS_NAME_LEN);
            self.status()?;
            let key = match start {
                Some(start) => start as u32 + self.offset + MAP_OFFSET,
                None => self.classes.len() as u32 + 1,
            };
            self.classes.insert(key, class.clone());
            class
        } else {
            let key = tag & !CLASS_MASK;
            match self.classes.get(&key) {
                Some(class) => class.clone(),
                None => return Err(self.fail(Error::UnknownClassTag(key))),
            }
        };

        let Some(ctx) = self.ctx else {
            return Err(self.fail(Error::NoContext));
        };
        let mut obj = match ctx.instantiate(&class, self.peek_version()) {
            Ok(obj) => obj,
            Err(err) if byte_count != 0 => {
                self.set_pos(beg + byte_count as usize + 4);
                return Err(err);
            }
            Err(err) => return Err(self.fail(err)),
        };
        self.unmarshal_nested(&mut *obj)?;
        self.check_byte_count(beg, byte_count, beg, &class)?;
        Ok(Some(obj))
    }
}
