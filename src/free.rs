//! Free-segment records.

use crate::error::Result;
use crate::factory::Factory;
use crate::object::{Marshaler, Object, Unmarshaler};
use crate::reader::Reader;
use crate::types::{BIG_VERSION_OFFSET, START_BIG_FILE};
use crate::writer::Writer;

/// A free byte range `[first, last]` of a file.
///
/// Ranges ending past [`START_BIG_FILE`] are written in the extended form:
/// the version is raised by 1000 and both bounds become 64-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TFree {
    pub first: i64,
    pub last: i64,
}

impl TFree {
    pub const VERSION: i16 = 1;

    pub fn new(first: i64, last: i64) -> Self {
        Self { first, last }
    }

    /// Whether this range needs 64-bit bounds.
    pub fn is_big(&self) -> bool {
        self.last > START_BIG_FILE
    }
}

impl Marshaler for TFree {
    fn marshal_root(&self, w: &mut Writer) -> Result<usize> {
        w.status()?;
        let pos = w.pos();
        if self.is_big() {
            w.write_i16(Self::VERSION + BIG_VERSION_OFFSET);
            w.write_i64(self.first);
            w.write_i64(self.last);
        } else {
            w.write_i16(Self::VERSION);
            w.write_i32(self.first as i32);
            w.write_i32(self.last as i32);
        }
        w.status()?;
        Ok(w.pos() - pos)
    }
}

impl Unmarshaler for TFree {
    fn unmarshal_root(&mut self, r: &mut Reader<'_>) -> Result<()> {
        r.status()?;
        let version = r.read_i16();
        if version > BIG_VERSION_OFFSET {
            self.first = r.read_i64();
            self.last = r.read_i64();
        } else {
            self.first = r.read_i32().into();
            self.last = r.read_i32().into();
        }
        r.status()
    }
}

impl Object for TFree {
    fn class(&self) -> &str {
        "TFree"
    }

    fn rversion(&self) -> i16 {
        Self::VERSION
    }

    fn accepts_version(&self, version: i16) -> bool {
        version == Self::VERSION || version == Self::VERSION + BIG_VERSION_OFFSET
    }

    crate::impl_any!();
}

pub(crate) fn register(factory: &mut Factory) {
    factory.register_default::<TFree>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_form() {
        let free = TFree::new(100, 2_000_000_000);
        let mut w = Writer::new();
        assert_eq!(free.marshal_root(&mut w).unwrap(), 10);
        assert_eq!(hex::encode(w.as_bytes()), "00010000006477359400");

        let data = w.into_bytes();
        let mut got = TFree::default();
        got.unmarshal_root(&mut Reader::new(&data)).unwrap();
        assert_eq!(got, free);
    }

    #[test]
    fn test_big_form() {
        let free = TFree::new(2_000_000_000, 5_000_000_000);
        let mut w = Writer::new();
        assert_eq!(free.marshal_root(&mut w).unwrap(), 18);
        assert_eq!(&w.as_bytes()[..2], &1001i16.to_be_bytes());

        let data = w.into_bytes();
        let mut got = TFree::default();
        got.unmarshal_root(&mut Reader::new(&data)).unwrap();
        assert_eq!(got, free);
        assert!(got.accepts_version(1001));
    }

    #[test]
    fn test_truncated_big_form() {
        let mut w = Writer::new();
        TFree::new(0, i64::MAX).marshal_root(&mut w).unwrap();
        let data = w.into_bytes();

        let mut got = TFree::default();
        let mut r = Reader::new(&data[..10]);
        assert_eq!(got.unmarshal_root(&mut r), Err(crate::Error::UnexpectedEof));
    }
}
