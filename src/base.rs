//! Base classes every persisted object builds on.

use crate::error::Result;
use crate::factory::Factory;
use crate::object::{Marshaler, Object, Unmarshaler};
use crate::reader::Reader;
use crate::types::{IS_ON_HEAP, IS_REFERENCED, NOT_DELETED, UUID_SIZE};
use crate::writer::Writer;

/// Root of the class hierarchy: a unique id and status bits.
///
/// Written with a bare version (no byte count).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TObject {
    pub id: u32,
    pub bits: u32,
    /// Process id slot, present on the wire only for referenced objects.
    pub pidf: u16,
}

impl TObject {
    pub const VERSION: i16 = 1;
}

impl Default for TObject {
    fn default() -> Self {
        Self {
            id: 0,
            bits: IS_ON_HEAP | NOT_DELETED,
            pidf: 0,
        }
    }
}

impl Marshaler for TObject {
    fn marshal_root(&self, w: &mut Writer) -> Result<usize> {
        w.status()?;
        let pos = w.pos();
        w.write_i16(Self::VERSION);
        w.write_u32(self.id);
        w.write_u32(self.bits);
        if self.bits & IS_REFERENCED != 0 {
            w.write_u16(self.pidf);
        }
        w.status()?;
        Ok(w.pos() - pos)
    }
}

impl Unmarshaler for TObject {
    fn unmarshal_root(&mut self, r: &mut Reader<'_>) -> Result<()> {
        r.status()?;
        let frame = r.read_version(self.class());
        self.id = r.read_u32();
        self.bits = r.read_u32();
        if self.bits & IS_REFERENCED != 0 {
            self.pidf = r.read_u16();
        }
        r.check_frame(&frame, self.class())
    }
}

impl Object for TObject {
    fn class(&self) -> &str {
        "TObject"
    }

    fn rversion(&self) -> i16 {
        Self::VERSION
    }

    crate::impl_any!();
}

/// An object with a name and a title.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TNamed {
    pub obj: TObject,
    pub name: String,
    pub title: String,
}

impl TNamed {
    pub const VERSION: i16 = 1;

    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            obj: TObject::default(),
            name: name.into(),
            title: title.into(),
        }
    }
}

impl Marshaler for TNamed {
    fn marshal_root(&self, w: &mut Writer) -> Result<usize> {
        w.status()?;
        let pos = w.write_version(Self::VERSION);
        self.obj.marshal_root(w)?;
        w.write_string(&self.name);
        w.write_string(&self.title);
        w.set_byte_count(pos, self.class())
    }
}

impl Unmarshaler for TNamed {
    fn unmarshal_root(&mut self, r: &mut Reader<'_>) -> Result<()> {
        r.status()?;
        let frame = r.read_version(self.class());
        self.obj.unmarshal_root(r)?;
        self.name = r.read_string();
        self.title = r.read_string();
        r.check_frame(&frame, self.class())
    }
}

impl Object for TNamed {
    fn class(&self) -> &str {
        "TNamed"
    }

    fn rversion(&self) -> i16 {
        Self::VERSION
    }

    crate::impl_any!();
}

/// A string wrapped as a collectable object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TObjString {
    pub obj: TObject,
    pub string: String,
}

impl TObjString {
    pub const VERSION: i16 = 1;

    pub fn new(string: impl Into<String>) -> Self {
        Self {
            obj: TObject::default(),
            string: string.into(),
        }
    }
}

impl Marshaler for TObjString {
    fn marshal_root(&self, w: &mut Writer) -> Result<usize> {
        w.status()?;
        let pos = w.write_version(Self::VERSION);
        self.obj.marshal_root(w)?;
        w.write_string(&self.string);
        w.set_byte_count(pos, self.class())
    }
}

impl Unmarshaler for TObjString {
    fn unmarshal_root(&mut self, r: &mut Reader<'_>) -> Result<()> {
        r.status()?;
        let frame = r.read_version(self.class());
        self.obj.unmarshal_root(r)?;
        self.string = r.read_string();
        r.check_frame(&frame, self.class())
    }
}

impl Object for TObjString {
    fn class(&self) -> &str {
        "TObjString"
    }

    fn rversion(&self) -> i16 {
        Self::VERSION
    }

    crate::impl_any!();
}

/// A 128-bit universally unique identifier, written as a bare version
/// followed by its 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TUUID {
    pub bytes: [u8; UUID_SIZE],
}

impl TUUID {
    pub const VERSION: i16 = 1;

    pub fn new(bytes: [u8; UUID_SIZE]) -> Self {
        Self { bytes }
    }
}

impl Marshaler for TUUID {
    fn marshal_root(&self, w: &mut Writer) -> Result<usize> {
        w.status()?;
        let pos = w.pos();
        w.write_i16(Self::VERSION);
        w.write_bytes(&self.bytes);
        w.status()?;
        Ok(w.pos() - pos)
    }
}

impl Unmarshaler for TUUID {
    fn unmarshal_root(&mut self, r: &mut Reader<'_>) -> Result<()> {
        r.status()?;
        r.read_i16();
        if let Ok(bytes) = <[u8; UUID_SIZE]>::try_from(r.read_bytes(UUID_SIZE)) {
            self.bytes = bytes;
        }
        r.status()
    }
}

impl Object for TUUID {
    fn class(&self) -> &str {
        "TUUID"
    }

    fn rversion(&self) -> i16 {
        Self::VERSION
    }

    crate::impl_any!();
}

pub(crate) fn register(factory: &mut Factory) {
    factory.register_default::<TObject>();
    factory.register_default::<TNamed>();
    factory.register_default::<TObjString>();
    factory.register_default::<TUUID>();
}
