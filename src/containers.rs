//! Container classes: a polymorphic object array and the primitive arrays.

use crate::base::TObject;
use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::object::{Marshaler, Object, Unmarshaler};
use crate::reader::Reader;
use crate::writer::Writer;

/// Ordered array of polymorphic members, each written with a class tag.
#[derive(Debug, Default)]
pub struct TObjArray {
    pub obj: TObject,
    pub name: String,
    /// Lower bound of the index range.
    pub low: i32,
    pub objs: Vec<Option<Box<dyn Object>>>,
}

impl TObjArray {
    pub const VERSION: i16 = 3;

    pub fn new(objs: Vec<Box<dyn Object>>) -> Self {
        Self {
            objs: objs.into_iter().map(Some).collect(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.objs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objs.is_empty()
    }

    /// The member at `i`, if present and non-null.
    pub fn at(&self, i: usize) -> Option<&dyn Object> {
        self.objs.get(i).and_then(|o| o.as_deref())
    }
}

impl Marshaler for TObjArray {
    fn marshal_root(&self, w: &mut Writer) -> Result<usize> {
        w.status()?;
        let pos = w.write_version(Self::VERSION);
        self.obj.marshal_root(w)?;
        w.write_string(&self.name);
        w.write_count(self.objs.len());
        w.write_i32(self.low);
        for obj in &self.objs {
            w.write_object_any(obj.as_deref())?;
        }
        w.set_byte_count(pos, self.class())
    }
}

impl Unmarshaler for TObjArray {
    fn unmarshal_root(&mut self, r: &mut Reader<'_>) -> Result<()> {
        r.status()?;
        let frame = r.read_version(self.class());
        if frame.version > 2 {
            self.obj.unmarshal_root(r)?;
        }
        if frame.version > 1 {
            self.name = r.read_string();
        }
        let n = r.read_i32();
        self.low = r.read_i32();
        r.status()?;
        if n < 0 {
            let err = Error::custom(format!("negative TObjArray length {n}"));
            r.set_err(err.clone());
            return Err(err);
        }

        self.objs.clear();
        for _ in 0..n {
            let obj = r.read_object_any()?;
            self.objs.push(obj);
        }
        r.check_frame(&frame, self.class())
    }
}

/// Linked list of polymorphic members, each followed by its option string.
#[derive(Debug, Default)]
pub struct TList {
    pub obj: TObject,
    pub name: String,
    pub objs: Vec<Option<Box<dyn Object>>>,
    /// Option of each member, parallel to `objs`. Missing entries are
    /// written empty.
    pub opts: Vec<String>,
}

impl TList {
    pub const VERSION: i16 = 5;

    pub fn new(objs: Vec<Box<dyn Object>>) -> Self {
        Self {
            opts: vec![String::new(); objs.len()],
            objs: objs.into_iter().map(Some).collect(),
            ..Self::default()
        }
    }

    /// Appends a member with its option.
    pub fn push(&mut self, obj: Box<dyn Object>, opt: &str) {
        self.opts.resize(self.objs.len(), String::new());
        self.objs.push(Some(obj));
        self.opts.push(opt.to_string());
    }

    pub fn len(&self) -> usize {
        self.objs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objs.is_empty()
    }

    /// The member at `i`, if present and non-null.
    pub fn at(&self, i: usize) -> Option<&dyn Object> {
        self.objs.get(i).and_then(|o| o.as_deref())
    }

    /// The option stored with the member at `i`.
    pub fn opt(&self, i: usize) -> &str {
        self.opts.get(i).map_or("", String::as_str)
    }
}

impl Marshaler for TList {
    fn marshal_root(&self, w: &mut Writer) -> Result<usize> {
        w.status()?;
        let pos = w.write_version(Self::VERSION);
        self.obj.marshal_root(w)?;
        w.write_string(&self.name);
        w.write_count(self.objs.len());
        for (i, obj) in self.objs.iter().enumerate() {
            w.write_object_any(obj.as_deref())?;
            let opt = self.opt(i);
            let Ok(n) = u8::try_from(opt.len()) else {
                let msg = format!("TList option of {} bytes exceeds 255", opt.len());
                return Err(w.fail(Error::InvalidArgument(msg)));
            };
            w.write_u8(n);
            w.write_bytes(opt.as_bytes());
        }
        w.set_byte_count(pos, self.class())
    }
}

impl Unmarshaler for TList {
    fn unmarshal_root(&mut self, r: &mut Reader<'_>) -> Result<()> {
        r.status()?;
        let frame = r.read_version(self.class());
        self.obj.unmarshal_root(r)?;
        self.name = r.read_string();
        let n = r.read_i32();
        r.status()?;
        if n < 0 {
            return Err(r.fail(Error::custom(format!("negative TList length {n}"))));
        }

        self.objs.clear();
        self.opts.clear();
        for _ in 0..n {
            let obj = r.read_object_any()?;
            let nch = r.read_u8() as usize;
            let opt = String::from_utf8_lossy(r.read_bytes(nch)).into_owned();
            r.status()?;
            self.objs.push(obj);
            self.opts.push(opt);
        }
        r.check_frame(&frame, self.class())
    }
}

impl Object for TList {
    fn class(&self) -> &str {
        "TList"
    }

    fn rversion(&self) -> i16 {
        Self::VERSION
    }

    // Versions before 4 lack the TObject and name header.
    fn accepts_version(&self, version: i16) -> bool {
        (4..=Self::VERSION).contains(&version)
    }

    crate::impl_any!();
}

impl Object for TObjArray {
    fn class(&self) -> &str {
        "TObjArray"
    }

    fn rversion(&self) -> i16 {
        Self::VERSION
    }

    fn accepts_version(&self, version: i16) -> bool {
        (1..=Self::VERSION).contains(&version)
    }

    crate::impl_any!();
}

macro_rules! primitive_arrays {
    ($($name:ident, $class:literal, $ty:ty, $read:ident, $write:ident;)*) => {
        $(
            #[doc = concat!("`", $class, "`: an `i32` length then `", stringify!($ty), "` elements.")]
            #[derive(Debug, Clone, PartialEq, Default)]
            pub struct $name {
                pub data: Vec<$ty>,
            }

            impl $name {
                pub fn new(data: Vec<$ty>) -> Self {
                    Self { data }
                }
            }

            impl Marshaler for $name {
                fn marshal_root(&self, w: &mut Writer) -> Result<usize> {
                    w.status()?;
                    let pos = w.pos();
                    w.write_count(self.data.len());
                    w.$write(&self.data);
                    w.status()?;
                    Ok(w.pos() - pos)
                }
            }

            impl Unmarshaler for $name {
                fn unmarshal_root(&mut self, r: &mut Reader<'_>) -> Result<()> {
                    r.status()?;
                    let n = r.read_i32();
                    if n < 0 {
                        r.set_err(Error::custom(format!("negative {} length {n}", $class)));
                        return r.status();
                    }
                    self.data = r.$read(n as usize);
                    r.status()
                }
            }

            impl Object for $name {
                fn class(&self) -> &str {
                    $class
                }

                fn rversion(&self) -> i16 {
                    1
                }

                // Written without a record header.
                fn accepts_version(&self, _version: i16) -> bool {
                    true
                }

                crate::impl_any!();
            }
        )*

        pub(crate) fn register(factory: &mut Factory) {
            factory.register_default::<TObjArray>();
            factory.register_default::<TList>();
            $(factory.register_default::<$name>();)*
        }
    };
}

primitive_arrays! {
    TArrayC, "TArrayC", i8, read_fast_array_i8, write_fast_array_i8;
    TArrayS, "TArrayS", i16, read_fast_array_i16, write_fast_array_i16;
    TArrayI, "TArrayI", i32, read_fast_array_i32, write_fast_array_i32;
    TArrayL, "TArrayL", i64, read_fast_array_i64, write_fast_array_i64;
    TArrayL64, "TArrayL64", i64, read_fast_array_i64, write_fast_array_i64;
    TArrayF, "TArrayF", f32, read_fast_array_f32, write_fast_array_f32;
    TArrayD, "TArrayD", f64, read_fast_array_f64, write_fast_array_f64;
}
