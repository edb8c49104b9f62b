//! Object codec contract.
//!
//! Every persisted type encodes itself through [`Marshaler`] and decodes
//! itself through [`Unmarshaler`]. Types that can appear behind a class tag
//! (and so must be reconstructible by name from the [`Factory`]) also
//! implement [`Object`].
//!
//! [`Factory`]: crate::Factory

use std::any::Any;
use std::fmt::Debug;

use crate::error::Result;
use crate::reader::Reader;
use crate::writer::Writer;

/// Encodes a value into a writer, returning the number of bytes written.
pub trait Marshaler {
    fn marshal_root(&self, w: &mut Writer) -> Result<usize>;
}

/// Decodes a value in place from a reader.
pub trait Unmarshaler {
    fn unmarshal_root(&mut self, r: &mut Reader<'_>) -> Result<()>;
}

/// A polymorphically decodable type.
pub trait Object: Marshaler + Unmarshaler + Debug + Send + Sync + 'static {
    /// Class name used in class tags and factory lookups.
    fn class(&self) -> &str;

    /// Class version this type writes.
    fn rversion(&self) -> i16;

    /// Whether the compiled decoder understands a stored version.
    fn accepts_version(&self, version: i16) -> bool {
        version == self.rversion()
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl dyn Object {
    /// Returns true if the concrete type is `T`.
    pub fn is<T: Object>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Object>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Converts into the concrete type, handing the object back on mismatch.
    pub fn downcast<T: Object>(self: Box<Self>) -> std::result::Result<Box<T>, Box<dyn Object>> {
        if self.is::<T>() {
            match self.into_any().downcast::<T>() {
                Ok(obj) => Ok(obj),
                Err(_) => unreachable!("type checked above"),
            }
        } else {
            Err(self)
        }
    }
}

/// Implements the `Any` plumbing of [`Object`] inside an `impl Object` block.
#[macro_export]
macro_rules! impl_any {
    () => {
        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
            self
        }

        fn into_any(self: Box<Self>) -> Box<dyn ::std::any::Any> {
            self
        }
    };
}
