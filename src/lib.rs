//! rootcodec - binary object codec of the ROOT storage format
//!
//! Objects are written as big-endian records framed by a byte count and a
//! class version. Nested polymorphic members carry a class tag so a reader
//! can rebuild them through a [`Factory`], or, for classes with no compiled
//! type, through the [`StreamerInfo`] describing their layout.
//!
//! # Example
//!
//! ```rust
//! use rootcodec::{Context, Object, Reader, Result, TNamed, Writer};
//!
//! fn main() -> Result<()> {
//!     // A single record
//!     let named = TNamed::new("h1", "momentum");
//!     let data = rootcodec::marshal(&named)?;
//!     let mut got = TNamed::default();
//!     rootcodec::unmarshal(&data, &mut got)?;
//!     assert_eq!(got, named);
//!
//!     // A polymorphic member, rebuilt by class name
//!     let ctx = Context::with_builtins();
//!     let mut writer = Writer::new();
//!     writer.write_object_any(Some(&named))?;
//!     let data = writer.into_bytes();
//!
//!     let mut reader = Reader::with_context(&data, &ctx);
//!     if let Some(obj) = reader.read_object_any()? {
//!         assert_eq!(obj.class(), "TNamed");
//!         assert_eq!(obj.downcast_ref::<TNamed>(), Some(&named));
//!     }
//!     Ok(())
//! }
//! ```

mod base;
mod containers;
mod context;
mod error;
mod factory;
mod free;
mod generic;
mod object;
mod reader;
pub mod streamer;
pub mod types;
mod writer;

pub use base::{TNamed, TObjString, TObject, TUUID};
pub use containers::{
    TArrayC, TArrayD, TArrayF, TArrayI, TArrayL, TArrayL64, TArrayS, TList, TObjArray,
};
pub use context::Context;
pub use error::{Error, Result};
pub use factory::{Constructor, Factory};
pub use free::TFree;
pub use generic::{Field, GenericObject, Value};
pub use object::{Marshaler, Object, Unmarshaler};
pub use reader::{Frame, Reader};
pub use streamer::{StreamerElement, StreamerInfo, StreamerInfoContext, StreamerRegistry};
pub use writer::Writer;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Encodes one value into a fresh buffer.
pub fn marshal<T>(value: &T) -> Result<Vec<u8>>
where
    T: Marshaler + ?Sized,
{
    let mut writer = Writer::new();
    value.marshal_root(&mut writer)?;
    Ok(writer.into_bytes())
}

/// Decodes `value` in place from `data`.
pub fn unmarshal<T>(data: &[u8], value: &mut T) -> Result<()>
where
    T: Unmarshaler + ?Sized,
{
    let mut reader = Reader::new(data);
    value.unmarshal_root(&mut reader)
}

/// Decodes `value` in place, resolving polymorphic members through `ctx`.
pub fn unmarshal_with_context<T>(data: &[u8], ctx: &Context, value: &mut T) -> Result<()>
where
    T: Unmarshaler + ?Sized,
{
    let mut reader = Reader::with_context(data, ctx);
    value.unmarshal_root(&mut reader)
}
