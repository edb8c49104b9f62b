//! Schema-driven decoding of classes with no compiled type.
//!
//! A [`GenericObject`] reads and writes its members by walking the
//! [`StreamerInfo`] registered for its class and version, keeping each
//! member as a dynamically typed [`Value`].

use std::sync::Arc;

use tracing::debug;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::{Marshaler, Object, Unmarshaler};
use crate::reader::Reader;
use crate::streamer::{ElementKind, StreamerElement, StreamerInfo, StreamerInfoContext};
use crate::types::{code, stl, Basic, Shape};
use crate::writer::Writer;

/// Version written in the record header of `std::vector` members.
const VECTOR_VERSION: i16 = 6;

/// A decoded member value.
#[derive(Debug)]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Contents of a `char*` member.
    Bytes(Vec<u8>),
    Str(String),
    Array(Vec<Value>),
    /// A variable-length array that was not allocated.
    Null,
    /// Object embedded by value, base classes included.
    Object(Box<dyn Object>),
    Pointer(Option<Box<dyn Object>>),
}

impl Value {
    /// Integral members widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Bool(v) => Some(v as i64),
            Value::I8(v) => Some(v.into()),
            Value::U8(v) => Some(v.into()),
            Value::I16(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::I32(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            Value::I64(v) => Some(v),
            Value::U64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F32(v) => Some(v.into()),
            Value::F64(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&dyn Object> {
        match self {
            Value::Object(obj) => Some(&**obj),
            Value::Pointer(obj) => obj.as_deref(),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::U8(_) => "u8",
            Value::I16(_) => "i16",
            Value::U16(_) => "u16",
            Value::I32(_) => "i32",
            Value::U32(_) => "u32",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Bytes(_) => "bytes",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Null => "null",
            Value::Object(_) => "object",
            Value::Pointer(_) => "pointer",
        }
    }
}

/// One named member of a [`GenericObject`].
#[derive(Debug)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

/// An object of a class known only through its streamer.
#[derive(Debug)]
pub struct GenericObject {
    class: String,
    version: i16,
    info: Option<Arc<StreamerInfo>>,
    fields: Vec<Field>,
}

impl GenericObject {
    /// A blank object of `class`; its layout is looked up when decoding.
    pub fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            version: 0,
            info: None,
            fields: Vec::new(),
        }
    }

    /// A blank object laid out by `info`, ready to be filled with
    /// [`GenericObject::push`] and written.
    pub fn with_info(info: Arc<StreamerInfo>) -> Self {
        Self {
            class: info.name().to_string(),
            version: info.class_version() as i16,
            info: Some(info),
            fields: Vec::new(),
        }
    }

    /// Appends the next member, in streamer order.
    pub fn push(&mut self, name: &str, value: Value) -> &mut Self {
        self.fields.push(Field {
            name: name.to_string(),
            value,
        });
        self
    }

    pub fn version(&self) -> i16 {
        self.version
    }

    pub fn info(&self) -> Option<&Arc<StreamerInfo>> {
        self.info.as_ref()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}

fn unsupported(elem: &StreamerElement) -> Error {
    Error::UnsupportedStreamerType {
        element: elem.name().to_string(),
        type_code: elem.type_code,
    }
}

fn mismatch(elem: &StreamerElement, value: &Value) -> Error {
    Error::InvalidArgument(format!(
        "member {} of type {} cannot hold a {} value",
        elem.name(),
        elem.type_name,
        value.kind()
    ))
}

fn read_basic(r: &mut Reader<'_>, basic: Basic, elem: &StreamerElement) -> Value {
    match basic {
        Basic::Bool => Value::Bool(r.read_bool()),
        Basic::I8 => Value::I8(r.read_i8()),
        Basic::U8 => Value::U8(r.read_u8()),
        Basic::I16 => Value::I16(r.read_i16()),
        Basic::U16 => Value::U16(r.read_u16()),
        Basic::I32 => Value::I32(r.read_i32()),
        Basic::U32 => Value::U32(r.read_u32()),
        Basic::I64 => Value::I64(r.read_i64()),
        Basic::U64 => Value::U64(r.read_u64()),
        Basic::F32 => Value::F32(r.read_f32()),
        Basic::F64 => Value::F64(r.read_f64()),
        Basic::Double32 => Value::F64(r.read_f64_d32(elem.range.as_ref())),
        Basic::Float16 => Value::F32(r.read_f32_f16(elem.range.as_ref())),
        Basic::CharStar => {
            let n = r.read_i32();
            let bytes = if n > 0 { r.read_bytes(n as usize) } else { &[] };
            Value::Bytes(bytes.to_vec())
        }
    }
}

fn read_basics(r: &mut Reader<'_>, basic: Basic, elem: &StreamerElement, n: usize) -> Value {
    let mut items = Vec::with_capacity(n.min(r.remaining()));
    for _ in 0..n {
        if r.err().is_some() {
            break;
        }
        items.push(read_basic(r, basic, elem));
    }
    Value::Array(items)
}

fn write_basic(w: &mut Writer, basic: Basic, elem: &StreamerElement, value: &Value) -> Result<()> {
    match (basic, value) {
        (Basic::Bool, Value::Bool(v)) => w.write_bool(*v),
        (Basic::I8, Value::I8(v)) => w.write_i8(*v),
        (Basic::U8, Value::U8(v)) => w.write_u8(*v),
        (Basic::I16, Value::I16(v)) => w.write_i16(*v),
        (Basic::U16, Value::U16(v)) => w.write_u16(*v),
        (Basic::I32, Value::I32(v)) => w.write_i32(*v),
        (Basic::U32, Value::U32(v)) => w.write_u32(*v),
        (Basic::I64, Value::I64(v)) => w.write_i64(*v),
        (Basic::U64, Value::U64(v)) => w.write_u64(*v),
        (Basic::F32, Value::F32(v)) => w.write_f32(*v),
        (Basic::F64, Value::F64(v)) => w.write_f64(*v),
        (Basic::Double32, Value::F64(v)) => w.write_f64_d32(*v, elem.range.as_ref()),
        (Basic::Float16, Value::F32(v)) => w.write_f32_f16(*v, elem.range.as_ref()),
        (Basic::CharStar, Value::Bytes(b)) => {
            w.write_count(b.len());
            w.write_bytes(b);
        }
        (_, v) => return Err(mismatch(elem, v)),
    }
    Ok(())
}

fn write_basics(
    w: &mut Writer,
    basic: Basic,
    elem: &StreamerElement,
    items: &[Value],
) -> Result<()> {
    for item in items {
        write_basic(w, basic, elem, item)?;
    }
    Ok(())
}

/// Decodes an object stored by value, through its compiled type when one
/// fits and through its streamer otherwise.
fn read_embedded(r: &mut Reader<'_>, ctx: &Context, class: &str) -> Result<Box<dyn Object>> {
    let mut obj = ctx
        .instantiate(class, r.peek_version())
        .map_err(|err| r.fail(err))?;
    r.unmarshal_nested(&mut *obj)?;
    Ok(obj)
}

/// Length of a variable-length array, from the counter member decoded
/// earlier in the same object.
fn counter(fields: &[Field], elem: &StreamerElement) -> Result<usize> {
    let ElementKind::BasicPointer { count_name, .. } = &elem.kind else {
        return Err(Error::custom(format!("{} has no counter member", elem.name())));
    };
    let n = fields
        .iter()
        .rev()
        .find(|f| &f.name == count_name)
        .and_then(|f| f.value.as_i64())
        .ok_or_else(|| {
            Error::custom(format!("counter {count_name} of {} not decoded", elem.name()))
        })?;
    usize::try_from(n).map_err(|_| Error::custom(format!("negative counter {count_name} = {n}")))
}

fn vector_content(elem: &StreamerElement) -> Option<i32> {
    match elem.kind {
        ElementKind::Stl { vtype, ctype } if vtype == stl::VECTOR => Some(ctype),
        _ => None,
    }
}

fn read_vector(r: &mut Reader<'_>, ctx: &Context, elem: &StreamerElement) -> Result<Value> {
    let Some(ctype) = vector_content(elem) else {
        return Err(r.fail(unsupported(elem)));
    };
    let frame = r.read_version(&elem.type_name);
    let n = r.read_i32();
    r.status()?;
    let n = usize::try_from(n).map_err(|_| {
        r.fail(Error::custom(format!("negative length {n} for {}", elem.name())))
    })?;

    let items = match ctype {
        code::STL_STRING | code::TSTRING => Value::Array(
            r.read_fast_array_string(n)
                .into_iter()
                .map(Value::Str)
                .collect(),
        ),
        code::OBJECT | code::ANY => {
            let class = elem.stl_content_type().unwrap_or_default();
            let mut objs = Vec::new();
            for _ in 0..n {
                objs.push(Value::Object(read_embedded(r, ctx, class)?));
            }
            Value::Array(objs)
        }
        _ => match Basic::from_code(ctype) {
            Some(basic) => read_basics(r, basic, elem, n),
            None => return Err(r.fail(unsupported(elem))),
        },
    };
    r.check_frame(&frame, &elem.type_name)?;
    Ok(items)
}

fn write_vector(w: &mut Writer, elem: &StreamerElement, items: &[Value]) -> Result<()> {
    let ctype = vector_content(elem).ok_or_else(|| unsupported(elem))?;
    let pos = w.write_version(VECTOR_VERSION);
    w.write_count(items.len());
    match ctype {
        code::STL_STRING | code::TSTRING => {
            for item in items {
                match item {
                    Value::Str(s) => w.write_string(s),
                    v => return Err(mismatch(elem, v)),
                }
            }
        }
        code::OBJECT | code::ANY => {
            for item in items {
                match item {
                    Value::Object(obj) => {
                        obj.marshal_root(w)?;
                    }
                    v => return Err(mismatch(elem, v)),
                }
            }
        }
        _ => {
            let basic = Basic::from_code(ctype).ok_or_else(|| unsupported(elem))?;
            write_basics(w, basic, elem, items)?;
        }
    }
    w.set_byte_count(pos, &elem.type_name)?;
    Ok(())
}

fn read_element(
    r: &mut Reader<'_>,
    ctx: &Context,
    elem: &StreamerElement,
    fields: &[Field],
) -> Result<Value> {
    let Some(shape) = Shape::from_code(elem.type_code) else {
        return Err(r.fail(unsupported(elem)));
    };
    let value = match shape {
        Shape::Base => Value::Object(read_embedded(r, ctx, elem.name())?),
        Shape::Scalar(basic) => read_basic(r, basic, elem),
        Shape::FixedArray(basic) => read_basics(r, basic, elem, elem.arrlen.max(0) as usize),
        Shape::PointerArray(basic) => {
            let n = counter(fields, elem).map_err(|err| r.fail(err))?;
            if r.read_i8() == 0 {
                Value::Null
            } else {
                read_basics(r, basic, elem, n)
            }
        }
        Shape::Object => Value::Object(read_embedded(r, ctx, &elem.type_name)?),
        Shape::ObjectPointer => Value::Pointer(r.read_object_any()?),
        Shape::TString | Shape::StlString => Value::Str(r.read_string()),
        Shape::Stl => read_vector(r, ctx, elem)?,
    };
    r.status()?;
    Ok(value)
}

/// Encodes one member. `fields` are the members already written, which hold
/// the counters of variable-length arrays.
fn write_element(
    w: &mut Writer,
    elem: &StreamerElement,
    fields: &[Field],
    value: &Value,
) -> Result<()> {
    let shape = Shape::from_code(elem.type_code).ok_or_else(|| unsupported(elem))?;
    match (shape, value) {
        (Shape::Base | Shape::Object, Value::Object(obj)) => {
            obj.marshal_root(w)?;
        }
        (Shape::Scalar(basic), v) => write_basic(w, basic, elem, v)?,
        (Shape::FixedArray(basic), Value::Array(items)) => {
            if items.len() != elem.arrlen.max(0) as usize {
                return Err(Error::InvalidArgument(format!(
                    "member {} holds {} elements, expected {}",
                    elem.name(),
                    items.len(),
                    elem.arrlen
                )));
            }
            write_basics(w, basic, elem, items)?;
        }
        (Shape::PointerArray(_), Value::Null) => w.write_i8(0),
        (Shape::PointerArray(basic), Value::Array(items)) => {
            let n = counter(fields, elem)?;
            if items.len() != n {
                return Err(Error::InvalidArgument(format!(
                    "member {} holds {} elements, its counter says {n}",
                    elem.name(),
                    items.len()
                )));
            }
            w.write_i8(1);
            write_basics(w, basic, elem, items)?;
        }
        (Shape::ObjectPointer, Value::Pointer(obj)) => {
            w.write_object_any(obj.as_deref())?;
        }
        (Shape::TString | Shape::StlString, Value::Str(s)) => w.write_string(s),
        (Shape::Stl, Value::Array(items)) => write_vector(w, elem, items)?,
        (_, v) => return Err(mismatch(elem, v)),
    }
    w.status()
}

impl GenericObject {
    fn marshal_fields(&self, w: &mut Writer) -> Result<usize> {
        let Some(info) = &self.info else {
            return Err(Error::streamer_not_found(&self.class, Some(self.version.into())));
        };
        if info.elements().len() != self.fields.len() {
            return Err(Error::InvalidArgument(format!(
                "{} has {} fields, its streamer lists {} members",
                self.class,
                self.fields.len(),
                info.elements().len()
            )));
        }

        let pos = w.write_version(self.version);
        for (i, (elem, field)) in info.elements().iter().zip(&self.fields).enumerate() {
            if field.name != elem.name() {
                return Err(Error::InvalidArgument(format!(
                    "field {} found where {}::{} is expected",
                    field.name,
                    self.class,
                    elem.name()
                )));
            }
            write_element(w, elem, &self.fields[..i], &field.value)?;
        }
        w.set_byte_count(pos, &self.class)
    }
}

impl Marshaler for GenericObject {
    /// Any failure leaves a partial record behind and is latched on `w`.
    fn marshal_root(&self, w: &mut Writer) -> Result<usize> {
        w.status()?;
        self.marshal_fields(w).map_err(|err| w.fail(err))
    }
}

impl Unmarshaler for GenericObject {
    fn unmarshal_root(&mut self, r: &mut Reader<'_>) -> Result<()> {
        r.status()?;
        let frame = r.read_version(&self.class);
        let Some(ctx) = r.context() else {
            return Err(r.fail(Error::NoContext));
        };
        let info = match ctx.find_streamer(&self.class, Some(frame.version.into())) {
            Ok(info) => info,
            Err(err) => match ctx.find_streamer(&self.class, None) {
                Ok(info) => {
                    debug!(
                        class = %self.class,
                        version = frame.version,
                        using = info.class_version(),
                        "no streamer for stored version"
                    );
                    info
                }
                Err(_) => return Err(r.fail(err)),
            },
        };

        self.version = frame.version;
        self.fields.clear();
        for elem in info.elements() {
            let value = read_element(r, ctx, elem, &self.fields)?;
            self.fields.push(Field {
                name: elem.name().to_string(),
                value,
            });
        }
        self.info = Some(info);
        r.check_frame(&frame, &self.class)
    }
}

impl Object for GenericObject {
    fn class(&self) -> &str {
        &self.class
    }

    fn rversion(&self) -> i16 {
        self.version
    }

    // Layout follows whatever streamer matched at decode time.
    fn accepts_version(&self, _version: i16) -> bool {
        true
    }

    crate::impl_any!();
}
