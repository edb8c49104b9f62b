//! Streamer elements: the on-disk descriptor of one data member.

use crate::base::TNamed;
use crate::error::Result;
use crate::object::{Marshaler, Object, Unmarshaler};
use crate::reader::Reader;
use crate::types::{code, stl, Basic, PackedRange};
use crate::writer::Writer;

/// Version of the embedded `TStreamerElement` record.
pub const ELEMENT_VERSION: i16 = 4;

const STL_CLASS: &str = "TStreamerSTL";
const STL_VERSION: i16 = 3;

/// Kind-specific part of an element. The kind selects the element's class.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ElementKind {
    /// Base class, carrying the version of the base it was written with.
    Base { base_version: i32 },
    #[default]
    BasicType,
    /// Variable-length array sized by an earlier counter member.
    BasicPointer {
        count_version: i32,
        count_name: String,
        count_class: String,
    },
    /// Array of objects sized by an earlier counter member.
    Loop {
        count_version: i32,
        count_name: String,
        count_class: String,
    },
    String,
    Object,
    ObjectAny,
    ObjectPointer,
    /// Pointer to an object outside the `TObject` hierarchy.
    ObjectAnyPointer,
    /// Member synthesized by a read rule; it has no payload of its own.
    Artificial,
    /// STL container: `vtype` is the container code, `ctype` the content
    /// type code.
    Stl { vtype: i32, ctype: i32 },
    StlString { vtype: i32, ctype: i32 },
}

impl ElementKind {
    pub fn class(&self) -> &'static str {
        match self {
            ElementKind::Base { .. } => "TStreamerBase",
            ElementKind::BasicType => "TStreamerBasicType",
            ElementKind::BasicPointer { .. } => "TStreamerBasicPointer",
            ElementKind::Loop { .. } => "TStreamerLoop",
            ElementKind::String => "TStreamerString",
            ElementKind::Object => "TStreamerObject",
            ElementKind::ObjectAny => "TStreamerObjectAny",
            ElementKind::ObjectPointer => "TStreamerObjectPointer",
            ElementKind::ObjectAnyPointer => "TStreamerObjectAnyPointer",
            ElementKind::Artificial => "TStreamerArtificial",
            ElementKind::Stl { .. } => STL_CLASS,
            ElementKind::StlString { .. } => "TStreamerSTLstring",
        }
    }

    pub fn version(&self) -> i16 {
        match self {
            ElementKind::Base { .. } | ElementKind::Stl { .. } => 3,
            _ => 2,
        }
    }

    /// One blank value of every kind, for factory registration.
    pub(crate) fn all() -> [ElementKind; 12] {
        [
            ElementKind::Base { base_version: 0 },
            ElementKind::BasicType,
            ElementKind::BasicPointer {
                count_version: 0,
                count_name: String::new(),
                count_class: String::new(),
            },
            ElementKind::Loop {
                count_version: 0,
                count_name: String::new(),
                count_class: String::new(),
            },
            ElementKind::String,
            ElementKind::Object,
            ElementKind::ObjectAny,
            ElementKind::ObjectPointer,
            ElementKind::ObjectAnyPointer,
            ElementKind::Artificial,
            ElementKind::Stl { vtype: 0, ctype: 0 },
            ElementKind::StlString { vtype: 0, ctype: 0 },
        ]
    }
}

/// Describes how one member of a class is laid out on disk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamerElement {
    pub named: TNamed,
    /// Streamer type code (see [`code`]).
    pub type_code: i32,
    /// In-memory size of the member.
    pub size: i32,
    pub arrlen: i32,
    pub arrdim: i32,
    pub maxidx: [i32; 5],
    /// C++ spelling of the member type.
    pub type_name: String,
    /// Packing range of Double32/Float16 members, parsed from the title.
    pub range: Option<PackedRange>,
    pub kind: ElementKind,
}

fn basic_type_name(b: Basic) -> &'static str {
    match b {
        Basic::Bool => "bool",
        Basic::I8 => "char",
        Basic::U8 => "unsigned char",
        Basic::I16 => "short",
        Basic::U16 => "unsigned short",
        Basic::I32 => "int",
        Basic::U32 => "unsigned int",
        Basic::I64 => "Long64_t",
        Basic::U64 => "ULong64_t",
        Basic::F32 => "float",
        Basic::F64 => "double",
        Basic::Double32 => "Double32_t",
        Basic::Float16 => "Float16_t",
        Basic::CharStar => "char*",
    }
}

/// Double32 and Float16, alone or as fixed/pointer arrays.
fn is_packed_float(type_code: i32) -> bool {
    (1..60).contains(&type_code) && matches!(type_code % 20, code::DOUBLE32 | code::FLOAT16)
}

impl StreamerElement {
    fn with_kind(kind: ElementKind, name: &str, type_code: i32, type_name: &str) -> Self {
        Self {
            named: TNamed::new(name, ""),
            type_code,
            type_name: type_name.to_string(),
            kind,
            ..Self::default()
        }
    }

    /// A single primitive member.
    pub fn basic(name: &str, type_code: i32) -> Self {
        let basic = Basic::from_code(type_code);
        let mut elem = Self::with_kind(
            ElementKind::BasicType,
            name,
            type_code,
            basic.map_or("", basic_type_name),
        );
        elem.size = basic.map_or(0, Basic::size);
        elem
    }

    /// A fixed-length primitive array, `type name[arrlen]`.
    pub fn fixed_array(name: &str, type_code: i32, arrlen: i32) -> Self {
        let mut elem = Self::basic(name, type_code);
        elem.type_code = type_code + code::OFFSET_L;
        elem.size *= arrlen;
        elem.arrlen = arrlen;
        elem.arrdim = 1;
        elem.maxidx[0] = arrlen;
        elem
    }

    /// A primitive array whose length is held by the member `count_name`
    /// of `count_class`.
    pub fn counted(name: &str, type_code: i32, count_name: &str, count_class: &str) -> Self {
        let type_name = Basic::from_code(type_code).map_or(String::new(), |b| {
            format!("{}*", basic_type_name(b))
        });
        let mut elem = Self::with_kind(
            ElementKind::BasicPointer {
                count_version: 1,
                count_name: count_name.to_string(),
                count_class: count_class.to_string(),
            },
            name,
            type_code + code::OFFSET_P,
            &type_name,
        );
        elem.size = 8;
        elem.named.title = format!("[{count_name}]");
        elem
    }

    /// A base class of the described class.
    pub fn base(class: &str, base_version: i32) -> Self {
        Self::with_kind(ElementKind::Base { base_version }, class, code::BASE, class)
    }

    /// An object member embedded by value.
    pub fn object(name: &str, class: &str) -> Self {
        let type_code = match class {
            "TObject" => code::TOBJECT,
            "TNamed" => code::TNAMED,
            _ => code::OBJECT,
        };
        Self::with_kind(ElementKind::Object, name, type_code, class)
    }

    /// An object member of a class outside the `TObject` hierarchy.
    pub fn object_any(name: &str, class: &str) -> Self {
        Self::with_kind(ElementKind::ObjectAny, name, code::ANY, class)
    }

    /// A polymorphic pointer member, written with a class tag.
    pub fn object_pointer(name: &str, class: &str) -> Self {
        let mut elem = Self::with_kind(
            ElementKind::ObjectPointer,
            name,
            code::OBJECT_P,
            &format!("{class}*"),
        );
        elem.size = 8;
        elem
    }

    /// A pointer member of a class outside the `TObject` hierarchy.
    pub fn object_any_pointer(name: &str, class: &str) -> Self {
        let mut elem = Self::with_kind(
            ElementKind::ObjectAnyPointer,
            name,
            code::ANY_P,
            &format!("{class}*"),
        );
        elem.size = 8;
        elem
    }

    /// A variable-length array of `class` objects whose length is held by
    /// the member `count_name` of `count_class`.
    pub fn streamer_loop(name: &str, class: &str, count_name: &str, count_class: &str) -> Self {
        let mut elem = Self::with_kind(
            ElementKind::Loop {
                count_version: 1,
                count_name: count_name.to_string(),
                count_class: count_class.to_string(),
            },
            name,
            code::STREAM_LOOP,
            &format!("{class}*"),
        );
        elem.size = 8;
        elem.named.title = format!("[{count_name}]");
        elem
    }

    /// A member produced by a schema-evolution rule.
    pub fn artificial(name: &str, type_code: i32, type_name: &str) -> Self {
        Self::with_kind(ElementKind::Artificial, name, type_code, type_name)
    }

    pub fn tstring(name: &str) -> Self {
        let mut elem = Self::with_kind(ElementKind::String, name, code::TSTRING, "TString");
        elem.size = 24;
        elem
    }

    /// A `std::vector` member. `ctype` is the content type code: a basic
    /// code, [`code::STL_STRING`] or [`code::OBJECT`].
    pub fn stl_vector(name: &str, ctype: i32, type_name: &str) -> Self {
        let mut elem = Self::with_kind(
            ElementKind::Stl {
                vtype: stl::VECTOR,
                ctype,
            },
            name,
            code::STL,
            type_name,
        );
        elem.size = 24;
        elem
    }

    pub fn stl_string(name: &str) -> Self {
        let mut elem = Self::with_kind(
            ElementKind::StlString {
                vtype: stl::STRING,
                ctype: stl::STRING,
            },
            name,
            code::STL_STRING,
            "string",
        );
        elem.size = 32;
        elem
    }

    /// Sets the member comment, re-reading any packing range it holds.
    pub fn with_title(mut self, title: &str) -> Self {
        self.named.title = title.to_string();
        self.range = self.parse_range();
        self
    }

    pub fn name(&self) -> &str {
        &self.named.name
    }

    pub fn title(&self) -> &str {
        &self.named.title
    }

    /// The class named by a `vector<...>` type, trimmed.
    pub fn stl_content_type(&self) -> Option<&str> {
        let inner = self.type_name.trim().strip_prefix("vector<")?;
        inner.strip_suffix('>').map(str::trim)
    }

    fn parse_range(&self) -> Option<PackedRange> {
        if is_packed_float(self.type_code) {
            PackedRange::parse(&self.named.title)
        } else {
            None
        }
    }

    fn marshal_element(&self, w: &mut Writer) -> Result<usize> {
        let pos = w.write_version(ELEMENT_VERSION);
        self.named.marshal_root(w)?;
        w.write_i32(self.type_code);
        w.write_i32(self.size);
        w.write_i32(self.arrlen);
        w.write_i32(self.arrdim);
        w.write_fast_array_i32(&self.maxidx);
        w.write_string(&self.type_name);
        w.set_byte_count(pos, "TStreamerElement")
    }

    fn unmarshal_element(&mut self, r: &mut Reader<'_>) -> Result<()> {
        let frame = r.read_version("TStreamerElement");
        self.named.unmarshal_root(r)?;
        self.type_code = r.read_i32();
        self.size = r.read_i32();
        self.arrlen = r.read_i32();
        self.arrdim = r.read_i32();

        let maxidx = if frame.version == 1 {
            r.read_static_array_i32()
        } else {
            r.read_fast_array_i32(self.maxidx.len())
        };
        self.maxidx = [0; 5];
        for (dst, src) in self.maxidx.iter_mut().zip(maxidx) {
            *dst = src;
        }
        self.type_name = r.read_string();

        self.range = if frame.version == 3 {
            let xmin = r.read_f64();
            let xmax = r.read_f64();
            let factor = r.read_f64();
            Some(PackedRange { xmin, xmax, factor })
        } else {
            self.parse_range()
        };
        r.check_frame(&frame, "TStreamerElement")
    }
}

impl Marshaler for StreamerElement {
    fn marshal_root(&self, w: &mut Writer) -> Result<usize> {
        w.status()?;
        let pos = w.write_version(self.kind.version());
        match &self.kind {
            ElementKind::StlString { vtype, ctype } => {
                let inner = w.write_version(STL_VERSION);
                self.marshal_element(w)?;
                w.write_i32(*vtype);
                w.write_i32(*ctype);
                w.set_byte_count(inner, STL_CLASS)?;
            }
            kind => {
                self.marshal_element(w)?;
                match kind {
                    ElementKind::Base { base_version } => w.write_i32(*base_version),
                    ElementKind::BasicPointer {
                        count_version,
                        count_name,
                        count_class,
                    }
                    | ElementKind::Loop {
                        count_version,
                        count_name,
                        count_class,
                    } => {
                        w.write_i32(*count_version);
                        w.write_string(count_name);
                        w.write_string(count_class);
                    }
                    ElementKind::Stl { vtype, ctype } => {
                        w.write_i32(*vtype);
                        w.write_i32(*ctype);
                    }
                    _ => {}
                }
            }
        }
        w.set_byte_count(pos, self.class())
    }
}

impl Unmarshaler for StreamerElement {
    fn unmarshal_root(&mut self, r: &mut Reader<'_>) -> Result<()> {
        r.status()?;
        let class = self.kind.class();
        let frame = r.read_version(class);
        let inner = matches!(self.kind, ElementKind::StlString { .. })
            .then(|| r.read_version(STL_CLASS));

        self.unmarshal_element(r)?;
        match &mut self.kind {
            ElementKind::Base { base_version } => {
                if frame.version > 2 {
                    *base_version = r.read_i32();
                }
            }
            ElementKind::BasicPointer {
                count_version,
                count_name,
                count_class,
            }
            | ElementKind::Loop {
                count_version,
                count_name,
                count_class,
            } => {
                *count_version = r.read_i32();
                *count_name = r.read_string();
                *count_class = r.read_string();
            }
            ElementKind::Stl { vtype, ctype } | ElementKind::StlString { vtype, ctype } => {
                *vtype = r.read_i32();
                *ctype = r.read_i32();
            }
            _ => {}
        }

        if let Some(inner) = inner {
            r.check_frame(&inner, STL_CLASS)?;
        }
        r.check_frame(&frame, class)
    }
}

impl Object for StreamerElement {
    fn class(&self) -> &str {
        self.kind.class()
    }

    fn rversion(&self) -> i16 {
        self.kind.version()
    }

    fn accepts_version(&self, version: i16) -> bool {
        (1..=self.kind.version()).contains(&version)
    }

    crate::impl_any!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(want: &StreamerElement) -> StreamerElement {
        let mut w = Writer::new();
        want.marshal_root(&mut w).unwrap();
        let data = w.into_bytes();

        let mut got = StreamerElement {
            kind: want.kind.clone(),
            ..StreamerElement::default()
        };
        let mut r = Reader::new(&data);
        got.unmarshal_root(&mut r).unwrap();
        assert_eq!(r.remaining(), 0);
        got
    }

    #[test]
    fn test_element_kinds_roundtrip() {
        for want in [
            StreamerElement::base("TNamed", 1),
            StreamerElement::basic("fX", code::DOUBLE),
            StreamerElement::fixed_array("fPos", code::FLOAT, 3),
            StreamerElement::counted("fHits", code::INT, "fN", "Event"),
            StreamerElement::object("fName", "TNamed"),
            StreamerElement::object_any("fCenter", "Point"),
            StreamerElement::object_pointer("fParent", "TNamed"),
            StreamerElement::object_any_pointer("fObjAnyPtr", "Point"),
            StreamerElement::streamer_loop("fLoop", "MyArray", "fArrayCount", "MyArrayCount"),
            StreamerElement::artificial("fArtificial", code::INT, "std::artificial"),
            StreamerElement::tstring("fLabel"),
            StreamerElement::stl_vector("fValues", code::DOUBLE, "vector<double>"),
            StreamerElement::stl_string("fTag"),
        ] {
            assert_eq!(roundtrip(&want), want, "{}", want.name());
        }
    }

    #[test]
    fn test_loop_counter_fields_on_wire() {
        let elem = StreamerElement::streamer_loop("fLoop", "MyArray", "fArrayCount", "MyArrayCount")
            .with_title("A streamer loop");
        let mut w = Writer::new();
        elem.marshal_root(&mut w).unwrap();
        let data = w.as_bytes();

        assert_eq!(&data[4..6], &[0, 2]);
        let tail = b"\x0bfArrayCount\x0cMyArrayCount";
        assert!(data.ends_with(tail));
        assert_eq!(&data[data.len() - tail.len() - 4..data.len() - tail.len()], &[0, 0, 0, 1]);

        let got = roundtrip(&elem);
        assert!(matches!(
            got.kind,
            ElementKind::Loop { ref count_name, ref count_class, count_version: 1 }
                if count_name == "fArrayCount" && count_class == "MyArrayCount"
        ));
        assert_eq!(got.type_code, code::STREAM_LOOP);
    }

    #[test]
    fn test_stl_string_nests_stl_record() {
        let elem = StreamerElement::stl_string("fTag");
        let mut w = Writer::new();
        elem.marshal_root(&mut w).unwrap();
        let data = w.as_bytes();

        assert_eq!(&data[4..6], &[0, 2]);
        assert_eq!(data[6] & 0x40, 0x40);
        assert_eq!(&data[10..12], &[0, 3]);
    }

    #[test]
    fn test_double32_range_from_title() {
        let elem = StreamerElement::basic("fE", code::DOUBLE32).with_title("energy [0,100,16]");
        let range = elem.range.unwrap();
        assert_eq!(range.xmax, 100.0);

        let got = roundtrip(&elem);
        assert_eq!(got.range, elem.range);

        let plain = StreamerElement::basic("fE", code::DOUBLE).with_title("[0,100,16]");
        assert!(plain.range.is_none());
    }

    #[test]
    fn test_fixed_array_shape() {
        let elem = StreamerElement::fixed_array("fPos", code::FLOAT, 3);
        assert_eq!(elem.type_code, 25);
        assert_eq!(elem.size, 12);
        assert_eq!(elem.maxidx, [3, 0, 0, 0, 0]);
    }

    #[test]
    fn test_stl_content_type() {
        let elem = StreamerElement::stl_vector("fPts", code::OBJECT, "vector<Point>");
        assert_eq!(elem.stl_content_type(), Some("Point"));
        assert_eq!(StreamerElement::tstring("s").stl_content_type(), None);
    }
}
