//! Wire format constants and streamer type tags.

/// Flag set on every stored byte count.
pub const BYTE_COUNT_MASK: u32 = 0x4000_0000;

/// Flag marking a class tag that refers back to an already-seen class.
pub const CLASS_MASK: u32 = 0x8000_0000;

/// Tag announcing that a NUL-terminated class name follows.
pub const NEW_CLASS_TAG: u32 = 0xFFFF_FFFF;

/// Tag for a null object member.
pub const NULL_TAG: u32 = 0;

/// Offset added to buffer positions recorded in the class tag map.
pub const MAP_OFFSET: u32 = 2;

/// Largest byte count that fits beside the byte count flag.
pub const MAX_MAP_COUNT: u32 = 0x3FFF_FFFE;

/// Seek values above this need the extended (64-bit) representation.
pub const START_BIG_FILE: i64 = 2_000_000_000;

/// Added to a class version to announce big addressing.
pub const BIG_VERSION_OFFSET: i16 = 1000;

/// Strings at least this long carry a 4-byte length after a 0xFF marker.
pub const LONG_STRING_MARKER: u8 = 255;

/// Upper bound on class names read from class tags.
pub const MAX_CLASS_NAME_LEN: usize = 80;

/// Deepest chain of nested object records a reader decodes.
pub const MAX_NESTING_DEPTH: usize = 512;

/// Size of a `TUUID` payload.
pub const UUID_SIZE: usize = 16;

/// `TObject` status bits.
pub const IS_REFERENCED: u32 = 1 << 4;
pub const IS_ON_HEAP: u32 = 0x0100_0000;
pub const NOT_DELETED: u32 = 0x0200_0000;

/// Value range of a Double32 or Float16 member.
///
/// With a non-zero `factor`, values are stored as a `u32` scaled into
/// `[xmin, xmax]`. With `factor == 0`, `xmin` holds the number of mantissa
/// bits kept by the truncated-float encoding.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PackedRange {
    pub xmin: f64,
    pub xmax: f64,
    pub factor: f64,
}

impl PackedRange {
    /// Parses a range annotation such as `[0,100,16]` or `[0,0,10]` from a
    /// member title.
    pub fn parse(title: &str) -> Option<Self> {
        let open = title.rfind('[')?;
        let close = open + title[open..].find(']')?;
        let parts: Vec<&str> = title[open + 1..close].split(',').map(str::trim).collect();
        if !(2..=3).contains(&parts.len()) {
            return None;
        }
        let xmin: f64 = parts[0].parse().ok()?;
        let xmax: f64 = parts[1].parse().ok()?;
        let mut nbits: u32 = match parts.get(2) {
            Some(p) => p.parse().ok()?,
            None => 32,
        };
        if !(2..=32).contains(&nbits) {
            nbits = 32;
        }

        if xmin >= xmax {
            return (nbits <= 14).then_some(Self {
                xmin: nbits as f64,
                xmax: 0.0,
                factor: 0.0,
            });
        }
        let steps = if nbits < 32 {
            (1u64 << nbits) as f64
        } else {
            u32::MAX as f64
        };
        Some(Self {
            xmin,
            xmax,
            factor: steps / (xmax - xmin),
        })
    }

    /// Mantissa bits for the truncated-float encoding, if that is the mode.
    pub fn mantissa_bits(&self) -> Option<u32> {
        if self.factor != 0.0 {
            return None;
        }
        let nbits = self.xmin as u32;
        (2..=14).contains(&nbits).then_some(nbits)
    }

    /// Scales `v` into the packed integer form.
    pub fn pack(&self, v: f64) -> u32 {
        let x = if v < self.xmin {
            self.xmin
        } else if v > self.xmax {
            self.xmax
        } else {
            v
        };
        (0.5 + self.factor * (x - self.xmin)) as u32
    }

    pub fn unpack(&self, raw: u32) -> f64 {
        raw as f64 / self.factor + self.xmin
    }
}

/// Streamer element type codes.
pub mod code {
    pub const BASE: i32 = 0;
    pub const CHAR: i32 = 1;
    pub const SHORT: i32 = 2;
    pub const INT: i32 = 3;
    pub const LONG: i32 = 4;
    pub const FLOAT: i32 = 5;
    pub const COUNTER: i32 = 6;
    pub const CHAR_STAR: i32 = 7;
    pub const DOUBLE: i32 = 8;
    pub const DOUBLE32: i32 = 9;
    pub const LEGACY_CHAR: i32 = 10;
    pub const UCHAR: i32 = 11;
    pub const USHORT: i32 = 12;
    pub const UINT: i32 = 13;
    pub const ULONG: i32 = 14;
    pub const BITS: i32 = 15;
    pub const LONG64: i32 = 16;
    pub const ULONG64: i32 = 17;
    pub const BOOL: i32 = 18;
    pub const FLOAT16: i32 = 19;
    pub const OFFSET_L: i32 = 20;
    pub const OFFSET_P: i32 = 40;
    pub const OBJECT: i32 = 61;
    pub const ANY: i32 = 62;
    pub const OBJECTP: i32 = 63;
    pub const OBJECT_P: i32 = 64;
    pub const TSTRING: i32 = 65;
    pub const TOBJECT: i32 = 66;
    pub const TNAMED: i32 = 67;
    pub const ANYP: i32 = 68;
    pub const ANY_P: i32 = 69;
    pub const STL: i32 = 300;
    pub const STL_STRING: i32 = 365;
    pub const STREAMER: i32 = 500;
    pub const STREAM_LOOP: i32 = 501;
}

/// STL container codes stored in `TStreamerSTL`.
pub mod stl {
    pub const VECTOR: i32 = 1;
    pub const STRING: i32 = 365;
}

/// Primitive kinds a streamer element can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basic {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// Double stored in 32 bits (packed or plain float).
    Double32,
    /// Float stored in 16 bits or fewer.
    Float16,
    /// `char*`: i32 length then bytes.
    CharStar,
}

impl Basic {
    /// Maps a basic type code (1..=19) to its kind.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            code::CHAR | code::LEGACY_CHAR => Some(Basic::I8),
            code::SHORT => Some(Basic::I16),
            code::INT | code::COUNTER => Some(Basic::I32),
            code::LONG | code::LONG64 => Some(Basic::I64),
            code::FLOAT => Some(Basic::F32),
            code::CHAR_STAR => Some(Basic::CharStar),
            code::DOUBLE => Some(Basic::F64),
            code::DOUBLE32 => Some(Basic::Double32),
            code::UCHAR => Some(Basic::U8),
            code::USHORT => Some(Basic::U16),
            code::UINT | code::BITS => Some(Basic::U32),
            code::ULONG | code::ULONG64 => Some(Basic::U64),
            code::BOOL => Some(Basic::Bool),
            code::FLOAT16 => Some(Basic::Float16),
            _ => None,
        }
    }

    /// In-memory size in bytes, as recorded in element descriptors.
    pub fn size(self) -> i32 {
        match self {
            Basic::Bool | Basic::I8 | Basic::U8 => 1,
            Basic::I16 | Basic::U16 => 2,
            Basic::I32 | Basic::U32 | Basic::F32 | Basic::Float16 => 4,
            Basic::I64 | Basic::U64 | Basic::F64 | Basic::Double32 | Basic::CharStar => 8,
        }
    }
}

/// Decoding shape derived from an element type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Base class, embedded with its own frame.
    Base,
    /// Single primitive.
    Scalar(Basic),
    /// Fixed-length array of `arrlen` primitives.
    FixedArray(Basic),
    /// Variable-length array sized by a counter member.
    PointerArray(Basic),
    /// Object embedded by value.
    Object,
    /// Polymorphic pointer written with a class tag.
    ObjectPointer,
    /// Length-prefixed `TString`.
    TString,
    /// STL container (see `StreamerElement::stl`).
    Stl,
    /// `std::string` member.
    StlString,
}

impl Shape {
    /// Classifies a streamer element type code.
    pub fn from_code(type_code: i32) -> Option<Self> {
        match type_code {
            code::BASE => Some(Shape::Base),
            1..=19 => Basic::from_code(type_code).map(Shape::Scalar),
            21..=39 => Basic::from_code(type_code - code::OFFSET_L).map(Shape::FixedArray),
            41..=59 => Basic::from_code(type_code - code::OFFSET_P).map(Shape::PointerArray),
            code::OBJECT | code::ANY | code::TOBJECT | code::TNAMED => Some(Shape::Object),
            code::OBJECTP | code::OBJECT_P | code::ANYP | code::ANY_P => Some(Shape::ObjectPointer),
            code::TSTRING => Some(Shape::TString),
            code::STL => Some(Shape::Stl),
            code::STL_STRING => Some(Shape::StlString),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_from_code() {
        assert_eq!(Shape::from_code(0), Some(Shape::Base));
        assert_eq!(Shape::from_code(8), Some(Shape::Scalar(Basic::F64)));
        assert_eq!(Shape::from_code(23), Some(Shape::FixedArray(Basic::I32)));
        assert_eq!(Shape::from_code(48), Some(Shape::PointerArray(Basic::F64)));
        assert_eq!(Shape::from_code(61), Some(Shape::Object));
        assert_eq!(Shape::from_code(64), Some(Shape::ObjectPointer));
        assert_eq!(Shape::from_code(65), Some(Shape::TString));
        assert_eq!(Shape::from_code(365), Some(Shape::StlString));
        assert_eq!(Shape::from_code(500), None);
        assert_eq!(Shape::from_code(20), None);
    }

    #[test]
    fn test_packed_range_parse() {
        let r = PackedRange::parse("momentum [0,100,16]").unwrap();
        assert_eq!(r.xmin, 0.0);
        assert_eq!(r.xmax, 100.0);
        assert_eq!(r.factor, 65536.0 / 100.0);
        assert_eq!(r.mantissa_bits(), None);

        let r = PackedRange::parse("[0,0,10]").unwrap();
        assert_eq!(r.factor, 0.0);
        assert_eq!(r.mantissa_bits(), Some(10));

        assert_eq!(PackedRange::parse("[0,0]"), None);
        assert_eq!(PackedRange::parse("plain title"), None);
        assert_eq!(PackedRange::parse("[a,b]"), None);
    }

    #[test]
    fn test_packed_range_pack_clamps() {
        let r = PackedRange::parse("[0,10,8]").unwrap();
        assert_eq!(r.pack(-5.0), 0);
        assert_eq!(r.pack(10.0), 256);
        assert_eq!(r.pack(100.0), 256);
        assert!((r.unpack(r.pack(2.5)) - 2.5).abs() < 0.05);
    }

    #[test]
    fn test_basic_aliases() {
        assert_eq!(Basic::from_code(code::COUNTER), Some(Basic::I32));
        assert_eq!(Basic::from_code(code::BITS), Some(Basic::U32));
        assert_eq!(Basic::from_code(code::LONG), Some(Basic::I64));
        assert_eq!(Basic::from_code(code::LEGACY_CHAR), Some(Basic::I8));
        assert_eq!(Basic::F64.size(), 8);
        assert_eq!(Basic::Bool.size(), 1);
    }
}
