//! Object records: framing, polymorphic members and corruption handling.

use rootcodec::{
    Context, Error, Factory, Marshaler, Object, Reader, Result, StreamerRegistry, TArrayD, TFree,
    TList, TNamed, TObjArray, TObjString, Unmarshaler, Writer, TUUID,
};

#[derive(Debug, Clone, PartialEq, Default)]
struct Point {
    x: f64,
    y: f64,
}

impl Marshaler for Point {
    fn marshal_root(&self, w: &mut Writer) -> Result<usize> {
        w.status()?;
        let pos = w.write_version(1);
        w.write_f64(self.x);
        w.write_f64(self.y);
        w.set_byte_count(pos, "Point")
    }
}

impl Unmarshaler for Point {
    fn unmarshal_root(&mut self, r: &mut Reader<'_>) -> Result<()> {
        r.status()?;
        let frame = r.read_version("Point");
        self.x = r.read_f64();
        self.y = r.read_f64();
        r.check_frame(&frame, "Point")
    }
}

impl Object for Point {
    fn class(&self) -> &str {
        "Point"
    }

    fn rversion(&self) -> i16 {
        1
    }

    rootcodec::impl_any!();
}

fn point_context() -> Context {
    let mut factory = Factory::with_builtins();
    factory.register_default::<Point>();
    Context::new(factory, StreamerRegistry::new())
}

#[test]
fn test_point_end_to_end() {
    let want = Point { x: 1.5, y: -2.5 };
    let data = rootcodec::marshal(&want).unwrap();
    assert_eq!(data.len(), 4 + 2 + 16);
    assert_eq!(&data[..6], &[0x40, 0, 0, 18, 0, 1]);

    let mut got = Point::default();
    rootcodec::unmarshal(&data, &mut got).unwrap();
    assert_eq!(got, want);
}

#[test]
fn test_truncated_record_is_eof() {
    let data = rootcodec::marshal(&Point { x: 1.5, y: -2.5 }).unwrap();
    for cut in [0, 3, 5, 13, data.len() - 1] {
        let mut got = Point::default();
        assert_eq!(
            rootcodec::unmarshal(&data[..cut], &mut got),
            Err(Error::UnexpectedEof),
            "cut={cut}"
        );
    }
}

#[test]
fn test_corrupted_byte_count_names_class() {
    let mut data = rootcodec::marshal(&Point { x: 1.5, y: -2.5 }).unwrap();
    data[3] = 14;

    let mut got = Point::default();
    let err = rootcodec::unmarshal(&data, &mut got).unwrap_err();
    assert_eq!(err, Error::byte_count_mismatch("Point", 18, 22));
    assert!(err.to_string().contains("Point"));
    assert_eq!(got.x, 1.5);
}

#[test]
fn test_factory_miss() {
    let factory = Factory::with_builtins();
    assert!(matches!(
        factory.instantiate("Point"),
        Err(Error::ClassNotFound(class)) if class == "Point"
    ));
}

#[test]
fn test_objarray_class_back_references() {
    let ctx = point_context();
    let points: Vec<Box<dyn Object>> = (0..3)
        .map(|i| Box::new(Point { x: i as f64, y: -(i as f64) }) as Box<dyn Object>)
        .collect();
    let mut want = TObjArray::new(points);
    want.name = "points".into();
    want.objs.push(Some(Box::new(TArrayD::new(vec![0.5]))));

    let data = rootcodec::marshal(&want).unwrap();

    // Point is spelled out once; the next two members point back to it.
    let name_at = data.windows(6).position(|w| w == b"Point\0").unwrap();
    assert_eq!(&data[name_at - 4..name_at], &[0xff; 4]);
    let tag_pos = (name_at - 4) as u32;
    let back_ref = ((tag_pos + 2) | 0x8000_0000).to_be_bytes();
    let refs = data.windows(4).filter(|w| *w == back_ref).count();
    assert_eq!(refs, 2);

    let mut got = TObjArray::default();
    rootcodec::unmarshal_with_context(&data, &ctx, &mut got).unwrap();
    assert_eq!(got.name, "points");
    assert_eq!(got.len(), 4);
    for i in 0..3 {
        let p = got.at(i).and_then(|o| o.downcast_ref::<Point>()).unwrap();
        assert_eq!(p.x, i as f64);
    }
    let arr = got.at(3).and_then(|o| o.downcast_ref::<TArrayD>()).unwrap();
    assert_eq!(arr.data, vec![0.5]);
}

#[test]
fn test_unknown_member_skipped_by_byte_count() {
    let mut w = Writer::new();
    w.write_object_any(Some(&Point { x: 1.0, y: 2.0 })).unwrap();
    w.write_object_any(Some(&TNamed::new("after", ""))).unwrap();
    let data = w.into_bytes();

    let ctx = Context::with_builtins();
    let mut r = Reader::with_context(&data, &ctx);
    assert_eq!(
        r.read_object_any().unwrap_err(),
        Error::ClassNotFound("Point".into())
    );
    assert!(r.status().is_ok());

    let next = r.read_object_any().unwrap().unwrap();
    assert_eq!(next.downcast_ref::<TNamed>().unwrap().name, "after");
    assert_eq!(r.remaining(), 0);
}

#[test]
fn test_skip_unknown_record() {
    let mut w = Writer::new();
    Point { x: 1.0, y: 2.0 }.marshal_root(&mut w).unwrap();
    w.write_u8(0xab);
    let data = w.into_bytes();

    let mut r = Reader::new(&data);
    assert_eq!(r.skip_object("Point").unwrap(), 1);
    assert_eq!(r.read_u8(), 0xab);
}

#[test]
fn test_tfree_compact_and_big() {
    let ctx = Context::with_builtins();
    let ranges = vec![TFree::new(100, 1_000), TFree::new(3_000_000_000, 4_000_000_000)];

    let mut w = Writer::new();
    for free in &ranges {
        w.write_object_any(Some(free)).unwrap();
    }
    let data = w.into_bytes();

    let mut r = Reader::with_context(&data, &ctx);
    for want in &ranges {
        let obj = r.read_object_any().unwrap().unwrap();
        assert_eq!(obj.downcast_ref::<TFree>(), Some(want));
    }
    assert_eq!(r.remaining(), 0);
}

#[test]
fn test_list_of_builtin_members() {
    let ctx = Context::with_builtins();
    let uuid = TUUID::new([7; 16]);
    let mut want = TList::default();
    want.name = "keys".into();
    want.push(Box::new(TObjString::new("tobjstring-string")), "");
    want.push(Box::new(uuid), "id");
    let inner = vec![Box::new(TNamed::new("n0", "t0")) as Box<dyn Object>];
    want.push(Box::new(TObjArray::new(inner)), "");

    let data = rootcodec::marshal(&want).unwrap();
    let mut got = TList::default();
    rootcodec::unmarshal_with_context(&data, &ctx, &mut got).unwrap();

    assert_eq!(got.len(), 3);
    let s = got.at(0).and_then(|o| o.downcast_ref::<TObjString>()).unwrap();
    assert_eq!(s.string, "tobjstring-string");
    assert_eq!(got.at(1).and_then(|o| o.downcast_ref::<TUUID>()), Some(&uuid));
    assert_eq!(got.opt(1), "id");
    let arr = got.at(2).and_then(|o| o.downcast_ref::<TObjArray>()).unwrap();
    assert_eq!(arr.len(), 1);
}

#[test]
fn test_writer_offset_shifts_class_tags() {
    let named = TNamed::new("a", "b");
    let mut w = Writer::new().with_offset(100);
    w.write_object_any(Some(&named)).unwrap();
    w.write_object_any(Some(&named)).unwrap();
    let data = w.into_bytes();

    let ctx = Context::with_builtins();
    let mut r = Reader::with_context(&data, &ctx).with_offset(100);
    assert!(r.read_object_any().unwrap().is_some());
    assert!(r.read_object_any().unwrap().is_some());

    let mut r = Reader::with_context(&data, &ctx);
    r.read_object_any().unwrap();
    assert!(matches!(
        r.read_object_any(),
        Err(Error::UnknownClassTag(_))
    ));
}
