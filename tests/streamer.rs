//! Streamer metadata and schema-driven decoding.

use std::sync::Arc;
use std::thread;

use rootcodec::streamer::ElementKind;
use rootcodec::types::code;
use rootcodec::{
    Context, Error, Factory, GenericObject, Marshaler, Object, Reader, Result, StreamerElement,
    StreamerInfo, StreamerInfoContext, StreamerRegistry, TNamed, Unmarshaler, Value, Writer,
};

/// Compiled type for version 1 of `Point`.
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

/// Version 2 of `Point` gained a label.
fn point_v2() -> StreamerInfo {
    StreamerInfo::new(
        "Point",
        2,
        vec![
            StreamerElement::basic("fX", code::DOUBLE),
            StreamerElement::basic("fY", code::DOUBLE),
            StreamerElement::tstring("fLabel"),
        ],
    )
    .with_checksum(0x5eed_0002)
}

fn point_v2_object(info: Arc<StreamerInfo>, x: f64, label: &str) -> GenericObject {
    let mut obj = GenericObject::with_info(info);
    obj.push("fX", Value::F64(x))
        .push("fY", Value::F64(-x))
        .push("fLabel", Value::Str(label.into()));
    obj
}

#[test]
fn test_streamer_info_polymorphic_roundtrip() {
    let info = StreamerInfo::new(
        "Track",
        7,
        vec![
            StreamerElement::base("TNamed", 1),
            StreamerElement::basic("fN", code::INT),
            StreamerElement::counted("fPt", code::DOUBLE32, "fN", "Track")
                .with_title("transverse momentum [0,1000,24]"),
            StreamerElement::object_any("fOrigin", "Point"),
            StreamerElement::stl_vector("fHits", code::OBJECT, "vector<Point>"),
            StreamerElement::stl_string("fTag"),
        ],
    )
    .with_checksum(42);

    let ctx = Context::with_builtins();
    let mut w = Writer::new();
    w.write_object_any(Some(&info)).unwrap();
    let data = w.into_bytes();

    let mut r = Reader::with_context(&data, &ctx);
    let obj = r.read_object_any().unwrap().unwrap();
    let got = obj.downcast_ref::<StreamerInfo>().unwrap();
    assert_eq!(got, &info);
    assert_eq!(got.element("fPt").and_then(|e| e.range).map(|r| r.xmax), Some(1000.0));
    assert!(matches!(
        got.element("fPt").map(|e| &e.kind),
        Some(ElementKind::BasicPointer { count_name, .. }) if count_name == "fN"
    ));
}

#[test]
fn test_generic_decode_without_compiled_type() {
    let mut writer_side = StreamerRegistry::new();
    let info = writer_side.register(point_v2());

    let mut w = Writer::new();
    w.write_object_any(Some(&point_v2_object(info, 2.0, "origin")))
        .unwrap();
    let data = w.into_bytes();

    let mut streamers = StreamerRegistry::new();
    streamers.register(point_v2());
    let ctx = Context::new(Factory::with_builtins(), streamers);

    let mut r = Reader::with_context(&data, &ctx);
    let obj = r.read_object_any().unwrap().unwrap();
    let got = obj.downcast_ref::<GenericObject>().unwrap();
    assert_eq!(got.class(), "Point");
    assert_eq!(got.field("fX").and_then(Value::as_f64), Some(2.0));
    assert_eq!(got.field("fY").and_then(Value::as_f64), Some(-2.0));
    assert_eq!(got.field("fLabel").and_then(Value::as_str), Some("origin"));
}

#[test]
fn test_fast_path_and_generic_selected_by_version() {
    let mut factory = Factory::with_builtins();
    factory.register_default::<Point>();
    let mut streamers = StreamerRegistry::new();
    let info = streamers.register(point_v2());
    let ctx = Context::new(factory, streamers);

    let mut w = Writer::new();
    w.write_object_any(Some(&Point { x: 1.0, y: 2.0 })).unwrap();
    w.write_object_any(Some(&point_v2_object(info, 3.0, "v2")))
        .unwrap();
    let data = w.into_bytes();

    let mut r = Reader::with_context(&data, &ctx);
    let v1 = r.read_object_any().unwrap().unwrap();
    assert_eq!(v1.downcast_ref::<Point>(), Some(&Point { x: 1.0, y: 2.0 }));

    let v2 = r.read_object_any().unwrap().unwrap();
    let generic = v2.downcast_ref::<GenericObject>().unwrap();
    assert_eq!(generic.version(), 2);
    assert_eq!(generic.field("fLabel").and_then(Value::as_str), Some("v2"));
    assert_eq!(r.remaining(), 0);
}

#[test]
fn test_version_from_checksum() {
    let mut streamers = StreamerRegistry::new();
    streamers.register(point_v2());
    let ctx = Context::new(Factory::new(), streamers);

    let mut w = Writer::new();
    let pos = w.write_version_checksum(0x5eed_0002);
    w.write_f64(4.0);
    w.write_f64(5.0);
    w.write_string("sum");
    w.set_byte_count(pos, "Point").unwrap();
    let data = w.into_bytes();

    let mut r = Reader::with_context(&data, &ctx);
    let frame = r.read_version("Point");
    assert_eq!(frame.version, 2);
    assert_eq!(r.pos(), 10);

    let mut obj = GenericObject::new("Point");
    let mut r = Reader::with_context(&data, &ctx);
    obj.unmarshal_root(&mut r).unwrap();
    assert_eq!(obj.field("fLabel").and_then(Value::as_str), Some("sum"));
}

#[test]
fn test_missing_streamer_reported() {
    let ctx = Context::with_builtins();
    assert_eq!(
        ctx.find_streamer("Point", Some(2)).unwrap_err(),
        Error::streamer_not_found("Point", Some(2))
    );
}

#[test]
fn test_concurrent_readers_share_context() {
    let mut streamers = StreamerRegistry::new();
    let info = streamers.register(point_v2());
    let ctx = Arc::new(Context::new(Factory::with_builtins(), streamers));

    let mut w = Writer::new();
    for i in 0..16 {
        w.write_object_any(Some(&point_v2_object(Arc::clone(&info), i as f64, "p")))
            .unwrap();
        w.write_object_any(Some(&TNamed::new(format!("n{i}"), ""))).unwrap();
    }
    let data = Arc::new(w.into_bytes());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            let data = Arc::clone(&data);
            thread::spawn(move || {
                let mut r = Reader::with_context(&data, &ctx);
                let mut sum = 0.0;
                for _ in 0..16 {
                    let point = r.read_object_any().unwrap().unwrap();
                    let point = point.downcast_ref::<GenericObject>().unwrap();
                    sum += point.field("fX").and_then(Value::as_f64).unwrap();
                    assert!(r.read_object_any().unwrap().unwrap().is::<TNamed>());
                }
                assert_eq!(r.remaining(), 0);
                sum
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 120.0);
    }
}
