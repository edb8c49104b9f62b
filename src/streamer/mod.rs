//! Streamer metadata: descriptors of a class's on-disk layout.
//!
//! A [`StreamerInfo`] lists the [`StreamerElement`]s of one class version in
//! the order they are written. Descriptors are themselves persisted objects,
//! so a file can carry the layout of every class it stores and readers
//! without compiled types can still decode them through
//! [`GenericObject`](crate::GenericObject).

mod element;
mod registry;

use std::sync::Arc;

pub use element::{ElementKind, StreamerElement, ELEMENT_VERSION};
pub use registry::StreamerRegistry;

use crate::base::TNamed;
use crate::containers::TObjArray;
use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::object::{Marshaler, Object, Unmarshaler};
use crate::reader::Reader;
use crate::writer::Writer;

/// Lookup of streamer descriptors by class name and version.
pub trait StreamerInfoContext {
    /// `None` asks for the latest registered version.
    fn find_streamer(&self, class: &str, version: Option<i32>) -> Result<Arc<StreamerInfo>>;
}

/// Layout of one version of a class.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamerInfo {
    pub named: TNamed,
    pub checksum: u32,
    pub class_version: i32,
    pub elements: Vec<StreamerElement>,
}

impl StreamerInfo {
    pub const VERSION: i16 = 9;

    pub fn new(class: &str, class_version: i32, elements: Vec<StreamerElement>) -> Self {
        Self {
            named: TNamed::new(class, ""),
            checksum: 0,
            class_version,
            elements,
        }
    }

    pub fn with_checksum(mut self, checksum: u32) -> Self {
        self.checksum = checksum;
        self
    }

    /// Name of the described class.
    pub fn name(&self) -> &str {
        &self.named.name
    }

    pub fn title(&self) -> &str {
        &self.named.title
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn class_version(&self) -> i32 {
        self.class_version
    }

    pub fn elements(&self) -> &[StreamerElement] {
        &self.elements
    }

    /// Element describing the member `name`.
    pub fn element(&self, name: &str) -> Option<&StreamerElement> {
        self.elements.iter().find(|e| e.name() == name)
    }
}

impl Marshaler for StreamerInfo {
    fn marshal_root(&self, w: &mut Writer) -> Result<usize> {
        w.status()?;
        let pos = w.write_version(Self::VERSION);
        self.named.marshal_root(w)?;
        w.write_u32(self.checksum);
        w.write_i32(self.class_version);

        let elements = TObjArray::new(
            self.elements
                .iter()
                .map(|e| Box::new(e.clone()) as Box<dyn Object>)
                .collect(),
        );
        w.write_object_any(Some(&elements))?;
        w.set_byte_count(pos, self.class())
    }
}

impl Unmarshaler for StreamerInfo {
    /// Element lists are polymorphic, so the reader needs a context.
    fn unmarshal_root(&mut self, r: &mut Reader<'_>) -> Result<()> {
        r.status()?;
        let frame = r.read_version(self.class());
        self.named.unmarshal_root(r)?;
        self.checksum = r.read_u32();
        self.class_version = r.read_i32();

        self.elements.clear();
        if let Some(obj) = r.read_object_any()? {
            let list = match obj.downcast::<TObjArray>() {
                Ok(list) => *list,
                Err(other) => {
                    let msg = format!("streamer element list stored as {}", other.class());
                    return Err(r.fail(Error::custom(msg)));
                }
            };
            for member in list.objs.into_iter().flatten() {
                match member.downcast::<StreamerElement>() {
                    Ok(elem) => self.elements.push(*elem),
                    Err(other) => {
                        let msg = format!("{} is not a streamer element", other.class());
                        return Err(r.fail(Error::custom(msg)));
                    }
                }
            }
        }
        r.check_frame(&frame, self.class())
    }
}

impl Object for StreamerInfo {
    fn class(&self) -> &str {
        "TStreamerInfo"
    }

    fn rversion(&self) -> i16 {
        Self::VERSION
    }

    fn accepts_version(&self, version: i16) -> bool {
        (2..=Self::VERSION).contains(&version)
    }

    crate::impl_any!();
}

pub(crate) fn register(factory: &mut Factory) {
    factory.register_default::<StreamerInfo>();
    for kind in ElementKind::all() {
        let class = kind.class();
        factory.register(class, move || {
            Box::new(StreamerElement {
                kind: kind.clone(),
                ..StreamerElement::default()
            })
        });
    }
}
