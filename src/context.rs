//! Decoding context: the class factory plus known streamer descriptors.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::generic::GenericObject;
use crate::object::Object;
use crate::streamer::{StreamerInfo, StreamerInfoContext, StreamerRegistry};

/// Everything a [`Reader`](crate::Reader) needs to decode polymorphic members.
///
/// Built once, populated through `&mut`, then shared read-only between any
/// number of readers (`&Context` or `Arc<Context>`).
#[derive(Debug, Default)]
pub struct Context {
    factory: Factory,
    streamers: StreamerRegistry,
}

impl Context {
    pub fn new(factory: Factory, streamers: StreamerRegistry) -> Self {
        Self { factory, streamers }
    }

    /// A context knowing every class implemented by this crate and no
    /// streamer descriptors.
    pub fn with_builtins() -> Self {
        Self::new(Factory::with_builtins(), StreamerRegistry::new())
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut Factory {
        &mut self.factory
    }

    pub fn streamers(&self) -> &StreamerRegistry {
        &self.streamers
    }

    pub fn streamers_mut(&mut self) -> &mut StreamerRegistry {
        &mut self.streamers
    }

    /// Builds a blank object able to decode `class` at `version`.
    ///
    /// A compiled type is preferred when it accepts the stored version.
    /// Otherwise a streamer for that exact version selects the generic
    /// decoder. Failing both, the compiled type is used as is, then the
    /// latest streamer for the class.
    pub fn instantiate(&self, class: &str, version: Option<i16>) -> Result<Box<dyn Object>> {
        let compiled = match self.factory.instantiate(class) {
            Ok(obj) if version.map_or(true, |v| obj.accepts_version(v)) => return Ok(obj),
            Ok(obj) => Some(obj),
            Err(_) => None,
        };

        if let Some(v) = version {
            if self.streamers.streamer_info_version(class, v as i32).is_ok() {
                debug!(class, version = v, "decoding through streamer");
                return Ok(Box::new(GenericObject::new(class)));
            }
        }

        if let Some(obj) = compiled {
            warn!(
                class,
                version = ?version,
                supported = obj.rversion(),
                "no streamer for stored version, using compiled type"
            );
            return Ok(obj);
        }

        if self.streamers.streamer_info(class).is_ok() {
            debug!(class, "no compiled type, decoding through latest streamer");
            return Ok(Box::new(GenericObject::new(class)));
        }
        Err(Error::ClassNotFound(class.to_string()))
    }
}

impl StreamerInfoContext for Context {
    fn find_streamer(&self, class: &str, version: Option<i32>) -> Result<Arc<StreamerInfo>> {
        self.streamers.find_streamer(class, version)
    }
}
