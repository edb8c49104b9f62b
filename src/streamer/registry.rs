//! Registry of known streamer descriptors.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{StreamerInfo, StreamerInfoContext};
use crate::error::{Error, Result};

/// Streamer descriptors keyed by class name, each class holding one entry
/// per class version.
///
/// Populated through `&mut self`, then shared read-only like [`Factory`].
///
/// [`Factory`]: crate::Factory
#[derive(Debug, Default)]
pub struct StreamerRegistry {
    infos: HashMap<String, Vec<Arc<StreamerInfo>>>,
}

impl StreamerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `info`, replacing any entry with the same class and version.
    pub fn register(&mut self, info: StreamerInfo) -> Arc<StreamerInfo> {
        let info = Arc::new(info);
        let versions = self.infos.entry(info.name().to_string()).or_default();
        match versions.binary_search_by_key(&info.class_version(), |i| i.class_version()) {
            Ok(at) => versions[at] = Arc::clone(&info),
            Err(at) => versions.insert(at, Arc::clone(&info)),
        }
        debug!(
            class = info.name(),
            version = info.class_version(),
            checksum = info.checksum(),
            elements = info.elements().len(),
            "registered streamer info"
        );
        info
    }

    /// Latest registered version of `class`.
    pub fn streamer_info(&self, class: &str) -> Result<Arc<StreamerInfo>> {
        self.infos
            .get(class)
            .and_then(|versions| versions.last())
            .cloned()
            .ok_or_else(|| Error::streamer_not_found(class, None))
    }

    pub fn streamer_info_version(&self, class: &str, version: i32) -> Result<Arc<StreamerInfo>> {
        self.infos
            .get(class)
            .and_then(|versions| versions.iter().find(|i| i.class_version() == version))
            .cloned()
            .ok_or_else(|| Error::streamer_not_found(class, Some(version)))
    }

    /// Finds the descriptor of `class` written under `checksum`.
    pub fn by_checksum(&self, class: &str, checksum: u32) -> Option<Arc<StreamerInfo>> {
        self.infos
            .get(class)?
            .iter()
            .find(|i| i.checksum() == checksum)
            .cloned()
    }

    /// All descriptors, grouped by class, oldest version first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<StreamerInfo>> {
        self.infos.values().flatten()
    }

    /// Number of descriptors over all classes and versions.
    pub fn len(&self) -> usize {
        self.infos.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

impl StreamerInfoContext for StreamerRegistry {
    fn find_streamer(&self, class: &str, version: Option<i32>) -> Result<Arc<StreamerInfo>> {
        match version {
            Some(v) => self.streamer_info_version(class, v),
            None => self.streamer_info(class),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamer::StreamerElement;
    use crate::types::code;

    fn point(version: i32) -> StreamerInfo {
        StreamerInfo::new(
            "Point",
            version,
            vec![
                StreamerElement::basic("fX", code::DOUBLE),
                StreamerElement::basic("fY", code::DOUBLE),
            ],
        )
        .with_checksum(0x1000 + version as u32)
    }

    #[test]
    fn test_latest_and_exact_version() {
        let mut reg = StreamerRegistry::new();
        reg.register(point(3));
        reg.register(point(1));
        reg.register(point(2));

        assert_eq!(reg.len(), 3);
        assert_eq!(reg.streamer_info("Point").unwrap().class_version(), 3);
        assert_eq!(reg.streamer_info_version("Point", 1).unwrap().class_version(), 1);
        assert_eq!(
            reg.streamer_info_version("Point", 4).unwrap_err(),
            Error::streamer_not_found("Point", Some(4))
        );
        assert_eq!(
            reg.streamer_info("Track").unwrap_err(),
            Error::streamer_not_found("Track", None)
        );
    }

    #[test]
    fn test_register_replaces_same_version() {
        let mut reg = StreamerRegistry::new();
        reg.register(point(2));
        reg.register(point(2).with_checksum(77));

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.streamer_info("Point").unwrap().checksum(), 77);
    }

    #[test]
    fn test_by_checksum() {
        let mut reg = StreamerRegistry::new();
        reg.register(point(1));
        reg.register(point(2));

        let info = reg.by_checksum("Point", 0x1002).unwrap();
        assert_eq!(info.class_version(), 2);
        assert!(reg.by_checksum("Point", 0xdead).is_none());
        assert!(reg.by_checksum("Track", 0x1002).is_none());
    }

    #[test]
    fn test_find_streamer_through_trait() {
        let mut reg = StreamerRegistry::new();
        reg.register(point(5));
        let ctx: &dyn StreamerInfoContext = &reg;
        assert_eq!(ctx.find_streamer("Point", None).unwrap().class_version(), 5);
        assert!(ctx.find_streamer("Point", Some(4)).is_err());
        assert_eq!(reg.iter().count(), 1);
    }
}
