//! Class factory for polymorphic decoding.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::{Error, Result};
use crate::object::Object;

/// Builds a blank instance of one class.
pub type Constructor = Box<dyn Fn() -> Box<dyn Object> + Send + Sync>;

/// Factory maps class names to constructors.
///
/// Registration takes `&mut self` and is meant for start-up; afterwards the
/// factory is shared immutably (`&Factory` or `Arc<Factory>`) and
/// [`Factory::instantiate`] may be called from any number of threads.
#[derive(Default)]
pub struct Factory {
    ctors: HashMap<String, Constructor>,
}

impl Factory {
    /// Creates a new empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory with every class implemented by this crate.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        crate::base::register(&mut factory);
        crate::containers::register(&mut factory);
        crate::free::register(&mut factory);
        crate::streamer::register(&mut factory);
        factory
    }

    /// Registers a constructor for `class`. A later registration for the
    /// same name replaces the earlier one.
    pub fn register<F>(&mut self, class: &str, ctor: F)
    where
        F: Fn() -> Box<dyn Object> + Send + Sync + 'static,
    {
        if self.ctors.insert(class.to_string(), Box::new(ctor)).is_some() {
            debug!(class, "replaced class constructor");
        } else {
            debug!(class, "registered class constructor");
        }
    }

    /// Registers `T` under the class name its default value reports.
    pub fn register_default<T>(&mut self)
    where
        T: Object + Default,
    {
        let class = T::default().class().to_string();
        self.register(&class, || Box::new(T::default()));
    }

    /// Builds a fresh, zero-valued instance of `class`.
    pub fn instantiate(&self, class: &str) -> Result<Box<dyn Object>> {
        self.ctors
            .get(class)
            .map(|ctor| ctor())
            .ok_or_else(|| Error::ClassNotFound(class.to_string()))
    }

    /// Checks if a class name is registered.
    pub fn contains(&self, class: &str) -> bool {
        self.ctors.contains_key(class)
    }

    pub fn len(&self) -> usize {
        self.ctors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ctors.is_empty()
    }

    /// Registered class names, sorted.
    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ctors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("classes", &self.class_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{TNamed, TObject};
    use crate::object::{Marshaler, Unmarshaler};
    use crate::reader::Reader;
    use crate::writer::Writer;

    #[derive(Debug, Default)]
    struct Counter {
        tag: i32,
    }

    impl Marshaler for Counter {
        fn marshal_root(&self, w: &mut Writer) -> Result<usize> {
            w.write_i32(self.tag);
            w.status().map(|_| 4)
        }
    }

    impl Unmarshaler for Counter {
        fn unmarshal_root(&mut self, r: &mut Reader<'_>) -> Result<()> {
            self.tag = r.read_i32();
            r.status()
        }
    }

    impl Object for Counter {
        fn class(&self) -> &str {
            "Counter"
        }

        fn rversion(&self) -> i16 {
            1
        }

        crate::impl_any!();
    }

    #[test]
    fn test_factory_register() {
        let mut factory = Factory::new();
        factory.register_default::<TNamed>();

        assert!(factory.contains("TNamed"));
        assert_eq!(factory.len(), 1);

        let obj = factory.instantiate("TNamed").unwrap();
        assert_eq!(obj.class(), "TNamed");
        assert!(obj.is::<TNamed>());
    }

    #[test]
    fn test_factory_miss() {
        let factory = Factory::with_builtins();
        assert_eq!(
            factory.instantiate("TNoSuchClass").unwrap_err(),
            Error::ClassNotFound("TNoSuchClass".into())
        );
    }

    #[test]
    fn test_last_registration_wins() {
        let mut factory = Factory::new();
        factory.register("Counter", || Box::new(Counter { tag: 1 }));
        factory.register("Counter", || Box::new(Counter { tag: 2 }));

        let obj = factory.instantiate("Counter").unwrap();
        assert_eq!(obj.downcast_ref::<Counter>().unwrap().tag, 2);
        assert_eq!(factory.len(), 1);
    }

    #[test]
    fn test_instances_are_fresh() {
        let mut factory = Factory::new();
        factory.register_default::<Counter>();

        let mut a = factory.instantiate("Counter").unwrap();
        a.downcast_mut::<Counter>().unwrap().tag = 42;
        let b = factory.instantiate("Counter").unwrap();
        assert_eq!(b.downcast_ref::<Counter>().unwrap().tag, 0);
    }

    #[test]
    fn test_factory_thread_safe() {
        use std::sync::Arc;
        use std::thread;

        let factory = Arc::new(Factory::with_builtins());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let factory = Arc::clone(&factory);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let obj = factory.instantiate("TObject").unwrap();
                        assert!(obj.is::<TObject>());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_builtin_class_names() {
        let factory = Factory::with_builtins();
        for class in [
            "TObject",
            "TNamed",
            "TObjArray",
            "TFree",
            "TArrayI",
            "TArrayD",
            "TStreamerInfo",
            "TStreamerBasicType",
        ] {
            assert!(factory.contains(class), "{class}");
        }
    }
}
