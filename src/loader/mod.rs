//! Class loader and registry.
//!
//! The [`ClassLoader`] owns everything that is shared between classes: the interned-string
//! table, the configuration, the collaborator [`Services`], the registered definitions and the
//! runtime classes created from them. It is the entry point for driving classes through the
//! linking pipeline.
//!
//! # Registry Architecture
//!
//! - **Definitions**: name-indexed (`DashMap`), registered up front with [`ClassLoader::define`]
//! - **Classes by name**: at most one runtime class per name, created through the map's entry
//!   API so concurrent loaders agree on the instance
//! - **Classes by id**: ordered (`SkipMap`) for stable enumeration
//! - **Type objects**: object handle to class, see [`ClassLoader::type_object`]
//!
//! Array classes (`[I`, `[[Lpkg/A;`) are never defined; they are created on first request from
//! their element class.
//!
//! # Examples
//!
//! ```rust
//! use classlink::prelude::*;
//!
//! let loader = ClassLoader::new()?;
//! loader.define(
//!     ClassDefinition::builder("demo/Point")
//!         .field("x", "I", FieldAccessFlags::PRIVATE)
//!         .field("y", "I", FieldAccessFlags::PRIVATE)
//!         .build()?,
//! )?;
//!
//! let point = loader.resolve_and_prepare("demo/Point")?;
//! assert_eq!(point.instance_size(), Some(24));
//! # Ok::<(), classlink::Error>(())
//! ```

mod bootstrap;
mod mirror;
mod stats;

use std::sync::Arc;

use crossbeam_skiplist::SkipMap;
use dashmap::{mapref::entry::Entry, DashMap};
use rayon::prelude::*;
use tracing::{debug, trace};

pub use bootstrap::{CLASS_CLASS, CLONEABLE_INTERFACE, SERIALIZABLE_INTERFACE, STRING_CLASS};
pub use stats::LinkStats;

use crate::{
    class::{Ancestors, ClassEntity, ClassId, ClassRc, ClassRef},
    classfile::{ClassDefinition, FieldType, PrimitiveKind, ROOT_CLASS},
    config::LinkerConfig,
    services::{ObjectRef, Services},
    strings::{InternedRef, StringPool},
    Error, Result,
};

/// Registry of class definitions and the runtime classes linked from them
pub struct ClassLoader {
    config: LinkerConfig,
    services: Services,
    strings: StringPool,
    definitions: DashMap<String, Arc<ClassDefinition>>,
    classes: SkipMap<ClassId, ClassRc>,
    by_name: DashMap<String, ClassRc>,
    pub(crate) mirrors: DashMap<ObjectRef, ClassRef>,
    stats: LinkStats,
}

impl ClassLoader {
    /// Creates a loader with the default configuration and services
    ///
    /// # Errors
    /// Returns an error if the bootstrap classes cannot be registered.
    pub fn new() -> Result<Self> {
        Self::with_services(LinkerConfig::default(), Services::default())
    }

    /// Creates a loader with a custom configuration and the default services
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the configuration is invalid.
    pub fn with_config(config: LinkerConfig) -> Result<Self> {
        Self::with_services(config, Services::default())
    }

    /// Creates a loader with a custom configuration and custom services
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the configuration is invalid.
    pub fn with_services(config: LinkerConfig, services: Services) -> Result<Self> {
        config.validate()?;

        let loader = ClassLoader {
            config,
            services,
            strings: StringPool::new(config.string_pool_buckets),
            definitions: DashMap::new(),
            classes: SkipMap::new(),
            by_name: DashMap::new(),
            mirrors: DashMap::new(),
            stats: LinkStats::default(),
        };
        bootstrap::install(&loader)?;
        Ok(loader)
    }

    /// The layout configuration
    #[must_use]
    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    /// The collaborators the loader links against
    #[must_use]
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// The interned-string table shared by all classes of this loader
    #[must_use]
    pub fn strings(&self) -> &StringPool {
        &self.strings
    }

    /// Linking counters
    #[must_use]
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Registers a class definition
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for an invalid definition and [`Error::ClassFormat`] if a
    /// class of the same name is already defined.
    pub fn define(&self, definition: ClassDefinition) -> Result<()> {
        definition.validate()?;

        match self.definitions.entry(definition.name.clone()) {
            Entry::Occupied(_) => Err(Error::ClassFormat {
                class: definition.name,
                message: "duplicate class definition".to_string(),
            }),
            Entry::Vacant(slot) => {
                trace!(class = %definition.name, "defined");
                slot.insert(Arc::new(definition));
                Ok(())
            }
        }
    }

    /// Registers several class definitions, stopping at the first failure
    ///
    /// # Errors
    /// As [`ClassLoader::define`].
    pub fn define_all<I>(&self, definitions: I) -> Result<()>
    where
        I: IntoIterator<Item = ClassDefinition>,
    {
        for definition in definitions {
            self.define(definition)?;
        }
        Ok(())
    }

    /// Loads the class named `name` and verifies it
    ///
    /// Ancestors are loaded recursively. The returned class is at least
    /// [`crate::class::ClassState::BytecodesVerified`].
    ///
    /// # Errors
    /// Returns [`Error::ClassNotFound`] for unknown names, [`Error::ClassCircularity`] when
    /// the class is its own ancestor, and any hierarchy or verification error.
    pub fn load_class(&self, name: &str) -> Result<ClassRc> {
        self.load_class_with(name, &mut Vec::new())
    }

    pub(crate) fn load_class_with(&self, name: &str, loading: &mut Vec<ClassId>) -> Result<ClassRc> {
        let class = self.find_or_create(name, loading)?;
        if loading.contains(&class.id()) {
            return Err(Error::ClassCircularity(name.to_string()));
        }

        class.load_ancestors(self, loading)?;
        class.verify(self)?;
        Ok(class)
    }

    fn find_or_create(&self, name: &str, loading: &mut Vec<ClassId>) -> Result<ClassRc> {
        if let Some(class) = self.by_name.get(name) {
            return Ok(class.value().clone());
        }
        if name.starts_with('[') {
            return self.create_array(name, loading);
        }

        let definition = self
            .definitions
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::ClassNotFound(name.to_string()))?;

        let class = match self.by_name.entry(name.to_string()) {
            Entry::Occupied(entry) => return Ok(entry.get().clone()),
            Entry::Vacant(slot) => {
                let class = Arc::new(ClassEntity::from_definition(
                    &definition,
                    ClassId::next(),
                    &self.strings,
                )?);
                slot.insert(class.clone());
                class
            }
        };
        self.classes.insert(class.id(), class.clone());
        debug!(class = %name, id = %class.id(), "created");
        Ok(class)
    }

    fn create_array(&self, name: &str, loading: &mut Vec<ClassId>) -> Result<ClassRc> {
        let element_type = match FieldType::parse(name)? {
            FieldType::Array(element) => *element,
            _ => return Err(Error::ClassNotFound(name.to_string())),
        };
        // Resolved before the entry is taken, the element may itself be an array
        let element = match element_type.primitive() {
            Some(kind) => self
                .primitive_class(kind)
                .ok_or_else(|| Error::ClassNotFound(kind.class_name().to_string()))?,
            None => self.load_class_with(&element_type.class_name(), loading)?,
        };
        let root = self.load_class_with(ROOT_CLASS, loading)?;
        let interfaces = vec![
            self.load_class_with(CLONEABLE_INTERFACE, loading)?,
            self.load_class_with(SERIALIZABLE_INTERFACE, loading)?,
        ];

        let class = match self.by_name.entry(name.to_string()) {
            Entry::Occupied(entry) => return Ok(entry.get().clone()),
            Entry::Vacant(slot) => {
                let class = Arc::new(ClassEntity::new_array(
                    ClassId::next(),
                    self.strings.intern_str(name),
                    element,
                    Ancestors {
                        super_class: Some(root.clone()),
                        interfaces,
                        depth: 1,
                    },
                ));
                slot.insert(class.clone());
                class
            }
        };
        root.add_child(&class);
        self.classes.insert(class.id(), class.clone());
        self.stats.record_loaded();
        debug!(class = %name, id = %class.id(), "array class created");
        Ok(class)
    }

    pub(crate) fn register(&self, class: &ClassRc) {
        self.by_name.insert(class.name().to_string(), class.clone());
        self.classes.insert(class.id(), class.clone());
    }

    /// Loads and prepares the class named `name`
    ///
    /// # Errors
    /// Any loading, verification or preparation error.
    pub fn resolve_and_prepare(&self, name: &str) -> Result<ClassRc> {
        let class = self.load_class(name)?;
        class.prepare(self)?;
        Ok(class)
    }

    /// Loads, prepares and initializes the class named `name`
    ///
    /// # Errors
    /// Any linking error, or the failure of a static initializer.
    pub fn initialize_class(&self, name: &str) -> Result<ClassRc> {
        let class = self.load_class(name)?;
        class.initialize(self)?;
        Ok(class)
    }

    /// Loads and prepares every defined class in parallel
    ///
    /// All classes are attempted; failures are recorded on the classes involved.
    ///
    /// # Errors
    /// Returns one of the errors encountered, if any class failed.
    pub fn prepare_all(&self) -> Result<usize> {
        let names: Vec<String> = self
            .definitions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let failures: Vec<Error> = names
            .par_iter()
            .filter_map(|name| self.resolve_and_prepare(name).err())
            .collect();

        debug!(classes = names.len(), failed = failures.len(), "bulk preparation finished");
        match failures.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(names.len()),
        }
    }

    /// Looks up an already created class by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ClassRc> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }

    /// Looks up an already created class by id
    #[must_use]
    pub fn get_by_id(&self, id: ClassId) -> Option<ClassRc> {
        self.classes.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of runtime classes created so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// `true` if no runtime class exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// All runtime classes, in creation order
    #[must_use]
    pub fn classes(&self) -> Vec<ClassRc> {
        self.classes
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// The class of one-dimensional arrays of `element`
    ///
    /// # Errors
    /// As [`ClassLoader::load_class`].
    pub fn array_class(&self, element: &ClassEntity) -> Result<ClassRc> {
        let name = match element.primitive_kind() {
            Some(kind) => format!("[{}", kind.descriptor()),
            None if element.is_array() => format!("[{}", element.name()),
            None => format!("[L{};", element.name()),
        };
        self.load_class(&name)
    }

    /// The class of a primitive type
    #[must_use]
    pub fn primitive_class(&self, kind: PrimitiveKind) -> Option<ClassRc> {
        self.get(kind.class_name())
    }

    /// Returns the runtime string object for an interned record, allocating it on first use
    ///
    /// # Errors
    /// Returns [`Error::OutOfMemory`] if the heap is exhausted, or the error that prevented
    /// the string class from loading.
    pub fn string_object(&self, record: &InternedRef) -> Result<ObjectRef> {
        if let Some(object) = record.runtime_object() {
            return Ok(object);
        }

        let string_class = self.load_class(STRING_CLASS)?;
        let size = string_class
            .instance_size()
            .unwrap_or(self.config.header_size + self.config.reference_size * 2);
        let heap = &self.services.heap;
        self.strings
            .intern_object(record, || heap.allocate(size as usize, string_class.id()))
    }
}
