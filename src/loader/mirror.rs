//! Runtime type objects.
//!
//! Every class can be represented to managed code by one instance of the class of type
//! objects. The entity points at its object and the loader maps the object back to the
//! entity; both directions are set up once and never change.

use std::sync::Arc;

use tracing::trace;

use crate::{
    class::{ClassEntity, ClassRc},
    loader::{ClassLoader, CLASS_CLASS},
    services::ObjectRef,
    Error, Result,
};

impl ClassLoader {
    /// Returns the type object of `class`, allocating it on first use
    ///
    /// Concurrent callers may each allocate an object, but only the first one to be bound
    /// is kept and returned to everybody.
    ///
    /// # Errors
    /// Returns [`Error::OutOfMemory`] if the heap cannot allocate the object, or the error
    /// that prevented the class of type objects from loading.
    pub fn type_object(&self, class: &ClassRc) -> Result<ObjectRef> {
        if let Some(object) = class.type_object() {
            return Ok(object);
        }

        let class_class = self.load_class(CLASS_CLASS)?;
        let size = class_class
            .instance_size()
            .unwrap_or(self.config().header_size + self.config().reference_size * 2);
        let candidate = self
            .services()
            .heap
            .allocate(size as usize, class_class.id())
            .ok_or_else(|| Error::OutOfMemory(format!("type object of {}", class.name())))?;

        // The reverse mapping is in place before the object is published to other threads
        let object = class.bind_type_object(candidate, |object| {
            self.mirrors.insert(object, Arc::downgrade(class));
            trace!(class = %class.name(), object = object.value(), "type object bound");
        });
        Ok(object)
    }

    /// Returns the class represented by a type object
    #[must_use]
    pub fn class_of_type_object(&self, object: ObjectRef) -> Option<ClassRc> {
        self.mirrors
            .get(&object)
            .and_then(|entry| entry.value().upgrade())
    }

    /// `true` if `class` has a type object and that object maps back to `class`
    #[must_use]
    pub fn check_mirror(&self, class: &ClassEntity) -> bool {
        class
            .type_object()
            .and_then(|object| self.class_of_type_object(object))
            .is_some_and(|mirrored| mirrored.id() == class.id())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::classfile::ROOT_CLASS;

    #[test]
    fn type_object_is_bidirectional() {
        let loader = ClassLoader::new().unwrap();
        let root = loader.load_class(ROOT_CLASS).unwrap();
        assert!(!loader.check_mirror(&root));

        let object = loader.type_object(&root).unwrap();
        assert_eq!(loader.type_object(&root).unwrap(), object);
        assert!(loader.check_mirror(&root));
        assert_eq!(loader.class_of_type_object(object).unwrap().id(), root.id());
    }

    #[test]
    fn concurrent_binding_agrees() {
        let loader = ClassLoader::new().unwrap();
        let root = loader.load_class(ROOT_CLASS).unwrap();

        let objects: Vec<ObjectRef> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| loader.type_object(&root).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(objects.iter().all(|object| *object == objects[0]));
        assert!(loader.check_mirror(&root));
    }

    #[test]
    fn mirror_visible_to_every_caller() {
        for _ in 0..32 {
            let loader = ClassLoader::new().unwrap();
            let root = loader.load_class(ROOT_CLASS).unwrap();

            thread::scope(|scope| {
                for _ in 0..4 {
                    scope.spawn(|| {
                        let object = loader.type_object(&root).unwrap();
                        assert!(loader.check_mirror(&root));
                        assert_eq!(loader.class_of_type_object(object).unwrap().id(), root.id());
                    });
                }
            });
        }
    }
}
