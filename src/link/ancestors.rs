//! Ancestor resolution and verification.
//!
//! Loading a class resolves its superclass and interfaces by name, loading them recursively.
//! No lock is held across the recursion: concurrent loaders of the same class compute the
//! same ancestors and the first to publish them wins. Cycles are detected with an explicit
//! stack of the classes currently being loaded on this thread.

use tracing::{debug, trace};

use crate::{
    class::{Ancestors, ClassEntity, ClassId, ClassRc, ClassState},
    classfile::ROOT_CLASS,
    loader::ClassLoader,
    Error, Result,
};

impl ClassEntity {
    /// Resolves and links the superclass and interfaces of this class
    ///
    /// `loading` holds the ids of the classes whose ancestors are being resolved further up
    /// the current call chain.
    pub(crate) fn load_ancestors(
        self: &ClassRc,
        loader: &ClassLoader,
        loading: &mut Vec<ClassId>,
    ) -> Result<()> {
        match self.state() {
            ClassState::Error => return Err(self.failure_or_state_error(ClassState::Loaded)),
            state if state.is_at_least(ClassState::Loaded) => return Ok(()),
            _ => {}
        }

        self.state.raise(ClassState::LoadingAncestors);
        loading.push(self.id());
        let resolved = self.resolve_ancestors(loader, loading);
        loading.pop();

        let ancestors = match resolved {
            Ok(ancestors) => ancestors,
            Err(error) => return Err(self.fail(error)),
        };

        let super_class = ancestors.super_class.clone();
        let interfaces = ancestors.interfaces.clone();
        if self.ancestors.set(ancestors).is_ok() {
            if let Some(super_class) = &super_class {
                super_class.add_child(self);
            }
            for interface in &interfaces {
                interface.add_child(self);
            }
            loader.stats().record_loaded();
            debug!(class = %self.name(), depth = self.depth().unwrap_or(0), "loaded");
        }
        // A concurrent loader may have published first; both computed the same ancestors
        self.state.raise(ClassState::Loaded);
        Ok(())
    }

    fn resolve_ancestors(
        &self,
        loader: &ClassLoader,
        loading: &mut Vec<ClassId>,
    ) -> Result<Ancestors> {
        let class_name = || self.name().to_string();

        let super_class = match self.super_name() {
            None if self.is_root() => None,
            None => {
                return Err(Error::ClassFormat {
                    class: class_name(),
                    message: "no superclass declared".to_string(),
                })
            }
            Some(_) if self.is_root() => {
                return Err(Error::ClassFormat {
                    class: class_name(),
                    message: "root class declares a superclass".to_string(),
                })
            }
            Some(super_name) => {
                trace!(class = %self.name(), super_class = %super_name, "resolving superclass");
                let super_class = loader.load_class_with(&super_name.to_string(), loading)?;
                if self.is_interface() {
                    if **super_class.name() != ROOT_CLASS {
                        return Err(Error::IncompatibleClassChange {
                            class: class_name(),
                            message: format!(
                                "interface has superclass {}, expected {ROOT_CLASS}",
                                super_class.name()
                            ),
                        });
                    }
                } else if super_class.is_interface() {
                    return Err(Error::IncompatibleClassChange {
                        class: class_name(),
                        message: format!("superclass {} is an interface", super_class.name()),
                    });
                } else if super_class.is_final() {
                    return Err(Error::IncompatibleClassChange {
                        class: class_name(),
                        message: format!("superclass {} is final", super_class.name()),
                    });
                }
                Some(super_class)
            }
        };

        let mut interfaces = Vec::with_capacity(self.interface_names().len());
        for interface_name in self.interface_names() {
            let interface = loader.load_class_with(&interface_name.to_string(), loading)?;
            if !interface.is_interface() {
                return Err(Error::IncompatibleClassChange {
                    class: class_name(),
                    message: format!("implements {}, which is not an interface", interface.name()),
                });
            }
            interfaces.push(interface);
        }

        let depth = match &super_class {
            Some(super_class) => super_class.depth().map_or(1, |depth| depth + 1),
            None => 0,
        };

        Ok(Ancestors {
            super_class,
            interfaces,
            depth,
        })
    }

    /// Runs the verifier once the class is loaded
    pub(crate) fn verify(&self, loader: &ClassLoader) -> Result<()> {
        match self.state() {
            ClassState::Error => return Err(self.failure_or_state_error(ClassState::BytecodesVerified)),
            state if state.is_at_least(ClassState::BytecodesVerified) => return Ok(()),
            state if !state.is_at_least(ClassState::Loaded) => {
                return Err(Error::InvalidState {
                    class: self.name().to_string(),
                    state: state.name(),
                    expected: ClassState::Loaded.name(),
                })
            }
            _ => {}
        }

        match loader.services().verifier.verify(self) {
            Ok(()) => {
                self.state.raise(ClassState::BytecodesVerified);
                trace!(class = %self.name(), "verified");
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }
}
