use std::thread;

use tracing::debug;

use crate::{
    class::{ClassEntity, ClassRc, ClassState},
    loader::ClassLoader,
    Error, Result,
};

impl ClassEntity {
    /// Prepares the class if needed and runs its static initializer exactly once
    ///
    /// The superclass is initialized first. When several threads request initialization
    /// concurrently, one runs the initializer and the others wait for it to finish; a request
    /// from the initializing thread itself returns immediately.
    ///
    /// # Errors
    /// Returns the preparation error, an [`Error::AncestorFailed`] wrapping the failure of the
    /// superclass, or the error reported by the initializer. Failures are recorded on the
    /// class.
    pub fn initialize(self: &ClassRc, loader: &ClassLoader) -> Result<()> {
        match self.state() {
            ClassState::Initialized => return Ok(()),
            ClassState::Error => {
                return Err(self.failure_or_state_error(ClassState::Initialized))
            }
            _ => {}
        }

        self.prepare(loader)?;
        // Loader constraints are checked at resolution time
        self.state.raise(ClassState::ConstraintsVerified);

        if !self.is_interface() {
            if let Some(super_class) = self.super_class() {
                if let Err(error) = super_class.initialize(loader) {
                    return Err(self.fail(Error::AncestorFailed {
                        class: self.name().to_string(),
                        ancestor: super_class.name().to_string(),
                        source: Box::new(error),
                    }));
                }
            }
        }

        let current = thread::current().id();
        {
            let mut owner = lock!(self.init_owner);
            loop {
                match self.state() {
                    ClassState::Initialized => return Ok(()),
                    ClassState::Error => {
                        return Err(self.failure_or_state_error(ClassState::Initialized))
                    }
                    ClassState::Initializing if *owner == Some(current) => return Ok(()),
                    ClassState::Initializing => owner = wait!(self.init_done, owner),
                    _ => {
                        self.state.raise(ClassState::Initializing);
                        *owner = Some(current);
                        break;
                    }
                }
            }
        }

        debug!(class = %self.name(), "running static initializer");
        let outcome = loader.services().initializer.run(self);

        let mut owner = lock!(self.init_owner);
        *owner = None;
        let result = match outcome {
            Ok(()) => {
                self.state.raise(ClassState::Initialized);
                loader.stats().record_initialized();
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        };
        self.init_done.notify_all();
        result
    }
}
