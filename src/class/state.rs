use std::sync::atomic::{AtomicU8, Ordering};

use strum::{Display, FromRepr, IntoStaticStr};

/// Lifecycle state of a runtime class
///
/// States only ever move forward. [`ClassState::Error`] is terminal and compares greater than
/// every other state, so use [`ClassState::is_at_least`] rather than `>=` for progress checks.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, IntoStaticStr, FromRepr)]
pub enum ClassState {
    /// Created from its definition, nothing resolved yet
    Start = 0,
    /// Superclass and interfaces are being resolved
    LoadingAncestors,
    /// All ancestors are resolved and linked
    Loaded,
    /// The verifier accepted the bytecode
    BytecodesVerified,
    /// Instance layout is computed, dispatch tables are being built
    InstanceSizeComputed,
    /// Layout, dispatch tables and static storage are complete
    Prepared,
    /// Loading constraints were checked
    ConstraintsVerified,
    /// The static initializer is running on some thread
    Initializing,
    /// Ready for use
    Initialized,
    /// A step failed; the failure is recorded on the class
    Error,
}

impl ClassState {
    /// `true` if this state is `target` or later, and not [`ClassState::Error`]
    #[must_use]
    pub fn is_at_least(self, target: ClassState) -> bool {
        self != ClassState::Error && self >= target
    }

    /// Name of the state, for error messages
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// A [`ClassState`] that can be read and advanced from several threads
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: ClassState) -> Self {
        AtomicState(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> ClassState {
        ClassState::from_repr(self.0.load(Ordering::Acquire)).unwrap_or(ClassState::Error)
    }

    /// Moves the state forward to `target`; never moves backwards and never leaves `Error`
    ///
    /// Returns `true` if the state changed.
    pub(crate) fn raise(&self, target: ClassState) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match ClassState::from_repr(current) {
                    Some(state) if state != ClassState::Error && state < target => {
                        Some(target as u8)
                    }
                    _ => None,
                }
            })
            .is_ok()
    }

    /// Enters the terminal error state
    pub(crate) fn fail(&self) {
        self.0.store(ClassState::Error as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_is_monotonic() {
        let state = AtomicState::new(ClassState::Start);
        assert!(state.raise(ClassState::Loaded));
        assert!(!state.raise(ClassState::LoadingAncestors));
        assert_eq!(state.load(), ClassState::Loaded);

        state.fail();
        assert!(!state.raise(ClassState::Prepared));
        assert_eq!(state.load(), ClassState::Error);
    }

    #[test]
    fn error_is_not_progress() {
        assert!(ClassState::Prepared.is_at_least(ClassState::Loaded));
        assert!(!ClassState::Error.is_at_least(ClassState::Loaded));
        assert!(!ClassState::Loaded.is_at_least(ClassState::Prepared));
        assert_eq!(ClassState::BytecodesVerified.name(), "BytecodesVerified");
    }
}
