use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every failure that happens while loading, preparing or initializing a class is recorded on
/// the class itself and handed back to all later callers, which is why this type is `Clone`.
///
/// # Error Categories
///
/// ## Format Errors
/// - [`Error::Malformed`] - Malformed descriptor or definition data
/// - [`Error::ClassFormat`] - Malformed ancestor declaration
///
/// ## Hierarchy Errors
/// - [`Error::IncompatibleClassChange`] - Super is an interface or final, interface super is not
///   the root type, or a class implements a non-interface
/// - [`Error::ClassCircularity`] - A class is its own ancestor
///
/// ## Verification Errors
/// - [`Error::Verify`] - Verifier rejection or illegal override of a `final` method
///
/// ## Resolution Errors
/// - [`Error::ClassNotFound`], [`Error::NoSuchField`], [`Error::NoSuchMethod`]
/// - [`Error::AncestorFailed`] - An ancestor could not be prepared
/// - [`Error::InvalidConstantIndex`], [`Error::ConstantTypeMismatch`]
///
/// ## Exhaustion Errors
/// - [`Error::OutOfMemory`] - Static block, dispatch table or object allocation failed
///
/// ## Deferred Dispatch Errors
/// - [`Error::AbstractMethod`], [`Error::IllegalAccess`] - Raised when a stub slot is invoked
///
/// # Examples
///
/// ```rust
/// use classlink::{ClassLoader, Error};
///
/// let loader = ClassLoader::new()?;
/// match loader.resolve_and_prepare("does/not/Exist") {
///     Err(Error::ClassNotFound(name)) => assert_eq!(name, "does/not/Exist"),
///     other => panic!("unexpected result: {other:?}"),
/// }
/// # Ok::<(), classlink::Error>(())
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Input data is damaged and could not be interpreted.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The ancestor declaration of a class is malformed, e.g. a non-root class without a super.
    #[error("Class format error in {class}: {message}")]
    ClassFormat {
        /// Internal name of the offending class
        class: String,
        /// What was wrong with the declaration
        message: String,
    },

    /// The resolved hierarchy is not legal (final or interface super, non-interface implemented).
    #[error("Incompatible class change in {class}: {message}")]
    IncompatibleClassChange {
        /// Internal name of the offending class
        class: String,
        /// What was wrong with the hierarchy
        message: String,
    },

    /// A class was found to be its own ancestor while loading.
    #[error("Class circularity detected at {0}")]
    ClassCircularity(String),

    /// The class was rejected by the verifier, or tried to override a `final` method.
    #[error("Verification failed for {class}: {message}")]
    Verify {
        /// Internal name of the offending class
        class: String,
        /// The reason for the rejection
        message: String,
    },

    /// No definition is registered for the requested name.
    #[error("Class not found - {0}")]
    ClassNotFound(String),

    /// A field reference could not be resolved.
    #[error("No such field {class}.{name}:{descriptor}")]
    NoSuchField {
        /// Class the lookup started from
        class: String,
        /// Field name
        name: String,
        /// Field descriptor
        descriptor: String,
    },

    /// A method reference could not be resolved.
    #[error("No such method {class}.{name}{descriptor}")]
    NoSuchMethod {
        /// Class the lookup started from
        class: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },

    /// An ancestor of the class failed to prepare.
    #[error("Failed to prepare ancestor {ancestor} of {class}: {source}")]
    AncestorFailed {
        /// The class being prepared
        class: String,
        /// The ancestor that failed
        ancestor: String,
        /// Why the ancestor failed
        #[source]
        source: Box<Error>,
    },

    /// A constant pool index is zero or out of range.
    #[error("Invalid constant pool index - {0}")]
    InvalidConstantIndex(u16),

    /// A constant pool entry has a different kind than the caller expected.
    #[error("Constant pool entry {index} is not a {expected}")]
    ConstantTypeMismatch {
        /// The index that was accessed
        index: u16,
        /// The expected kind of entry
        expected: &'static str,
    },

    /// An offset or index lies outside the table or storage block it addresses.
    #[error("Out of bounds access - {0}")]
    OutOfBounds(String),

    /// An allocation failed.
    #[error("Out of memory while allocating {0}")]
    OutOfMemory(String),

    /// An interface slot without implementation was invoked.
    #[error("Abstract method {class}.{method} invoked")]
    AbstractMethod {
        /// The class whose dispatch table holds the slot
        class: String,
        /// Name and descriptor of the missing method
        method: String,
    },

    /// An interface slot bound to a non-public implementation was invoked.
    #[error("Illegal access to {class}.{method}")]
    IllegalAccess {
        /// The class whose dispatch table holds the slot
        class: String,
        /// Name and descriptor of the inaccessible method
        method: String,
    },

    /// The class is not in a state that allows the requested operation.
    #[error("Class {class} is {state}, expected at least {expected}")]
    InvalidState {
        /// Internal name of the class
        class: String,
        /// The current state
        state: &'static str,
        /// The minimal state required
        expected: &'static str,
    },

    /// The static initializer of a class failed.
    #[error("Static initializer of {class} failed: {message}")]
    Initializer {
        /// Internal name of the class
        class: String,
        /// The reported failure
        message: String,
    },

    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically
    /// when trying to acquire a mutex that is in an invalid state.
    #[error("Failed to lock target")]
    LockError,
}

impl Error {
    /// Returns `true` for errors that belong to the hierarchy category
    #[must_use]
    pub fn is_hierarchy_error(&self) -> bool {
        matches!(
            self,
            Error::IncompatibleClassChange { .. } | Error::ClassCircularity(_)
        )
    }

    /// Returns `true` for errors that are raised on first invocation of a stub slot
    #[must_use]
    pub fn is_deferred_dispatch_error(&self) -> bool {
        matches!(self, Error::AbstractMethod { .. } | Error::IllegalAccess { .. })
    }

    /// Follows `AncestorFailed` chains down to the original cause
    #[must_use]
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::AncestorFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_macro_captures_location() {
        let err = malformed_error!("bad descriptor {}", "Q");
        match err {
            Error::Malformed {
                message,
                file,
                line,
            } => {
                assert_eq!(message, "bad descriptor Q");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn root_cause_unwraps_ancestor_chain() {
        let inner = Error::ClassCircularity("a/A".to_string());
        let outer = Error::AncestorFailed {
            class: "a/C".to_string(),
            ancestor: "a/B".to_string(),
            source: Box::new(Error::AncestorFailed {
                class: "a/B".to_string(),
                ancestor: "a/A".to_string(),
                source: Box::new(inner.clone()),
            }),
        };

        assert_eq!(outer.root_cause(), &inner);
        assert!(outer.root_cause().is_hierarchy_error());
        assert!(!outer.is_deferred_dispatch_error());
    }
}
