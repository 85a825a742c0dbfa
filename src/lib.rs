// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'strings/pool.rs' owns its bucket chains through raw pointers

//! # classlink
//!
//! The class model and linker of a managed-language runtime. `classlink` turns parsed class
//! definitions into fully linked runtime types: ancestors resolved, field offsets assigned,
//! virtual method and interface tables built, static storage allocated and the class
//! initialized, ready for instance allocation and method invocation.
//!
//! ## Features
//!
//! - **Class state machine** - load ancestors, verify, prepare, initialize; idempotent and
//!   at-most-once per class, safe to drive from many threads
//! - **Field layout** - inherited layouts, optional compaction with padding back-fill and
//!   size-sorted field order, separate static blocks
//! - **Dispatch tables** - virtual method table inheritance and override resolution, interface
//!   tables with throw-on-first-use stubs, placeholder methods for abstract classes
//! - **Fast subtype checks** - a bounded ancestor array embedded in every dispatch table, with
//!   a hierarchy walk as fallback
//! - **Interned strings** - a content-addressed table that gives string constants identity
//!
//! ## Quick Start
//!
//! ```rust
//! use classlink::prelude::*;
//!
//! let loader = ClassLoader::new()?;
//! loader.define(
//!     ClassDefinition::builder("demo/Shape")
//!         .abstract_class()
//!         .abstract_method("area", "()D")
//!         .build()?,
//! )?;
//! loader.define(
//!     ClassDefinition::builder("demo/Square")
//!         .extends("demo/Shape")
//!         .field("side", "D", FieldAccessFlags::PRIVATE)
//!         .method("area", "()D", MethodAccessFlags::PUBLIC)
//!         .build()?,
//! )?;
//!
//! let square = loader.initialize_class("demo/Square")?;
//! let shape = loader.get("demo/Shape").unwrap();
//! assert!(square.is_instanceof(&shape));
//!
//! let area = square.declared_method("area", "()D").unwrap();
//! let target = square.vtable().unwrap().dispatch_virtual(area.vtable_index().unwrap())?;
//! assert_eq!(target.class_id(), square.id());
//! # Ok::<(), classlink::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`classfile`] - The input model: definitions, descriptors, access flags, constants
//! - [`class`] - Runtime classes, fields, methods, constant pools, static storage, states
//! - [`link`] - Ancestor loading, field layout, dispatch tables, subtype checks,
//!   initialization
//! - [`loader`] - The registry driving classes through the pipeline
//! - [`strings`] - The interned-string table
//! - [`services`] - The collaborators the linker calls out to (heap, code generator,
//!   verifier, static initializer)
//!
//! ## Thread Safety
//!
//! All public types are `Send + Sync`. Linking steps are idempotent: concurrent requests for
//! the same class agree on one result, and a failure is recorded on the class and reported to
//! every later caller.
//!
//! ## Logging
//!
//! The crate emits `tracing` events and never installs a subscriber.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use classlink::prelude::*;
///
/// let loader = ClassLoader::new()?;
/// let root = loader.resolve_and_prepare(ROOT_CLASS)?;
/// assert_eq!(root.state(), ClassState::Prepared);
/// # Ok::<(), classlink::Error>(())
/// ```
pub mod prelude;

/// Parsed class definitions: the linker's input
pub mod classfile;

/// Runtime class model
pub mod class;

/// Linking pipeline: ancestors, layout, dispatch tables, subtype checks, initialization
pub mod link;

/// Class loader and registry
pub mod loader;

/// Interned strings
pub mod strings;

/// Collaborators of the linker
pub mod services;

/// Layout configuration
pub mod config;

/// `classlink` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `classlink` Error type
///
/// # Examples
///
/// ```rust
/// use classlink::{ClassLoader, Error};
///
/// let loader = ClassLoader::new()?;
/// match loader.load_class("demo/Missing") {
///     Err(Error::ClassNotFound(name)) => assert_eq!(name, "demo/Missing"),
///     other => panic!("unexpected {other:?}"),
/// }
/// # Ok::<(), classlink::Error>(())
/// ```
pub use error::Error;

/// The class loader, main entry point of the crate
pub use loader::ClassLoader;

/// Layout configuration
pub use config::LinkerConfig;

/// Runtime classes
pub use class::{ClassEntity, ClassId, ClassRc, ClassState};

/// Collaborator bundle
pub use services::Services;
