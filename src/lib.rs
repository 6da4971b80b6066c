//! Arbor evaluates trees of components into output trees.
//!
//! Components declare what props they accept as [`Descriptor`]s and turn props plus local state
//! into children. The [`Runtime`] mounts a root [`Node`], keeps one instance per tree position,
//! and re-evaluates on state updates:
//!
//! - props are validated on every render, producing [`Diagnostic`]s (or failures in strict mode)
//! - memoized components with shallow-equal inputs are skipped
//! - updates queued inside [`Runtime::batch`] are applied in one pass
//! - updates aimed at unmounted instances are dropped
//! - a render failure is contained by the nearest error boundary, which shows a fallback until
//!   reset
#![forbid(unsafe_code)]

mod foundation;

pub mod boundary;
pub mod component;
pub mod descriptor;
pub mod document;
pub mod instance;
pub mod output;
pub mod runtime;
pub mod scheduler;
pub mod schema;
pub mod validate;
pub mod value;

pub use crate::foundation::error::{ArborError, ArborResult, RenderError};

pub use crate::boundary::{CaughtError, ErrorStatus, ResetToken, UncaughtError};
pub use crate::component::{Child, Component, Node, RenderCtx, RenderResult, ResolvedProps, resolve_props};
pub use crate::descriptor::{Descriptor, Kind, Primitive};
pub use crate::document::Document;
pub use crate::instance::{CancelToken, InstancePath, PathSegment, SegmentKey, shallow_equal};
pub use crate::output::{Output, OutputFingerprint, fingerprint_output};
pub use crate::runtime::{RootHandle, Runtime, RuntimeConfig};
pub use crate::scheduler::{StateUpdate, Updater};
pub use crate::schema::{DescriptorDef, SchemaErrors, TagTable};
pub use crate::validate::{Diagnostic, DiagnosticKind, PropPath, ValidationResult, validate, validate_props};
pub use crate::value::{Function, Map, Symbol, Tag, Value};
