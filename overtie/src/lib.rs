//! overtie: operator overloading and variable tying for a dynamic runtime
//!
//! Blessed references can take over conversions, dereference and operators
//! through per-class operator tables resolved along the class hierarchy.
//! Scalars, arrays, hashes and handles can be tied to handler objects that
//! receive every access.

pub mod class;
pub mod config;
pub mod describe;
pub mod error;
pub mod ops;
pub mod overload;
pub mod runtime;
pub mod tie;
pub mod value;

pub use class::{ClassHierarchy, ClassId};
pub use config::RuntimeConfig;
pub use error::{MagicError, MagicResult};
pub use overload::OverloadHandler;
pub use runtime::Runtime;
pub use tie::hash::HashCursor;
pub use tie::proxy::Proxy;
pub use tie::{TieBinding, TieKind};
pub use value::{Code, RefKind, Referent, Value};
