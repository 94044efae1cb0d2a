//! ZParcel: a single-file embedded object store keyed by UUID, with typed
//! payloads, crash-evident per-record checksums, in-place updates, deletion
//! and free-space reuse.

pub mod alloc;
pub mod error;
pub mod list;
pub mod object;
pub mod parcel;
pub mod record;
pub mod stream;
pub mod tree;
pub mod types;

pub use error::{ParcelError, Result};
pub use object::Value;
pub use parcel::Parcel;
pub use types::ObjectType;
