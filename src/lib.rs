//! Read-only access to a git-compatible content-addressed object
//! store: loose objects, pack files, pack indices, and the delta
//! chains packed objects may be stored as.

pub mod delta;
pub mod error;
pub mod id;
pub mod object;
pub mod pack;
pub mod repo;

pub use error::{OdbError, Result};
pub use id::{ObjectId, ObjectType};
pub use object::{Blob, Commit, EntryKind, Object, Signature, Tag, Tree, TreeEntry};
pub use pack::{FindOffset, PackEntry, PackFile, PackIndex};
pub use repo::Repository;
