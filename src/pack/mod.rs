pub mod chain;
pub mod file;
pub mod index;

pub use chain::{apply_chain, resolve_chain, DeltaChain, ResolvedBase};
pub use file::{Delta, PackEntry, PackFile, RawObjectHeader};
pub use index::{FindOffset, PackIndex};
