//! Parsing, editing and lossless rebuilding of RSZ-based scene assets.
//!
//! The entry point is [`container::AssetFile`], which detects the outer
//! envelope (scene, prefab, user-root and their legacy revisions), parses
//! its tables and hands the framed object stream to [`rsz`]. Field layout
//! is driven entirely by an external [`registry::TypeRegistry`]; nothing
//! is inferred from the payload itself.
//!
//! Rebuilding a parsed file with no edits reproduces the input
//! byte-for-byte, padding and string-heap layout included.

pub mod container;
pub mod cursor;
pub mod error;
pub mod harvest;
pub mod registry;
pub mod rsz;
pub mod value;

pub(crate) mod macros;

pub use self::container::{AssetFile, Format};
pub use self::error::Error;
pub use self::registry::TypeRegistry;
