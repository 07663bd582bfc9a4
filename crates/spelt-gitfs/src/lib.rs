//! Git-backed versioned content source.
//!
//! Content is addressed by `(version, path)`: a [`Version`] is either
//! the symbolic `HEAD` or a pinned commit sha. Reads at a pinned
//! commit are pure and cached; symbolic reads always hit the
//! repository again because `HEAD` can move between calls.

mod cache;
mod error;
mod gitfs;
mod version;

pub use error::GitFsError;
pub use gitfs::{GitFs, Listing};
pub use version::Version;
