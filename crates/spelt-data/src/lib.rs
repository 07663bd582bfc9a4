//! Content loaders for spelt.
//!
//! Every loader is a keyed async operation: it runs as a
//! `spelt-flow` pipeline over the git-backed store and is wrapped in
//! a single-flight guard so concurrent requests for the same resource
//! at the same version share one underlying execution.
//!
//! # Architecture
//!
//! ```text
//! ContentStore
//! ├── load_article(version, name)         articles/<name>.markdown
//! ├── load_author(version, name)          authors/<name>.markdown
//! ├── article_with_author(version, name)  article + embedded author
//! ├── list_articles(version)              directory fan-out, newest first
//! ├── template_source(version, name)      skin/<name>.haml, raw
//! └── resolve_head()                      pin HEAD for a request
//!
//! every operation:
//!   SingleFlight<ResourceKey, Value, DataError>
//!     └── Pipeline stages over GitFs reads
//! ```

mod article;
mod error;
mod key;
mod store;

pub use article::{Article, Author};
pub use error::DataError;
pub use key::ResourceKey;
pub use store::ContentStore;
