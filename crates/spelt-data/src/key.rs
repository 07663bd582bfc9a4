use spelt_gitfs::Version;

/// Dedup key for guarded loads.
///
/// Total over every discriminating argument: the same name at two
/// versions is two resources, and an article with its author embedded
/// is a different resource than the bare article.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
  Article { version: Version, name: String },
  ArticleWithAuthor { version: Version, name: String },
  FullArticle { version: Version, name: String },
  Author { version: Version, name: String },
  ArticleListing { version: Version },
  Categories { version: Version },
  Template { version: Version, name: String },
}
