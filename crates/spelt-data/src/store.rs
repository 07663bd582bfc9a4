//! The content store: guarded pipelines over the git-backed source.

use std::path::Path;

use serde_json::Value;
use spelt_flow::Pipeline;
use spelt_gitfs::{GitFs, Version};
use spelt_singleflight::SingleFlight;
use tracing::instrument;

use crate::article::{Article, Author, parse_date};
use crate::error::DataError;
use crate::key::ResourceKey;

/// Deduplicated access to blog content.
///
/// One store is created per process and cloned wherever loads happen;
/// clones share the in-flight table and the pinned-read caches, so
/// concurrent loads of the same resource at the same version collapse
/// into one execution.
#[derive(Clone)]
pub struct ContentStore {
  git: GitFs,
  flights: SingleFlight<ResourceKey, Value, DataError>,
}

impl ContentStore {
  pub fn new(git: GitFs) -> Self {
    Self {
      git,
      flights: SingleFlight::new(),
    }
  }

  /// Open the repository at `repo`.
  pub fn open(repo: impl AsRef<Path>) -> Result<Self, DataError> {
    Ok(Self::new(GitFs::new(repo)?))
  }

  /// Pin the symbolic HEAD to a commit. Callers resolve once per
  /// request so every load in that request shares dedup keys.
  pub async fn resolve_head(&self) -> Result<Version, DataError> {
    Ok(self.git.resolve_head().await?)
  }

  /// Drop cached pinned reads (the in-flight table drains itself).
  pub fn clear_cache(&self) {
    self.git.clear_cache();
  }

  /// Load one article, headers parsed, author not embedded.
  #[instrument(skip(self), fields(version = %version, name = %name))]
  pub async fn load_article(&self, version: &Version, name: &str) -> Result<Article, DataError> {
    let key = ResourceKey::Article {
      version: version.clone(),
      name: name.to_string(),
    };
    let store = self.clone();
    let version = version.clone();
    let name = name.to_string();
    let value = self
      .flights
      .run(key, async move { store.article_value(version, name).await })
      .await?;
    decode(value, "article")
  }

  /// Load one author record.
  #[instrument(skip(self), fields(version = %version, name = %name))]
  pub async fn load_author(&self, version: &Version, name: &str) -> Result<Author, DataError> {
    let key = ResourceKey::Author {
      version: version.clone(),
      name: name.to_string(),
    };
    let store = self.clone();
    let version = version.clone();
    let name = name.to_string();
    let value = self
      .flights
      .run(key, async move { store.author_value(version, name).await })
      .await?;
    decode(value, "author")
  }

  /// Load an article with its author record embedded. An article
  /// without an `Author:` header comes back with no author record; a
  /// named author that doesn't exist fails the load.
  #[instrument(skip(self), fields(version = %version, name = %name))]
  pub async fn article_with_author(
    &self,
    version: &Version,
    name: &str,
  ) -> Result<Article, DataError> {
    let key = ResourceKey::ArticleWithAuthor {
      version: version.clone(),
      name: name.to_string(),
    };
    let store = self.clone();
    let version = version.clone();
    let name = name.to_string();
    let value = self
      .flights
      .run(key, async move {
        store.article_with_author_value(version, name).await
      })
      .await?;
    decode(value, "article")
  }

  /// Load an article with its author embedded plus `related`: the
  /// other articles by the same author, newest first.
  #[instrument(skip(self), fields(version = %version, name = %name))]
  pub async fn full_article(&self, version: &Version, name: &str) -> Result<Article, DataError> {
    let key = ResourceKey::FullArticle {
      version: version.clone(),
      name: name.to_string(),
    };
    let store = self.clone();
    let version = version.clone();
    let name = name.to_string();
    let value = self
      .flights
      .run(key, async move { store.full_article_value(version, name).await })
      .await?;
    decode(value, "article")
  }

  /// Distinct category names across every article, in listing order.
  #[instrument(skip(self), fields(version = %version))]
  pub async fn categories(&self, version: &Version) -> Result<Vec<String>, DataError> {
    let key = ResourceKey::Categories {
      version: version.clone(),
    };
    let store = self.clone();
    let version = version.clone();
    let value = self
      .flights
      .run(key, async move { store.categories_value(version).await })
      .await?;
    decode(value, "categories")
  }

  /// List every article under `articles/`, author embedded, newest
  /// first.
  #[instrument(skip(self), fields(version = %version))]
  pub async fn list_articles(&self, version: &Version) -> Result<Vec<Article>, DataError> {
    let key = ResourceKey::ArticleListing {
      version: version.clone(),
    };
    let store = self.clone();
    let version = version.clone();
    let value = self
      .flights
      .run(key, async move { store.listing_value(version).await })
      .await?;
    decode(value, "article listing")
  }

  /// Raw template source from `skin/<name>.haml`. Compiling it is the
  /// renderer's business.
  #[instrument(skip(self), fields(version = %version, name = %name))]
  pub async fn template_source(&self, version: &Version, name: &str) -> Result<String, DataError> {
    let key = ResourceKey::Template {
      version: version.clone(),
      name: name.to_string(),
    };
    let git = self.git.clone();
    let version = version.clone();
    let name = name.to_string();
    let value = self
      .flights
      .run(key, async move {
        let path = format!("skin/{name}.haml");
        read_utf8(&git, &version, &path, &name).await.map(Value::String)
      })
      .await?;
    take_string(Some(value), "template")
  }

  async fn article_value(self, version: Version, name: String) -> Result<Value, DataError> {
    let git = self.git.clone();
    let path = format!("articles/{name}.markdown");
    let read_name = name.clone();
    let values = Pipeline::<Value, DataError>::new()
      .fanout(move |_, scope| {
        scope.ticket(async move {
          read_utf8(&git, &version, &path, &read_name)
            .await
            .map(Value::String)
        });
        Ok(())
      })
      .sync(move |input| {
        let mut values = input.check()?;
        let text = take_string(values.pop(), &name)?;
        encode(&Article::parse(&name, &text), &name)
      })
      .run()
      .await?;
    single(values, "article")
  }

  async fn author_value(self, version: Version, name: String) -> Result<Value, DataError> {
    let git = self.git.clone();
    let path = format!("authors/{name}.markdown");
    let read_name = name.clone();
    let values = Pipeline::<Value, DataError>::new()
      .fanout(move |_, scope| {
        scope.ticket(async move {
          read_utf8(&git, &version, &path, &read_name)
            .await
            .map(Value::String)
        });
        Ok(())
      })
      .sync(move |input| {
        let mut values = input.check()?;
        let text = take_string(values.pop(), &name)?;
        encode(&Author::parse(&name, &text), &name)
      })
      .run()
      .await?;
    single(values, "author")
  }

  async fn article_with_author_value(
    self,
    version: Version,
    name: String,
  ) -> Result<Value, DataError> {
    let values = Pipeline::<Value, DataError>::new()
      .fanout({
        let store = self.clone();
        let version = version.clone();
        let name = name.clone();
        move |_, scope| {
          scope.ticket(async move {
            let article = store.load_article(&version, &name).await?;
            encode(&article, &name)
          });
          Ok(())
        }
      })
      .fanout({
        let store = self.clone();
        let version = version.clone();
        move |input, scope| {
          let mut values = input.check()?;
          let article = values.pop().ok_or_else(|| missing_result("article"))?;
          let author_name = article
            .get("author")
            .and_then(Value::as_str)
            .map(str::to_string);
          // slot 0 carries the article through, slot 1 its author
          scope.ticket(async move { Ok(article) });
          if let Some(author_name) = author_name {
            scope.ticket(async move {
              let author = store.load_author(&version, &author_name).await?;
              encode(&author, &author_name)
            });
          }
          Ok(())
        }
      })
      .sync(|input| {
        let mut values = input.check()?;
        let author = if values.len() == 2 { values.pop() } else { None };
        let mut article = values.pop().ok_or_else(|| missing_result("article"))?;
        if let (Some(map), Some(author)) = (article.as_object_mut(), author) {
          map.insert("author_record".to_string(), author);
        }
        Ok(article)
      })
      .run()
      .await?;
    single(values, "article")
  }

  async fn full_article_value(self, version: Version, name: String) -> Result<Value, DataError> {
    let values = Pipeline::<Value, DataError>::new()
      .fanout({
        let store = self.clone();
        let version = version.clone();
        let name = name.clone();
        move |_, scope| {
          // slot 0 the article itself, slot 1 the whole listing
          scope.ticket({
            let store = store.clone();
            let version = version.clone();
            let name = name.clone();
            async move {
              let article = store.article_with_author(&version, &name).await?;
              encode(&article, &name)
            }
          });
          scope.ticket(async move {
            let articles = store.list_articles(&version).await?;
            encode(&articles, "article listing")
          });
          Ok(())
        }
      })
      .sync(move |input| {
        let mut values = input.check()?;
        let listing = values.pop().ok_or_else(|| missing_result("article listing"))?;
        let mut article = values.pop().ok_or_else(|| missing_result("article"))?;
        let author = article
          .get("author")
          .and_then(Value::as_str)
          .map(str::to_string);
        let related: Vec<Value> = match (author, listing) {
          (Some(author), Value::Array(articles)) => articles
            .into_iter()
            .filter(|other| {
              other.get("author").and_then(Value::as_str) == Some(author.as_str())
                && other.get("name").and_then(Value::as_str) != Some(name.as_str())
            })
            .collect(),
          _ => Vec::new(),
        };
        if !related.is_empty() {
          if let Some(map) = article.as_object_mut() {
            map.insert("related".to_string(), Value::Array(related));
          }
        }
        Ok(article)
      })
      .run()
      .await?;
    single(values, "article")
  }

  async fn categories_value(self, version: Version) -> Result<Value, DataError> {
    let values = Pipeline::<Value, DataError>::new()
      .fanout({
        let git = self.git.clone();
        let version = version.clone();
        move |_, scope| {
          scope.ticket(async move {
            let listing = git.read_dir(&version, "articles").await?;
            Ok(Value::Array(
              listing.files.into_iter().map(Value::String).collect(),
            ))
          });
          Ok(())
        }
      })
      .fanout({
        let store = self.clone();
        let version = version.clone();
        move |input, scope| {
          let mut values = input.check()?;
          let files = match values.pop() {
            Some(Value::Array(files)) => files,
            _ => return Err(missing_result("categories")),
          };
          for file in files {
            let Some(name) = file.as_str().and_then(|f| f.strip_suffix(".markdown")) else {
              continue;
            };
            let name = name.to_string();
            let store = store.clone();
            let version = version.clone();
            scope.ticket(async move {
              let article = store.load_article(&version, &name).await?;
              encode(&article, &name)
            });
          }
          Ok(())
        }
      })
      .sync(|input| {
        let articles = input.check()?;
        // first appearance wins, in listing order
        let mut names: Vec<String> = Vec::new();
        for article in &articles {
          let Some(categories) = article.get("categories").and_then(Value::as_array) else {
            continue;
          };
          for category in categories {
            if let Some(category) = category.as_str() {
              if !names.iter().any(|known| known == category) {
                names.push(category.to_string());
              }
            }
          }
        }
        Ok(Value::Array(names.into_iter().map(Value::String).collect()))
      })
      .run()
      .await?;
    single(values, "categories")
  }

  async fn listing_value(self, version: Version) -> Result<Value, DataError> {
    let values = Pipeline::<Value, DataError>::new()
      .fanout({
        let git = self.git.clone();
        let version = version.clone();
        move |_, scope| {
          scope.ticket(async move {
            let listing = git.read_dir(&version, "articles").await?;
            Ok(Value::Array(
              listing.files.into_iter().map(Value::String).collect(),
            ))
          });
          Ok(())
        }
      })
      .fanout({
        let store = self.clone();
        let version = version.clone();
        move |input, scope| {
          let mut values = input.check()?;
          let files = match values.pop() {
            Some(Value::Array(files)) => files,
            _ => return Err(missing_result("article listing")),
          };
          for file in files {
            let Some(name) = file.as_str().and_then(|f| f.strip_suffix(".markdown")) else {
              continue;
            };
            let name = name.to_string();
            let store = store.clone();
            let version = version.clone();
            scope.ticket(async move {
              let article = store.article_with_author(&version, &name).await?;
              encode(&article, &name)
            });
          }
          Ok(())
        }
      })
      .sync(|input| {
        let mut articles = input.check()?;
        // newest first; undated articles sink to the end
        articles.sort_by_key(|article| {
          std::cmp::Reverse(
            article
              .get("date")
              .and_then(Value::as_str)
              .and_then(parse_date),
          )
        });
        Ok(Value::Array(articles))
      })
      .run()
      .await?;
    single(values, "article listing")
  }
}

async fn read_utf8(
  git: &GitFs,
  version: &Version,
  path: &str,
  name: &str,
) -> Result<String, DataError> {
  let bytes = git.read_file(version, path).await?;
  String::from_utf8(bytes).map_err(|e| DataError::Malformed {
    name: name.to_string(),
    message: format!("not valid UTF-8: {e}"),
  })
}

fn encode<T: serde::Serialize>(value: &T, name: &str) -> Result<Value, DataError> {
  serde_json::to_value(value).map_err(|e| DataError::Malformed {
    name: name.to_string(),
    message: e.to_string(),
  })
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T, DataError> {
  serde_json::from_value(value).map_err(|e| DataError::Malformed {
    name: what.to_string(),
    message: e.to_string(),
  })
}

fn take_string(value: Option<Value>, name: &str) -> Result<String, DataError> {
  match value {
    Some(Value::String(text)) => Ok(text),
    other => Err(DataError::Malformed {
      name: name.to_string(),
      message: format!("expected text, got {other:?}"),
    }),
  }
}

fn single(mut values: Vec<Value>, what: &str) -> Result<Value, DataError> {
  values.pop().ok_or_else(|| missing_result(what))
}

fn missing_result(what: &str) -> DataError {
  DataError::Malformed {
    name: what.to_string(),
    message: "pipeline produced no result".to_string(),
  }
}
