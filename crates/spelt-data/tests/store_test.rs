//! Integration tests for the content store against scratch repos.

use std::path::Path;
use std::process::Command;

use spelt_data::ContentStore;

fn git(dir: &Path, args: &[&str]) {
  let status = Command::new("git")
    .arg("-c")
    .arg("user.name=test")
    .arg("-c")
    .arg("user.email=test@example.com")
    .args(args)
    .current_dir(dir)
    .status()
    .expect("failed to run git");
  assert!(status.success(), "git {args:?} failed");
}

fn write(dir: &Path, path: &str, contents: &str) {
  let full = dir.join(path);
  std::fs::create_dir_all(full.parent().unwrap()).unwrap();
  std::fs::write(full, contents).unwrap();
}

fn blog_repo() -> tempfile::TempDir {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  git(dir.path(), &["init", "-q"]);
  write(
    dir.path(),
    "articles/intro.markdown",
    "Title: Intro\nAuthor: jane\nDate: 2010-06-25\nCategories: rust, tools\n\nWelcome to the blog.\n",
  );
  write(
    dir.path(),
    "articles/older.markdown",
    "Title: Older Post\nAuthor: jane\nDate: 2009-01-02\nCategories: rust\n\nSome history.\n",
  );
  write(
    dir.path(),
    "articles/undated.markdown",
    "Title: Undated\n\nNo date header at all.\n",
  );
  write(
    dir.path(),
    "authors/jane.markdown",
    "Email: jane@example.com\n\nJane writes code.\n",
  );
  write(dir.path(), "skin/index.haml", "%html\n  %body\n");
  git(dir.path(), &["add", "."]);
  git(dir.path(), &["commit", "-q", "-m", "seed blog content"]);
  dir
}

#[tokio::test]
async fn article_headers_are_lifted() {
  let repo = blog_repo();
  let store = ContentStore::open(repo.path()).unwrap();
  let version = store.resolve_head().await.unwrap();

  let article = store.load_article(&version, "intro").await.unwrap();
  assert_eq!(article.name, "intro");
  assert_eq!(article.title.as_deref(), Some("Intro"));
  assert_eq!(article.author.as_deref(), Some("jane"));
  assert_eq!(article.date.as_deref(), Some("2010-06-25"));
  assert_eq!(article.categories, vec!["rust", "tools"]);
  assert!(article.body.contains("Welcome to the blog."));
  assert!(article.author_record.is_none());
}

#[tokio::test]
async fn article_with_author_embeds_the_record() {
  let repo = blog_repo();
  let store = ContentStore::open(repo.path()).unwrap();
  let version = store.resolve_head().await.unwrap();

  let article = store.article_with_author(&version, "intro").await.unwrap();
  let author = article.author_record.expect("author should be embedded");
  assert_eq!(author.name, "jane");
  assert_eq!(author.email.as_deref(), Some("jane@example.com"));
  assert!(author.bio.contains("Jane writes code."));
}

#[tokio::test]
async fn article_without_author_header_stays_bare() {
  let repo = blog_repo();
  let store = ContentStore::open(repo.path()).unwrap();
  let version = store.resolve_head().await.unwrap();

  let article = store
    .article_with_author(&version, "undated")
    .await
    .unwrap();
  assert!(article.author.is_none());
  assert!(article.author_record.is_none());
}

#[tokio::test]
async fn listing_is_newest_first_with_undated_last() {
  let repo = blog_repo();
  let store = ContentStore::open(repo.path()).unwrap();
  let version = store.resolve_head().await.unwrap();

  let articles = store.list_articles(&version).await.unwrap();
  let names: Vec<&str> = articles.iter().map(|a| a.name.as_str()).collect();
  assert_eq!(names, vec!["intro", "older", "undated"]);

  // authors come embedded through the listing too
  assert!(articles[0].author_record.is_some());
}

#[tokio::test]
async fn full_article_relates_other_articles_by_the_same_author() {
  let repo = blog_repo();
  let store = ContentStore::open(repo.path()).unwrap();
  let version = store.resolve_head().await.unwrap();

  let article = store.full_article(&version, "intro").await.unwrap();
  assert!(article.author_record.is_some());
  let related: Vec<&str> = article.related.iter().map(|a| a.name.as_str()).collect();
  assert_eq!(related, vec!["older"]);
  // related entries are flat, not full articles themselves
  assert!(article.related[0].related.is_empty());

  let bare = store.full_article(&version, "undated").await.unwrap();
  assert!(bare.related.is_empty());
}

#[tokio::test]
async fn categories_are_collected_once_across_articles() {
  let repo = blog_repo();
  let store = ContentStore::open(repo.path()).unwrap();
  let version = store.resolve_head().await.unwrap();

  let categories = store.categories(&version).await.unwrap();
  assert_eq!(categories, vec!["rust", "tools"]);
}

#[tokio::test]
async fn concurrent_loads_agree() {
  let repo = blog_repo();
  let store = ContentStore::open(repo.path()).unwrap();
  let version = store.resolve_head().await.unwrap();

  let (a, b, c) = tokio::join!(
    store.article_with_author(&version, "intro"),
    store.article_with_author(&version, "intro"),
    store.article_with_author(&version, "intro"),
  );
  let a = a.unwrap();
  assert_eq!(a, b.unwrap());
  assert_eq!(a, c.unwrap());
}

#[tokio::test]
async fn missing_article_is_not_found() {
  let repo = blog_repo();
  let store = ContentStore::open(repo.path()).unwrap();
  let version = store.resolve_head().await.unwrap();

  let err = store.load_article(&version, "ghost").await.unwrap_err();
  assert!(err.is_not_found(), "unexpected error: {err}");
}

#[tokio::test]
async fn template_source_is_raw() {
  let repo = blog_repo();
  let store = ContentStore::open(repo.path()).unwrap();
  let version = store.resolve_head().await.unwrap();

  let source = store.template_source(&version, "index").await.unwrap();
  assert_eq!(source, "%html\n  %body\n");
}
