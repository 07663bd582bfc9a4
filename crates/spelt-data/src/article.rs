//! Article and author records.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A blog article.
///
/// Articles are markdown documents with a leading run of `Key: value`
/// header lines; the well-known headers are lifted into fields and the
/// rest stay in `props`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  /// Author name as written in the header.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub date: Option<String>,
  /// Category names from a comma-separated `Categories:` header.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub categories: Vec<String>,
  #[serde(default)]
  pub props: HashMap<String, String>,
  pub body: String,
  /// Full author record, filled in by `article_with_author`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author_record: Option<Author>,
  /// Other articles by the same author, filled in by `full_article`.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub related: Vec<Article>,
}

impl Article {
  pub fn parse(name: &str, text: &str) -> Self {
    let (mut props, body) = parse_front_matter(text);
    let categories = props
      .remove("categories")
      .map(|raw| {
        raw
          .split(',')
          .map(str::trim)
          .filter(|c| !c.is_empty())
          .map(str::to_string)
          .collect()
      })
      .unwrap_or_default();
    Self {
      name: name.to_string(),
      title: props.remove("title"),
      author: props.remove("author"),
      date: props.remove("date"),
      categories,
      props,
      body,
      author_record: None,
      related: Vec::new(),
    }
  }

  pub fn parsed_date(&self) -> Option<NaiveDateTime> {
    self.date.as_deref().and_then(parse_date)
  }
}

/// A blog author, loaded from `authors/<name>.markdown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(default)]
  pub props: HashMap<String, String>,
  pub bio: String,
}

impl Author {
  pub fn parse(name: &str, text: &str) -> Self {
    let (mut props, bio) = parse_front_matter(text);
    Self {
      name: name.to_string(),
      email: props.remove("email"),
      props,
      bio,
    }
  }
}

/// Split leading `Key: value` header lines from a markdown document.
/// Keys are alphabetic and stored lowercased; the first line that
/// doesn't match ends the header block.
fn parse_front_matter(text: &str) -> (HashMap<String, String>, String) {
  let mut props = HashMap::new();
  let mut rest = text;
  loop {
    let Some((line, tail)) = rest.split_once('\n') else {
      break;
    };
    let Some((key, value)) = line.split_once(':') else {
      break;
    };
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphabetic()) {
      break;
    }
    props.insert(key.to_ascii_lowercase(), value.trim().to_string());
    rest = tail;
  }
  (props, rest.trim_start_matches('\n').to_string())
}

/// Parse the date formats that appear in article headers: RFC 3339,
/// plain `YYYY-MM-DD`, or the long `Tue Jun 29 2010 11:20:00` form.
pub(crate) fn parse_date(raw: &str) -> Option<NaiveDateTime> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt.naive_utc());
  }
  if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
    return date.and_hms_opt(0, 0, 0);
  }
  NaiveDateTime::parse_from_str(raw, "%a %b %d %Y %H:%M:%S").ok()
}
