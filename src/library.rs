//! The exercise library shown in the picker.
//!
//! Read from a URL or a local file. Either shape is accepted:
//! `[{"category": .., "items": [..]}, ..]` or `{"categories": [..]}`.
//! A library that cannot be loaded is replaced by a tiny built-in one and a
//! warning for the user; it is never fatal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
  pub category: String,
  pub items: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LibraryError {
  #[error("Invalid exercises schema.")]
  InvalidSchema,
  #[error("download failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("read failed: {0}")]
  Io(#[from] std::io::Error),
  #[error("not JSON: {0}")]
  Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LibraryDocument {
  List(Vec<Category>),
  Wrapped { categories: Vec<Category> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedLibrary {
  pub categories: Vec<Category>,
  /// Set when the fallback list is in use.
  pub warning: Option<String>,
}

pub fn normalize(value: serde_json::Value) -> Result<Vec<Category>, LibraryError> {
  match serde_json::from_value::<LibraryDocument>(value) {
    Ok(LibraryDocument::List(categories)) | Ok(LibraryDocument::Wrapped { categories }) => Ok(categories),
    Err(_) => Err(LibraryError::InvalidSchema),
  }
}

pub fn fallback() -> Vec<Category> {
  vec![Category { category: "Sample".to_string(), items: vec!["Push-Up".to_string(), "Air Squat".to_string()] }]
}

pub async fn load(source: &str) -> LoadedLibrary {
  match fetch(source).await {
    Ok(categories) => {
      info!("Loaded {} exercise categories from {}", categories.len(), source);
      LoadedLibrary { categories, warning: None }
    }
    Err(e) => {
      error!("Failed to load exercises from {}: {}", source, e);
      LoadedLibrary {
        categories: fallback(),
        warning: Some(format!("Could not load {} ({}). Using a small fallback list.", source, e)),
      }
    }
  }
}

async fn fetch(source: &str) -> Result<Vec<Category>, LibraryError> {
  let value: serde_json::Value = if source.starts_with("http://") || source.starts_with("https://") {
    reqwest::get(source).await?.error_for_status()?.json().await?
  } else {
    serde_json::from_slice(&tokio::fs::read(source).await?)?
  };
  normalize(value)
}

/// Case-insensitive substring search. Categories left without items are dropped.
pub fn filter(categories: &[Category], query: &str) -> Vec<Category> {
  let query = query.trim().to_lowercase();
  if query.is_empty() {
    return categories.to_vec();
  }
  categories
    .iter()
    .map(|c| Category {
      category: c.category.clone(),
      items: c.items.iter().filter(|item| item.to_lowercase().contains(&query)).cloned().collect(),
    })
    .filter(|c| !c.items.is_empty())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn sample() -> Vec<Category> {
    vec![
      Category { category: "Legs".into(), items: vec!["Air Squat".into(), "Lunges".into()] },
      Category { category: "Chest".into(), items: vec!["Push-up".into(), "Dips".into()] },
    ]
  }

  #[test]
  fn test_normalize_top_level_array() {
    let value = json!([{ "category": "Legs", "items": ["Air Squat"] }]);
    let categories = normalize(value).unwrap();
    assert_eq!(categories, vec![Category { category: "Legs".into(), items: vec!["Air Squat".into()] }]);
  }

  #[test]
  fn test_normalize_wrapped_object() {
    let value = json!({ "categories": [{ "category": "Back", "items": ["Pull-ups", "Rows"] }] });
    let categories = normalize(value).unwrap();
    assert_eq!(categories[0].items.len(), 2);
  }

  #[test]
  fn test_normalize_rejects_other_shapes() {
    assert!(matches!(normalize(json!({ "exercises": [] })), Err(LibraryError::InvalidSchema)));
    assert!(matches!(normalize(json!(42)), Err(LibraryError::InvalidSchema)));
  }

  #[test]
  fn test_filter_is_case_insensitive_and_hides_empty() {
    let found = filter(&sample(), "SQU");
    assert_eq!(found, vec![Category { category: "Legs".into(), items: vec!["Air Squat".into()] }]);
  }

  #[test]
  fn test_blank_filter_keeps_everything() {
    assert_eq!(filter(&sample(), "   "), sample());
    assert!(filter(&sample(), "zzz").is_empty());
  }

  #[tokio::test]
  async fn test_missing_file_falls_back_with_warning() {
    let loaded = load("/definitely/not/here/exercises.json").await;
    assert_eq!(loaded.categories, fallback());
    assert!(loaded.warning.unwrap().contains("fallback"));
  }

  #[tokio::test]
  async fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exercises.json");
    std::fs::write(&path, r#"{"categories":[{"category":"Core","items":["Dead Bug"]}]}"#).unwrap();
    let loaded = load(path.to_str().unwrap()).await;
    assert_eq!(loaded.warning, None);
    assert_eq!(loaded.categories[0].items, vec!["Dead Bug".to_string()]);
  }

  #[tokio::test]
  async fn test_bad_schema_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exercises.json");
    std::fs::write(&path, r#"{"nope":true}"#).unwrap();
    let loaded = load(path.to_str().unwrap()).await;
    assert_eq!(loaded.categories, fallback());
    assert!(loaded.warning.unwrap().contains("Invalid exercises schema."));
  }
}
