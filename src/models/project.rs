use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl ProjectRecord {
    pub fn new(name: String, path: PathBuf) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            path,
            url: None,
            repo: None,
            scripts: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn script(&self, script_name: &str) -> Option<&str> {
        self.scripts.get(script_name).map(|s| s.as_str())
    }
}

/// Result of `validate_path`, shown before a project is added.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}
