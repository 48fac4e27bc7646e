use crate::error::{Result, SupervisorError};
use crate::models::{PathValidation, ProjectRecord};
use crate::services::manifest_parser::{ManifestParser, ParseError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProjectFile {
    projects: Vec<ProjectRecord>,
}

/// Durable list of projects backed by a single JSON file.
///
/// Every mutation is a whole-file read-modify-write under `write_lock`, so
/// concurrent add/remove calls never lose each other's updates.
pub struct ProjectStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ProjectStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn list(&self) -> Result<Vec<ProjectRecord>> {
        Ok(self.load().await?.projects)
    }

    pub async fn get(&self, id: &str) -> Result<ProjectRecord> {
        self.list()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))
    }

    /// Creates a project, pre-populating scripts from the manifest at `path`.
    /// A missing or unreadable manifest only leaves the script map empty.
    pub async fn add(
        &self,
        name: String,
        path: PathBuf,
        url: Option<String>,
        repo: Option<String>,
    ) -> Result<ProjectRecord> {
        let mut project = ProjectRecord::new(name, path);
        project.url = url.filter(|u| !u.trim().is_empty());
        project.repo = repo.filter(|r| !r.trim().is_empty());

        let manifest_path = project.path.clone();
        match tokio::task::spawn_blocking(move || ManifestParser::read(&manifest_path)).await {
            Ok(Ok(manifest)) => project.scripts = manifest.scripts,
            Ok(Err(e)) => log::warn!(
                "[ProjectStore] {}: {}, project added without scripts",
                project.path.display(),
                e
            ),
            Err(e) => log::warn!("[ProjectStore] manifest task failed: {}", e),
        }

        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;
        file.projects.push(project.clone());
        self.save(&file).await?;

        log::info!("[ProjectStore] added project {} ({})", project.name, project.id);
        Ok(project)
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;

        let before = file.projects.len();
        file.projects.retain(|p| p.id != id);
        if file.projects.len() == before {
            return Err(SupervisorError::NotFound(id.to_string()));
        }

        self.save(&file).await?;
        log::info!("[ProjectStore] removed project {}", id);
        Ok(())
    }

    async fn load(&self) -> Result<ProjectFile> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ProjectFile::default())
            }
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(ProjectFile::default());
        }

        serde_json::from_str(&content).map_err(|e| {
            SupervisorError::Store(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }

    // Write to a sibling temp file and rename so readers never see a torn file.
    async fn save(&self, file: &ProjectFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(file)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

/// Checks whether `path` can back a project and suggests a display name.
pub fn validate_path(path: &Path) -> PathValidation {
    if !path.is_dir() {
        return PathValidation {
            valid: false,
            name: None,
            warning: Some(format!("{} is not a directory", path.display())),
        };
    }

    let dir_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string());

    match ManifestParser::read(path) {
        Ok(manifest) => {
            let warning = manifest
                .scripts
                .is_empty()
                .then(|| "manifest defines no scripts".to_string());
            PathValidation {
                valid: true,
                name: manifest.name.or(dir_name),
                warning,
            }
        }
        Err(ParseError::MissingManifest) => PathValidation {
            valid: true,
            name: dir_name,
            warning: Some("no package.json found; project will have no scripts".to_string()),
        },
        Err(e) => PathValidation {
            valid: true,
            name: dir_name,
            warning: Some(e.to_string()),
        },
    }
}
