//! Project-scoped destination paths.
//!
//! The engine never joins user input onto the filesystem itself; it asks a
//! `ProjectPathResolver`, which must keep every result inside the project's
//! directory.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid project id '{0}'")]
    InvalidProject(String),
    #[error("path '{0}' escapes the project directory")]
    Traversal(String),
}

/// Maps `(project_id, relative_path)` to an absolute-or-rooted destination.
pub trait ProjectPathResolver: Send + Sync {
    fn resolve(&self, project_id: &str, relative_path: &str) -> Result<PathBuf, PathError>;
}

/// Default resolver: `<root>/<project_id>/<relative_path>`.
///
/// A leading `/` on the relative path is treated as the project root. `..`
/// anywhere, or a project id that is not a single normal component, is
/// rejected.
#[derive(Debug, Clone)]
pub struct ProjectRoot {
    root: PathBuf,
}

impl ProjectRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ProjectPathResolver for ProjectRoot {
    fn resolve(&self, project_id: &str, relative_path: &str) -> Result<PathBuf, PathError> {
        let mut project = Path::new(project_id).components();
        match (project.next(), project.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return Err(PathError::InvalidProject(project_id.to_string())),
        }

        let mut out = self.root.join(project_id);
        let relative = relative_path.trim_start_matches('/');
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(PathError::Traversal(relative_path.to_string()));
                }
            }
        }
        Ok(out)
    }
}
