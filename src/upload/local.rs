use std::path::{Component, Path, PathBuf};

use super::UploadBackend;
use crate::error::UploadError;

const NAME: &str = "local";

/// Copies files into a directory tree. For offline installs and tests.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn destination(&self, remote_key: &str) -> Result<PathBuf, UploadError> {
        let key = Path::new(remote_key);
        let safe = key
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if remote_key.is_empty() || !safe {
            return Err(UploadError::Io {
                backend: NAME,
                reason: format!("refusing remote key '{}'", remote_key),
            });
        }
        Ok(self.root.join(key))
    }
}

impl UploadBackend for LocalBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn upload(&self, local_path: &Path, remote_key: &str) -> Result<String, UploadError> {
        let dest = self.destination(remote_key)?;
        let io = |what: &str, err: std::io::Error| UploadError::Io {
            backend: NAME,
            reason: format!("{}: {}", what, err),
        };
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| io(&format!("create {}", parent.display()), err))?;
        }
        std::fs::copy(local_path, &dest)
            .map_err(|err| io(&format!("copy {}", local_path.display()), err))?;
        let absolute = dest
            .canonicalize()
            .map_err(|err| io(&format!("resolve {}", dest.display()), err))?;
        url::Url::from_file_path(&absolute)
            .map(String::from)
            .map_err(|()| UploadError::MissingUrl { backend: NAME })
    }
}
