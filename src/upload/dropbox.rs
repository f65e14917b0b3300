//! Dropbox upload via the v2 HTTP API. Deprecated: kept for existing deployments,
//! new ones should use Cloudinary.

use serde::Deserialize;
use serde_json::json;
use std::path::Path;

use super::{checked_url, read_body, request_error, UploadBackend};
use crate::config::DropboxCredentials;
use crate::error::UploadError;

const NAME: &str = "dropbox";
const UPLOAD_URL: &str = "https://content.dropboxapi.com/2/files/upload";
const CREATE_LINK_URL: &str = "https://api.dropboxapi.com/2/sharing/create_shared_link_with_settings";
const LIST_LINKS_URL: &str = "https://api.dropboxapi.com/2/sharing/list_shared_links";

pub struct DropboxBackend {
    credentials: DropboxCredentials,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct SharedLinks {
    #[serde(default)]
    links: Vec<SharedLink>,
}

#[derive(Deserialize)]
struct SharedLink {
    url: String,
}

impl DropboxBackend {
    pub fn new(credentials: DropboxCredentials, agent: ureq::Agent) -> Self {
        log::warn!(
            "the dropbox upload backend is deprecated and may stop working; prefer CLOUD_SERVICE=cloudinary"
        );
        Self { credentials, agent }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.credentials.access_token)
    }

    fn rpc(&self, url: &str, args: serde_json::Value) -> Result<ureq::Response, ureq::Error> {
        self.agent
            .post(url)
            .set("Authorization", &self.bearer())
            .set("Content-Type", "application/json")
            .send_string(&args.to_string())
    }
}

impl UploadBackend for DropboxBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn upload(&self, local_path: &Path, remote_key: &str) -> Result<String, UploadError> {
        let contents = std::fs::read(local_path).map_err(|err| UploadError::Io {
            backend: NAME,
            reason: format!("read {}: {}", local_path.display(), err),
        })?;
        let path = dropbox_path(remote_key);

        self.agent
            .post(UPLOAD_URL)
            .set("Authorization", &self.bearer())
            .set("Content-Type", "application/octet-stream")
            .set("Dropbox-API-Arg", &header_safe_json(&upload_arg(&path)))
            .send_bytes(&contents)
            .map_err(|err| request_error(NAME, err))?;

        // 409 here means a link already exists, which the listing below returns.
        match self.rpc(CREATE_LINK_URL, json!({ "path": path })) {
            Ok(_) | Err(ureq::Error::Status(409, _)) => {}
            Err(err) => return Err(request_error(NAME, err)),
        }

        let response = self
            .rpc(LIST_LINKS_URL, json!({ "path": path, "direct_only": true }))
            .map_err(|err| request_error(NAME, err))?;
        latest_link(&read_body(NAME, response)?)
    }
}

/// Dropbox paths are absolute.
fn dropbox_path(remote_key: &str) -> String {
    format!("/{}", remote_key.trim_start_matches('/'))
}

/// Re-uploading a key replaces the stored file.
fn upload_arg(path: &str) -> serde_json::Value {
    json!({
        "path": path,
        "mode": "overwrite",
        "autorename": false,
        "mute": true,
    })
}

/// JSON for the `Dropbox-API-Arg` header, which must be pure ASCII.
fn header_safe_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    for c in value.to_string().chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

fn latest_link(body: &str) -> Result<String, UploadError> {
    let parsed: SharedLinks = serde_json::from_str(body).map_err(|err| UploadError::Transport {
        backend: NAME,
        reason: format!("unexpected response: {}", err),
    })?;
    let link = parsed
        .links
        .last()
        .ok_or(UploadError::MissingUrl { backend: NAME })?;
    checked_url(NAME, &link.url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::capture;

    #[test]
    fn paths_are_rooted() {
        assert_eq!(dropbox_path("webcam_captures/a.enc"), "/webcam_captures/a.enc");
        assert_eq!(dropbox_path("/webcam_captures/a.enc"), "/webcam_captures/a.enc");
    }

    #[test]
    fn header_json_escapes_non_ascii() {
        let arg = json!({ "path": "/caméra/a.enc" });
        let header = header_safe_json(&arg);
        assert!(header.is_ascii());
        assert!(header.contains("cam\\u00e9ra"));
        let back: serde_json::Value = serde_json::from_str(&header).unwrap();
        assert_eq!(back, arg);
    }

    #[test]
    fn upload_replaces_existing_file() {
        let header = header_safe_json(&upload_arg("/webcam_captures/intruder.log"));
        let arg: serde_json::Value = serde_json::from_str(&header).unwrap();
        assert_eq!(arg["path"], "/webcam_captures/intruder.log");
        assert_eq!(arg["mode"], "overwrite");
        assert_eq!(arg["autorename"], false);
    }

    #[test]
    fn deprecation_is_logged_once_per_backend() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.avi.enc");
        let (backend, records) = capture::records(|| {
            let backend = DropboxBackend::new(
                DropboxCredentials {
                    access_token: "token".to_string(),
                },
                ureq::agent(),
            );
            for _ in 0..3 {
                assert!(matches!(
                    backend.upload(&missing, "webcam_captures/gone.avi.enc"),
                    Err(UploadError::Io { .. })
                ));
            }
            backend
        });
        let warnings: Vec<_> = records
            .iter()
            .filter(|r| r.level == log::Level::Warn && r.message.contains("deprecated"))
            .collect();
        assert_eq!(warnings.len(), 1, "{:?}", records);
        assert_eq!(backend.name(), "dropbox");
    }

    #[test]
    fn most_recent_link_wins() {
        let body = r#"{"links":[
            {"url":"https://www.dropbox.com/s/old/a.enc?dl=0",".tag":"file"},
            {"url":"https://www.dropbox.com/s/new/a.enc?dl=0",".tag":"file"}
        ],"has_more":false}"#;
        assert_eq!(
            latest_link(body).unwrap(),
            "https://www.dropbox.com/s/new/a.enc?dl=0"
        );
    }

    #[test]
    fn no_links_is_an_error() {
        assert!(matches!(
            latest_link(r#"{"links":[],"has_more":false}"#),
            Err(UploadError::MissingUrl { .. })
        ));
    }
}
