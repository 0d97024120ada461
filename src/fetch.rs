//! Media fetching: resolves backend-relative paths to local files
//!
//! The API base is either a local directory (media already on disk) or an
//! `http(s)://` URL, in which case files are downloaded into a staging
//! directory that lives as long as the fetcher.

use crate::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Whether `path` is already an absolute HTTP(S) URL
pub fn is_url(path: &str) -> bool {
    let lower = path.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Join a backend-relative path onto the API base.
///
/// Absolute URLs pass through untouched; exactly one `/` separates base and path.
pub fn resolve_url(base: &str, path: &str) -> String {
    if is_url(path) {
        return path.trim().to_string();
    }
    let base = base.trim().trim_end_matches('/');
    let path = path.trim().trim_start_matches('/');
    format!("{}/{}", base, path)
}

/// File extension of a URL path, ignoring query and fragment
fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

enum Origin {
    Local(PathBuf),
    Http(String),
}

struct HttpState {
    client: reqwest::blocking::Client,
    staging: TempDir,
    downloads: usize,
}

/// Turns media record paths into readable local files
pub struct MediaFetcher {
    origin: Origin,
    http: Option<HttpState>,
}

impl MediaFetcher {
    pub fn new(api_base: &str) -> Self {
        let origin = if is_url(api_base) {
            Origin::Http(api_base.trim().to_string())
        } else {
            Origin::Local(PathBuf::from(api_base))
        };
        Self { origin, http: None }
    }

    /// Local path for `path`, downloading it first when the origin is remote
    pub fn fetch(&mut self, path: &str) -> Result<PathBuf> {
        if path.trim().is_empty() {
            return Err(Error::InvalidInput("empty media path".to_string()));
        }

        if is_url(path) {
            return self.download(path.trim());
        }

        match &self.origin {
            Origin::Http(base) => {
                let url = resolve_url(base, path);
                self.download(&url)
            }
            Origin::Local(root) => {
                let direct = Path::new(path);
                let candidate = if direct.is_absolute() && direct.exists() {
                    direct.to_path_buf()
                } else {
                    root.join(path.trim_start_matches('/'))
                };
                if candidate.is_file() {
                    Ok(candidate)
                } else {
                    Err(Error::Fetch(format!(
                        "media file not found: {}",
                        candidate.display()
                    )))
                }
            }
        }
    }

    fn http_state(&mut self) -> Result<&mut HttpState> {
        if self.http.is_none() {
            let client = reqwest::blocking::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .map_err(|e| Error::Fetch(format!("failed to build HTTP client: {}", e)))?;
            let staging = tempfile::Builder::new().prefix("tripreel-").tempdir()?;
            self.http = Some(HttpState {
                client,
                staging,
                downloads: 0,
            });
        }
        self.http
            .as_mut()
            .ok_or_else(|| Error::Fetch("HTTP state unavailable".to_string()))
    }

    fn download(&mut self, url: &str) -> Result<PathBuf> {
        let state = self.http_state()?;

        let mut response = state
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Fetch(format!("GET {} failed: {}", url, e)))?;

        state.downloads += 1;
        let name = match url_extension(url) {
            Some(ext) => format!("media-{:04}.{}", state.downloads, ext),
            None => format!("media-{:04}", state.downloads),
        };
        let target = state.staging.path().join(name);

        let mut file = std::fs::File::create(&target)?;
        let bytes = response
            .copy_to(&mut file)
            .map_err(|e| Error::Fetch(format!("reading {} failed: {}", url, e)))?;
        file.flush()?;

        tracing::debug!(url, bytes, path = %target.display(), "downloaded media");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url_joins_with_single_slash() {
        assert_eq!(
            resolve_url("https://api.example.com/", "/uploads/a.jpg"),
            "https://api.example.com/uploads/a.jpg"
        );
        assert_eq!(
            resolve_url("https://api.example.com", "uploads/a.jpg"),
            "https://api.example.com/uploads/a.jpg"
        );
    }

    #[test]
    fn test_absolute_url_passes_through() {
        assert_eq!(
            resolve_url("https://api.example.com", "HTTP://cdn.example.com/x.mp4"),
            "HTTP://cdn.example.com/x.mp4"
        );
    }

    #[test]
    fn test_url_extension() {
        assert_eq!(url_extension("https://a/b/photo.JPG?x=1"), Some("JPG"));
        assert_eq!(url_extension("https://a/b/clip.mp4#t=3"), Some("mp4"));
        assert_eq!(url_extension("https://a/b/download"), None);
    }

    #[test]
    fn test_local_fetch() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("uploads")).unwrap();
        std::fs::write(dir.path().join("uploads/a.jpg"), b"x").unwrap();

        let mut fetcher = MediaFetcher::new(dir.path().to_str().unwrap());
        let path = fetcher.fetch("/uploads/a.jpg").unwrap();
        assert_eq!(path, dir.path().join("uploads/a.jpg"));

        assert!(matches!(fetcher.fetch("uploads/missing.jpg"), Err(Error::Fetch(_))));
        assert!(matches!(fetcher.fetch("  "), Err(Error::InvalidInput(_))));
    }
}
