//! Static asset serving for the client page.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const INDEX_FILE: &str = "index.html";

/// Serves files from a root directory, unmodified.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request path onto a file under the root.
    ///
    /// Returns `None` for paths that would escape the root.
    pub fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let relative = request_path.trim_start_matches('/');
        let relative = if relative.is_empty() || relative.ends_with('/') {
            format!("{relative}{INDEX_FILE}")
        } else {
            relative.to_string()
        };

        let relative = Path::new(&relative);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }

        Some(self.root.join(relative))
    }

    /// Read and serve the file for `request_path`, or `None` if there is none.
    pub async fn serve(&self, request_path: &str) -> Option<Response<Full<Bytes>>> {
        let mut path = self.resolve(request_path)?;

        let metadata = tokio::fs::metadata(&path).await.ok()?;
        if metadata.is_dir() {
            path.push(INDEX_FILE);
        }

        match tokio::fs::read(&path).await {
            Ok(contents) => {
                let mut response = Response::new(Full::new(Bytes::from(contents)));
                *response.status_mut() = StatusCode::OK;
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(content_type(&path)));
                Some(response)
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "static file not readable");
                None
            }
        }
    }
}

/// Content type by file extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("json") | Some("map") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}
