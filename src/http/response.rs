use std::collections::HashMap;
use std::fs::File;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use memmap2::Mmap;

use crate::mime::mime_type_for_path;

fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Error",
    }
}

enum Body {
    Empty,
    Inline(Vec<u8>),
    Mapped(Mmap),
}

impl Body {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Empty => &[],
            Body::Inline(v) => v,
            Body::Mapped(m) => m,
        }
    }
}

/// Built from (document-root, path, keep-alive, status code): a status
/// line, an ordered header block, and a content region that is either an
/// inline byte vector (error bodies) or a read-only shared memory map of a
/// static file, written as the second scatter slot by the connection.
pub struct HttpResponse {
    pub status_code: u16,
    headers: Vec<(String, String)>,
    body: Body,
}

impl HttpResponse {
    /// Resolves `path` under `document_root` and builds the response that
    /// serves it, substituting a configured or inline error body for
    /// non-2xx outcomes.
    pub fn for_file(
        document_root: &str,
        path: &str,
        keep_alive: bool,
        keepalive_timeout_secs: u64,
        keepalive_max_requests: u32,
        error_pages: &HashMap<u16, String>,
    ) -> Self {
        match resolve_file(document_root, path) {
            Ok((file, mime)) => {
                let mmap = unsafe { Mmap::map(&file) }.ok();
                match mmap {
                    Some(mmap) => {
                        let len = mmap.len();
                        let mut res = Self {
                            status_code: 200,
                            headers: Vec::new(),
                            body: Body::Mapped(mmap),
                        };
                        res.push_common_headers(keep_alive, keepalive_timeout_secs, keepalive_max_requests);
                        res.headers.push(("Content-Type".to_string(), mime.to_string()));
                        res.headers.push(("Content-Length".to_string(), len.to_string()));
                        res
                    }
                    None => Self::error(500, keep_alive, keepalive_timeout_secs, keepalive_max_requests, error_pages),
                }
            }
            Err(code) => Self::error(code, keep_alive, keepalive_timeout_secs, keepalive_max_requests, error_pages),
        }
    }

    pub fn error(
        code: u16,
        keep_alive: bool,
        keepalive_timeout_secs: u64,
        keepalive_max_requests: u32,
        error_pages: &HashMap<u16, String>,
    ) -> Self {
        if let Some(page) = error_pages.get(&code) {
            if let Ok(content) = std::fs::read(page) {
                let mut res = Self {
                    status_code: code,
                    headers: Vec::new(),
                    body: Body::Inline(content),
                };
                res.push_common_headers(keep_alive, keepalive_timeout_secs, keepalive_max_requests);
                res.headers.push(("Content-Type".to_string(), "text/html".to_string()));
                res.headers
                    .push(("Content-Length".to_string(), res.body.as_bytes().len().to_string()));
                return res;
            }
        }
        let body = format!("<html><body><h1>{} {}</h1></body></html>", code, status_text(code));
        let mut res =
            Self { status_code: code, headers: Vec::new(), body: Body::Inline(body.into_bytes()) };
        res.push_common_headers(keep_alive, keepalive_timeout_secs, keepalive_max_requests);
        res.headers.push(("Content-Type".to_string(), "text/html".to_string()));
        res.headers.push(("Content-Length".to_string(), res.body.as_bytes().len().to_string()));
        res
    }

    fn push_common_headers(&mut self, keep_alive: bool, timeout_secs: u64, max_requests: u32) {
        if keep_alive {
            self.headers.push(("Connection".to_string(), "keep-alive".to_string()));
            self.headers.push((
                "Keep-Alive".to_string(),
                format!("timeout={}, max={}", timeout_secs, max_requests),
            ));
        } else {
            self.headers.push(("Connection".to_string(), "close".to_string()));
        }
    }

    pub fn is_keep_alive(&self) -> bool {
        self.headers.iter().any(|(k, v)| k == "Connection" && v == "keep-alive")
    }

    /// Status line plus ordered header block plus terminating CRLF.
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status_code, status_text(self.status_code))
            .into_bytes();
        for (k, v) in &self.headers {
            out.extend_from_slice(format!("{}: {}\r\n", k, v).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_bytes()
    }
}

fn resolve_file(document_root: &str, path: &str) -> Result<(File, &'static str), u16> {
    let abs = Path::new(document_root).join(path.trim_start_matches('/'));
    let metadata = std::fs::metadata(&abs).map_err(|_| 404u16)?;
    if !metadata.is_file() {
        return Err(404);
    }
    if metadata.permissions().mode() & 0o004 == 0 {
        return Err(403);
    }
    let file = File::open(&abs).map_err(|_| 500u16)?;
    Ok((file, mime_type_for_path(path)))
}
