/// Resolves a file suffix to a MIME type via a small fixed table. Unknown
/// suffixes fall back to `text/plain`.
pub fn mime_type_for_path(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "wasm" => "application/wasm",
        _ => "text/plain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_extensions() {
        assert_eq!(mime_type_for_path("index.html"), "text/html");
        assert_eq!(mime_type_for_path("app.js"), "application/javascript");
        assert_eq!(mime_type_for_path("photo.JPG"), "image/jpeg");
    }

    #[test]
    fn falls_back_for_unknown_extensions() {
        assert_eq!(mime_type_for_path("data.bin"), "text/plain");
        assert_eq!(mime_type_for_path("noext"), "text/plain");
    }
}
