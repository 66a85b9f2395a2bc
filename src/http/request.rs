use std::collections::HashMap;
use std::fmt;

use crate::buffer::ByteBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    POST,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
        }
    }
}

impl std::str::FromStr for Method {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            _ => Err(ParseError::InvalidMethod),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParsingState {
    RequestLine,
    Headers,
    Body,
    Finish,
}

const CRLF_LEN: usize = 2;
const PATHS_NEEDING_HTML_SUFFIX: [&str; 4] = ["/index", "/welcome", "/video", "/picture"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Incomplete,
    MalformedRequestLine,
    InvalidMethod,
    InvalidUtf8,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Incomplete => write!(f, "incomplete request"),
            ParseError::MalformedRequestLine => write!(f, "malformed request line"),
            ParseError::InvalidMethod => write!(f, "invalid HTTP method"),
            ParseError::InvalidUtf8 => write!(f, "invalid UTF-8 in request"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Incremental HTTP/1.1 request parser. Consumes CRLF-delimited lines
/// straight out of a `ByteBuffer`; on incomplete input it leaves the
/// buffer's read cursor unadvanced past the last partial line and returns
/// `ParseError::Incomplete`, to be re-entered on the next read event.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub form: HashMap<String, String>,
    pub state: ParsingState,
    content_length: Option<usize>,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequest {
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            path: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            body: Vec::new(),
            form: HashMap::new(),
            state: ParsingState::RequestLine,
            content_length: None,
        }
    }

    pub fn is_keep_alive(&self) -> bool {
        self.version == "1.1"
            && self
                .headers
                .get("Connection")
                .map(|v| v.eq_ignore_ascii_case("keep-alive"))
                .unwrap_or(false)
    }

    pub fn is_complete(&self) -> bool {
        self.state == ParsingState::Finish
    }

    /// Drives the state machine as far as the buffered bytes allow.
    /// Returns `Ok(())` once `state == Finish`, or `Err(Incomplete)` when
    /// more data is needed.
    pub fn advance(&mut self, buffer: &mut ByteBuffer) -> Result<(), ParseError> {
        loop {
            match self.state {
                ParsingState::RequestLine => self.parse_request_line(buffer)?,
                ParsingState::Headers => self.parse_header_line(buffer)?,
                ParsingState::Body => self.parse_body(buffer)?,
                ParsingState::Finish => return Ok(()),
            }
        }
    }

    fn parse_request_line(&mut self, buffer: &mut ByteBuffer) -> Result<(), ParseError> {
        let data = buffer.peek();
        let Some(line_end) = find_crlf(data) else {
            return Err(ParseError::Incomplete);
        };
        let line = std::str::from_utf8(&data[..line_end]).map_err(|_| ParseError::InvalidUtf8)?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(ParseError::MalformedRequestLine);
        }
        let method: Method = parts[0].parse()?;
        let version = parts[2].strip_prefix("HTTP/").ok_or(ParseError::MalformedRequestLine)?;

        self.method = method;
        self.path = normalize_path(parts[1]);
        self.version = version.to_string();
        buffer.advance_read(line_end + CRLF_LEN);
        self.state = ParsingState::Headers;
        Ok(())
    }

    fn parse_header_line(&mut self, buffer: &mut ByteBuffer) -> Result<(), ParseError> {
        let data = buffer.peek();
        let Some(line_end) = find_crlf(data) else {
            return Err(ParseError::Incomplete);
        };
        if line_end == 0 {
            buffer.advance_read(CRLF_LEN);
            self.enter_body();
            return Ok(());
        }
        let line = std::str::from_utf8(&data[..line_end]).map_err(|_| ParseError::InvalidUtf8)?;
        match line.find(':') {
            Some(colon) => {
                let name = line[..colon].trim().to_string();
                let value = line[colon + 1..].trim_start_matches(' ').to_string();
                self.headers.insert(name, value);
                buffer.advance_read(line_end + CRLF_LEN);
                Ok(())
            }
            // A line that doesn't match the header grammar is structurally
            // the start of the body; it is left in the buffer for parse_body
            // to capture rather than consumed here.
            None => {
                self.enter_body();
                Ok(())
            }
        }
    }

    fn enter_body(&mut self) {
        self.content_length = self.headers.get("Content-Length").and_then(|v| v.parse().ok());
        self.state = ParsingState::Body;
    }

    /// Captures the request body. `Content-Length`, when present, bounds
    /// exactly how many bytes to wait for and take; when absent it is not a
    /// precondition for capturing a body at all - whatever is currently
    /// readable is taken as the body, matching the original's
    /// Content-Length-independent body capture.
    fn parse_body(&mut self, buffer: &mut ByteBuffer) -> Result<(), ParseError> {
        let len = match self.content_length {
            Some(len) => {
                if buffer.readable() < len {
                    return Err(ParseError::Incomplete);
                }
                len
            }
            None => buffer.readable(),
        };
        self.body = buffer.peek()[..len].to_vec();
        buffer.advance_read(len);

        if self.method == Method::POST
            && self
                .headers
                .get("Content-Type")
                .map(|v| v.starts_with("application/x-www-form-urlencoded"))
                .unwrap_or(false)
        {
            self.form = decode_form(&self.body);
        }
        self.state = ParsingState::Finish;
        Ok(())
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn normalize_path(path: &str) -> String {
    if path == "/" {
        return "/index.html".to_string();
    }
    if PATHS_NEEDING_HTML_SUFFIX.contains(&path) {
        return format!("{}.html", path);
    }
    path.to_string()
}

/// Decodes a `application/x-www-form-urlencoded` body into a key/value
/// map. `%XX` decodes as the single byte named by its two hex digits - not
/// the decimal digits of that byte, which is the historically buggy
/// rendition this corrects.
fn decode_form(body: &[u8]) -> HashMap<String, String> {
    let mut form = HashMap::new();
    let mut key: Vec<u8> = Vec::new();
    let mut value: Vec<u8> = Vec::new();
    let mut in_value = false;
    let mut i = 0;
    while i < body.len() {
        match body[i] {
            b'=' if !in_value => {
                in_value = true;
                i += 1;
            }
            b'&' => {
                commit_pair(&mut form, &key, &value);
                key.clear();
                value.clear();
                in_value = false;
                i += 1;
            }
            b'+' => {
                target(&mut key, &mut value, in_value).push(b' ');
                i += 1;
            }
            b'%' if i + 2 < body.len() => {
                let hex = std::str::from_utf8(&body[i + 1..i + 3]).ok();
                if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    target(&mut key, &mut value, in_value).push(byte);
                    i += 3;
                } else {
                    target(&mut key, &mut value, in_value).push(body[i]);
                    i += 1;
                }
            }
            b => {
                target(&mut key, &mut value, in_value).push(b);
                i += 1;
            }
        }
    }
    if !key.is_empty() || in_value {
        commit_pair(&mut form, &key, &value);
    }
    form
}

fn target<'a>(key: &'a mut Vec<u8>, value: &'a mut Vec<u8>, in_value: bool) -> &'a mut Vec<u8> {
    if in_value {
        value
    } else {
        key
    }
}

fn commit_pair(form: &mut HashMap<String, String>, key: &[u8], value: &[u8]) {
    let k = String::from_utf8_lossy(key).into_owned();
    let v = String::from_utf8_lossy(value).into_owned();
    form.insert(k, v);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(chunks: &[&[u8]]) -> HttpRequest {
        let mut buffer = ByteBuffer::new();
        let mut request = HttpRequest::new();
        for chunk in chunks {
            buffer.append(chunk);
            match request.advance(&mut buffer) {
                Ok(()) => break,
                Err(ParseError::Incomplete) => continue,
                Err(e) => panic!("parse error: {}", e),
            }
        }
        request
    }

    #[test]
    fn parses_simple_get() {
        let req = feed(&[b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"]);
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.path, "/index.html");
        assert_eq!(req.version, "1.1");
        assert!(req.is_complete());
    }

    #[test]
    fn resumes_across_arbitrary_chunk_boundaries() {
        let whole = b"GET /other HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n";
        for split in 1..whole.len() {
            let req = feed(&[&whole[..split], &whole[split..]]);
            assert_eq!(req.path, "/other");
            assert!(req.is_keep_alive());
        }
    }

    #[test]
    fn path_normalization() {
        assert_eq!(normalize_path("/"), "/index.html");
        assert_eq!(normalize_path("/index"), "/index.html");
        assert_eq!(normalize_path("/other"), "/other");
    }

    #[test]
    fn keep_alive_requires_1_1_and_header() {
        let req = feed(&[b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n"]);
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn decodes_form_body() {
        let req = feed(&[
            b"POST / HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 24\r\n\r\nname=alice&city=new+york",
        ]);
        assert_eq!(req.form.get("name").map(String::as_str), Some("alice"));
        assert_eq!(req.form.get("city").map(String::as_str), Some("new york"));
    }

    #[test]
    fn decodes_form_body_without_content_length() {
        let req = feed(&[
            b"POST / HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\n\r\nname=alice&city=new+york",
        ]);
        assert_eq!(req.form.get("name").map(String::as_str), Some("alice"));
        assert_eq!(req.form.get("city").map(String::as_str), Some("new york"));
    }

    #[test]
    fn header_line_without_colon_falls_through_to_body() {
        let req = feed(&[b"GET / HTTP/1.1\r\nHost: x\r\nnot-a-header-line\r\n"]);
        assert!(req.is_complete());
        assert_eq!(req.body, b"not-a-header-line\r\n");
    }

    #[test]
    fn header_names_are_stored_with_original_case() {
        let req = feed(&[b"GET / HTTP/1.1\r\nHOST: x\r\n\r\n"]);
        assert!(req.headers.contains_key("HOST"));
        assert!(!req.headers.contains_key("Host"));
    }

    #[test]
    fn decodes_percent_escapes_as_single_byte_not_digits() {
        let form = decode_form(b"k=a%26b");
        assert_eq!(form.get("k").map(String::as_str), Some("a&b"));
    }

    #[test]
    fn rejects_malformed_request_line() {
        let mut buffer = ByteBuffer::new();
        buffer.append(b"HELLO WORLD\r\n\r\n");
        let mut request = HttpRequest::new();
        let err = request.advance(&mut buffer).unwrap_err();
        assert_eq!(err, ParseError::MalformedRequestLine);
    }
}
