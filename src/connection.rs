use std::io::{self, IoSlice, Read, Write};
use std::net::SocketAddr;

use mio::net::TcpStream;
use mio::Token;

use crate::buffer::ByteBuffer;
use crate::config::Config;
use crate::http::{HttpRequest, HttpResponse, ParseError};

/// Bounds a single edge-triggered write loop so one connection can't
/// monopolize a worker when the peer is a slow reader.
const EDGE_WRITE_BUDGET: usize = 10 * 1024;

/// Owns a non-blocking socket, its read/write buffers, the in-flight
/// request and response, and the cursor into the response body. Mutated
/// only while the one-shot re-arming convention guarantees at most
/// one worker task is acting on it at a time.
pub struct Connection {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub token: Token,
    read_buffer: ByteBuffer,
    write_buffer: ByteBuffer,
    request: HttpRequest,
    response: Option<HttpResponse>,
    body_sent: usize,
    pub closed: bool,
    edge_triggered: bool,
}

impl Connection {
    pub fn init(stream: TcpStream, peer: SocketAddr, token: Token, edge_triggered: bool) -> Self {
        Self {
            stream,
            peer,
            token,
            read_buffer: ByteBuffer::new(),
            write_buffer: ByteBuffer::new(),
            request: HttpRequest::new(),
            response: None,
            body_sent: 0,
            closed: false,
            edge_triggered,
        }
    }

    /// Drains the socket into the read buffer. In edge-triggered mode
    /// loops until a non-positive return or `WouldBlock`; in level mode
    /// performs a single call. The returned count lets the caller
    /// distinguish EOF (`0`) from a partial read.
    pub fn read_in(&mut self) -> io::Result<usize> {
        let mut total = 0usize;
        loop {
            match self.read_buffer.read_from(&mut self.stream) {
                Ok(0) => return Ok(total),
                Ok(n) => {
                    total += n;
                    if !self.edge_triggered {
                        return Ok(total);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(e) => return Err(e),
            }
        }
    }

    /// Runs the parser over the read buffer and, on completion, builds the
    /// response and queues its header block. Returns `true` once a
    /// response is ready to write, `false` on a short read that produced
    /// no progress.
    pub fn process(&mut self, cfg: &Config) -> bool {
        if self.read_buffer.readable() == 0 {
            return false;
        }
        match self.request.advance(&mut self.read_buffer) {
            Ok(()) => {
                let keep_alive = self.request.is_keep_alive();
                let response = HttpResponse::for_file(
                    &cfg.document_root,
                    &self.request.path,
                    keep_alive,
                    cfg.keepalive_timeout_secs,
                    cfg.keepalive_max_requests,
                    &cfg.error_pages,
                );
                self.queue_response(response);
                true
            }
            Err(ParseError::Incomplete) => false,
            Err(_) => {
                let response = HttpResponse::error(
                    400,
                    false,
                    cfg.keepalive_timeout_secs,
                    cfg.keepalive_max_requests,
                    &cfg.error_pages,
                );
                self.queue_response(response);
                true
            }
        }
    }

    fn queue_response(&mut self, response: HttpResponse) {
        self.write_buffer.reset();
        self.write_buffer.append(&response.header_bytes());
        self.body_sent = 0;
        self.response = Some(response);
    }

    /// Issues a scatter write of the header slot and the response body
    /// slot. When the header region drains, its iov length and the write
    /// buffer's read cursor are cleared together. Loops until both slots
    /// are empty, or in edge mode once the cumulative write exceeds the
    /// per-task budget.
    pub fn write_out(&mut self) -> io::Result<usize> {
        let mut total = 0usize;
        loop {
            if self.pending_write_bytes() == 0 {
                return Ok(total);
            }
            let n = {
                let header = self.write_buffer.peek();
                let body_remaining: &[u8] = match &self.response {
                    Some(r) => &r.body_bytes()[self.body_sent..],
                    None => &[],
                };
                let slices = [IoSlice::new(header), IoSlice::new(body_remaining)];
                match self.stream.write_vectored(&slices) {
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                    Err(e) => return Err(e),
                }
            };
            if n == 0 {
                return Ok(total);
            }
            total += n;
            let header_len = self.write_buffer.readable();
            if n <= header_len {
                self.write_buffer.advance_read(n);
            } else {
                self.write_buffer.advance_read(header_len);
                self.body_sent += n - header_len;
            }
            if !self.edge_triggered || total >= EDGE_WRITE_BUDGET {
                return Ok(total);
            }
        }
    }

    pub fn pending_write_bytes(&self) -> usize {
        let header = self.write_buffer.readable();
        let body = match &self.response {
            Some(r) => r.body_bytes().len().saturating_sub(self.body_sent),
            None => 0,
        };
        header + body
    }

    pub fn response_keep_alive(&self) -> bool {
        self.response.as_ref().map(|r| r.is_keep_alive()).unwrap_or(false)
    }

    pub fn form(&self) -> &std::collections::HashMap<String, String> {
        &self.request.form
    }

    /// Resets request/response state so the next pipelined request on a
    /// keep-alive connection starts clean, while preserving any bytes
    /// already buffered past the request that was just completed.
    pub fn reset_for_next_request(&mut self) {
        self.request = HttpRequest::new();
        self.response = None;
        self.body_sent = 0;
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write as _;
    use std::net::{TcpListener, TcpStream as StdTcpStream};

    fn connected_pair() -> (TcpStream, StdTcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = StdTcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        (TcpStream::from_std(server), client)
    }

    #[test]
    fn process_returns_false_on_empty_read_buffer() {
        let (server, _client) = connected_pair();
        let peer = "127.0.0.1:1".parse().unwrap();
        let mut conn = Connection::init(server, peer, Token(0), false);
        let cfg_src = "document_root: ./www\n";
        let cfg = Config::from_str(cfg_src).unwrap();
        assert!(!conn.process(&cfg));
    }

    #[test]
    fn serves_file_end_to_end() {
        let dir = std::env::temp_dir().join(format!("muxhttpd-conn-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.html"), b"HELLO").unwrap();

        let (server, mut client) = connected_pair();
        let peer = "127.0.0.1:1".parse().unwrap();
        let mut conn = Connection::init(server, peer, Token(0), false);
        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        conn.read_in().unwrap();
        let cfg_src = format!("document_root: {}\n", dir.to_str().unwrap());
        let cfg = Config::from_str(&cfg_src).unwrap();
        assert!(conn.process(&cfg));
        assert_eq!(conn.pending_write_bytes() > 0, true);

        let mut total_written = 0;
        while conn.pending_write_bytes() > 0 {
            total_written += conn.write_out().unwrap();
        }
        assert!(total_written > 0);

        let mut buf = vec![0u8; 4096];
        client.set_read_timeout(Some(std::time::Duration::from_millis(200))).unwrap();
        let n = client.read(&mut buf).unwrap();
        let response = String::from_utf8_lossy(&buf[..n]);
        assert!(response.contains("200"));
        assert!(response.ends_with("HELLO"));
        let _ = HashMap::<u16, String>::new();
    }
}
