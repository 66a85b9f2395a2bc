use std::collections::{HashMap, VecDeque};
use std::io;
use std::io::Write as _;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mio::net::TcpListener;
use mio::{Interest, Token};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::config::Config;
use crate::connection::Connection;
use crate::error::Result;
use crate::mux::Multiplexer;
use crate::pool::WorkerPool;
use crate::timer::TimerHeap;

const LISTENER_TOKEN: Token = Token(0);
const FIRST_CONNECTION_TOKEN: usize = 1;
const EVENTS_CAPACITY: usize = 1024;

/// Built once at startup and shared with every worker task via `Arc`
/// rather than through globals: the validated configuration plus the
/// live count of accepted-but-not-yet-closed connections.
struct ServerContext {
    config: Arc<Config>,
    active_connections: Arc<AtomicUsize>,
}

/// Outcome of a worker task, carried back to the reactor thread over
/// `completed` so only the reactor ever touches the multiplexer or the
/// connection table.
enum Completion {
    Reregister(Token, Connection, Interest),
    Close(Token, Connection),
}

/// The reactor: a single thread that owns the listening socket, the
/// multiplexer, the connection table, the timer heap and the worker pool.
/// Workers perform the actual socket I/O and parsing; this thread only
/// dispatches readiness events and reconciles what workers report back.
pub struct Server {
    listener: TcpListener,
    mux: Multiplexer,
    connections: HashMap<Token, Connection>,
    timers: TimerHeap,
    pool: WorkerPool,
    ctx: ServerContext,
    completed: Arc<Mutex<VecDeque<Completion>>>,
    expired_idle: Arc<Mutex<VecDeque<Token>>>,
    next_token: usize,
}

impl Server {
    pub fn bind(config: Config) -> Result<Self> {
        let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
        let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        socket.set_reuse_address(true)?;
        if config.graceful_linger {
            socket.set_linger(Some(Duration::from_secs(1)))?;
        }
        socket.bind(&SockAddr::from(addr))?;
        socket.listen(config.backlog as i32)?;

        let mut listener = TcpListener::from_std(socket.into());
        let mut mux = Multiplexer::new(EVENTS_CAPACITY)?;
        mux.add(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let pool = WorkerPool::new(config.worker_count);
        let ctx = ServerContext {
            config: Arc::new(config),
            active_connections: Arc::new(AtomicUsize::new(0)),
        };

        Ok(Self {
            listener,
            mux,
            connections: HashMap::new(),
            timers: TimerHeap::new(),
            pool,
            ctx,
            completed: Arc::new(Mutex::new(VecDeque::new())),
            expired_idle: Arc::new(Mutex::new(VecDeque::new())),
            next_token: FIRST_CONNECTION_TOKEN,
        })
    }

    /// Drives the reactor forever. Each iteration waits for the next
    /// timer deadline or readiness event, dispatches every ready event,
    /// then reconciles whatever workers finished in the meantime.
    pub fn run(&mut self) -> Result<()> {
        self.ctx.config.display_config();
        proxy_log::info!("reactor listening on 0.0.0.0:{}", self.ctx.config.port);
        loop {
            let delay_ms = self.timers.next_delay_ms();
            self.drain_expired_idle_connections();

            let ready = self.mux.wait(delay_ms)?;
            for i in 0..ready {
                let token = self.mux.event_token(i);
                if token == LISTENER_TOKEN {
                    self.accept_loop();
                    continue;
                }
                if self.mux.event_is_error(i) || self.mux.event_is_read_closed(i) {
                    self.close_connection(token);
                    continue;
                }
                if self.mux.event_is_readable(i) {
                    self.on_readable(token);
                }
                if self.mux.event_is_writable(i) {
                    self.on_writable(token);
                }
            }
            self.drain_completions();
        }
    }

    fn accept_loop(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.on_accept(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    proxy_log::errors!("accept failed: {}", e);
                    return;
                }
            }
            if !self.ctx.config.trigger_mode.listener_edge() {
                return;
            }
        }
    }

    fn on_accept(&mut self, mut stream: mio::net::TcpStream, peer: SocketAddr) {
        if self.ctx.active_connections.load(Ordering::SeqCst) >= self.ctx.config.max_connections {
            let _ = stream.write_all(b"HTTP/1.1 503 Service Unavailable\r\nConnection: close\r\n\r\n");
            return;
        }

        let token = self.next_token();
        let edge = self.ctx.config.trigger_mode.connection_edge();
        let mut conn = Connection::init(stream, peer, token, edge);
        if self.mux.add(&mut conn.stream, token, Interest::READABLE).is_err() {
            return;
        }
        self.ctx.active_connections.fetch_add(1, Ordering::SeqCst);
        self.arm_idle_timer(token);
        self.connections.insert(token, conn);
    }

    fn next_token(&mut self) -> Token {
        let t = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);
        if self.next_token == 0 {
            self.next_token = FIRST_CONNECTION_TOKEN;
        }
        Token(t)
    }

    fn on_readable(&mut self, token: Token) {
        let Some(conn) = self.connections.remove(&token) else { return };
        self.arm_idle_timer(token);
        let config = self.ctx.config.clone();
        let completed = self.completed.clone();
        self.pool.submit(Box::new(move || {
            let mut conn = conn;
            let outcome = (|| -> io::Result<Interest> {
                conn.read_in()?;
                if conn.process(&config) {
                    Ok(Interest::WRITABLE)
                } else {
                    Ok(Interest::READABLE)
                }
            })();
            let completion = match outcome {
                Ok(interest) => Completion::Reregister(token, conn, interest),
                Err(_) => Completion::Close(token, conn),
            };
            completed.lock().expect("completion queue poisoned").push_back(completion);
        }));
    }

    fn on_writable(&mut self, token: Token) {
        let Some(conn) = self.connections.remove(&token) else { return };
        self.arm_idle_timer(token);
        let completed = self.completed.clone();
        self.pool.submit(Box::new(move || {
            let mut conn = conn;
            let completion = match conn.write_out() {
                Ok(_) if conn.pending_write_bytes() == 0 => {
                    if conn.response_keep_alive() {
                        conn.reset_for_next_request();
                        Completion::Reregister(token, conn, Interest::READABLE)
                    } else {
                        Completion::Close(token, conn)
                    }
                }
                Ok(_) => Completion::Reregister(token, conn, Interest::WRITABLE),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    Completion::Reregister(token, conn, Interest::WRITABLE)
                }
                Err(_) => Completion::Close(token, conn),
            };
            completed.lock().expect("completion queue poisoned").push_back(completion);
        }));
    }

    fn drain_completions(&mut self) {
        let items: Vec<Completion> = {
            let mut queue = self.completed.lock().expect("completion queue poisoned");
            queue.drain(..).collect()
        };
        for item in items {
            match item {
                Completion::Reregister(token, mut conn, interest) => {
                    if self.mux.modify(&mut conn.stream, token, interest).is_err() {
                        self.drop_connection(token, conn);
                        continue;
                    }
                    self.connections.insert(token, conn);
                }
                Completion::Close(token, conn) => self.drop_connection(token, conn),
            }
        }
    }

    /// Called on an idle timeout. The entry is already popped off the
    /// timer heap by the time this runs; if the connection is currently
    /// out with a worker it simply isn't in the table yet and this is a
    /// no-op - the next read or write event re-arms a fresh timer.
    fn drain_expired_idle_connections(&mut self) {
        let expired: Vec<Token> = {
            let mut queue = self.expired_idle.lock().expect("expired idle queue poisoned");
            queue.drain(..).collect()
        };
        for token in expired {
            self.close_connection(token);
        }
    }

    fn arm_idle_timer(&mut self, token: Token) {
        if self.ctx.config.idle_timeout_ms == 0 {
            return;
        }
        let expired = self.expired_idle.clone();
        let timeout = Duration::from_millis(self.ctx.config.idle_timeout_ms);
        self.timers.add(
            token.0 as u64,
            timeout,
            Box::new(move || {
                expired.lock().expect("expired idle queue poisoned").push_back(token);
            }),
        );
    }

    fn close_connection(&mut self, token: Token) {
        if let Some(conn) = self.connections.remove(&token) {
            self.drop_connection(token, conn);
        }
    }

    fn drop_connection(&mut self, token: Token, mut conn: Connection) {
        let _ = self.mux.remove(&mut conn.stream);
        conn.close();
        self.timers.cancel(token.0 as u64);
        self.ctx.active_connections.fetch_sub(1, Ordering::SeqCst);
    }
}
