use std::io;
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Token};

/// Thin wrapper over the kernel readiness interface (`mio::Poll`). One-shot
/// semantics are not a literal kernel flag here (mio 1.x carries no such
/// option) - they are achieved by convention at the call sites that use
/// this type: a connection is re-registered via `modify` only once its
/// worker task has actually finished with it.
pub struct Multiplexer {
    poll: Poll,
    events: Events,
}

impl Multiplexer {
    pub fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self { poll: Poll::new()?, events: Events::with_capacity(capacity) })
    }

    pub fn add<S: Source + ?Sized>(
        &mut self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().register(source, token, interest)
    }

    pub fn modify<S: Source + ?Sized>(
        &mut self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().reregister(source, token, interest)
    }

    pub fn remove<S: Source + ?Sized>(&mut self, source: &mut S) -> io::Result<()> {
        self.poll.registry().deregister(source)
    }

    /// `timeout_ms == None` blocks indefinitely; `Some(0)` polls without
    /// blocking; `Some(n)` blocks up to `n` milliseconds.
    pub fn wait(&mut self, timeout_ms: Option<u64>) -> io::Result<usize> {
        let timeout = timeout_ms.map(Duration::from_millis);
        self.poll.poll(&mut self.events, timeout)?;
        Ok(self.events.iter().count())
    }

    fn nth(&self, i: usize) -> &mio::event::Event {
        self.events.iter().nth(i).expect("event index in range")
    }

    pub fn event_token(&self, i: usize) -> Token {
        self.nth(i).token()
    }

    pub fn event_is_readable(&self, i: usize) -> bool {
        self.nth(i).is_readable()
    }

    pub fn event_is_writable(&self, i: usize) -> bool {
        self.nth(i).is_writable()
    }

    pub fn event_is_read_closed(&self, i: usize) -> bool {
        self.nth(i).is_read_closed()
    }

    pub fn event_is_write_closed(&self, i: usize) -> bool {
        self.nth(i).is_write_closed()
    }

    pub fn event_is_error(&self, i: usize) -> bool {
        self.nth(i).is_error()
    }
}
