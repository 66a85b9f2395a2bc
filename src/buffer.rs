use std::io::{self, IoSlice, IoSliceMut, Read, Write};

/// A staging region big enough to soak up a single large `read_vectored`
/// call without forcing the buffer itself to pre-grow to that size.
const STAGING_SIZE: usize = 65535;

/// A growable byte arena with two monotonically increasing cursors.
///
/// `read_pos <= write_pos <= capacity`. The readable region is
/// `[read_pos, write_pos)`; the writable region is `[write_pos, capacity)`.
/// Cursors never move backwards except through `reset` or an internal
/// compaction that shifts the readable region down to offset zero.
#[derive(Debug, Default)]
pub struct ByteBuffer {
    data: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self { data: Vec::new(), read_pos: 0, write_pos: 0 }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { data: vec![0u8; cap], read_pos: 0, write_pos: 0 }
    }

    pub fn readable(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub fn writable(&self) -> usize {
        self.data.len() - self.write_pos
    }

    pub fn peek(&self) -> &[u8] {
        &self.data[self.read_pos..self.write_pos]
    }

    pub fn advance_read(&mut self, n: usize) {
        self.read_pos = (self.read_pos + n).min(self.write_pos);
        if self.read_pos == self.write_pos {
            self.read_pos = 0;
            self.write_pos = 0;
        }
    }

    pub fn advance_write(&mut self, n: usize) {
        self.write_pos = (self.write_pos + n).min(self.data.len());
    }

    pub fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Makes sure at least `len` writable bytes are available, compacting
    /// in place when the already-consumed prefix gives back enough room,
    /// and growing the backing array otherwise.
    pub fn ensure_writable(&mut self, len: usize) {
        if self.writable() >= len {
            return;
        }
        if self.writable() + self.read_pos >= len {
            self.compact();
            return;
        }
        let new_len = self.write_pos + len + 1;
        self.data.resize(new_len, 0);
    }

    fn compact(&mut self) {
        if self.read_pos == 0 {
            return;
        }
        self.data.copy_within(self.read_pos..self.write_pos, 0);
        self.write_pos -= self.read_pos;
        self.read_pos = 0;
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.ensure_writable(bytes.len());
        let start = self.write_pos;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.advance_write(bytes.len());
    }

    pub fn drain_to_string(&mut self) -> String {
        let s = String::from_utf8_lossy(self.peek()).into_owned();
        let n = self.readable();
        self.advance_read(n);
        s
    }

    /// Reads from `src` directly into the writable tail plus a stack
    /// staging region in a single `read_vectored` call. A short read that
    /// fits the tail just advances `write_pos`; a read that spills into the
    /// staging region is appended, which may trigger compaction or growth.
    pub fn read_from(&mut self, src: &mut impl Read) -> io::Result<usize> {
        self.ensure_writable(1);
        let mut staging = [0u8; STAGING_SIZE];
        let tail_start = self.write_pos;
        let tail_len = self.data.len() - tail_start;
        let n = {
            let mut slices = [
                IoSliceMut::new(&mut self.data[tail_start..]),
                IoSliceMut::new(&mut staging),
            ];
            src.read_vectored(&mut slices)?
        };
        if n <= tail_len {
            self.advance_write(n);
        } else {
            self.write_pos = self.data.len();
            let overflow = n - tail_len;
            self.append(&staging[..overflow]);
        }
        Ok(n)
    }

    /// Writes the readable region to `dst` via a single `write_vectored`
    /// call and advances `read_pos` by however much was actually written.
    pub fn write_to(&mut self, dst: &mut impl Write) -> io::Result<usize> {
        let n = dst.write_vectored(&[IoSlice::new(self.peek())])?;
        self.advance_read(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut buf = ByteBuffer::new();
        buf.append(b"hello world");
        assert_eq!(buf.readable(), 11);
        let s = buf.drain_to_string();
        assert_eq!(s, "hello world");
        assert_eq!(buf.readable(), 0);
    }

    #[test]
    fn monotonic_cursors_across_partial_advance() {
        let mut buf = ByteBuffer::new();
        buf.append(b"abcdef");
        buf.advance_read(2);
        assert_eq!(buf.peek(), b"cdef");
        buf.append(b"gh");
        assert_eq!(buf.peek(), b"cdefgh");
    }

    #[test]
    fn ensure_writable_compacts_before_growing() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.append(b"abcdefgh");
        buf.advance_read(8);
        buf.append(b"xyz");
        assert_eq!(buf.peek(), b"xyz");
    }

    struct Chunked<'a> {
        chunks: std::vec::IntoIter<&'a [u8]>,
    }

    impl<'a> Read for Chunked<'a> {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            match self.chunks.next() {
                Some(chunk) => {
                    out[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    #[test]
    fn read_from_advances_write_pos() {
        let mut buf = ByteBuffer::new();
        let mut src = Chunked { chunks: vec![b"hi".as_slice()].into_iter() };
        let n = buf.read_from(&mut src).unwrap();
        assert_eq!(n, 2);
        assert_eq!(buf.peek(), b"hi");
    }
}
