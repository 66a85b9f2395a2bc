use std::collections::HashMap;
use std::time::{Duration, Instant};

type Callback = Box<dyn FnMut() + Send>;

struct Entry {
    expiry: Instant,
    id: u64,
    callback: Callback,
}

/// Min-heap of (expiry, id, callback) triples with O(log n) add/update/
/// cancel, backed by an array plus a side map from id to array position
/// that is kept in sync under every swap.
#[derive(Default)]
pub struct TimerHeap {
    heap: Vec<Entry>,
    index: HashMap<u64, usize>,
}

impl TimerHeap {
    pub fn new() -> Self {
        Self { heap: Vec::new(), index: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Adds a fresh deadline for `id`, or reschedules it in place if `id`
    /// is already tracked.
    pub fn add(&mut self, id: u64, timeout: Duration, callback: Callback) {
        let expiry = Instant::now() + timeout;
        if let Some(&pos) = self.index.get(&id) {
            self.heap[pos].expiry = expiry;
            self.heap[pos].callback = callback;
            self.sift_down(pos);
            self.sift_up(pos);
            return;
        }
        self.heap.push(Entry { expiry, id, callback });
        let pos = self.heap.len() - 1;
        self.index.insert(id, pos);
        self.sift_up(pos);
    }

    /// Rewrites the expiry of an already-tracked id, extending its
    /// deadline. A no-op if `id` is not present.
    pub fn update(&mut self, id: u64, timeout: Duration) {
        if let Some(&pos) = self.index.get(&id) {
            self.heap[pos].expiry = Instant::now() + timeout;
            self.sift_down(pos);
        }
    }

    /// Removes `id` from the heap. A no-op if it is not present.
    pub fn cancel(&mut self, id: u64) {
        let Some(pos) = self.index.remove(&id) else {
            return;
        };
        let last = self.heap.len() - 1;
        if pos != last {
            self.heap.swap(pos, last);
            self.index.insert(self.heap[pos].id, pos);
        }
        self.heap.pop();
        if pos < self.heap.len() {
            self.sift_down(pos);
            self.sift_up(pos);
        }
    }

    /// Invokes and pops every entry whose expiry has already passed. Each
    /// entry is removed from both the array and the id index before its
    /// callback runs, so a callback that re-enters the heap sees valid
    /// structure.
    pub fn tick(&mut self) {
        let now = Instant::now();
        while let Some(entry) = self.heap.first() {
            if entry.expiry > now {
                break;
            }
            let last = self.heap.len() - 1;
            self.heap.swap(0, last);
            let mut expired = self.heap.pop().expect("heap non-empty");
            self.index.remove(&expired.id);
            if !self.heap.is_empty() {
                self.index.insert(self.heap[0].id, 0);
                self.sift_down(0);
            }
            (expired.callback)();
        }
    }

    /// Runs `tick` first, then returns the milliseconds until the new
    /// root's expiry (clamped to zero), or `None` if the heap is empty.
    pub fn next_delay_ms(&mut self) -> Option<u64> {
        self.tick();
        self.heap.first().map(|e| {
            let now = Instant::now();
            if e.expiry <= now {
                0
            } else {
                (e.expiry - now).as_millis() as u64
            }
        })
    }

    fn parent(i: usize) -> Option<usize> {
        if i == 0 {
            None
        } else {
            Some((i - 1) / 2)
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while let Some(p) = Self::parent(i) {
            if self.heap[i].expiry < self.heap[p].expiry {
                self.heap.swap(i, p);
                self.index.insert(self.heap[i].id, i);
                self.index.insert(self.heap[p].id, p);
                i = p;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < len && self.heap[left].expiry < self.heap[smallest].expiry {
                smallest = left;
            }
            if right < len && self.heap[right].expiry < self.heap[smallest].expiry {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.heap.swap(i, smallest);
            self.index.insert(self.heap[i].id, i);
            self.index.insert(self.heap[smallest].id, smallest);
            i = smallest;
        }
    }

    #[cfg(test)]
    fn root_id(&self) -> Option<u64> {
        self.heap.first().map(|e| e.id)
    }

    #[cfg(test)]
    fn check_index_consistency(&self) {
        for (&id, &pos) in &self.index {
            assert_eq!(self.heap[pos].id, id);
        }
        assert_eq!(self.heap.len(), self.index.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn root_is_minimum_after_adds() {
        let mut heap = TimerHeap::new();
        heap.add(1, Duration::from_millis(50), Box::new(|| {}));
        heap.add(2, Duration::from_millis(10), Box::new(|| {}));
        heap.add(3, Duration::from_millis(30), Box::new(|| {}));
        heap.check_index_consistency();
        assert_eq!(heap.root_id(), Some(2));
    }

    #[test]
    fn cancel_absent_id_is_noop() {
        let mut heap = TimerHeap::new();
        heap.add(1, Duration::from_millis(10), Box::new(|| {}));
        heap.cancel(404);
        heap.check_index_consistency();
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn cancel_root_promotes_next_earliest() {
        let mut heap = TimerHeap::new();
        heap.add(1, Duration::from_millis(50), Box::new(|| {}));
        heap.add(2, Duration::from_millis(10), Box::new(|| {}));
        heap.add(3, Duration::from_millis(30), Box::new(|| {}));
        heap.cancel(2);
        heap.check_index_consistency();
        assert_eq!(heap.root_id(), Some(3));
    }

    #[test]
    fn update_extends_deadline_and_reorders() {
        let mut heap = TimerHeap::new();
        heap.add(1, Duration::from_millis(10), Box::new(|| {}));
        heap.add(2, Duration::from_millis(50), Box::new(|| {}));
        heap.update(1, Duration::from_millis(100));
        heap.check_index_consistency();
        assert_eq!(heap.root_id(), Some(2));
    }

    #[test]
    fn tick_fires_expired_callbacks_and_removes_them() {
        let fired = Arc::new(AtomicU32::new(0));
        let mut heap = TimerHeap::new();
        let f = fired.clone();
        heap.add(1, Duration::from_millis(0), Box::new(move || {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        heap.add(2, Duration::from_secs(60), Box::new(|| {}));
        std::thread::sleep(Duration::from_millis(5));
        heap.tick();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(heap.len(), 1);
        heap.check_index_consistency();
    }

    #[test]
    fn next_delay_none_when_empty() {
        let mut heap = TimerHeap::new();
        assert_eq!(heap.next_delay_ms(), None);
    }
}
