use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct State {
    queue: VecDeque<Task>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    condvar: Condvar,
}

/// A fixed-size pool of worker threads consuming a FIFO task queue. The
/// reactor thread is the sole producer; `submit` enqueues and wakes one
/// worker. Shutdown sets a flag, wakes every worker, and the pool's join
/// handles are awaited so the process never leaves orphaned threads.
///
/// The shutdown flag lives inside the same mutex the condvar is paired
/// with, so a worker's "is there work, or are we shutting down" check and
/// its wait are atomic with respect to `notify_all` - a wakeup can never
/// land between the check and the wait and be lost.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State { queue: VecDeque::new(), shutdown: false }),
            condvar: Condvar::new(),
        });

        let handles = (0..worker_count.max(1))
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || worker_loop(shared))
            })
            .collect();

        Self { shared, handles }
    }

    pub fn submit(&self, task: Task) {
        let mut state = self.shared.state.lock().expect("task queue poisoned");
        state.queue.push_back(task);
        self.shared.condvar.notify_one();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().expect("task queue poisoned");
            state.shutdown = true;
        }
        self.shared.condvar.notify_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let mut state = shared.state.lock().expect("task queue poisoned");
        loop {
            if let Some(task) = state.queue.pop_front() {
                drop(state);
                task();
                break;
            }
            if state.shutdown {
                return;
            }
            state = shared.condvar.wait(state).expect("task queue poisoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn runs_submitted_tasks() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = counter.clone();
            pool.submit(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        thread::sleep(Duration::from_millis(200));
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn drop_joins_workers_without_orphaning() {
        let pool = WorkerPool::new(2);
        pool.submit(Box::new(|| {}));
        drop(pool);
    }
}
