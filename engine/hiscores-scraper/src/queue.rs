//! # Job queue
//!
//! Async min-priority queue shared by the workers. `get` always yields the
//! lowest-priority job, ties broken by insertion order. A bounded queue
//! makes `put` wait for space; `put_force` ignores the bound so an
//! interrupted job can always be handed back.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Jobs carry the priority they are ordered by
pub trait Prioritized {
    fn priority(&self) -> u64;
}

struct Entry<T> {
    priority: u64,
    seq: u64,
    job: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        (self.priority, self.seq) == (other.priority, other.seq)
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, self.seq).cmp(&(other.priority, other.seq))
    }
}

struct State<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
    next_seq: u64,
}

pub struct JobQueue<T> {
    state: Mutex<State<T>>,
    maxsize: Option<usize>,
    not_empty: Notify,
    not_full: Notify,
}

impl<T: Prioritized> JobQueue<T> {
    pub fn unbounded() -> Self {
        Self::with_maxsize(None)
    }

    pub fn bounded(maxsize: usize) -> Self {
        Self::with_maxsize(Some(maxsize.max(1)))
    }

    fn with_maxsize(maxsize: Option<usize>) -> Self {
        Self {
            state: Mutex::new(State { heap: BinaryHeap::new(), next_seq: 0 }),
            maxsize,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().heap.is_empty()
    }

    /// Priority of the job `get` would return next
    pub fn peek_priority(&self) -> Option<u64> {
        self.state.lock().heap.peek().map(|Reverse(e)| e.priority)
    }

    fn push(&self, state: &mut State<T>, job: T) {
        let entry = Entry { priority: job.priority(), seq: state.next_seq, job };
        state.next_seq += 1;
        state.heap.push(Reverse(entry));
        self.not_empty.notify_one();
    }

    /// Enqueue if there is room, handing the job back otherwise
    pub fn try_put(&self, job: T) -> Result<(), T> {
        let mut state = self.state.lock();
        if self.maxsize.is_some_and(|max| state.heap.len() >= max) {
            return Err(job);
        }
        self.push(&mut state, job);
        Ok(())
    }

    /// Enqueue regardless of the bound
    pub fn put_force(&self, job: T) {
        let mut state = self.state.lock();
        self.push(&mut state, job);
    }

    /// Enqueue, waiting while a bounded queue is full
    pub async fn put(&self, mut job: T) {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_put(job) {
                Ok(()) => return,
                Err(rejected) => job = rejected,
            }
            notified.await;
        }
    }

    /// Dequeue the lowest-priority job if any
    pub fn try_get(&self) -> Option<T> {
        let Reverse(entry) = self.state.lock().heap.pop()?;
        if self.maxsize.is_some() {
            self.not_full.notify_one();
        }
        Some(entry.job)
    }

    /// Dequeue the lowest-priority job, waiting while the queue is empty
    pub async fn get(&self) -> T {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(job) = self.try_get() {
                return job;
            }
            notified.await;
        }
    }
}

/// Hands a dequeued job back to its queue unless the holder completes it.
/// Dropping the guard (error, cancellation) re-enqueues the job.
pub struct InFlight<'q, T: Prioritized> {
    queue: &'q JobQueue<T>,
    job: Option<T>,
}

impl<'q, T: Prioritized> InFlight<'q, T> {
    pub fn new(queue: &'q JobQueue<T>, job: T) -> Self {
        Self { queue, job: Some(job) }
    }

    pub fn job(&self) -> &T {
        match &self.job {
            Some(job) => job,
            None => unreachable!("job taken before completion"),
        }
    }

    /// The job finished; do not re-enqueue it
    pub fn complete(mut self) -> T {
        match self.job.take() {
            Some(job) => job,
            None => unreachable!("job completed twice"),
        }
    }
}

impl<T: Prioritized> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            self.queue.put_force(job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    struct Job(u64, &'static str);

    impl Prioritized for Job {
        fn priority(&self) -> u64 {
            self.0
        }
    }

    #[tokio::test]
    async fn test_lowest_priority_first() {
        let queue = JobQueue::unbounded();
        queue.put(Job(5, "e")).await;
        queue.put(Job(1, "a")).await;
        queue.put(Job(3, "c")).await;
        queue.put(Job(1, "b")).await;

        assert_eq!(queue.peek_priority(), Some(1));
        assert_eq!(queue.get().await, Job(1, "a"));
        assert_eq!(queue.get().await, Job(1, "b"));
        assert_eq!(queue.get().await, Job(3, "c"));
        assert_eq!(queue.get().await, Job(5, "e"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_bounded_put_waits_for_space() {
        let queue = Arc::new(JobQueue::bounded(2));
        queue.put(Job(1, "a")).await;
        queue.put(Job(2, "b")).await;
        assert!(queue.try_put(Job(9, "x")).is_err());

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.put(Job(3, "c")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.get().await, Job(1, "a"));
        producer.await.unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_get_waits_for_put() {
        let queue = Arc::new(JobQueue::unbounded());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.put(Job(7, "g")).await;
        assert_eq!(consumer.await.unwrap(), Job(7, "g"));
    }

    #[test]
    fn test_put_force_ignores_bound() {
        let queue = JobQueue::bounded(1);
        queue.put_force(Job(2, "b"));
        queue.put_force(Job(1, "a"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_get(), Some(Job(1, "a")));
    }

    #[test]
    fn test_dropped_guard_requeues() {
        let queue = JobQueue::unbounded();
        queue.put_force(Job(4, "d"));

        let job = queue.try_get().unwrap();
        drop(InFlight::new(&queue, job));
        assert_eq!(queue.len(), 1);

        let guard = InFlight::new(&queue, queue.try_get().unwrap());
        assert_eq!(guard.job().0, 4);
        guard.complete();
        assert!(queue.is_empty());
    }
}
