// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! The ready queue.
//!
//! Holds runnable processes in dispatch order. A queue is either FIFO or
//! priority-ordered for its whole lifetime. Every
//! read and write, including the priority comparisons of an ordered insert,
//! happens under the single queue lock. The "not empty" condition lets idle
//! CPUs sleep until work shows up.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use crate::process::{Process, ProcessState};
use crate::types::{Pid, Priority};

/// How entries are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOrder {
    /// Append at the tail (FCFS, Round-Robin).
    Fifo,
    /// Ascending priority value, arrival order among equal priorities.
    Priority,
}

#[derive(Debug, Default)]
struct QueueInner {
    entries: VecDeque<Arc<Process>>,
    /// Set once by `close()`; blocked and future waiters return `None`.
    closed: bool,
}

/// A thread-safe ready queue.
#[derive(Debug)]
pub struct ReadyQueue {
    order: QueueOrder,
    inner: Mutex<QueueInner>,
    not_empty: Condvar,
}

impl ReadyQueue {
    pub fn new(order: QueueOrder) -> Self {
        ReadyQueue {
            order,
            inner: Mutex::new(QueueInner::default()),
            not_empty: Condvar::new(),
        }
    }

    pub fn order(&self) -> QueueOrder {
        self.order
    }

    /// Insert a READY process and wake one waiter.
    ///
    /// Under `QueueOrder::Priority` the new entry lands after every queued
    /// entry whose priority value is lower than or equal to its own.
    pub fn enqueue(&self, process: Arc<Process>) {
        let mut inner = self.inner.lock().unwrap();
        debug_assert_eq!(
            process.state(),
            ProcessState::Ready,
            "pid={} enqueued while not READY",
            process.id()
        );
        debug_assert!(
            !inner.entries.iter().any(|p| p.id() == process.id()),
            "pid={} is already queued",
            process.id()
        );

        match self.order {
            QueueOrder::Fifo => inner.entries.push_back(process),
            QueueOrder::Priority => {
                let prio = process.priority();
                let pos = inner.entries.partition_point(|p| p.priority() <= prio);
                inner.entries.insert(pos, process);
            }
        }

        // One waiter per newly available process.
        self.not_empty.notify_one();
    }

    /// Remove and return the head, or `None` if the queue is empty.
    pub fn dequeue(&self) -> Option<Arc<Process>> {
        self.inner.lock().unwrap().entries.pop_front()
    }

    /// Block until the queue is non-empty, then remove and return the head.
    ///
    /// Returns `None` only once the queue has been closed.
    pub fn dequeue_blocking(&self) -> Option<Arc<Process>> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(process) = inner.entries.pop_front() {
                return Some(process);
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// PIDs in dispatch order, without consuming.
    pub fn pids(&self) -> Vec<Pid> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .map(|p| p.id())
            .collect()
    }

    /// Priorities of the queued processes, in dispatch order.
    pub fn priorities(&self) -> Vec<Priority> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .map(|p| p.priority())
            .collect()
    }

    /// Release every thread blocked in `dequeue_blocking()`.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn ready(pid: u32, prio: Priority) -> Arc<Process> {
        let p = Process::new(Pid(pid), format!("p{pid}"), prio);
        p.transition(ProcessState::Ready);
        p
    }

    fn drain(q: &ReadyQueue) -> Vec<u32> {
        std::iter::from_fn(|| q.dequeue()).map(|p| p.id().0).collect()
    }

    #[test]
    fn test_fifo_preserves_arrival_order() {
        let q = ReadyQueue::new(QueueOrder::Fifo);
        assert_eq!(q.order(), QueueOrder::Fifo);
        for (pid, prio) in [(1, 9), (2, 0), (3, 4), (4, 0)] {
            q.enqueue(ready(pid, prio));
        }
        assert_eq!(q.len(), 4);
        assert_eq!(q.priorities(), vec![9, 0, 4, 0]);
        assert_eq!(drain(&q), vec![1, 2, 3, 4]);
        assert!(q.is_empty());
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn test_priority_order_with_fifo_ties() {
        let q = ReadyQueue::new(QueueOrder::Priority);
        q.enqueue(ready(1, 3));
        q.enqueue(ready(2, 1));
        q.enqueue(ready(3, 3));
        q.enqueue(ready(4, 2));
        q.enqueue(ready(5, 1));
        q.enqueue(ready(6, 0));
        assert_eq!(
            q.pids(),
            vec![Pid(6), Pid(2), Pid(5), Pid(4), Pid(1), Pid(3)]
        );
        assert_eq!(q.order(), QueueOrder::Priority);
        assert_eq!(q.priorities(), vec![0, 1, 1, 2, 3, 3]);
        assert_eq!(drain(&q), vec![6, 2, 5, 4, 1, 3]);
    }

    #[test]
    fn test_priority_jumps_ahead_of_head() {
        let q = ReadyQueue::new(QueueOrder::Priority);
        q.enqueue(ready(1, 5));
        q.enqueue(ready(2, 1));
        assert_eq!(q.dequeue().map(|p| p.id()), Some(Pid(2)));
        assert_eq!(q.dequeue().map(|p| p.id()), Some(Pid(1)));
    }

    #[test]
    fn test_blocking_dequeue_waits_for_enqueue() {
        let q = Arc::new(ReadyQueue::new(QueueOrder::Fifo));
        let (tx, rx) = mpsc::channel();
        let waiter = {
            let q = q.clone();
            thread::spawn(move || {
                let p = q.dequeue_blocking();
                tx.send(p.map(|p| p.id())).unwrap();
            })
        };

        // Nothing queued: the waiter must stay blocked.
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        q.enqueue(ready(42, 0));
        let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(got, Some(Pid(42)));
        waiter.join().unwrap();
        assert!(q.is_empty());
    }

    #[test]
    fn test_one_waiter_released_per_process() {
        let q = Arc::new(ReadyQueue::new(QueueOrder::Fifo));
        let (tx, rx) = mpsc::channel();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let q = q.clone();
                let tx = tx.clone();
                thread::spawn(move || {
                    let p = q.dequeue_blocking();
                    tx.send(p.map(|p| p.id())).unwrap();
                })
            })
            .collect();

        // Give all three waiters time to block.
        thread::sleep(Duration::from_millis(50));
        q.enqueue(ready(1, 0));
        q.enqueue(ready(2, 0));

        let mut got = vec![
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        ];
        got.sort();
        assert_eq!(got, vec![Some(Pid(1)), Some(Pid(2))]);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        q.close();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), None);
        for w in waiters {
            w.join().unwrap();
        }
    }

    #[test]
    fn test_close_releases_waiters() {
        let q = Arc::new(ReadyQueue::new(QueueOrder::Priority));
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let q = q.clone();
                thread::spawn(move || q.dequeue_blocking().is_none())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert!(q.is_closed());
        for w in waiters {
            assert!(w.join().unwrap());
        }
        // Closed queues never block.
        assert!(q.dequeue_blocking().is_none());
    }

    #[test]
    fn test_concurrent_priority_inserts() {
        let q = Arc::new(ReadyQueue::new(QueueOrder::Priority));
        let producers: Vec<_> = (0..8u32)
            .map(|t| {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..50u32 {
                        let pid = t * 50 + i;
                        q.enqueue(ready(pid, (pid * 7) % 11));
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let out: Vec<_> = std::iter::from_fn(|| q.dequeue()).collect();
        assert_eq!(out.len(), 400);
        assert!(out
            .windows(2)
            .all(|w| w[0].priority() <= w[1].priority()));

        // Within each producer, equal priorities keep arrival order.
        for t in 0..8u32 {
            for prio in 0..11 {
                let pids: Vec<u32> = out
                    .iter()
                    .filter(|p| p.id().0 / 50 == t && p.priority() == prio)
                    .map(|p| p.id().0)
                    .collect();
                assert!(pids.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }
}
