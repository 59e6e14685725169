//! A bounded lock-free multiple-producer/multiple-consumer queue for
//! inter-thread hand-offs. Slots carry a sequence number so producers and
//! consumers can claim positions with a single compare-and-swap each;
//! global ordering is the slot-acquisition order, FIFO per producer is not
//! guaranteed.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Slot<T> {
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

pub struct BoundedQueue<T> {
    slots: Box<[Slot<T>]>,
    capacity: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
}

unsafe impl<T: Send> Send for BoundedQueue<T> {}
unsafe impl<T: Send> Sync for BoundedQueue<T> {}

impl<T> BoundedQueue<T> {
    /// Capacity is fixed at construction and must be non-zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        let slots = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            capacity,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `false` when the queue is full.
    pub fn try_push_back(&self, value: T) -> bool {
        self.claim_and_write(value).is_ok()
    }

    /// Returns `None` when the queue is empty.
    pub fn try_pop_front(&self) -> Option<T> {
        let mut pos = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos % self.capacity];
            let seq = slot.sequence.load(Ordering::Acquire);

            if seq == pos + 1 {
                match self.head.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.sequence.store(pos + self.capacity, Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => pos = current,
                }
            } else if seq <= pos {
                return None;
            } else {
                pos = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Spins until a slot frees up.
    pub fn push_back(&self, mut value: T) {
        loop {
            match self.claim_and_write(value) {
                Ok(()) => return,
                Err(v) => value = v,
            }
            std::hint::spin_loop();
        }
    }

    /// Spins until a value arrives.
    pub fn pop_front(&self) -> T {
        loop {
            if let Some(value) = self.try_pop_front() {
                return value;
            }
            std::hint::spin_loop();
        }
    }

    /// Claims the next tail slot; hands the value back on a full queue.
    fn claim_and_write(&self, value: T) -> Result<(), T> {
        let mut pos = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos % self.capacity];
            let seq = slot.sequence.load(Ordering::Acquire);

            if seq == pos {
                match self.tail.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        unsafe { (*slot.value.get()).write(value) };
                        slot.sequence.store(pos + 1, Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => pos = current,
                }
            } else if seq < pos {
                return Err(value);
            } else {
                pos = self.tail.load(Ordering::Relaxed);
            }
        }
    }
}

impl<T> Drop for BoundedQueue<T> {
    fn drop(&mut self) {
        while self.try_pop_front().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_push_pop_order() {
        let queue = BoundedQueue::new(4);
        for i in 0..4 {
            assert!(queue.try_push_back(i));
        }
        assert!(!queue.try_push_back(99));
        for i in 0..4 {
            assert_eq!(queue.try_pop_front(), Some(i));
        }
        assert_eq!(queue.try_pop_front(), None);
    }

    #[test]
    fn test_wraps_around() {
        let queue = BoundedQueue::new(2);
        for round in 0..10 {
            queue.push_back(round);
            queue.push_back(round + 100);
            assert_eq!(queue.pop_front(), round);
            assert_eq!(queue.pop_front(), round + 100);
        }
    }

    #[test]
    fn test_concurrent_multiset() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 2_500;

        let queue = Arc::new(BoundedQueue::new(64));
        let popped = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for p in 0..PRODUCERS {
            let queue = queue.clone();
            handles.push(thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    queue.push_back(p * PER_PRODUCER + i);
                }
            }));
        }
        for _ in 0..PRODUCERS {
            let queue = queue.clone();
            let popped = popped.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..PER_PRODUCER {
                    let value = queue.pop_front();
                    popped.lock().push(value);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut values = popped.lock().clone();
        values.sort_unstable();
        let expected: Vec<_> = (0..PRODUCERS * PER_PRODUCER).collect();
        assert_eq!(values, expected);
    }
}
