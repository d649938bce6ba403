use std::collections::VecDeque;
use std::fmt;

/// Bounded append-only queue; once full, every push evicts the oldest item.
pub struct CircularQueue<T> {
    deque: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> Clone for CircularQueue<T> {
    fn clone(&self) -> Self {
        Self {
            deque: self.deque.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CircularQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.deque.fmt(f)
    }
}

impl<T> CircularQueue<T> {
    #[inline]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            deque: VecDeque::with_capacity(cap.min(4096)),
            capacity: cap,
        }
    }

    /// Appends `item`, returning the evicted oldest item when the queue was full.
    /// A zero-capacity queue retains nothing and hands the item straight back.
    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }

        let evicted = if self.is_full() {
            self.deque.pop_front()
        } else {
            None
        };

        self.deque.push_back(item);

        evicted
    }

    /// Changes the bound, evicting oldest items until the queue fits.
    pub fn set_capacity(&mut self, cap: usize) -> usize {
        self.capacity = cap;
        let excess = self.deque.len().saturating_sub(cap);
        self.deque.drain(..excess);

        excess
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.deque.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deque.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.deque.len() >= self.capacity
    }

    #[inline]
    pub fn latest(&self) -> Option<&T> {
        self.deque.back()
    }

    /// Oldest first.
    #[inline]
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &'_ T> + ExactSizeIterator {
        self.deque.iter()
    }
}
