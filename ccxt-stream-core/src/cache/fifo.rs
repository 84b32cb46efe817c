//! Insertion-ordered cache.

use std::collections::VecDeque;

use super::BoundedCache;

/// FIFO cache: appends go to the tail, overflow drops from the head.
#[derive(Debug, Clone)]
pub struct ArrayCache<T> {
    items: VecDeque<T>,
    limit: usize,
}

impl<T> ArrayCache<T> {
    /// Creates an empty cache holding at most `limit` records (minimum 1).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            items: VecDeque::with_capacity(limit.min(1024)),
            limit,
        }
    }

    /// Most recently appended record.
    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T> BoundedCache<T> for ArrayCache<T> {
    fn append(&mut self, item: T) {
        self.items.push_back(item);
        if self.items.len() > self.limit {
            self.items.pop_front();
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn limit(&self) -> usize {
        self.limit
    }

    fn iter<'a>(&'a self) -> impl DoubleEndedIterator<Item = &'a T>
    where
        T: 'a,
    {
        self.items.iter()
    }
}
