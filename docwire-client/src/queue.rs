//! FIFO request queue with a single in-flight slot.
//!
//! The head of the queue is the request currently on the wire; it stays at
//! the head until its reply arrives. Nothing else is sent while it waits.

use std::collections::VecDeque;

#[derive(Debug)]
pub struct RequestQueue<T> {
    items: VecDeque<T>,
    in_flight: bool,
}

impl<T> RequestQueue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
            in_flight: false,
        }
    }

    pub fn enqueue(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Marks the head as sent and returns it, unless a request is already
    /// waiting for its reply or the queue is empty.
    pub fn start(&mut self) -> Option<&T> {
        if self.in_flight {
            return None;
        }
        let head = self.items.front()?;
        self.in_flight = true;
        Some(head)
    }

    /// Removes the in-flight head once its reply has arrived.
    pub fn dequeue(&mut self) -> Option<T> {
        if !self.in_flight {
            return None;
        }
        self.in_flight = false;
        self.items.pop_front()
    }

    /// Takes every item out, in submission order, for failing.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.in_flight = false;
        self.items.drain(..)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for RequestQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
