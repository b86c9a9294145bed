//! # Linked List
//!
//! Doubly-linked list used for the job queues.
//!
//! Nodes live in a slot arena and link to each other by index, so push and
//! pop at both ends are O(1) without `unsafe` and without the element shifting
//! a `Vec` would do on `shift()`. Freed slots are recycled.

use std::fmt;

struct Node<T> {
    data: T,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Ordered list supporting both queue and stack discipline.
pub struct LinkedList<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> Default for LinkedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for LinkedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> LinkedList<T> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Number of items, tracked on every mutation.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append to the tail.
    pub fn push(&mut self, data: T) {
        let idx = self.alloc(Node {
            data,
            prev: self.tail,
            next: None,
        });

        match self.tail.and_then(|t| self.node_mut(t)) {
            Some(old_tail) => old_tail.next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.len += 1;
    }

    /// Prepend to the head.
    pub fn unshift(&mut self, data: T) {
        let idx = self.alloc(Node {
            data,
            prev: None,
            next: self.head,
        });

        match self.head.and_then(|h| self.node_mut(h)) {
            Some(old_head) => old_head.prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
        self.len += 1;
    }

    /// Remove and return the tail item.
    pub fn pop(&mut self) -> Option<T> {
        self.tail.and_then(|idx| self.unlink(idx))
    }

    /// Remove and return the head item.
    pub fn shift(&mut self) -> Option<T> {
        self.head.and_then(|idx| self.unlink(idx))
    }

    /// Peek at the head item.
    pub fn first(&self) -> Option<&T> {
        self.head.and_then(|idx| self.node(idx)).map(|n| &n.data)
    }

    /// Peek at the tail item.
    pub fn last(&self) -> Option<&T> {
        self.tail.and_then(|idx| self.node(idx)).map(|n| &n.data)
    }

    /// Drop every item.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Iterate from head to tail.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
            remaining: self.len,
        }
    }

    /// Apply `f` to every item in order and collect the results.
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Vec<U> {
        self.iter().map(f).collect()
    }

    fn node(&self, idx: usize) -> Option<&Node<T>> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<T>> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    fn alloc(&mut self, node: Node<T>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    /// Detach the node at `idx`, patch its neighbours and return its data.
    fn unlink(&mut self, idx: usize) -> Option<T> {
        let node = self.slots.get_mut(idx)?.take()?;

        match node.prev.and_then(|p| self.node_mut(p)) {
            Some(prev) => prev.next = node.next,
            None => self.head = node.next,
        }
        match node.next.and_then(|n| self.node_mut(n)) {
            Some(next) => next.prev = node.prev,
            None => self.tail = node.prev,
        }

        self.free.push(idx);
        self.len -= 1;
        if self.len == 0 {
            // Reclaim the arena once the list drains
            self.slots.clear();
            self.free.clear();
        }
        Some(node.data)
    }
}

impl<T: PartialEq> LinkedList<T> {
    /// Delete the first matching item, searching from the head.
    pub fn delete_first(&mut self, item: &T) -> bool {
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(node) = self.node(idx) else {
                return false;
            };
            if node.data == *item {
                return self.unlink(idx).is_some();
            }
            cursor = node.next;
        }
        false
    }

    /// Delete the first matching item, searching from the tail.
    pub fn delete_last(&mut self, item: &T) -> bool {
        let mut cursor = self.tail;
        while let Some(idx) = cursor {
            let Some(node) = self.node(idx) else {
                return false;
            };
            if node.data == *item {
                return self.unlink(idx).is_some();
            }
            cursor = node.prev;
        }
        false
    }
}

impl<T: Clone> LinkedList<T> {
    /// Copy the items into a `Vec`, head first.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T> FromIterator<T> for LinkedList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = Self::new();
        for item in iter {
            list.push(item);
        }
        list
    }
}

/// Borrowing iterator, head to tail.
pub struct Iter<'a, T> {
    list: &'a LinkedList<T>,
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.node(self.cursor?)?;
        self.cursor = node.next;
        self.remaining -= 1;
        Some(&node.data)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T> IntoIterator for &'a LinkedList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Owning iterator, drains from the head.
pub struct IntoIter<T>(LinkedList<T>);

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.0.shift()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.0.len, Some(self.0.len))
    }
}

impl<T> IntoIterator for LinkedList<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter(self)
    }
}
