// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Access-ordered map backed by an index-linked arena.
//!
//! Nodes live in a slab and link to their neighbours by slot index, so moving an
//! entry to the front and unlinking the tail are both O(1).

use std::collections::HashMap;

#[derive(Debug)]
struct Node<T> {
    key: String,
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct LruList<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    // most recently used
    head: Option<usize>,
    // least recently used
    tail: Option<usize>,
}

impl<T> LruList<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            index: HashMap::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Looks up a value without changing recency.
    pub fn peek(&self, key: &str) -> Option<&T> {
        let slot = *self.index.get(key)?;
        self.node(slot).map(|node| &node.value)
    }

    /// Looks up a value and marks it most recently used.
    pub fn get(&mut self, key: &str) -> Option<&T> {
        let slot = *self.index.get(key)?;
        self.move_to_front(slot);
        self.node(slot).map(|node| &node.value)
    }

    /// Inserts or replaces a value and marks it most recently used.
    ///
    /// Returns the previous value for the key.
    pub fn insert(&mut self, key: String, value: T) -> Option<T> {
        if let Some(&slot) = self.index.get(&key) {
            self.move_to_front(slot);
            return self.node_mut(slot).map(|node| std::mem::replace(&mut node.value, value));
        }

        let node = Node {
            key: key.clone(),
            value,
            prev: None,
            next: self.head,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        if let Some(old_head) = self.head
            && let Some(head) = self.node_mut(old_head)
        {
            head.prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
        self.index.insert(key, slot);
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        let slot = self.index.remove(key)?;
        self.unlink(slot);
        self.release(slot).map(|node| node.value)
    }

    /// Removes the least recently used entry.
    pub fn pop_lru(&mut self) -> Option<(String, T)> {
        let slot = self.tail?;
        self.unlink(slot);
        let node = self.release(slot)?;
        self.index.remove(&node.key);
        Some((node.key, node.value))
    }

    /// Removes every entry for which `remove` returns `true`, returning how many were removed.
    pub fn remove_where(&mut self, mut remove: impl FnMut(&str, &T) -> bool) -> u64 {
        let doomed: Vec<String> = self
            .slots
            .iter()
            .flatten()
            .filter(|node| remove(&node.key, &node.value))
            .map(|node| node.key.clone())
            .collect();

        for key in &doomed {
            self.remove(key);
        }
        doomed.len() as u64
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    /// Keys from most to least recently used.
    #[cfg(test)]
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let Some(node) = self.node(slot) else { break };
            keys.push(node.key.clone());
            cursor = node.next;
        }
        keys
    }

    fn node(&self, slot: usize) -> Option<&Node<T>> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, slot: usize) -> Option<&mut Node<T>> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    fn release(&mut self, slot: usize) -> Option<Node<T>> {
        let node = self.slots.get_mut(slot)?.take()?;
        self.free.push(slot);
        Some(node)
    }

    fn unlink(&mut self, slot: usize) {
        let Some((prev, next)) = self.node(slot).map(|node| (node.prev, node.next)) else {
            return;
        };

        match prev {
            Some(prev) => {
                if let Some(node) = self.node_mut(prev) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(next) => {
                if let Some(node) = self.node_mut(next) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.node_mut(slot) {
            node.prev = None;
            node.next = None;
        }
    }

    fn move_to_front(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        self.unlink(slot);

        let old_head = self.head;
        if let Some(node) = self.node_mut(slot) {
            node.next = old_head;
        }
        if let Some(old_head) = old_head
            && let Some(head) = self.node_mut(old_head)
        {
            head.prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(keys: &[&str]) -> LruList<u32> {
        let mut list = LruList::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            list.insert((*key).to_string(), u32::try_from(i).unwrap());
        }
        list
    }

    #[test]
    fn insert_orders_most_recent_first() {
        let list = list(&["a", "b", "c"]);
        assert_eq!(list.keys(), ["c", "b", "a"]);
    }

    #[test]
    fn get_moves_to_front_peek_does_not() {
        let mut list = list(&["a", "b", "c"]);
        assert_eq!(list.peek("a"), Some(&0));
        assert_eq!(list.keys(), ["c", "b", "a"]);

        assert_eq!(list.get("a"), Some(&0));
        assert_eq!(list.keys(), ["a", "c", "b"]);
    }

    #[test]
    fn pop_lru_takes_tail() {
        let mut list = list(&["a", "b", "c"]);
        list.get("a");
        assert_eq!(list.pop_lru(), Some(("b".to_string(), 1)));
        assert_eq!(list.keys(), ["a", "c"]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn replace_keeps_single_node() {
        let mut list = list(&["a", "b"]);
        assert_eq!(list.insert("a".to_string(), 9), Some(0));
        assert_eq!(list.keys(), ["a", "b"]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn slots_are_reused() {
        let mut list = list(&["a", "b"]);
        list.remove("a");
        list.insert("c".to_string(), 5);
        assert_eq!(list.slots.len(), 2);
        assert_eq!(list.keys(), ["c", "b"]);
    }

    #[test]
    fn remove_where_unlinks_matches() {
        let mut list = list(&["x:1", "y:1", "x:2"]);
        assert_eq!(list.remove_where(|key, _| key.starts_with("x:")), 2);
        assert_eq!(list.keys(), ["y:1"]);
        assert!(!list.contains("x:1"));
        assert_eq!(list.pop_lru(), Some(("y:1".to_string(), 1)));
        assert_eq!(list.pop_lru(), None);
    }

    #[test]
    fn remove_head_and_tail() {
        let mut list = list(&["a", "b", "c"]);
        list.remove("c");
        list.remove("a");
        assert_eq!(list.keys(), ["b"]);
        list.clear();
        assert_eq!(list.len(), 0);
        assert_eq!(list.pop_lru(), None);
    }
}
