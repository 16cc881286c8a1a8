//! Arena-backed doubly linked recency list.
//!
//! Slots are plain indices so the cache's key index can point straight at a
//! list node; promotion and eviction are O(1).

#[derive(Debug, Clone)]
struct LruNode<K> {
    key: K,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Recency order with the most recently used key at the front.
#[derive(Debug, Clone)]
pub(crate) struct LruList<K: Copy> {
    nodes: Vec<LruNode<K>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<K: Copy> LruList<K> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Insert `key` as most recently used and return its slot.
    pub(crate) fn push_front(&mut self, key: K) -> usize {
        let node = LruNode {
            key,
            prev: None,
            next: self.head,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        match self.head {
            Some(old_head) => self.nodes[old_head].prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
        self.len += 1;
        slot
    }

    pub(crate) fn move_to_front(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.nodes[slot].prev = None;
        self.nodes[slot].next = self.head;
        match self.head {
            Some(old_head) => self.nodes[old_head].prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    /// Unlink `slot` and recycle it. Returns the key it held.
    pub(crate) fn remove(&mut self, slot: usize) -> K {
        self.unlink(slot);
        self.free.push(slot);
        self.len -= 1;
        self.nodes[slot].key
    }

    /// Key that would be evicted next.
    pub(crate) fn back(&self) -> Option<K> {
        self.tail.map(|slot| self.nodes[slot].key)
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Keys from most to least recently used.
    pub(crate) fn iter(&self) -> impl Iterator<Item = K> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let slot = cursor?;
            cursor = self.nodes[slot].next;
            Some(self.nodes[slot].key)
        })
    }

    fn unlink(&mut self, slot: usize) {
        let LruNode { prev, next, .. } = self.nodes[slot];
        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_and_eviction() {
        let mut list = LruList::new();
        let a = list.push_front('a');
        list.push_front('b');
        list.push_front('c');
        assert_eq!(list.iter().collect::<String>(), "cba");

        list.move_to_front(a);
        assert_eq!(list.iter().collect::<String>(), "acb");
        assert_eq!(list.back(), Some('b'));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_slot_reuse() {
        let mut list = LruList::new();
        let a = list.push_front(1);
        list.push_front(2);
        list.remove(a);
        let c = list.push_front(3);
        assert_eq!(c, a);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![3, 2]);
        list.clear();
        assert_eq!(list.back(), None);
        assert_eq!(list.len(), 0);
    }
}
