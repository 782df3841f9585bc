//! Generation-checked node arenas with intrusive doubly-linked lists.
//!
//! Instructions and instruction groups live in per-function arenas and are
//! threaded into their owning block through `prev`/`next` handles. Removing a
//! node bumps its slot generation, so a handle kept across a deletion stops
//! resolving instead of silently aliasing whatever reuses the slot.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Stable handle to a node in an [`Arena`].
pub struct Id<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index, only meaningful together with the generation.
    pub fn slot(self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Head/tail of one intrusive list. Owned by a block, nodes owned by the arena.
pub struct List<T> {
    head: Option<Id<T>>,
    tail: Option<Id<T>>,
    len: usize,
}

impl<T> List<T> {
    pub fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn head(&self) -> Option<Id<T>> {
        self.head
    }

    pub fn tail(&self) -> Option<Id<T>> {
        self.tail
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for List<T> {
    fn clone(&self) -> Self {
        Self {
            head: self.head,
            tail: self.tail,
            len: self.len,
        }
    }
}

impl<T> fmt::Debug for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("len", &self.len)
            .finish()
    }
}

#[derive(Debug)]
struct Node<T> {
    value: T,
    owner: u32,
    prev: Option<Id<T>>,
    next: Option<Id<T>>,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    node: Option<Node<T>>,
}

/// Slot arena whose live nodes each belong to exactly one [`List`].
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Number of live nodes across all lists.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn node(&self, id: Id<T>) -> Option<&Node<T>> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn node_mut(&mut self, id: Id<T>) -> Option<&mut Node<T>> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    fn expect_node_mut(&mut self, id: Id<T>) -> &mut Node<T> {
        match self.node_mut(id) {
            Some(node) => node,
            None => panic!("stale arena handle {:?}", id),
        }
    }

    pub fn contains(&self, id: Id<T>) -> bool {
        self.node(id).is_some()
    }

    pub fn get(&self, id: Id<T>) -> Option<&T> {
        self.node(id).map(|n| &n.value)
    }

    pub fn get_mut(&mut self, id: Id<T>) -> Option<&mut T> {
        self.node_mut(id).map(|n| &mut n.value)
    }

    /// Owner tag (block index) of a live node.
    pub fn owner(&self, id: Id<T>) -> Option<u32> {
        self.node(id).map(|n| n.owner)
    }

    pub fn next(&self, id: Id<T>) -> Option<Id<T>> {
        self.node(id).and_then(|n| n.next)
    }

    pub fn prev(&self, id: Id<T>) -> Option<Id<T>> {
        self.node(id).and_then(|n| n.prev)
    }

    fn alloc(&mut self, value: T, owner: u32) -> Id<T> {
        let node = Node {
            value,
            owner,
            prev: None,
            next: None,
        };
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return Id::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        Id::new(index, 0)
    }

    pub fn push_back(&mut self, list: &mut List<T>, owner: u32, value: T) -> Id<T> {
        let id = self.alloc(value, owner);
        match list.tail {
            Some(tail) => {
                self.expect_node_mut(tail).next = Some(id);
                self.expect_node_mut(id).prev = Some(tail);
            }
            None => list.head = Some(id),
        }
        list.tail = Some(id);
        list.len += 1;
        id
    }

    pub fn push_front(&mut self, list: &mut List<T>, owner: u32, value: T) -> Id<T> {
        let id = self.alloc(value, owner);
        match list.head {
            Some(head) => {
                self.expect_node_mut(head).prev = Some(id);
                self.expect_node_mut(id).next = Some(head);
            }
            None => list.tail = Some(id),
        }
        list.head = Some(id);
        list.len += 1;
        id
    }

    /// Insert `value` right after `anchor`, in the same list and owner.
    pub fn insert_after(&mut self, list: &mut List<T>, anchor: Id<T>, value: T) -> Id<T> {
        let (owner, next) = {
            let node = self.expect_node_mut(anchor);
            (node.owner, node.next)
        };
        let id = self.alloc(value, owner);
        {
            let node = self.expect_node_mut(id);
            node.prev = Some(anchor);
            node.next = next;
        }
        self.expect_node_mut(anchor).next = Some(id);
        match next {
            Some(next) => self.expect_node_mut(next).prev = Some(id),
            None => list.tail = Some(id),
        }
        list.len += 1;
        id
    }

    /// Insert `value` right before `anchor`, in the same list and owner.
    pub fn insert_before(&mut self, list: &mut List<T>, anchor: Id<T>, value: T) -> Id<T> {
        let (owner, prev) = {
            let node = self.expect_node_mut(anchor);
            (node.owner, node.prev)
        };
        let id = self.alloc(value, owner);
        {
            let node = self.expect_node_mut(id);
            node.prev = prev;
            node.next = Some(anchor);
        }
        self.expect_node_mut(anchor).prev = Some(id);
        match prev {
            Some(prev) => self.expect_node_mut(prev).next = Some(id),
            None => list.head = Some(id),
        }
        list.len += 1;
        id
    }

    /// Unlink and free a node, returning its value. `None` for stale handles.
    pub fn remove(&mut self, list: &mut List<T>, id: Id<T>) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;

        match node.prev {
            Some(prev) => self.expect_node_mut(prev).next = node.next,
            None => list.head = node.next,
        }
        match node.next {
            Some(next) => self.expect_node_mut(next).prev = node.prev,
            None => list.tail = node.prev,
        }
        list.len -= 1;
        Some(node.value)
    }

    /// Iterate the handles of `list` front to back.
    pub fn iter<'a>(&'a self, list: &List<T>) -> ListIter<'a, T> {
        ListIter {
            arena: self,
            cursor: list.head,
        }
    }
}

impl<T> Index<Id<T>> for Arena<T> {
    type Output = T;

    fn index(&self, id: Id<T>) -> &T {
        match self.get(id) {
            Some(value) => value,
            None => panic!("stale arena handle {:?}", id),
        }
    }
}

impl<T> IndexMut<Id<T>> for Arena<T> {
    fn index_mut(&mut self, id: Id<T>) -> &mut T {
        &mut self.expect_node_mut(id).value
    }
}

pub struct ListIter<'a, T> {
    arena: &'a Arena<T>,
    cursor: Option<Id<T>>,
}

impl<T> Iterator for ListIter<'_, T> {
    type Item = Id<T>;

    fn next(&mut self) -> Option<Id<T>> {
        let id = self.cursor?;
        self.cursor = self.arena.next(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(arena: &Arena<u32>, list: &List<u32>) -> Vec<u32> {
        arena.iter(list).map(|id| arena[id]).collect()
    }

    #[test]
    fn test_push_and_insert_order() {
        let mut arena = Arena::new();
        let mut list = List::new();
        let a = arena.push_back(&mut list, 0, 1);
        let c = arena.push_back(&mut list, 0, 3);
        arena.insert_after(&mut list, a, 2);
        arena.push_front(&mut list, 0, 0);
        arena.insert_before(&mut list, c, 5);

        assert_eq!(collect(&arena, &list), vec![0, 1, 2, 5, 3]);
        assert_eq!(list.len(), 5);
        assert_eq!(arena.len(), 5);
    }

    #[test]
    fn test_remove_relinks_neighbours() {
        let mut arena = Arena::new();
        let mut list = List::new();
        let a = arena.push_back(&mut list, 0, 1);
        let b = arena.push_back(&mut list, 0, 2);
        let c = arena.push_back(&mut list, 0, 3);

        assert_eq!(arena.remove(&mut list, b), Some(2));
        assert_eq!(arena.next(a), Some(c));
        assert_eq!(arena.prev(c), Some(a));

        assert_eq!(arena.remove(&mut list, a), Some(1));
        assert_eq!(arena.remove(&mut list, c), Some(3));
        assert!(list.is_empty());
        assert_eq!(list.head(), None);
        assert_eq!(list.tail(), None);
    }

    #[test]
    fn test_stale_handle_does_not_alias_reused_slot() {
        let mut arena = Arena::new();
        let mut list = List::new();
        let old = arena.push_back(&mut list, 0, 7);
        arena.remove(&mut list, old);
        let new = arena.push_back(&mut list, 0, 8);

        assert_eq!(old.slot(), new.slot());
        assert!(!arena.contains(old));
        assert_eq!(arena.get(old), None);
        assert_eq!(arena[new], 8);
        assert_eq!(arena.remove(&mut list, old), None);
    }
}
