//! The in-memory tier: an insertion-ordered map from
//! `PageReference` identity to `PageContainer`, with O(1)
//! lookup, insertion at the newest end, removal of arbitrary
//! entries, and removal of the oldest entry.
//!
//! Entries live in a slab and are threaded into a doubly
//! linked list by slab index. A hash index maps reference
//! identities to slab indices.

use crate::{Map, PageContainer, PageReference};

#[derive(Debug)]
struct Node<P> {
    reference: PageReference,
    container: PageContainer<P>,
    older: Option<usize>,
    newer: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct Resident<P> {
    nodes: Vec<Option<Node<P>>>,
    free: Vec<usize>,
    index: Map<u64, usize>,
    oldest: Option<usize>,
    newest: Option<usize>,
}

impl<P> Resident<P> {
    pub fn with_capacity(capacity: usize) -> Resident<P> {
        Resident {
            nodes: Vec::with_capacity(capacity),
            free: vec![],
            index: Map::with_capacity_and_hasher(capacity, Default::default()),
            oldest: None,
            newest: None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn contains(&self, reference: &PageReference) -> bool {
        self.index.contains_key(&reference.identity())
    }

    pub fn get(&self, reference: &PageReference) -> Option<&PageContainer<P>> {
        let idx = *self.index.get(&reference.identity())?;
        Some(&self.node(idx).container)
    }

    pub fn get_mut(&mut self, reference: &PageReference) -> Option<&mut PageContainer<P>> {
        let idx = *self.index.get(&reference.identity())?;
        Some(&mut self.node_mut(idx).container)
    }

    /// Insert at the most-recent position. The reference must
    /// not already be present.
    pub fn push_newest(&mut self, reference: PageReference, container: PageContainer<P>) {
        let idx = self.allocate(reference, container);
        self.link_newest(idx);
    }

    /// Insert at the least-recent position. The reference must
    /// not already be present.
    pub fn push_oldest(&mut self, reference: PageReference, container: PageContainer<P>) {
        let idx = self.allocate(reference, container);
        self.link_oldest(idx);
    }

    pub fn remove(&mut self, reference: &PageReference) -> Option<PageContainer<P>> {
        let idx = self.index.remove(&reference.identity())?;
        let node = self.release(idx);
        Some(node.container)
    }

    pub fn pop_oldest(&mut self) -> Option<(PageReference, PageContainer<P>)> {
        let idx = self.oldest?;
        let node = self.release(idx);
        let removed = self.index.remove(&node.reference.identity());
        assert_eq!(removed, Some(idx));
        Some((node.reference, node.container))
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.index.clear();
        self.oldest = None;
        self.newest = None;
    }

    /// Iterate from the oldest to the newest entry.
    pub fn iter(&self) -> Iter<'_, P> {
        Iter {
            resident: self,
            cursor: self.oldest,
            remaining: self.len(),
        }
    }

    fn node(&self, idx: usize) -> &Node<P> {
        self.nodes[idx]
            .as_ref()
            .expect("resident index points at a free slab entry")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<P> {
        self.nodes[idx]
            .as_mut()
            .expect("resident index points at a free slab entry")
    }

    fn allocate(&mut self, reference: PageReference, container: PageContainer<P>) -> usize {
        let identity = reference.identity();
        let node = Node {
            reference,
            container,
            older: None,
            newer: None,
        };

        let idx = if let Some(idx) = self.free.pop() {
            assert!(self.nodes[idx].is_none());
            self.nodes[idx] = Some(node);
            idx
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        };

        let old = self.index.insert(identity, idx);
        assert!(old.is_none(), "reference {} is already resident", identity);

        idx
    }

    fn link_newest(&mut self, idx: usize) {
        let prev_newest = self.newest;
        {
            let node = self.node_mut(idx);
            node.older = prev_newest;
            node.newer = None;
        }
        match prev_newest {
            Some(prev) => self.node_mut(prev).newer = Some(idx),
            None => self.oldest = Some(idx),
        }
        self.newest = Some(idx);
    }

    fn link_oldest(&mut self, idx: usize) {
        let prev_oldest = self.oldest;
        {
            let node = self.node_mut(idx);
            node.older = None;
            node.newer = prev_oldest;
        }
        match prev_oldest {
            Some(prev) => self.node_mut(prev).older = Some(idx),
            None => self.newest = Some(idx),
        }
        self.oldest = Some(idx);
    }

    // unlinks the node and frees its slab entry, leaving the
    // index untouched
    fn release(&mut self, idx: usize) -> Node<P> {
        let node = self.nodes[idx]
            .take()
            .expect("releasing a free slab entry");

        match node.older {
            Some(older) => self.node_mut(older).newer = node.newer,
            None => self.oldest = node.newer,
        }
        match node.newer {
            Some(newer) => self.node_mut(newer).older = node.older,
            None => self.newest = node.older,
        }

        self.free.push(idx);
        node
    }
}

pub(crate) struct Iter<'a, P> {
    resident: &'a Resident<P>,
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a, P> Iterator for Iter<'a, P> {
    type Item = (&'a PageReference, &'a PageContainer<P>);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = self.resident.node(idx);
        self.cursor = node.newer;
        self.remaining -= 1;
        Some((&node.reference, &node.container))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, P> ExactSizeIterator for Iter<'a, P> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(n: u8) -> PageContainer<u8> {
        PageContainer::new(n, n)
    }

    fn order(resident: &Resident<u8>) -> Vec<u8> {
        resident
            .iter()
            .map(|(_, c)| *c.complete().unwrap())
            .collect()
    }

    #[test]
    fn insertion_order_and_pop_oldest() {
        let mut resident = Resident::with_capacity(4);
        let refs: Vec<PageReference> = (0..3).map(|_| PageReference::new()).collect();

        for (i, r) in refs.iter().enumerate() {
            resident.push_newest(r.clone(), container(i as u8));
        }

        assert_eq!(resident.len(), 3);
        assert_eq!(order(&resident), vec![0, 1, 2]);

        let (popped, c) = resident.pop_oldest().unwrap();
        assert_eq!(popped, refs[0]);
        assert_eq!(c, container(0));
        assert!(!resident.contains(&refs[0]));
        assert_eq!(order(&resident), vec![1, 2]);
    }

    #[test]
    fn remove_from_the_middle_relinks_neighbours() {
        let mut resident = Resident::with_capacity(4);
        let refs: Vec<PageReference> = (0..4).map(|_| PageReference::new()).collect();

        for (i, r) in refs.iter().enumerate() {
            resident.push_newest(r.clone(), container(i as u8));
        }

        assert_eq!(resident.remove(&refs[1]), Some(container(1)));
        assert_eq!(resident.remove(&refs[1]), None);
        assert_eq!(order(&resident), vec![0, 2, 3]);

        assert_eq!(resident.remove(&refs[3]), Some(container(3)));
        assert_eq!(order(&resident), vec![0, 2]);

        // freed slab entries get reused
        resident.push_newest(refs[1].clone(), container(5));
        assert_eq!(order(&resident), vec![0, 2, 5]);
        assert_eq!(resident.nodes.len(), 4);
    }

    #[test]
    fn push_oldest_goes_to_the_front() {
        let mut resident = Resident::with_capacity(2);
        let a = PageReference::new();
        let b = PageReference::new();

        resident.push_newest(a.clone(), container(1));
        resident.push_oldest(b.clone(), container(2));

        assert_eq!(order(&resident), vec![2, 1]);
        assert_eq!(resident.pop_oldest().unwrap().0, b);
        assert_eq!(resident.pop_oldest().unwrap().0, a);
        assert!(resident.pop_oldest().is_none());
        assert_eq!(resident.iter().len(), 0);
    }

    #[test]
    fn get_mut_and_clear() {
        let mut resident = Resident::with_capacity(1);
        let a = PageReference::new();

        resident.push_newest(a.clone(), container(1));
        *resident.get_mut(&a).unwrap().modified_mut().unwrap() = 9;
        assert_eq!(resident.get(&a).unwrap().modified(), Some(&9));

        resident.clear();
        assert_eq!(resident.len(), 0);
        assert!(resident.get(&a).is_none());
        assert!(resident.iter().next().is_none());
    }

    #[test]
    #[should_panic]
    fn double_insert_panics() {
        let mut resident = Resident::with_capacity(1);
        let a = PageReference::new();
        resident.push_newest(a.clone(), container(1));
        resident.push_newest(a, container(2));
    }
}
