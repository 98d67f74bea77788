//! The [`ResourceSet`] bitset used to declare unit access.

use crate::id::ResourceId;

/// A set of resource IDs implemented as a dynamically-sized bitset.
///
/// Units declare what they read and write as resource sets. Iteration is
/// always in ascending ID order, which gives every declared set a stable
/// order independent of how it was built.
#[derive(Clone, Debug, Default)]
pub struct ResourceSet {
    bits: Vec<u64>,
}

impl ResourceSet {
    const BITS_PER_WORD: usize = 64;

    /// Create an empty resource set.
    pub fn empty() -> Self {
        Self { bits: Vec::new() }
    }

    /// Insert a resource ID into the set.
    pub fn insert(&mut self, id: ResourceId) {
        let word = id.0 as usize / Self::BITS_PER_WORD;
        let bit = id.0 as usize % Self::BITS_PER_WORD;
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        self.bits[word] |= 1u64 << bit;
    }

    /// Remove a resource ID from the set. Returns whether it was present.
    pub fn remove(&mut self, id: ResourceId) -> bool {
        let word = id.0 as usize / Self::BITS_PER_WORD;
        let bit = id.0 as usize % Self::BITS_PER_WORD;
        let Some(w) = self.bits.get_mut(word) else {
            return false;
        };
        let present = *w & (1u64 << bit) != 0;
        *w &= !(1u64 << bit);
        self.trim();
        present
    }

    /// Check whether the set contains a resource ID.
    pub fn contains(&self, id: ResourceId) -> bool {
        let word = id.0 as usize / Self::BITS_PER_WORD;
        let bit = id.0 as usize % Self::BITS_PER_WORD;
        word < self.bits.len() && (self.bits[word] & (1u64 << bit)) != 0
    }

    /// Return the union of two sets (`self | other`).
    pub fn union(&self, other: &Self) -> Self {
        let max_len = self.bits.len().max(other.bits.len());
        let mut bits = Vec::with_capacity(max_len);
        for i in 0..max_len {
            let a = self.bits.get(i).copied().unwrap_or(0);
            let b = other.bits.get(i).copied().unwrap_or(0);
            bits.push(a | b);
        }
        Self { bits }
    }

    /// Return the intersection of two sets (`self & other`).
    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = Self {
            bits: self
                .bits
                .iter()
                .zip(&other.bits)
                .map(|(a, b)| a & b)
                .collect(),
        };
        out.trim();
        out
    }

    /// Return the set difference (`self - other`).
    pub fn difference(&self, other: &Self) -> Self {
        let mut out = Self {
            bits: self
                .bits
                .iter()
                .enumerate()
                .map(|(i, a)| a & !other.bits.get(i).copied().unwrap_or(0))
                .collect(),
        };
        out.trim();
        out
    }

    /// Whether the two sets share at least one resource.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.bits.iter().zip(&other.bits).any(|(a, b)| a & b != 0)
    }

    /// Check whether `self` is a subset of `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.bits
            .iter()
            .enumerate()
            .all(|(i, a)| a & !other.bits.get(i).copied().unwrap_or(0) == 0)
    }

    /// Returns `true` if the set contains no resources.
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Returns the number of resources in the set.
    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over the resource IDs in the set, in ascending order.
    pub fn iter(&self) -> ResourceSetIter<'_> {
        ResourceSetIter {
            bits: &self.bits,
            word_idx: 0,
            bit_idx: 0,
        }
    }

    fn trim(&mut self) {
        while self.bits.last() == Some(&0) {
            self.bits.pop();
        }
    }
}

impl PartialEq for ResourceSet {
    fn eq(&self, other: &Self) -> bool {
        let max_len = self.bits.len().max(other.bits.len());
        (0..max_len).all(|i| {
            self.bits.get(i).copied().unwrap_or(0) == other.bits.get(i).copied().unwrap_or(0)
        })
    }
}

impl Eq for ResourceSet {}

impl FromIterator<ResourceId> for ResourceSet {
    fn from_iter<I: IntoIterator<Item = ResourceId>>(iter: I) -> Self {
        let mut set = Self::empty();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl<'a> IntoIterator for &'a ResourceSet {
    type Item = ResourceId;
    type IntoIter = ResourceSetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over resource IDs in a [`ResourceSet`], in ascending order.
pub struct ResourceSetIter<'a> {
    bits: &'a [u64],
    word_idx: usize,
    bit_idx: usize,
}

impl Iterator for ResourceSetIter<'_> {
    type Item = ResourceId;

    fn next(&mut self) -> Option<Self::Item> {
        while self.word_idx < self.bits.len() {
            let word = self.bits[self.word_idx];
            while self.bit_idx < 64 {
                let bit = self.bit_idx;
                self.bit_idx += 1;
                if word & (1u64 << bit) != 0 {
                    return Some(ResourceId((self.word_idx * 64 + bit) as u32));
                }
            }
            self.word_idx += 1;
            self.bit_idx = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_resource_set() -> impl Strategy<Value = ResourceSet> {
        prop::collection::vec(0u32..192, 0..32)
            .prop_map(|ids| ids.into_iter().map(ResourceId).collect::<ResourceSet>())
    }

    #[test]
    fn iteration_is_ascending_regardless_of_insert_order() {
        let set: ResourceSet = [ResourceId(70), ResourceId(3), ResourceId(64), ResourceId(0)]
            .into_iter()
            .collect();
        let ids: Vec<u32> = set.iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![0, 3, 64, 70]);
    }

    #[test]
    fn remove_trims_trailing_words() {
        let mut set: ResourceSet = [ResourceId(1), ResourceId(130)].into_iter().collect();
        assert!(set.remove(ResourceId(130)));
        assert!(!set.remove(ResourceId(130)));
        assert_eq!(set, [ResourceId(1)].into_iter().collect());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn empty_sets_compare_equal_regardless_of_capacity() {
        let mut a = ResourceSet::empty();
        a.insert(ResourceId(200));
        a.remove(ResourceId(200));
        assert_eq!(a, ResourceSet::empty());
        assert!(a.is_empty());
    }

    proptest! {
        #[test]
        fn union_commutative(a in arb_resource_set(), b in arb_resource_set()) {
            prop_assert_eq!(a.union(&b), b.union(&a));
        }

        #[test]
        fn intersection_commutative(a in arb_resource_set(), b in arb_resource_set()) {
            prop_assert_eq!(a.intersection(&b), b.intersection(&a));
        }

        #[test]
        fn union_identity(a in arb_resource_set()) {
            prop_assert_eq!(a.union(&ResourceSet::empty()), a.clone());
        }

        #[test]
        fn difference_removes_common(a in arb_resource_set(), b in arb_resource_set()) {
            let diff = a.difference(&b);
            for id in diff.iter() {
                prop_assert!(a.contains(id), "diff element {id:?} not in a");
                prop_assert!(!b.contains(id), "diff element {id:?} in b");
            }
            prop_assert_eq!(diff.union(&a.intersection(&b)), a.clone());
        }

        #[test]
        fn overlaps_matches_intersection(a in arb_resource_set(), b in arb_resource_set()) {
            prop_assert_eq!(a.overlaps(&b), !a.intersection(&b).is_empty());
        }

        #[test]
        fn subset_of_union(a in arb_resource_set(), b in arb_resource_set()) {
            prop_assert!(a.is_subset(&a.union(&b)));
            prop_assert!(ResourceSet::empty().is_subset(&a));
        }

        #[test]
        fn len_matches_iter_count(a in arb_resource_set()) {
            prop_assert_eq!(a.len(), a.iter().count());
        }
    }
}
