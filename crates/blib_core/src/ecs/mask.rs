//! Component bitsets and query masks.

use crate::ecs::{ComponentId, EcsError, MAX_COMPONENT_TYPES};
use std::fmt;

const WORDS: usize = MAX_COMPONENT_TYPES / 64;

/// Fixed-width bitset over component type ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ComponentBits([u64; WORDS]);

impl ComponentBits {
    pub const EMPTY: ComponentBits = ComponentBits([0; WORDS]);

    #[inline]
    pub fn insert(&mut self, id: ComponentId) {
        self.0[id as usize / 64] |= 1 << (id % 64);
    }

    #[inline]
    pub fn remove(&mut self, id: ComponentId) {
        self.0[id as usize / 64] &= !(1 << (id % 64));
    }

    #[inline]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.0[id as usize / 64] & (1 << (id % 64)) != 0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    /// Every bit of `other` is set in `self`.
    #[inline]
    pub fn contains_all(&self, other: &ComponentBits) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a & b == *b)
    }

    #[inline]
    pub fn intersects(&self, other: &ComponentBits) -> bool {
        self.0.iter().zip(other.0.iter()).any(|(a, b)| a & b != 0)
    }

    pub fn clear(&mut self) {
        self.0 = [0; WORDS];
    }

    pub fn count(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate set ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.0.iter().enumerate().flat_map(|(word_index, word)| {
            let mut bits = *word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros();
                bits &= bits - 1;
                Some((word_index * 64 + bit as usize) as ComponentId)
            })
        })
    }

    fn first_common(&self, other: &ComponentBits) -> Option<ComponentId> {
        let mut both = *self;
        for (a, b) in both.0.iter_mut().zip(other.0.iter()) {
            *a &= *b;
        }
        let first = both.iter().next();
        first
    }
}

impl FromIterator<ComponentId> for ComponentBits {
    fn from_iter<I: IntoIterator<Item = ComponentId>>(iter: I) -> Self {
        let mut bits = ComponentBits::EMPTY;
        for id in iter {
            bits.insert(id);
        }
        bits
    }
}

impl fmt::Debug for ComponentBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Required / excluded / optional component sets describing a query.
///
/// Optional types never affect membership; they only mark the types a
/// view's consumers may read when present.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ComponentMask {
    required: ComponentBits,
    excluded: ComponentBits,
    optional: ComponentBits,
}

impl ComponentMask {
    /// Build a mask, rejecting overlapping sets.
    pub fn new(
        required: ComponentBits,
        excluded: ComponentBits,
        optional: ComponentBits,
    ) -> Result<Self, EcsError> {
        if required.is_empty() {
            return Err(EcsError::EmptyQuery);
        }
        if let Some(component) = required.first_common(&excluded) {
            return Err(EcsError::RequiredExcludedOverlap { component });
        }
        if let Some(component) = optional.first_common(&excluded) {
            return Err(EcsError::OptionalExcludedOverlap { component });
        }
        Ok(Self {
            required,
            excluded,
            optional,
        })
    }

    #[inline]
    pub fn required(&self) -> &ComponentBits {
        &self.required
    }

    #[inline]
    pub fn excluded(&self) -> &ComponentBits {
        &self.excluded
    }

    #[inline]
    pub fn optional(&self) -> &ComponentBits {
        &self.optional
    }

    /// Whether an entity with component set `entity_bits` matches.
    #[inline]
    pub fn passes(&self, entity_bits: &ComponentBits) -> bool {
        entity_bits.contains_all(&self.required) && !entity_bits.intersects(&self.excluded)
    }

    /// Whether a change to component `id` can affect membership.
    #[inline]
    pub fn affects_membership(&self, id: ComponentId) -> bool {
        self.required.contains(id) || self.excluded.contains(id)
    }

    /// Whether the mask mentions component `id` in any set.
    #[inline]
    pub fn mentions(&self, id: ComponentId) -> bool {
        self.affects_membership(id) || self.optional.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(ids: &[ComponentId]) -> ComponentBits {
        ids.iter().copied().collect()
    }

    #[test]
    fn bitset_operations() {
        let mut set = bits(&[1, 64, 200]);
        assert!(set.contains(64));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 64, 200]);
        set.remove(64);
        assert!(!set.contains(64));
        assert_eq!(set.count(), 2);
        assert!(set.contains_all(&bits(&[1])));
        assert!(!set.contains_all(&bits(&[1, 2])));
        assert!(set.intersects(&bits(&[200, 3])));
    }

    #[test]
    fn mask_passes_required_and_excluded() {
        let mask = ComponentMask::new(bits(&[0, 1]), bits(&[2]), bits(&[3])).unwrap();
        assert!(mask.passes(&bits(&[0, 1])));
        assert!(mask.passes(&bits(&[0, 1, 3])));
        assert!(!mask.passes(&bits(&[0])));
        assert!(!mask.passes(&bits(&[0, 1, 2])));
        assert!(mask.affects_membership(2));
        assert!(!mask.affects_membership(3));
        assert!(mask.mentions(3));
    }

    #[test]
    fn overlapping_sets_are_rejected() {
        assert_eq!(
            ComponentMask::new(bits(&[0, 5]), bits(&[5]), ComponentBits::EMPTY),
            Err(EcsError::RequiredExcludedOverlap { component: 5 })
        );
        assert_eq!(
            ComponentMask::new(bits(&[0]), bits(&[7]), bits(&[7])),
            Err(EcsError::OptionalExcludedOverlap { component: 7 })
        );
        assert_eq!(
            ComponentMask::new(ComponentBits::EMPTY, bits(&[1]), ComponentBits::EMPTY),
            Err(EcsError::EmptyQuery)
        );
    }
}
