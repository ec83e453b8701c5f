//! 十格金字塔：层级布局、按坐标放置（含交换）以及按名次重排。

use serde::{Deserialize, Serialize};

use crate::catalog::CardId;

/// Tier sizes from the top of the pyramid down.
pub const TIER_SIZES: [usize; 4] = [1, 2, 3, 4];
pub const SLOT_COUNT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PyramidSlot {
    pub tier: u8,
    pub position: u8,
    #[serde(default)]
    pub card_id: Option<CardId>,
}

impl PyramidSlot {
    fn empty(tier: u8, position: u8) -> Self {
        Self {
            tier,
            position,
            card_id: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.card_id.is_none()
    }
}

/// Result of moving a card onto a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// The card already sat on the target slot.
    Unchanged,
    Moved {
        source: Option<usize>,
        /// The card that occupied the target, and the slot it was swapped into.
        /// `None` for the slot means the caller must return it to the unplaced pool.
        displaced: Option<(CardId, Option<usize>)>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Pyramid {
    slots: Vec<PyramidSlot>,
}

impl Default for Pyramid {
    fn default() -> Self {
        Self::new()
    }
}

impl Pyramid {
    pub fn new() -> Self {
        let slots = (0..SLOT_COUNT)
            .filter_map(layout_address)
            .map(|(tier, position)| PyramidSlot::empty(tier, position))
            .collect();
        Self { slots }
    }

    pub fn slots(&self) -> &[PyramidSlot] {
        &self.slots
    }

    pub fn slot(&self, tier: u8, position: u8) -> Option<&PyramidSlot> {
        slot_index(tier, position).and_then(|index| self.slots.get(index))
    }

    pub fn find(&self, card_id: &str) -> Option<&PyramidSlot> {
        self.slots
            .iter()
            .find(|slot| slot.card_id.as_deref() == Some(card_id))
    }

    pub fn index_of_card(&self, card_id: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.card_id.as_deref() == Some(card_id))
    }

    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_empty()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.len() == SLOT_COUNT && self.slots.iter().all(|slot| !slot.is_empty())
    }

    /// Placed card ids in layout order (top slot first).
    pub fn placed_ids(&self) -> Vec<CardId> {
        self.slots
            .iter()
            .filter_map(|slot| slot.card_id.clone())
            .collect()
    }

    /// Ten slots, each at the address its index implies.
    pub fn is_well_formed(&self) -> bool {
        self.slots.len() == SLOT_COUNT
            && self
                .slots
                .iter()
                .enumerate()
                .all(|(index, slot)| layout_address(index) == Some((slot.tier, slot.position)))
    }

    /// `None` when `target` is not a slot of this pyramid.
    pub(crate) fn place(&mut self, card_id: &str, target: usize) -> Option<Placement> {
        let source = self.index_of_card(card_id);
        if source == Some(target) {
            return Some(Placement::Unchanged);
        }

        let other = self.slots.get_mut(target)?.card_id.replace(card_id.to_string());
        if let Some(slot) = source.and_then(|index| self.slots.get_mut(index)) {
            slot.card_id = other.clone();
        }

        Some(Placement::Moved {
            source,
            displaced: other.map(|other_id| (other_id, source)),
        })
    }

    pub(crate) fn clear(&mut self, index: usize) -> Option<CardId> {
        self.slots.get_mut(index).and_then(|slot| slot.card_id.take())
    }

    /// Lays `order` into the first `order.len()` slots; the rest become empty.
    pub(crate) fn relayout(&mut self, order: &[CardId]) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.card_id = order.get(index).cloned();
        }
    }
}

/// `(tier, position)` -> slot index, or `None` when the address is outside the pyramid.
pub fn slot_index(tier: u8, position: u8) -> Option<usize> {
    let tier = tier as usize;
    let size = *TIER_SIZES.get(tier)?;
    if position as usize >= size {
        return None;
    }
    let offset: usize = TIER_SIZES[..tier].iter().sum();
    Some(offset + position as usize)
}

/// Slot index (= rank - 1) -> `(tier, position)`.
pub fn layout_address(index: usize) -> Option<(u8, u8)> {
    let mut remaining = index;
    for (tier, size) in TIER_SIZES.iter().enumerate() {
        if remaining < *size {
            return Some((tier as u8, remaining as u8));
        }
        remaining -= size;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_has_tiers_of_one_two_three_four() {
        let pyramid = Pyramid::new();
        assert!(pyramid.is_well_formed());
        for (tier, size) in TIER_SIZES.iter().enumerate() {
            let count = pyramid
                .slots()
                .iter()
                .filter(|slot| slot.tier as usize == tier)
                .count();
            assert_eq!(count, *size, "tier {tier} should have {size} slots");
        }
    }

    #[test]
    fn rank_index_maps_to_tier_and_position() {
        assert_eq!(layout_address(0), Some((0, 0)));
        assert_eq!(layout_address(2), Some((1, 1)));
        assert_eq!(layout_address(3), Some((2, 0)));
        assert_eq!(layout_address(9), Some((3, 3)));
        assert_eq!(layout_address(10), None);

        assert_eq!(slot_index(2, 2), Some(5));
        assert_eq!(slot_index(0, 1), None);
        assert_eq!(slot_index(4, 0), None);
    }

    #[test]
    fn placing_onto_empty_slot_moves_the_card() {
        let mut pyramid = Pyramid::new();
        let outcome = pyramid.place("a", 0);
        assert_eq!(
            outcome,
            Some(Placement::Moved {
                source: None,
                displaced: None
            })
        );

        let outcome = pyramid.place("a", 4);
        assert_eq!(
            outcome,
            Some(Placement::Moved {
                source: Some(0),
                displaced: None
            })
        );
        assert!(pyramid.slots()[0].is_empty());
        assert_eq!(pyramid.find("a").map(|slot| (slot.tier, slot.position)), Some((2, 1)));
    }

    #[test]
    fn moving_between_occupied_slots_swaps() {
        let mut pyramid = Pyramid::new();
        pyramid.place("a", 0);
        pyramid.place("b", 9);

        let outcome = pyramid.place("b", 0);
        assert_eq!(
            outcome,
            Some(Placement::Moved {
                source: Some(9),
                displaced: Some(("a".into(), Some(9)))
            })
        );
        assert_eq!(pyramid.slots()[0].card_id.as_deref(), Some("b"));
        assert_eq!(pyramid.slots()[9].card_id.as_deref(), Some("a"));
        assert_eq!(pyramid.filled_count(), 2);
    }

    #[test]
    fn truncated_pyramid_refuses_missing_slots() {
        let mut pyramid: Pyramid = serde_json::from_str(
            r#"[{"tier":0,"position":0,"card_id":null},{"tier":1,"position":0,"card_id":null}]"#,
        )
        .expect("pyramid should parse");
        assert!(!pyramid.is_well_formed());
        assert_eq!(pyramid.place("a", 9), None);
        assert_eq!(pyramid.filled_count(), 0);
    }

    #[test]
    fn relayout_packs_cards_from_the_top() {
        let mut pyramid = Pyramid::new();
        pyramid.place("a", 7);
        pyramid.place("b", 2);
        pyramid.relayout(&["a".to_string(), "b".to_string()]);
        assert_eq!(pyramid.placed_ids(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(pyramid.slots()[0].card_id.as_deref(), Some("a"));
        assert_eq!(pyramid.slots()[1].card_id.as_deref(), Some("b"));
        assert!(pyramid.slots()[7].is_empty());
    }
}
