use std::fmt;

use serde::{Deserialize, Serialize};

use super::pyramid::{Pyramid, PyramidSlot};
use crate::catalog::{Card, CardId};

/// 会话阶段。只能按顺序前进，或通过重置回到 `Intro`。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Intro,
    Triage,
    Narrow,
    Rank,
    Results,
}

impl Phase {
    fn ordinal(self) -> u8 {
        match self {
            Phase::Intro => 0,
            Phase::Triage => 1,
            Phase::Narrow => 2,
            Phase::Rank => 3,
            Phase::Results => 4,
        }
    }

    /// Whether moving from `self` to `next` goes forward (reset excluded).
    pub fn precedes(self, next: Phase) -> bool {
        self.ordinal() < next.ordinal()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Intro => "intro",
            Phase::Triage => "triage",
            Phase::Narrow => "narrow",
            Phase::Rank => "rank",
            Phase::Results => "results",
        };
        f.write_str(name)
    }
}

/// 分拣桶。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    High,
    Maybe,
    Low,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::High, Bucket::Maybe, Bucket::Low];
}

impl std::str::FromStr for Bucket {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "high" | "veryimportant" => Ok(Bucket::High),
            "maybe" | "notsure" => Ok(Bucket::Maybe),
            "low" | "notimportant" => Ok(Bucket::Low),
            _ => Err(()),
        }
    }
}

/// Where a card currently lives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Location {
    Deck,
    Bucket { bucket: Bucket },
    Unplaced,
    Slot { tier: u8, position: u8 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum SessionEvent {
    SessionStarted {
        deck_size: usize,
    },
    CardClassified {
        card_id: CardId,
        from: Location,
        to: Bucket,
    },
    CardReturnedToDeck {
        card_id: CardId,
        from: Bucket,
    },
    NarrowingRequired {
        high_count: usize,
        excess: usize,
    },
    SelectionNarrowed {
        removed: Vec<CardId>,
    },
    RankingStarted {
        candidates: usize,
    },
    CardPlaced {
        card_id: CardId,
        from: Location,
        tier: u8,
        position: u8,
    },
    CardDisplaced {
        card_id: CardId,
        from_tier: u8,
        from_position: u8,
        to: Location,
    },
    CardRemoved {
        card_id: CardId,
        tier: u8,
        position: u8,
    },
    PyramidReordered {
        order: Vec<CardId>,
    },
    ResultsReached,
    SessionReset,
}

/// 会话的完整可观察状态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionState {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub deck: Vec<Card>,
    #[serde(default)]
    pub bucket_high: Vec<Card>,
    #[serde(default)]
    pub bucket_maybe: Vec<Card>,
    #[serde(default)]
    pub bucket_low: Vec<Card>,
    #[serde(default)]
    pub pyramid_slots: Pyramid,
    #[serde(default)]
    pub unplaced: Vec<Card>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: Phase::Intro,
            deck: Vec::new(),
            bucket_high: Vec::new(),
            bucket_maybe: Vec::new(),
            bucket_low: Vec::new(),
            pyramid_slots: Pyramid::new(),
            unplaced: Vec::new(),
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn bucket(&self, bucket: Bucket) -> &[Card] {
        match bucket {
            Bucket::High => &self.bucket_high,
            Bucket::Maybe => &self.bucket_maybe,
            Bucket::Low => &self.bucket_low,
        }
    }

    pub fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<Card> {
        match bucket {
            Bucket::High => &mut self.bucket_high,
            Bucket::Maybe => &mut self.bucket_maybe,
            Bucket::Low => &mut self.bucket_low,
        }
    }

    pub fn bucket_of(&self, card_id: &str) -> Option<Bucket> {
        Bucket::ALL
            .into_iter()
            .find(|bucket| self.bucket(*bucket).iter().any(|card| card.id == card_id))
    }

    pub fn slots(&self) -> &[PyramidSlot] {
        self.pyramid_slots.slots()
    }

    /// Finds the card wherever it is. Ranking keeps the high bucket filled
    /// beside the pool and the pyramid, so those two are searched first.
    pub fn locate(&self, card_id: &str) -> Option<Location> {
        if self.unplaced.iter().any(|card| card.id == card_id) {
            return Some(Location::Unplaced);
        }
        if let Some(slot) = self.pyramid_slots.find(card_id) {
            return Some(Location::Slot {
                tier: slot.tier,
                position: slot.position,
            });
        }
        if self.deck.iter().any(|card| card.id == card_id) {
            return Some(Location::Deck);
        }
        self.bucket_of(card_id)
            .map(|bucket| Location::Bucket { bucket })
    }

    /// Removes the card from the deck or whichever bucket holds it.
    pub(crate) fn take_from_triage(&mut self, card_id: &str) -> Option<(Card, Location)> {
        if let Some(index) = self.deck.iter().position(|card| card.id == card_id) {
            return Some((self.deck.remove(index), Location::Deck));
        }
        let bucket = self.bucket_of(card_id)?;
        let cards = self.bucket_mut(bucket);
        let index = cards.iter().position(|card| card.id == card_id)?;
        Some((cards.remove(index), Location::Bucket { bucket }))
    }

    pub(crate) fn take_unplaced(&mut self, card_id: &str) -> Option<Card> {
        let index = self.unplaced.iter().position(|card| card.id == card_id)?;
        Some(self.unplaced.remove(index))
    }

    pub fn high_card(&self, card_id: &str) -> Option<&Card> {
        self.bucket_high.iter().find(|card| card.id == card_id)
    }

    pub fn is_pyramid_complete(&self) -> bool {
        self.pyramid_slots.is_complete()
    }
}
