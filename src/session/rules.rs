use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    partition::{self, IntegrityError},
    pyramid::{layout_address, slot_index, Placement, Pyramid, SLOT_COUNT},
    state::{Bucket, Location, Phase, SessionEvent, SessionState},
};
use crate::catalog::{CardId, Catalog};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum Precondition {
    #[error("{remaining} cards are still in the deck")]
    DeckNotEmpty { remaining: usize },
    #[error("no card was marked as highly important")]
    NoHighCards,
    #[error("high bucket holds {high_count} cards, no narrowing needed")]
    NarrowingNotRequired { high_count: usize },
    #[error("expected {expected} cards to remove, got {actual}")]
    WrongRemovalCount { expected: usize, actual: usize },
    #[error("expected {expected} cards to keep, got {actual}")]
    WrongKeepCount { expected: usize, actual: usize },
    #[error("card `{card_id}` is listed twice")]
    DuplicateId { card_id: CardId },
    #[error("card `{card_id}` is not in the high bucket")]
    NotInHighBucket { card_id: CardId },
    #[error("no slot at tier {tier}, position {position}")]
    SlotOutOfRange { tier: u8, position: u8 },
    #[error("order is not a permutation of the placed cards")]
    NotAPermutation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum SessionError {
    #[error("operation needs phase {expected:?}, session is in {actual}")]
    InvalidPhase { expected: Vec<Phase>, actual: Phase },
    #[error("precondition failed: {reason}")]
    PreconditionFailed { reason: Precondition },
    #[error("card `{card_id}` is unknown or not where the operation expects it")]
    UnknownCard { card_id: CardId },
    #[error("state violates an invariant: {error}")]
    IntegrityViolation { error: IntegrityError },
}

impl From<Precondition> for SessionError {
    fn from(reason: Precondition) -> Self {
        SessionError::PreconditionFailed { reason }
    }
}

impl From<IntegrityError> for SessionError {
    fn from(error: IntegrityError) -> Self {
        SessionError::IntegrityViolation { error }
    }
}

/// 一次可记录、可回放的会话操作。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum SessionAction {
    Begin,
    Classify { card_id: CardId, bucket: Bucket },
    Unclassify { card_id: CardId },
    AdvanceToRanking,
    NarrowSelection { remove: Vec<CardId> },
    NarrowTo { keep: Vec<CardId> },
    PlaceAt { card_id: CardId, tier: u8, position: u8 },
    RemoveFrom { tier: u8, position: u8 },
    Reorder { order: Vec<CardId> },
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub state: SessionState,
    pub events: Vec<SessionEvent>,
}

impl Resolution {
    pub fn new(state: SessionState, events: Vec<SessionEvent>) -> Self {
        Self { state, events }
    }
}

/// 会话规则：阶段守卫与所有变更操作。
///
/// Every operation validates before it mutates, so an `Err` leaves the state untouched.
pub struct SessionRules<'a> {
    catalog: &'a Catalog,
}

impl<'a> SessionRules<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    fn ensure_phase(state: &SessionState, allowed: &[Phase]) -> Result<(), SessionError> {
        if !allowed.contains(&state.phase) {
            return Err(SessionError::InvalidPhase {
                expected: allowed.to_vec(),
                actual: state.phase,
            });
        }
        Ok(())
    }

    fn ensure_known(&self, card_id: &str) -> Result<(), SessionError> {
        if !self.catalog.contains(card_id) {
            return Err(SessionError::UnknownCard {
                card_id: card_id.to_string(),
            });
        }
        Ok(())
    }

    fn ensure_distinct(ids: &[CardId]) -> Result<(), SessionError> {
        let mut seen = HashSet::new();
        for card_id in ids {
            if !seen.insert(card_id.as_str()) {
                return Err(Precondition::DuplicateId {
                    card_id: card_id.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn ensure_in_high(&self, state: &SessionState, ids: &[CardId]) -> Result<(), SessionError> {
        for card_id in ids {
            self.ensure_known(card_id)?;
            if state.high_card(card_id).is_none() {
                return Err(Precondition::NotInHighBucket {
                    card_id: card_id.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn target_slot(tier: u8, position: u8) -> Result<usize, SessionError> {
        slot_index(tier, position)
            .ok_or_else(|| Precondition::SlotOutOfRange { tier, position }.into())
    }

    /// Host-supplied states may carry a truncated or shuffled slot list.
    fn ensure_pyramid(state: &SessionState) -> Result<(), SessionError> {
        if !state.pyramid_slots.is_well_formed() {
            return Err(IntegrityError::MalformedPyramid.into());
        }
        Ok(())
    }

    pub fn ensure_integrity(&self, state: &SessionState) -> Result<(), SessionError> {
        partition::check_state(self.catalog, state).map_err(SessionError::from)
    }

    pub fn begin<R: Rng + ?Sized>(
        &self,
        state: &mut SessionState,
        rng: &mut R,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        Self::ensure_phase(state, &[Phase::Intro])?;

        let mut deck = self.catalog.cards().to_vec();
        deck.shuffle(rng);
        let deck_size = deck.len();

        *state = SessionState {
            phase: Phase::Triage,
            deck,
            ..SessionState::default()
        };
        info!(deck_size, "session started");

        Ok(vec![SessionEvent::SessionStarted { deck_size }])
    }

    pub fn classify(
        &self,
        state: &mut SessionState,
        card_id: &str,
        bucket: Bucket,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        Self::ensure_phase(state, &[Phase::Triage])?;
        self.ensure_known(card_id)?;

        if state.bucket_of(card_id) == Some(bucket) {
            return Ok(Vec::new());
        }

        let (card, from) = state
            .take_from_triage(card_id)
            .ok_or_else(|| SessionError::UnknownCard {
                card_id: card_id.to_string(),
            })?;
        state.bucket_mut(bucket).push(card);

        Ok(vec![SessionEvent::CardClassified {
            card_id: card_id.to_string(),
            from,
            to: bucket,
        }])
    }

    pub fn unclassify(
        &self,
        state: &mut SessionState,
        card_id: &str,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        Self::ensure_phase(state, &[Phase::Triage])?;
        self.ensure_known(card_id)?;

        let Some(from) = state.bucket_of(card_id) else {
            return Ok(Vec::new());
        };
        if let Some((card, _)) = state.take_from_triage(card_id) {
            state.deck.push(card);
        }

        Ok(vec![SessionEvent::CardReturnedToDeck {
            card_id: card_id.to_string(),
            from,
        }])
    }

    pub fn can_advance_to_ranking(state: &SessionState) -> bool {
        state.phase == Phase::Triage && state.deck.is_empty() && !state.bucket_high.is_empty()
    }

    pub fn advance_to_ranking(
        &self,
        state: &mut SessionState,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        Self::ensure_phase(state, &[Phase::Triage])?;
        if !state.deck.is_empty() {
            return Err(Precondition::DeckNotEmpty {
                remaining: state.deck.len(),
            }
            .into());
        }
        if state.bucket_high.is_empty() {
            return Err(Precondition::NoHighCards.into());
        }

        let high_count = state.bucket_high.len();
        if high_count > SLOT_COUNT {
            state.phase = Phase::Narrow;
            info!(high_count, "narrowing required before ranking");
            return Ok(vec![SessionEvent::NarrowingRequired {
                high_count,
                excess: high_count - SLOT_COUNT,
            }]);
        }

        Ok(vec![Self::enter_ranking(state)])
    }

    /// How many high cards must go before ranking can start.
    pub fn narrowing_excess(state: &SessionState) -> usize {
        state.bucket_high.len().saturating_sub(SLOT_COUNT)
    }

    pub fn narrow_selection(
        &self,
        state: &mut SessionState,
        remove: &[CardId],
    ) -> Result<Vec<SessionEvent>, SessionError> {
        Self::ensure_phase(state, &[Phase::Narrow])?;
        let high_count = state.bucket_high.len();
        if high_count <= SLOT_COUNT {
            return Err(Precondition::NarrowingNotRequired { high_count }.into());
        }
        let expected = high_count - SLOT_COUNT;
        if remove.len() != expected {
            return Err(Precondition::WrongRemovalCount {
                expected,
                actual: remove.len(),
            }
            .into());
        }
        Self::ensure_distinct(remove)?;
        self.ensure_in_high(state, remove)?;

        state
            .bucket_high
            .retain(|card| !remove.iter().any(|card_id| *card_id == card.id));

        let mut events = vec![SessionEvent::SelectionNarrowed {
            removed: remove.to_vec(),
        }];
        events.push(Self::enter_ranking(state));
        Ok(events)
    }

    /// Keep-selection form of narrowing: name the ten cards to keep.
    pub fn narrow_to(
        &self,
        state: &mut SessionState,
        keep: &[CardId],
    ) -> Result<Vec<SessionEvent>, SessionError> {
        Self::ensure_phase(state, &[Phase::Narrow])?;
        if keep.len() != SLOT_COUNT {
            return Err(Precondition::WrongKeepCount {
                expected: SLOT_COUNT,
                actual: keep.len(),
            }
            .into());
        }
        Self::ensure_distinct(keep)?;
        self.ensure_in_high(state, keep)?;

        let remove: Vec<CardId> = state
            .bucket_high
            .iter()
            .filter(|card| !keep.contains(&card.id))
            .map(|card| card.id.clone())
            .collect();
        self.narrow_selection(state, &remove)
    }

    fn enter_ranking(state: &mut SessionState) -> SessionEvent {
        state.unplaced = state.bucket_high.clone();
        state.pyramid_slots = Pyramid::new();
        state.phase = Phase::Rank;
        let candidates = state.unplaced.len();
        info!(candidates, "ranking started");
        SessionEvent::RankingStarted { candidates }
    }

    pub fn place_at(
        &self,
        state: &mut SessionState,
        card_id: &str,
        tier: u8,
        position: u8,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        Self::ensure_phase(state, &[Phase::Rank])?;
        Self::ensure_pyramid(state)?;
        let target = Self::target_slot(tier, position)?;

        let from = match state.locate(card_id) {
            Some(location @ (Location::Unplaced | Location::Slot { .. })) => location,
            _ => {
                return Err(SessionError::UnknownCard {
                    card_id: card_id.to_string(),
                })
            }
        };

        // Resolve the occupant before touching anything so a failure leaves the state intact.
        let occupant = match state.slots().get(target).and_then(|slot| slot.card_id.as_deref()) {
            Some(other) if other != card_id => Some(
                state
                    .high_card(other)
                    .cloned()
                    .ok_or_else(|| SessionError::UnknownCard {
                        card_id: other.to_string(),
                    })?,
            ),
            _ => None,
        };

        if from == Location::Unplaced {
            state.take_unplaced(card_id);
        }

        let mut events = Vec::new();
        let placement = state
            .pyramid_slots
            .place(card_id, target)
            .ok_or(IntegrityError::MalformedPyramid)?;
        match placement {
            Placement::Unchanged => return Ok(events),
            Placement::Moved { displaced, .. } => {
                events.push(SessionEvent::CardPlaced {
                    card_id: card_id.to_string(),
                    from,
                    tier,
                    position,
                });
                if let (Some((other_id, swapped_into)), Some(other_card)) = (displaced, occupant) {
                    let to = match swapped_into.and_then(layout_address) {
                        Some((tier, position)) => Location::Slot { tier, position },
                        None => {
                            state.unplaced.push(other_card);
                            Location::Unplaced
                        }
                    };
                    events.push(SessionEvent::CardDisplaced {
                        card_id: other_id,
                        from_tier: tier,
                        from_position: position,
                        to,
                    });
                }
            }
        }

        Self::finish_if_complete(state, &mut events);
        Ok(events)
    }

    pub fn remove_from(
        &self,
        state: &mut SessionState,
        tier: u8,
        position: u8,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        Self::ensure_phase(state, &[Phase::Rank])?;
        Self::ensure_pyramid(state)?;
        let index = Self::target_slot(tier, position)?;

        let Some(card_id) = state.slots().get(index).and_then(|slot| slot.card_id.clone()) else {
            return Ok(Vec::new());
        };
        let card = state
            .high_card(&card_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownCard {
                card_id: card_id.clone(),
            })?;

        state.pyramid_slots.clear(index);
        state.unplaced.push(card);

        Ok(vec![SessionEvent::CardRemoved {
            card_id,
            tier,
            position,
        }])
    }

    /// Re-ranks the placed cards: `order[i]` lands on the slot of rank `i + 1`.
    ///
    /// `order` must be a permutation of exactly the currently placed ids; the
    /// cards are packed from the top slot down.
    pub fn reorder(
        &self,
        state: &mut SessionState,
        order: &[CardId],
    ) -> Result<Vec<SessionEvent>, SessionError> {
        Self::ensure_phase(state, &[Phase::Rank])?;
        Self::ensure_pyramid(state)?;
        Self::ensure_distinct(order)?;

        let placed = state.pyramid_slots.placed_ids();
        if order.len() != placed.len() || order.iter().any(|card_id| !placed.contains(card_id)) {
            return Err(Precondition::NotAPermutation.into());
        }

        state.pyramid_slots.relayout(order);
        let mut events = vec![SessionEvent::PyramidReordered {
            order: order.to_vec(),
        }];
        Self::finish_if_complete(state, &mut events);
        Ok(events)
    }

    fn finish_if_complete(state: &mut SessionState, events: &mut Vec<SessionEvent>) {
        if state.phase == Phase::Rank && state.is_pyramid_complete() {
            state.phase = Phase::Results;
            info!("pyramid complete, results reached");
            events.push(SessionEvent::ResultsReached);
        }
    }

    pub fn reset(&self, state: &mut SessionState) -> Vec<SessionEvent> {
        *state = SessionState::default();
        info!("session reset");
        vec![SessionEvent::SessionReset]
    }

    pub fn apply<R: Rng + ?Sized>(
        &self,
        state: &mut SessionState,
        rng: &mut R,
        action: &SessionAction,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        match action {
            SessionAction::Begin => self.begin(state, rng),
            SessionAction::Classify { card_id, bucket } => self.classify(state, card_id, *bucket),
            SessionAction::Unclassify { card_id } => self.unclassify(state, card_id),
            SessionAction::AdvanceToRanking => self.advance_to_ranking(state),
            SessionAction::NarrowSelection { remove } => self.narrow_selection(state, remove),
            SessionAction::NarrowTo { keep } => self.narrow_to(state, keep),
            SessionAction::PlaceAt {
                card_id,
                tier,
                position,
            } => self.place_at(state, card_id, *tier, *position),
            SessionAction::RemoveFrom { tier, position } => {
                self.remove_from(state, *tier, *position)
            }
            SessionAction::Reorder { order } => self.reorder(state, order),
            SessionAction::Reset => Ok(self.reset(state)),
        }
    }
}
