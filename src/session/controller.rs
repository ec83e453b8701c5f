use std::sync::Arc;

use rand::rngs::SmallRng;
use tracing::{debug, warn};

use super::rules::{Resolution, SessionAction, SessionError, SessionRules};
use super::state::{Bucket, Phase, SessionEvent, SessionState};
use super::summary::ResultsSummary;
use crate::catalog::{Card, CardId, Catalog};
use crate::config::SessionConfig;

/// 单一会话实例：持有状态、目录与随机数源。
///
/// Every mutation goes through `&mut self`, so a session has exactly one writer.
/// Operations run on a scratch copy of the state that is committed only on success.
pub struct Session {
    catalog: Arc<Catalog>,
    state: SessionState,
    rng: SmallRng,
}

impl Session {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_catalog(config.catalog(), config)
    }

    pub fn with_catalog(catalog: Arc<Catalog>, config: &SessionConfig) -> Self {
        Self {
            catalog,
            state: SessionState::default(),
            rng: config.make_rng(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.catalog.get(card_id)
    }

    pub fn apply(&mut self, action: &SessionAction) -> Result<Vec<SessionEvent>, SessionError> {
        let rules = SessionRules::new(&self.catalog);
        let mut scratch = self.state.clone();
        match rules.apply(&mut scratch, &mut self.rng, action) {
            Ok(events) => {
                debug_assert!(
                    is_forward_or_reset(self.state.phase, scratch.phase),
                    "phase moved backwards: {} -> {}",
                    self.state.phase,
                    scratch.phase
                );
                debug!(?action, phase = %scratch.phase, events = events.len(), "operation applied");
                self.state = scratch;
                Ok(events)
            }
            Err(error) => {
                warn!(?action, phase = %self.state.phase, %error, "operation rejected");
                Err(error)
            }
        }
    }

    /// Applies a recorded operation log, stopping at the first failure.
    pub fn replay<'a>(
        &mut self,
        actions: impl IntoIterator<Item = &'a SessionAction>,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        let mut events = Vec::new();
        for action in actions {
            events.extend(self.apply(action)?);
        }
        Ok(events)
    }

    pub fn resolve(&mut self, action: &SessionAction) -> Result<Resolution, SessionError> {
        let events = self.apply(action)?;
        Ok(Resolution::new(self.state.clone(), events))
    }

    pub fn begin(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        self.apply(&SessionAction::Begin)
    }

    pub fn classify(
        &mut self,
        card_id: &str,
        bucket: Bucket,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        self.apply(&SessionAction::Classify {
            card_id: card_id.to_string(),
            bucket,
        })
    }

    pub fn unclassify(&mut self, card_id: &str) -> Result<Vec<SessionEvent>, SessionError> {
        self.apply(&SessionAction::Unclassify {
            card_id: card_id.to_string(),
        })
    }

    pub fn advance_to_ranking(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        self.apply(&SessionAction::AdvanceToRanking)
    }

    pub fn narrow_selection(&mut self, remove: &[CardId]) -> Result<Vec<SessionEvent>, SessionError> {
        self.apply(&SessionAction::NarrowSelection {
            remove: remove.to_vec(),
        })
    }

    pub fn narrow_to(&mut self, keep: &[CardId]) -> Result<Vec<SessionEvent>, SessionError> {
        self.apply(&SessionAction::NarrowTo {
            keep: keep.to_vec(),
        })
    }

    pub fn place_at(
        &mut self,
        card_id: &str,
        tier: u8,
        position: u8,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        self.apply(&SessionAction::PlaceAt {
            card_id: card_id.to_string(),
            tier,
            position,
        })
    }

    pub fn remove_from(&mut self, tier: u8, position: u8) -> Result<Vec<SessionEvent>, SessionError> {
        self.apply(&SessionAction::RemoveFrom { tier, position })
    }

    pub fn reorder(&mut self, order: &[CardId]) -> Result<Vec<SessionEvent>, SessionError> {
        self.apply(&SessionAction::Reorder {
            order: order.to_vec(),
        })
    }

    pub fn reset(&mut self) -> Vec<SessionEvent> {
        let rules = SessionRules::new(&self.catalog);
        rules.reset(&mut self.state)
    }

    pub fn can_advance_to_ranking(&self) -> bool {
        SessionRules::can_advance_to_ranking(&self.state)
    }

    pub fn narrowing_excess(&self) -> usize {
        SessionRules::narrowing_excess(&self.state)
    }

    pub fn filled_count(&self) -> usize {
        self.state.pyramid_slots.filled_count()
    }

    pub fn summary(&self) -> Result<ResultsSummary, SessionError> {
        ResultsSummary::from_state(&self.state)
    }

    /// Replaces the state wholesale (used when restoring a persisted record).
    pub fn restore(&mut self, state: SessionState) -> Result<(), SessionError> {
        SessionRules::new(&self.catalog).ensure_integrity(&state)?;
        self.state = state;
        Ok(())
    }
}

/// Phases only advance in order, except a reset back to intro.
fn is_forward_or_reset(before: Phase, after: Phase) -> bool {
    before == after || after == Phase::Intro || before.precedes(after)
}
