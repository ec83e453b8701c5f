use serde::{Deserialize, Serialize};

use super::pyramid::layout_address;
use super::rules::SessionError;
use super::state::{Phase, SessionState};
use crate::catalog::Card;

pub const SHARE_TITLE: &str = "My Core Values";
pub const SHARE_TAGLINE: &str = "I discovered my core values!";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RankedValue {
    /// 1-based; rank 1 is the top of the pyramid.
    pub rank: usize,
    pub tier: u8,
    pub position: u8,
    pub card: Card,
}

/// 结果页的可分享摘要。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultsSummary {
    pub ranked: Vec<RankedValue>,
    pub share_text: String,
}

impl ResultsSummary {
    pub fn from_state(state: &SessionState) -> Result<Self, SessionError> {
        if state.phase != Phase::Results {
            return Err(SessionError::InvalidPhase {
                expected: vec![Phase::Results],
                actual: state.phase,
            });
        }

        let mut ranked = Vec::with_capacity(state.slots().len());
        for (index, slot) in state.slots().iter().enumerate() {
            let Some(card_id) = slot.card_id.as_deref() else {
                continue;
            };
            let card = state
                .high_card(card_id)
                .cloned()
                .ok_or_else(|| SessionError::UnknownCard {
                    card_id: card_id.to_string(),
                })?;
            let (tier, position) = layout_address(index).unwrap_or((slot.tier, slot.position));
            ranked.push(RankedValue {
                rank: ranked.len() + 1,
                tier,
                position,
                card,
            });
        }

        let share_text = share_text(&ranked);
        Ok(Self { ranked, share_text })
    }

    pub fn top_value(&self) -> Option<&Card> {
        self.ranked.first().map(|value| &value.card)
    }

    pub fn tier(&self, tier: u8) -> impl Iterator<Item = &RankedValue> {
        self.ranked.iter().filter(move |value| value.tier == tier)
    }
}

fn share_text(ranked: &[RankedValue]) -> String {
    let mut text = String::from(SHARE_TITLE);
    for value in ranked {
        text.push('\n');
        text.push_str(&format!("{}. {}", value.rank, value.card.name));
    }
    text.push_str("\n\n");
    text.push_str(SHARE_TAGLINE);
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::session::rules::SessionRules;
    use crate::session::state::Bucket;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn completed() -> SessionState {
        let catalog = Catalog::standard();
        let rules = SessionRules::new(&catalog);
        let mut state = SessionState::new();
        rules
            .begin(&mut state, &mut SmallRng::seed_from_u64(3))
            .expect("begin should succeed");
        for (index, card) in catalog.cards().iter().enumerate() {
            let bucket = if index < 10 { Bucket::High } else { Bucket::Maybe };
            rules
                .classify(&mut state, &card.id, bucket)
                .expect("classify should succeed");
        }
        rules
            .advance_to_ranking(&mut state)
            .expect("advance should succeed");
        for (index, card) in catalog.cards()[..10].iter().rev().enumerate() {
            let (tier, position) = layout_address(index).expect("slot should exist");
            rules
                .place_at(&mut state, &card.id, tier, position)
                .expect("placement should succeed");
        }
        state
    }

    #[test]
    fn summary_lists_values_top_down() {
        let summary = ResultsSummary::from_state(&completed()).expect("summary should build");
        assert_eq!(summary.ranked.len(), 10);
        // Placed in reverse catalog order, so the tenth standard value is on top.
        assert_eq!(summary.top_value().map(|card| card.name.as_str()), Some("HONESTY"));
        assert_eq!(summary.tier(3).count(), 4);
        assert!(summary.share_text.starts_with("My Core Values\n1. HONESTY\n2. INTEGRITY"));
        assert!(summary.share_text.ends_with("10. FAMILY\n\nI discovered my core values!"));
    }

    #[test]
    fn summary_is_only_available_in_results() {
        let error = ResultsSummary::from_state(&SessionState::new()).unwrap_err();
        assert!(matches!(error, SessionError::InvalidPhase { .. }));
    }
}
