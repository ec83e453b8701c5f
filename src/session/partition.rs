//! 卡牌集合划分的不变量检查（纯函数）。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::pyramid::SLOT_COUNT;
use super::state::{Phase, SessionState};
use crate::catalog::{Card, CardId, Catalog};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum IntegrityError {
    #[error("card `{card_id}` is not in the catalog")]
    UnknownCard { card_id: CardId },
    #[error("card `{card_id}` does not match its catalog entry")]
    CardMismatch { card_id: CardId },
    #[error("card `{card_id}` appears more than once")]
    DuplicateCard { card_id: CardId },
    #[error("card `{card_id}` is missing from every container")]
    MissingCard { card_id: CardId },
    #[error("pyramid does not have the ten-slot layout")]
    MalformedPyramid,
    #[error("`{container}` must be empty during {phase}")]
    UnexpectedContents { phase: Phase, container: String },
    #[error("high bucket holds {size} cards, not allowed during {phase}")]
    HighBucketSize { phase: Phase, size: usize },
    #[error("card `{card_id}` is placed or unplaced but not in the high bucket")]
    NotRankable { card_id: CardId },
    #[error("high card `{card_id}` is neither placed nor unplaced")]
    Unranked { card_id: CardId },
    #[error("pyramid completeness does not match phase {phase}")]
    CompletionMismatch { phase: Phase },
}

/// Collects ids, failing on the first repeat.
pub fn unique_ids<'a>(
    cards: impl IntoIterator<Item = &'a Card>,
) -> Result<HashSet<&'a str>, IntegrityError> {
    let mut seen = HashSet::new();
    for card in cards {
        if !seen.insert(card.id.as_str()) {
            return Err(IntegrityError::DuplicateCard {
                card_id: card.id.clone(),
            });
        }
    }
    Ok(seen)
}

/// Every card must be a verbatim catalog entry.
pub fn check_known<'a>(
    catalog: &Catalog,
    cards: impl IntoIterator<Item = &'a Card>,
) -> Result<(), IntegrityError> {
    for card in cards {
        match catalog.get(&card.id) {
            None => {
                return Err(IntegrityError::UnknownCard {
                    card_id: card.id.clone(),
                })
            }
            Some(entry) if entry != card => {
                return Err(IntegrityError::CardMismatch {
                    card_id: card.id.clone(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// deck ∪ high ∪ maybe ∪ low must be exactly the catalog, each card once.
pub fn check_triage_partition(catalog: &Catalog, state: &SessionState) -> Result<(), IntegrityError> {
    let all = triage_cards(state);
    check_known(catalog, all.clone())?;
    let seen = unique_ids(all)?;
    if let Some(missing) = catalog
        .cards()
        .iter()
        .find(|card| !seen.contains(card.id.as_str()))
    {
        return Err(IntegrityError::MissingCard {
            card_id: missing.id.clone(),
        });
    }
    Ok(())
}

/// placed ∪ unplaced must equal the high bucket, each card once.
pub fn check_pyramid_bijection(state: &SessionState) -> Result<(), IntegrityError> {
    if !state.pyramid_slots.is_well_formed() {
        return Err(IntegrityError::MalformedPyramid);
    }

    let high = unique_ids(&state.bucket_high)?;
    let mut ranked = unique_ids(&state.unplaced)?;
    for card_id in state.slots().iter().filter_map(|slot| slot.card_id.as_deref()) {
        if !high.contains(card_id) {
            return Err(IntegrityError::NotRankable {
                card_id: card_id.to_string(),
            });
        }
        if !ranked.insert(card_id) {
            return Err(IntegrityError::DuplicateCard {
                card_id: card_id.to_string(),
            });
        }
    }

    if let Some(card) = state
        .unplaced
        .iter()
        .find(|card| state.high_card(&card.id) != Some(*card))
    {
        return Err(IntegrityError::NotRankable {
            card_id: card.id.clone(),
        });
    }
    if let Some(card) = state
        .bucket_high
        .iter()
        .find(|card| !ranked.contains(card.id.as_str()))
    {
        return Err(IntegrityError::Unranked {
            card_id: card.id.clone(),
        });
    }
    Ok(())
}

/// Full invariant check of a state against its catalog, per phase.
pub fn check_state(catalog: &Catalog, state: &SessionState) -> Result<(), IntegrityError> {
    if !state.pyramid_slots.is_well_formed() {
        return Err(IntegrityError::MalformedPyramid);
    }

    match state.phase {
        Phase::Intro => {
            ensure_empty(state.phase, "deck", &state.deck)?;
            ensure_empty(state.phase, "bucket_high", &state.bucket_high)?;
            ensure_empty(state.phase, "bucket_maybe", &state.bucket_maybe)?;
            ensure_empty(state.phase, "bucket_low", &state.bucket_low)?;
            ensure_no_ranking(state)
        }
        Phase::Triage => {
            check_triage_partition(catalog, state)?;
            ensure_no_ranking(state)
        }
        Phase::Narrow => {
            check_triage_partition(catalog, state)?;
            ensure_empty(state.phase, "deck", &state.deck)?;
            if state.bucket_high.len() <= SLOT_COUNT {
                return Err(IntegrityError::HighBucketSize {
                    phase: state.phase,
                    size: state.bucket_high.len(),
                });
            }
            ensure_no_ranking(state)
        }
        Phase::Rank | Phase::Results => {
            // Narrowed-away cards are gone for good, so the buckets are a subset of the catalog.
            let all = triage_cards(state);
            check_known(catalog, all.clone())?;
            unique_ids(all)?;
            ensure_empty(state.phase, "deck", &state.deck)?;
            let size = state.bucket_high.len();
            if size == 0 || size > SLOT_COUNT {
                return Err(IntegrityError::HighBucketSize {
                    phase: state.phase,
                    size,
                });
            }
            check_pyramid_bijection(state)?;
            let complete = state.pyramid_slots.is_complete();
            if complete != (state.phase == Phase::Results) {
                return Err(IntegrityError::CompletionMismatch { phase: state.phase });
            }
            Ok(())
        }
    }
}

fn triage_cards(state: &SessionState) -> Vec<&Card> {
    state
        .deck
        .iter()
        .chain(&state.bucket_high)
        .chain(&state.bucket_maybe)
        .chain(&state.bucket_low)
        .collect()
}

fn ensure_empty(phase: Phase, container: &str, cards: &[Card]) -> Result<(), IntegrityError> {
    if cards.is_empty() {
        Ok(())
    } else {
        Err(IntegrityError::UnexpectedContents {
            phase,
            container: container.to_string(),
        })
    }
}

fn ensure_no_ranking(state: &SessionState) -> Result<(), IntegrityError> {
    ensure_empty(state.phase, "unplaced", &state.unplaced)?;
    if state.pyramid_slots.filled_count() > 0 {
        return Err(IntegrityError::UnexpectedContents {
            phase: state.phase,
            container: "pyramid_slots".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::from_names(["Alpha", "Beta", "Gamma", "Delta"]).expect("catalog should build")
    }

    fn card(catalog: &Catalog, id: &str) -> Card {
        catalog.get(id).cloned().expect("card should exist")
    }

    #[test]
    fn triage_partition_accepts_a_full_split() {
        let catalog = catalog();
        let mut state = SessionState::new().with_phase(Phase::Triage);
        state.deck.push(card(&catalog, "alpha"));
        state.bucket_high.push(card(&catalog, "beta"));
        state.bucket_maybe.push(card(&catalog, "gamma"));
        state.bucket_low.push(card(&catalog, "delta"));
        assert_eq!(check_state(&catalog, &state), Ok(()));
    }

    #[test]
    fn triage_partition_detects_drops_and_duplicates() {
        let catalog = catalog();
        let mut state = SessionState::new().with_phase(Phase::Triage);
        state.deck = catalog.cards()[..3].to_vec();
        assert_eq!(
            check_triage_partition(&catalog, &state),
            Err(IntegrityError::MissingCard {
                card_id: "delta".into()
            })
        );

        state.bucket_low.push(card(&catalog, "alpha"));
        assert_eq!(
            check_triage_partition(&catalog, &state),
            Err(IntegrityError::DuplicateCard {
                card_id: "alpha".into()
            })
        );
    }

    #[test]
    fn foreign_or_altered_cards_are_rejected() {
        let catalog = catalog();
        let mut state = SessionState::new().with_phase(Phase::Triage);
        state.deck = catalog.cards().to_vec();
        state.deck[0].name = "SOMETHING ELSE".into();
        assert_eq!(
            check_state(&catalog, &state),
            Err(IntegrityError::CardMismatch {
                card_id: "alpha".into()
            })
        );
    }

    #[test]
    fn bijection_requires_every_high_card_ranked_once() {
        let catalog = catalog();
        let mut state = SessionState::new().with_phase(Phase::Rank);
        state.bucket_high = vec![card(&catalog, "alpha"), card(&catalog, "beta")];
        state.unplaced = vec![card(&catalog, "alpha")];
        assert_eq!(
            check_pyramid_bijection(&state),
            Err(IntegrityError::Unranked {
                card_id: "beta".into()
            })
        );

        state.pyramid_slots.place("beta", 3);
        assert_eq!(check_state(&catalog, &state), Ok(()));

        state.pyramid_slots.place("alpha", 0);
        assert_eq!(
            check_pyramid_bijection(&state),
            Err(IntegrityError::DuplicateCard {
                card_id: "alpha".into()
            })
        );
    }

    #[test]
    fn intro_must_be_empty() {
        let catalog = catalog();
        let mut state = SessionState::new();
        assert_eq!(check_state(&catalog, &state), Ok(()));
        state.bucket_low.push(card(&catalog, "gamma"));
        assert!(matches!(
            check_state(&catalog, &state),
            Err(IntegrityError::UnexpectedContents { .. })
        ));
    }
}
