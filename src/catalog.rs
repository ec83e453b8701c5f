//! 价值卡牌目录（进程级只读数据）。

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// 卡牌标识，由名称派生，稳定且唯一。
pub type CardId = String;

const STANDARD_NAMES: [&str; 55] = [
    "Family",
    "Security",
    "Freedom",
    "Happiness",
    "Success",
    "Health",
    "Adventure",
    "Knowledge",
    "Integrity",
    "Honesty",
    "Stability",
    "Love",
    "Wealth",
    "Legacy",
    "Responsibility",
    "Achievement",
    "Comfort",
    "Independence",
    "Generosity",
    "Growth",
    "Innovation",
    "Loyalty",
    "Compassion",
    "Creativity",
    "Balance",
    "Spirituality",
    "Community",
    "Excellence",
    "Fun",
    "Recognition",
    "Respect",
    "Trust",
    "Wisdom",
    "Contribution",
    "Flexibility",
    "Gratitude",
    "Passion",
    "Peace",
    "Power",
    "Relationships",
    "Self-reliance",
    "Simplicity",
    "Sustainability",
    "Tradition",
    "Influence",
    "Optimism",
    "Patience",
    "Perseverance",
    "Faith",
    "Charity",
    "Altruism",
    "Resilience",
    "Curiosity",
    "Authenticity",
    "Pleasure",
];

/// Placeholder names filling the 82-card deployment; no authoritative list exists yet.
const EXTENDED_NAMES: [&str; 27] = [
    "Accountability",
    "Ambition",
    "Beauty",
    "Belonging",
    "Calm",
    "Challenge",
    "Collaboration",
    "Courage",
    "Dignity",
    "Discipline",
    "Empathy",
    "Equality",
    "Fairness",
    "Forgiveness",
    "Friendship",
    "Harmony",
    "Humility",
    "Humor",
    "Justice",
    "Kindness",
    "Learning",
    "Mindfulness",
    "Nature",
    "Openness",
    "Privacy",
    "Purpose",
    "Service",
];

static STANDARD: Lazy<Arc<Catalog>> =
    Lazy::new(|| Arc::new(Catalog::build(STANDARD_NAMES.iter().copied())));

static EXTENDED: Lazy<Arc<Catalog>> = Lazy::new(|| {
    Arc::new(Catalog::build(
        STANDARD_NAMES.iter().chain(EXTENDED_NAMES.iter()).copied(),
    ))
});

/// 卡牌配色，按目录顺序轮流分配。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CardColor {
    Yellow,
    Orange,
    Red,
    Purple,
    Teal,
    Green,
}

impl CardColor {
    pub const PALETTE: [CardColor; 6] = [
        CardColor::Yellow,
        CardColor::Orange,
        CardColor::Red,
        CardColor::Purple,
        CardColor::Teal,
        CardColor::Green,
    ];

    pub fn for_index(index: usize) -> Self {
        Self::PALETTE[index % Self::PALETTE.len()]
    }

    pub fn hex(self) -> &'static str {
        match self {
            CardColor::Yellow => "#E7E578",
            CardColor::Orange => "#C36D38",
            CardColor::Red => "#C5445C",
            CardColor::Purple => "#6D5391",
            CardColor::Teal => "#3E7493",
            CardColor::Green => "#5D9443",
        }
    }
}

/// 一张价值卡牌。会话中只会被移动，不会被创建或销毁。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Card {
    pub id: CardId,
    pub name: String,
    pub color: CardColor,
}

impl Card {
    pub fn new(id: impl Into<CardId>, name: impl Into<String>, color: CardColor) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color,
        }
    }

    /// Builds the catalog entry for `name` at catalog position `index`.
    pub fn from_name(name: &str, index: usize) -> Self {
        Self::new(card_id_for(name), name.to_uppercase(), CardColor::for_index(index))
    }
}

/// `"Self-reliance"` -> `"self-reliance"`, `"Fun"` -> `"fun"`.
pub fn card_id_for(name: &str) -> CardId {
    name.to_lowercase()
        .chars()
        .map(|ch| if ch.is_ascii_lowercase() { ch } else { '-' })
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    #[default]
    Standard,
    Extended,
}

impl Deployment {
    pub fn catalog(self) -> Arc<Catalog> {
        match self {
            Deployment::Standard => Arc::clone(&STANDARD),
            Deployment::Extended => Arc::clone(&EXTENDED),
        }
    }

    pub fn card_count(self) -> usize {
        match self {
            Deployment::Standard => STANDARD_NAMES.len(),
            Deployment::Extended => STANDARD_NAMES.len() + EXTENDED_NAMES.len(),
        }
    }
}

impl FromStr for Deployment {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "standard" | "55" => Ok(Deployment::Standard),
            "extended" | "82" => Ok(Deployment::Extended),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deployment::Standard => f.write_str("standard"),
            Deployment::Extended => f.write_str("extended"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog is empty")]
    Empty,
    #[error("duplicate card id `{card_id}`")]
    DuplicateId { card_id: CardId },
}

/// 只读的卡牌目录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    cards: Vec<Card>,
}

impl Catalog {
    fn build<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let cards = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| Card::from_name(name, index))
            .collect();
        Self { cards }
    }

    pub fn standard() -> Arc<Catalog> {
        Deployment::Standard.catalog()
    }

    pub fn extended() -> Arc<Catalog> {
        Deployment::Extended.catalog()
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Self, CatalogError> {
        Self::from_cards(Self::build(names).cards)
    }

    pub fn from_cards(cards: Vec<Card>) -> Result<Self, CatalogError> {
        if cards.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::new();
        for card in &cards {
            if !seen.insert(card.id.as_str()) {
                return Err(CatalogError::DuplicateId {
                    card_id: card.id.clone(),
                });
            }
        }
        Ok(Self { cards })
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn get(&self, card_id: &str) -> Option<&Card> {
        self.cards.iter().find(|card| card.id == card_id)
    }

    pub fn contains(&self, card_id: &str) -> bool {
        self.get(card_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalogs_have_expected_sizes_and_unique_ids() {
        let standard = Catalog::standard();
        let extended = Catalog::extended();
        assert_eq!(standard.len(), 55);
        assert_eq!(extended.len(), 82);
        assert_eq!(Deployment::Extended.card_count(), extended.len());

        for catalog in [&standard, &extended] {
            Catalog::from_cards(catalog.cards().to_vec())
                .expect("builtin catalog should not contain duplicate ids");
        }
    }

    #[test]
    fn ids_and_names_are_derived_from_the_value_name() {
        let catalog = Catalog::standard();
        let card = catalog.get("self-reliance").expect("self-reliance should exist");
        assert_eq!(card.name, "SELF-RELIANCE");
        assert_eq!(card_id_for("Peace of Mind"), "peace-of-mind");
    }

    #[test]
    fn colors_cycle_through_the_palette_in_catalog_order() {
        let catalog = Catalog::standard();
        let cards = catalog.cards();
        assert_eq!(cards[0].color, CardColor::Yellow);
        assert_eq!(cards[5].color, CardColor::Green);
        assert_eq!(cards[6].color, CardColor::Yellow);
        assert_eq!(cards[6].color.hex(), "#E7E578");
    }

    #[test]
    fn extended_catalog_keeps_the_standard_prefix() {
        let standard = Catalog::standard();
        let extended = Catalog::extended();
        assert_eq!(&extended.cards()[..standard.len()], standard.cards());
    }

    #[test]
    fn custom_catalog_rejects_duplicates() {
        let result = Catalog::from_names(["Love", "Trust", "love"]);
        assert_eq!(
            result,
            Err(CatalogError::DuplicateId {
                card_id: "love".into()
            })
        );
        assert_eq!(Catalog::from_names(Vec::<&str>::new()), Err(CatalogError::Empty));
    }

    #[test]
    fn deployment_parses_names_and_sizes() {
        assert_eq!("Extended".parse::<Deployment>(), Ok(Deployment::Extended));
        assert_eq!("55".parse::<Deployment>(), Ok(Deployment::Standard));
        assert!("huge".parse::<Deployment>().is_err());
    }
}
