use std::collections::HashSet;

use scrollgate_protocol::SectionId;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("deck has no sections")]
    Empty,
    #[error("section id {0:?} appears more than once")]
    DuplicateId(String),
    #[error("section id must not be blank")]
    BlankId,
}

/// The sequence of full-screen sections to play.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Deck {
    pub sections: Vec<DeckSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeckSection {
    pub id: SectionId,
    #[serde(default)]
    pub title: String,
    /// Things the visitor has to reveal before the section lets go of the
    /// scroll. An empty list never locks.
    #[serde(default)]
    pub items: Vec<String>,
}

impl Deck {
    pub fn from_json(data: &[u8]) -> Result<Self, DeckError> {
        let deck: Deck = serde_json::from_slice(data)?;
        deck.validate()?;
        Ok(deck)
    }

    /// Ids must be unique: the lock registry keys locks by id.
    pub fn validate(&self) -> Result<(), DeckError> {
        if self.sections.is_empty() {
            return Err(DeckError::Empty);
        }
        let mut seen = HashSet::new();
        for section in &self.sections {
            if section.id.as_str().trim().is_empty() {
                return Err(DeckError::BlankId);
            }
            if !seen.insert(section.id.as_str()) {
                return Err(DeckError::DuplicateId(section.id.to_string()));
            }
        }
        Ok(())
    }

    pub fn builtin() -> Self {
        fn section(id: &str, title: &str, items: &[&str]) -> DeckSection {
            DeckSection {
                id: SectionId::from(id),
                title: title.to_string(),
                items: items.iter().map(ToString::to_string).collect(),
            }
        }

        Deck {
            sections: vec![
                section(
                    "hero",
                    "Meet the bottle",
                    &["Cold for 24 hours", "Hot for 12 hours", "Fits every cup holder"],
                ),
                section("story", "Why we built it", &[]),
                section(
                    "gallery",
                    "Colours",
                    &["Glacier", "Moss", "Ember", "Midnight"],
                ),
                section("specs", "Specifications", &["750 ml", "Steel, double wall"]),
                section("footer", "Get yours", &[]),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_deck_is_valid() {
        let deck = Deck::builtin();
        assert!(deck.validate().is_ok());
        assert_eq!(deck.sections[0].id.as_str(), "hero");
    }

    #[test]
    fn parses_minimal_sections() {
        let deck = Deck::from_json(br#"{"sections":[{"id":"hero","items":["a"]},{"id":"end"}]}"#)
            .expect("minimal deck is valid");
        assert_eq!(deck.sections.len(), 2);
        assert!(deck.sections[1].items.is_empty());
        assert!(deck.sections[1].title.is_empty());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let deck = Deck::from_json(br#"{"sections":[{"id":"hero"},{"id":"hero"}]}"#);
        assert!(matches!(deck, Err(DeckError::DuplicateId(id)) if id == "hero"));
    }

    #[test]
    fn rejects_empty_and_blank() {
        assert!(matches!(
            Deck::from_json(br#"{"sections":[]}"#),
            Err(DeckError::Empty)
        ));
        assert!(matches!(
            Deck::from_json(br#"{"sections":[{"id":" "}]}"#),
            Err(DeckError::BlankId)
        ));
        assert!(matches!(
            Deck::from_json(br#"{"pages":[]}"#),
            Err(DeckError::Json(_))
        ));
    }
}
