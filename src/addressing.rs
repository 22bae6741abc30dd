//! Tag addressing.
//!
//! Every smoker owns four tags on the shared mailbox, one per protocol
//! phase. Tags are derived arithmetically from the smoker id:
//!
//! ```text
//! DELIVER = id            ( 1.. 3)   seller -> smoker, carries the ingredients
//! REQUEST = id + N        ( 4.. 6)   smoker -> seller, "can I smoke?"
//! DONE    = id + 2N       ( 7.. 9)   smoker -> seller, table is free again
//! GRANT   = id + 3N       (10..12)   seller -> smoker, "you may smoke"
//! ```
//!
//! With `N = 3` this partitions `1..=12` into disjoint ranges, so no two
//! `(smoker, phase)` combinations share a tag.

use crate::error::AddressingError;
use crate::ingredient::{Ingredient, NUM_INGREDIENTS, SmokerId};
use std::fmt;

/// Total number of tags in use.
pub const TAG_SPACE: usize = 4 * NUM_INGREDIENTS as usize;

/// Protocol phase a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Deliver,
    Request,
    Done,
    Grant,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Deliver, Phase::Request, Phase::Done, Phase::Grant];

    /// Multiple of `N` added to the smoker id.
    #[inline(always)]
    fn offset(self) -> u32 {
        let n = NUM_INGREDIENTS as u32;
        match self {
            Phase::Deliver => 0,
            Phase::Request => n,
            Phase::Done => 2 * n,
            Phase::Grant => 3 * n,
        }
    }
}

/// Address of a logical sub-channel in the mailbox.
///
/// Only constructible from a `(smoker, phase)` combination, so every `Tag`
/// lies inside `1..=TAG_SPACE` and is valid on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(u32);

impl Tag {
    #[inline(always)]
    pub fn new(smoker: SmokerId, phase: Phase) -> Self {
        Tag(smoker.get() as u32 + phase.offset())
    }

    #[inline(always)]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Zero-based position of this tag in `0..TAG_SPACE`.
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize - 1
    }

    /// The smoker this tag belongs to.
    pub fn smoker(self) -> SmokerId {
        SmokerId::ALL[((self.0 - 1) % NUM_INGREDIENTS as u32) as usize]
    }

    pub fn phase(self) -> Phase {
        Phase::ALL[((self.0 - 1) / NUM_INGREDIENTS as u32) as usize]
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Shorthand for [`Tag::new`].
#[inline(always)]
pub fn tag(smoker: SmokerId, phase: Phase) -> Tag {
    Tag::new(smoker, phase)
}

/// Returns the smoker who can use `first` and `second`: the one holding the
/// third ingredient.
///
/// Fails with [`AddressingError::UnknownPairing`] if both ingredients are the
/// same, since no single smoker is then missing exactly those two.
pub fn target_smoker(first: Ingredient, second: Ingredient) -> Result<SmokerId, AddressingError> {
    if first == second {
        return Err(AddressingError::UnknownPairing { first, second });
    }
    Ingredient::ALL
        .into_iter()
        .find(|&x| x != first && x != second)
        .map(SmokerId::holding)
        .ok_or(AddressingError::UnknownPairing { first, second })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn target_is_the_smoker_holding_the_third_ingredient() {
        use Ingredient::*;
        let cases = [
            (Paper, Tobacco, Matches),
            (Tobacco, Paper, Matches),
            (Tobacco, Matches, Paper),
            (Matches, Tobacco, Paper),
            (Matches, Paper, Tobacco),
            (Paper, Matches, Tobacco),
        ];
        for (first, second, missing) in cases {
            let target = target_smoker(first, second).unwrap();
            assert_eq!(target.held(), missing, "{first} + {second}");
            assert_ne!(target.held(), first);
            assert_ne!(target.held(), second);
        }
    }

    #[test]
    fn identical_ingredients_are_an_unknown_pairing() {
        for ingredient in Ingredient::ALL {
            assert_eq!(
                target_smoker(ingredient, ingredient),
                Err(AddressingError::UnknownPairing {
                    first: ingredient,
                    second: ingredient
                })
            );
        }
    }

    #[test]
    fn tags_are_injective_over_smokers_and_phases() {
        let mut seen = HashSet::new();
        for smoker in SmokerId::ALL {
            for phase in Phase::ALL {
                let t = tag(smoker, phase);
                assert!(seen.insert(t), "tag {t} assigned twice");
                assert!((1..=TAG_SPACE as u32).contains(&t.raw()), "tag {t} out of range");
            }
        }
        assert_eq!(seen.len(), TAG_SPACE);
    }

    #[test]
    fn tag_values_follow_the_phase_offsets() {
        let paper = SmokerId::holding(Ingredient::Paper);
        assert_eq!(tag(paper, Phase::Deliver).raw(), 1);
        assert_eq!(tag(paper, Phase::Request).raw(), 4);
        assert_eq!(tag(paper, Phase::Done).raw(), 7);
        assert_eq!(tag(paper, Phase::Grant).raw(), 10);

        let matches = SmokerId::holding(Ingredient::Matches);
        assert_eq!(tag(matches, Phase::Grant).raw(), 12);
    }

    #[test]
    fn tag_decodes_back_to_smoker_and_phase() {
        for smoker in SmokerId::ALL {
            for phase in Phase::ALL {
                let t = tag(smoker, phase);
                assert_eq!(t.smoker(), smoker);
                assert_eq!(t.phase(), phase);
            }
        }
    }

    #[test]
    fn tags_display_as_two_digits() {
        let tobacco = SmokerId::holding(Ingredient::Tobacco);
        assert_eq!(tag(tobacco, Phase::Deliver).to_string(), "02");
        assert_eq!(tag(tobacco, Phase::Grant).to_string(), "11");
    }
}
