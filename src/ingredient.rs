use crate::error::PayloadError;
use crate::mailbox::Payload;
use std::fmt;

/// Number of distinct ingredients, and therefore of smokers.
pub const NUM_INGREDIENTS: u8 = 3;

/// One of the three things needed to roll a cigarette.
///
/// The discriminant doubles as the wire encoding and as the id of the smoker
/// who holds an endless stock of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Ingredient {
    Paper = 1,
    Tobacco = 2,
    Matches = 3,
}

impl Ingredient {
    pub const ALL: [Ingredient; NUM_INGREDIENTS as usize] =
        [Ingredient::Paper, Ingredient::Tobacco, Ingredient::Matches];

    #[inline(always)]
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Ingredient::Paper => "PAPER",
            Ingredient::Tobacco => "TOBACCO",
            Ingredient::Matches => "MATCHES",
        }
    }
}

impl TryFrom<u8> for Ingredient {
    type Error = PayloadError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(Ingredient::Paper),
            2 => Ok(Ingredient::Tobacco),
            3 => Ok(Ingredient::Matches),
            n => Err(PayloadError::UnknownIngredient(n)),
        }
    }
}

impl fmt::Display for Ingredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of a smoker.
///
/// Smoker `i` permanently holds ingredient `i`, so the id *is* the held
/// ingredient. Valid ids are `1..=NUM_INGREDIENTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SmokerId(Ingredient);

impl SmokerId {
    pub const ALL: [SmokerId; NUM_INGREDIENTS as usize] = [
        SmokerId(Ingredient::Paper),
        SmokerId(Ingredient::Tobacco),
        SmokerId(Ingredient::Matches),
    ];

    /// Returns the smoker with the given number, or `None` if out of range.
    pub fn new(id: u8) -> Option<Self> {
        Ingredient::try_from(id).ok().map(SmokerId)
    }

    /// The smoker who holds `ingredient`.
    pub fn holding(ingredient: Ingredient) -> Self {
        SmokerId(ingredient)
    }

    #[inline(always)]
    pub fn get(self) -> u8 {
        self.0.number()
    }

    /// The ingredient this smoker never runs out of.
    pub fn held(self) -> Ingredient {
        self.0
    }
}

impl fmt::Display for SmokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "smoker{}", self.get())
    }
}

/// Two ingredients put on the table in one round.
///
/// The seller always draws two distinct ingredients; a pair decoded from the
/// wire is taken as-is and may be checked with [`IngredientPair::is_distinct`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientPair {
    pub first: Ingredient,
    pub second: Ingredient,
}

impl IngredientPair {
    pub fn new(first: Ingredient, second: Ingredient) -> Self {
        Self { first, second }
    }

    pub fn is_distinct(&self) -> bool {
        self.first != self.second
    }

    pub fn contains(&self, ingredient: Ingredient) -> bool {
        self.first == ingredient || self.second == ingredient
    }

    /// Compares two pairs ignoring the order of their members.
    pub fn same_ingredients(&self, other: &IngredientPair) -> bool {
        (self.first == other.first && self.second == other.second)
            || (self.first == other.second && self.second == other.first)
    }

    /// Encodes the pair as `"<first>:<second>"`.
    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::empty();
        payload.write_text(&format!("{}:{}", self.first.number(), self.second.number()));
        payload
    }

    /// Decodes a delivery payload produced by [`IngredientPair::to_payload`].
    pub fn from_payload(payload: &Payload) -> Result<Self, PayloadError> {
        let text = payload.text();
        let format_error = || PayloadError::Format {
            text: String::from_utf8_lossy(text).into_owned(),
        };

        let text = std::str::from_utf8(text).map_err(|_| format_error())?;
        let (first, second) = text.split_once(':').ok_or_else(format_error)?;
        let first: u8 = first.trim().parse().map_err(|_| format_error())?;
        let second: u8 = second.trim().parse().map_err(|_| format_error())?;

        Ok(Self {
            first: Ingredient::try_from(first)?,
            second: Ingredient::try_from(second)?,
        })
    }
}

impl fmt::Display for IngredientPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} and {}", self.first, self.second)
    }
}
