//! Bib1 Attribute Set Types
//!
//! <https://www.loc.gov/z3950/agency/defns/bib1.html>

use strum::IntoEnumIterator;
use strum_macros::EnumIter;

/// Attribute types within the Bib-1 set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Use = 1,
    Relation = 2,
    Position = 3,
    Structure = 4,
    Truncation = 5,
    Completeness = 6,
    Sorting = 7,
}

impl TryFrom<u32> for Attribute {
    type Error = String;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(Self::Use),
            2 => Ok(Self::Relation),
            3 => Ok(Self::Position),
            4 => Ok(Self::Structure),
            5 => Ok(Self::Truncation),
            6 => Ok(Self::Completeness),
            7 => Ok(Self::Sorting),
            _ => Err(format!("Unsupported Attribute: {n}")),
        }
    }
}

/// Bib-1 Use attribute values this engine binds to catalog fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Use {
    PersonalName = 1,
    CorporateName = 2,
    Title = 4,
    TitleSeries = 5,
    Isbn = 7,
    Issn = 8,
    Subject = 21,
    DatePub = 31,
    Author = 1003,
    Any = 1016,
}

impl Use {
    /// The numeric attribute value for the wire.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Resolve a numeric Use attribute.
    ///
    /// A value of 0 or any value outside the bound set resolves to
    /// [`Use::Any`], which backends implement as a broad any-field
    /// predicate.  This mirrors how permissive Z39.50 origins behave
    /// and is intentional, not a parse failure.
    pub fn from_code(code: u32) -> Use {
        Use::iter()
            .find(|u| u.code() as u32 == code)
            .unwrap_or(Use::Any)
    }
}

impl std::fmt::Display for Use {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PersonalName => "personal-name",
            Self::CorporateName => "corporate-name",
            Self::Title => "title",
            Self::TitleSeries => "title-series",
            Self::Isbn => "isbn",
            Self::Issn => "issn",
            Self::Subject => "subject",
            Self::DatePub => "date-of-publication",
            Self::Author => "author",
            Self::Any => "any",
        };
        write!(f, "{name}")
    }
}
