use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification code of a policy; each category is paginated independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Category {
    /// Local regulations (code 1)
    LocalRegulation,
    /// Government rules (code 2)
    GovernmentRule,
    /// Normative documents (code 3)
    NormativeDocument,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Self::LocalRegulation,
        Self::GovernmentRule,
        Self::NormativeDocument,
    ];

    /// Wire code sent as `lawRuleType`
    pub fn code(&self) -> u8 {
        match self {
            Self::LocalRegulation => 1,
            Self::GovernmentRule => 2,
            Self::NormativeDocument => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::LocalRegulation => "local regulation",
            Self::GovernmentRule => "government rule",
            Self::NormativeDocument => "normative document",
        }
    }

    /// Parses a comma separated list of codes such as `1,2,3`
    pub fn parse_list(s: &str) -> Result<Vec<Category>, ConfigError> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u8>()
                    .map_err(|_| ConfigError::Validation(format!("invalid category '{}'", part)))
                    .and_then(Category::try_from)
            })
            .collect()
    }
}

impl TryFrom<u8> for Category {
    type Error = ConfigError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::LocalRegulation),
            2 => Ok(Self::GovernmentRule),
            3 => Ok(Self::NormativeDocument),
            other => Err(ConfigError::UnknownCategory(other)),
        }
    }
}

impl From<Category> for u8 {
    fn from(category: Category) -> Self {
        category.code()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
