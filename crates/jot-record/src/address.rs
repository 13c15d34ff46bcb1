//! Item addresses
//!
//! An [`ItemAddress`] locates one text field of one item inside a record:
//! `to_do[1].task` is the `task` field of the second `to_do` item.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// `(section, index, field)` locator for a reviewable text field
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ItemAddress {
    /// Section name
    pub section: String,
    /// Zero-based position inside the section sequence
    pub index: usize,
    /// Field holding the item text
    pub field: String,
}

impl ItemAddress {
    /// Create address
    #[inline]
    #[must_use]
    pub fn new(section: impl Into<String>, index: usize, field: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            index,
            field: field.into(),
        }
    }

    /// Same item, different field
    #[inline]
    #[must_use]
    pub fn with_field(&self, field: impl Into<String>) -> Self {
        Self {
            section: self.section.clone(),
            index: self.index,
            field: field.into(),
        }
    }
}

impl Display for ItemAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}].{}", self.section, self.index, self.field)
    }
}

impl FromStr for ItemAddress {
    type Err = AddressParseError;

    /// The field is everything after the first `].`, so it may contain dots
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((locator, field)) = s.split_once("].") else {
            return Err(if s.ends_with(']') {
                AddressParseError::MissingField
            } else {
                AddressParseError::MissingIndex
            });
        };
        if field.is_empty() {
            return Err(AddressParseError::MissingField);
        }

        let (section, index) = locator
            .rsplit_once('[')
            .ok_or(AddressParseError::MissingIndex)?;
        if section.is_empty() {
            return Err(AddressParseError::EmptySection);
        }
        let index = index
            .parse::<usize>()
            .map_err(|_| AddressParseError::InvalidIndex(index.to_string()))?;

        Ok(Self::new(section, index, field))
    }
}

/// Errors parsing an [`ItemAddress`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    /// Nothing before `[`
    #[error("address has empty section name")]
    EmptySection,

    /// No `[index]` part
    #[error("address missing [index]")]
    MissingIndex,

    /// Index is not a non-negative integer
    #[error("invalid index: {0}")]
    InvalidIndex(String),

    /// No `.field` part
    #[error("address missing .field")]
    MissingField,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_display() {
        let address = ItemAddress::new("to_do", 1, "task");
        assert_eq!(address.to_string(), "to_do[1].task");
    }

    #[test]
    fn address_parse() {
        let address: ItemAddress = "prepare_priority[12].item".parse().unwrap();
        assert_eq!(address, ItemAddress::new("prepare_priority", 12, "item"));
    }

    #[test]
    fn address_parse_display_agree() {
        let address = ItemAddress::new("ways_i_can_give", 0, "item");
        let parsed: ItemAddress = address.to_string().parse().unwrap();
        assert_eq!(parsed, address);
    }

    #[test]
    fn address_parse_dotted_field() {
        let address: ItemAddress = "to_do[2].notes.text".parse().unwrap();
        assert_eq!(address, ItemAddress::new("to_do", 2, "notes.text"));
        assert_eq!(address.to_string().parse::<ItemAddress>(), Ok(address));
    }

    #[test]
    fn address_parse_missing_field() {
        assert_eq!(
            "to_do[1]".parse::<ItemAddress>(),
            Err(AddressParseError::MissingField)
        );
        assert_eq!(
            "to_do[1].".parse::<ItemAddress>(),
            Err(AddressParseError::MissingField)
        );
    }

    #[test]
    fn address_parse_missing_index() {
        assert_eq!(
            "to_do.task".parse::<ItemAddress>(),
            Err(AddressParseError::MissingIndex)
        );
    }

    #[test]
    fn address_parse_empty_section() {
        assert_eq!(
            "[0].task".parse::<ItemAddress>(),
            Err(AddressParseError::EmptySection)
        );
    }

    #[test]
    fn address_parse_bad_index() {
        assert_eq!(
            "to_do[-1].task".parse::<ItemAddress>(),
            Err(AddressParseError::InvalidIndex("-1".to_string()))
        );
    }

    #[test]
    fn address_with_field() {
        let address = ItemAddress::new("to_do", 3, "task").with_field("item");
        assert_eq!(address.to_string(), "to_do[3].item");
    }
}
