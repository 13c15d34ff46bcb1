//! Confidence-scored extraction records
//!
//! An [`ExtractionRecord`] is the structured output of one scanned page: an
//! ordered mapping of section name to either a scalar object or a sequence of
//! item objects. Records are immutable input; every transformation in the
//! pipeline works on an owned copy.

use crate::address::ItemAddress;
use crate::error::{AddressError, RecordError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};

/// Field holding the recognition certainty of an item
pub const CONFIDENCE_FIELD: &str = "confidence";

/// Confidence assigned to text a human has reviewed
pub const REVIEWED_CONFIDENCE: f64 = 1.0;

/// Shape of a record section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionShape {
    /// A single object, e.g. `{"value": "...", "confidence": 0.9}`
    Scalar,
    /// An ordered list of item objects
    Sequence,
}

impl Display for SectionShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => f.write_str("scalar"),
            Self::Sequence => f.write_str("sequence"),
        }
    }
}

/// One extracted object: field name → value, with an optional confidence
///
/// Field order is preserved so a patched record serializes the way it was
/// extracted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Item {
    fields: Map<String, Value>,
}

impl Item {
    /// Create empty item
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a string field
    #[inline]
    #[must_use]
    pub fn with_text(mut self, field: impl Into<String>, text: impl Into<String>) -> Self {
        self.fields.insert(field.into(), Value::String(text.into()));
        self
    }

    /// Builder: set an arbitrary field
    #[inline]
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    /// Builder: set the confidence
    #[inline]
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.set_confidence(confidence);
        self
    }

    /// Raw field value
    #[inline]
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Non-blank string value of a field
    #[must_use]
    pub fn text(&self, field: &str) -> Option<&str> {
        match self.fields.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// Recognition confidence, `None` when the extractor did not report one
    #[inline]
    #[must_use]
    pub fn confidence(&self) -> Option<f64> {
        self.fields.get(CONFIDENCE_FIELD).and_then(Value::as_f64)
    }

    /// Overwrite the confidence
    pub fn set_confidence(&mut self, confidence: f64) {
        let number = serde_json::Number::from_f64(confidence)
            .map_or(Value::Null, Value::Number);
        self.fields.insert(CONFIDENCE_FIELD.to_string(), number);
    }

    /// Overwrite a text field
    pub fn set_text(&mut self, field: &str, text: impl Into<String>) {
        self.fields
            .insert(field.to_string(), Value::String(text.into()));
    }

    /// All fields in extraction order
    #[inline]
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Convert into a JSON object
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Build from a JSON object, validating the confidence field
    fn from_map(
        fields: Map<String, Value>,
        section: &str,
        index: Option<usize>,
    ) -> Result<Self, RecordError> {
        if let Some(raw) = fields.get(CONFIDENCE_FIELD) {
            let valid = raw
                .as_f64()
                .is_some_and(|c| (0.0..=1.0).contains(&c));
            // extractors emit null for "unknown", treated like a missing value
            if !valid && !raw.is_null() {
                return Err(RecordError::InvalidConfidence {
                    section: section.to_string(),
                    index,
                    value: raw.to_string(),
                });
            }
        }
        Ok(Self { fields })
    }
}

/// A record section: one object or an ordered list of objects
#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    /// Single object section
    Scalar(Item),
    /// Ordered item section; the only shape eligible for itemized review
    Sequence(Vec<Item>),
}

impl Section {
    /// Shape of this section
    #[inline]
    #[must_use]
    pub fn shape(&self) -> SectionShape {
        match self {
            Self::Scalar(_) => SectionShape::Scalar,
            Self::Sequence(_) => SectionShape::Sequence,
        }
    }

    /// Items if this is a sequence section
    #[inline]
    #[must_use]
    pub fn as_sequence(&self) -> Option<&[Item]> {
        match self {
            Self::Sequence(items) => Some(items),
            Self::Scalar(_) => None,
        }
    }

    /// Object if this is a scalar section
    #[inline]
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Item> {
        match self {
            Self::Scalar(item) => Some(item),
            Self::Sequence(_) => None,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Scalar(item) => item.into_value(),
            Self::Sequence(items) => Value::Array(items.into_iter().map(Item::into_value).collect()),
        }
    }
}

/// Structured output of one processed page
///
/// Cloning produces a fully independent deep copy; no part of the structure
/// is shared between copies.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractionRecord {
    sections: IndexMap<String, Section>,
}

impl ExtractionRecord {
    /// Create empty record
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a scalar section
    #[inline]
    #[must_use]
    pub fn with_scalar(mut self, name: impl Into<String>, item: Item) -> Self {
        self.sections.insert(name.into(), Section::Scalar(item));
        self
    }

    /// Builder: add a sequence section
    #[inline]
    #[must_use]
    pub fn with_sequence(mut self, name: impl Into<String>, items: Vec<Item>) -> Self {
        self.sections.insert(name.into(), Section::Sequence(items));
        self
    }

    /// Parse a record from JSON text
    ///
    /// # Errors
    /// Returns error on malformed JSON or a non-conforming structure
    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Build a record from a JSON value, validating its structure
    ///
    /// Every section must be an object or an array of objects, and every
    /// `confidence` must be a number in `[0, 1]`.
    ///
    /// # Errors
    /// Returns the first structural violation found
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        let Value::Object(root) = value else {
            return Err(RecordError::NotAnObject {
                found: value_kind(&value),
            });
        };

        let mut sections = IndexMap::with_capacity(root.len());
        for (name, raw) in root {
            let section = match raw {
                Value::Object(fields) => Section::Scalar(Item::from_map(fields, &name, None)?),
                Value::Array(elements) => {
                    let mut items = Vec::with_capacity(elements.len());
                    for (index, element) in elements.into_iter().enumerate() {
                        let Value::Object(fields) = element else {
                            return Err(RecordError::InvalidItem {
                                section: name,
                                index,
                                found: value_kind(&element),
                            });
                        };
                        items.push(Item::from_map(fields, &name, Some(index))?);
                    }
                    Section::Sequence(items)
                }
                other => {
                    return Err(RecordError::InvalidSection {
                        section: name,
                        found: value_kind(&other),
                    })
                }
            };
            sections.insert(name, section);
        }

        Ok(Self { sections })
    }

    /// Convert back into a JSON value
    #[must_use]
    pub fn to_value(&self) -> Value {
        let map = self
            .sections
            .iter()
            .map(|(name, section)| (name.clone(), section.clone().into_value()))
            .collect::<Map<_, _>>();
        Value::Object(map)
    }

    /// Sections in discovery order
    #[inline]
    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Look up a section by name
    #[inline]
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    /// Number of sections
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Check if the record has no sections
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Resolve `(section, index)` to an item
    ///
    /// # Errors
    /// Returns error if the section is missing, not a sequence, or the index
    /// is out of bounds
    pub fn resolve(&self, address: &ItemAddress) -> Result<&Item, AddressError> {
        let items = match self.sections.get(&address.section) {
            Some(Section::Sequence(items)) => items,
            Some(Section::Scalar(_)) => {
                return Err(AddressError::NotASequence {
                    section: address.section.clone(),
                })
            }
            None => {
                return Err(AddressError::SectionNotFound {
                    section: address.section.clone(),
                })
            }
        };
        items
            .get(address.index)
            .ok_or_else(|| AddressError::IndexOutOfBounds {
                section: address.section.clone(),
                index: address.index,
                len: items.len(),
            })
    }

    /// Resolve `(section, index)` to a mutable item
    ///
    /// # Errors
    /// Same conditions as [`ExtractionRecord::resolve`]
    pub fn resolve_mut(&mut self, address: &ItemAddress) -> Result<&mut Item, AddressError> {
        let items = match self.sections.get_mut(&address.section) {
            Some(Section::Sequence(items)) => items,
            Some(Section::Scalar(_)) => {
                return Err(AddressError::NotASequence {
                    section: address.section.clone(),
                })
            }
            None => {
                return Err(AddressError::SectionNotFound {
                    section: address.section.clone(),
                })
            }
        };
        let len = items.len();
        items
            .get_mut(address.index)
            .ok_or_else(|| AddressError::IndexOutOfBounds {
                section: address.section.clone(),
                index: address.index,
                len,
            })
    }
}

impl serde::Serialize for Item {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.fields.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Item {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        Self::from_map(fields, "", None).map_err(|err| match err {
            RecordError::InvalidConfidence { value, .. } => {
                serde::de::Error::custom(format_args!("invalid confidence {value}"))
            }
            other => serde::de::Error::custom(other),
        })
    }
}

impl serde::Serialize for ExtractionRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for ExtractionRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// JSON type name for error reporting
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn daily_json() -> Value {
        json!({
            "date": {"value": "Monday, Nov 12, 2018", "confidence": 0.97},
            "to_do": [
                {"task": "Call dentist", "confidence": 0.95},
                {"task": "Fix the report", "confidence": 0.6}
            ]
        })
    }

    #[test]
    fn record_parses_scalar_and_sequence_sections() {
        let record = ExtractionRecord::from_value(daily_json()).unwrap();

        assert_eq!(record.len(), 2);
        assert_eq!(record.section("date").unwrap().shape(), SectionShape::Scalar);
        let items = record.section("to_do").unwrap().as_sequence().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].text("task"), Some("Fix the report"));
        assert_eq!(items[1].confidence(), Some(0.6));
    }

    #[test]
    fn record_preserves_section_order() {
        let record = ExtractionRecord::from_json(
            r#"{"zeta": [], "alpha": {"value": "a"}, "mid": []}"#,
        )
        .unwrap();

        let names: Vec<_> = record.sections().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn record_round_trips_through_json_value() {
        let value = daily_json();
        let record = ExtractionRecord::from_value(value.clone()).unwrap();
        assert_eq!(record.to_value(), value);
    }

    #[test]
    fn record_rejects_non_object_root() {
        let err = ExtractionRecord::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, RecordError::NotAnObject { found: "array" }));
    }

    #[test]
    fn record_rejects_string_section() {
        let err = ExtractionRecord::from_value(json!({"habit": "run"})).unwrap_err();
        assert!(matches!(err, RecordError::InvalidSection { ref section, found: "string" } if section == "habit"));
    }

    #[test]
    fn record_rejects_non_object_sequence_element() {
        let err =
            ExtractionRecord::from_value(json!({"to_do": [{"task": "a"}, "b"]})).unwrap_err();
        assert!(matches!(err, RecordError::InvalidItem { index: 1, .. }));
    }

    #[test]
    fn record_rejects_out_of_range_confidence() {
        let err = ExtractionRecord::from_value(json!({"to_do": [{"task": "a", "confidence": 1.4}]}))
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidConfidence { index: Some(0), .. }));

        let err = ExtractionRecord::from_value(json!({"to_do": [{"task": "a", "confidence": "high"}]}))
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidConfidence { .. }));
    }

    #[test]
    fn item_deserialize_checks_confidence() {
        let err = serde_json::from_value::<Item>(json!({"task": "a", "confidence": 1.4}))
            .unwrap_err();
        assert!(err.to_string().contains("invalid confidence 1.4"), "{err}");
        assert!(serde_json::from_value::<Item>(json!({"task": "a", "confidence": "high"})).is_err());

        let item: Item = serde_json::from_value(json!({"task": "a", "confidence": 0.4})).unwrap();
        assert_eq!(item.confidence(), Some(0.4));
        let item: Item = serde_json::from_value(json!({"task": "a", "confidence": null})).unwrap();
        assert_eq!(item.confidence(), None);
    }

    #[test]
    fn null_confidence_is_treated_as_missing() {
        let record =
            ExtractionRecord::from_value(json!({"to_do": [{"task": "a", "confidence": null}]}))
                .unwrap();
        let item = &record.section("to_do").unwrap().as_sequence().unwrap()[0];
        assert_eq!(item.confidence(), None);
    }

    #[test]
    fn resolve_reports_each_address_failure() {
        let record = ExtractionRecord::from_value(daily_json()).unwrap();

        assert!(record.resolve(&ItemAddress::new("to_do", 1, "task")).is_ok());
        assert!(matches!(
            record.resolve(&ItemAddress::new("missing", 0, "task")),
            Err(AddressError::SectionNotFound { .. })
        ));
        assert!(matches!(
            record.resolve(&ItemAddress::new("date", 0, "value")),
            Err(AddressError::NotASequence { .. })
        ));
        assert!(matches!(
            record.resolve(&ItemAddress::new("to_do", 2, "task")),
            Err(AddressError::IndexOutOfBounds { index: 2, len: 2, .. })
        ));
    }

    #[test]
    fn clone_is_independent() {
        let original = ExtractionRecord::from_value(daily_json()).unwrap();
        let mut copy = original.clone();
        copy.resolve_mut(&ItemAddress::new("to_do", 0, "task"))
            .unwrap()
            .set_text("task", "changed");

        assert_ne!(copy, original);
        let item = original.resolve(&ItemAddress::new("to_do", 0, "task")).unwrap();
        assert_eq!(item.text("task"), Some("Call dentist"));
    }

    #[test]
    fn blank_text_is_not_resolved() {
        let item = Item::new().with_text("task", "   ");
        assert_eq!(item.text("task"), None);
    }

    #[test]
    fn record_serde_matches_value_conversion() {
        let record = ExtractionRecord::from_value(daily_json()).unwrap();
        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: ExtractionRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);
    }
}
