//! Confidence triage
//!
//! Scans the sequence sections of a record and flags every item whose text
//! resolved and whose confidence falls below the acceptance threshold.
//! Scalar sections are never flagged.

use jot_record::{
    ExtractionRecord, Item, ItemAddress, PageSchema, PageType, RecordError, REVIEWED_CONFIDENCE,
};
use serde::{Deserialize, Serialize};

/// Item selected for human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedItem {
    /// Where the text lives
    pub address: ItemAddress,
    /// Text as extracted
    pub text: String,
    /// Extractor confidence, below the threshold
    pub confidence: f64,
    /// Full item as it was when flagged
    pub original_item: Item,
}

impl FlaggedItem {
    /// Section name
    #[inline]
    #[must_use]
    pub fn section(&self) -> &str {
        &self.address.section
    }

    /// Index inside the section
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.address.index
    }

    /// Accept the text as extracted
    #[must_use]
    pub fn accept(self) -> ReviewedItem {
        ReviewedItem {
            address: self.address,
            text: self.text,
            confidence: REVIEWED_CONFIDENCE,
            original_item: self.original_item,
            edited: false,
        }
    }

    /// Replace the text with a human correction
    #[must_use]
    pub fn edit(self, text: impl Into<String>) -> ReviewedItem {
        ReviewedItem {
            address: self.address,
            text: text.into(),
            confidence: REVIEWED_CONFIDENCE,
            original_item: self.original_item,
            edited: true,
        }
    }
}

/// Flagged item after human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewedItem {
    /// Where the text lives
    pub address: ItemAddress,
    /// Final text
    pub text: String,
    /// Always 1.0
    pub confidence: f64,
    /// Full item as it was when flagged
    pub original_item: Item,
    /// Whether the reviewer changed the text
    pub edited: bool,
}

/// Flag low-confidence items using the default field priority everywhere
///
/// Missing confidence counts as fully confident. Items are returned in
/// section discovery order, then item order.
#[must_use]
pub fn flag(record: &ExtractionRecord, threshold: f64) -> Vec<FlaggedItem> {
    scan(record, &PageSchema::new(PageType::Unknown), threshold)
}

/// Flag low-confidence items using a page schema's field priorities
///
/// # Errors
/// Returns the structural error if the record does not fit the schema;
/// nothing is flagged in that case
pub fn flag_with_schema(
    record: &ExtractionRecord,
    schema: &PageSchema,
    threshold: f64,
) -> Result<Vec<FlaggedItem>, RecordError> {
    schema.validate(record)?;
    Ok(scan(record, schema, threshold))
}

fn scan(record: &ExtractionRecord, schema: &PageSchema, threshold: f64) -> Vec<FlaggedItem> {
    let mut flagged = Vec::new();

    for (name, section) in record.sections() {
        let Some(items) = section.as_sequence() else {
            continue;
        };
        let priority = schema.field_priority_for(name);

        for (index, item) in items.iter().enumerate() {
            let Some(confidence) = item.confidence() else {
                continue;
            };
            if confidence >= threshold {
                continue;
            }
            let Some(resolved) = priority.resolve(item) else {
                continue;
            };

            tracing::debug!(
                "Flagged {}[{}].{} at confidence {:.2}",
                name,
                index,
                resolved.field,
                confidence
            );
            flagged.push(FlaggedItem {
                address: ItemAddress::new(name, index, resolved.field),
                text: resolved.text.to_string(),
                confidence,
                original_item: item.clone(),
            });
        }
    }

    tracing::info!(
        "Triage flagged {} item(s) below {:.2}",
        flagged.len(),
        threshold
    );
    flagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> ExtractionRecord {
        ExtractionRecord::from_value(value).unwrap()
    }

    #[test]
    fn flag_returns_only_low_confidence_items() {
        let record = record(json!({
            "to_do": [
                {"task": "Call dentist", "confidence": 0.95},
                {"task": "Fix the report", "confidence": 0.6}
            ]
        }));

        let flagged = flag(&record, 0.9);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].address, ItemAddress::new("to_do", 1, "task"));
        assert_eq!(flagged[0].text, "Fix the report");
        assert_eq!(flagged[0].confidence, 0.6);
    }

    #[test]
    fn flag_skips_missing_confidence_and_blank_text() {
        let record = record(json!({
            "to_do": [
                {"task": "No score"},
                {"task": "  ", "confidence": 0.1},
                {"task": "", "item": "Fallback field", "confidence": 0.2}
            ]
        }));

        let flagged = flag(&record, 0.9);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].address, ItemAddress::new("to_do", 2, "item"));
    }

    #[test]
    fn flag_includes_zero_confidence() {
        let record = record(json!({"to_do": [{"task": "Smudged", "confidence": 0.0}]}));
        assert_eq!(flag(&record, 0.9).len(), 1);
    }

    #[test]
    fn flag_ignores_scalar_sections() {
        let record = record(json!({
            "reflect": {"text": "Low", "confidence": 0.1},
            "to_do": [{"task": "Low too", "confidence": 0.1}]
        }));

        let flagged = flag(&record, 0.9);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].section(), "to_do");
    }

    #[test]
    fn flag_orders_by_section_then_index() {
        let record = record(json!({
            "to_do": [{"task": "b", "confidence": 0.1}, {"task": "c", "confidence": 0.1}],
            "prepare_priority": [{"task": "a", "confidence": 0.1}]
        }));

        let order: Vec<String> = flag(&record, 0.9)
            .iter()
            .map(|item| item.address.to_string())
            .collect();
        assert_eq!(
            order,
            vec!["to_do[0].task", "to_do[1].task", "prepare_priority[0].task"]
        );
    }

    #[test]
    fn flag_keeps_full_original_item() {
        let record = record(json!({
            "to_do": [{"task": "Fix", "due": "friday", "confidence": 0.5}]
        }));

        let flagged = flag(&record, 0.9);
        assert_eq!(flagged[0].original_item.get("due"), Some(&json!("friday")));
    }

    #[test]
    fn schema_field_priority_drives_resolution() {
        // daily schema reads only `item` in ways_i_can_give
        let record = record(json!({
            "ways_i_can_give": [{"task": "ignored", "confidence": 0.2}],
            "daily": [{"hour": "9", "activities": "gym", "confidence": 0.2}]
        }));

        let flagged = flag_with_schema(&record, &PageSchema::daily(), 0.9).unwrap();
        assert!(flagged.is_empty());
        assert_eq!(flag(&record, 0.9).len(), 1);
    }

    #[test]
    fn schema_shape_mismatch_is_fatal() {
        let record = record(json!({"to_do": {"task": "x", "confidence": 0.1}}));
        let result = flag_with_schema(&record, &PageSchema::daily(), 0.9);
        assert!(matches!(result, Err(RecordError::ShapeMismatch { .. })));
    }

    #[test]
    fn accept_and_edit_set_reviewed_confidence() {
        let record = record(json!({"to_do": [{"task": "Fix", "confidence": 0.5}]}));
        let item = flag(&record, 0.9).remove(0);

        let accepted = item.clone().accept();
        assert!(!accepted.edited);
        assert_eq!(accepted.confidence, 1.0);
        assert_eq!(accepted.text, "Fix");

        let edited = item.edit("Fix it");
        assert!(edited.edited);
        assert_eq!(edited.text, "Fix it");
        assert_eq!(edited.original_item.text("task"), Some("Fix"));
    }

    #[test]
    fn flagged_item_serializes_original_as_object() {
        let record = record(json!({"to_do": [{"task": "Fix", "confidence": 0.5}]}));
        let item = flag(&record, 0.9).remove(0);

        let encoded = serde_json::to_value(&item).unwrap();
        assert_eq!(encoded["original_item"], json!({"task": "Fix", "confidence": 0.5}));
        let decoded: FlaggedItem = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, item);
    }

    proptest! {
        #[test]
        fn flagged_items_are_below_threshold_with_text(
            rows in prop::collection::vec(
                (prop::option::of(0.0f64..=1.0), prop::option::of("[a-z ]{0,8}")),
                0..12,
            ),
            threshold in 0.0f64..=1.0,
        ) {
            let items: Vec<serde_json::Value> = rows
                .iter()
                .map(|(confidence, task)| {
                    let mut item = serde_json::Map::new();
                    if let Some(task) = task {
                        item.insert("task".to_string(), json!(task));
                    }
                    if let Some(confidence) = confidence {
                        item.insert("confidence".to_string(), json!(confidence));
                    }
                    serde_json::Value::Object(item)
                })
                .collect();
            let record = record(json!({ "to_do": items }));

            let flagged = flag(&record, threshold);
            for item in &flagged {
                prop_assert!(item.confidence < threshold);
                prop_assert!(!item.text.trim().is_empty());
            }

            let expected = rows
                .iter()
                .filter(|(confidence, task)| {
                    confidence.is_some_and(|c| c < threshold)
                        && task.as_deref().is_some_and(|t| !t.trim().is_empty())
                })
                .count();
            prop_assert_eq!(flagged.len(), expected);
        }
    }
}
