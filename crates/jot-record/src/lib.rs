//! Jot Record Model
//!
//! Structured output of one scanned journal page, with confidence scores,
//! exact item addressing and declarative per-page schemas.
//!
//! # Core Concepts
//!
//! - [`ExtractionRecord`]: Ordered mapping of section name to scalar or sequence
//! - [`Item`]: One extracted object with an optional `confidence`
//! - [`ItemAddress`]: `section[index].field` locator used for patch-back
//! - [`PageSchema`]: Section layout of a page type, driving triage and task extraction
//!
//! # Example
//!
//! ```rust,ignore
//! use jot_record::{ExtractionRecord, PageSchema};
//!
//! let record = ExtractionRecord::from_json(json)?;
//! let schema = PageSchema::daily();
//! schema.validate(&record)?;
//!
//! for task in schema.candidate_tasks(&record) {
//!     println!("{} ({})", task.text, task.priority);
//! }
//! ```

#![warn(unreachable_pub)]

mod address;
mod error;
mod record;
mod schema;

pub use address::{AddressParseError, ItemAddress};
pub use error::{AddressError, RecordError};
pub use record::{
    ExtractionRecord, Item, Section, SectionShape, CONFIDENCE_FIELD, REVIEWED_CONFIDENCE,
};
pub use schema::{
    parse_page_date, FieldPriority, PageSchema, PageType, ResolvedText, SchemaRegistry,
    SectionSpec, TaskCandidate, TaskPriority, DEFAULT_DUE, DEFAULT_FIELD_PRIORITY,
    DUE_DATE_FORMAT,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            (0.0f64..=1.5).prop_map(|n| json!(n)),
            "[a-z ]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn parsing_arbitrary_json_is_total(value in arb_json()) {
            // either a structured error or a record that converts back losslessly
            if let Ok(record) = ExtractionRecord::from_value(value.clone()) {
                prop_assert_eq!(record.to_value(), value);
            }
        }

        #[test]
        fn address_display_parses_back(
            section in "[a-z_]{1,12}",
            index in 0usize..10_000,
            field in "[a-z_]{1,8}",
        ) {
            let address = ItemAddress::new(section, index, field);
            let parsed: ItemAddress = address.to_string().parse().unwrap();
            prop_assert_eq!(parsed, address);
        }
    }

    #[test]
    fn scenario_record_validates_against_generic_schema() {
        let record = ExtractionRecord::from_json(
            r#"{"to_do": [{"task": "Call dentist", "confidence": 0.95},
                          {"task": "Fix the report", "confidence": 0.6}]}"#,
        )
        .unwrap();

        let schema = SchemaRegistry::builtin().get(PageType::Unknown).clone();
        assert!(schema.validate(&record).is_ok());
        assert_eq!(schema.candidate_tasks(&record).len(), 2);
    }
}
