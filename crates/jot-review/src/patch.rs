//! Patch reviewed items back into a record
//!
//! Patching always works on a deep copy; the input record is never touched.
//! A bad address is reported and skipped, never fatal.

use crate::triage::ReviewedItem;
use jot_record::{AddressError, ExtractionRecord, REVIEWED_CONFIDENCE};

/// Patched copy plus every address that could not be applied
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    /// Copy of the input with reviewed text applied
    pub record: ExtractionRecord,
    /// Items skipped, in input order
    pub errors: Vec<AddressError>,
}

impl PatchOutcome {
    /// Check if every reviewed item was applied
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Apply reviewed items to a copy of `original`
///
/// Each item's address must name a sequence section and an in-bounds index,
/// and the item found there must still equal the snapshot taken when it was
/// flagged. Applied items get the reviewed text and a confidence of 1.0.
#[must_use]
pub fn apply(original: &ExtractionRecord, reviewed: &[ReviewedItem]) -> PatchOutcome {
    let mut record = original.clone();
    let mut errors = Vec::new();

    for item in reviewed {
        match patch_one(&mut record, item) {
            Ok(()) => tracing::debug!("Patched {}", item.address),
            Err(err) => {
                tracing::warn!("Skipping reviewed item: {}", err);
                errors.push(err);
            }
        }
    }

    tracing::info!(
        "Applied {} of {} reviewed item(s)",
        reviewed.len() - errors.len(),
        reviewed.len()
    );
    PatchOutcome { record, errors }
}

fn patch_one(record: &mut ExtractionRecord, reviewed: &ReviewedItem) -> Result<(), AddressError> {
    let target = record.resolve_mut(&reviewed.address)?;
    if *target != reviewed.original_item {
        return Err(AddressError::SnapshotMismatch {
            address: reviewed.address.clone(),
        });
    }
    target.set_text(&reviewed.address.field, reviewed.text.as_str());
    target.set_confidence(REVIEWED_CONFIDENCE);
    Ok(())
}
