//! Declarative page schemas
//!
//! Each page type registers the sections it expects, their shape, which
//! fields hold the item text and whether the section yields tasks. One
//! generic algorithm interprets the schema for triage, validation and
//! candidate extraction.

use crate::error::RecordError;
use crate::record::{ExtractionRecord, Item, Section, SectionShape};
use chrono::NaiveDate;
use indexmap::IndexMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Fields probed for item text when a section declares none
pub const DEFAULT_FIELD_PRIORITY: [&str; 4] = ["task", "item", "value", "text"];

/// Task scope used when the page carries no recognizable date
pub const DEFAULT_DUE: &str = "today";

/// Layout of a normalized task scope date
pub const DUE_DATE_FORMAT: &str = "%Y-%m-%d";

// month names parse in short or long form
const PAGE_DATE_FORMATS: [&str; 10] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%A, %B %d, %Y",
    "%A %B %d %Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %B, %Y",
];

/// Parse a handwritten page date such as `Monday, Nov 12, 2018`
///
/// Leading words that are not part of a date (`Week of ...`, a wrong
/// weekday) are skipped. Returns `None` when no known layout matches.
#[must_use]
pub fn parse_page_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let starts = std::iter::once(0).chain(
        text.char_indices()
            .filter(|(_, c)| c.is_whitespace())
            .map(|(index, c)| index + c.len_utf8()),
    );
    starts
        .map(|start| text[start..].trim())
        .filter(|candidate| !candidate.is_empty())
        .find_map(|candidate| {
            PAGE_DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(candidate, format).ok())
        })
}

/// Kind of journal page
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PageType {
    /// One day
    Daily,
    /// One week
    Weekly,
    /// One month
    Monthly,
    /// Unrecognised layout
    #[default]
    Unknown,
}

impl Display for PageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl FromStr for PageType {
    type Err = std::convert::Infallible;

    /// Unrecognised names map to [`PageType::Unknown`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            _ => Self::Unknown,
        })
    }
}

/// Tracker priority of a task
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Prepared priorities
    High,
    /// Ordinary to-dos
    #[default]
    Normal,
    /// Nice to have
    Low,
}

impl TaskPriority {
    /// Numeric priority understood by the tracker API
    #[inline]
    #[must_use]
    pub const fn api_value(self) -> u8 {
        match self {
            Self::High => 1,
            Self::Normal => 3,
            Self::Low => 4,
        }
    }
}

impl Display for TaskPriority {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => f.write_str("high"),
            Self::Normal => f.write_str("normal"),
            Self::Low => f.write_str("low"),
        }
    }
}

/// Ordered list of field names probed for an item's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPriority(Vec<String>);

impl Default for FieldPriority {
    fn default() -> Self {
        Self::new(DEFAULT_FIELD_PRIORITY)
    }
}

impl FieldPriority {
    /// Create from field names, highest priority first
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    /// Priority list with no fields; nothing resolves
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// Field names in priority order
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.0
    }

    /// First field holding non-blank text
    #[must_use]
    pub fn resolve<'a>(&'a self, item: &'a Item) -> Option<ResolvedText<'a>> {
        self.0.iter().find_map(|field| {
            item.text(field).map(|text| ResolvedText {
                field: field.as_str(),
                text,
            })
        })
    }
}

/// Text found in an item, with the field it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedText<'a> {
    /// Field name
    pub field: &'a str,
    /// Untrimmed text
    pub text: &'a str,
}

/// Declaration of one section of a page
#[derive(Debug, Clone, PartialEq)]
pub struct SectionSpec {
    /// Section name
    pub name: String,
    /// Expected shape
    pub shape: SectionShape,
    /// Where item text lives
    pub field_priority: FieldPriority,
    /// Priority of tasks derived from this section, if any
    pub task_priority: Option<TaskPriority>,
    /// Section holds the page date used as the task scope
    pub due_source: bool,
}

impl SectionSpec {
    /// Scalar section with the default field priority
    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: SectionShape::Scalar,
            field_priority: FieldPriority::default(),
            task_priority: None,
            due_source: false,
        }
    }

    /// Sequence section with the default field priority
    #[must_use]
    pub fn sequence(name: impl Into<String>) -> Self {
        Self {
            shape: SectionShape::Sequence,
            ..Self::scalar(name)
        }
    }

    /// Builder: set text fields
    #[inline]
    #[must_use]
    pub fn with_fields(mut self, fields: FieldPriority) -> Self {
        self.field_priority = fields;
        self
    }

    /// Builder: mark as a task source
    #[inline]
    #[must_use]
    pub fn yields_tasks(mut self, priority: TaskPriority) -> Self {
        self.task_priority = Some(priority);
        self
    }

    /// Builder: mark as the due-date source
    #[inline]
    #[must_use]
    pub fn due_source(mut self) -> Self {
        self.due_source = true;
        self
    }
}

/// Candidate task derived from a record
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TaskCandidate {
    /// Trimmed task text
    pub text: String,
    /// Tracker priority
    pub priority: TaskPriority,
}

impl TaskCandidate {
    /// Create candidate
    #[inline]
    #[must_use]
    pub fn new(text: impl Into<String>, priority: TaskPriority) -> Self {
        Self {
            text: text.into(),
            priority,
        }
    }
}

/// Section layout of one page type
#[derive(Debug, Clone, PartialEq)]
pub struct PageSchema {
    page_type: PageType,
    sections: IndexMap<String, SectionSpec>,
    fallback_priority: FieldPriority,
}

impl PageSchema {
    /// Create schema with no declared sections
    #[must_use]
    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            sections: IndexMap::new(),
            fallback_priority: FieldPriority::default(),
        }
    }

    /// Builder: declare a section
    #[inline]
    #[must_use]
    pub fn with_section(mut self, spec: SectionSpec) -> Self {
        self.sections.insert(spec.name.clone(), spec);
        self
    }

    /// Schema for unrecognised pages
    #[must_use]
    pub fn generic() -> Self {
        Self::new(PageType::Unknown)
            .with_section(SectionSpec::sequence("prepare_priority").yields_tasks(TaskPriority::High))
            .with_section(SectionSpec::sequence("to_do").yields_tasks(TaskPriority::Normal))
    }

    /// Daily page layout
    #[must_use]
    pub fn daily() -> Self {
        let item_only = FieldPriority::new(["item"]);
        Self::new(PageType::Daily)
            .with_section(SectionSpec::scalar("date").due_source())
            .with_section(SectionSpec::scalar("habit"))
            .with_section(SectionSpec::scalar("theme"))
            .with_section(
                SectionSpec::sequence("prepare_priority")
                    .with_fields(FieldPriority::new(["task"]))
                    .yields_tasks(TaskPriority::High),
            )
            .with_section(
                SectionSpec::sequence("to_do")
                    .with_fields(FieldPriority::new(["task", "item"]))
                    .yields_tasks(TaskPriority::Normal),
            )
            .with_section(SectionSpec::sequence("i_am_grateful_for").with_fields(item_only.clone()))
            .with_section(
                SectionSpec::sequence("i_am_looking_forward_to").with_fields(item_only.clone()),
            )
            .with_section(SectionSpec::sequence("ways_i_can_give").with_fields(item_only))
            // hour/activities rows carry no reviewable text
            .with_section(SectionSpec::sequence("daily").with_fields(FieldPriority::none()))
            .with_section(SectionSpec::scalar("reflect"))
    }

    /// Weekly page layout
    #[must_use]
    pub fn weekly() -> Self {
        Self::new(PageType::Weekly)
            .with_section(SectionSpec::scalar("week").due_source())
            .with_section(SectionSpec::sequence("prepare_priority").yields_tasks(TaskPriority::High))
            .with_section(SectionSpec::sequence("to_do").yields_tasks(TaskPriority::Normal))
            .with_section(SectionSpec::scalar("habit_tracker"))
            .with_section(SectionSpec::scalar("personal_growth"))
            .with_section(SectionSpec::scalar("relationships_growth"))
            .with_section(SectionSpec::scalar("looking_forward_to"))
            .with_section(SectionSpec::scalar("reflect"))
    }

    /// Monthly page layout
    #[must_use]
    pub fn monthly() -> Self {
        Self::new(PageType::Monthly)
            .with_section(SectionSpec::scalar("month"))
            .with_section(SectionSpec::scalar("habit"))
            .with_section(SectionSpec::scalar("theme"))
            .with_section(
                SectionSpec::sequence("calendar").with_fields(FieldPriority::new(["value"])),
            )
            .with_section(
                SectionSpec::sequence("prepare_priority")
                    .with_fields(FieldPriority::new(["task"]))
                    .yields_tasks(TaskPriority::High),
            )
            .with_section(SectionSpec::scalar("monthly_check_in"))
            .with_section(SectionSpec::scalar("reflect"))
    }

    /// Built-in schema for a page type
    #[must_use]
    pub fn for_page(page_type: PageType) -> Self {
        match page_type {
            PageType::Daily => Self::daily(),
            PageType::Weekly => Self::weekly(),
            PageType::Monthly => Self::monthly(),
            PageType::Unknown => Self::generic(),
        }
    }

    /// Page type this schema describes
    #[inline]
    #[must_use]
    pub fn page_type(&self) -> PageType {
        self.page_type
    }

    /// Declared section, if any
    #[inline]
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&SectionSpec> {
        self.sections.get(name)
    }

    /// Declared sections in layout order
    #[inline]
    pub fn sections(&self) -> impl Iterator<Item = &SectionSpec> {
        self.sections.values()
    }

    /// Text fields for a section, falling back to the default list
    #[must_use]
    pub fn field_priority_for(&self, section: &str) -> &FieldPriority {
        self.sections
            .get(section)
            .map_or(&self.fallback_priority, |spec| &spec.field_priority)
    }

    /// Check that declared sections present in the record have the declared shape
    ///
    /// Sections the schema does not declare are accepted as-is.
    ///
    /// # Errors
    /// Returns [`RecordError::ShapeMismatch`] for the first offending section
    pub fn validate(&self, record: &ExtractionRecord) -> Result<(), RecordError> {
        for (name, section) in record.sections() {
            if let Some(spec) = self.sections.get(name) {
                if spec.shape != section.shape() {
                    return Err(RecordError::ShapeMismatch {
                        section: name.to_string(),
                        expected: spec.shape,
                        found: section.shape(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Derive task candidates from every task-yielding section
    ///
    /// Candidates follow record section order then item order. Items with no
    /// resolvable text are skipped.
    #[must_use]
    pub fn candidate_tasks(&self, record: &ExtractionRecord) -> Vec<TaskCandidate> {
        let mut candidates = Vec::new();
        for (name, section) in record.sections() {
            let Some(spec) = self.sections.get(name) else {
                continue;
            };
            let (Some(priority), Some(items)) = (spec.task_priority, section.as_sequence()) else {
                continue;
            };
            candidates.extend(items.iter().filter_map(|item| {
                spec.field_priority
                    .resolve(item)
                    .map(|resolved| TaskCandidate::new(resolved.text.trim(), priority))
            }));
        }
        candidates
    }

    /// Raw text of the due-date section, if the page has one
    #[must_use]
    pub fn due_text(&self, record: &ExtractionRecord) -> Option<String> {
        self.sections
            .values()
            .filter(|spec| spec.due_source)
            .find_map(|spec| match record.section(&spec.name) {
                Some(Section::Scalar(item)) => spec
                    .field_priority
                    .resolve(item)
                    .map(|resolved| resolved.text.trim().to_string()),
                _ => None,
            })
    }

    /// Task scope: the page date as `YYYY-MM-DD`
    ///
    /// [`DEFAULT_DUE`] when the page has no date or it cannot be parsed.
    #[must_use]
    pub fn due_hint(&self, record: &ExtractionRecord) -> String {
        self.due_text(record)
            .as_deref()
            .and_then(parse_page_date)
            .map_or_else(
                || DEFAULT_DUE.to_string(),
                |date| date.format(DUE_DATE_FORMAT).to_string(),
            )
    }
}

/// Schemas keyed by page type
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: IndexMap<PageType, PageSchema>,
    generic: PageSchema,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SchemaRegistry {
    /// Registry holding the built-in layouts
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self {
            schemas: IndexMap::new(),
            generic: PageSchema::generic(),
        };
        registry.register(PageSchema::daily());
        registry.register(PageSchema::weekly());
        registry.register(PageSchema::monthly());
        registry
    }

    /// Register or replace the schema for its page type
    pub fn register(&mut self, schema: PageSchema) {
        if schema.page_type() == PageType::Unknown {
            self.generic = schema;
        } else {
            self.schemas.insert(schema.page_type(), schema);
        }
    }

    /// Schema for a page type, the generic one when unregistered
    #[must_use]
    pub fn get(&self, page_type: PageType) -> &PageSchema {
        self.schemas.get(&page_type).unwrap_or(&self.generic)
    }
}
