//! Knowledge base data model

use serde::{Deserialize, Deserializer, Serialize};

/// Stable identifier of a knowledge entry (the CMS row id)
pub type EntryId = u64;

/// Canonical form of a category id: trimmed and lowercased, `None` when blank.
///
/// Stored entries and requested categories both go through this, so filters
/// compare like with like whatever casing the CMS sent.
pub fn normalize_category(raw: &str) -> Option<String> {
    let category = raw.trim().to_lowercase();
    (!category.is_empty()).then_some(category)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(u64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CategoryRepr {
    Text(String),
    Number(i64),
}

/// Accept an entry id sent either as a JSON number or a numeric string
pub fn deserialize_entry_id<'de, D>(deserializer: D) -> std::result::Result<EntryId, D::Error>
where
    D: Deserializer<'de>,
{
    match IdRepr::deserialize(deserializer)? {
        IdRepr::Number(id) => Ok(id),
        IdRepr::Text(text) => text.trim().parse().map_err(|_| {
            serde::de::Error::custom(format!("invalid entry id '{}'", text))
        }),
    }
}

fn deserialize_category<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<CategoryRepr>::deserialize(deserializer)? {
        Some(CategoryRepr::Text(text)) => normalize_category(&text),
        Some(CategoryRepr::Number(n)) => Some(n.to_string()),
        None => None,
    })
}

/// A pre-authored question/answer record usable as a retrieval candidate.
///
/// The index owns these; the pipeline only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Unique entry id
    #[serde(deserialize_with = "deserialize_entry_id")]
    pub id: EntryId,
    /// Canonical question text (never empty)
    pub question: String,
    /// Answer reference returned to the assistant
    pub answer: String,
    /// Category id in canonical form, when the entry was filed under one
    #[serde(default, deserialize_with = "deserialize_category")]
    pub category: Option<String>,
}

impl KnowledgeEntry {
    pub fn new(id: EntryId, question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            id,
            question: question.into(),
            answer: answer.into(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: impl AsRef<str>) -> Self {
        self.category = normalize_category(category.as_ref());
        self
    }

    /// Bring the category into canonical form in place
    pub fn normalized(mut self) -> Self {
        self.category = self.category.as_deref().and_then(normalize_category);
        self
    }

    /// An entry is storable only with a non-blank question
    pub fn is_valid(&self) -> bool {
        !self.question.trim().is_empty()
    }
}

/// Static category reference data used for keyword detection and filtering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category id (matches `KnowledgeEntry::category`)
    pub id: String,
    /// Human readable name
    pub name: String,
    /// Keywords in priority order
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// A single hit returned by the index.
///
/// `score` is the native similarity for dense hits and `None` for
/// lexical matches, which carry no ranking guarantee.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub entry: KnowledgeEntry,
    pub score: Option<f32>,
}

impl IndexHit {
    pub fn dense(entry: KnowledgeEntry, score: f32) -> Self {
        Self {
            entry,
            score: Some(score),
        }
    }

    pub fn lexical(entry: KnowledgeEntry) -> Self {
        Self { entry, score: None }
    }

    pub fn id(&self) -> EntryId {
        self.entry.id
    }
}
