//! Query normalization and tokenization primitives

use std::collections::HashSet;
use std::sync::Arc;

use civic_qa_config::Lexicon;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::RagError;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Tokens of this many characters or fewer are dropped
const MIN_TOKEN_CHARS: usize = 2;

/// Text cleanup bound to the deployment lexicon
pub struct QueryNormalizer {
    lexicon: Arc<Lexicon>,
    boilerplate: Option<Regex>,
}

impl QueryNormalizer {
    pub fn new(lexicon: Arc<Lexicon>) -> Result<Self, RagError> {
        let boilerplate = Self::build_boilerplate(&lexicon.city_phrases)?;
        Ok(Self {
            lexicon,
            boilerplate,
        })
    }

    /// Longest phrases first so "pemerintah kota medan" wins over "kota medan"
    fn build_boilerplate(phrases: &[String]) -> Result<Option<Regex>, RagError> {
        let mut phrases: Vec<&str> = phrases
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        if phrases.is_empty() {
            return Ok(None);
        }
        phrases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let alternation = phrases
            .iter()
            .map(|p| {
                p.split_whitespace()
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s+")
            })
            .collect::<Vec<_>>()
            .join("|");

        Regex::new(&format!(r"(?i)\b(?:{})\b", alternation))
            .map(Some)
            .map_err(|e| RagError::Config(format!("invalid city phrase pattern: {}", e)))
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Replace non-word characters with spaces, strip city boilerplate,
    /// collapse whitespace and trim. Case is preserved.
    ///
    /// Idempotent: stripping repeats until no phrase is left, so a second
    /// pass finds nothing to do.
    pub fn normalize(&self, raw: &str) -> String {
        let mut text = collapse(&NON_WORD.replace_all(raw, " "));

        if let Some(re) = &self.boilerplate {
            loop {
                let stripped = collapse(&re.replace_all(&text, " "));
                if stripped == text {
                    break;
                }
                text = stripped;
            }
        }

        text
    }

    /// Lowercased whitespace tokens, minus stopwords and tokens of two
    /// characters or fewer
    pub fn tokenize_filtered(&self, text: &str) -> HashSet<String> {
        text.to_lowercase()
            .split_whitespace()
            .filter(|t| t.chars().count() > MIN_TOKEN_CHARS)
            .filter(|t| !self.lexicon.stopwords.contains(*t))
            .map(str::to_string)
            .collect()
    }

    /// `|A ∩ B| / |A ∪ B|` over filtered tokens; 0 when either side is empty
    pub fn jaccard_overlap(&self, a: &str, b: &str) -> f32 {
        let ta = self.tokenize_filtered(a);
        let tb = self.tokenize_filtered(b);
        if ta.is_empty() || tb.is_empty() {
            return 0.0;
        }

        let intersection = ta.intersection(&tb).count();
        let union = ta.union(&tb).count();
        intersection as f32 / union as f32
    }
}

fn collapse(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Cut `text` to at most `max_graphemes` user-perceived characters for logs
pub fn truncate_for_log(text: &str, max_graphemes: usize) -> String {
    let mut graphemes = text.graphemes(true);
    let head: String = graphemes.by_ref().take(max_graphemes).collect();
    if graphemes.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}
