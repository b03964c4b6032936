//! Keyword category detection

use std::sync::Arc;

use civic_qa_config::Lexicon;
use civic_qa_core::Category;

/// Static keyword-table lookup over the lexicon's categories
pub struct CategoryClassifier {
    lexicon: Arc<Lexicon>,
}

impl CategoryClassifier {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    /// First category, in declaration order, with a keyword that occurs as
    /// a substring of the lowercased text
    pub fn detect(&self, text: &str) -> Option<&Category> {
        let lower = text.to_lowercase();
        self.lexicon
            .categories
            .iter()
            .find(|c| c.keywords.iter().any(|k| lower.contains(k.as_str())))
    }

    /// Category by id, used when the caller supplies one explicitly
    pub fn by_id(&self, id: &str) -> Option<&Category> {
        self.lexicon.category(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(categories: Vec<Category>) -> CategoryClassifier {
        CategoryClassifier::new(Arc::new(Lexicon {
            categories,
            ..Lexicon::default()
        }))
    }

    #[test]
    fn test_detect_default_lexicon() {
        let c = CategoryClassifier::new(Arc::new(Lexicon::default()));
        assert_eq!(c.detect("Bagaimana cara membuat KTP").map(|c| c.id.as_str()), Some("kependudukan"));
        assert_eq!(c.detect("Bayar PBB di mana").map(|c| c.id.as_str()), Some("pajak"));
        assert!(c.detect("halo selamat pagi").is_none());
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let c = classifier(vec![
            Category::new("first", "First", &["izin"]),
            Category::new("second", "Second", &["usaha", "izin"]),
        ]);
        assert_eq!(c.detect("izin usaha").map(|c| c.id.as_str()), Some("first"));
        assert_eq!(c.detect("modal usaha").map(|c| c.id.as_str()), Some("second"));
    }

    #[test]
    fn test_substring_match() {
        let c = classifier(vec![Category::new("air", "Air", &["pdam"])]);
        assert!(c.detect("tagihan PDAMnya naik").is_some());
        assert!(c.by_id("air").is_some());
        assert!(c.by_id("missing").is_none());
    }
}
