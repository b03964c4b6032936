//! Lexicon: static word lists and category tables
//!
//! Loaded once at startup from YAML or TOML and shared read-only behind
//! an `Arc`. Any field missing from the file keeps its built-in default,
//! so a deployment can override e.g. only the categories.

use std::collections::HashSet;
use std::path::Path;

use civic_qa_core::Category;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Reference data used by the normalizer, the category classifier and the
/// domain gate. All terms are stored lowercase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lexicon {
    /// Categories in declaration order; the first keyword hit wins
    #[serde(default = "default_categories")]
    pub categories: Vec<Category>,

    /// Tokens dropped by `tokenize_filtered`
    #[serde(default = "default_stopwords")]
    pub stopwords: HashSet<String>,

    /// Phrases naming the served city, stripped during normalization
    #[serde(default = "default_city_phrases")]
    pub city_phrases: Vec<String>,

    /// Out-of-scope place names rejected by the domain gate
    #[serde(default = "default_blacklisted_places")]
    pub blacklisted_places: Vec<String>,

    /// Opinion / subjective terms rejected by the domain gate
    #[serde(default = "default_opinion_terms")]
    pub opinion_terms: Vec<String>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            stopwords: default_stopwords(),
            city_phrases: default_city_phrases(),
            blacklisted_places: default_blacklisted_places(),
            opinion_terms: default_opinion_terms(),
        }
    }
}

impl Lexicon {
    /// Load from a YAML or TOML file (chosen by extension, YAML otherwise)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;

        let lexicon: Lexicon = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?
            }
            _ => serde_yaml::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?,
        };

        let lexicon = lexicon.lowercased();
        lexicon.validate()?;

        tracing::info!(
            path = %path.display(),
            categories = lexicon.categories.len(),
            stopwords = lexicon.stopwords.len(),
            "Loaded lexicon"
        );

        Ok(lexicon)
    }

    /// Load from `path` when given, otherwise use the built-in tables
    pub fn load_or_default(path: Option<&str>) -> Result<Self, ConfigError> {
        match path {
            Some(p) if !p.trim().is_empty() => Self::load(p),
            _ => Ok(Self::default()),
        }
    }

    /// Look up a category by id
    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    fn lowercased(mut self) -> Self {
        for category in &mut self.categories {
            for keyword in &mut category.keywords {
                *keyword = keyword.to_lowercase();
            }
        }
        self.stopwords = self.stopwords.iter().map(|w| w.to_lowercase()).collect();
        for list in [
            &mut self.city_phrases,
            &mut self.blacklisted_places,
            &mut self.opinion_terms,
        ] {
            for term in list.iter_mut() {
                *term = term.to_lowercase();
            }
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.id.trim().is_empty() {
                return Err(ConfigError::MissingField("categories[].id".to_string()));
            }
            if !seen.insert(category.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "categories".to_string(),
                    message: format!("duplicate category id '{}'", category.id),
                });
            }
            if category.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("categories.{}.keywords", category.id),
                    message: "keywords cannot be blank".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn default_categories() -> Vec<Category> {
    vec![
        Category::new(
            "kependudukan",
            "Kependudukan dan Pencatatan Sipil",
            &["ktp", "kartu keluarga", "akta", "pindah domisili", "dukcapil"],
        ),
        Category::new(
            "perizinan",
            "Perizinan dan Penanaman Modal",
            &["izin", "imb", "pbg", "siup", "reklame"],
        ),
        Category::new(
            "pajak",
            "Pajak dan Retribusi Daerah",
            &["pajak", "pbb", "bphtb", "retribusi", "njop"],
        ),
        Category::new(
            "kesehatan",
            "Kesehatan",
            &["puskesmas", "rumah sakit", "bpjs", "vaksin", "posyandu", "kesehatan"],
        ),
        Category::new(
            "pendidikan",
            "Pendidikan",
            &["sekolah", "ppdb", "beasiswa", "pendidikan", "guru"],
        ),
        Category::new(
            "sosial",
            "Sosial",
            &["bansos", "bantuan sosial", "dtks", "pkh", "disabilitas", "lansia"],
        ),
        Category::new(
            "lingkungan",
            "Lingkungan Hidup dan Kebersihan",
            &["sampah", "banjir", "drainase", "kebersihan", "pohon", "limbah"],
        ),
        Category::new(
            "perhubungan",
            "Perhubungan",
            &["parkir", "angkot", "lampu jalan", "terminal", "lalu lintas"],
        ),
    ]
}

fn default_stopwords() -> HashSet<String> {
    [
        "yang", "dan", "di", "ke", "dari", "untuk", "dengan", "pada", "ini", "itu", "atau",
        "juga", "ada", "tidak", "apa", "apakah", "bagaimana", "gimana", "cara", "saya", "aku",
        "kami", "kita", "anda", "mau", "ingin", "bisa", "dapat", "harus", "akan", "sudah",
        "belum", "bila", "jika", "kalau", "agar", "supaya", "tolong", "mohon", "dong", "nya",
        "kah", "lah", "pak", "bu", "min", "admin", "kak", "tentang", "mengenai", "seperti",
        "adalah", "oleh", "saat", "kapan", "dimana", "mana", "berapa", "siapa",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_city_phrases() -> Vec<String> {
    [
        "pemerintah kota medan",
        "pemkot medan",
        "di kota medan",
        "kota medan",
        "di medan",
        "warga medan",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_blacklisted_places() -> Vec<String> {
    [
        "jakarta", "surabaya", "bandung", "bali", "denpasar", "yogyakarta", "jogja",
        "semarang", "makassar", "palembang", "pekanbaru", "padang", "batam", "aceh",
        "binjai", "deli serdang", "pematangsiantar", "malaysia", "singapura",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_opinion_terms() -> Vec<String> {
    [
        "menurutmu", "menurut kamu", "menurut anda", "pendapatmu", "pendapat kamu",
        "terbaik", "terburuk", "paling bagus", "paling jelek", "siapa yang lebih",
        "setuju tidak", "gimana perasaan", "suka tidak", "jelek", "bodoh", "korup",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_lowercase() {
        let lexicon = Lexicon::default();
        assert_eq!(lexicon, lexicon.clone().lowercased());
        assert!(lexicon.validate().is_ok());
        assert!(lexicon.category("kependudukan").is_some());
    }

    #[test]
    fn test_load_yaml_keeps_missing_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"
categories:
  - id: air
    name: Air Bersih
    keywords: [PDAM, "Air Bersih"]
opinion_terms: [Menurutmu]
"#
        )
        .unwrap();

        let lexicon = Lexicon::load(file.path()).unwrap();
        assert_eq!(lexicon.categories.len(), 1);
        assert_eq!(lexicon.categories[0].keywords, vec!["pdam", "air bersih"]);
        assert_eq!(lexicon.opinion_terms, vec!["menurutmu"]);
        assert_eq!(lexicon.stopwords, default_stopwords());
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
blacklisted_places = ["Jakarta"]

[[categories]]
id = "pajak"
name = "Pajak"
keywords = ["pbb"]
"#
        )
        .unwrap();

        let lexicon = Lexicon::load(file.path()).unwrap();
        assert_eq!(lexicon.blacklisted_places, vec!["jakarta"]);
        assert_eq!(lexicon.categories[0].id, "pajak");
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"
categories:
  - {{ id: a, name: A, keywords: [x] }}
  - {{ id: a, name: B, keywords: [y] }}
"#
        )
        .unwrap();

        assert!(matches!(
            Lexicon::load(file.path()),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Lexicon::load("/nonexistent/lexicon.yaml"),
            Err(ConfigError::FileNotFound(_))
        ));
        assert!(Lexicon::load_or_default(None).is_ok());
    }
}
