//! Per-record-class search configuration

use crate::search::error::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Document field holding the type-hierarchy discriminator
pub const KIND_FIELD: &str = "kind";

/// Document field holding the record identifier
pub const ID_FIELD: &str = "id";

/// Catch-all text field every string attribute is copied into
pub const SEARCH_ALL_FIELD: &str = "search_all";

const RESERVED_FIELDS: [&str; 3] = [ID_FIELD, KIND_FIELD, SEARCH_ALL_FIELD];

/// Search configuration declared once per record class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Groups of mutually matching terms, in declaration order
    #[serde(default)]
    pub synonyms: Vec<Vec<String>>,

    /// Fields indexed for prefix matching
    #[serde(default)]
    pub autocomplete: Vec<String>,

    /// Fields indexed for "did you mean" fallback matching
    #[serde(default)]
    pub suggest: Vec<String>,

    /// Fields the search term is matched against; empty means every string attribute
    #[serde(default)]
    pub searchable: Vec<String>,

    /// Name of the conversions field (term -> interaction count)
    pub conversions: Option<String>,

    /// Name of the personalization field (actor identifiers)
    pub personalize: Option<String>,

    /// Geo-point fields
    #[serde(default)]
    pub locations: Vec<String>,

    /// Terms shorter than this many characters are treated as autocomplete
    pub autocomplete_threshold: Option<usize>,
}

impl SearchConfig {
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::new()
    }

    pub fn is_autocomplete(&self, field: &str) -> bool {
        self.autocomplete.iter().any(|f| f == field)
    }

    pub fn is_suggest(&self, field: &str) -> bool {
        self.suggest.iter().any(|f| f == field)
    }

    pub fn is_location(&self, field: &str) -> bool {
        self.locations.iter().any(|f| f == field)
    }

    /// Synonym groups lower-cased, trimmed and de-duplicated.
    ///
    /// Groups with fewer than two distinct terms are dropped and identical
    /// groups are kept once, in first-declaration order.
    pub fn normalized_synonyms(&self) -> Vec<Vec<String>> {
        let mut seen = BTreeSet::new();
        let mut groups = Vec::new();

        for group in &self.synonyms {
            let mut terms: Vec<String> = Vec::new();
            for term in group {
                let term = term.trim().to_lowercase();
                if !term.is_empty() && !terms.contains(&term) {
                    terms.push(term);
                }
            }
            if terms.len() < 2 {
                continue;
            }
            let mut key = terms.clone();
            key.sort();
            if seen.insert(key) {
                groups.push(terms);
            }
        }

        groups
    }

    /// Check that every field is declared in roles it can satisfy together
    pub fn validate(&self) -> SearchResult<()> {
        let declared = self
            .autocomplete
            .iter()
            .chain(&self.suggest)
            .chain(&self.searchable)
            .chain(&self.locations)
            .chain(self.conversions.iter())
            .chain(self.personalize.iter());

        for field in declared {
            if field.trim().is_empty() {
                return Err(SearchError::Configuration(
                    "field names must not be empty".to_string(),
                ));
            }
            if RESERVED_FIELDS.contains(&field.as_str()) {
                return Err(SearchError::Configuration(format!(
                    "field '{}' is reserved",
                    field
                )));
            }
        }

        // geo_point fields cannot carry the text sub-fields autocomplete/suggest need
        for field in &self.locations {
            if self.is_autocomplete(field) || self.is_suggest(field) || self.searchable.contains(field) {
                return Err(SearchError::Configuration(format!(
                    "field '{}' cannot be both a location and a text field",
                    field
                )));
            }
        }

        let payloads = [
            ("conversions", self.conversions.as_ref()),
            ("personalize", self.personalize.as_ref()),
        ];
        for (role, field) in payloads {
            let Some(field) = field else { continue };
            if self.is_location(field)
                || self.is_autocomplete(field)
                || self.is_suggest(field)
                || self.searchable.contains(field)
            {
                return Err(SearchError::Configuration(format!(
                    "{} field '{}' is also declared as a text or location field",
                    role, field
                )));
            }
        }
        if let (Some(conversions), Some(personalize)) = (&self.conversions, &self.personalize) {
            if conversions == personalize {
                return Err(SearchError::Configuration(format!(
                    "field '{}' cannot hold both conversions and personalization data",
                    conversions
                )));
            }
        }

        if self.autocomplete_threshold == Some(0) {
            return Err(SearchError::Configuration(
                "autocomplete_threshold must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn synonyms<G, T>(mut self, group: G) -> Self
    where
        G: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.config
            .synonyms
            .push(group.into_iter().map(Into::into).collect());
        self
    }

    pub fn autocomplete(mut self, field: impl Into<String>) -> Self {
        self.config.autocomplete.push(field.into());
        self
    }

    pub fn suggest(mut self, field: impl Into<String>) -> Self {
        self.config.suggest.push(field.into());
        self
    }

    pub fn searchable(mut self, field: impl Into<String>) -> Self {
        self.config.searchable.push(field.into());
        self
    }

    pub fn conversions(mut self, field: impl Into<String>) -> Self {
        self.config.conversions = Some(field.into());
        self
    }

    pub fn personalize(mut self, field: impl Into<String>) -> Self {
        self.config.personalize = Some(field.into());
        self
    }

    pub fn location(mut self, field: impl Into<String>) -> Self {
        self.config.locations.push(field.into());
        self
    }

    pub fn autocomplete_threshold(mut self, chars: usize) -> Self {
        self.config.autocomplete_threshold = Some(chars);
        self
    }

    /// Validate and freeze the configuration
    pub fn build(self) -> SearchResult<SearchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A record class: its name, the kinds sharing its index and its search configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RecordClass {
    name: String,
    kinds: Vec<String>,
    config: SearchConfig,
}

impl RecordClass {
    /// A class without subtypes
    pub fn new(name: impl Into<String>, config: SearchConfig) -> SearchResult<Self> {
        Self::with_kinds(name, Vec::<String>::new(), config)
    }

    /// A base class whose subtypes share its index.
    ///
    /// The base name is always the first kind; `subtypes` lists the others.
    pub fn with_kinds<I, T>(name: impl Into<String>, subtypes: I, config: SearchConfig) -> SearchResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SearchError::Configuration(
                "record class name must not be empty".to_string(),
            ));
        }
        config.validate()?;

        let subtypes: Vec<String> = subtypes.into_iter().map(Into::into).collect();
        let mut kinds = Vec::new();
        if !subtypes.is_empty() {
            kinds.push(name.clone());
            for kind in subtypes {
                if kind.trim().is_empty() {
                    return Err(SearchError::Configuration(format!(
                        "class '{}' declares an empty kind",
                        name
                    )));
                }
                if kinds.contains(&kind) {
                    return Err(SearchError::Configuration(format!(
                        "class '{}' declares kind '{}' twice",
                        name, kind
                    )));
                }
                kinds.push(kind);
            }
        }

        Ok(Self { name, kinds, config })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Declared kinds, base first; empty when the class has no hierarchy
    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    pub fn has_hierarchy(&self) -> bool {
        !self.kinds.is_empty()
    }

    /// Resolve a record's kind against the declared enumeration
    pub fn resolve_kind(&self, kind: Option<&str>) -> Option<&str> {
        if !self.has_hierarchy() {
            return None;
        }
        let kind = kind.unwrap_or(&self.name);
        self.kinds.iter().find(|k| k.as_str() == kind).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_roles() {
        let config = SearchConfig::builder()
            .synonyms(["clorox", "bleach"])
            .autocomplete("name")
            .suggest("name")
            .suggest("color")
            .conversions("conversions")
            .personalize("user_ids")
            .location("location")
            .build()
            .unwrap();

        assert!(config.is_autocomplete("name"));
        assert!(config.is_suggest("color"));
        assert!(config.is_location("location"));
        assert_eq!(config.synonyms.len(), 1);
    }

    #[test]
    fn test_normalized_synonyms() {
        let config = SearchConfig::builder()
            .synonyms(["Clorox", " bleach ", "BLEACH"])
            .synonyms(["bleach", "clorox"])
            .synonyms(["solo"])
            .synonyms(["burger", "hamburger"])
            .build()
            .unwrap();

        assert_eq!(
            config.normalized_synonyms(),
            vec![
                vec!["clorox".to_string(), "bleach".to_string()],
                vec!["burger".to_string(), "hamburger".to_string()],
            ]
        );
    }

    #[test]
    fn test_location_and_autocomplete_are_exclusive() {
        let result = SearchConfig::builder()
            .autocomplete("location")
            .location("location")
            .build();
        assert!(matches!(result, Err(SearchError::Configuration(_))));
    }

    #[test]
    fn test_payload_fields_must_be_distinct() {
        let result = SearchConfig::builder()
            .conversions("stats")
            .personalize("stats")
            .build();
        assert!(matches!(result, Err(SearchError::Configuration(_))));

        let result = SearchConfig::builder().suggest("kind").build();
        assert!(matches!(result, Err(SearchError::Configuration(_))));
    }

    #[test]
    fn test_record_class_kinds() {
        let class = RecordClass::with_kinds("animal", ["dog", "cat"], SearchConfig::default()).unwrap();
        assert_eq!(class.kinds(), &["animal", "dog", "cat"]);
        assert_eq!(class.resolve_kind(Some("dog")), Some("dog"));
        assert_eq!(class.resolve_kind(None), Some("animal"));
        assert_eq!(class.resolve_kind(Some("bird")), None);

        let flat = RecordClass::new("product", SearchConfig::default()).unwrap();
        assert!(!flat.has_hierarchy());
        assert_eq!(flat.resolve_kind(Some("dog")), None);

        assert!(RecordClass::with_kinds("animal", ["dog", "dog"], SearchConfig::default()).is_err());
        assert!(RecordClass::new(" ", SearchConfig::default()).is_err());
    }
}
