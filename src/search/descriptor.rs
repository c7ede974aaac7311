//! Index naming, settings and mappings derived from a record class

use crate::config::IndexingConfig;
use crate::search::config::{RecordClass, ID_FIELD, KIND_FIELD, SEARCH_ALL_FIELD};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

pub const INDEX_ANALYZER: &str = "searchlink_index";
pub const SEARCH_ANALYZER: &str = "searchlink_search";
pub const AUTOCOMPLETE_INDEX_ANALYZER: &str = "searchlink_autocomplete_index";
pub const AUTOCOMPLETE_SEARCH_ANALYZER: &str = "searchlink_autocomplete_search";
pub const SUGGEST_ANALYZER: &str = "searchlink_suggest";

/// Sub-field carrying the analyzed (synonym-aware) text of a string field
pub const ANALYZED_SUBFIELD: &str = "analyzed";
pub const AUTOCOMPLETE_SUBFIELD: &str = "autocomplete";
pub const SUGGEST_SUBFIELD: &str = "suggest";

const EDGE_NGRAM_FILTER: &str = "searchlink_edge_ngram";
const SHINGLE_FILTER: &str = "searchlink_shingle";
const BASE_FILTERS: [&str; 2] = ["lowercase", "asciifolding"];

/// `yyyyMMddHHmmssSSS` with an optional `_n` disambiguator
static VERSION_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{17}(_\d+)?$").unwrap());

/// Everything needed to create an index for one record class
#[derive(Debug, Clone)]
pub struct IndexDescriptor {
    class: RecordClass,
    alias: String,
    settings: Value,
    mappings: Value,
}

impl IndexDescriptor {
    pub fn new(class: RecordClass, indexing: &IndexingConfig) -> Self {
        let alias = alias_name(class.name(), indexing);
        let settings = build_settings(&class, indexing);
        let mappings = build_mappings(&class);
        Self {
            class,
            alias,
            settings,
            mappings,
        }
    }

    /// Stable name readers and writers go through
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn class(&self) -> &RecordClass {
        &self.class
    }

    pub fn settings(&self) -> &Value {
        &self.settings
    }

    pub fn mappings(&self) -> &Value {
        &self.mappings
    }

    /// Index creation body
    pub fn body(&self) -> Value {
        json!({ "settings": self.settings, "mappings": self.mappings })
    }

    /// Name of a new versioned index created at `at`
    pub fn versioned_name(&self, at: DateTime<Utc>) -> String {
        format!("{}_{}", self.alias, at.format("%Y%m%d%H%M%S%3f"))
    }

    /// Whether `name` is a versioned index belonging to this alias
    pub fn is_versioned_name(&self, name: &str) -> bool {
        name.strip_prefix(&self.alias)
            .and_then(|rest| rest.strip_prefix('_'))
            .map(|suffix| VERSION_SUFFIX.is_match(suffix))
            .unwrap_or(false)
    }

    /// Wildcard pattern matching every versioned index of this alias
    pub fn versioned_pattern(&self) -> String {
        format!("{}_*", self.alias)
    }
}

fn alias_name(class_name: &str, indexing: &IndexingConfig) -> String {
    let mut base = snake_case(class_name);
    if !base.ends_with('s') {
        base.push('s');
    }

    let mut parts = Vec::new();
    if let Some(prefix) = indexing.index_prefix.as_deref().filter(|p| !p.is_empty()) {
        parts.push(prefix.to_lowercase());
    }
    parts.push(base);
    if let Some(suffix) = indexing.index_suffix.as_deref().filter(|s| !s.is_empty()) {
        parts.push(suffix.to_lowercase());
    }
    parts.join("_")
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.trim().chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c.is_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out
}

fn synonym_filter_name(i: usize) -> String {
    format!("searchlink_synonym_{}", i)
}

fn analyzer(filters: Vec<String>) -> Value {
    json!({ "type": "custom", "tokenizer": "standard", "filter": filters })
}

fn base_filters() -> Vec<String> {
    BASE_FILTERS.iter().map(|f| f.to_string()).collect()
}

fn build_settings(class: &RecordClass, indexing: &IndexingConfig) -> Value {
    let config = class.config();
    let groups = config.normalized_synonyms();

    let mut analyzers = Map::new();
    let mut filters = Map::new();

    analyzers.insert(INDEX_ANALYZER.to_string(), analyzer(base_filters()));

    let mut search_filters = base_filters();
    for (i, group) in groups.iter().enumerate() {
        let name = synonym_filter_name(i);
        filters.insert(
            name.clone(),
            json!({ "type": "synonym_graph", "synonyms": [group.join(",")], "expand": true }),
        );
        let mut group_filters = base_filters();
        group_filters.push(name.clone());
        analyzers.insert(name.clone(), analyzer(group_filters));
        search_filters.push(name);
    }
    analyzers.insert(SEARCH_ANALYZER.to_string(), analyzer(search_filters));

    if !config.autocomplete.is_empty() {
        filters.insert(
            EDGE_NGRAM_FILTER.to_string(),
            json!({ "type": "edge_ngram", "min_gram": 1, "max_gram": 20 }),
        );
        let mut index_filters = base_filters();
        index_filters.push(EDGE_NGRAM_FILTER.to_string());
        analyzers.insert(AUTOCOMPLETE_INDEX_ANALYZER.to_string(), analyzer(index_filters));
        analyzers.insert(AUTOCOMPLETE_SEARCH_ANALYZER.to_string(), analyzer(base_filters()));
    }

    if !config.suggest.is_empty() {
        filters.insert(
            SHINGLE_FILTER.to_string(),
            json!({ "type": "shingle", "min_shingle_size": 2, "max_shingle_size": 3 }),
        );
        let mut suggest_filters = base_filters();
        suggest_filters.push(SHINGLE_FILTER.to_string());
        analyzers.insert(SUGGEST_ANALYZER.to_string(), analyzer(suggest_filters));
    }

    json!({
        "index": {
            "number_of_shards": indexing.number_of_shards,
            "number_of_replicas": indexing.number_of_replicas
        },
        "analysis": {
            "analyzer": analyzers,
            "filter": filters
        }
    })
}

fn text_subfield(index_analyzer: &str, search_analyzer: &str) -> Value {
    json!({ "type": "text", "analyzer": index_analyzer, "search_analyzer": search_analyzer })
}

/// Keyword main field for exact filters/sorting plus analyzed sub-fields
fn string_mapping(autocomplete: bool, suggest: bool) -> Value {
    let mut subfields = Map::new();
    subfields.insert(
        ANALYZED_SUBFIELD.to_string(),
        text_subfield(INDEX_ANALYZER, SEARCH_ANALYZER),
    );
    if autocomplete {
        subfields.insert(
            AUTOCOMPLETE_SUBFIELD.to_string(),
            text_subfield(AUTOCOMPLETE_INDEX_ANALYZER, AUTOCOMPLETE_SEARCH_ANALYZER),
        );
    }
    if suggest {
        subfields.insert(
            SUGGEST_SUBFIELD.to_string(),
            text_subfield(SUGGEST_ANALYZER, SUGGEST_ANALYZER),
        );
    }
    json!({ "type": "keyword", "copy_to": SEARCH_ALL_FIELD, "fields": subfields })
}

fn build_mappings(class: &RecordClass) -> Value {
    let config = class.config();
    let mut properties = Map::new();

    properties.insert(ID_FIELD.to_string(), json!({ "type": "keyword" }));
    if class.has_hierarchy() {
        properties.insert(KIND_FIELD.to_string(), json!({ "type": "keyword" }));
    }
    properties.insert(
        SEARCH_ALL_FIELD.to_string(),
        text_subfield(INDEX_ANALYZER, SEARCH_ANALYZER),
    );

    let text_fields = config
        .searchable
        .iter()
        .chain(&config.autocomplete)
        .chain(&config.suggest);
    for field in text_fields {
        properties.insert(
            field.clone(),
            string_mapping(config.is_autocomplete(field), config.is_suggest(field)),
        );
    }

    for field in &config.locations {
        properties.insert(field.clone(), json!({ "type": "geo_point" }));
    }

    if let Some(ref field) = config.conversions {
        properties.insert(
            field.clone(),
            json!({
                "type": "nested",
                "properties": {
                    "query": { "type": "keyword" },
                    "count": { "type": "long" }
                }
            }),
        );
    }

    if let Some(ref field) = config.personalize {
        properties.insert(field.clone(), json!({ "type": "keyword" }));
    }

    json!({
        "dynamic_templates": [{
            "strings": {
                "match_mapping_type": "string",
                "mapping": string_mapping(false, false)
            }
        }],
        "properties": properties
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::config::SearchConfig;
    use chrono::TimeZone;

    fn product_descriptor() -> IndexDescriptor {
        let config = SearchConfig::builder()
            .synonyms(["clorox", "bleach"])
            .synonyms(["Bleach", "CLOROX"])
            .synonyms(["burger", "hamburger"])
            .autocomplete("name")
            .suggest("name")
            .suggest("color")
            .conversions("conversions")
            .personalize("user_ids")
            .location("location")
            .build()
            .unwrap();
        let class = RecordClass::new("Product", config).unwrap();
        let indexing = IndexingConfig {
            index_suffix: Some("test".to_string()),
            ..Default::default()
        };
        IndexDescriptor::new(class, &indexing)
    }

    #[test]
    fn test_alias_name() {
        assert_eq!(product_descriptor().alias(), "products_test");

        let indexing = IndexingConfig {
            index_prefix: Some("Shop".to_string()),
            ..Default::default()
        };
        let class = RecordClass::new("BlogPost", SearchConfig::default()).unwrap();
        assert_eq!(IndexDescriptor::new(class, &indexing).alias(), "shop_blog_posts");

        let class = RecordClass::new("news", SearchConfig::default()).unwrap();
        assert_eq!(IndexDescriptor::new(class, &IndexingConfig::default()).alias(), "news");
    }

    #[test]
    fn test_one_synonym_filter_per_distinct_group() {
        let descriptor = product_descriptor();
        let analysis = &descriptor.settings()["analysis"];

        assert_eq!(
            analysis["filter"]["searchlink_synonym_0"]["synonyms"],
            json!(["clorox,bleach"])
        );
        assert_eq!(
            analysis["filter"]["searchlink_synonym_1"]["synonyms"],
            json!(["burger,hamburger"])
        );
        assert!(analysis["filter"].get("searchlink_synonym_2").is_none());
        assert!(analysis["analyzer"].get("searchlink_synonym_1").is_some());

        let search_filters = &analysis["analyzer"][SEARCH_ANALYZER]["filter"];
        assert_eq!(
            search_filters,
            &json!(["lowercase", "asciifolding", "searchlink_synonym_0", "searchlink_synonym_1"])
        );
    }

    #[test]
    fn test_field_mappings() {
        let descriptor = product_descriptor();
        let properties = &descriptor.mappings()["properties"];

        assert_eq!(properties["location"], json!({ "type": "geo_point" }));
        assert_eq!(properties["user_ids"], json!({ "type": "keyword" }));
        assert_eq!(properties["conversions"]["type"], "nested");
        assert_eq!(
            properties["name"]["fields"]["autocomplete"]["analyzer"],
            AUTOCOMPLETE_INDEX_ANALYZER
        );
        assert_eq!(properties["name"]["fields"]["suggest"]["analyzer"], SUGGEST_ANALYZER);
        assert!(properties["color"]["fields"].get("autocomplete").is_none());
        assert!(properties.get("kind").is_none());
    }

    #[test]
    fn test_hierarchy_adds_discriminator() {
        let class = RecordClass::with_kinds("Animal", ["dog", "cat"], SearchConfig::default()).unwrap();
        let descriptor = IndexDescriptor::new(class, &IndexingConfig::default());

        assert_eq!(descriptor.alias(), "animals");
        assert_eq!(descriptor.mappings()["properties"]["kind"], json!({ "type": "keyword" }));
        // no autocomplete or suggest analyzers without declared fields
        assert!(descriptor.settings()["analysis"]["analyzer"]
            .get(AUTOCOMPLETE_INDEX_ANALYZER)
            .is_none());
    }

    #[test]
    fn test_versioned_names() {
        let descriptor = product_descriptor();
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let name = descriptor.versioned_name(at);

        assert_eq!(name, "products_test_20240309140507000");
        assert!(descriptor.is_versioned_name(&name));
        assert!(descriptor.is_versioned_name("products_test_20240309140507000_2"));
        assert!(!descriptor.is_versioned_name("products_test"));
        assert!(!descriptor.is_versioned_name("products_test_backup"));
        assert!(!descriptor.is_versioned_name("products_test_20240309140507000_x"));
        assert_eq!(descriptor.versioned_pattern(), "products_test_*");
    }
}
