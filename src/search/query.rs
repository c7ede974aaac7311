//! Search options and query building

use crate::config::QueryConfig;
use crate::search::config::{RecordClass, KIND_FIELD, SEARCH_ALL_FIELD};
use crate::search::descriptor::{ANALYZED_SUBFIELD, AUTOCOMPLETE_SUBFIELD, SUGGEST_SUBFIELD};
use crate::search::document::GeoPoint;
use crate::search::error::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// Sort order for search results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Explicit ordering on a field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum DistanceUnit {
    #[strum(serialize = "km")]
    Kilometers,
    #[strum(serialize = "mi")]
    Miles,
    #[strum(serialize = "m")]
    Meters,
}

impl DistanceUnit {
    fn kilometers(self) -> f64 {
        match self {
            DistanceUnit::Kilometers => 1.0,
            DistanceUnit::Miles => 1.609_344,
            DistanceUnit::Meters => 0.001,
        }
    }
}

/// A distance such as `10km`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Distance {
    pub value: f64,
    pub unit: DistanceUnit,
}

impl Distance {
    pub fn km(value: f64) -> Self {
        Self {
            value,
            unit: DistanceUnit::Kilometers,
        }
    }

    pub fn miles(value: f64) -> Self {
        Self {
            value,
            unit: DistanceUnit::Miles,
        }
    }

    pub fn as_km(&self) -> f64 {
        self.value * self.unit.kilometers()
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit)
    }
}

impl FromStr for Distance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_alphabetic())
            .ok_or_else(|| format!("distance '{}' has no unit", s))?;
        let (value, unit) = s.split_at(split);
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| format!("distance '{}' is not numeric", s))?;
        let unit = DistanceUnit::from_str(unit.trim()).map_err(|_| format!("unknown distance unit in '{}'", s))?;
        Ok(Self { value, unit })
    }
}

/// Location restriction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Near {
    pub point: GeoPoint,

    /// Maximum distance; without it the location only drives distance sorting
    pub within: Option<Distance>,

    /// Geo field to use; defaults to the first declared location
    pub field: Option<String>,
}

/// Attribute filters ("where" conditions)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Eq {
        field: String,
        value: Value,
    },
    NotEq {
        field: String,
        value: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    Range {
        field: String,
        gt: Option<Value>,
        gte: Option<Value>,
        lt: Option<Value>,
        lte: Option<Value>,
    },
    Exists {
        field: String,
    },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn not_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::NotEq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn any_of<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn at_least(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Range {
            field: field.into(),
            gt: None,
            gte: Some(value.into()),
            lt: None,
            lte: None,
        }
    }

    pub fn below(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Range {
            field: field.into(),
            gt: None,
            gte: None,
            lt: Some(value.into()),
            lte: None,
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Filter::Exists { field: field.into() }
    }

    fn field(&self) -> &str {
        match self {
            Filter::Eq { field, .. }
            | Filter::NotEq { field, .. }
            | Filter::In { field, .. }
            | Filter::Range { field, .. }
            | Filter::Exists { field } => field,
        }
    }

    /// Returns the clause and whether it belongs in `must_not`
    fn to_clause(&self) -> (Value, bool) {
        match self {
            Filter::Eq { field, value } if value.is_null() => (json!({ "exists": { "field": field } }), true),
            Filter::Eq { field, value } => (json!({ "term": { field.as_str(): value } }), false),
            Filter::NotEq { field, value } if value.is_null() => (json!({ "exists": { "field": field } }), false),
            Filter::NotEq { field, value } => (json!({ "term": { field.as_str(): value } }), true),
            Filter::In { field, values } => (json!({ "terms": { field.as_str(): values } }), false),
            Filter::Range {
                field,
                gt,
                gte,
                lt,
                lte,
            } => {
                let mut bounds = Map::new();
                for (name, bound) in [("gt", gt), ("gte", gte), ("lt", lt), ("lte", lte)] {
                    if let Some(bound) = bound {
                        bounds.insert(name.to_string(), bound.clone());
                    }
                }
                (json!({ "range": { field.as_str(): bounds } }), false)
            }
            Filter::Exists { field } => (json!({ "exists": { "field": field } }), false),
        }
    }
}

/// Options of one search call
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchOptions {
    /// Restrict matched fields; `"name^10"` boosts a field
    pub fields: Option<Vec<String>>,

    /// Prefix matching on autocomplete fields
    pub autocomplete: bool,

    /// Edit distance tolerated on the exact clause (misspellings)
    pub misspellings: Option<u8>,

    /// Actor whose past interactions boost relevance
    pub actor_id: Option<String>,

    /// Location restriction / distance origin
    pub near: Option<Near>,

    /// Order by distance from `near` instead of relevance
    pub sort_by_distance: bool,

    /// Attribute filters
    pub filters: Vec<Filter>,

    /// Explicit ordering
    pub order: Vec<OrderBy>,

    /// Restrict to one kind of a type hierarchy
    pub kind: Option<String>,

    /// `Some(false)` disables the suggest fallback
    pub suggest: Option<bool>,

    /// 1-based page number
    pub page: Option<usize>,

    /// Page size (also used as the limit with `offset`)
    pub per_page: Option<usize>,

    /// Absolute offset; takes precedence over `page`
    pub offset: Option<usize>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fields<T: Into<String>>(mut self, fields: impl IntoIterator<Item = T>) -> Self {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_autocomplete(mut self) -> Self {
        self.autocomplete = true;
        self
    }

    pub fn with_misspellings(mut self, edit_distance: u8) -> Self {
        self.misspellings = Some(edit_distance);
        self
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn near(mut self, point: GeoPoint, within: Distance) -> Self {
        self.near = Some(Near {
            point,
            within: Some(within),
            field: None,
        });
        self
    }

    pub fn with_near(mut self, near: Near) -> Self {
        self.near = Some(near);
        self
    }

    pub fn sort_by_distance(mut self) -> Self {
        self.sort_by_distance = true;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order.push(OrderBy {
            field: field.into(),
            order,
        });
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn without_suggest(mut self) -> Self {
        self.suggest = Some(false);
        self
    }

    pub fn with_page(mut self, page: usize, per_page: usize) -> Self {
        self.page = Some(page);
        self.per_page = Some(per_page);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.per_page = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// A target field with an optional boost, parsed from `"name^10"`
#[derive(Debug, Clone, PartialEq)]
struct FieldTarget {
    name: String,
    boost: Option<f64>,
}

impl FieldTarget {
    fn parse(spec: &str) -> SearchResult<Self> {
        let (name, boost) = match spec.split_once('^') {
            Some((name, boost)) => {
                let boost: f64 = boost
                    .parse()
                    .map_err(|_| SearchError::InvalidOptions(format!("invalid field boost in '{}'", spec)))?;
                (name, Some(boost))
            }
            None => (spec, None),
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(SearchError::InvalidOptions("field names must not be empty".to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            boost,
        })
    }

    fn path(&self, subfield: &str) -> String {
        let path = if self.name == SEARCH_ALL_FIELD {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, subfield)
        };
        match self.boost {
            Some(boost) => format!("{}^{}", path, boost),
            None => path,
        }
    }
}

/// A built request, ready for the engine
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Trimmed search term (empty = match all)
    pub term: String,

    /// Fields the term is matched against
    pub fields: Vec<String>,

    /// Whether the autocomplete clause is part of the query
    pub autocomplete: bool,

    /// Primary request body
    pub body: Value,

    /// "Did you mean" request, run only when the primary request has no hits
    pub fallback: Option<Value>,

    pub from: usize,
    pub size: usize,
}

/// Translates a term and options into engine requests
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    defaults: QueryConfig,
}

impl QueryBuilder {
    pub fn new(defaults: QueryConfig) -> Self {
        Self { defaults }
    }

    /// Build the request for `term` against `class`
    pub fn build(&self, term: &str, options: &SearchOptions, class: &RecordClass) -> SearchResult<SearchQuery> {
        let config = class.config();
        let term = term.trim().to_string();

        let wants_autocomplete = options.autocomplete
            || config
                .autocomplete_threshold
                .map(|threshold| term.chars().count() < threshold)
                .unwrap_or(false);

        let targets = self.targets(options, class, wants_autocomplete)?;
        let (filters, must_not) = self.filters(options, class)?;
        let geo_field = self.geo_field(options, class)?;
        let (from, size) = self.pagination(options)?;

        let exact_fields: Vec<String> = targets.iter().map(|t| t.path(ANALYZED_SUBFIELD)).collect();

        let autocomplete_targets: Vec<&FieldTarget> = targets
            .iter()
            .filter(|t| config.is_autocomplete(&t.name))
            .collect();
        let autocomplete = !term.is_empty() && wants_autocomplete && !autocomplete_targets.is_empty();

        let text_query = if term.is_empty() {
            json!({ "match_all": {} })
        } else {
            let mut clauses = Vec::new();
            if autocomplete {
                let fields: Vec<String> = autocomplete_targets
                    .iter()
                    .map(|t| t.path(AUTOCOMPLETE_SUBFIELD))
                    .collect();
                clauses.push(json!({
                    "multi_match": {
                        "query": term,
                        "fields": fields,
                        "operator": "and",
                        "boost": self.defaults.autocomplete_boost
                    }
                }));
            }
            clauses.push(json!({
                "multi_match": {
                    "query": term,
                    "fields": exact_fields,
                    "operator": "and"
                }
            }));
            if let Some(distance) = options.misspellings.filter(|d| *d > 0) {
                clauses.push(json!({
                    "multi_match": {
                        "query": term,
                        "fields": exact_fields,
                        "operator": "and",
                        "fuzziness": distance,
                        "boost": self.defaults.misspellings_boost
                    }
                }));
            }
            if clauses.len() == 1 {
                clauses.remove(0)
            } else {
                json!({ "dis_max": { "queries": clauses } })
            }
        };

        let mut should = Vec::new();
        if !term.is_empty() {
            if let Some(ref field) = config.conversions {
                should.push(json!({
                    "nested": {
                        "path": field,
                        "score_mode": "sum",
                        "query": {
                            "function_score": {
                                "query": { "term": { format!("{}.query", field): term.to_lowercase() } },
                                "field_value_factor": {
                                    "field": format!("{}.count", field),
                                    "modifier": "ln2p"
                                },
                                "boost_mode": "replace"
                            }
                        }
                    }
                }));
            }
        }
        if let (Some(field), Some(actor)) = (&config.personalize, &options.actor_id) {
            should.push(json!({
                "term": { field.as_str(): { "value": actor, "boost": self.defaults.personalize_boost } }
            }));
        }

        let mut filters = filters;
        if let (Some(near), Some(field)) = (&options.near, &geo_field) {
            if let Some(within) = near.within {
                filters.push(json!({
                    "geo_distance": {
                        "distance": within.to_string(),
                        field.as_str(): { "lat": near.point.lat, "lon": near.point.lon }
                    }
                }));
            }
        }

        let query = bool_query(text_query, should.clone(), filters.clone(), must_not.clone());

        let mut sort = Vec::new();
        if options.sort_by_distance {
            if let (Some(near), Some(field)) = (&options.near, &geo_field) {
                sort.push(json!({
                    "_geo_distance": {
                        field.as_str(): { "lat": near.point.lat, "lon": near.point.lon },
                        "order": "asc",
                        "unit": "km"
                    }
                }));
            }
        }
        for order in &options.order {
            sort.push(json!({ order.field.as_str(): { "order": order.order.to_string() } }));
        }

        let body = request_body(query, &sort, from, size);

        let fallback = if term.is_empty() || options.suggest == Some(false) {
            None
        } else {
            let suggest_targets: Vec<&FieldTarget> = if targets.iter().any(|t| t.name == SEARCH_ALL_FIELD) {
                Vec::new()
            } else {
                targets.iter().filter(|t| config.is_suggest(&t.name)).collect()
            };
            let suggest_fields: Vec<String> = if suggest_targets.is_empty() && options.fields.is_none() {
                config.suggest.clone()
            } else {
                suggest_targets.iter().map(|t| t.name.clone()).collect()
            };

            if suggest_fields.is_empty() {
                None
            } else {
                let fuzzy = json!({
                    "multi_match": {
                        "query": term,
                        "fields": suggest_fields
                            .iter()
                            .map(|f| format!("{}.{}", f, SUGGEST_SUBFIELD))
                            .collect::<Vec<_>>(),
                        "operator": "and",
                        "fuzziness": "AUTO"
                    }
                });
                let personalization: Vec<Value> = should
                    .iter()
                    .filter(|clause| clause.get("term").is_some())
                    .cloned()
                    .collect();
                let mut body = request_body(
                    bool_query(fuzzy, personalization, filters, must_not),
                    &sort,
                    from,
                    size,
                );

                let mut suggesters = Map::new();
                suggesters.insert("text".to_string(), Value::String(term.clone()));
                for field in &suggest_fields {
                    let path = format!("{}.{}", field, SUGGEST_SUBFIELD);
                    suggesters.insert(
                        field.clone(),
                        json!({
                            "phrase": {
                                "field": path,
                                "size": 1,
                                "direct_generator": [{ "field": path, "suggest_mode": "always" }]
                            }
                        }),
                    );
                }
                body["suggest"] = Value::Object(suggesters);
                Some(body)
            }
        };

        Ok(SearchQuery {
            term,
            fields: exact_fields,
            autocomplete,
            body,
            fallback,
            from,
            size,
        })
    }

    fn targets(&self, options: &SearchOptions, class: &RecordClass, autocomplete: bool) -> SearchResult<Vec<FieldTarget>> {
        let config = class.config();
        if let Some(ref fields) = options.fields {
            if fields.is_empty() {
                return Err(SearchError::InvalidOptions("fields must not be empty".to_string()));
            }
            let targets = fields.iter().map(|f| FieldTarget::parse(f)).collect::<SearchResult<Vec<_>>>()?;
            if let Some(target) = targets.iter().find(|t| config.is_location(&t.name)) {
                return Err(SearchError::InvalidOptions(format!(
                    "location field '{}' cannot be matched as text",
                    target.name
                )));
            }
            return Ok(targets);
        }

        if !config.searchable.is_empty() {
            return config.searchable.iter().map(|f| FieldTarget::parse(f)).collect();
        }

        if autocomplete && !config.autocomplete.is_empty() {
            // Autocomplete without explicit fields covers every autocomplete field
            return config.autocomplete.iter().map(|f| FieldTarget::parse(f)).collect();
        }

        Ok(vec![FieldTarget {
            name: SEARCH_ALL_FIELD.to_string(),
            boost: None,
        }])
    }

    fn filters(&self, options: &SearchOptions, class: &RecordClass) -> SearchResult<(Vec<Value>, Vec<Value>)> {
        let mut filter = Vec::new();
        let mut must_not = Vec::new();

        for f in &options.filters {
            if f.field().trim().is_empty() {
                return Err(SearchError::InvalidOptions("filter field must not be empty".to_string()));
            }
            let (clause, negated) = f.to_clause();
            if negated {
                must_not.push(clause);
            } else {
                filter.push(clause);
            }
        }

        if let Some(ref kind) = options.kind {
            if !class.has_hierarchy() {
                return Err(SearchError::InvalidOptions(format!(
                    "class '{}' has no kinds",
                    class.name()
                )));
            }
            let resolved = class.resolve_kind(Some(kind)).ok_or_else(|| {
                SearchError::InvalidOptions(format!("kind '{}' is not declared for class '{}'", kind, class.name()))
            })?;
            // the base kind covers the whole hierarchy
            if resolved != class.name() {
                filter.push(json!({ "term": { KIND_FIELD: resolved } }));
            }
        }

        Ok((filter, must_not))
    }

    fn geo_field(&self, options: &SearchOptions, class: &RecordClass) -> SearchResult<Option<String>> {
        let config = class.config();
        let Some(ref near) = options.near else {
            if options.sort_by_distance {
                return Err(SearchError::InvalidOptions(
                    "sorting by distance requires a location".to_string(),
                ));
            }
            return Ok(None);
        };

        let field = match near.field {
            Some(ref field) if config.is_location(field) => field.clone(),
            Some(ref field) => {
                return Err(SearchError::InvalidOptions(format!(
                    "'{}' is not a location field of class '{}'",
                    field,
                    class.name()
                )))
            }
            None => config.locations.first().cloned().ok_or_else(|| {
                SearchError::InvalidOptions(format!("class '{}' declares no location field", class.name()))
            })?,
        };

        let valid = near.point.lat.is_finite()
            && near.point.lon.is_finite()
            && near.point.lat.abs() <= 90.0
            && near.point.lon.abs() <= 180.0;
        if !valid {
            return Err(SearchError::InvalidOptions(format!(
                "invalid coordinate {:?}",
                near.point
            )));
        }
        if let Some(within) = near.within {
            if !(within.value.is_finite() && within.value >= 0.0) {
                return Err(SearchError::InvalidOptions(format!("invalid distance {}", within)));
            }
        }

        Ok(Some(field))
    }

    fn pagination(&self, options: &SearchOptions) -> SearchResult<(usize, usize)> {
        let size = options.per_page.unwrap_or(self.defaults.per_page);
        if size == 0 {
            return Err(SearchError::InvalidOptions("per_page must be greater than zero".to_string()));
        }
        let from = match (options.offset, options.page) {
            (Some(offset), _) => offset,
            (None, Some(0)) => {
                return Err(SearchError::InvalidOptions("page numbers start at 1".to_string()));
            }
            (None, Some(page)) => (page - 1).checked_mul(size).ok_or_else(|| {
                SearchError::InvalidOptions(format!("page {} with {} per page is out of range", page, size))
            })?,
            (None, None) => 0,
        };
        if from.checked_add(size).is_none() {
            return Err(SearchError::InvalidOptions(format!(
                "offset {} with limit {} is out of range",
                from, size
            )));
        }
        Ok((from, size))
    }
}

fn bool_query(must: Value, should: Vec<Value>, filter: Vec<Value>, must_not: Vec<Value>) -> Value {
    let mut clauses = Map::new();
    clauses.insert("must".to_string(), json!([must]));
    if !should.is_empty() {
        clauses.insert("should".to_string(), Value::Array(should));
    }
    if !filter.is_empty() {
        clauses.insert("filter".to_string(), Value::Array(filter));
    }
    if !must_not.is_empty() {
        clauses.insert("must_not".to_string(), Value::Array(must_not));
    }
    json!({ "bool": clauses })
}

fn request_body(query: Value, sort: &[Value], from: usize, size: usize) -> Value {
    let mut body = json!({ "query": query, "from": from, "size": size });
    if !sort.is_empty() {
        body["sort"] = Value::Array(sort.to_vec());
        body["track_scores"] = Value::Bool(true);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::config::SearchConfig;

    fn product_class() -> RecordClass {
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
        RecordClass::new("product", config).unwrap()
    }

    fn builder() -> QueryBuilder {
        QueryBuilder::new(QueryConfig::default())
    }

    #[test]
    fn test_search_options_builder() {
        let options = SearchOptions::new()
            .with_fields(["name^10"])
            .with_actor("u1")
            .with_page(2, 50)
            .with_filter(Filter::eq("in_stock", true));

        assert_eq!(options.fields.as_ref().unwrap()[0], "name^10");
        assert_eq!(options.actor_id.as_deref(), Some("u1"));
        assert_eq!(options.page, Some(2));
        assert_eq!(options.filters.len(), 1);
    }

    #[test]
    fn test_empty_term_is_match_all() {
        let query = builder().build("  ", &SearchOptions::default(), &product_class()).unwrap();

        assert_eq!(query.body["query"]["bool"]["must"][0], json!({ "match_all": {} }));
        assert!(query.fallback.is_none());
        assert!(query.body["query"]["bool"].get("should").is_none());
    }

    #[test]
    fn test_default_targets_search_all() {
        let query = builder().build("bear", &SearchOptions::default(), &product_class()).unwrap();
        let must = &query.body["query"]["bool"]["must"][0];

        assert_eq!(must["multi_match"]["fields"], json!(["search_all"]));
        assert_eq!(must["multi_match"]["operator"], "and");
        assert!(!query.autocomplete);
    }

    #[test]
    fn test_autocomplete_clause_ranked_first() {
        let options = SearchOptions::new().with_autocomplete();
        let query = builder().build("bea", &options, &product_class()).unwrap();
        let queries = &query.body["query"]["bool"]["must"][0]["dis_max"]["queries"];

        assert!(query.autocomplete);
        assert_eq!(queries[0]["multi_match"]["fields"], json!(["name.autocomplete"]));
        assert_eq!(queries[0]["multi_match"]["boost"], json!(10.0));
        assert_eq!(queries[1]["multi_match"]["fields"], json!(["name.analyzed"]));
    }

    #[test]
    fn test_autocomplete_absent_without_declared_fields() {
        let options = SearchOptions::new().with_autocomplete().with_fields(["color"]);
        let query = builder().build("re", &options, &product_class()).unwrap();

        assert!(!query.autocomplete);
        assert!(query.body["query"]["bool"]["must"][0].get("dis_max").is_none());
    }

    #[test]
    fn test_autocomplete_threshold() {
        let config = SearchConfig::builder()
            .autocomplete("name")
            .autocomplete_threshold(4)
            .build()
            .unwrap();
        let class = RecordClass::new("product", config).unwrap();

        assert!(builder().build("bea", &SearchOptions::default(), &class).unwrap().autocomplete);
        assert!(!builder().build("bear", &SearchOptions::default(), &class).unwrap().autocomplete);
    }

    #[test]
    fn test_field_boosts() {
        let options = SearchOptions::new().with_fields(["name^10", "color"]);
        let query = builder().build("red", &options, &product_class()).unwrap();

        assert_eq!(query.fields, vec!["name.analyzed^10", "color.analyzed"]);
        assert!(SearchOptions::new().with_fields(["name^x"]).fields.is_some());
        assert!(builder()
            .build("red", &SearchOptions::new().with_fields(["name^x"]), &product_class())
            .is_err());
    }

    #[test]
    fn test_personalization_is_should_clause() {
        let options = SearchOptions::new().with_actor("u1");
        let query = builder().build("bear", &options, &product_class()).unwrap();
        let should = query.body["query"]["bool"]["should"].as_array().unwrap();

        assert!(should
            .iter()
            .any(|c| c["term"]["user_ids"] == json!({ "value": "u1", "boost": 10.0 })));
        assert!(query.body["query"]["bool"].get("filter").is_none());
    }

    #[test]
    fn test_conversions_boost() {
        let query = builder().build("Bear", &SearchOptions::default(), &product_class()).unwrap();
        let nested = &query.body["query"]["bool"]["should"][0]["nested"];

        assert_eq!(nested["path"], "conversions");
        assert_eq!(
            nested["query"]["function_score"]["query"],
            json!({ "term": { "conversions.query": "bear" } })
        );
    }

    #[test]
    fn test_geo_filter_and_distance_sort() {
        let options = SearchOptions::new()
            .near(GeoPoint::new(37.77, -122.42), Distance::km(10.0))
            .sort_by_distance();
        let query = builder().build("", &options, &product_class()).unwrap();

        let geo = &query.body["query"]["bool"]["filter"][0]["geo_distance"];
        assert_eq!(geo["distance"], "10km");
        assert_eq!(geo["location"], json!({ "lat": 37.77, "lon": -122.42 }));
        assert_eq!(query.body["sort"][0]["_geo_distance"]["order"], "asc");
        assert_eq!(query.body["track_scores"], true);
    }

    #[test]
    fn test_distance_sort_requires_location() {
        let options = SearchOptions::new().sort_by_distance();
        let err = builder().build("", &options, &product_class()).unwrap_err();
        assert!(matches!(err, SearchError::InvalidOptions(_)));

        let class = RecordClass::new("store", SearchConfig::default()).unwrap();
        let options = SearchOptions::new().near(GeoPoint::new(1.0, 1.0), Distance::km(1.0));
        assert!(builder().build("", &options, &class).is_err());
    }

    #[test]
    fn test_filters_and_order() {
        let options = SearchOptions::new()
            .with_filter(Filter::eq("in_stock", true))
            .with_filter(Filter::not_eq("color", "red"))
            .with_filter(Filter::at_least("orders_count", 2))
            .with_filter(Filter::eq("backordered", Value::Null))
            .order_by("orders_count", SortOrder::Desc);
        let query = builder().build("", &options, &product_class()).unwrap();
        let bool_query = &query.body["query"]["bool"];

        assert_eq!(bool_query["filter"][0], json!({ "term": { "in_stock": true } }));
        assert_eq!(bool_query["filter"][1], json!({ "range": { "orders_count": { "gte": 2 } } }));
        assert_eq!(bool_query["must_not"][0], json!({ "term": { "color": "red" } }));
        assert_eq!(bool_query["must_not"][1], json!({ "exists": { "field": "backordered" } }));
        assert_eq!(query.body["sort"][0], json!({ "orders_count": { "order": "desc" } }));
    }

    #[test]
    fn test_pagination() {
        let query = builder()
            .build("", &SearchOptions::new().with_page(3, 20), &product_class())
            .unwrap();
        assert_eq!((query.from, query.size), (40, 20));

        let query = builder()
            .build("", &SearchOptions::new().with_offset(5).with_limit(2), &product_class())
            .unwrap();
        assert_eq!((query.from, query.size), (5, 2));

        let query = builder().build("", &SearchOptions::default(), &product_class()).unwrap();
        assert_eq!((query.from, query.size), (0, 100));

        assert!(builder()
            .build("", &SearchOptions::new().with_page(0, 10), &product_class())
            .is_err());
    }

    #[test]
    fn test_suggest_fallback() {
        let query = builder().build("bare", &SearchOptions::default(), &product_class()).unwrap();
        let fallback = query.fallback.unwrap();

        assert_eq!(
            fallback["query"]["bool"]["must"][0]["multi_match"]["fields"],
            json!(["name.suggest", "color.suggest"])
        );
        assert_eq!(fallback["suggest"]["text"], "bare");
        assert_eq!(fallback["suggest"]["name"]["phrase"]["field"], "name.suggest");

        let disabled = builder()
            .build("bare", &SearchOptions::new().without_suggest(), &product_class())
            .unwrap();
        assert!(disabled.fallback.is_none());

        let only_color = builder()
            .build("bare", &SearchOptions::new().with_fields(["color"]), &product_class())
            .unwrap();
        assert_eq!(
            only_color.fallback.unwrap()["query"]["bool"]["must"][0]["multi_match"]["fields"],
            json!(["color.suggest"])
        );
    }

    #[test]
    fn test_no_suggest_fields_no_fallback() {
        let class = RecordClass::new("store", SearchConfig::default()).unwrap();
        let query = builder().build("bare", &SearchOptions::default(), &class).unwrap();
        assert!(query.fallback.is_none());
    }

    #[test]
    fn test_kind_filter() {
        let class = RecordClass::with_kinds("animal", ["dog", "cat"], SearchConfig::default()).unwrap();

        let query = builder().build("", &SearchOptions::new().with_kind("dog"), &class).unwrap();
        assert_eq!(query.body["query"]["bool"]["filter"][0], json!({ "term": { "kind": "dog" } }));

        let query = builder().build("", &SearchOptions::new().with_kind("animal"), &class).unwrap();
        assert!(query.body["query"]["bool"].get("filter").is_none());

        assert!(builder().build("", &SearchOptions::new().with_kind("bird"), &class).is_err());
        assert!(builder()
            .build("", &SearchOptions::new().with_kind("dog"), &product_class())
            .is_err());
    }

    #[test]
    fn test_distance_parsing() {
        assert_eq!("10km".parse::<Distance>().unwrap(), Distance::km(10.0));
        assert_eq!("2.5mi".parse::<Distance>().unwrap(), Distance::miles(2.5));
        assert!((Distance::miles(1.0).as_km() - 1.609344).abs() < 1e-9);
        assert!("10".parse::<Distance>().is_err());
        assert!("10parsecs".parse::<Distance>().is_err());
        assert_eq!(Distance::km(10.0).to_string(), "10km");
    }
}
