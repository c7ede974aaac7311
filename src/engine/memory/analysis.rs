//! Analyzers and field mappings of the in-memory engine
//!
//! Tokenizing, lowercasing, ASCII folding and edge n-grams run through
//! tantivy's tokenizer pipeline. Synonym graphs and shingles, which tantivy
//! does not ship, are applied on top of the token positions.

use crate::engine::{EngineError, EngineResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tantivy::tokenizer::{
    AsciiFoldingFilter, LowerCaser, NgramTokenizer, RawTokenizer, SimpleTokenizer, TextAnalyzer, Token, TokenStream,
};

/// Tokens by position. A position holds every token emitted there
/// (edge n-grams, shingles, index-time synonyms).
pub(crate) type Positions = Vec<Vec<String>>;

/// One position of an analyzed query: alternatives, each a token sequence
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QueryTerm {
    pub alternatives: Vec<Vec<String>>,
}

impl QueryTerm {
    fn single(token: String) -> Self {
        Self {
            alternatives: vec![vec![token]],
        }
    }

    fn has_token(&self, token: &str) -> bool {
        self.alternatives.iter().any(|alt| alt.len() == 1 && alt[0] == token)
    }
}

#[derive(Debug, Clone)]
enum FilterStep {
    Lowercase,
    AsciiFolding,
    /// Equivalence groups; each term is a token sequence
    Synonyms(Vec<Vec<Vec<String>>>),
    /// Bounds already accepted by [`NgramTokenizer::prefix_only`]
    EdgeNgram { min: usize, max: usize },
    Shingle { min: usize, max: usize },
}

impl FilterStep {
    /// Per-token tantivy analyzer for the normalizing steps
    fn normalizer(&self) -> Option<TextAnalyzer> {
        match self {
            FilterStep::Lowercase => Some(TextAnalyzer::builder(RawTokenizer::default()).filter(LowerCaser).build()),
            FilterStep::AsciiFolding => {
                Some(TextAnalyzer::builder(RawTokenizer::default()).filter(AsciiFoldingFilter).build())
            }
            _ => None,
        }
    }
}

/// Standard tokenizer followed by a filter chain
#[derive(Debug, Clone)]
pub(crate) struct Analyzer {
    filters: Vec<FilterStep>,
}

impl Analyzer {
    pub fn standard() -> Self {
        Self {
            filters: vec![FilterStep::Lowercase],
        }
    }

    /// Index-time analysis
    pub fn analyze(&self, text: &str) -> Positions {
        let mut positions: Positions = tokenize(text).into_iter().map(|t| vec![t]).collect();

        for filter in &self.filters {
            if let Some(mut normalizer) = filter.normalizer() {
                map_tokens(&mut positions, |t| normalize(&mut normalizer, t));
                continue;
            }
            match filter {
                FilterStep::Synonyms(groups) => {
                    for position in positions.iter_mut() {
                        let mut extra = Vec::new();
                        for group in groups {
                            let hit = group
                                .iter()
                                .any(|term| term.len() == 1 && position.contains(&term[0]));
                            if hit {
                                extra.extend(
                                    group
                                        .iter()
                                        .filter(|term| term.len() == 1)
                                        .map(|term| term[0].clone()),
                                );
                            }
                        }
                        for token in extra {
                            if !position.contains(&token) {
                                position.push(token);
                            }
                        }
                    }
                }
                FilterStep::EdgeNgram { min, max } => {
                    let Ok(tokenizer) = NgramTokenizer::prefix_only(*min, *max) else {
                        continue;
                    };
                    let mut grams = TextAnalyzer::from(tokenizer);
                    for position in positions.iter_mut() {
                        *position = position
                            .iter()
                            .flat_map(|t| {
                                let prefixes = token_texts(&mut grams, t);
                                // shorter than min_gram
                                if prefixes.is_empty() {
                                    vec![t.clone()]
                                } else {
                                    prefixes
                                }
                            })
                            .collect();
                    }
                }
                FilterStep::Shingle { min, max } => {
                    let unigrams: Vec<String> = positions.iter().filter_map(|p| p.first().cloned()).collect();
                    for (i, position) in positions.iter_mut().enumerate() {
                        for size in *min..=*max {
                            if size >= 2 && i + size <= unigrams.len() {
                                position.push(unigrams[i..i + size].join(" "));
                            }
                        }
                    }
                }
                FilterStep::Lowercase | FilterStep::AsciiFolding => {}
            }
        }

        positions
    }

    /// Query-time analysis. Synonyms expand into alternatives; n-gram and
    /// shingle filters only apply at index time.
    pub fn analyze_query(&self, text: &str) -> Vec<QueryTerm> {
        let mut terms: Vec<QueryTerm> = tokenize(text).into_iter().map(QueryTerm::single).collect();

        for filter in &self.filters {
            if let Some(mut normalizer) = filter.normalizer() {
                map_alternatives(&mut terms, |t| normalize(&mut normalizer, t));
                continue;
            }
            if let FilterStep::Synonyms(groups) = filter {
                expand_synonyms(&mut terms, groups);
            }
        }

        terms
    }
}

/// Every token `analyzer` emits for `text`
fn token_texts(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    analyzer
        .token_stream(text)
        .process(&mut |token: &Token| tokens.push(token.text.clone()));
    tokens
}

/// Run a single token through a per-token normalizer
fn normalize(normalizer: &mut TextAnalyzer, token: &str) -> String {
    token_texts(normalizer, token)
        .into_iter()
        .next()
        .unwrap_or_else(|| token.to_string())
}

fn map_tokens(positions: &mut Positions, mut f: impl FnMut(&str) -> String) {
    for position in positions.iter_mut() {
        for token in position.iter_mut() {
            *token = f(token);
        }
    }
}

fn map_alternatives(terms: &mut [QueryTerm], mut f: impl FnMut(&str) -> String) {
    for term in terms.iter_mut() {
        for alternative in term.alternatives.iter_mut() {
            for token in alternative.iter_mut() {
                *token = f(token);
            }
        }
    }
}

fn expand_synonyms(terms: &mut Vec<QueryTerm>, groups: &[Vec<Vec<String>>]) {
    let mut i = 0;
    while i < terms.len() {
        'groups: for group in groups {
            for member in group {
                let n = member.len();
                if n == 0 || i + n > terms.len() {
                    continue;
                }
                if (0..n).all(|k| terms[i + k].has_token(&member[k])) {
                    let mut alternatives = if n == 1 {
                        terms[i].alternatives.clone()
                    } else {
                        Vec::new()
                    };
                    for alternative in group {
                        if !alternatives.contains(alternative) {
                            alternatives.push(alternative.clone());
                        }
                    }
                    terms.splice(i..i + n, [QueryTerm { alternatives }]);
                    break 'groups;
                }
            }
        }
        i += 1;
    }
}

/// Split on anything that is not a letter or a digit
fn tokenize(text: &str) -> Vec<String> {
    token_texts(&mut TextAnalyzer::from(SimpleTokenizer::default()), text)
}

/// Tokens of a synonym rule term, normalized the way the search analyzers see them
fn synonym_tokens(term: &str) -> Vec<String> {
    let mut analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(AsciiFoldingFilter)
        .build();
    token_texts(&mut analyzer, term)
}

fn illegal_argument(reason: impl Into<String>) -> EngineError {
    EngineError::rejected(400, "illegal_argument_exception", reason)
}

fn mapper_parsing(reason: impl Into<String>) -> EngineError {
    EngineError::rejected(400, "mapper_parsing_exception", reason)
}

fn usize_setting(def: &Value, key: &str, default: usize) -> usize {
    def.get(key)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(default)
}

fn parse_filter(name: &str, defs: Option<&Map<String, Value>>) -> EngineResult<FilterStep> {
    let def = defs.and_then(|defs| defs.get(name));
    let kind = match def {
        Some(def) => def.get("type").and_then(Value::as_str).unwrap_or_default(),
        None => name,
    };

    match kind {
        "lowercase" => Ok(FilterStep::Lowercase),
        "asciifolding" => Ok(FilterStep::AsciiFolding),
        "synonym" | "synonym_graph" => {
            let rules = def
                .and_then(|d| d.get("synonyms"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let mut groups = Vec::new();
            for rule in rules {
                let rule = rule
                    .as_str()
                    .ok_or_else(|| illegal_argument(format!("synonym rule in [{}] must be a string", name)))?;
                if rule.contains("=>") {
                    return Err(illegal_argument(format!(
                        "explicit synonym mappings are not supported: [{}]",
                        rule
                    )));
                }
                let group: Vec<Vec<String>> = rule
                    .split(',')
                    .map(synonym_tokens)
                    .filter(|term: &Vec<String>| !term.is_empty())
                    .collect();
                if group.len() > 1 {
                    groups.push(group);
                }
            }
            Ok(FilterStep::Synonyms(groups))
        }
        "edge_ngram" | "edgeNGram" => {
            let def = def.cloned().unwrap_or(Value::Null);
            let (min, max) = (usize_setting(&def, "min_gram", 1), usize_setting(&def, "max_gram", 2));
            NgramTokenizer::prefix_only(min, max).map_err(|e| {
                illegal_argument(format!("invalid edge_ngram filter [{}]: {}", name, e))
            })?;
            Ok(FilterStep::EdgeNgram { min, max })
        }
        "shingle" => {
            let def = def.cloned().unwrap_or(Value::Null);
            Ok(FilterStep::Shingle {
                min: usize_setting(&def, "min_shingle_size", 2),
                max: usize_setting(&def, "max_shingle_size", 2),
            })
        }
        _ => Err(illegal_argument(format!("failed to find filter under name [{}]", name))),
    }
}

/// Analyzers declared in index settings, plus the built-in `standard`
pub(crate) fn parse_analyzers(settings: &Value) -> EngineResult<BTreeMap<String, Analyzer>> {
    let analysis = settings
        .get("analysis")
        .or_else(|| settings.get("index").and_then(|i| i.get("analysis")));

    let mut analyzers = BTreeMap::new();
    analyzers.insert("standard".to_string(), Analyzer::standard());

    let Some(analysis) = analysis else {
        return Ok(analyzers);
    };
    let filter_defs = analysis.get("filter").and_then(Value::as_object);

    if let Some(defs) = analysis.get("analyzer").and_then(Value::as_object) {
        for (name, def) in defs {
            let kind = def.get("type").and_then(Value::as_str).unwrap_or("custom");
            let analyzer = match kind {
                "standard" => Analyzer::standard(),
                "custom" => {
                    let tokenizer = def.get("tokenizer").and_then(Value::as_str).unwrap_or("standard");
                    if tokenizer != "standard" {
                        return Err(illegal_argument(format!(
                            "analyzer [{}] uses unsupported tokenizer [{}]",
                            name, tokenizer
                        )));
                    }
                    let filters = def
                        .get("filter")
                        .and_then(Value::as_array)
                        .map(|names| {
                            names
                                .iter()
                                .filter_map(Value::as_str)
                                .map(|f| parse_filter(f, filter_defs))
                                .collect::<EngineResult<Vec<_>>>()
                        })
                        .transpose()?
                        .unwrap_or_default();
                    Analyzer { filters }
                }
                other => {
                    return Err(illegal_argument(format!(
                        "Unknown analyzer type [{}] for [{}]",
                        other, name
                    )))
                }
            };
            analyzers.insert(name.clone(), analyzer);
        }
    }

    Ok(analyzers)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldType {
    Keyword,
    Text,
    Long,
    Double,
    Boolean,
    Date,
    GeoPoint,
    Nested,
    Object,
}

impl FieldType {
    fn parse(name: &str) -> EngineResult<Self> {
        Ok(match name {
            "keyword" => FieldType::Keyword,
            "text" => FieldType::Text,
            "long" | "integer" | "short" | "byte" => FieldType::Long,
            "double" | "float" | "half_float" | "scaled_float" => FieldType::Double,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::Date,
            "geo_point" => FieldType::GeoPoint,
            "nested" => FieldType::Nested,
            "object" => FieldType::Object,
            other => {
                return Err(mapper_parsing(format!(
                    "No handler for type [{}] declared on field",
                    other
                )))
            }
        })
    }

    fn name(self) -> &'static str {
        match self {
            FieldType::Keyword => "keyword",
            FieldType::Text => "text",
            FieldType::Long => "long",
            FieldType::Double => "float",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::GeoPoint => "geo_point",
            FieldType::Nested => "nested",
            FieldType::Object => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FieldMapping {
    pub kind: FieldType,
    pub analyzer: Option<String>,
    pub search_analyzer: Option<String>,
    pub copy_to: Vec<String>,
    pub subfields: BTreeMap<String, FieldMapping>,
}

impl FieldMapping {
    fn of(kind: FieldType) -> Self {
        Self {
            kind,
            analyzer: None,
            search_analyzer: None,
            copy_to: Vec::new(),
            subfields: BTreeMap::new(),
        }
    }

    fn parse(name: &str, def: &Value, analyzers: &BTreeMap<String, Analyzer>) -> EngineResult<Self> {
        let kind = match def.get("type").and_then(Value::as_str) {
            Some(kind) => FieldType::parse(kind)?,
            None if def.get("properties").is_some() => FieldType::Object,
            None => return Err(mapper_parsing(format!("No type specified for field [{}]", name))),
        };

        let analyzer_name = |key: &str| -> EngineResult<Option<String>> {
            match def.get(key).and_then(Value::as_str) {
                Some(a) if analyzers.contains_key(a) => Ok(Some(a.to_string())),
                Some(a) => Err(mapper_parsing(format!(
                    "analyzer [{}] has not been configured in mappings",
                    a
                ))),
                None => Ok(None),
            }
        };

        let copy_to = match def.get("copy_to") {
            Some(Value::String(target)) => vec![target.clone()],
            Some(Value::Array(targets)) => targets.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            _ => Vec::new(),
        };

        let mut subfields = BTreeMap::new();
        if let Some(fields) = def.get("fields").and_then(Value::as_object) {
            for (sub, sub_def) in fields {
                subfields.insert(
                    sub.clone(),
                    FieldMapping::parse(&format!("{}.{}", name, sub), sub_def, analyzers)?,
                );
            }
        }

        Ok(Self {
            kind,
            analyzer: analyzer_name("analyzer")?,
            search_analyzer: analyzer_name("search_analyzer")?,
            copy_to,
            subfields,
        })
    }

    /// Elasticsearch's default for strings without a template
    fn default_string() -> Self {
        let mut mapping = FieldMapping::of(FieldType::Text);
        mapping
            .subfields
            .insert("keyword".to_string(), FieldMapping::of(FieldType::Keyword));
        mapping
    }
}

/// A document as stored by the engine
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IndexedDocument {
    pub source: Value,
    /// Analyzed text by field path (`name.analyzed`, `search_all`, ...)
    pub text: BTreeMap<String, Positions>,
    /// Geo points by field as `(lat, lon)`
    pub geo: BTreeMap<String, Vec<(f64, f64)>>,
}

impl IndexedDocument {
    /// Wrap a bare source (nested objects) without text or geo data
    pub fn bare(source: Value) -> Self {
        Self {
            source,
            text: BTreeMap::new(),
            geo: BTreeMap::new(),
        }
    }
}

/// Analysis settings and mappings of one index
#[derive(Debug, Clone)]
pub(crate) struct IndexMeta {
    analyzers: BTreeMap<String, Analyzer>,
    properties: BTreeMap<String, FieldMapping>,
    string_template: FieldMapping,
    /// Types of undeclared fields, fixed when first seen
    dynamic: BTreeMap<String, FieldType>,
}

impl IndexMeta {
    /// Parse a create-index body (`settings` and `mappings`)
    pub fn from_body(body: &Value) -> EngineResult<Self> {
        let analyzers = parse_analyzers(body.get("settings").unwrap_or(&Value::Null))?;
        let mappings = body.get("mappings").cloned().unwrap_or(Value::Null);

        let mut properties = BTreeMap::new();
        if let Some(props) = mappings.get("properties").and_then(Value::as_object) {
            for (name, def) in props {
                properties.insert(name.clone(), FieldMapping::parse(name, def, &analyzers)?);
            }
        }

        let mut string_template = FieldMapping::default_string();
        if let Some(templates) = mappings.get("dynamic_templates").and_then(Value::as_array) {
            for template in templates.iter().filter_map(Value::as_object) {
                for (name, def) in template {
                    if def.get("match_mapping_type").and_then(Value::as_str) == Some("string") {
                        let mapping = def.get("mapping").unwrap_or(&Value::Null);
                        string_template = FieldMapping::parse(name, mapping, &analyzers)?;
                    }
                }
            }
        }

        Ok(Self {
            analyzers,
            properties,
            string_template,
            dynamic: BTreeMap::new(),
        })
    }

    /// Index created implicitly by a write to a missing index
    pub fn dynamic_default() -> Self {
        Self {
            analyzers: parse_analyzers(&Value::Null).unwrap_or_default(),
            properties: BTreeMap::new(),
            string_template: FieldMapping::default_string(),
            dynamic: BTreeMap::new(),
        }
    }

    pub fn analyzer(&self, name: Option<&str>) -> Analyzer {
        name.and_then(|n| self.analyzers.get(n))
            .cloned()
            .unwrap_or_else(Analyzer::standard)
    }

    fn top_level(&self, field: &str) -> Option<&FieldMapping> {
        match self.properties.get(field) {
            Some(mapping) => Some(mapping),
            None if self.dynamic.get(field) == Some(&FieldType::Text) => Some(&self.string_template),
            None => None,
        }
    }

    /// Mapping for a field path such as `name` or `name.analyzed`
    pub fn field(&self, path: &str) -> Option<&FieldMapping> {
        if let Some(mapping) = self.top_level(path) {
            return Some(mapping);
        }
        let (field, sub) = path.split_once('.')?;
        let parent = match self.top_level(field) {
            Some(mapping) => mapping,
            // strings not indexed yet still resolve through the template
            None => &self.string_template,
        };
        parent.subfields.get(sub)
    }

    /// Analyzer used for query text against `path`
    pub fn search_analyzer(&self, path: &str) -> Analyzer {
        match self.field(path) {
            Some(mapping) => self.analyzer(
                mapping
                    .search_analyzer
                    .as_deref()
                    .or(mapping.analyzer.as_deref()),
            ),
            None => Analyzer::standard(),
        }
    }

    /// Is `path` an analyzed text field?
    pub fn is_text(&self, path: &str) -> bool {
        self.field(path).map(|m| m.kind == FieldType::Text).unwrap_or(false)
    }

    /// Parse and analyze a document source.
    ///
    /// Dynamic field types are only recorded when the whole document is accepted.
    pub fn index_document(&mut self, source: &Value) -> EngineResult<IndexedDocument> {
        let object = source
            .as_object()
            .ok_or_else(|| mapper_parsing("document source must be an object"))?;

        let mut new_dynamic = BTreeMap::new();
        let mut text: BTreeMap<String, Positions> = BTreeMap::new();
        let mut geo = BTreeMap::new();
        let mut copies: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (name, value) in object {
            if value.is_null() {
                continue;
            }

            let mapping = match self.properties.get(name) {
                Some(mapping) => mapping.clone(),
                None => {
                    let seen = self.dynamic.get(name).or_else(|| new_dynamic.get(name)).copied();
                    let kind = match seen {
                        Some(kind) => kind,
                        None => match dynamic_type(value) {
                            Some(kind) => {
                                new_dynamic.insert(name.clone(), kind);
                                kind
                            }
                            None => continue,
                        },
                    };
                    if kind == FieldType::Text {
                        self.string_template.clone()
                    } else {
                        FieldMapping::of(kind)
                    }
                }
            };

            match mapping.kind {
                FieldType::GeoPoint => {
                    let points = parse_geo_points(value).ok_or_else(|| {
                        mapper_parsing(format!("failed to parse field [{}] of type [geo_point]", name))
                    })?;
                    geo.insert(name.clone(), points);
                }
                FieldType::Keyword | FieldType::Text => {
                    let strings = collect_strings(value).ok_or_else(|| {
                        mapper_parsing(format!(
                            "failed to parse field [{}] of type [{}]",
                            name,
                            mapping.kind.name()
                        ))
                    })?;
                    if mapping.kind == FieldType::Text {
                        let analyzer = self.analyzer(mapping.analyzer.as_deref());
                        text.insert(name.clone(), analyze_values(&analyzer, &strings));
                    }
                    for (sub, sub_mapping) in &mapping.subfields {
                        if sub_mapping.kind == FieldType::Text {
                            let analyzer = self.analyzer(sub_mapping.analyzer.as_deref());
                            text.insert(format!("{}.{}", name, sub), analyze_values(&analyzer, &strings));
                        }
                    }
                    for target in &mapping.copy_to {
                        copies.entry(target.clone()).or_default().extend(strings.iter().cloned());
                    }
                }
                FieldType::Long | FieldType::Double => {
                    if !scalars(value).all(is_numeric) {
                        return Err(mapper_parsing(format!(
                            "failed to parse field [{}] of type [{}]",
                            name,
                            mapping.kind.name()
                        )));
                    }
                }
                FieldType::Boolean => {
                    let valid = scalars(value)
                        .all(|v| v.is_boolean() || matches!(v.as_str(), Some("true") | Some("false")));
                    if !valid {
                        return Err(mapper_parsing(format!(
                            "failed to parse field [{}] of type [boolean]",
                            name
                        )));
                    }
                }
                FieldType::Date | FieldType::Nested | FieldType::Object => {}
            }
        }

        for (target, strings) in copies {
            let analyzer = match self.properties.get(&target) {
                Some(mapping) => self.analyzer(mapping.analyzer.as_deref()),
                None => Analyzer::standard(),
            };
            let positions = analyze_values(&analyzer, &strings);
            text.entry(target).or_default().extend(positions);
        }

        self.dynamic.extend(new_dynamic);

        Ok(IndexedDocument {
            source: source.clone(),
            text,
            geo,
        })
    }
}

fn dynamic_type(value: &Value) -> Option<FieldType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(FieldType::Boolean),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(FieldType::Long),
        Value::Number(_) => Some(FieldType::Double),
        Value::String(_) => Some(FieldType::Text),
        Value::Array(items) => items.iter().find_map(dynamic_type),
        Value::Object(_) => Some(FieldType::Object),
    }
}

fn scalars(value: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match value {
        Value::Array(items) => Box::new(items.iter().filter(|v| !v.is_null())),
        other => Box::new(std::iter::once(other)),
    }
}

fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

/// String forms of a scalar or array; `None` for objects
fn collect_strings(value: &Value) -> Option<Vec<String>> {
    let mut out = Vec::new();
    for v in scalars(value) {
        match v {
            Value::String(s) => out.push(s.clone()),
            Value::Number(n) => out.push(n.to_string()),
            Value::Bool(b) => out.push(b.to_string()),
            _ => return None,
        }
    }
    Some(out)
}

/// Analyze each value; an empty position between values keeps sequences from spanning them
fn analyze_values(analyzer: &Analyzer, values: &[String]) -> Positions {
    let mut positions = Positions::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            positions.push(Vec::new());
        }
        positions.extend(analyzer.analyze(value));
    }
    positions
}

fn point(lat: f64, lon: f64) -> Option<(f64, f64)> {
    let valid = lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0;
    valid.then_some((lat, lon))
}

/// Accepts `[lon, lat]`, `{lat, lon}`, `"lat,lon"` or an array of those
pub(crate) fn parse_geo_point(value: &Value) -> Option<(f64, f64)> {
    match value {
        Value::Array(pair) if pair.len() == 2 && pair.iter().all(Value::is_number) => {
            point(pair[1].as_f64()?, pair[0].as_f64()?)
        }
        Value::Object(map) => point(map.get("lat")?.as_f64()?, map.get("lon")?.as_f64()?),
        Value::String(s) => {
            let (lat, lon) = s.split_once(',')?;
            point(lat.trim().parse().ok()?, lon.trim().parse().ok()?)
        }
        _ => None,
    }
}

fn parse_geo_points(value: &Value) -> Option<Vec<(f64, f64)>> {
    match value {
        Value::Array(items) if items.iter().all(|i| i.is_array() || i.is_object() || i.is_string()) => {
            items.iter().map(parse_geo_point).collect()
        }
        other => parse_geo_point(other).map(|p| vec![p]),
    }
}
