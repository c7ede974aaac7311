//! Query evaluation for the in-memory engine
//!
//! Scores follow a simplified BM25: per matched term `idf * tf_norm`, summed
//! over the terms of a clause. Only relative order matters to callers.

use super::analysis::{parse_geo_point, IndexMeta, IndexedDocument, Positions, QueryTerm};
use crate::engine::{EngineError, EngineResult};
use crate::search::Distance;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

const K1: f64 = 1.2;
const B: f64 = 0.75;
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A document under evaluation together with its index metadata
#[derive(Clone, Copy)]
pub(crate) struct Candidate<'a> {
    pub meta: &'a IndexMeta,
    pub doc: &'a IndexedDocument,
}

/// Term statistics over every searched document
#[derive(Debug, Default)]
pub(crate) struct CorpusStats {
    docs: usize,
    doc_freq: HashMap<(String, String), usize>,
    avg_len: HashMap<String, f64>,
}

impl CorpusStats {
    pub fn build<'a>(docs: impl IntoIterator<Item = &'a IndexedDocument>) -> Self {
        let mut stats = CorpusStats::default();
        let mut total_len: HashMap<String, usize> = HashMap::new();
        for doc in docs {
            stats.docs += 1;
            for (path, positions) in &doc.text {
                *total_len.entry(path.clone()).or_default() += positions.len();
                let distinct: HashSet<&String> = positions.iter().flatten().collect();
                for token in distinct {
                    *stats.doc_freq.entry((path.clone(), token.clone())).or_default() += 1;
                }
            }
        }
        for (path, len) in total_len {
            stats.avg_len.insert(path, len as f64 / stats.docs.max(1) as f64);
        }
        stats
    }

    fn idf(&self, path: &str, token: &str) -> f64 {
        let df = self
            .doc_freq
            .get(&(path.to_string(), token.to_string()))
            .copied()
            .unwrap_or(0) as f64;
        let n = self.docs as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    fn weight(&self, path: &str, token: &str, tf: usize, len: usize) -> f64 {
        let avg = self.avg_len.get(path).copied().unwrap_or(1.0).max(1.0);
        let tf = tf as f64;
        let norm = tf * (K1 + 1.0) / (tf + K1 * (1.0 - B + B * len as f64 / avg));
        self.idf(path, token) * norm
    }
}

fn parsing(reason: impl Into<String>) -> EngineError {
    EngineError::rejected(400, "parsing_exception", reason)
}

fn boost_of(body: &Value) -> f64 {
    body.get("boost").and_then(Value::as_f64).unwrap_or(1.0)
}

/// Evaluate `query` against one document. `None` means no match.
pub(crate) fn evaluate(query: &Value, candidate: Candidate<'_>, stats: &CorpusStats) -> EngineResult<Option<f64>> {
    let object = query
        .as_object()
        .filter(|o| o.len() == 1)
        .ok_or_else(|| parsing(format!("query must be an object with a single key: {}", query)))?;
    let (kind, body) = object
        .iter()
        .next()
        .ok_or_else(|| parsing("empty query"))?;

    match kind.as_str() {
        "match_all" => Ok(Some(boost_of(body))),
        "bool" => evaluate_bool(body, candidate, stats),
        "multi_match" => {
            let fields: Vec<String> = body
                .get("fields")
                .and_then(Value::as_array)
                .map(|f| f.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            evaluate_text(body, &fields, candidate, stats)
        }
        "match" => {
            let (field, params) = single_field(body, "match")?;
            let params = match params {
                Value::Object(_) => params.clone(),
                other => json!({ "query": other }),
            };
            evaluate_text(&params, &[field.to_string()], candidate, stats)
        }
        "term" => {
            let (field, params) = single_field(body, "term")?;
            let (value, boost) = match params {
                Value::Object(p) if p.contains_key("value") => (&p["value"], boost_of(params)),
                other => (other, 1.0),
            };
            let hit = values_at(&candidate.doc.source, field)
                .into_iter()
                .any(|v| value_eq(v, value));
            Ok(hit.then_some(boost))
        }
        "terms" => {
            let (field, values) = body
                .as_object()
                .and_then(|o| o.iter().find(|(k, _)| k.as_str() != "boost"))
                .ok_or_else(|| parsing("[terms] query requires a field"))?;
            let values = values
                .as_array()
                .ok_or_else(|| parsing("[terms] query requires an array of values"))?;
            let hit = values_at(&candidate.doc.source, field)
                .into_iter()
                .any(|v| values.iter().any(|q| value_eq(v, q)));
            Ok(hit.then_some(boost_of(body)))
        }
        "ids" => {
            let id = candidate.doc.source.get("id");
            let hit = body
                .get("values")
                .and_then(Value::as_array)
                .map(|ids| ids.iter().any(|q| id.map(|v| value_eq(v, q)).unwrap_or(false)))
                .unwrap_or(false);
            Ok(hit.then_some(1.0))
        }
        "range" => {
            let (field, bounds) = single_field(body, "range")?;
            let hit = values_at(&candidate.doc.source, field)
                .into_iter()
                .any(|v| in_range(v, bounds));
            Ok(hit.then_some(boost_of(bounds)))
        }
        "exists" => {
            let field = body
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| parsing("[exists] requires a field"))?;
            let hit = !values_at(&candidate.doc.source, field).is_empty() || candidate.doc.geo.contains_key(field);
            Ok(hit.then_some(1.0))
        }
        "geo_distance" => evaluate_geo_distance(body, candidate),
        "nested" => evaluate_nested(body, candidate, stats),
        "function_score" => evaluate_function_score(body, candidate, stats),
        "dis_max" => {
            let queries = body
                .get("queries")
                .and_then(Value::as_array)
                .ok_or_else(|| parsing("[dis_max] requires queries"))?;
            let tie = body.get("tie_breaker").and_then(Value::as_f64).unwrap_or(0.0);
            let mut scores = Vec::new();
            for q in queries {
                if let Some(score) = evaluate(q, candidate, stats)? {
                    scores.push(score);
                }
            }
            if scores.is_empty() {
                return Ok(None);
            }
            let max = scores.iter().cloned().fold(f64::MIN, f64::max);
            let rest: f64 = scores.iter().sum::<f64>() - max;
            Ok(Some((max + tie * rest) * boost_of(body)))
        }
        "constant_score" => {
            let filter = body
                .get("filter")
                .ok_or_else(|| parsing("[constant_score] requires a filter"))?;
            Ok(evaluate(filter, candidate, stats)?.map(|_| boost_of(body)))
        }
        other => Err(parsing(format!("unknown query [{}]", other))),
    }
}

fn single_field<'v>(body: &'v Value, query: &str) -> EngineResult<(&'v str, &'v Value)> {
    body.as_object()
        .and_then(|o| o.iter().next())
        .map(|(k, v)| (k.as_str(), v))
        .ok_or_else(|| parsing(format!("[{}] query requires a field", query)))
}

fn clauses(body: &Value, occur: &str) -> Vec<Value> {
    match body.get(occur) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(_)) => vec![body[occur].clone()],
        _ => Vec::new(),
    }
}

fn evaluate_bool(body: &Value, candidate: Candidate<'_>, stats: &CorpusStats) -> EngineResult<Option<f64>> {
    let must = clauses(body, "must");
    let filter = clauses(body, "filter");
    let should = clauses(body, "should");
    let must_not = clauses(body, "must_not");

    let mut score = 0.0;
    for clause in &must {
        match evaluate(clause, candidate, stats)? {
            Some(s) => score += s,
            None => return Ok(None),
        }
    }
    for clause in &filter {
        if evaluate(clause, candidate, stats)?.is_none() {
            return Ok(None);
        }
    }
    for clause in &must_not {
        if evaluate(clause, candidate, stats)?.is_some() {
            return Ok(None);
        }
    }

    let default_minimum = if must.is_empty() && filter.is_empty() && !should.is_empty() {
        1
    } else {
        0
    };
    let minimum = body
        .get("minimum_should_match")
        .and_then(Value::as_u64)
        .map(|m| m as usize)
        .unwrap_or(default_minimum);

    let mut matched = 0;
    for clause in &should {
        if let Some(s) = evaluate(clause, candidate, stats)? {
            matched += 1;
            score += s;
        }
    }
    if matched < minimum {
        return Ok(None);
    }

    if must.is_empty() && should.is_empty() {
        // pure filter context
        return Ok(Some(0.0));
    }
    Ok(Some(score * boost_of(body)))
}

#[derive(Clone, Copy)]
enum Fuzziness {
    Exact,
    Fixed(usize),
    Auto,
}

impl Fuzziness {
    fn parse(value: Option<&Value>) -> EngineResult<Self> {
        match value {
            None | Some(Value::Null) => Ok(Fuzziness::Exact),
            Some(Value::Number(n)) => Ok(Fuzziness::Fixed(n.as_u64().unwrap_or(0) as usize)),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("auto") => Ok(Fuzziness::Auto),
            Some(Value::String(s)) => s
                .parse::<usize>()
                .map(Fuzziness::Fixed)
                .map_err(|_| parsing(format!("invalid fuzziness [{}]", s))),
            Some(other) => Err(parsing(format!("invalid fuzziness {}", other))),
        }
    }

    fn max_edits(self, token: &str) -> usize {
        match self {
            Fuzziness::Exact => 0,
            Fuzziness::Fixed(n) => n.min(2),
            Fuzziness::Auto => match token.chars().count() {
                0..=2 => 0,
                3..=5 => 1,
                _ => 2,
            },
        }
    }
}

/// Split `"name.analyzed^10"` into path and boost
fn field_boost(spec: &str) -> (&str, f64) {
    match spec.split_once('^') {
        Some((path, boost)) => (path, boost.parse().unwrap_or(1.0)),
        None => (spec, 1.0),
    }
}

/// `match`/`multi_match`: best single field wins
fn evaluate_text(
    params: &Value,
    fields: &[String],
    candidate: Candidate<'_>,
    stats: &CorpusStats,
) -> EngineResult<Option<f64>> {
    let query = match params.get("query") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => return Err(parsing("text query requires [query]")),
    };
    let require_all = params
        .get("operator")
        .and_then(Value::as_str)
        .map(|op| op.eq_ignore_ascii_case("and"))
        .unwrap_or(false);
    let fuzziness = Fuzziness::parse(params.get("fuzziness"))?;

    let mut best: Option<f64> = None;
    for spec in fields {
        let (path, field_boost) = field_boost(spec);

        let score = if candidate.meta.is_text(path) {
            let terms = candidate.meta.search_analyzer(path).analyze_query(&query);
            match candidate.doc.text.get(path) {
                Some(positions) if !terms.is_empty() => {
                    score_terms(&terms, positions, path, require_all, fuzziness, stats)
                }
                _ => None,
            }
        } else {
            let hit = values_at(&candidate.doc.source, path)
                .into_iter()
                .any(|v| value_eq(v, &Value::String(query.clone())));
            hit.then_some(1.0)
        };

        if let Some(score) = score {
            let score = score * field_boost;
            best = Some(best.map_or(score, |b: f64| b.max(score)));
        }
    }

    Ok(best.map(|score| score * boost_of(params)))
}

fn score_terms(
    terms: &[QueryTerm],
    positions: &Positions,
    path: &str,
    require_all: bool,
    fuzziness: Fuzziness,
    stats: &CorpusStats,
) -> Option<f64> {
    let mut total = 0.0;
    let mut matched = 0;
    for term in terms {
        match score_term(term, positions, path, fuzziness, stats) {
            Some(score) => {
                matched += 1;
                total += score;
            }
            None if require_all => return None,
            None => {}
        }
    }
    (matched > 0).then_some(total)
}

fn score_term(
    term: &QueryTerm,
    positions: &Positions,
    path: &str,
    fuzziness: Fuzziness,
    stats: &CorpusStats,
) -> Option<f64> {
    let len = positions.iter().filter(|p| !p.is_empty()).count();
    let mut best: Option<f64> = None;
    let mut keep = |score: f64| best = Some(best.map_or(score, |b: f64| b.max(score)));

    for alternative in &term.alternatives {
        if alternative.len() == 1 {
            let token = &alternative[0];
            let tf = positions.iter().filter(|p| p.contains(token)).count();
            if tf > 0 {
                keep(stats.weight(path, token, tf, len));
                continue;
            }

            let max_edits = fuzziness.max_edits(token);
            if max_edits == 0 {
                continue;
            }
            let closest = positions
                .iter()
                .flatten()
                .filter(|candidate| !candidate.contains(' '))
                .map(|candidate| (edit_distance(token, candidate), candidate))
                .filter(|(distance, _)| *distance <= max_edits)
                .min();
            if let Some((distance, matched)) = closest {
                let tf = positions.iter().filter(|p| p.contains(matched)).count();
                let penalty = 1.0 - distance as f64 / (token.chars().count() as f64 + 1.0);
                keep(stats.weight(path, matched, tf, len) * penalty);
            }
        } else {
            let n = alternative.len();
            let tf = positions
                .windows(n)
                .filter(|window| window.iter().zip(alternative).all(|(p, t)| p.contains(t)))
                .count();
            if tf > 0 {
                let score: f64 = alternative.iter().map(|t| stats.weight(path, t, tf, len)).sum();
                keep(score);
            }
        }
    }

    best
}

/// Optimal string alignment distance (adjacent transpositions count as one edit)
pub(crate) fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    let mut d = vec![vec![0usize; m + 1]; n + 1];
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=m {
        d[0][j] = j;
    }
    for i in 1..=n {
        for j in 1..=m {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            d[i][j] = (d[i - 1][j] + 1).min(d[i][j - 1] + 1).min(d[i - 1][j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                d[i][j] = d[i][j].min(d[i - 2][j - 2] + 1);
            }
        }
    }
    d[n][m]
}

/// Values at a dotted path, flattening arrays at every level; nulls are skipped
pub(crate) fn values_at<'v>(source: &'v Value, path: &str) -> Vec<&'v Value> {
    let mut current = vec![source];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(child) = map.get(segment) {
                        next.push(child);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(child) = item.get(segment) {
                            next.push(child);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }

    let mut out = Vec::new();
    for value in current {
        match value {
            Value::Array(items) => out.extend(items.iter().filter(|v| !v.is_null())),
            Value::Null => {}
            other => out.push(other),
        }
    }
    out
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn value_eq(doc: &Value, query: &Value) -> bool {
    match (doc, query) {
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Bool(a), Value::String(b)) | (Value::String(b), Value::Bool(a)) => b == &a.to_string(),
        (Value::Number(_), _) | (_, Value::Number(_)) => match (as_number(doc), as_number(query)) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => false,
        },
        _ => false,
    }
}

/// Ordering used by range queries and sorting: numeric when both sides are numeric
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(_), _) | (_, Value::Number(_)) => as_number(a)?.partial_cmp(&as_number(b)?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn in_range(value: &Value, bounds: &Value) -> bool {
    use std::cmp::Ordering::*;
    let check = |key: &str, ok: &[std::cmp::Ordering]| match bounds.get(key) {
        Some(bound) if !bound.is_null() => compare_values(value, bound).map(|o| ok.contains(&o)).unwrap_or(false),
        _ => true,
    };
    check("gt", &[Greater]) && check("gte", &[Greater, Equal]) && check("lt", &[Less]) && check("lte", &[Less, Equal])
}

pub(crate) fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let h = ((lat2 - lat1) / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * ((lon2 - lon1) / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

const GEO_PARAMS: [&str; 5] = ["distance", "distance_type", "validation_method", "_name", "boost"];

/// The `{field: origin}` entry of a geo query or sort
pub(crate) fn geo_origin(body: &Map<String, Value>) -> EngineResult<(&str, (f64, f64))> {
    let (field, origin) = body
        .iter()
        .find(|(k, _)| !GEO_PARAMS.contains(&k.as_str()) && !matches!(k.as_str(), "order" | "unit" | "mode"))
        .ok_or_else(|| parsing("geo query requires a field"))?;
    let origin = parse_geo_point(origin).ok_or_else(|| parsing(format!("invalid geo origin {}", origin)))?;
    Ok((field.as_str(), origin))
}

fn evaluate_geo_distance(body: &Value, candidate: Candidate<'_>) -> EngineResult<Option<f64>> {
    let params = body
        .as_object()
        .ok_or_else(|| parsing("[geo_distance] requires an object"))?;
    let max_km = match params.get("distance") {
        Some(Value::String(s)) => match s.parse::<Distance>() {
            Ok(distance) => distance.as_km(),
            // bare numbers are meters
            Err(_) => s
                .trim()
                .parse::<f64>()
                .map(|m| m / 1000.0)
                .map_err(|_| parsing(format!("invalid distance [{}]", s)))?,
        },
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0) / 1000.0,
        _ => return Err(parsing("[geo_distance] requires a distance")),
    };
    let (field, origin) = geo_origin(params)?;

    let hit = candidate
        .doc
        .geo
        .get(field)
        .map(|points| points.iter().any(|p| haversine_km(origin, *p) <= max_km))
        .unwrap_or(false);
    Ok(hit.then_some(1.0))
}

fn evaluate_nested(body: &Value, candidate: Candidate<'_>, stats: &CorpusStats) -> EngineResult<Option<f64>> {
    let path = body
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| parsing("[nested] requires a path"))?;
    let query = body
        .get("query")
        .ok_or_else(|| parsing("[nested] requires a query"))?;
    let mode = body.get("score_mode").and_then(Value::as_str).unwrap_or("avg");

    let mut scores = Vec::new();
    for child in values_at(&candidate.doc.source, path) {
        if !child.is_object() {
            continue;
        }
        let mut wrapper = Map::new();
        wrapper.insert(path.to_string(), child.clone());
        let doc = IndexedDocument::bare(Value::Object(wrapper));
        let nested = Candidate {
            meta: candidate.meta,
            doc: &doc,
        };
        if let Some(score) = evaluate(query, nested, stats)? {
            scores.push(score);
        }
    }

    if scores.is_empty() {
        return Ok(None);
    }
    let score = match mode {
        "sum" => scores.iter().sum(),
        "max" => scores.iter().cloned().fold(f64::MIN, f64::max),
        "min" => scores.iter().cloned().fold(f64::MAX, f64::min),
        "none" => 0.0,
        _ => scores.iter().sum::<f64>() / scores.len() as f64,
    };
    Ok(Some(score * boost_of(body)))
}

fn apply_modifier(modifier: &str, x: f64) -> EngineResult<f64> {
    Ok(match modifier {
        "none" => x,
        "log" => x.log10(),
        "log1p" => (x + 1.0).log10(),
        "log2p" => (x + 2.0).log10(),
        "ln" => x.ln(),
        "ln1p" => x.ln_1p(),
        "ln2p" => (x + 2.0).ln(),
        "square" => x * x,
        "sqrt" => x.sqrt(),
        "reciprocal" => 1.0 / x,
        other => return Err(parsing(format!("unknown modifier [{}]", other))),
    })
}

fn evaluate_function_score(body: &Value, candidate: Candidate<'_>, stats: &CorpusStats) -> EngineResult<Option<f64>> {
    let inner = match body.get("query") {
        Some(query) => evaluate(query, candidate, stats)?,
        None => Some(1.0),
    };
    let Some(query_score) = inner else {
        return Ok(None);
    };

    let factor = match body.get("field_value_factor") {
        Some(fvf) => {
            let field = fvf
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| parsing("[field_value_factor] requires a field"))?;
            let value = values_at(&candidate.doc.source, field)
                .into_iter()
                .find_map(as_number)
                .or_else(|| fvf.get("missing").and_then(Value::as_f64));
            match value {
                Some(value) => {
                    let scale = fvf.get("factor").and_then(Value::as_f64).unwrap_or(1.0);
                    let modifier = fvf.get("modifier").and_then(Value::as_str).unwrap_or("none");
                    apply_modifier(modifier, value * scale)?
                }
                None => 1.0,
            }
        }
        None => body.get("weight").and_then(Value::as_f64).unwrap_or(1.0),
    };

    let combined = match body.get("boost_mode").and_then(Value::as_str).unwrap_or("multiply") {
        "replace" => factor,
        "sum" => query_score + factor,
        "avg" => (query_score + factor) / 2.0,
        "max" => query_score.max(factor),
        "min" => query_score.min(factor),
        _ => query_score * factor,
    };
    Ok(Some(combined * boost_of(body)))
}

/// Phrase suggestions for `text` against `field`, shaped like the engine's `suggest` section entry
pub(crate) fn phrase_suggest(text: &str, field: &str, size: usize, candidates: &[Candidate<'_>]) -> Value {
    let mut vocabulary: BTreeMap<&str, usize> = BTreeMap::new();
    for candidate in candidates {
        if let Some(positions) = candidate.doc.text.get(field) {
            for token in positions.iter().filter_map(|p| p.first()) {
                *vocabulary.entry(token.as_str()).or_default() += 1;
            }
        }
    }

    let analyzer = match candidates.first() {
        Some(c) => c.meta.search_analyzer(field),
        None => return json!([{ "text": text, "offset": 0, "length": text.chars().count(), "options": [] }]),
    };
    let tokens: Vec<String> = analyzer
        .analyze_query(text)
        .into_iter()
        .filter_map(|term| term.alternatives.into_iter().next().and_then(|alt| alt.into_iter().next()))
        .collect();

    let mut corrected = Vec::with_capacity(tokens.len());
    let mut changed = false;
    let mut score = 1.0;
    for token in &tokens {
        if vocabulary.contains_key(token.as_str()) {
            corrected.push(token.clone());
            continue;
        }
        let replacement = vocabulary
            .iter()
            .map(|(word, freq)| (edit_distance(token, word), std::cmp::Reverse(*freq), *word))
            .filter(|(distance, _, _)| *distance <= 2)
            .min();
        match replacement {
            Some((distance, _, word)) => {
                changed = true;
                score *= 1.0 - distance as f64 / (token.chars().count() as f64 + 1.0);
                corrected.push(word.to_string());
            }
            None => corrected.push(token.clone()),
        }
    }

    let options = if changed && size > 0 {
        vec![json!({ "text": corrected.join(" "), "score": score })]
    } else {
        Vec::new()
    };
    json!([{ "text": text, "offset": 0, "length": text.chars().count(), "options": options }])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_and_doc(source: Value) -> (IndexMeta, IndexedDocument) {
        let mut meta = IndexMeta::from_body(&json!({
            "settings": { "analysis": {
                "filter": { "syn": { "type": "synonym_graph", "synonyms": ["clorox,bleach"] } },
                "analyzer": {
                    "plain": { "tokenizer": "standard", "filter": ["lowercase"] },
                    "search": { "tokenizer": "standard", "filter": ["lowercase", "syn"] }
                }
            }},
            "mappings": {
                "properties": {
                    "name": { "type": "keyword", "fields": {
                        "analyzed": { "type": "text", "analyzer": "plain", "search_analyzer": "search" } } },
                    "location": { "type": "geo_point" },
                    "conversions": { "type": "nested" }
                }
            }
        }))
        .unwrap();
        let doc = meta.index_document(&source).unwrap();
        (meta, doc)
    }

    fn eval(query: Value, source: Value) -> Option<f64> {
        let (meta, doc) = meta_and_doc(source);
        let stats = CorpusStats::build([&doc]);
        evaluate(&query, Candidate { meta: &meta, doc: &doc }, &stats).unwrap()
    }

    #[test]
    fn test_multi_match_operator_and() {
        let source = json!({ "name": "Clorox Bleach" });
        let q = |text: &str| json!({ "multi_match": { "query": text, "fields": ["name.analyzed"], "operator": "and" } });

        assert!(eval(q("bleach"), source.clone()).is_some());
        assert!(eval(q("CLOROX"), source.clone()).is_some());
        assert!(eval(q("bleach soap"), source).is_none());
    }

    #[test]
    fn test_synonym_match_both_directions() {
        let q = |text: &str| json!({ "match": { "name.analyzed": { "query": text, "operator": "and" } } });
        assert!(eval(q("clorox"), json!({ "name": "Bleach" })).is_some());
        assert!(eval(q("bleach"), json!({ "name": "Clorox" })).is_some());
    }

    #[test]
    fn test_fuzziness() {
        let q = json!({ "multi_match": { "query": "beer", "fields": ["name.analyzed"], "fuzziness": "AUTO" } });
        assert!(eval(q, json!({ "name": "Gummy Bear" })).is_some());

        let q = json!({ "multi_match": { "query": "beer", "fields": ["name.analyzed"] } });
        assert!(eval(q, json!({ "name": "Gummy Bear" })).is_none());
    }

    #[test]
    fn test_bool_filters() {
        let source = json!({ "name": "Gummy Bear", "in_stock": true, "orders_count": 3, "user_ids": ["u1"] });
        let q = json!({ "bool": {
            "must": [{ "match_all": {} }],
            "filter": [{ "term": { "in_stock": true } }, { "range": { "orders_count": { "gte": 2 } } }],
            "must_not": [{ "term": { "name": "Altoid Mints" } }]
        }});
        assert!(eval(q, source.clone()).is_some());

        let q = json!({ "bool": { "filter": [{ "terms": { "user_ids": ["u2", "u3"] } }] } });
        assert!(eval(q, source.clone()).is_none());

        let q = json!({ "bool": { "must": [{ "match_all": {} }],
            "should": [{ "term": { "user_ids": { "value": "u1", "boost": 10.0 } } }] } });
        assert_eq!(eval(q, source), Some(11.0));
    }

    #[test]
    fn test_geo_distance() {
        let source = json!({ "location": [-122.42, 37.77] });
        let near = |distance: &str| json!({ "geo_distance": { "distance": distance, "location": { "lat": 37.80, "lon": -122.40 } } });

        assert!(eval(near("10km"), source.clone()).is_some());
        assert!(eval(near("1km"), source).is_none());
        assert!(eval(near("10km"), json!({ "name": "nowhere" })).is_none());
    }

    #[test]
    fn test_nested_function_score() {
        let source = json!({ "conversions": [{ "query": "bear", "count": 5 }, { "query": "candy", "count": 1 }] });
        let q = json!({ "nested": { "path": "conversions", "score_mode": "sum", "query": { "function_score": {
            "query": { "term": { "conversions.query": "bear" } },
            "field_value_factor": { "field": "conversions.count", "modifier": "ln2p" },
            "boost_mode": "replace"
        }}}});
        let score = eval(q, source).unwrap();
        assert!((score - 7f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("beer", "bear"), 1);
        assert_eq!(edit_distance("ab", "ba"), 1);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn test_haversine() {
        let sf = (37.7749, -122.4194);
        let oakland = (37.8044, -122.2712);
        let km = haversine_km(sf, oakland);
        assert!(km > 12.0 && km < 14.0);
    }

    #[test]
    fn test_unknown_query_rejected() {
        let (meta, doc) = meta_and_doc(json!({ "name": "x" }));
        let stats = CorpusStats::build([&doc]);
        let err = evaluate(&json!({ "percolate": {} }), Candidate { meta: &meta, doc: &doc }, &stats).unwrap_err();
        assert!(matches!(err, EngineError::Rejected { status: 400, .. }));
    }
}
