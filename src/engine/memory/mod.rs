//! Embedded search engine
//!
//! Interprets the index settings, mappings and query DSL subset produced by
//! this crate. Writes become visible to search after a refresh, like a real
//! cluster with a refresh interval.

mod analysis;
mod eval;

use crate::engine::{
    AliasAction, BulkItem, BulkItemResult, BulkOperation, BulkResponse, EngineError, EngineErrorBody, EngineHit,
    EngineHits, EngineResponse, EngineResult, HitsTotal, SearchEngine,
};
use analysis::{IndexMeta, IndexedDocument};
use async_trait::async_trait;
use eval::{Candidate, CorpusStats};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const DEFAULT_SIZE: usize = 10;

#[derive(Debug, Clone)]
struct IndexState {
    meta: IndexMeta,
    /// Documents visible to search
    documents: BTreeMap<String, IndexedDocument>,
    /// Writes since the last refresh; `None` marks a delete
    pending: BTreeMap<String, Option<IndexedDocument>>,
}

impl IndexState {
    fn new(meta: IndexMeta) -> Self {
        Self {
            meta,
            documents: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }

    fn contains(&self, id: &str) -> bool {
        match self.pending.get(id) {
            Some(write) => write.is_some(),
            None => self.documents.contains_key(id),
        }
    }

    fn refresh(&mut self) {
        for (id, write) in std::mem::take(&mut self.pending) {
            match write {
                Some(doc) => {
                    self.documents.insert(id, doc);
                }
                None => {
                    self.documents.remove(&id);
                }
            }
        }
    }
}

#[derive(Debug, Default, Clone)]
struct EngineState {
    indices: BTreeMap<String, IndexState>,
    /// alias -> concrete indices
    aliases: BTreeMap<String, BTreeSet<String>>,
}

fn index_not_found(name: &str) -> EngineError {
    EngineError::rejected(404, "index_not_found_exception", format!("no such index [{}]", name))
}

impl EngineState {
    /// Concrete indices behind a name (index, alias or wildcard pattern)
    fn resolve(&self, name: &str) -> EngineResult<Vec<String>> {
        if self.indices.contains_key(name) {
            return Ok(vec![name.to_string()]);
        }
        if let Some(targets) = self.aliases.get(name) {
            return Ok(targets.iter().cloned().collect());
        }
        if name.contains('*') {
            return Ok(self
                .indices
                .keys()
                .filter(|index| wildcard_match(name, index))
                .cloned()
                .collect());
        }
        Err(index_not_found(name))
    }

    /// Single write target; a missing name creates an index with dynamic mappings
    fn write_target(&mut self, name: &str) -> EngineResult<String> {
        if self.indices.contains_key(name) {
            return Ok(name.to_string());
        }
        if let Some(targets) = self.aliases.get(name) {
            return match targets.len() {
                1 => Ok(targets.iter().next().cloned().unwrap_or_default()),
                _ => Err(EngineError::rejected(
                    400,
                    "illegal_argument_exception",
                    format!("no write index is defined for alias [{}]", name),
                )),
            };
        }
        debug!(index = %name, "Auto-creating index on write");
        self.indices
            .insert(name.to_string(), IndexState::new(IndexMeta::dynamic_default()));
        Ok(name.to_string())
    }

    fn apply_alias_action(&mut self, action: &AliasAction) -> EngineResult<()> {
        match action {
            AliasAction::Add { index, alias } => {
                if !self.indices.contains_key(index) {
                    return Err(index_not_found(index));
                }
                if self.indices.contains_key(alias) {
                    return Err(EngineError::rejected(
                        400,
                        "invalid_alias_name_exception",
                        format!("Invalid alias name [{}]: an index exists with the same name", alias),
                    ));
                }
                self.aliases.entry(alias.clone()).or_default().insert(index.clone());
            }
            AliasAction::Remove { index, alias } => {
                let removed = self
                    .aliases
                    .get_mut(alias)
                    .map(|targets| targets.remove(index))
                    .unwrap_or(false);
                if !removed {
                    return Err(EngineError::rejected(
                        404,
                        "aliases_not_found_exception",
                        format!("aliases [{}] missing on [{}]", alias, index),
                    ));
                }
                if self.aliases.get(alias).map(BTreeSet::is_empty).unwrap_or(false) {
                    self.aliases.remove(alias);
                }
            }
            AliasAction::RemoveIndex { index } => {
                if self.indices.remove(index).is_none() {
                    return Err(index_not_found(index));
                }
                self.drop_from_aliases(index);
            }
        }
        Ok(())
    }

    fn drop_from_aliases(&mut self, index: &str) {
        for targets in self.aliases.values_mut() {
            targets.remove(index);
        }
        self.aliases.retain(|_, targets| !targets.is_empty());
    }
}

/// `*` matches any run of characters
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }
    let mut rest = name;
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

/// In-memory engine for tests and local development
#[derive(Clone, Default)]
pub struct InMemoryEngine {
    state: Arc<RwLock<EngineState>>,
    offline: Arc<AtomicBool>,
    /// Bulk requests allowed before the engine goes offline
    bulk_budget: Arc<Mutex<Option<usize>>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable engine
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    /// Accept `remaining` more bulk requests, then go offline
    pub fn go_offline_after_bulks(&self, remaining: usize) {
        *self.bulk_budget.lock() = Some(remaining);
    }

    /// Number of documents visible to search in an index or alias
    pub fn document_count(&self, name: &str) -> usize {
        let state = self.state.read();
        state
            .resolve(name)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|index| state.indices.get(index))
                    .map(|index| index.documents.len())
                    .sum()
            })
            .unwrap_or(0)
    }

    fn check_online(&self) -> EngineResult<()> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            Err(EngineError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn consume_bulk_budget(&self) -> EngineResult<()> {
        let mut budget = self.bulk_budget.lock();
        if let Some(remaining) = budget.as_mut() {
            if *remaining == 0 {
                self.set_offline(true);
                *budget = None;
                return Err(EngineError::Unavailable("connection reset".to_string()));
            }
            *remaining -= 1;
        }
        Ok(())
    }
}

#[derive(Debug)]
enum SortKey {
    Score { descending: bool },
    Field { path: String, descending: bool },
    GeoDistance { field: String, origin: (f64, f64), descending: bool, unit_km: f64 },
}

fn parse_order(value: Option<&Value>, default_desc: bool) -> bool {
    match value.and_then(Value::as_str) {
        Some(order) => order.eq_ignore_ascii_case("desc"),
        None => default_desc,
    }
}

fn unit_km(unit: &str) -> EngineResult<f64> {
    Ok(match unit {
        "km" => 1.0,
        "m" => 0.001,
        "mi" => 1.609_344,
        other => {
            return Err(EngineError::rejected(
                400,
                "parsing_exception",
                format!("unknown distance unit [{}]", other),
            ))
        }
    })
}

fn parse_sort(body: &Value) -> EngineResult<Vec<SortKey>> {
    let entries = match body.get("sort") {
        None => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries.clone(),
        Some(other) => vec![other.clone()],
    };

    let mut keys = Vec::new();
    for entry in entries {
        match entry {
            Value::String(field) if field == "_score" => keys.push(SortKey::Score { descending: true }),
            Value::String(field) => keys.push(SortKey::Field {
                path: field,
                descending: false,
            }),
            Value::Object(map) => {
                for (field, spec) in &map {
                    let spec_order = match spec {
                        Value::String(_) => Some(spec),
                        other => other.get("order"),
                    };
                    if field == "_score" {
                        keys.push(SortKey::Score {
                            descending: parse_order(spec_order, true),
                        });
                    } else if field == "_geo_distance" {
                        let params = spec.as_object().ok_or_else(|| {
                            EngineError::rejected(400, "parsing_exception", "[_geo_distance] requires an object")
                        })?;
                        let (geo_field, origin) = eval::geo_origin(params)?;
                        let unit = params.get("unit").and_then(Value::as_str).unwrap_or("m");
                        keys.push(SortKey::GeoDistance {
                            field: geo_field.to_string(),
                            origin,
                            descending: parse_order(spec_order, false),
                            unit_km: unit_km(unit)?,
                        });
                    } else {
                        keys.push(SortKey::Field {
                            path: field.clone(),
                            descending: parse_order(spec_order, false),
                        });
                    }
                }
            }
            other => {
                return Err(EngineError::rejected(
                    400,
                    "parsing_exception",
                    format!("invalid sort {}", other),
                ))
            }
        }
    }
    Ok(keys)
}

struct Matched<'a> {
    index: &'a str,
    id: &'a str,
    doc: &'a IndexedDocument,
    score: f64,
    sort: Vec<Option<Value>>,
}

fn sort_value(key: &SortKey, doc: &IndexedDocument, score: f64) -> Option<Value> {
    match key {
        SortKey::Score { .. } => Some(Value::from(score)),
        SortKey::Field { path, descending } => {
            let values = eval::values_at(&doc.source, path);
            let pick = if *descending {
                values.into_iter().max_by(|a, b| eval::compare_values(a, b).unwrap_or(Ordering::Equal))
            } else {
                values.into_iter().min_by(|a, b| eval::compare_values(a, b).unwrap_or(Ordering::Equal))
            };
            pick.cloned()
        }
        SortKey::GeoDistance { field, origin, unit_km, .. } => doc.geo.get(field).and_then(|points| {
            points
                .iter()
                .map(|p| eval::haversine_km(*origin, *p) / unit_km)
                .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
                .map(Value::from)
        }),
    }
}

fn descending(key: &SortKey) -> bool {
    match key {
        SortKey::Score { descending } | SortKey::Field { descending, .. } | SortKey::GeoDistance { descending, .. } => {
            *descending
        }
    }
}

/// Missing values sort last in either direction
fn compare_sort(keys: &[SortKey], a: &[Option<Value>], b: &[Option<Value>]) -> Ordering {
    for (i, key) in keys.iter().enumerate() {
        let ordering = match (&a[i], &b[i]) {
            (Some(x), Some(y)) => {
                let o = eval::compare_values(x, y).unwrap_or(Ordering::Equal);
                if descending(key) {
                    o.reverse()
                } else {
                    o
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn suggestions(body: &Value, candidates: &[Candidate<'_>]) -> Option<Value> {
    let suggest = body.get("suggest")?.as_object()?;
    let global_text = suggest.get("text").and_then(Value::as_str);

    let mut out = Map::new();
    for (name, spec) in suggest {
        let Some(phrase) = spec.get("phrase") else {
            continue;
        };
        let Some(text) = spec.get("text").and_then(Value::as_str).or(global_text) else {
            continue;
        };
        let Some(field) = phrase.get("field").and_then(Value::as_str) else {
            continue;
        };
        let size = phrase.get("size").and_then(Value::as_u64).unwrap_or(5) as usize;
        out.insert(name.clone(), eval::phrase_suggest(text, field, size, candidates));
    }
    Some(Value::Object(out))
}

#[async_trait]
impl SearchEngine for InMemoryEngine {
    async fn create_index(&self, name: &str, body: &Value) -> EngineResult<()> {
        self.check_online()?;
        let meta = IndexMeta::from_body(body)?;

        let mut state = self.state.write();
        if state.indices.contains_key(name) {
            return Err(EngineError::rejected(
                400,
                "resource_already_exists_exception",
                format!("index [{}] already exists", name),
            ));
        }
        if state.aliases.contains_key(name) {
            return Err(EngineError::rejected(
                400,
                "invalid_index_name_exception",
                format!("Invalid index name [{}], already exists as alias", name),
            ));
        }
        state.indices.insert(name.to_string(), IndexState::new(meta));
        debug!(index = %name, "Index created");
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> EngineResult<bool> {
        self.check_online()?;
        let mut state = self.state.write();
        if state.indices.remove(name).is_some() {
            state.drop_from_aliases(name);
            return Ok(true);
        }
        if state.aliases.contains_key(name) {
            return Err(EngineError::rejected(
                400,
                "illegal_argument_exception",
                format!(
                    "The provided expression [{}] matches an alias, specify the corresponding concrete indices instead.",
                    name
                ),
            ));
        }
        Ok(false)
    }

    async fn index_exists(&self, name: &str) -> EngineResult<bool> {
        self.check_online()?;
        let state = self.state.read();
        Ok(state.indices.contains_key(name) || state.aliases.contains_key(name))
    }

    async fn list_indices(&self, pattern: &str) -> EngineResult<Vec<String>> {
        self.check_online()?;
        let state = self.state.read();
        Ok(state
            .indices
            .keys()
            .filter(|name| wildcard_match(pattern, name))
            .cloned()
            .collect())
    }

    async fn get_alias(&self, alias: &str) -> EngineResult<Vec<String>> {
        self.check_online()?;
        let state = self.state.read();
        Ok(state
            .aliases
            .get(alias)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> EngineResult<()> {
        self.check_online()?;
        let mut state = self.state.write();

        // all or nothing
        let mut next = state.clone();
        for action in actions {
            next.apply_alias_action(action)?;
        }
        *state = next;
        Ok(())
    }

    async fn bulk(&self, index: &str, operations: &[BulkOperation]) -> EngineResult<BulkResponse> {
        self.check_online()?;
        self.consume_bulk_budget()?;

        let mut state = self.state.write();
        let target = state.write_target(index)?;
        let index_state = state
            .indices
            .get_mut(&target)
            .ok_or_else(|| index_not_found(&target))?;

        let mut items = Vec::with_capacity(operations.len());
        for operation in operations {
            let item = match operation {
                BulkOperation::Index { id, source } => match index_state.meta.index_document(source) {
                    Ok(doc) => {
                        let status = if index_state.contains(id) { 200 } else { 201 };
                        index_state.pending.insert(id.clone(), Some(doc));
                        BulkItem::Index(BulkItemResult {
                            id: id.clone(),
                            status,
                            error: None,
                        })
                    }
                    Err(EngineError::Rejected { status, kind, reason }) => BulkItem::Index(BulkItemResult {
                        id: id.clone(),
                        status,
                        error: Some(EngineErrorBody { kind, reason }),
                    }),
                    Err(other) => return Err(other),
                },
                BulkOperation::Delete { id } => {
                    let existed = index_state.contains(id);
                    index_state.pending.insert(id.clone(), None);
                    BulkItem::Delete(BulkItemResult {
                        id: id.clone(),
                        status: if existed { 200 } else { 404 },
                        error: None,
                    })
                }
            };
            items.push(item);
        }

        let errors = items.iter().any(|item| item.result().error.is_some());
        Ok(BulkResponse { errors, items })
    }

    async fn delete_document(&self, index: &str, id: &str) -> EngineResult<bool> {
        self.check_online()?;
        let mut state = self.state.write();
        let targets = match state.resolve(index) {
            Ok(targets) => targets,
            Err(err) if err.is_not_found() => return Ok(false),
            Err(err) => return Err(err),
        };

        let mut deleted = false;
        for target in targets {
            if let Some(index_state) = state.indices.get_mut(&target) {
                if index_state.contains(id) {
                    index_state.pending.insert(id.to_string(), None);
                    deleted = true;
                }
            }
        }
        Ok(deleted)
    }

    async fn refresh(&self, index: &str) -> EngineResult<()> {
        self.check_online()?;
        let mut state = self.state.write();
        for target in state.resolve(index)? {
            if let Some(index_state) = state.indices.get_mut(&target) {
                index_state.refresh();
            }
        }
        Ok(())
    }

    async fn search(&self, index: &str, body: &Value) -> EngineResult<EngineResponse> {
        self.check_online()?;
        let started = Instant::now();
        let state = self.state.read();
        let names = state.resolve(index)?;

        let candidates: Vec<(&str, &str, Candidate<'_>)> = names
            .iter()
            .filter_map(|name| state.indices.get_key_value(name))
            .flat_map(|(name, index_state)| {
                index_state.documents.iter().map(move |(id, doc)| {
                    (
                        name.as_str(),
                        id.as_str(),
                        Candidate {
                            meta: &index_state.meta,
                            doc,
                        },
                    )
                })
            })
            .collect();
        let stats = CorpusStats::build(candidates.iter().map(|(_, _, c)| c.doc));

        let match_all = serde_json::json!({ "match_all": {} });
        let query = body.get("query").unwrap_or(&match_all);
        let keys = parse_sort(body)?;

        let mut matched = Vec::new();
        for (index_name, id, candidate) in &candidates {
            if let Some(score) = eval::evaluate(query, *candidate, &stats)? {
                let sort = keys.iter().map(|key| sort_value(key, candidate.doc, score)).collect();
                matched.push(Matched {
                    index: *index_name,
                    id: *id,
                    doc: candidate.doc,
                    score,
                    sort,
                });
            }
        }

        if keys.is_empty() {
            matched.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.index.cmp(b.index))
                    .then_with(|| a.id.cmp(b.id))
            });
        } else {
            matched.sort_by(|a, b| {
                compare_sort(&keys, &a.sort, &b.sort)
                    .then_with(|| a.index.cmp(b.index))
                    .then_with(|| a.id.cmp(b.id))
            });
        }

        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body
            .get("size")
            .and_then(Value::as_u64)
            .map(|s| s as usize)
            .unwrap_or(DEFAULT_SIZE);
        let track_scores = keys.is_empty()
            || body.get("track_scores").and_then(Value::as_bool).unwrap_or(false);

        let total = matched.len() as u64;
        let hits = matched
            .into_iter()
            .skip(from)
            .take(size)
            .map(|m| EngineHit {
                index: m.index.to_string(),
                id: m.id.to_string(),
                score: track_scores.then_some(m.score),
                source: m.doc.source.clone(),
                sort: if keys.is_empty() {
                    Vec::new()
                } else {
                    m.sort.into_iter().map(|v| v.unwrap_or(Value::Null)).collect()
                },
            })
            .collect();

        let only_candidates: Vec<Candidate<'_>> = candidates.iter().map(|(_, _, c)| *c).collect();
        let suggest = suggestions(body, &only_candidates);

        Ok(EngineResponse {
            took: started.elapsed().as_millis() as u64,
            hits: EngineHits {
                total: HitsTotal { value: total },
                hits,
            },
            suggest,
        })
    }
}
