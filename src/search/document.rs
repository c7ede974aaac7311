//! Search document structures and record mapping

use crate::records::{Coordinates, Record};
use crate::search::config::{RecordClass, ID_FIELD, KIND_FIELD};
use crate::search::error::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// The serialized form of one record
#[derive(Debug, Clone, PartialEq)]
pub struct SearchDocument {
    /// Document id (the record id)
    pub id: String,

    /// Resolved kind for type-hierarchy classes
    pub kind: Option<String>,

    /// Field name -> value; geo fields hold `[latitude, longitude]` or null
    pub fields: Map<String, Value>,

    location_fields: Vec<String>,
}

impl SearchDocument {
    /// Body sent to the engine.
    ///
    /// Geo arrays are written in the engine's `[lon, lat]` order.
    pub fn source(&self) -> Value {
        let mut source = self.fields.clone();
        for field in &self.location_fields {
            if let Some(Value::Array(pair)) = source.get_mut(field) {
                pair.reverse();
            }
        }
        Value::Object(source)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Converts records into search documents
pub struct DocumentMapper;

impl DocumentMapper {
    /// Build the document for `record`.
    ///
    /// Pure function of the record state and the class configuration.
    pub fn to_document<R: Record + ?Sized>(record: &R, class: &RecordClass) -> SearchResult<SearchDocument> {
        let config = class.config();
        let id = record.id();
        if id.is_empty() {
            return Err(SearchError::mapping(id, "record id is empty"));
        }

        let mut fields = record.attributes();
        fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        let kind = if class.has_hierarchy() {
            let kind = class.resolve_kind(record.kind()).ok_or_else(|| {
                SearchError::mapping(
                    &id,
                    format!(
                        "kind '{}' is not declared for class '{}'",
                        record.kind().unwrap_or_default(),
                        class.name()
                    ),
                )
            })?;
            fields.insert(KIND_FIELD.to_string(), Value::String(kind.to_string()));
            Some(kind.to_string())
        } else {
            None
        };

        if let Some(ref field) = config.conversions {
            let payload = record
                .conversions()
                .map(conversions_payload)
                .unwrap_or(Value::Null);
            fields.insert(field.clone(), payload);
        }

        if let Some(ref field) = config.personalize {
            let payload = record
                .personalization_actors()
                .map(|actors| json!(actors))
                .unwrap_or(Value::Null);
            fields.insert(field.clone(), payload);
        }

        for field in &config.locations {
            let coordinates = match record.location(field) {
                Some(coordinates) => Some(coordinates),
                None => fields.get(field).and_then(coordinates_from_attribute),
            };
            let packed = match coordinates {
                Some(coordinates) => pack_coordinates(&id, field, &coordinates)?,
                None => Value::Null,
            };
            fields.insert(field.clone(), packed);
        }

        Ok(SearchDocument {
            id,
            kind,
            fields,
            location_fields: config.locations.clone(),
        })
    }
}

/// `{term: count}` -> `[{query, count}]`, terms lower-cased and merged
fn conversions_payload(conversions: BTreeMap<String, u64>) -> Value {
    let mut merged: BTreeMap<String, u64> = BTreeMap::new();
    for (term, count) in conversions {
        let total = merged.entry(term.trim().to_lowercase()).or_default();
        *total = total.saturating_add(count);
    }
    Value::Array(
        merged
            .into_iter()
            .map(|(query, count)| json!({ "query": query, "count": count }))
            .collect(),
    )
}

/// Geo data supplied as a plain attribute: `[lat, lon]` or `{lat, lon}`
fn coordinates_from_attribute(value: &Value) -> Option<Coordinates> {
    match value {
        Value::Array(pair) if pair.len() == 2 => Some(Coordinates {
            latitude: Some(pair[0].clone()),
            longitude: Some(pair[1].clone()),
        }),
        Value::Object(_) => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}

fn pack_coordinates(id: &str, field: &str, coordinates: &Coordinates) -> SearchResult<Value> {
    let lat = coerce_degrees(id, field, "latitude", coordinates.latitude.as_ref(), 90.0)?;
    let lon = coerce_degrees(id, field, "longitude", coordinates.longitude.as_ref(), 180.0)?;
    Ok(match (lat, lon) {
        (Some(lat), Some(lon)) => json!([lat, lon]),
        _ => Value::Null,
    })
}

fn coerce_degrees(
    id: &str,
    field: &str,
    axis: &str,
    value: Option<&Value>,
    limit: f64,
) -> SearchResult<Option<f64>> {
    let degrees = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        // decimal columns usually arrive as strings
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match degrees {
        Some(d) if d.is_finite() && d.abs() <= limit => Ok(Some(d)),
        Some(d) => Err(SearchError::mapping(
            id,
            format!("{} of '{}' out of range: {}", axis, field, d),
        )),
        None => Err(SearchError::mapping(
            id,
            format!(
                "{} of '{}' is not numeric: {}",
                axis,
                field,
                value.map(Value::to_string).unwrap_or_default()
            ),
        )),
    }
}
