//! Telemetry Normalizer.
//!
//! Upstream APIs return arbitrarily nested JSON. A catalog entry names the
//! fields worth showing; extraction pulls those keys up to a flat map no
//! matter how deep they sit. One malformed row degrades to an empty map
//! and never fails the table.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::error::{ClientError, Result};
use crate::models::{CatalogEntry, TelemetryRecord};
use crate::sequence::RequestSequence;
use crate::session::SessionManager;

pub type FieldMap = BTreeMap<String, Value>;

pub const NOT_AVAILABLE: &str = "N/A";
pub const DEFAULT_TIMESPAN_MINUTES: u32 = 60;
/// 360 days
pub const MAX_TIMESPAN_MINUTES: u32 = 518_400;

const CURRENT_KEY: &str = "current";
const CURRENT_UNITS_KEY: &str = "current_units";

pub fn parse_raw(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| ClientError::Parse(e.to_string()))
}

/// Parse `raw` and pull out the relevant fields. Parse failures log a
/// warning and yield an empty map.
pub fn extract_relevant_fields(raw: &str, relevant: &[String]) -> FieldMap {
    match parse_raw(raw) {
        Ok(value) => normalize(&value, relevant),
        Err(e) => {
            warn!(error = %e, "malformed telemetry value, row left empty");
            FieldMap::new()
        }
    }
}

/// Extraction over an already parsed payload.
///
/// A top-level `current` object short-circuits into `"<value><unit>"`
/// strings built from `current_units`. Otherwise a depth-first walk copies
/// relevant keys to the top level; object values are descended into rather
/// than copied. When a key occurs at several depths the first one reached
/// wins, and callers must not depend on which that is.
pub fn normalize(value: &Value, relevant: &[String]) -> FieldMap {
    if let Value::Object(root) = value {
        if let Some(Value::Object(current)) = root.get(CURRENT_KEY) {
            let units = match root.get(CURRENT_UNITS_KEY) {
                Some(Value::Object(units)) => Some(units),
                _ => None,
            };
            return with_units(current, units);
        }
    }

    let relevant: HashSet<&str> = relevant.iter().map(String::as_str).collect();
    let mut out = FieldMap::new();
    collect(value, &relevant, &mut out);
    out
}

fn with_units(current: &Map<String, Value>, units: Option<&Map<String, Value>>) -> FieldMap {
    current
        .iter()
        .map(|(key, value)| {
            let unit = units
                .and_then(|u| u.get(key))
                .map(scalar_text)
                .unwrap_or_default();
            (key.clone(), Value::String(format!("{}{}", scalar_text(value), unit)))
        })
        .collect()
}

fn collect(node: &Value, relevant: &HashSet<&str>, out: &mut FieldMap) {
    match node {
        Value::Object(map) => {
            for (key, value) in map {
                match value {
                    Value::Object(_) => collect(value, relevant, out),
                    _ if relevant.contains(key.as_str()) => {
                        out.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                    Value::Array(_) => collect(value, relevant, out),
                    _ => {}
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, relevant, out);
            }
        }
        _ => {}
    }
}

/// Strings without quotes, everything else as JSON text.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn validate_timespan(minutes: i64) -> Result<u32> {
    if minutes < 1 {
        return Err(ClientError::Validation("Timespan must be at least 1 minute.".to_string()));
    }
    if minutes > i64::from(MAX_TIMESPAN_MINUTES) {
        return Err(ClientError::Validation(
            "Timespan must not exceed 518,400 minutes (360 days).".to_string(),
        ));
    }
    Ok(minutes as u32)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub time: DateTime<Utc>,
    pub subscription_id: i64,
    pub fields: FieldMap,
}

impl NormalizedRow {
    pub fn cell(&self, field: &str) -> String {
        self.fields
            .get(field)
            .map(scalar_text)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

pub fn normalize_records(records: &[TelemetryRecord], relevant: &[String]) -> Vec<NormalizedRow> {
    records
        .iter()
        .map(|rec| NormalizedRow {
            time: rec.time,
            subscription_id: rec.subscription_id,
            fields: extract_relevant_fields(&rec.raw_value, relevant),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct TelemetryState {
    pub rows: Vec<NormalizedRow>,
    /// Column order, from the catalog entry's declaration
    pub columns: Vec<String>,
    pub loading: bool,
    pub error: Option<String>,
    pub timespan_minutes: u32,
    pub timespan_error: Option<String>,
}

impl Default for TelemetryState {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            columns: Vec::new(),
            loading: false,
            error: None,
            timespan_minutes: DEFAULT_TIMESPAN_MINUTES,
            timespan_error: None,
        }
    }
}

/// Data view for one subscription at a time. Rows live only as long as the
/// current query.
pub struct TelemetryView {
    api: ApiClient,
    session: Arc<SessionManager>,
    state: Mutex<TelemetryState>,
    sequence: RequestSequence,
}

impl TelemetryView {
    pub fn new(api: ApiClient, session: Arc<SessionManager>) -> Self {
        Self {
            api,
            session,
            state: Mutex::new(TelemetryState::default()),
            sequence: RequestSequence::default(),
        }
    }

    pub fn snapshot(&self) -> TelemetryState {
        self.lock().clone()
    }

    /// Accept a new timespan or record why not; the previous value stays on rejection.
    pub fn set_timespan(&self, minutes: i64) -> Result<u32> {
        let mut state = self.lock();
        match validate_timespan(minutes) {
            Ok(valid) => {
                state.timespan_minutes = valid;
                state.timespan_error = None;
                Ok(valid)
            }
            Err(e) => {
                state.timespan_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Fetch and normalise rows for `subscription_id` over the current timespan.
    pub async fn load(&self, subscription_id: i64, entry: Option<&CatalogEntry>) -> TelemetryState {
        let ticket = self.sequence.issue();
        let timespan = {
            let mut state = self.lock();
            state.loading = true;
            state.error = None;
            state.timespan_minutes
        };

        let Some(entry) = entry else {
            let mut state = self.lock();
            if self.sequence.is_latest(ticket) {
                state.loading = false;
                state.rows.clear();
                state.columns.clear();
                state.error = Some("API not found".to_string());
            }
            return state.clone();
        };

        let result = match self.session.require_token() {
            Ok(token) => self.api.telemetry(&token, subscription_id, timespan).await,
            Err(e) => Err(e),
        };

        let mut state = self.lock();
        if !self.sequence.is_latest(ticket) {
            debug!(ticket, subscription_id, "discarding superseded telemetry response");
            return state.clone();
        }
        state.loading = false;
        match result {
            Ok(records) => {
                state.rows = normalize_records(&records, &entry.relevant_fields);
                state.columns = entry.relevant_fields.clone();
            }
            Err(e) => {
                warn!(subscription_id, error = %e, "telemetry fetch failed");
                state.rows.clear();
                state.columns.clear();
                state.error = Some(e.to_string());
            }
        }
        state.clone()
    }

    fn lock(&self) -> MutexGuard<'_, TelemetryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::storage::MemoryCredentialStore;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_nested_relevant_field_is_lifted() {
        let out = extract_relevant_fields(r#"{"a":1,"nested":{"b":2,"c":3}}"#, &fields(&["b"]));
        assert_eq!(out, FieldMap::from([("b".to_string(), json!(2))]));
    }

    #[test]
    fn test_current_block_pairs_units() {
        let out = extract_relevant_fields(
            r#"{"current":{"temp":20},"current_units":{"temp":"°C"}}"#,
            &fields(&["unrelated"]),
        );
        assert_eq!(out, FieldMap::from([("temp".to_string(), json!("20°C"))]));
    }

    #[test]
    fn test_current_block_missing_unit_is_empty_suffix() {
        let out = normalize(
            &json!({"current": {"temp": 20, "code": "sunny"}, "current_units": {"temp": "°C"}}),
            &[],
        );
        assert_eq!(out["temp"], json!("20°C"));
        assert_eq!(out["code"], json!("sunny"));
    }

    #[test]
    fn test_malformed_json_yields_empty_map() {
        assert!(extract_relevant_fields("{not json", &fields(&["a"])).is_empty());
        assert!(extract_relevant_fields("", &fields(&["a"])).is_empty());
    }

    #[test]
    fn test_absent_fields_are_absent_and_render_na() {
        let out = extract_relevant_fields(r#"{"x":{"y":"hi"}}"#, &fields(&["y", "missing"]));
        assert_eq!(out.len(), 1);
        let row = NormalizedRow {
            time: Utc::now(),
            subscription_id: 1,
            fields: out,
        };
        assert_eq!(row.cell("y"), "hi");
        assert_eq!(row.cell("missing"), NOT_AVAILABLE);
    }

    #[test]
    fn test_object_values_are_descended_not_copied() {
        // "hourly" is relevant but holds an object, so its children are searched instead
        let out = normalize(&json!({"hourly": {"temperature": [1, 2]}}), &fields(&["hourly", "temperature"]));
        assert!(!out.contains_key("hourly"));
        assert_eq!(out["temperature"], json!([1, 2]));
    }

    #[test]
    fn test_objects_inside_arrays_are_walked() {
        let out = normalize(&json!({"items": [{"price": 3}, {"price": 4, "sku": "z"}]}), &fields(&["price", "sku"]));
        assert_eq!(out["price"], json!(3));
        assert_eq!(out["sku"], json!("z"));
    }

    #[test]
    fn test_timespan_bounds() {
        assert_eq!(
            validate_timespan(0).unwrap_err().to_string(),
            "Timespan must be at least 1 minute."
        );
        assert!(validate_timespan(518_401).is_err());
        assert_eq!(validate_timespan(518_400).unwrap(), MAX_TIMESPAN_MINUTES);
    }

    #[tokio::test]
    async fn test_unknown_entry_sets_api_not_found() {
        let api = ApiClient::new(ClientConfig::with_base_url("http://127.0.0.1:9")).unwrap();
        let session = Arc::new(SessionManager::new(Arc::new(MemoryCredentialStore::new())).unwrap());
        let view = TelemetryView::new(api, session);

        assert!(view.set_timespan(0).is_err());
        let state = view.load(5, None).await;
        assert_eq!(state.error.as_deref(), Some("API not found"));
        assert_eq!(state.timespan_minutes, DEFAULT_TIMESPAN_MINUTES);
        assert!(state.timespan_error.is_some());
    }
}
