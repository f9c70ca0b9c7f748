//! Record extraction from upstream responses
//!
//! Records are kept schema-agnostic. The only fields the crawler looks at are
//! the two identifiers needed to build detail-pass units. The only fields it
//! adds are provenance stamps: the source date on list-pass records and the
//! identifier key on detail-pass records.

use crate::crawler::fetcher::{Endpoint, FetchClient, FetchError};
use crate::state::{DateKey, DetailKey};
use serde_json::{Map, Value};

/// One opaque upstream document
pub type Record = Map<String, Value>;

/// Field stamped on every list-pass record with its `YYYYMMDD` source date
pub const SOURCE_DATE_FIELD: &str = "_download_date";

/// Field stamped on every detail-pass record with its `unit_id_job_number` key
pub const DETAIL_KEY_FIELD: &str = "_detail_key";

const UNIT_ID_FIELD: &str = "unit_id";
const JOB_NUMBER_FIELD: &str = "job_number";

/// Pulls the record list out of a list or search response
///
/// The API answers `{"records": [...]}` when there is data and `{}` (or
/// occasionally `null`/`[]`) when there is none. Non-object entries are
/// dropped.
pub fn extract_records(endpoint: Endpoint, response: Value) -> Result<Vec<Record>, FetchError> {
    let items = match response {
        Value::Object(mut envelope) => match envelope.remove("records") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(FetchError::Decode {
                    endpoint,
                    message: format!("expected a records array, got {}", type_name(&other)),
                })
            }
        },
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => {
            return Err(FetchError::Decode {
                endpoint,
                message: format!("expected an object, got {}", type_name(&other)),
            })
        }
    };

    let total = items.len();
    let records: Vec<Record> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(record) => Some(record),
            _ => None,
        })
        .collect();

    if records.len() < total {
        tracing::warn!(
            "{}: dropped {} non-object entries",
            endpoint,
            total - records.len()
        );
    }

    Ok(records)
}

/// Tags a list-pass record with the date it was listed under
pub fn stamp_source_date(record: &mut Record, date: &DateKey) {
    record.insert(
        SOURCE_DATE_FIELD.to_string(),
        Value::String(date.to_string()),
    );
}

/// Tags a detail-pass record with the identifier pair it was fetched for
pub fn stamp_detail_key(record: &mut Record, key: &DetailKey) {
    record.insert(DETAIL_KEY_FIELD.to_string(), Value::String(key.key()));
}

/// The detail-pass unit referenced by a record, if both identifiers are present
pub fn detail_key(record: &Record) -> Option<DetailKey> {
    let unit_id = identifier(record.get(UNIT_ID_FIELD)?)?;
    let job_number = identifier(record.get(JOB_NUMBER_FIELD)?)?;
    Some(DetailKey::new(unit_id, job_number))
}

/// Checkpoint key of an already-written detail record
///
/// Prefers the stamp added at fetch time and falls back to the record's own
/// identifier fields.
pub fn fetched_key(record: &Record) -> Option<String> {
    match record.get(DETAIL_KEY_FIELD) {
        Some(Value::String(key)) if !key.is_empty() => Some(key.clone()),
        _ => detail_key(record).map(|key| key.key()),
    }
}

/// A non-empty string or number, as a string
fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Fetches every notice listed under one date
pub async fn list_by_date(client: &FetchClient, date: &DateKey) -> Result<Vec<Record>, FetchError> {
    let key = date.to_string();
    let response = client
        .fetch(Endpoint::ListByDate, &[("date", key.as_str())])
        .await?;
    extract_records(Endpoint::ListByDate, response)
}

/// Fetches one tender's detail document
///
/// Returns `None` when the API answers with `null` or an empty object.
pub async fn tender_detail(
    client: &FetchClient,
    key: &DetailKey,
) -> Result<Option<Record>, FetchError> {
    let response = client
        .fetch(
            Endpoint::Tender,
            &[
                ("unit_id", key.unit_id.as_str()),
                ("job_number", key.job_number.as_str()),
            ],
        )
        .await?;

    match response {
        Value::Object(document) if !document.is_empty() => Ok(Some(document)),
        Value::Object(_) | Value::Null => Ok(None),
        other => Err(FetchError::Decode {
            endpoint: Endpoint::Tender,
            message: format!("expected an object, got {}", type_name(&other)),
        }),
    }
}
