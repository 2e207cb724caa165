use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ParseError;
use crate::models::{BulkRecord, DEFAULT_PRIORITY_ID, DEFAULT_STATUS_ID, DEFAULT_TRACKER_ID};

/// Turn pasted bulk input into records for `project_id`.
///
/// Input that is a JSON list or object is structured input and must be a list of record objects.
/// Anything else, including bare JSON scalars, is read as comma-separated rows of
/// `subject, description, tracker_id, status_id, priority_id`. Any project id in the input is
/// replaced. One bad record rejects the whole input.
pub fn parse_bulk_input(raw: &str, project_id: i64) -> Result<Vec<BulkRecord>, ParseError> {
    let records = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => {
            debug!(count = items.len(), "bulk input read as JSON");
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(object) => record_from_object(i + 1, object, project_id),
                    _ => Err(ParseError::invalid(i + 1, "record must be a JSON object")),
                })
                .collect::<Result<Vec<_>, _>>()?
        }
        Ok(Value::Object(_)) => return Err(ParseError::NotAList),
        Ok(_) => parse_rows(raw, project_id)?,
        Err(err) => {
            debug!(error = %err, "bulk input is not JSON, reading rows");
            parse_rows(raw, project_id)?
        }
    };

    if records.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(records)
}

fn record_from_object(
    position: usize,
    mut object: Map<String, Value>,
    project_id: i64,
) -> Result<BulkRecord, ParseError> {
    let subject = match object.remove("subject") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::String(_)) | Some(Value::Null) | None => {
            return Err(ParseError::invalid(position, "subject is required"));
        }
        Some(_) => return Err(ParseError::invalid(position, "subject must be text")),
    };

    let description = match object.remove("description") {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let tracker_id = take_id(&mut object, "tracker_id", DEFAULT_TRACKER_ID, position)?;
    let status_id = take_id(&mut object, "status_id", DEFAULT_STATUS_ID, position)?;
    let priority_id = take_id(&mut object, "priority_id", DEFAULT_PRIORITY_ID, position)?;
    object.remove("project_id");

    Ok(BulkRecord {
        subject,
        description,
        tracker_id,
        status_id,
        priority_id,
        project_id,
        extra: object,
    })
}

fn take_id(
    object: &mut Map<String, Value>,
    key: &str,
    default: i64,
    position: usize,
) -> Result<i64, ParseError> {
    match object.remove(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| ParseError::invalid(position, format!("{} must be a whole number", key))),
        Some(Value::String(s)) => parse_id(&s, key, default, position),
        Some(_) => Err(ParseError::invalid(
            position,
            format!("{} must be a whole number", key),
        )),
    }
}

fn parse_id(field: &str, key: &str, default: i64, position: usize) -> Result<i64, ParseError> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(default);
    }
    field.parse().map_err(|_| {
        ParseError::invalid(
            position,
            format!("{} must be a whole number, got '{}'", key, field),
        )
    })
}

fn parse_rows(raw: &str, project_id: i64) -> Result<Vec<BulkRecord>, ParseError> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            let position = i + 1;
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let field = |n: usize| fields.get(n).copied().unwrap_or("");

            let subject = field(0);
            if subject.is_empty() {
                return Err(ParseError::invalid(position, "subject is required"));
            }

            Ok(BulkRecord {
                subject: subject.to_string(),
                description: field(1).to_string(),
                tracker_id: parse_id(field(2), "tracker_id", DEFAULT_TRACKER_ID, position)?,
                status_id: parse_id(field(3), "status_id", DEFAULT_STATUS_ID, position)?,
                priority_id: parse_id(field(4), "priority_id", DEFAULT_PRIORITY_ID, position)?,
                project_id,
                extra: Map::new(),
            })
        })
        .collect()
}
