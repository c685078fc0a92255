//! Shard payload encoding and defensive decoding.
//!
//! Payload layout:
//!
//! ```text
//! var searchData=
//! [
//!   ["channelize",["Loris::Channelizer::channelize",[["a00008.html","ac5e","(Partial &partial) const"],...]]],
//!   ...
//! ];
//! ```
//!
//! A location's third element (the disambiguator) is only written when the
//! record has more than one location.

use serde_json::Value;

use super::Shard;
use crate::bucket::{BucketId, BucketTable};
use crate::error::{BuildError, LoadError, PartialParseError};
use crate::normalize::is_normalized_key;
use crate::types::{Location, SymbolRecord};

/// Name of the top-level list in every shard payload.
pub const SHARD_VARIABLE: &str = "searchData";

/// A decoded shard plus the records that had to be skipped.
#[derive(Debug)]
pub struct DecodedShard {
    pub shard: Shard,
    pub skipped: Vec<PartialParseError>,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

pub fn encode_shard(shard: &Shard) -> Result<String, BuildError> {
    let mut out = String::with_capacity(96 * shard.len() + 32);
    out.push_str("var ");
    out.push_str(SHARD_VARIABLE);
    out.push_str("=\n[\n");

    for (index, record) in shard.records().iter().enumerate() {
        if index > 0 {
            out.push_str(",\n");
        }
        out.push_str("  ");
        let encoded = serde_json::to_string(&wire_record(record)).map_err(|error| {
            BuildError::Serialization(format!(
                "failed to encode record {} in bucket {}: {error}",
                record.key,
                shard.bucket()
            ))
        })?;
        out.push_str(&encoded);
    }

    out.push_str("\n];\n");
    Ok(out)
}

type WireRecord<'a> = (&'a str, (&'a str, Vec<Vec<&'a str>>));

fn wire_record(record: &SymbolRecord) -> WireRecord<'_> {
    let overloaded = record.locations.len() > 1;
    let locations = record
        .locations
        .iter()
        .map(|location| {
            let mut parts = vec![location.page_ref.as_str(), location.fragment.as_str()];
            if overloaded {
                if let Some(disambiguator) = location
                    .disambiguator
                    .as_deref()
                    .filter(|value| !value.is_empty())
                {
                    parts.push(disambiguator);
                }
            }
            parts
        })
        .collect();
    (
        record.key.as_str(),
        (record.display_name.as_str(), locations),
    )
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decodes a shard payload.
///
/// A missing header or a body that is not a list fails the whole shard. A
/// record that is malformed, not normalized, or that belongs to another
/// bucket is skipped and reported in `skipped`.
pub fn decode_shard(
    table: &BucketTable,
    bucket: &BucketId,
    payload: &str,
) -> Result<DecodedShard, LoadError> {
    let target = bucket.file_name();
    let body = strip_envelope(payload).ok_or_else(|| {
        LoadError::malformed(&target, format!("missing `var {SHARD_VARIABLE}=` header"))
    })?;
    let entries: Vec<Value> = serde_json::from_str(body)
        .map_err(|error| LoadError::malformed(&target, error.to_string()))?;

    let mut records = Vec::with_capacity(entries.len());
    let mut skipped = Vec::new();
    for (index, entry) in entries.into_iter().enumerate() {
        let checked = decode_record(entry).and_then(|record| {
            if !is_normalized_key(&record.key) {
                return Err(format!("key {:?} is not normalized", record.key));
            }
            let owner = table.bucket(&record.key);
            if &owner != bucket {
                return Err(format!("key {:?} belongs to bucket {owner}", record.key));
            }
            Ok(record)
        });
        match checked {
            Ok(record) => records.push(record),
            Err(message) => skipped.push(PartialParseError {
                record: index,
                message,
            }),
        }
    }

    for error in &skipped {
        log::warn!("skipping shard record bucket={bucket} {error}");
    }

    Ok(DecodedShard {
        shard: Shard::new(bucket.clone(), records),
        skipped,
    })
}

fn strip_envelope(payload: &str) -> Option<&str> {
    let rest = payload.trim_start().strip_prefix("var")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start().strip_prefix(SHARD_VARIABLE)?;
    let rest = rest.trim_start().strip_prefix('=')?.trim();
    Some(rest.strip_suffix(';').unwrap_or(rest))
}

fn decode_record(value: Value) -> Result<SymbolRecord, String> {
    const SHAPE: &str = "expected [key, [displayName, [locations]]]";

    let Value::Array(parts) = value else {
        return Err(SHAPE.to_string());
    };
    let [key, symbol]: [Value; 2] = parts.try_into().map_err(|_| SHAPE.to_string())?;
    let Value::String(key) = key else {
        return Err("key is not a string".to_string());
    };
    let Value::Array(symbol) = symbol else {
        return Err(SHAPE.to_string());
    };
    let [display_name, locations]: [Value; 2] =
        symbol.try_into().map_err(|_| SHAPE.to_string())?;
    let Value::String(display_name) = display_name else {
        return Err("display name is not a string".to_string());
    };
    if display_name.is_empty() {
        return Err("display name is empty".to_string());
    }
    let Value::Array(locations) = locations else {
        return Err("locations is not a list".to_string());
    };
    if locations.is_empty() {
        return Err("record has no locations".to_string());
    }

    let locations = locations
        .into_iter()
        .enumerate()
        .map(|(index, location)| {
            decode_location(location).map_err(|message| format!("location {index}: {message}"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SymbolRecord {
        key,
        display_name,
        locations,
    })
}

fn decode_location(value: Value) -> Result<Location, String> {
    let Value::Array(parts) = value else {
        return Err("expected [pageRef, fragment, disambiguator?]".to_string());
    };
    if !(2..=3).contains(&parts.len()) {
        return Err(format!("expected 2 or 3 elements, found {}", parts.len()));
    }

    let mut parts = parts.into_iter();
    let page_ref = match parts.next() {
        Some(Value::String(page_ref)) if !page_ref.is_empty() => page_ref,
        _ => return Err("page reference is missing".to_string()),
    };
    let fragment = match parts.next() {
        Some(Value::String(fragment)) => fragment,
        _ => return Err("fragment is not a string".to_string()),
    };
    let disambiguator = match parts.next() {
        None | Some(Value::Null) => None,
        Some(Value::String(value)) if value.is_empty() => None,
        Some(Value::String(value)) => Some(value),
        Some(_) => return Err("disambiguator is not a string".to_string()),
    };

    Ok(Location {
        page_ref,
        fragment,
        disambiguator,
    })
}
