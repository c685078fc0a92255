//! Import of Doxygen-generated search data.
//!
//! Doxygen writes its search index as `search/<category>_<hex>.js` scripts,
//! each assigning `searchData` a list of
//! `['id', ['Name', ['../page.html#anchor', 1, 'Scope::Name(args)'], ...]]`
//! entries. This module turns those scripts into `RawEntry` values for
//! `IndexBuilder`.

mod lexer;

use std::fs;
use std::path::{Path, PathBuf};

use lexer::{parse_script, JsValue};

use crate::error::BuildError;
use crate::normalize::clean_display;
use crate::shard::SHARD_VARIABLE;
use crate::types::{Location, RawEntry};

/// Parses one search-data script.
pub fn parse_search_data(source: &str) -> Result<Vec<RawEntry>, BuildError> {
    let (name, value) = parse_script(source)?;
    if name != SHARD_VARIABLE {
        return Err(BuildError::Import(format!(
            "expected `var {SHARD_VARIABLE}`, found `var {name}`"
        )));
    }
    let records = value
        .as_array()
        .ok_or_else(|| BuildError::Import(format!("`{SHARD_VARIABLE}` is not a list")))?;

    let mut entries = Vec::new();
    for (index, record) in records.iter().enumerate() {
        import_record(record, &mut entries)
            .map_err(|message| BuildError::Import(format!("record {index}: {message}")))?;
    }
    Ok(entries)
}

/// Reads one search-data file.
pub fn import_file(path: &Path) -> Result<Vec<RawEntry>, BuildError> {
    let source = fs::read_to_string(path)?;
    parse_search_data(&source)
        .map_err(|error| BuildError::Import(format!("{}: {error}", path.display())))
}

/// Reads every `<category>_<hex>.js` file of a Doxygen `search` directory in
/// index order and concatenates their entries.
pub fn import_dir(dir: &Path, category: &str) -> Result<Vec<RawEntry>, BuildError> {
    let mut files: Vec<(u32, PathBuf)> = Vec::new();
    for dir_entry in fs::read_dir(dir)? {
        let path = dir_entry?.path();
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if let Some(index) = search_file_index(file_name, category) {
            files.push((index, path));
        }
    }
    files.sort();

    let mut entries = Vec::new();
    for (_, path) in &files {
        entries.extend(import_file(path)?);
    }

    log::info!(
        "imported doxygen search data dir={} category={} files={} entries={}",
        dir.display(),
        category,
        files.len(),
        entries.len()
    );
    Ok(entries)
}

/// `functions_1a.js` -> `Some(0x1a)` for category `functions`.
fn search_file_index(file_name: &str, category: &str) -> Option<u32> {
    let hex = file_name
        .strip_suffix(".js")?
        .strip_prefix(category)?
        .strip_prefix('_')?;
    u32::from_str_radix(hex, 16).ok()
}

fn import_record(record: &JsValue, entries: &mut Vec<RawEntry>) -> Result<(), String> {
    const SHAPE: &str = "expected ['id', ['Name', [url, flag, scope], ...]]";

    let [_id, symbol] = record.as_array().ok_or(SHAPE)? else {
        return Err(SHAPE.to_string());
    };
    let (name, locations) = symbol
        .as_array()
        .and_then(<[JsValue]>::split_first)
        .ok_or(SHAPE)?;
    let name = name.as_str().ok_or("symbol name is not a string")?;
    if locations.is_empty() {
        return Err(format!("symbol {name:?} has no locations"));
    }

    for (index, location) in locations.iter().enumerate() {
        let entry = import_location(name, location)
            .map_err(|message| format!("location {index} of {name:?}: {message}"))?;
        entries.push(entry);
    }
    Ok(())
}

fn import_location(name: &str, location: &JsValue) -> Result<RawEntry, String> {
    let parts = location.as_array().ok_or("expected [url, flag, scope]")?;
    let url = parts
        .first()
        .and_then(JsValue::as_str)
        .ok_or("url is not a string")?;
    let scope = parts.get(2).and_then(JsValue::as_str).unwrap_or("");

    let (page, fragment) = url.split_once('#').unwrap_or((url, ""));
    let page = page.strip_prefix("../").unwrap_or(page);
    let (display_name, disambiguator) = split_scope(name, &clean_display(scope));

    let mut location = Location::new(page, fragment);
    if let Some(disambiguator) = disambiguator {
        location = location.with_disambiguator(disambiguator);
    }
    Ok(RawEntry::new(name, display_name, location))
}

/// Splits a Doxygen scope into the qualified display name and the signature
/// tail that tells overloads apart.
fn split_scope(name: &str, scope: &str) -> (String, Option<String>) {
    if scope.is_empty() {
        return (name.to_string(), None);
    }

    if let Some(open) = signature_start(name, scope) {
        let qualified = scope[..open].trim();
        let signature = scope[open..].trim();
        let display = if qualified.is_empty() { name } else { qualified };
        let signature = (!signature.is_empty()).then(|| signature.to_string());
        return (display.to_string(), signature);
    }

    let qualified = if scope == name || scope.ends_with(&format!("::{name}")) {
        scope.to_string()
    } else {
        format!("{scope}::{name}")
    };
    (qualified, None)
}

/// Byte offset of the `(` opening the argument list, skipping parentheses
/// that belong to the name itself (`operator()`).
fn signature_start(name: &str, scope: &str) -> Option<usize> {
    let called = format!("{name}(");
    match scope.rfind(called.as_str()) {
        Some(position) => Some(position + name.len()),
        None => scope.find('('),
    }
}
