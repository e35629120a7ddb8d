// src/index.rs

//! Repository extraction from catalog index documents.
//!
//! Catalogs come in several shapes and none of them is guaranteed, so four
//! independent strategies run over every document and their findings are
//! unioned:
//!
//! 1. newline-delimited JSON objects, split on brace balance
//! 2. one nested `packages → channels → entries → properties` document
//! 3. generic inspection of whichever objects 1 (or 2) produced
//! 4. a raw-text scan for `"repository": "<url>"`

use crate::error::{AnalyzerError, ErrorKind, Result};
use crate::model::RepositoryRef;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

const CSV_METADATA: &str = "olm.csv.metadata";
const PACKAGE: &str = "olm.package";
const BUNDLE: &str = "olm.bundle";
const RAW_MARKER: &str = "\"repository\":";

pub type RepositorySet = BTreeSet<RepositoryRef>;

#[derive(Debug, Default, Deserialize, Serialize)]
struct Catalog {
    #[serde(default, deserialize_with = "null_as_default")]
    packages: Vec<Package>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Package {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    channels: Vec<Channel>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Channel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    entries: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Entry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repository: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    properties: Vec<Property>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Property {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    kind: String,
    #[serde(default)]
    value: Value,
}

/// Catalog writers emit `null` for empty lists
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Outcome of the line-oriented object scan
struct NdjsonScan {
    objects: Vec<Map<String, Value>>,
    complete: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IndexParser;

impl IndexParser {
    pub fn new() -> Self {
        Self
    }

    /// Read the catalog at `path` and extract every repository it references
    pub fn extract_repositories(&self, path: &Path) -> Result<RepositorySet> {
        if !path.exists() {
            return Err(AnalyzerError::new(ErrorKind::FileSystem, "index file does not exist")
                .with_context("file_path", path.display()));
        }
        let content = std::fs::read(path).map_err(|e| {
            AnalyzerError::new(ErrorKind::FileSystem, "failed to read index file")
                .with_source(e)
                .with_context("file_path", path.display())
        })?;
        self.parse_document(&content)
            .map_err(|e| e.with_context("file_path", path.display()))
    }

    /// Extract repositories from raw catalog bytes
    pub fn parse_document(&self, content: &[u8]) -> Result<RepositorySet> {
        if content.is_empty() {
            return Err(AnalyzerError::new(ErrorKind::Validation, "index file is empty"));
        }
        let text = String::from_utf8_lossy(content);
        let mut found = RepositorySet::new();

        let scan = scan_ndjson(&text);
        debug!(
            "NDJSON scan decoded {} object(s), complete: {}",
            scan.objects.len(),
            scan.complete
        );

        let catalog = serde_json::from_str::<Catalog>(&text).ok();
        if let Some(catalog) = &catalog {
            let before = found.len();
            collect_structured(catalog, &mut found);
            debug!("Structured strategy found {} repositories", found.len() - before);
        }

        let entries = if scan.objects.is_empty() && !scan.complete {
            catalog
                .as_ref()
                .and_then(|c| serde_json::to_value(c).ok())
                .and_then(|v| match v {
                    Value::Object(map) => Some(vec![map]),
                    _ => None,
                })
                .unwrap_or_default()
        } else {
            scan.objects
        };
        let before = found.len();
        for entry in &entries {
            collect_generic(entry, &mut found);
        }
        debug!("Generic strategy found {} new repositories", found.len() - before);

        let before = found.len();
        found.extend(scan_raw_text(&text).filter_map(RepositoryRef::parse));
        debug!("Raw-text strategy found {} new repositories", found.len() - before);

        if found.is_empty() {
            return Err(AnalyzerError::new(ErrorKind::Validation, "no valid repositories found")
                .with_context("file_size", content.len()));
        }
        Ok(found)
    }
}

/// Split `text` into JSON objects by brace balance, one trimmed line at a
/// time. Stops at the first buffer that does not decode to an object.
fn scan_ndjson(text: &str) -> NdjsonScan {
    let mut objects = Vec::new();
    let mut buffer = String::new();
    let mut depth: i64 = 0;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        buffer.push_str(line);
        for c in line.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }
        if depth == 0 {
            match serde_json::from_str::<Value>(&buffer) {
                Ok(Value::Object(map)) => objects.push(map),
                _ => return NdjsonScan { objects, complete: false },
            }
            buffer.clear();
        }
    }

    NdjsonScan {
        objects,
        complete: buffer.is_empty(),
    }
}

fn collect_structured(catalog: &Catalog, found: &mut RepositorySet) {
    let entries = catalog
        .packages
        .iter()
        .flat_map(|p| &p.channels)
        .flat_map(|c| &c.entries);
    for entry in entries {
        if let Some(url) = entry.repository.as_ref().and_then(Value::as_str) {
            admit(url, found);
        }
        for prop in &entry.properties {
            if let Some(url) = property_repository(&prop.kind, &prop.value) {
                admit(url, found);
            }
        }
    }
}

fn collect_generic(entry: &Map<String, Value>, found: &mut RepositorySet) {
    if let Some(Value::String(url)) = entry.get("repository") {
        admit(url, found);
    }
    let Some(Value::Array(properties)) = entry.get("properties") else {
        return;
    };
    for prop in properties {
        let Value::Object(prop) = prop else { continue };
        let (Some(Value::String(kind)), Some(value)) = (prop.get("type"), prop.get("value")) else {
            continue;
        };
        if let Some(url) = property_repository(kind, value) {
            admit(url, found);
        }
    }
}

/// Repository URL carried by a typed catalog property, if any
fn property_repository<'a>(kind: &str, value: &'a Value) -> Option<&'a str> {
    let holder = match kind {
        CSV_METADATA => value.get("annotations")?,
        PACKAGE | BUNDLE => value,
        _ => return None,
    };
    match holder.get("repository")? {
        Value::String(url) => Some(url),
        _ => None,
    }
}

/// Quoted values following every `"repository":` on every line, `http*` only
fn scan_raw_text(text: &str) -> impl Iterator<Item = &str> {
    text.lines().flat_map(|line| {
        let mut rest = line;
        std::iter::from_fn(move || loop {
            rest = &rest[rest.find(RAW_MARKER)? + RAW_MARKER.len()..];
            let quoted = &rest[rest.find('"')? + 1..];
            let value = &quoted[..quoted.find('"')?];
            if value.starts_with("http") {
                return Some(value);
            }
        })
    })
}

fn admit(url: &str, found: &mut RepositorySet) {
    if let Some(repo) = RepositoryRef::parse(url) {
        found.insert(repo);
    }
}
