//! Configuration document parsing
//!
//! A document is decoded in three steps:
//! - gzip payloads are decompressed
//! - the encoding is sniffed from content (files may carry no extension)
//! - YAML and JSON both decode into one intermediate tree, which then decodes
//!   into [`CanonicalConfig`]
//!
//! Going through a single tree means a YAML document and an equivalent JSON
//! document cannot diverge: the schema mapping only ever sees one input type.

pub mod role;

pub use role::Role;

use crate::config::{CanonicalConfig, NetworkConfig};
use crate::error::ParseError;
use crate::source::RawConfigFile;
use flate2::read::GzDecoder;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::io::Read;
use tracing::debug;

/// Keys that mark a network-config file written without a `network:` wrapper
const BARE_NETWORK_KEYS: &[&str] = &["version", "config", "nameservers"];

const UTF8_BOM: &[u8] = &[0xef, 0xbb, 0xbf];

/// Text encoding a document was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Yaml,
    Json,
}

impl Encoding {
    /// Guess the encoding from the first significant character
    pub fn sniff(data: &[u8]) -> Self {
        let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
        match data.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') | Some(b'[') => Encoding::Json,
            _ => Encoding::Yaml,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Yaml => write!(f, "yaml"),
            Encoding::Json => write!(f, "json"),
        }
    }
}

/// A successfully parsed configuration document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// File the document was read from
    pub file: String,
    pub role: Role,
    pub encoding: Encoding,
    pub config: CanonicalConfig,
}

/// Parse a raw file in the given role
pub fn parse(file: &RawConfigFile, role: Role) -> Result<Document, ParseError> {
    let name = file.name.as_str();

    let data = decompress_if_needed(&file.contents).map_err(|e| ParseError::malformed(name, e))?;
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(&data);

    if data.starts_with(b"#!") {
        return Err(ParseError::schema(
            name,
            "executable scripts are not supported",
        ));
    }

    let (tree, encoding) = decode_tree(data).map_err(|e| ParseError::malformed(name, e))?;
    debug!("Decoded {} as {}", name, encoding);

    let mut config = into_config(tree, role).map_err(|e| ParseError::schema(name, e))?;
    config.fold_public_keys();

    Ok(Document {
        file: file.name.clone(),
        role,
        encoding,
        config,
    })
}

/// Decompress gzip data if needed
fn decompress_if_needed(data: &[u8]) -> Result<Vec<u8>, String> {
    // Check for gzip magic bytes
    if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
        debug!("Decompressing gzip document");
        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| format!("gzip decompression failed: {}", e))?;
        Ok(decompressed)
    } else {
        Ok(data.to_vec())
    }
}

/// Decode bytes into a syntax tree, choosing the encoding from content
fn decode_tree(data: &[u8]) -> Result<(Value, Encoding), String> {
    if is_blank(data) {
        return Ok((Value::Null, Encoding::sniff(data)));
    }

    match Encoding::sniff(data) {
        Encoding::Json => match serde_json::from_slice::<Value>(data) {
            Ok(tree) => Ok((tree, Encoding::Json)),
            Err(json_err) => {
                // Flow-style YAML also starts with `{` or `[`
                debug!("Not valid JSON ({}), retrying as YAML", json_err);
                serde_yaml::from_slice::<Value>(data)
                    .map(|tree| (tree, Encoding::Yaml))
                    .map_err(|_| json_err.to_string())
            }
        },
        Encoding::Yaml => serde_yaml::from_slice::<Value>(data)
            .map(|tree| (tree, Encoding::Yaml))
            .map_err(|e| e.to_string()),
    }
}

/// True for documents holding nothing but whitespace and `#` comments
fn is_blank(data: &[u8]) -> bool {
    match std::str::from_utf8(data) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .all(|line| line.is_empty() || line.starts_with('#')),
        Err(_) => false,
    }
}

/// Map a syntax tree onto the canonical schema
fn into_config(tree: Value, role: Role) -> Result<CanonicalConfig, String> {
    let map = match tree {
        Value::Null => return Ok(CanonicalConfig::default()),
        Value::Object(map) => map,
        other => {
            return Err(format!(
                "expected a mapping at the top level, found {}",
                value_kind(&other)
            ));
        }
    };

    if role == Role::NetworkConfig && is_bare_network(&map) {
        debug!("Reading top-level keys as a network section");
        let network: NetworkConfig =
            serde_json::from_value(Value::Object(map)).map_err(|e| e.to_string())?;
        return Ok(CanonicalConfig {
            network: Some(network),
            ..Default::default()
        });
    }

    serde_json::from_value(Value::Object(map)).map_err(|e| e.to_string())
}

fn is_bare_network(map: &Map<String, Value>) -> bool {
    !map.contains_key("network") && BARE_NETWORK_KEYS.iter().any(|k| map.contains_key(*k))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
