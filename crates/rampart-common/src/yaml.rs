//! YAML snapshot parsing
//!
//! Resource snapshots arrive as multi-document YAML (the same shape `kubectl get -o yaml`
//! produces when concatenated with `---`). yaml-rust2 does the parsing; each document is
//! lowered into a `serde_json::Value` so the typed resources can be decoded with serde.

use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

/// Error raised when a YAML document cannot be parsed or lowered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YamlError(String);

impl std::fmt::Display for YamlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "yaml: {}", self.0)
    }
}

impl std::error::Error for YamlError {}

/// Parse every document in `input`.
///
/// Empty documents (a bare `---` or trailing separator) are dropped.
pub fn parse_yaml_documents(input: &str) -> Result<Vec<Value>, YamlError> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| YamlError(e.to_string()))?;
    let mut values = Vec::with_capacity(docs.len());
    for doc in docs {
        match lower(doc)? {
            Value::Null => {}
            value => values.push(value),
        }
    }
    Ok(values)
}

/// Parse a single YAML document, returning `Value::Null` for empty input
pub fn parse_yaml_document(input: &str) -> Result<Value, YamlError> {
    Ok(parse_yaml_documents(input)?
        .into_iter()
        .next()
        .unwrap_or(Value::Null))
}

fn lower(yaml: Yaml) -> Result<Value, YamlError> {
    Ok(match yaml {
        Yaml::Null => Value::Null,
        Yaml::Boolean(b) => Value::Bool(b),
        Yaml::Integer(i) => Value::Number(i.into()),
        Yaml::Real(raw) => {
            let f: f64 = raw
                .parse()
                .map_err(|_| YamlError(format!("invalid float {raw}")))?;
            Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Array(items) => Value::Array(
            items
                .into_iter()
                .map(lower)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Yaml::Hash(hash) => {
            let mut map = Map::with_capacity(hash.len());
            for (key, value) in hash {
                map.insert(key_string(key)?, lower(value)?);
            }
            Value::Object(map)
        }
        Yaml::Alias(_) => return Err(YamlError("aliases are not supported".to_string())),
        Yaml::BadValue => return Err(YamlError("bad value".to_string())),
    })
}

fn key_string(key: Yaml) -> Result<String, YamlError> {
    match key {
        Yaml::String(s) | Yaml::Real(s) => Ok(s),
        Yaml::Integer(i) => Ok(i.to_string()),
        Yaml::Boolean(b) => Ok(b.to_string()),
        Yaml::Null => Ok("null".to_string()),
        other => Err(YamlError(format!("unsupported mapping key {other:?}"))),
    }
}
