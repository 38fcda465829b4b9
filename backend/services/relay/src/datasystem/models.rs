use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Body of the `/autenticar` response. Only `token` matters.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
}

/// One page of a DataSystem list endpoint.
///
/// Nothing in the envelope can fail a page. Records stay raw until the
/// per-record step, a `dados` that is not a list is an empty page, and totals
/// of the wrong type fall back to the pagination defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    #[serde(default, deserialize_with = "lenient_records")]
    pub dados: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_registros: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_paginas: Option<u64>,
}

fn lenient_records<'de, D>(deserializer: D) -> Result<Option<Vec<Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(records)) => Some(records),
        _ => None,
    })
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(count_from_value))
}

/// Integers, floats and numeric strings all count; floats are truncated.
fn count_from_value(value: &Value) -> Option<u64> {
    let from_float = |f: f64| (f.is_finite() && f >= 0.0).then(|| f as u64);
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(from_float)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(from_float))
        }
        _ => None,
    }
}

/// A customer record from `/clientes`.
///
/// Fields are kept as raw JSON values so an unexpected type on one record
/// never fails the whole page; absent fields become `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub nome: Value,
    #[serde(default)]
    pub data_cadastro: Value,
    #[serde(default)]
    pub ultima_compra: Value,
    #[serde(default)]
    pub email: Value,
    #[serde(default)]
    pub telefone: Value,
}

/// A product record from `/produtos`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub codigo: Value,
    #[serde(default)]
    pub descricao: Value,
    #[serde(default)]
    pub preco: Value,
    #[serde(default)]
    pub estoque: Value,
    #[serde(default)]
    pub data_ultima_compra: Value,
}

/// Render a record id for logs: strings verbatim, numbers as digits.
pub fn display_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        Value::Null => "<missing>".to_string(),
        other => other.to_string(),
    }
}
