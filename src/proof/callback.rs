use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::DataType;

/// Placeholder provider when the callback context names none
pub const UNKNOWN_PROVIDER: &str = "unknown";

/// A verified proof waiting for its owner to pick it up
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingProof {
    pub proof_id: String,
    pub provider: String,
    pub data_type: Option<DataType>,
    pub wallet_address: Option<String>,
    /// Extracted claim parameters, or `{ "rawProof": ... }` when none were found
    pub attributes: Value,
    pub received_at: DateTime<Utc>,
}

/// Session context the client attached when it started the proof request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionContext {
    wallet_address: Option<String>,
    provider: Option<String>,
    data_type: Option<String>,
}

/// Decode a raw callback body. Proof services post either JSON or a
/// URL-encoded JSON string.
pub fn decode_callback_body(body: &[u8]) -> Option<Value> {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        return Some(value);
    }

    let (key, value) = url::form_urlencoded::parse(body).next()?;
    let candidate = if value.is_empty() { key } else { value };
    serde_json::from_str(&candidate).ok()
}

/// Objects may arrive JSON-encoded inside a string
fn as_object(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| v.as_object().cloned()),
        _ => None,
    }
}

/// Split a callback body into the proof object and its session context
fn locate_proof(body: &Value) -> Option<(&Value, Option<&Value>)> {
    let map = body.as_object().filter(|map| !map.is_empty())?;

    if let Some(first) = map
        .get("proofs")
        .and_then(Value::as_array)
        .and_then(|proofs| proofs.first())
    {
        return Some((first, map.get("context")));
    }

    if let Some(proof) = map.get("proof").filter(|p| !p.is_null()) {
        return Some((proof, map.get("context")));
    }

    if map.contains_key("claimData") {
        return Some((body, map.get("context")));
    }

    Some((body, map.get("context").or_else(|| map.get("sessionData"))))
}

fn extract_attributes(proof: &Value) -> Value {
    let mut attributes = Map::new();

    if let Some(context) = proof
        .get("claimData")
        .and_then(|claim| claim.get("context"))
        .and_then(as_object)
    {
        if let Some(params) = context.get("extractedParameters").and_then(Value::as_object) {
            attributes.extend(params.clone());
        }
    }

    if let Some(values) = proof.get("extractedParameterValues").and_then(Value::as_object) {
        attributes.extend(values.clone());
    }

    if attributes.is_empty() {
        attributes.insert("rawProof".to_string(), proof.clone());
    }

    Value::Object(attributes)
}

/// Build a [`PendingProof`] from any of the accepted callback layouts
pub fn parse_callback(body: &Value, now: DateTime<Utc>) -> Result<PendingProof, String> {
    let (proof, context) = locate_proof(body).ok_or_else(|| "No proofs provided".to_string())?;

    let session: SessionContext = context
        .and_then(as_object)
        .and_then(|map| serde_json::from_value(Value::Object(map)).ok())
        .unwrap_or_default();

    let proof_id = proof
        .get("identifier")
        .or_else(|| proof.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("proof_{}", now.timestamp_millis()));

    let provider = session
        .provider
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| UNKNOWN_PROVIDER.to_string());

    let data_type = session
        .data_type
        .and_then(|dt| dt.parse::<DataType>().ok())
        .or_else(|| DataType::from_provider(&provider));

    Ok(PendingProof {
        proof_id,
        provider,
        data_type,
        wallet_address: session.wallet_address.map(|w| w.trim().to_lowercase()),
        attributes: extract_attributes(proof),
        received_at: now,
    })
}
