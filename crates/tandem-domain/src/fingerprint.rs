use crate::error::{DomainError, DomainResult};
use crate::types::FieldMap;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Deduplication key: hex of the first 16 bytes of a SHA-256 digest over
/// canonicalized JSON.
pub type Fingerprint = String;

/// Fingerprint a (sensor, control) pair, or a sensor reading alone.
///
/// Canonicalization sorts object keys recursively, so equal logical content
/// yields equal fingerprints regardless of field-insertion order. If the
/// pair cannot be canonicalized, the control command alone is fingerprinted
/// instead; if that also fails the error is surfaced to the caller rather
/// than collapsing to a shared zero value.
pub fn fingerprint(sensor: &FieldMap, control: Option<&FieldMap>) -> DomainResult<Fingerprint> {
    let mut combined = serde_json::Map::new();
    combined.insert("sensor".to_string(), Value::Object(sensor.clone()));
    if let Some(control) = control {
        combined.insert("control".to_string(), Value::Object(control.clone()));
    }

    match canonical_json(&Value::Object(combined)) {
        Ok(canonical) => Ok(digest(&canonical)),
        Err(pair_err) => {
            let control = control
                .ok_or_else(|| DomainError::Fingerprint(pair_err.clone()))?;
            let canonical = canonical_json(&Value::Object(control.clone()))
                .map_err(DomainError::Fingerprint)?;
            Ok(digest(&canonical))
        }
    }
}

fn digest(canonical: &str) -> Fingerprint {
    let hash = Sha256::digest(canonical.as_bytes());
    hex::encode(&hash[..16])
}

/// Serialize with recursively sorted object keys, independent of the map
/// ordering the JSON library happens to use.
fn canonical_json(value: &Value) -> Result<String, String> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), String> {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<(&String, &Value)> = map.iter().collect();
            pairs.sort_by_key(|(key, _)| key.as_str());
            out.push('{');
            for (i, (key, item)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serialize_scalar(&Value::String((*key).clone()))?);
                out.push(':');
                write_canonical(item, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serialize_scalar(scalar)?),
    }
    Ok(())
}

fn serialize_scalar(value: &Value) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| e.to_string())
}
