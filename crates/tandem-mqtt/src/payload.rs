use serde_json::Value;
use tandem_domain::FieldMap;

/// Decode a bus payload into a field map.
///
/// Malformed or non-object payloads are wrapped as `{"raw": <text>}` rather
/// than dropped; downstream consumers treat the wrapper like any other
/// reading or command.
pub fn decode_payload(payload: &[u8]) -> FieldMap {
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(payload) {
        return map;
    }

    let text = String::from_utf8_lossy(payload).into_owned();
    let mut map = FieldMap::new();
    map.insert("raw".to_string(), Value::String(text));
    map
}
