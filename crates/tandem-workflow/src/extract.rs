use serde_json::Value;
use tandem_domain::{is_falsy, FieldMap};

/// Pull the control payload out of a workflow response.
///
/// Checked locations, in order: `outputs.output`, `outputs.control` when the
/// response carries an `outputs` object, else top-level `control`, then
/// top-level `output`. Falsy candidates are skipped. A non-object payload is
/// wrapped as `{"output": <value>}` so the control command stays a mapping.
pub fn extract_control_output(response: &Value) -> Option<FieldMap> {
    let candidate = match response.get("outputs") {
        Some(Value::Object(outputs)) => {
            pick(outputs.get("output"), outputs.get("control"))
        }
        _ => match response {
            Value::Object(map) => pick(map.get("control"), map.get("output")),
            _ => None,
        },
    };

    candidate.map(|value| match value {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = FieldMap::new();
            map.insert("output".to_string(), other.clone());
            map
        }
    })
}

fn pick<'a>(first: Option<&'a Value>, second: Option<&'a Value>) -> Option<&'a Value> {
    first
        .filter(|value| !is_falsy(value))
        .or_else(|| second.filter(|value| !is_falsy(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected JSON object"),
        }
    }

    #[test]
    fn test_extracts_outputs_output() {
        let response = json!({"outputs": {"output": {"valve": "open"}}});
        assert_eq!(
            extract_control_output(&response),
            Some(map(json!({"valve": "open"})))
        );
    }

    #[test]
    fn test_extracts_outputs_control_when_output_missing() {
        let response = json!({"outputs": {"control": {"valve": "closed"}}});
        assert_eq!(
            extract_control_output(&response),
            Some(map(json!({"valve": "closed"})))
        );
    }

    #[test]
    fn test_outputs_output_takes_precedence() {
        let response = json!({"outputs": {"output": {"a": 1}, "control": {"b": 2}}});
        assert_eq!(extract_control_output(&response), Some(map(json!({"a": 1}))));
    }

    #[test]
    fn test_empty_outputs_object_yields_none_without_top_level_fallback() {
        // An outputs object owns extraction even when it carries nothing.
        let response = json!({"outputs": {}, "control": {"valve": "open"}});
        assert_eq!(extract_control_output(&response), None);
    }

    #[test]
    fn test_top_level_control_then_output() {
        assert_eq!(
            extract_control_output(&json!({"control": {"valve": "open"}})),
            Some(map(json!({"valve": "open"})))
        );
        assert_eq!(
            extract_control_output(&json!({"output": {"valve": "open"}})),
            Some(map(json!({"valve": "open"})))
        );
    }

    #[test]
    fn test_falsy_candidates_are_skipped() {
        let response = json!({"outputs": {"output": {}, "control": {"valve": "open"}}});
        assert_eq!(
            extract_control_output(&response),
            Some(map(json!({"valve": "open"})))
        );
        assert_eq!(extract_control_output(&json!({"output": ""})), None);
    }

    #[test]
    fn test_non_object_payload_is_wrapped() {
        let response = json!({"outputs": {"output": "open the valve"}});
        assert_eq!(
            extract_control_output(&response),
            Some(map(json!({"output": "open the valve"})))
        );
    }

    #[test]
    fn test_non_object_response_yields_none() {
        assert_eq!(extract_control_output(&json!([1, 2, 3])), None);
        assert_eq!(extract_control_output(&json!("plain text")), None);
    }
}
