use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque field map carried by sensor readings and control commands.
/// Payloads have no fixed schema; whatever the device or workflow sends is
/// kept as-is.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// Empty/zero/blank values, as judged when deciding whether a payload
/// carries any usable content.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Where a logged (sensor, control) pair came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    /// The decision workflow returned the control command.
    Workflow,
    /// The control command arrived on the bus.
    Mqtt,
}

/// One committed correlation. Immutable once appended; removed only by
/// retention pruning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 timestamp with timezone offset.
    pub timestamp: String,
    pub sensor_data: FieldMap,
    pub control_command: FieldMap,
    pub source: LogSource,
}

impl LogEntry {
    /// Build an entry stamped with the current local time.
    pub fn new(sensor_data: FieldMap, control_command: FieldMap, source: LogSource) -> Self {
        Self {
            timestamp: chrono::Local::now().to_rfc3339(),
            sensor_data,
            control_command,
            source,
        }
    }
}
