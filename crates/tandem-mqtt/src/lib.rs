pub mod payload;
pub mod subscriber;

pub use payload::decode_payload;
pub use subscriber::{run_mqtt_subscriber, MqttSubscriberConfig};
