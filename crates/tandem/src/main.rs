mod config;
mod telemetry;

use config::ServiceConfig;
use std::sync::Arc;
use std::time::Duration;
use tandem_domain::{
    ControlLogStore, CorrelationService, DispatchConfig, TtlSet, WorkflowDispatchService,
};
use tandem_mqtt::{run_mqtt_subscriber, MqttSubscriberConfig};
use tandem_runner::Runner;
use tandem_store::{FileControlLogStore, FileStoreConfig};
use tandem_workflow::{HttpWorkflowClient, WorkflowClientConfig};
use telemetry::{init_telemetry, TelemetryConfig};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&TelemetryConfig {
        log_level: config.log_level.clone(),
    }) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    info!(
        broker_host = %config.mqtt_broker_host,
        broker_port = config.mqtt_broker_port,
        workflow_url = %config.workflow_url,
        "starting tandem service"
    );
    debug!("Configuration: {:?}", config);

    // Durable control log; the dedup caches below are memory-only by design.
    let store = Arc::new(
        FileControlLogStore::load(FileStoreConfig {
            path: config.log_file.clone().into(),
            max_history: config.max_history,
            retention_days: config.retention_days,
        })
        .await,
    );
    let store_dyn: Arc<dyn ControlLogStore> = Arc::clone(&store) as Arc<dyn ControlLogStore>;

    let in_flight = Arc::new(TtlSet::new(Duration::from_secs(config.in_flight_ttl_secs)));
    let recent_success = Arc::new(TtlSet::new(Duration::from_secs(
        config.recent_success_window_secs,
    )));

    let workflow = Arc::new(HttpWorkflowClient::new(WorkflowClientConfig {
        url: config.workflow_url.clone(),
        api_key: config.workflow_api_key.clone(),
        user_id: config.workflow_user_id.clone(),
        request_timeout: Duration::from_secs(config.workflow_timeout_secs),
    }));

    let dispatcher = Arc::new(WorkflowDispatchService::new(
        workflow,
        Arc::clone(&store_dyn),
        in_flight,
        Arc::clone(&recent_success),
        DispatchConfig {
            max_empty_retries: config.max_empty_retries,
            rate_limit_max_retries: config.rate_limit_max_retries,
            backoff_cap_secs: config.backoff_cap_secs,
        },
    ));

    let correlator = Arc::new(CorrelationService::new(
        dispatcher,
        store_dyn,
        recent_success,
    ));

    let subscriber_config = MqttSubscriberConfig {
        broker_host: config.mqtt_broker_host.clone(),
        broker_port: config.mqtt_broker_port,
        client_id: config.mqtt_client_id.clone(),
        sensor_topic: config.sensor_topic.clone(),
        control_topic: config.control_topic.clone(),
        max_retry_attempts: config.mqtt_max_retry_attempts,
        retry_delay_secs: config.mqtt_retry_delay_secs,
    };

    let runner = Runner::new()
        .with_named_process("mqtt_subscriber", {
            let correlator = Arc::clone(&correlator);
            move |token| run_mqtt_subscriber(subscriber_config, correlator, token)
        })
        .with_closer({
            let store = Arc::clone(&store);
            move || async move {
                info!("flushing control log");
                store.flush().await?;
                Ok(())
            }
        })
        .with_closer_timeout(Duration::from_secs(10));

    if let Err(e) = runner.run().await {
        error!(error = %format!("{:#}", e), "service exited with error");
        std::process::exit(1);
    }

    info!("service exiting normally");
}
