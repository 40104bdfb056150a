use std::time::Duration;

use anyhow::Context;
use latchkey_bus::MqttBus;
use latchkey_endpoint::{config::Config, provisioning::NetworkProvisioner, telemetry};
use latchkey_hardware::{console::spawn_console_feeder, mock::MockReader};
use latchkey_session::Endpoint;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    let result = runtime.block_on(run());

    // The console feeder may be parked in a blocking stdin read.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    info!(
        device_id = %config.device.id,
        device_name = %config.device.name,
        version = latchkey_core::VERSION,
        "Starting latchkey endpoint"
    );

    if config.provisioning.enabled {
        NetworkProvisioner::from_config(&config)
            .provision()
            .await
            .context("network provisioning failed")?;
    } else {
        info!("Provisioning check disabled");
    }

    let actuator = config
        .actuator
        .build()
        .await
        .context("failed to initialise actuator")?;

    let (reader, reader_handle) = MockReader::with_name(config.device.name.clone());
    let _console = spawn_console_feeder(reader_handle.clone());

    let bus = MqttBus::new(config.mqtt().context("invalid bus configuration")?);
    let mut endpoint = Endpoint::new(reader, bus, actuator, config.endpoint());

    let started = tokio::select! {
        _ = endpoint.start() => true,
        _ = shutdown_signal() => false,
    };
    if !started {
        info!("Shutdown requested before the broker connection was established");
        return endpoint.shutdown().await.context("failed to release output");
    }

    endpoint
        .run_until(shutdown_signal())
        .await
        .context("failed to stop endpoint cleanly")?;

    drop(reader_handle);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Cannot listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
}
