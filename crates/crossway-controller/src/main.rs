//! Crossway controller binary.
//!
//! Reads lane densities from the sensor board, cycles the signal board and
//! serves the status API and dashboard.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crossway_controller::{
    api, run_telemetry, Actuator, ActuatorLink, Connector, CrosswayConfig, DensityIngestor,
    HttpTelemetrySink, LogTelemetrySink, MemoryActuator, OverrideSequencer, PhaseController,
    SensorReader, SerialDevice, TelemetryForwarder, TelemetrySink, TrafficState,
};
use crossway_proto::ActuatorCommand;

const FINAL_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("crossway_controller=info".parse()?),
        )
        .init();

    info!("Crossway controller starting");

    let config = load_config();
    info!(
        listen_addr = %config.api.listen_addr,
        sensor = %config.sensor.device.display(),
        actuator = %config.actuator.device.display(),
        simulated = config.actuator.simulated,
        "Configuration loaded"
    );

    let cancel = CancellationToken::new();

    // Telemetry
    let sink: Arc<dyn TelemetrySink> = match &config.telemetry.url {
        Some(url) => Arc::new(HttpTelemetrySink::new(
            url,
            &config.telemetry.collection,
            config.telemetry.timeout,
        )?),
        None => Arc::new(LogTelemetrySink),
    };
    let (telemetry, telemetry_rx) = TelemetryForwarder::channel(config.telemetry.queue_capacity);
    let telemetry_task = tokio::spawn(run_telemetry(sink, telemetry_rx, cancel.clone()));

    // Actuator
    let connector: Arc<dyn Connector> = if config.actuator.simulated {
        info!("Using simulated actuator");
        Arc::new(MemoryActuator::new())
    } else {
        Arc::new(SerialDevice::new(&config.actuator.device))
    };
    let actuator = Actuator::new(ActuatorLink::new(
        connector,
        config.actuator.reconnect_policy(),
    ));

    let connect_actuator = actuator.clone();
    let connect_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut link = connect_actuator.lock().await;
        tokio::select! {
            () = connect_cancel.cancelled() => {}
            () = link.connect() => {}
        }
    });

    // Shared state and workers
    let traffic = Arc::new(TrafficState::new());
    let ingestor = DensityIngestor::new(traffic.clone(), telemetry);

    let (lines_tx, lines_rx) = mpsc::channel(config.sensor.channel_capacity.max(1));
    let sensor_task = if config.sensor.enabled {
        let reader = SensorReader::new(
            Arc::new(SerialDevice::new(&config.sensor.device)),
            config.sensor.reconnect_policy(),
        );
        Some(tokio::spawn(reader.run(lines_tx, cancel.clone())))
    } else {
        warn!("Sensor disabled, automatic cycle waits for density readings");
        drop(lines_tx);
        None
    };

    let controller = PhaseController::new(
        traffic.clone(),
        actuator.clone(),
        ingestor,
        config.controller.tick_interval,
    );
    let controller_cancel = cancel.clone();
    let controller_task =
        tokio::spawn(async move { controller.run(lines_rx, controller_cancel).await });

    let overrides = Arc::new(OverrideSequencer::new(
        traffic.clone(),
        actuator.clone(),
        config.controller.override_sub_tick,
    ));

    // HTTP server
    let state = Arc::new(api::AppState {
        traffic,
        overrides: overrides.clone(),
    });
    let app = api::router_with_dashboard(state, &config.api.dashboard_dir);

    let listener = TcpListener::bind(config.api.listen_addr).await?;
    info!(addr = %config.api.listen_addr, "Crossway API listening");

    let server_cancel = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                () = shutdown_signal() => {
                    info!("Shutdown signal received, initiating graceful shutdown");
                }
                () = server_cancel.cancelled() => {}
            }
        })
        .await;

    // Shutdown
    cancel.cancel();
    overrides.shutdown().await;

    for (name, task) in [("controller", controller_task), ("telemetry", telemetry_task)] {
        if let Err(e) = task.await {
            error!(task = name, error = %e, "Task failed");
        }
    }
    if let Some(task) = sensor_task {
        if let Err(e) = task.await {
            error!(task = "sensor", error = %e, "Task failed");
        }
    }

    match tokio::time::timeout(FINAL_COMMAND_TIMEOUT, actuator.send(ActuatorCommand::AllRed)).await
    {
        Ok(Ok(())) => info!("Signals set to all red"),
        Ok(Err(e)) => error!(error = %e, "Failed to set signals to all red"),
        Err(_) => error!("Timed out setting signals to all red"),
    }

    if let Err(e) = served {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Crossway controller shutdown complete");
    Ok(())
}

fn load_config() -> CrosswayConfig {
    match CrosswayConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Failed to load crossway.toml, using default configuration");
            CrosswayConfig::default()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C");
        }
        () = terminate => {
            info!("Received SIGTERM");
        }
    }
}
