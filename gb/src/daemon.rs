//! Daemon runtime
//!
//! Wires the bus, the Correlator, the bus pump and the command front end
//! together and serves IPC until a signal or a `Shutdown` message arrives.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{BusEvents, BusLink, EchoDeviceConfig, LocalBus, MqttLink, spawn_bus_pump, spawn_echo_device};
use crate::config::Config;
use crate::correlator::Correlator;
use crate::frontend::CommandFrontEnd;
use crate::ipc::{self, DaemonMessage, DaemonResponse};
use crate::replies::ReplyStore;

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Transport chosen at startup, kept for teardown
enum BusRuntime {
    Mqtt { link: Arc<MqttLink>, driver: JoinHandle<()> },
    Loopback { device: JoinHandle<()> },
}

impl BusRuntime {
    fn connect(config: &Config, loopback: bool) -> (Self, Arc<dyn BusLink>, BusEvents) {
        if loopback {
            info!("Using in-memory loopback bus with simulated device");
            let (bus, events) = LocalBus::new();
            let device_config = EchoDeviceConfig {
                reply_delay: config.loopback.reply_delay(),
                alive_interval: config.loopback.alive_interval(),
                ..EchoDeviceConfig::new(&config.topics.down, &config.topics.up)
            };
            let device = spawn_echo_device(bus.clone(), device_config);
            (Self::Loopback { device }, bus, events)
        } else {
            info!(host = %config.mqtt.host, port = config.mqtt.port, "Connecting to MQTT broker");
            let (link, events, driver) = MqttLink::connect(&config.mqtt, &config.topics.up);
            let bus: Arc<dyn BusLink> = link.clone();
            (Self::Mqtt { link, driver }, bus, events)
        }
    }

    async fn close(self) {
        match self {
            Self::Mqtt { link, driver } => {
                link.disconnect().await;
                driver.abort();
            }
            Self::Loopback { device } => device.abort(),
        }
    }
}

/// Run the daemon in the foreground until shutdown
pub async fn run_daemon(config: &Config, loopback: bool) -> Result<()> {
    debug!(loopback, "run_daemon: called");
    info!("Daemon starting...");

    config.validate().context("Invalid configuration")?;

    let replies = ReplyStore::load_or_create(&config.replies.path)
        .with_context(|| format!("Failed to open reply file {}", config.replies.path.display()))?;
    info!(count = replies.list().len(), "Reply store loaded");

    let (bus_runtime, bus, events) = BusRuntime::connect(config, loopback);

    let correlator = Correlator::new(config.correlator.clone(), config.topics.clone(), bus);
    let correlator_handle = correlator.handle();
    let correlator_task = tokio::spawn(correlator.run());
    info!("Correlator started");

    let pump_task = spawn_bus_pump(events, correlator_handle.clone());

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let front = CommandFrontEnd::new(
        correlator_handle.clone(),
        replies,
        config.frontend.clone(),
        shutdown_tx,
    );

    let (listener, socket_path) = ipc::create_listener_at(&config.ipc.socket_path())?;
    info!(?socket_path, "IPC socket listening");
    let accept_task = tokio::spawn(accept_loop(listener, front.clone()));

    info!("Daemon running. Press Ctrl+C to stop, SIGHUP to reload replies.");

    debug!("run_daemon: setting up signal handlers");
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    info!("SIGHUP received - reloading replies");
                    if let Err(e) = front.reload_replies().await {
                        error!(error = %e, "Failed to reload replies");
                    }
                }
                _ = sigint.recv() => {
                    warn!("SIGINT received");
                    break;
                }
                _ = sigterm.recv() => {
                    warn!("SIGTERM received");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    debug!("run_daemon: shutdown message received");
                    break;
                }
            }
        }
    }

    info!("Daemon shutting down...");

    accept_task.abort();
    ipc::cleanup_socket(&socket_path);

    if let Err(e) = correlator_handle.shutdown().await {
        debug!(error = %e, "run_daemon: correlator already stopped");
    }
    let _ = correlator_task.await;
    debug!("run_daemon: correlator finished");

    pump_task.abort();
    bus_runtime.close().await;

    debug!("run_daemon: shutdown complete");
    Ok(())
}

/// Source of incoming IPC connections
#[async_trait]
trait Acceptor: Send + Sync {
    async fn accept(&self) -> std::io::Result<UnixStream>;
}

#[async_trait]
impl Acceptor for UnixListener {
    async fn accept(&self) -> std::io::Result<UnixStream> {
        UnixListener::accept(self).await.map(|(stream, _addr)| stream)
    }
}

/// Accept IPC connections, one task per connection
///
/// Commands wait for the device, so a slow request must not block a newer
/// command that would supersede it.
async fn accept_loop<A: Acceptor>(listener: A, front: CommandFrontEnd) {
    loop {
        match listener.accept().await {
            Ok(stream) => {
                debug!("accept_loop: IPC connection accepted");
                let front = front.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &front).await {
                        warn!(error = %e, "IPC connection error");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "IPC accept error");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

async fn handle_connection(mut stream: UnixStream, front: &CommandFrontEnd) -> Result<()> {
    let msg = match ipc::read_message(&mut stream).await {
        Ok(msg) => msg,
        Err(e) => {
            let response = DaemonResponse::Error {
                message: format!("{:#}", e),
            };
            ipc::send_response(&mut stream, &response).await?;
            return Err(e);
        }
    };
    debug!(?msg, "handle_connection: received message");

    let shutdown = matches!(msg, DaemonMessage::Shutdown);
    let response = front.handle(msg).await;
    ipc::send_response(&mut stream, &response).await?;

    if shutdown {
        front.request_shutdown().await;
    }
    Ok(())
}
