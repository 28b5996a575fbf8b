pub mod protocol;
pub mod session;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::DriverNotifier;
use crate::error::AppError;
use crate::hub::protocol::OutboundEvent;
use crate::observability::metrics::Metrics;

struct Connection {
    connection_id: u64,
    outbound: mpsc::Sender<String>,
}

pub enum HubCommand {
    Register {
        driver_id: Uuid,
        connection_id: u64,
        outbound: mpsc::Sender<String>,
    },
    Unregister {
        driver_id: Uuid,
        connection_id: u64,
    },
    Send {
        driver_id: Uuid,
        payload: String,
    },
    Broadcast {
        payload: String,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<Uuid>>,
    },
}

/// Owns the live driver connections. Run it on its own task; every other
/// component talks to it through a [`HubHandle`].
///
/// The loop never awaits a client. Delivery uses `try_send` and a client
/// whose queue is full or closed loses its connection.
pub struct ConnectionHub {
    connections: HashMap<Uuid, Connection>,
    commands: mpsc::Receiver<HubCommand>,
    metrics: Metrics,
}

#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    next_connection_id: Arc<AtomicU64>,
}

pub fn channel(command_buffer: usize, metrics: Metrics) -> (HubHandle, ConnectionHub) {
    let (commands_tx, commands_rx) = mpsc::channel(command_buffer);

    (
        HubHandle {
            commands: commands_tx,
            next_connection_id: Arc::new(AtomicU64::new(1)),
        },
        ConnectionHub {
            connections: HashMap::new(),
            commands: commands_rx,
            metrics,
        },
    )
}

impl ConnectionHub {
    pub async fn run(mut self) {
        info!("connection hub started");

        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }

        info!(
            remaining = self.connections.len(),
            "connection hub stopped: all handles dropped"
        );
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register {
                driver_id,
                connection_id,
                outbound,
            } => {
                let previous = self.connections.insert(
                    driver_id,
                    Connection {
                        connection_id,
                        outbound,
                    },
                );
                if previous.is_some() {
                    self.record_disconnect(driver_id, "replaced");
                }
                info!(driver_id = %driver_id, connection_id, "driver connected");
            }
            HubCommand::Unregister {
                driver_id,
                connection_id,
            } => match self.connections.get(&driver_id) {
                Some(current) if current.connection_id == connection_id => {
                    self.connections.remove(&driver_id);
                    info!(driver_id = %driver_id, connection_id, "driver disconnected");
                }
                _ => debug!(driver_id = %driver_id, connection_id, "stale unregister ignored"),
            },
            HubCommand::Send { driver_id, payload } => {
                let Some(connection) = self.connections.get(&driver_id) else {
                    debug!(driver_id = %driver_id, "driver not connected; message dropped");
                    return;
                };

                if let Err(reason) = deliver(connection, payload) {
                    self.connections.remove(&driver_id);
                    self.record_disconnect(driver_id, reason);
                }
            }
            HubCommand::Broadcast { payload } => {
                let failed: Vec<(Uuid, &'static str)> = self
                    .connections
                    .iter()
                    .filter_map(|(driver_id, connection)| {
                        deliver(connection, payload.clone())
                            .err()
                            .map(|reason| (*driver_id, reason))
                    })
                    .collect();

                for (driver_id, reason) in failed {
                    self.connections.remove(&driver_id);
                    self.record_disconnect(driver_id, reason);
                }
            }
            HubCommand::Snapshot { reply } => {
                let mut drivers: Vec<Uuid> = self.connections.keys().copied().collect();
                drivers.sort();
                let _ = reply.send(drivers);
            }
        }

        self.metrics
            .connected_drivers
            .set(self.connections.len() as i64);
    }

    fn record_disconnect(&self, driver_id: Uuid, reason: &'static str) {
        self.metrics
            .hub_disconnects_total
            .with_label_values(&[reason])
            .inc();
        warn!(driver_id = %driver_id, reason, "hub dropped driver connection");
    }
}

fn deliver(connection: &Connection, payload: String) -> Result<(), &'static str> {
    match connection.outbound.try_send(payload) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => Err("slow_client"),
        Err(TrySendError::Closed(_)) => Err("closed"),
    }
}

impl HubHandle {
    /// Registers a connection and returns the id that must accompany its
    /// unregister. A newer registration for the same driver wins.
    pub async fn register(
        &self,
        driver_id: Uuid,
        outbound: mpsc::Sender<String>,
    ) -> Result<u64, AppError> {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        self.submit(HubCommand::Register {
            driver_id,
            connection_id,
            outbound,
        })
        .await?;
        Ok(connection_id)
    }

    pub async fn unregister(&self, driver_id: Uuid, connection_id: u64) {
        if let Err(err) = self
            .submit(HubCommand::Unregister {
                driver_id,
                connection_id,
            })
            .await
        {
            debug!(driver_id = %driver_id, error = %err, "unregister after hub shutdown");
        }
    }

    /// Queues `event` for one driver without waiting. A full command queue
    /// drops the event and reports [`AppError::Unavailable`].
    pub fn send_event(&self, driver_id: Uuid, event: &OutboundEvent) -> Result<(), AppError> {
        let payload = encode(event)?;
        self.try_submit(HubCommand::Send { driver_id, payload })
    }

    pub fn broadcast(&self, event: &OutboundEvent) -> Result<(), AppError> {
        let payload = encode(event)?;
        self.try_submit(HubCommand::Broadcast { payload })
    }

    pub async fn connected_drivers(&self) -> Result<Vec<Uuid>, AppError> {
        let (reply, response) = oneshot::channel();
        self.submit(HubCommand::Snapshot { reply }).await?;
        response
            .await
            .map_err(|_| AppError::Unavailable("connection hub stopped".to_string()))
    }

    async fn submit(&self, command: HubCommand) -> Result<(), AppError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::Unavailable("connection hub stopped".to_string()))
    }

    fn try_submit(&self, command: HubCommand) -> Result<(), AppError> {
        self.commands.try_send(command).map_err(|err| match err {
            TrySendError::Full(_) => {
                AppError::Unavailable("hub command queue full; event dropped".to_string())
            }
            TrySendError::Closed(_) => AppError::Unavailable("connection hub stopped".to_string()),
        })
    }
}

fn encode(event: &OutboundEvent) -> Result<String, AppError> {
    event
        .to_json()
        .map_err(|err| AppError::Internal(format!("failed to encode event: {err}")))
}

#[async_trait]
impl DriverNotifier for HubHandle {
    async fn send_to_driver(&self, driver_id: Uuid, event: OutboundEvent) -> Result<(), AppError> {
        self.send_event(driver_id, &event)
    }
}
