use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::with_deadline;
use crate::error::AppError;
use crate::geo::GeoIndex;
use crate::hub::protocol::{decode_inbound, InboundMessage, OutboundEvent, ResponseAction};
use crate::hub::HubHandle;
use crate::models::driver::GeoPoint;
use crate::models::order::Order;

/// The engine operations a driver session can trigger.
#[async_trait]
pub trait DispatchLogic: Send + Sync {
    async fn accept_assignment(&self, driver_id: Uuid, order_id: Uuid) -> Result<(), AppError>;
    async fn reject_assignment(&self, driver_id: Uuid, order_id: Uuid) -> Result<(), AppError>;
    async fn active_order(&self, driver_id: Uuid) -> Result<Option<Order>, AppError>;
}

#[derive(Clone)]
pub struct SessionContext {
    pub hub: HubHandle,
    pub geo: Arc<dyn GeoIndex>,
    pub logic: Arc<dyn DispatchLogic>,
    pub request_timeout: Duration,
    pub client_buffer_size: usize,
}

/// Drives one authenticated websocket until either side goes away.
pub async fn run_session(socket: WebSocket, driver_id: Uuid, ctx: SessionContext) {
    let (outbound_tx, outbound_rx) = mpsc::channel::<String>(ctx.client_buffer_size);
    let connection_id = match ctx.hub.register(driver_id, outbound_tx).await {
        Ok(connection_id) => connection_id,
        Err(err) => {
            warn!(driver_id = %driver_id, error = %err, "could not register session");
            return;
        }
    };

    replay_active_assignment(&ctx, driver_id).await;

    let (mut sink, mut stream) = socket.split();
    let mut outbound = ReceiverStream::new(outbound_rx);

    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = outbound.next().await {
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader_ctx = ctx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) => handle_inbound(&reader_ctx, driver_id, &text).await,
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    ctx.hub.unregister(driver_id, connection_id).await;
    info!(driver_id = %driver_id, connection_id, "driver session ended");
}

/// Re-sends the driver's current assignment so a reconnecting client
/// catches up on pushes it missed while offline.
async fn replay_active_assignment(ctx: &SessionContext, driver_id: Uuid) {
    let order = match ctx.logic.active_order(driver_id).await {
        Ok(Some(order)) => order,
        Ok(None) => return,
        Err(err) => {
            warn!(driver_id = %driver_id, error = %err, "failed to load active order for replay");
            return;
        }
    };

    let event = OutboundEvent::OrderAssigned {
        order_id: order.id,
        lat: order.pickup.lat,
        lng: order.pickup.lng,
    };
    if let Err(err) = ctx.hub.send_event(driver_id, &event) {
        debug!(driver_id = %driver_id, error = %err, "assignment replay dropped");
    }
}

pub async fn handle_inbound(ctx: &SessionContext, driver_id: Uuid, text: &str) {
    let message = match decode_inbound(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(driver_id = %driver_id, error = %err, "invalid frame from driver");
            return;
        }
    };

    match message {
        InboundMessage::LocationUpdate { lat, lng } => {
            match ctx.geo.upsert(driver_id, GeoPoint::new(lat, lng)).await {
                Ok(()) => debug!(driver_id = %driver_id, lat, lng, "driver moved"),
                Err(err) => warn!(driver_id = %driver_id, error = %err, "failed to update location"),
            }
        }
        InboundMessage::OrderResponse { order_id, action } => {
            let result = match action {
                ResponseAction::Accept => {
                    with_deadline(
                        ctx.request_timeout,
                        "accept_assignment",
                        ctx.logic.accept_assignment(driver_id, order_id),
                    )
                    .await
                }
                ResponseAction::Reject => {
                    with_deadline(
                        ctx.request_timeout,
                        "reject_assignment",
                        ctx.logic.reject_assignment(driver_id, order_id),
                    )
                    .await
                }
                ResponseAction::Unknown => {
                    debug!(driver_id = %driver_id, order_id = %order_id, "unknown order response ignored");
                    return;
                }
            };

            match result {
                Ok(()) => info!(driver_id = %driver_id, order_id = %order_id, ?action, "order response applied"),
                Err(err) => {
                    warn!(driver_id = %driver_id, order_id = %order_id, ?action, error = %err, "order response failed");
                    let event = OutboundEvent::Error {
                        order_id: Some(order_id),
                        message: err.client_message(),
                    };
                    if let Err(err) = ctx.hub.send_event(driver_id, &event) {
                        debug!(driver_id = %driver_id, error = %err, "error event dropped");
                    }
                }
            }
        }
    }
}
