//! `/ws`: initial snapshot, then every broadcast event as JSON text frames.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::broadcaster::ChannelSink;
use crate::events::{ApiStats, StateEvent, StationProjector, WireEvent};
use crate::web::AppState;

/// Events buffered per client before it is considered too slow and dropped
const CLIENT_QUEUE_SIZE: usize = 256;

type WsSender = futures_util::stream::SplitSink<WebSocket, Message>;

pub async fn stations_live_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, receiver) = socket.split();

    // Subscribe before taking the snapshot so nothing published in between is missed
    let (sink, event_rx) = ChannelSink::channel(CLIENT_QUEUE_SIZE);
    let subscriber_id = state.broadcaster.subscribe(Arc::new(sink));
    info!(
        "WebSocket client {} connected ({} subscribers)",
        subscriber_id,
        state.broadcaster.subscriber_count()
    );

    match init_message(&state).await {
        Ok(init) => {
            if let Err(e) = send_json(&mut sender, &init).await {
                debug!("Failed to send init to client {}: {}", subscriber_id, e);
                state.broadcaster.unsubscribe(subscriber_id);
                return;
            }
        }
        Err(e) => {
            error!("Failed to build init snapshot: {:#}", e);
            state.broadcaster.unsubscribe(subscriber_id);
            return;
        }
    }

    let projector = state.projector;
    let mut read_task = tokio::spawn(handle_websocket_read(receiver));
    let mut write_task = tokio::spawn(handle_websocket_write(sender, event_rx, projector));

    tokio::select! {
        _ = &mut read_task => {
            debug!("WebSocket read task completed");
            write_task.abort();
        }
        _ = &mut write_task => {
            debug!("WebSocket write task completed");
            read_task.abort();
        }
    }

    state.broadcaster.unsubscribe(subscriber_id);
    info!("WebSocket client {} disconnected", subscriber_id);
}

async fn init_message(state: &AppState) -> Result<WireEvent> {
    let stations = state.repo.get_all().await?;
    let stats = state.repo.get_stats().await?;

    Ok(WireEvent::Init {
        stations: stations.iter().map(|s| state.projector.project(s)).collect(),
        stats: ApiStats::with_connection(&stats, state.tracker.is_kiss_connected()),
    })
}

async fn send_json(sender: &mut WsSender, event: &WireEvent) -> Result<()> {
    let json = serde_json::to_string(event)?;
    sender.send(Message::Text(json.into())).await?;
    Ok(())
}

/// Clients only listen; incoming frames are drained until close
async fn handle_websocket_read(mut receiver: futures_util::stream::SplitStream<WebSocket>) {
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => {
                debug!("WebSocket connection closed by client");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket error: {}", e);
                break;
            }
        }
    }
}

/// Relay events until the client goes away or the broadcaster drops this
/// subscriber, which closes the channel
async fn handle_websocket_write(
    mut sender: WsSender,
    mut event_rx: mpsc::Receiver<Arc<StateEvent>>,
    projector: StationProjector,
) {
    while let Some(event) = event_rx.recv().await {
        let wire = projector.to_wire(&event);
        if let Err(e) = send_json(&mut sender, &wire).await {
            debug!("Failed to send {} event to WebSocket client: {}", event.kind(), e);
            break;
        }
    }
    let _ = sender.close().await;
}
