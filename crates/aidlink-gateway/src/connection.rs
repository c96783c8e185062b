use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use aidlink_db::Database;
use aidlink_types::events::{GatewayCommand, GatewayEvent};
use aidlink_types::models::PresenceMeta;

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single WebSocket connection. The client identifies with its
/// JWT, gets Ready plus a full presence snapshot, and from then on
/// receives the event stream filtered to its conversation subscriptions.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let (user_id, display_name) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", display_name, user_id);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready {
        user_id,
        display_name: display_name.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    // Step 3: Full membership snapshot so the client reconciles its
    // presence state before any join/leave deltas arrive.
    let sync = GatewayEvent::PresenceSync {
        membership: dispatcher.snapshot().await,
    };
    if send_event(&mut sender, &sync).await.is_err() {
        return;
    }

    let conn_id = Uuid::new_v4();
    let mut broadcast_rx = dispatcher.subscribe();
    let dispatcher_clone = dispatcher.clone();

    // Per-connection conversation subscriptions (shared between send and
    // recv tasks).
    let subscriptions: Arc<std::sync::RwLock<HashSet<Uuid>>> =
        Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Spawn task to forward broadcasts -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if let Some(conversation_id) = event.conversation_id() {
                        let watching = send_subscriptions
                            .read()
                            .expect("subscription lock poisoned")
                            .contains(&conversation_id);
                        if !watching {
                            continue;
                        }
                    }

                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let display_name_recv = display_name.clone();
    let recv_subscriptions = subscriptions.clone();
    let db_recv = db.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(
                            &dispatcher_clone,
                            &db_recv,
                            conn_id,
                            user_id,
                            &display_name_recv,
                            cmd,
                            &recv_subscriptions,
                        )
                        .await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            display_name_recv,
                            user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Teardown counts as a clean untrack so other users observe a timely
    // offline transition even when the client never sent Untrack.
    dispatcher.untrack(conn_id).await;
    info!("{} ({}) disconnected from gateway", display_name, user_id);
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    use aidlink_types::api::Claims;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    let timeout = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.name));
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    conn_id: Uuid,
    user_id: Uuid,
    display_name: &str,
    cmd: GatewayCommand,
    subscriptions: &Arc<std::sync::RwLock<HashSet<Uuid>>>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { conversation_ids } => {
            // Only conversations the user is a party to may be watched.
            let db = db.clone();
            let uid = user_id.to_string();
            let accepted = tokio::task::spawn_blocking(move || {
                let mut accepted = HashSet::new();
                for id in conversation_ids {
                    match db.get_conversation(&id.to_string()) {
                        Ok(Some(row)) if row.helper_id == uid || row.requester_id == uid => {
                            accepted.insert(id);
                        }
                        Ok(_) => {}
                        Err(e) => warn!("subscribe lookup failed for {}: {}", id, e),
                    }
                }
                accepted
            })
            .await
            .unwrap_or_default();

            info!(
                "{} ({}) subscribed to {} conversations",
                display_name,
                user_id,
                accepted.len()
            );
            *subscriptions.write().expect("subscription lock poisoned") = accepted;
        }

        GatewayCommand::Track { avatar_url } => {
            let meta = PresenceMeta {
                display_name: display_name.to_string(),
                avatar_url,
                online_at: Utc::now(),
            };
            dispatcher.track(conn_id, user_id, meta).await;
        }

        GatewayCommand::Untrack => {
            dispatcher.untrack(conn_id).await;
        }

        GatewayCommand::StartTyping { conversation_id } => {
            let watching = subscriptions
                .read()
                .expect("subscription lock poisoned")
                .contains(&conversation_id);
            if watching {
                dispatcher.broadcast(GatewayEvent::TypingStart {
                    conversation_id,
                    user_id,
                    display_name: display_name.to_string(),
                });
            }
        }
    }
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).unwrap();
    sender.send(Message::Text(text.into())).await
}
