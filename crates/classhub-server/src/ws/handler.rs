use super::connections::encode;
use crate::auth::verify_token;
use crate::models::Identity;
use crate::state::AppState;
use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use classhub_protocol::{ChannelKey, ClientMessage, ServerEvent, ServerMessage};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};

pub async fn community_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, ChannelKey::Community(slug)))
}

pub async fn notifications_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, ChannelKey::User(user_id)))
}

pub async fn live_class_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(class_id): Path<i64>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, ChannelKey::LiveClass(class_id)))
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: ServerEvent) -> bool {
    match encode(&ServerMessage::now(event)) {
        Some(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        None => false,
    }
}

async fn refuse(mut sender: SplitSink<WebSocket, Message>, message: impl Into<String>) {
    let _ = send_event(
        &mut sender,
        ServerEvent::Error {
            message: message.into(),
        },
    )
    .await;
    let _ = sender.send(Message::Close(None)).await;
}

async fn handle_socket(socket: WebSocket, state: AppState, channel: ChannelKey) {
    let (mut sender, mut receiver) = socket.split();

    // First message should be authentication
    let auth_msg = match receiver.next().await {
        Some(Ok(Message::Text(text))) => text,
        _ => {
            tracing::warn!("WebSocket closed before authentication");
            return;
        }
    };

    let identity: Identity = match serde_json::from_str::<ClientMessage>(&auth_msg) {
        Ok(ClientMessage::Authenticate { token }) => {
            match verify_token(&token, &state.config.jwt_secret) {
                Ok(claims) => claims.identity(),
                Err(_) => return refuse(sender, "Invalid token").await,
            }
        }
        Ok(_) => return refuse(sender, "First message must be authentication").await,
        Err(e) => {
            tracing::warn!("Invalid auth message: {}", e);
            return refuse(sender, "Invalid message format").await;
        }
    };
    let user_id = identity.id();

    // Admission is decided here, not by filtering later pushes
    let subscription = match state.hub.connect(&identity, channel.clone()).await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::info!("User {} refused on {}: {}", user_id, channel, e);
            return refuse(sender, e.to_string()).await;
        }
    };
    let connection_id = subscription.connection_id;
    let mut rx = subscription.receiver;

    if !send_event(
        &mut sender,
        ServerEvent::Admitted {
            connection_id,
            channel: channel.clone(),
        },
    )
    .await
    {
        state.hub.disconnect(connection_id).await;
        return;
    }

    tracing::info!("User {} connected to {}", user_id, channel);

    // Spawn task to forward pushed frames to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let client_msg: ClientMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!("Invalid message from {}: {}", user_id, e);
                        continue;
                    }
                };

                handle_client_message(&state, &identity, &channel, connection_id, client_msg)
                    .await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::error!("WebSocket error for user {}: {}", user_id, e);
                break;
            }
            _ => {}
        }
    }

    // Cleanup on disconnect
    state.hub.disconnect(connection_id).await;
    send_task.abort();

    tracing::info!("User {} disconnected from {}", user_id, channel);
}

async fn handle_client_message(
    state: &AppState,
    identity: &Identity,
    channel: &ChannelKey,
    connection_id: uuid::Uuid,
    message: ClientMessage,
) {
    match message {
        ClientMessage::Authenticate { .. } => {
            // Already authenticated
        }
        ClientMessage::Ping => {
            state
                .hub
                .send_to_connection(connection_id, ServerEvent::Pong)
                .await;
        }
        ClientMessage::SendMessage { content } => {
            let result = match channel {
                ChannelKey::Community(slug) => {
                    state.chat.post(slug, identity, &content).await.map(|_| ())
                }
                _ => Err(crate::error::AppError::BadRequest(
                    "Messages can only be sent to community channels".to_string(),
                )),
            };

            if let Err(e) = result {
                state
                    .hub
                    .send_to_connection(
                        connection_id,
                        ServerEvent::Error {
                            message: e.to_string(),
                        },
                    )
                    .await;
            }
        }
    }
}
