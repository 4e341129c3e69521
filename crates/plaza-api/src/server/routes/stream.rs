async fn stream_space(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let initial = {
        let api = state.inner.lock().await;
        StreamFrame::snapshot(&api.snapshot(now_ms()))
    };

    ws.on_upgrade(move |socket| stream_socket(socket, state, initial))
}

/// One connected client. The socket carries bus events out and, for clients
/// acting as a writer, record publishes and chat in. The first published
/// record fixes the session identity; closing the socket stamps that entity
/// as departed.
async fn stream_socket(mut socket: WebSocket, state: AppState, initial: StreamFrame) {
    if send_stream_frame(&mut socket, &initial).await.is_err() {
        return;
    }

    let mut subscription = state.bus.subscribe();
    let mut session_id: Option<String> = None;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(payload))) => {
                        if handle_client_frame(&state, &mut session_id, payload.as_str(), &mut socket)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        break;
                    }
                    _ => {}
                }
            }
            outgoing = subscription.recv() => {
                match outgoing {
                    Ok(event) => {
                        let frame = match event {
                            BusEvent::Snapshot(snapshot) => StreamFrame::snapshot(&snapshot),
                            BusEvent::Chat(message) => StreamFrame::message(&message),
                            BusEvent::Warning(text) => StreamFrame::warning(text),
                        };

                        if send_stream_frame(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        let warning = StreamFrame::warning(format!(
                            "stream client lagged and skipped {skipped} event(s)"
                        ));

                        if send_stream_frame(&mut socket, &warning).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        }
    }

    if let Some(player_id) = session_id {
        let now = now_ms();
        let departed = {
            let mut api = state.inner.lock().await;
            api.mark_departed(&player_id, now)
        };
        if let Some(record) = departed {
            info!(player_id = player_id.as_str(), "stream writer departed");
            state.bus.publish(record, now);
        }
    }
}

async fn handle_client_frame(
    state: &AppState,
    session_id: &mut Option<String>,
    payload: &str,
    socket: &mut WebSocket,
) -> Result<(), axum::Error> {
    let frame = match serde_json::from_str::<ClientFrame>(payload) {
        Ok(frame) => frame,
        Err(err) => {
            let warning = StreamFrame::warning(format!("unreadable client frame: {err}"));
            return send_stream_frame(socket, &warning).await;
        }
    };

    match frame {
        ClientFrame::Publish { player } => {
            let now = now_ms();
            if session_id.is_none() {
                *session_id = Some(player.player_id.clone());
            }

            let stored = {
                let mut api = state.inner.lock().await;
                api.publish_record(player, now)
            };
            state.bus.publish(stored, now);
            Ok(())
        }
        ClientFrame::Chat {
            text,
            target_user_id,
        } => {
            let Some(sender_id) = session_id.clone() else {
                let warning =
                    StreamFrame::warning("chat before the first publish has no sender".to_string());
                return send_stream_frame(socket, &warning).await;
            };

            let now = now_ms();
            let routed = {
                let mut api = state.inner.lock().await;
                api.route_message(&sender_id, &text, target_user_id.as_deref(), now)
            };

            match routed {
                Ok(routed) => {
                    state.bus.chat(routed.message.clone());
                    state
                        .notifier
                        .dispatch(routed.webhook_targets, &routed.message);
                    Ok(())
                }
                Err(err) => {
                    let warning = StreamFrame::warning(format!("chat not delivered: {err}"));
                    send_stream_frame(socket, &warning).await
                }
            }
        }
    }
}

async fn send_stream_frame(socket: &mut WebSocket, frame: &StreamFrame) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(frame).map_err(axum::Error::new)?;
    socket.send(Message::Text(payload.into())).await
}

#[derive(Debug, Clone, Serialize)]
struct StreamFrame {
    schema_version: String,
    #[serde(rename = "type")]
    frame_type: String,
    sent_at_ms: u64,
    payload: Value,
}

impl StreamFrame {
    fn snapshot(snapshot: &WorldSnapshot) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            frame_type: "world.snapshot".to_string(),
            sent_at_ms: snapshot.published_at_ms,
            payload: json!(snapshot),
        }
    }

    fn message(message: &ChatMessage) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            frame_type: "chat.message".to_string(),
            sent_at_ms: message.sent_at_ms,
            payload: json!(message),
        }
    }

    fn warning(warning: String) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            frame_type: "warning".to_string(),
            sent_at_ms: now_ms(),
            payload: json!({ "message": warning }),
        }
    }
}

/// Frames a stream client may send. A `publish` replaces the client's own
/// record; a `chat` routes like `/send` for the session's entity.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Publish {
        player: PlayerRecord,
    },
    Chat {
        text: String,
        target_user_id: Option<String>,
    },
}
