use super::channel::UiEndpoint;
use crate::domain::bridge::UiEvent;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

/// Relays a [`UiEndpoint`] over a websocket: commands go out as JSON text
/// frames, JSON text frames coming back are parsed as [`UiEvent`]s.
///
/// Returns when the socket closes, or when the bridge stops listening for
/// events (the binding was replaced).
pub async fn pump_ui_socket(socket: WebSocket, endpoint: UiEndpoint) -> anyhow::Result<()> {
    let UiEndpoint {
        mut commands,
        events,
    } = endpoint;
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                let payload = serde_json::to_string(&command)?;
                sink.send(Message::Text(payload)).await?;
            }
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<UiEvent>(&text) {
                            Ok(event) => {
                                if events.send(event).is_err() {
                                    debug!("ui event stream released; closing socket");
                                    break;
                                }
                            }
                            Err(err) => warn!(%err, "ignoring malformed ui event"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                }
            }
            _ = events.closed() => {
                debug!("ui event stream released; closing socket");
                break;
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    Ok(())
}
