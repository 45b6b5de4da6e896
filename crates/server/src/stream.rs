//! Streaming session servicer
//!
//! One task per bidirectional stream. The WebSocket layer decodes frames
//! into [`Inbound`] events; [`drive_session`] owns the session lifecycle:
//! bind the speaker on init, segment arriving audio, drain finalized
//! utterances through the pipeline, and clean up on end or transport
//! failure. Keeping `drive_session` transport-independent is what makes
//! the lifecycle unit-testable.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

use parley_config::constants::{END_DRAIN_MS, MIN_DRAIN_MS};
use parley_core::audio::{bytes_for_ms, duration_ms};
use parley_core::protocol::{
    BufferingInfo, ClientMessage, ClientPayload, ErrorResponse, ServerMessage, ServerPayload,
    SessionStatus, StatusCode,
};

use crate::state::{AppState, SessionHandle};

/// One decoded inbound event.
#[derive(Debug)]
pub enum Inbound {
    /// A well-formed protocol message.
    Message(ClientMessage),
    /// Unparseable or unexpected frame; ignored without closing the stream.
    Malformed(String),
    /// The transport broke; reported once, then the stream closes.
    Transport(String),
}

/// Why a buffer was handed to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReason {
    SentenceEnd,
    BufferFull,
}

/// Decide whether buffered speech should drain.
///
/// A sentence boundary drains once enough context accumulated; a full
/// buffer drains unconditionally (and the caller resets the VAD).
pub fn drain_reason(
    buffered: usize,
    sentence_end: bool,
    max_buffer_bytes: usize,
) -> Option<DrainReason> {
    if sentence_end && buffered >= bytes_for_ms(MIN_DRAIN_MS) {
        Some(DrainReason::SentenceEnd)
    } else if buffered >= max_buffer_bytes {
        Some(DrainReason::BufferFull)
    } else {
        None
    }
}

/// Axum entry: upgrade and hand the socket to the servicer.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut ws_rx) = socket.split();

    // Writer task: serializes outbound messages in channel order, so
    // per-stream emission order is exactly the order the pipeline yields.
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(64);
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize outbound message");
                    continue;
                }
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let inbound = async_stream::stream! {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => yield Inbound::Message(message),
                    Err(e) => yield Inbound::Malformed(e.to_string()),
                },
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(other) => yield Inbound::Malformed(format!("unexpected frame: {other:?}")),
                Err(e) => {
                    yield Inbound::Transport(e.to_string());
                    break;
                }
            }
        }
    };

    drive_session(inbound, &out_tx, &state).await;

    drop(out_tx);
    let _ = writer.await;
}

/// Run one session's lifecycle over decoded inbound events.
///
/// Outbound sends are best-effort: once the peer is gone the channel
/// closes and remaining writes become no-ops.
pub async fn drive_session<S>(inbound: S, outbound: &mpsc::Sender<ServerMessage>, state: &AppState)
where
    S: Stream<Item = Inbound>,
{
    futures::pin_mut!(inbound);

    let mut current: Option<SessionHandle> = None;
    let mut current_session_id: Option<String> = None;

    tracing::debug!("Stream connected");

    while let Some(event) = inbound.next().await {
        let message = match event {
            Inbound::Message(message) => message,
            Inbound::Malformed(reason) => {
                tracing::debug!(reason = %reason, "Ignoring malformed inbound frame");
                continue;
            }
            Inbound::Transport(reason) => {
                tracing::warn!(reason = %reason, "Stream transport error");
                let _ = outbound
                    .send(ServerMessage {
                        session_id: current_session_id.clone().unwrap_or_default(),
                        room_id: current
                            .as_ref()
                            .map(|h| h.room_id.clone())
                            .unwrap_or_default(),
                        payload: ServerPayload::Error(ErrorResponse::stream_error(reason)),
                    })
                    .await;
                break;
            }
        };

        let session_id = message.session_id.clone();
        let room_id = message.room_id.clone();
        current_session_id = Some(session_id.clone());

        match message.payload {
            ClientPayload::SessionInit {
                speaker,
                participants,
            } => {
                if let Some(handle) = state.registry.get(&session_id) {
                    // Re-sent init replaces the speaker in place; buffer,
                    // VAD state, and counters survive, and no second READY
                    // is sent.
                    let mut session = handle.session.lock().await;
                    session.update_speaker(speaker.clone());
                    let strategy = session.primary_strategy();
                    drop(session);
                    current = Some(handle);

                    tracing::info!(
                        session_id = %session_id,
                        speaker = %speaker.nickname,
                        source_lang = %speaker.source_language,
                        strategy = ?strategy,
                        "Speaker updated"
                    );
                    continue;
                }

                let source_language = speaker.source_language.clone();
                let nickname = speaker.nickname.clone();
                let handle = state.create_session(
                    session_id.clone(),
                    room_id.clone(),
                    speaker,
                    participants,
                );

                let session = handle.session.lock().await;
                let targets = session.target_languages();
                let strategy = session.primary_strategy();
                drop(session);

                tracing::info!(
                    session_id = %session_id,
                    room_id = %room_id,
                    speaker = %nickname,
                    source_lang = %source_language,
                    targets = ?targets,
                    strategy = ?strategy,
                    "Session initialized"
                );

                let _ = outbound
                    .send(ServerMessage {
                        session_id: session_id.clone(),
                        room_id: room_id.clone(),
                        payload: ServerPayload::Status(SessionStatus {
                            status: StatusCode::Ready,
                            message: "Session initialized".to_string(),
                            buffering: BufferingInfo {
                                source_language,
                                primary_target_language: targets
                                    .iter()
                                    .next()
                                    .cloned()
                                    .unwrap_or_default(),
                                strategy,
                            },
                        }),
                    })
                    .await;

                current = Some(handle);
            }

            ClientPayload::AudioChunk { data } => {
                let Some(handle) = &current else {
                    tracing::debug!(session_id = %session_id, "Audio before session init, ignoring");
                    continue;
                };

                let chunk = match BASE64.decode(&data) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::debug!(error = %e, "Undecodable audio chunk, ignoring");
                        continue;
                    }
                };

                let mut session = handle.session.lock().await;

                let (has_speech, is_sentence_end) = session.vad.process_chunk(&chunk);
                if has_speech {
                    let speech = session.vad.filter_speech(&chunk);
                    session.audio_buffer.extend_from_slice(&speech);
                } else {
                    session.counters.silence_skipped += 1;
                }

                let buffered = session.audio_buffer.len();
                let reason =
                    drain_reason(buffered, is_sentence_end, session.max_buffer_bytes());

                if let Some(reason) = reason {
                    if reason == DrainReason::BufferFull {
                        session.vad.reset();
                    }
                    let segment = session.take_buffer();
                    tracing::debug!(
                        session_id = %session_id,
                        reason = ?reason,
                        bytes = segment.len(),
                        duration_ms = duration_ms(segment.len()),
                        "Draining audio buffer"
                    );

                    let stream = state.pipeline.process(&mut session, segment, true);
                    futures::pin_mut!(stream);
                    while let Some(message) = stream.next().await {
                        let _ = outbound.send(message).await;
                    }
                }
            }

            ClientPayload::SessionEnd => {
                if let Some(handle) = &current {
                    let mut session = handle.session.lock().await;
                    session.vad.reset();

                    if session.audio_buffer.len() >= bytes_for_ms(END_DRAIN_MS) {
                        let segment = session.take_buffer();
                        let stream = state.pipeline.process(&mut session, segment, true);
                        futures::pin_mut!(stream);
                        while let Some(message) = stream.next().await {
                            let _ = outbound.send(message).await;
                        }
                    } else {
                        session.audio_buffer.clear();
                    }

                    let counters = session.counters.clone();
                    drop(session);

                    tracing::info!(
                        session_id = %session_id,
                        chunks_processed = counters.chunks_processed,
                        sentences_completed = counters.sentences_completed,
                        silence_skipped = counters.silence_skipped,
                        stt_latency_ms = counters.stt_latency_ms,
                        translation_latency_ms = counters.translation_latency_ms,
                        tts_latency_ms = counters.tts_latency_ms,
                        "Session ended"
                    );
                }

                state.remove_session(&session_id);
                current_session_id = None;
                break;
            }
        }
    }

    // Covers both graceful end and abrupt disconnect.
    if let Some(session_id) = current_session_id {
        state.remove_session(&session_id);
    }
    tracing::debug!("Stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_reason_sentence_end_needs_min_buffer() {
        let min = bytes_for_ms(MIN_DRAIN_MS);
        assert_eq!(drain_reason(min - 1, true, 80_000), None);
        assert_eq!(
            drain_reason(min, true, 80_000),
            Some(DrainReason::SentenceEnd)
        );
    }

    #[test]
    fn test_drain_reason_buffer_full_boundary() {
        // sentence-based cap: 79 999 bytes holds, 80 000 drains
        assert_eq!(drain_reason(79_999, false, 80_000), None);
        assert_eq!(
            drain_reason(80_000, false, 80_000),
            Some(DrainReason::BufferFull)
        );
    }

    #[test]
    fn test_drain_reason_sentence_end_takes_priority() {
        assert_eq!(
            drain_reason(80_000, true, 80_000),
            Some(DrainReason::SentenceEnd)
        );
    }

    #[test]
    fn test_drain_reason_quiet_buffer() {
        assert_eq!(drain_reason(0, false, 48_000), None);
        assert_eq!(drain_reason(16_000, false, 48_000), None);
    }
}
