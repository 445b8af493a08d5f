//! Exchange sessions (C4, §4.4): one task per venue (plus Bybit's
//! shards), each running the same generic state machine over a
//! venue-specific [`ExchangeConnector`] — "a tagged variant over the
//! eight venue kinds with one decoder per variant" (§9).

pub mod common;

pub mod binance;
pub mod bybit;
pub mod coinbase;
pub mod gateio;
pub mod htx;
pub mod kucoin;
pub mod mexc;
pub mod okx;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::{DecodeError, SessionFault};
use crate::exchange::ExchangeId;
use crate::lattice::TickerData;
use crate::shm::SharedRegion;
use common::{
    BackoffCalculator, HeartbeatAction, HeartbeatMonitor, SessionConfig, SessionMetrics,
    SessionState,
};

/// What decoding one inbound frame produced.
pub enum FrameOutcome {
    /// A normalized top-of-book update for `native_symbol`.
    Update {
        native_symbol: String,
        data: TickerData,
    },
    /// A control frame (e.g. HTX's gzip ping); optionally reply in-band.
    Control(Option<Message>),
    /// Decode failure or an irrelevant event — silently dropped (§7).
    Drop,
}

/// Logs the reason a frame was dropped and returns the outcome connectors
/// hand back to the session driver (§7 drop conditions).
pub(crate) fn drop_decode(reason: DecodeError) -> FrameOutcome {
    debug!(error = %reason, "frame_dropped");
    FrameOutcome::Drop
}

/// Per-venue behavior the generic session driver delegates to.
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    fn exchange(&self) -> ExchangeId;

    /// Resolves the final WebSocket URL. Most venues return a static
    /// endpoint; Kucoin performs an HTTP bootstrap dance here (§4.4).
    async fn prepare(&self, natives: &[String]) -> anyhow::Result<String>;

    /// One or more subscription messages to send right after connect.
    fn subscribe_messages(&self, natives: &[String]) -> Vec<Message>;

    /// Delay between successive subscribe messages, if the venue rate-limits
    /// per-message subscriptions (Kucoin: ~200ms).
    fn subscribe_spacing(&self) -> Option<Duration> {
        None
    }

    /// Decodes one inbound frame.
    fn decode(&self, msg: &Message) -> FrameOutcome;

    /// Venue-level application ping, sent on its own cadence in addition
    /// to the generic WS ping/pong heartbeat (Kucoin only).
    fn app_ping(&self) -> Option<(Duration, Message)> {
        None
    }
}

/// Drives one connector instance through connect -> subscribe -> stream
/// -> (fault -> backoff) -> reconnect, forever, until `shutdown` is set.
///
/// `slot_map` maps this connector's native spellings to lattice columns;
/// `slot_offset` lets Bybit's shards share one generic loop while writing
/// into disjoint native-symbol sets (the offset is baked into `slot_map`
/// itself, so it is not otherwise referenced here).
pub async fn run_session(
    connector: Arc<dyn ExchangeConnector>,
    natives: Vec<String>,
    slot_map: Arc<HashMap<String, usize>>,
    region: Arc<SharedRegion>,
    update_tx: mpsc::Sender<usize>,
    shutdown: Arc<AtomicBool>,
    config: SessionConfig,
) {
    let exchange = connector.exchange();
    let metrics = SessionMetrics::default();
    let mut backoff = BackoffCalculator::new(config.clone());
    let mut state = SessionState::Disconnected;

    while !shutdown.load(Ordering::Relaxed) {
        state = transition(exchange.name(), state, SessionState::Connecting);
        metrics.record_connect_attempt();

        match run_once(
            &connector,
            &natives,
            &slot_map,
            &region,
            &update_tx,
            &shutdown,
            &config,
            &metrics,
        )
        .await
        {
            Ok(()) => {
                // Clean shutdown requested mid-stream.
                state = transition(exchange.name(), state, SessionState::Shutdown);
                break;
            }
            Err(e) => {
                warn!(exchange = exchange.name(), error = %e, "session_fault");
                metrics.record_reconnection();
                state = transition(exchange.name(), state, SessionState::Disconnected);
            }
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let delay = backoff.next_backoff();
        debug!(exchange = exchange.name(), delay_ms = delay.as_millis() as u64, "reconnect_backoff");
        tokio::time::sleep(delay).await;
    }

    info!(exchange = exchange.name(), summary = %metrics.summary(), "session_stopped");
}

fn transition(exchange: &str, from: SessionState, to: SessionState) -> SessionState {
    common::log_transition(exchange, from, to, "state_machine");
    to
}

#[allow(clippy::too_many_arguments)]
async fn run_once(
    connector: &Arc<dyn ExchangeConnector>,
    natives: &[String],
    slot_map: &HashMap<String, usize>,
    region: &SharedRegion,
    update_tx: &mpsc::Sender<usize>,
    shutdown: &AtomicBool,
    config: &SessionConfig,
    metrics: &SessionMetrics,
) -> Result<(), SessionFault> {
    let exchange = connector.exchange();
    let url = connector
        .prepare(natives)
        .await
        .map_err(SessionFault::Bootstrap)?;

    let (ws_stream, _resp) = tokio::time::timeout(
        Duration::from_millis(config.connect_timeout_ms),
        tokio_tungstenite::connect_async(&url),
    )
    .await
    .map_err(|_| SessionFault::Connect(anyhow::anyhow!("connect timed out")))?
    .map_err(|e| SessionFault::Connect(e.into()))?;

    let (mut write, mut read) = ws_stream.split();

    let sub_messages = connector.subscribe_messages(natives);
    let spacing = connector.subscribe_spacing();
    for msg in sub_messages {
        write
            .send(msg)
            .await
            .map_err(|e| SessionFault::Subscribe(e.into()))?;
        if let Some(d) = spacing {
            tokio::time::sleep(d).await;
        }
    }

    metrics.record_connect_success();
    info!(exchange = exchange.name(), symbols = natives.len(), "session_streaming");

    let mut heartbeat = HeartbeatMonitor::new(config.clone());
    let mut heartbeat_tick = tokio::time::interval(Duration::from_millis(
        (config.stale_data_timeout_ms / 2).max(250),
    ));

    let app_ping = connector.app_ping();
    let mut app_ping_tick = app_ping
        .as_ref()
        .map(|(d, _)| tokio::time::interval(*d));

    loop {
        if shutdown.load(Ordering::Relaxed) {
            let _ = write.close().await;
            return Ok(());
        }

        tokio::select! {
            biased;

            _ = heartbeat_tick.tick() => {
                match heartbeat.check() {
                    HeartbeatAction::SendPing => {
                        write
                            .send(Message::Ping(Vec::new().into()))
                            .await
                            .map_err(SessionFault::Read)?;
                        heartbeat.record_ping_sent();
                    }
                    HeartbeatAction::PongTimeout => {
                        metrics.record_pong_timeout();
                        return Err(SessionFault::PongTimeout);
                    }
                    HeartbeatAction::DataStale => {
                        metrics.record_data_stale();
                        return Err(SessionFault::DataStale);
                    }
                    HeartbeatAction::Ok => {}
                }
            }

            _ = async {
                if let Some(tick) = app_ping_tick.as_mut() {
                    tick.tick().await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {
                if let Some((_, msg)) = &app_ping {
                    write.send(msg.clone()).await.map_err(SessionFault::Read)?;
                }
            }

            frame = read.next() => {
                let frame = match frame {
                    Some(Ok(f)) => f,
                    Some(Err(e)) => return Err(SessionFault::Read(e)),
                    None => return Err(SessionFault::ServerClose),
                };

                match frame {
                    Message::Pong(_) => {
                        heartbeat.record_pong_received();
                        continue;
                    }
                    Message::Close(_) => return Err(SessionFault::ServerClose),
                    Message::Ping(payload) => {
                        write
                            .send(Message::Pong(payload))
                            .await
                            .map_err(SessionFault::Read)?;
                        continue;
                    }
                    _ => {}
                }

                heartbeat.record_data_received();

                match connector.decode(&frame) {
                    FrameOutcome::Update { native_symbol, data } => {
                        metrics.record_frame_decoded();
                        if let Some(&slot) = slot_map.get(&native_symbol) {
                            region.write_ticker(exchange, slot, data);
                            if update_tx.send(slot).await.is_err() {
                                return Err(SessionFault::ChannelClosed);
                            }
                        }
                    }
                    FrameOutcome::Control(Some(reply)) => {
                        write.send(reply).await.map_err(SessionFault::Read)?;
                    }
                    FrameOutcome::Control(None) => {}
                    FrameOutcome::Drop => {
                        metrics.record_frame_dropped();
                    }
                }
            }
        }
    }
}

/// Splits a symbol list into Bybit's 10-symbol-per-connection shards,
/// preserving slot ordering via a group offset (§4.4, §8 scenario 5).
pub fn shard_for_bybit(symbols: &[(usize, String)], shard_size: usize) -> Vec<Vec<(usize, String)>> {
    symbols
        .chunks(shard_size)
        .map(|chunk| chunk.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bybit_25_symbols_shard_into_10_10_5() {
        let symbols: Vec<(usize, String)> = (0..25).map(|i| (i, format!("SYM{i}"))).collect();
        let shards = shard_for_bybit(&symbols, 10);
        assert_eq!(shards.len(), 3);
        assert_eq!(shards[0].len(), 10);
        assert_eq!(shards[1].len(), 10);
        assert_eq!(shards[2].len(), 5);
        assert_eq!(shards[0][0].0, 0);
        assert_eq!(shards[1][0].0, 10);
        assert_eq!(shards[2][0].0, 20);
    }
}
