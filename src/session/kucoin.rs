//! Kucoin: two-step bootstrap (HTTP POST for a token + endpoint), one
//! subscribe message per symbol spaced ~200ms, and a background
//! application-level ping at 90% of the server-given `pingInterval`
//! (§4.4). The bootstrap runs in [`ExchangeConnector::prepare`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;

use crate::error::DecodeError;
use crate::exchange::ExchangeId;
use crate::lattice::TickerData;

use super::{drop_decode, ExchangeConnector, FrameOutcome};

const BULLET_PUBLIC_URL: &str = "https://api.kucoin.com/api/v1/bullet-public";

#[derive(Debug, Deserialize)]
struct BulletResponse {
    code: String,
    data: Option<BulletData>,
}

#[derive(Debug, Deserialize)]
struct BulletData {
    token: String,
    #[serde(rename = "instanceServers")]
    instance_servers: Vec<InstanceServer>,
}

#[derive(Debug, Deserialize)]
struct InstanceServer {
    endpoint: String,
    #[serde(rename = "pingInterval")]
    ping_interval: u64,
}

#[derive(Debug, Deserialize)]
struct TickerMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    topic: Option<String>,
    data: Option<KucoinTickerPayload>,
}

#[derive(Debug, Deserialize)]
struct KucoinTickerPayload {
    #[serde(rename = "bestBid")]
    best_bid: Option<String>,
    #[serde(rename = "bestBidSize")]
    best_bid_size: Option<String>,
    #[serde(rename = "bestAsk")]
    best_ask: Option<String>,
    #[serde(rename = "bestAskSize")]
    best_ask_size: Option<String>,
}

pub struct KucoinConnector {
    ping_interval_ms: AtomicU64,
}

impl Default for KucoinConnector {
    fn default() -> Self {
        Self {
            ping_interval_ms: AtomicU64::new(18_000),
        }
    }
}

#[async_trait]
impl ExchangeConnector for KucoinConnector {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Kucoin
    }

    async fn prepare(&self, _natives: &[String]) -> anyhow::Result<String> {
        let client = reqwest::Client::new();
        let resp: BulletResponse = client
            .post(BULLET_PUBLIC_URL)
            .send()
            .await?
            .json()
            .await?;
        anyhow::ensure!(resp.code == "200000", "bullet-public returned code {}", resp.code);
        let data = resp
            .data
            .ok_or_else(|| anyhow::anyhow!("bullet-public response missing data"))?;
        let server = data
            .instance_servers
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("bullet-public response has no instance servers"))?;

        self.ping_interval_ms
            .store(server.ping_interval, Ordering::Relaxed);

        Ok(format!("{}?token={}", server.endpoint, data.token))
    }

    fn subscribe_messages(&self, natives: &[String]) -> Vec<Message> {
        natives
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let payload = serde_json::json!({
                    "id": i,
                    "type": "subscribe",
                    "topic": format!("/market/ticker:{s}"),
                    "privateChannel": false,
                    "response": true,
                });
                Message::text(payload.to_string())
            })
            .collect()
    }

    fn subscribe_spacing(&self) -> Option<Duration> {
        Some(Duration::from_millis(200))
    }

    fn decode(&self, msg: &Message) -> FrameOutcome {
        let Message::Text(text) = msg else {
            return drop_decode(DecodeError::NotAnUpdate);
        };
        let tm = match serde_json::from_str::<TickerMessage>(text) {
            Ok(tm) => tm,
            Err(e) => return drop_decode(DecodeError::Json(e)),
        };
        if tm.kind.as_deref() != Some("message") {
            return drop_decode(DecodeError::NotAnUpdate);
        }
        let Some(topic) = tm.topic else {
            return drop_decode(DecodeError::MissingField("topic"));
        };
        let Some(symbol) = topic.strip_prefix("/market/ticker:") else {
            return drop_decode(DecodeError::NotAnUpdate);
        };
        let Some(data) = tm.data else {
            return drop_decode(DecodeError::MissingField("data"));
        };
        let (Some(bid), Some(bid_qty), Some(ask), Some(ask_qty)) =
            (data.best_bid, data.best_bid_size, data.best_ask, data.best_ask_size)
        else {
            return drop_decode(DecodeError::MissingField(
                "bestBid/bestBidSize/bestAsk/bestAskSize",
            ));
        };
        let (Ok(bid), Ok(bid_qty), Ok(ask), Ok(ask_qty)) = (
            bid.parse::<f64>(),
            bid_qty.parse::<f64>(),
            ask.parse::<f64>(),
            ask_qty.parse::<f64>(),
        ) else {
            return drop_decode(DecodeError::BadNumber("bestBid/bestAsk"));
        };
        FrameOutcome::Update {
            native_symbol: symbol.to_string(),
            data: TickerData {
                bid,
                ask,
                bid_qty,
                ask_qty,
            },
        }
    }

    fn app_ping(&self) -> Option<(Duration, Message)> {
        let interval = self.ping_interval_ms.load(Ordering::Relaxed);
        let spacing = Duration::from_millis((interval * 9) / 10);
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let payload = serde_json::json!({ "id": now_ms, "type": "ping" });
        Some((spacing, Message::text(payload.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_ticker_message() {
        let connector = KucoinConnector::default();
        let msg = Message::text(
            r#"{"type":"message","topic":"/market/ticker:BTC-USDT","data":{"bestBid":"60000.0","bestBidSize":"1.0","bestAsk":"60001.0","bestAskSize":"1.0"}}"#,
        );
        match connector.decode(&msg) {
            FrameOutcome::Update { native_symbol, .. } => assert_eq!(native_symbol, "BTC-USDT"),
            _ => panic!("expected an update"),
        }
    }

    #[test]
    fn welcome_message_is_dropped() {
        let connector = KucoinConnector::default();
        let msg = Message::text(r#"{"type":"welcome","id":"abc"}"#);
        assert!(matches!(connector.decode(&msg), FrameOutcome::Drop));
    }

    #[test]
    fn app_ping_spacing_is_90_percent_of_interval() {
        let connector = KucoinConnector::default();
        connector.ping_interval_ms.store(10_000, Ordering::Relaxed);
        let (spacing, _) = connector.app_ping().unwrap();
        assert_eq!(spacing, Duration::from_millis(9_000));
    }
}
