//! Bybit: `orderbook.1.<sym>` channel, JSON, best bid/ask as `[price, qty]`
//! pairs (§4.4 protocol table). A single connection caps at 10 symbols;
//! sharding into subconnections is handled by the supervisor via
//! [`super::shard_for_bybit`], not by this connector itself — each
//! `BybitConnector` instance only ever sees its own shard's symbols.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;

use crate::error::DecodeError;
use crate::exchange::ExchangeId;
use crate::lattice::TickerData;

use super::{drop_decode, ExchangeConnector, FrameOutcome};

const ENDPOINT: &str = "wss://stream.bybit.com/v5/public/spot";

/// Bybit enforces this cap per connection (§4.4).
pub const MAX_SYMBOLS_PER_CONNECTION: usize = 10;

pub struct BybitConnector;

#[derive(Debug, Deserialize)]
struct Envelope {
    topic: Option<String>,
    data: Option<TickerPayload>,
}

#[derive(Debug, Deserialize)]
struct TickerPayload {
    s: Option<String>,
    b: Option<Vec<Vec<String>>>,
    a: Option<Vec<Vec<String>>>,
}

#[async_trait]
impl ExchangeConnector for BybitConnector {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Bybit
    }

    async fn prepare(&self, _natives: &[String]) -> anyhow::Result<String> {
        Ok(ENDPOINT.to_string())
    }

    fn subscribe_messages(&self, natives: &[String]) -> Vec<Message> {
        let args: Vec<String> = natives
            .iter()
            .map(|s| format!("orderbook.1.{s}"))
            .collect();
        let payload = serde_json::json!({ "op": "subscribe", "args": args });
        vec![Message::text(payload.to_string())]
    }

    fn decode(&self, msg: &Message) -> FrameOutcome {
        let Message::Text(text) = msg else {
            return drop_decode(DecodeError::NotAnUpdate);
        };
        let env = match serde_json::from_str::<Envelope>(text) {
            Ok(env) => env,
            Err(e) => return drop_decode(DecodeError::Json(e)),
        };
        let Some(topic) = env.topic else {
            return drop_decode(DecodeError::MissingField("topic"));
        };
        if !topic.starts_with("orderbook.1.") {
            return drop_decode(DecodeError::NotAnUpdate);
        }
        let Some(data) = env.data else {
            return drop_decode(DecodeError::MissingField("data"));
        };
        let (Some(symbol), Some(b), Some(a)) = (data.s, data.b, data.a) else {
            return drop_decode(DecodeError::MissingField("s/b/a"));
        };
        let Some(best_bid) = b.first() else {
            return drop_decode(DecodeError::MissingField("b[0]"));
        };
        let Some(best_ask) = a.first() else {
            return drop_decode(DecodeError::MissingField("a[0]"));
        };
        let (Some(bid_s), Some(bid_qty_s)) = (best_bid.first(), best_bid.get(1)) else {
            return drop_decode(DecodeError::MissingField("b[0][0..1]"));
        };
        let (Some(ask_s), Some(ask_qty_s)) = (best_ask.first(), best_ask.get(1)) else {
            return drop_decode(DecodeError::MissingField("a[0][0..1]"));
        };
        let (Ok(bid), Ok(bid_qty), Ok(ask), Ok(ask_qty)) = (
            bid_s.parse::<f64>(),
            bid_qty_s.parse::<f64>(),
            ask_s.parse::<f64>(),
            ask_qty_s.parse::<f64>(),
        ) else {
            return drop_decode(DecodeError::BadNumber("b/a price or qty"));
        };
        FrameOutcome::Update {
            native_symbol: symbol,
            data: TickerData {
                bid,
                ask,
                bid_qty,
                ask_qty,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_well_formed_orderbook_update() {
        let connector = BybitConnector;
        let msg = Message::text(
            r#"{"topic":"orderbook.1.BTCUSDT","data":{"s":"BTCUSDT","b":[["60000.0","1.0"]],"a":[["60001.0","1.0"]]}}"#,
        );
        match connector.decode(&msg) {
            FrameOutcome::Update { native_symbol, data } => {
                assert_eq!(native_symbol, "BTCUSDT");
                assert_eq!(data.bid, 60000.0);
            }
            _ => panic!("expected an update"),
        }
    }

    #[test]
    fn empty_bid_array_is_dropped() {
        let connector = BybitConnector;
        let msg = Message::text(
            r#"{"topic":"orderbook.1.BTCUSDT","data":{"s":"BTCUSDT","b":[],"a":[["60001.0","1.0"]]}}"#,
        );
        assert!(matches!(connector.decode(&msg), FrameOutcome::Drop));
    }
}
