//! Coinbase: `ticker` channel, JSON, flat top-level fields (§4.4).

use async_trait::async_trait;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;

use crate::error::DecodeError;
use crate::exchange::ExchangeId;
use crate::lattice::TickerData;

use super::{drop_decode, ExchangeConnector, FrameOutcome};

const ENDPOINT: &str = "wss://ws-feed.exchange.coinbase.com";

pub struct CoinbaseConnector;

#[derive(Debug, Deserialize)]
struct TickerEvent {
    #[serde(rename = "type")]
    kind: String,
    product_id: Option<String>,
    best_bid: Option<String>,
    best_bid_size: Option<String>,
    best_ask: Option<String>,
    best_ask_size: Option<String>,
}

#[async_trait]
impl ExchangeConnector for CoinbaseConnector {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Coinbase
    }

    async fn prepare(&self, _natives: &[String]) -> anyhow::Result<String> {
        Ok(ENDPOINT.to_string())
    }

    fn subscribe_messages(&self, natives: &[String]) -> Vec<Message> {
        let payload = serde_json::json!({
            "type": "subscribe",
            "product_ids": natives,
            "channels": ["ticker"],
        });
        vec![Message::text(payload.to_string())]
    }

    fn decode(&self, msg: &Message) -> FrameOutcome {
        let Message::Text(text) = msg else {
            return drop_decode(DecodeError::NotAnUpdate);
        };
        let ev = match serde_json::from_str::<TickerEvent>(text) {
            Ok(ev) => ev,
            Err(e) => return drop_decode(DecodeError::Json(e)),
        };
        if ev.kind != "ticker" {
            return drop_decode(DecodeError::NotAnUpdate);
        }
        let (Some(product_id), Some(bid), Some(bid_qty), Some(ask), Some(ask_qty)) = (
            ev.product_id,
            ev.best_bid,
            ev.best_bid_size,
            ev.best_ask,
            ev.best_ask_size,
        ) else {
            return drop_decode(DecodeError::MissingField(
                "product_id/best_bid/best_bid_size/best_ask/best_ask_size",
            ));
        };
        let (Ok(bid), Ok(bid_qty), Ok(ask), Ok(ask_qty)) = (
            bid.parse::<f64>(),
            bid_qty.parse::<f64>(),
            ask.parse::<f64>(),
            ask_qty.parse::<f64>(),
        ) else {
            return drop_decode(DecodeError::BadNumber("best_bid/best_ask"));
        };
        FrameOutcome::Update {
            native_symbol: product_id,
            data: TickerData {
                bid,
                ask,
                bid_qty,
                ask_qty,
            },
        }
    }
}
