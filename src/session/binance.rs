//! Binance: single socket, single subscribe message, JSON book-ticker
//! stream (§4.4, protocol table). Endpoint carries no symbol list —
//! Binance pushes bookTicker for every stream named in the subscribe.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;

use crate::error::DecodeError;
use crate::exchange::ExchangeId;
use crate::lattice::TickerData;

use super::{drop_decode, ExchangeConnector, FrameOutcome};

const ENDPOINT: &str = "wss://stream.binance.com:9443/ws";

pub struct BinanceConnector;

#[derive(Debug, Deserialize)]
struct BookTicker {
    s: Option<String>,
    b: Option<String>,
    #[serde(rename = "B")]
    bid_qty: Option<String>,
    a: Option<String>,
    #[serde(rename = "A")]
    ask_qty: Option<String>,
}

#[async_trait]
impl ExchangeConnector for BinanceConnector {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Binance
    }

    async fn prepare(&self, _natives: &[String]) -> anyhow::Result<String> {
        Ok(ENDPOINT.to_string())
    }

    fn subscribe_messages(&self, natives: &[String]) -> Vec<Message> {
        let streams: Vec<String> = natives
            .iter()
            .map(|s| format!("{}@bookTicker", s.to_lowercase()))
            .collect();
        let payload = serde_json::json!({
            "method": "SUBSCRIBE",
            "params": streams,
            "id": 1,
        });
        vec![Message::text(payload.to_string())]
    }

    fn decode(&self, msg: &Message) -> FrameOutcome {
        let Message::Text(text) = msg else {
            return drop_decode(DecodeError::NotAnUpdate);
        };
        let tick = match serde_json::from_str::<BookTicker>(text) {
            Ok(tick) => tick,
            Err(e) => return drop_decode(DecodeError::Json(e)),
        };
        let (Some(symbol), Some(b), Some(bq), Some(a), Some(aq)) =
            (tick.s, tick.b, tick.bid_qty, tick.a, tick.ask_qty)
        else {
            return drop_decode(DecodeError::MissingField("s/b/B/a/A"));
        };
        let (Ok(bid), Ok(bid_qty), Ok(ask), Ok(ask_qty)) = (
            b.parse::<f64>(),
            bq.parse::<f64>(),
            a.parse::<f64>(),
            aq.parse::<f64>(),
        ) else {
            return drop_decode(DecodeError::BadNumber("b/B/a/A"));
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
    fn decodes_a_well_formed_book_ticker() {
        let connector = BinanceConnector;
        let msg = Message::text(
            r#"{"u":1,"s":"BTCUSDT","b":"60000.00","B":"1.0","a":"60001.00","A":"1.0"}"#,
        );
        match connector.decode(&msg) {
            FrameOutcome::Update { native_symbol, data } => {
                assert_eq!(native_symbol, "BTCUSDT");
                assert_eq!(data.bid, 60000.0);
                assert_eq!(data.ask, 60001.0);
            }
            _ => panic!("expected an update"),
        }
    }

    #[test]
    fn missing_symbol_is_dropped() {
        let connector = BinanceConnector;
        let msg = Message::text(r#"{"b":"60000.00","a":"60001.00"}"#);
        assert!(matches!(connector.decode(&msg), FrameOutcome::Drop));
    }
}
