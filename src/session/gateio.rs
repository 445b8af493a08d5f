//! Gate.io: `spot.book_ticker` channel, JSON, nested under `result` (§4.4).

use async_trait::async_trait;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;

use crate::error::DecodeError;
use crate::exchange::ExchangeId;
use crate::lattice::TickerData;

use super::{drop_decode, ExchangeConnector, FrameOutcome};

const ENDPOINT: &str = "wss://api.gateio.ws/ws/v4/";

pub struct GateioConnector;

#[derive(Debug, Deserialize)]
struct Envelope {
    event: Option<String>,
    result: Option<ResultPayload>,
}

#[derive(Debug, Deserialize)]
struct ResultPayload {
    s: Option<String>,
    b: Option<String>,
    #[serde(rename = "B")]
    bid_qty: Option<String>,
    a: Option<String>,
    #[serde(rename = "A")]
    ask_qty: Option<String>,
}

#[async_trait]
impl ExchangeConnector for GateioConnector {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Gateio
    }

    async fn prepare(&self, _natives: &[String]) -> anyhow::Result<String> {
        Ok(ENDPOINT.to_string())
    }

    fn subscribe_messages(&self, natives: &[String]) -> Vec<Message> {
        let payload = serde_json::json!({
            "time": chrono::Utc::now().timestamp(),
            "channel": "spot.book_ticker",
            "event": "subscribe",
            "payload": natives,
        });
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
        if env.event.as_deref() != Some("update") {
            return drop_decode(DecodeError::NotAnUpdate);
        }
        let Some(result) = env.result else {
            return drop_decode(DecodeError::MissingField("result"));
        };
        let (Some(symbol), Some(b), Some(bq), Some(a), Some(aq)) =
            (result.s, result.b, result.bid_qty, result.a, result.ask_qty)
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
    fn decodes_an_update_event() {
        let connector = GateioConnector;
        let msg = Message::text(
            r#"{"event":"update","result":{"s":"BTC_USDT","b":"60000.0","B":"1.0","a":"60001.0","A":"1.0"}}"#,
        );
        match connector.decode(&msg) {
            FrameOutcome::Update { native_symbol, .. } => assert_eq!(native_symbol, "BTC_USDT"),
            _ => panic!("expected an update"),
        }
    }

    #[test]
    fn subscribe_ack_is_dropped() {
        let connector = GateioConnector;
        let msg = Message::text(r#"{"event":"subscribe"}"#);
        assert!(matches!(connector.decode(&msg), FrameOutcome::Drop));
    }
}
