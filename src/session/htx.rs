//! HTX: gzip-wrapped JSON `market.<sym>.bbo` channel. Every binary frame
//! must be decompressed first; a `{"ping": N}` control frame is answered
//! with `{"pong": N}` in-band and never reaches the lattice (§4.4).

use std::io::Read;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;

use crate::error::DecodeError;
use crate::exchange::ExchangeId;
use crate::lattice::TickerData;

use super::{drop_decode, ExchangeConnector, FrameOutcome};

const ENDPOINT: &str = "wss://api-aws.huobi.pro/ws";

pub struct HtxConnector;

#[derive(Debug, Deserialize)]
struct Envelope {
    ping: Option<i64>,
    ch: Option<String>,
    tick: Option<Tick>,
}

#[derive(Debug, Deserialize)]
struct Tick {
    symbol: Option<String>,
    bid: Option<f64>,
    #[serde(rename = "bidSize")]
    bid_size: Option<f64>,
    ask: Option<f64>,
    #[serde(rename = "askSize")]
    ask_size: Option<f64>,
}

fn gunzip(bytes: &[u8]) -> std::io::Result<String> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = String::new();
    decoder.read_to_string(&mut out)?;
    Ok(out)
}

#[async_trait]
impl ExchangeConnector for HtxConnector {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Htx
    }

    async fn prepare(&self, _natives: &[String]) -> anyhow::Result<String> {
        Ok(ENDPOINT.to_string())
    }

    fn subscribe_messages(&self, natives: &[String]) -> Vec<Message> {
        natives
            .iter()
            .map(|s| {
                let payload = serde_json::json!({ "sub": format!("market.{s}.bbo"), "id": s });
                Message::text(payload.to_string())
            })
            .collect()
    }

    fn decode(&self, msg: &Message) -> FrameOutcome {
        let bytes: &[u8] = match msg {
            Message::Binary(b) => b,
            _ => return drop_decode(DecodeError::NotAnUpdate),
        };
        let text = match gunzip(bytes) {
            Ok(text) => text,
            Err(e) => return drop_decode(DecodeError::Gzip(e)),
        };
        let env = match serde_json::from_str::<Envelope>(&text) {
            Ok(env) => env,
            Err(e) => return drop_decode(DecodeError::Json(e)),
        };

        if let Some(ts) = env.ping {
            let pong = serde_json::json!({ "pong": ts }).to_string();
            return FrameOutcome::Control(Some(Message::text(pong)));
        }

        if env.ch.is_none() {
            return drop_decode(DecodeError::NotAnUpdate);
        }
        let Some(tick) = env.tick else {
            return drop_decode(DecodeError::MissingField("tick"));
        };
        let (Some(symbol), Some(bid), Some(bid_qty), Some(ask), Some(ask_qty)) =
            (tick.symbol, tick.bid, tick.bid_size, tick.ask, tick.ask_size)
        else {
            return drop_decode(DecodeError::MissingField("symbol/bid/bidSize/ask/askSize"));
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
    use std::io::Write;

    fn gzip(text: &str) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(text.as_bytes()).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn ping_frame_yields_a_pong_control_reply_and_no_update() {
        let connector = HtxConnector;
        let payload = gzip(r#"{"ping": 12345}"#);
        match connector.decode(&Message::binary(payload)) {
            FrameOutcome::Control(Some(Message::Text(t))) => {
                assert!(t.as_str().contains("12345"));
                assert!(t.as_str().contains("pong"));
            }
            _ => panic!("expected a pong control reply"),
        }
    }

    #[test]
    fn bbo_tick_yields_an_update() {
        let connector = HtxConnector;
        let payload = gzip(
            r#"{"ch":"market.btcusdt.bbo","tick":{"symbol":"btcusdt","bid":60000.0,"bidSize":1.0,"ask":60001.0,"askSize":1.0}}"#,
        );
        match connector.decode(&Message::binary(payload)) {
            FrameOutcome::Update { native_symbol, data } => {
                assert_eq!(native_symbol, "btcusdt");
                assert_eq!(data.bid, 60000.0);
            }
            _ => panic!("expected an update"),
        }
    }

    #[test]
    fn text_frames_are_dropped() {
        let connector = HtxConnector;
        assert!(matches!(
            connector.decode(&Message::text("not gzip")),
            FrameOutcome::Drop
        ));
    }
}
