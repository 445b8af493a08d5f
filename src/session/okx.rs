//! OKX: `bbo-tbt` channel, JSON, `data[0].bids[0][0]`/`asks[0][0]` price
//! levels (§4.4 protocol table).

use async_trait::async_trait;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;

use crate::error::DecodeError;
use crate::exchange::ExchangeId;
use crate::lattice::TickerData;

use super::{drop_decode, ExchangeConnector, FrameOutcome};

const ENDPOINT: &str = "wss://ws.okx.com:8443/ws/v5/public";

pub struct OkxConnector;

#[derive(Debug, Deserialize)]
struct Envelope {
    arg: Option<Arg>,
    data: Option<Vec<Level>>,
}

#[derive(Debug, Deserialize)]
struct Arg {
    #[serde(rename = "instId")]
    inst_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Level {
    bids: Vec<Vec<String>>,
    asks: Vec<Vec<String>>,
}

#[async_trait]
impl ExchangeConnector for OkxConnector {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Okx
    }

    async fn prepare(&self, _natives: &[String]) -> anyhow::Result<String> {
        Ok(ENDPOINT.to_string())
    }

    fn subscribe_messages(&self, natives: &[String]) -> Vec<Message> {
        let args: Vec<_> = natives
            .iter()
            .map(|s| serde_json::json!({ "channel": "bbo-tbt", "instId": s }))
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
        let Some(inst_id) = env.arg.and_then(|a| a.inst_id) else {
            return drop_decode(DecodeError::MissingField("arg.instId"));
        };
        let Some(level) = env.data.and_then(|d| d.into_iter().next()) else {
            return drop_decode(DecodeError::MissingField("data[0]"));
        };
        let (Some(bid_row), Some(ask_row)) = (level.bids.first(), level.asks.first()) else {
            return drop_decode(DecodeError::MissingField("bids[0]/asks[0]"));
        };
        let (Some(bid_s), Some(bid_qty_s)) = (bid_row.first(), bid_row.get(1)) else {
            return drop_decode(DecodeError::MissingField("bids[0][0..1]"));
        };
        let (Some(ask_s), Some(ask_qty_s)) = (ask_row.first(), ask_row.get(1)) else {
            return drop_decode(DecodeError::MissingField("asks[0][0..1]"));
        };
        let (Ok(bid), Ok(bid_qty), Ok(ask), Ok(ask_qty)) = (
            bid_s.parse::<f64>(),
            bid_qty_s.parse::<f64>(),
            ask_s.parse::<f64>(),
            ask_qty_s.parse::<f64>(),
        ) else {
            return drop_decode(DecodeError::BadNumber("bids/asks"));
        };
        FrameOutcome::Update {
            native_symbol: inst_id,
            data: TickerData {
                bid,
                ask,
                bid_qty,
                ask_qty,
            },
        }
    }
}
