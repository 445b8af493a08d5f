//! Mexc: protobuf framing, `spot@public.aggre.bookTicker.v3.api.pb@10ms@<SYMBOL>`
//! subscription channel (§4.4). Each inbound binary WS frame is one
//! complete, self-delimited `PushDataV3ApiWrapper` message — the
//! websocket frame boundary supplies the length delimiting, so no extra
//! varint prefix is stripped here.

use async_trait::async_trait;
use prost::Message as ProstMessage;
use tokio_tungstenite::tungstenite::Message;

use crate::error::DecodeError;
use crate::exchange::ExchangeId;
use crate::lattice::TickerData;

use super::{drop_decode, ExchangeConnector, FrameOutcome};

const ENDPOINT: &str = "wss://wbs-api.mexc.com/ws";

mod mexc_proto {
    include!(concat!(env!("OUT_DIR"), "/mexc.rs"));
}
use mexc_proto::PushDataV3ApiWrapper;

pub struct MexcConnector;

#[async_trait]
impl ExchangeConnector for MexcConnector {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Mexc
    }

    async fn prepare(&self, _natives: &[String]) -> anyhow::Result<String> {
        Ok(ENDPOINT.to_string())
    }

    fn subscribe_messages(&self, natives: &[String]) -> Vec<Message> {
        let params: Vec<String> = natives
            .iter()
            .map(|s| format!("spot@public.aggre.bookTicker.v3.api.pb@10ms@{s}"))
            .collect();
        let payload = serde_json::json!({ "method": "SUBSCRIPTION", "params": params });
        vec![Message::text(payload.to_string())]
    }

    fn decode(&self, msg: &Message) -> FrameOutcome {
        let bytes: &[u8] = match msg {
            Message::Binary(b) => b,
            _ => return drop_decode(DecodeError::NotAnUpdate),
        };
        let wrapper = match PushDataV3ApiWrapper::decode(bytes) {
            Ok(wrapper) => wrapper,
            Err(e) => return drop_decode(DecodeError::Protobuf(e)),
        };
        let Some(book) = wrapper.public_aggre_book_ticker else {
            return drop_decode(DecodeError::NotAnUpdate);
        };
        if wrapper.symbol.is_empty() {
            return drop_decode(DecodeError::MissingField("symbol"));
        }
        let (Ok(bid), Ok(bid_qty), Ok(ask), Ok(ask_qty)) = (
            book.bid_price.parse::<f64>(),
            book.bid_quantity.parse::<f64>(),
            book.ask_price.parse::<f64>(),
            book.ask_quantity.parse::<f64>(),
        ) else {
            return drop_decode(DecodeError::BadNumber("bid_price/ask_price"));
        };
        FrameOutcome::Update {
            native_symbol: wrapper.symbol,
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
    fn decodes_a_well_formed_wrapper() {
        let connector = MexcConnector;
        let wrapper = PushDataV3ApiWrapper {
            channel: "spot@public.aggre.bookTicker.v3.api.pb@10ms@BTCUSDT".to_string(),
            symbol: "BTCUSDT".to_string(),
            public_aggre_book_ticker: Some(mexc_proto::PublicAggreBookTicker {
                bid_price: "60000.0".to_string(),
                bid_quantity: "1.0".to_string(),
                ask_price: "60001.0".to_string(),
                ask_quantity: "1.0".to_string(),
            }),
        };
        let bytes = wrapper.encode_to_vec();
        match connector.decode(&Message::binary(bytes)) {
            FrameOutcome::Update { native_symbol, data } => {
                assert_eq!(native_symbol, "BTCUSDT");
                assert_eq!(data.bid, 60000.0);
            }
            _ => panic!("expected an update"),
        }
    }

    #[test]
    fn missing_book_ticker_payload_is_dropped() {
        let connector = MexcConnector;
        let wrapper = PushDataV3ApiWrapper {
            channel: "spot@public.deals.v3.api.pb@BTCUSDT".to_string(),
            symbol: "BTCUSDT".to_string(),
            public_aggre_book_ticker: None,
        };
        let bytes = wrapper.encode_to_vec();
        assert!(matches!(
            connector.decode(&Message::binary(bytes)),
            FrameOutcome::Drop
        ));
    }
}
