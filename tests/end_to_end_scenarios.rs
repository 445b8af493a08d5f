//! End-to-end scenarios (§8): drives the lattice, index engine, and
//! roster together the way the supervisor would, without opening any
//! real sockets.

use exchange_price_index::exchange::ExchangeId;
use exchange_price_index::index::{IndexEngine, WeightMatrix};
use exchange_price_index::lattice::{MAX_SYMBOLS, TickerData};
use exchange_price_index::roster::Roster;
use exchange_price_index::session::bybit;
use exchange_price_index::session::shard_for_bybit;
use exchange_price_index::shm::SharedRegion;
use std::sync::Arc;

fn sample_roster_rows() -> Vec<Vec<String>> {
    vec![
        vec!["BTCUSDT".into(), "ETHUSDT".into()],
        vec!["BTCUSDT".into(), "ETHUSDT".into()],
        vec!["BTC-USD".into(), "ETH-USD".into()],
        vec!["BTC_USDT".into(), "ETH_USDT".into()],
        vec!["btcusdt".into(), "ethusdt".into()],
        vec!["BTC-USDT".into(), "ETH-USDT".into()],
        vec!["BTCUSDT".into(), "ETHUSDT".into()],
        vec!["BTC-USDT".into(), "ETH-USDT".into()],
    ]
}

#[test]
fn cold_start_every_slot_is_nan() {
    let dir = tempfile::tempdir().unwrap();
    let region = SharedRegion::create(dir.path().join("shm.data")).unwrap();

    for slot in 0..MAX_SYMBOLS {
        assert!(region.read_index(slot).val.is_nan());
        for ex in ExchangeId::ALL {
            assert!(region.read_ticker(ex, slot).bid.is_nan());
        }
    }
}

#[tokio::test]
async fn single_binance_update_yields_its_mid_price() {
    let dir = tempfile::tempdir().unwrap();
    let region = Arc::new(SharedRegion::create(dir.path().join("shm.data")).unwrap());
    let roster = Roster::from_rows(sample_roster_rows()).unwrap();
    let weights = Arc::new(WeightMatrix::new_default(roster.num_slots));
    let (_tx, rx) = tokio::sync::mpsc::channel(16);
    let engine = IndexEngine::new(region.clone(), weights, rx);

    region.write_ticker(
        ExchangeId::Binance,
        0,
        TickerData {
            bid: 60000.0,
            ask: 60001.0,
            bid_qty: 1.0,
            ask_qty: 1.0,
        },
    );
    engine.recompute(0);

    let idx = region.read_index(0);
    assert_eq!(idx.val, 60000.5);
    assert_eq!(idx.count, 1);
    assert_eq!(idx.bid_vwap, 60000.0);
    assert_eq!(idx.ask_vwap, 60001.0);
}

#[tokio::test]
async fn two_venues_weighted_composite_matches_worked_example() {
    let dir = tempfile::tempdir().unwrap();
    let region = Arc::new(SharedRegion::create(dir.path().join("shm.data")).unwrap());
    let roster = Roster::from_rows(sample_roster_rows()).unwrap();
    let weights = Arc::new(WeightMatrix::new_default(roster.num_slots));
    let (_tx, rx) = tokio::sync::mpsc::channel(16);
    let engine = IndexEngine::new(region.clone(), weights, rx);

    region.write_ticker(
        ExchangeId::Binance,
        0,
        TickerData {
            bid: 60000.0,
            ask: 60001.0,
            bid_qty: 1.0,
            ask_qty: 1.0,
        },
    );
    region.write_ticker(
        ExchangeId::Okx,
        0,
        TickerData {
            bid: 60002.0,
            ask: 60003.0,
            bid_qty: 1.0,
            ask_qty: 1.0,
        },
    );
    engine.recompute(0);

    let idx = region.read_index(0);
    let expected = (60000.5 * 0.40 + 60002.5 * 0.05) / 0.45;
    assert!((idx.val - expected).abs() < 1e-9);
    assert_eq!(idx.count, 2);
    assert_eq!(idx.bid_vwap, 60001.0);
    assert_eq!(idx.ask_vwap, 60002.0);
}

#[test]
fn htx_ping_decodes_to_a_pong_control_frame_not_an_update() {
    use exchange_price_index::session::{htx::HtxConnector, ExchangeConnector, FrameOutcome};
    use std::io::Write;
    use tokio_tungstenite::tungstenite::Message;

    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(br#"{"ping": 12345}"#).unwrap();
    let payload = enc.finish().unwrap();

    let connector = HtxConnector;
    match connector.decode(&Message::binary(payload)) {
        FrameOutcome::Control(Some(Message::Text(t))) => {
            assert!(t.as_str().contains("pong"));
            assert!(t.as_str().contains("12345"));
        }
        _ => panic!("expected a pong control frame"),
    }
}

#[test]
fn bybit_25_symbol_roster_shards_into_three_connections_with_slot_offsets() {
    let symbols: Vec<(usize, String)> = (0..25).map(|i| (i, format!("SYM{i}"))).collect();
    let shards = shard_for_bybit(&symbols, bybit::MAX_SYMBOLS_PER_CONNECTION);

    assert_eq!(shards.len(), 3);
    assert_eq!(shards[0].iter().map(|(s, _)| *s).collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());
    assert_eq!(shards[1].iter().map(|(s, _)| *s).collect::<Vec<_>>(), (10..20).collect::<Vec<_>>());
    assert_eq!(shards[2].iter().map(|(s, _)| *s).collect::<Vec<_>>(), (20..25).collect::<Vec<_>>());
}

#[test]
fn persistence_tick_only_includes_finite_slots_with_canonical_names() {
    let dir = tempfile::tempdir().unwrap();
    let region = SharedRegion::create(dir.path().join("shm.data")).unwrap();
    let roster = Roster::from_rows(sample_roster_rows()).unwrap();

    region.write_ticker(
        ExchangeId::Binance,
        0,
        TickerData {
            bid: 60000.0,
            ask: 60001.0,
            bid_qty: 1.0,
            ask_qty: 1.0,
        },
    );
    let weights = Arc::new(WeightMatrix::new_default(roster.num_slots));
    let (_tx, rx) = tokio::sync::mpsc::channel(1);
    let region = Arc::new(region);
    let engine = IndexEngine::new(region.clone(), weights, rx);
    engine.recompute(0);
    engine.recompute(1);

    assert!(region.read_index(0).val.is_finite());
    assert!(region.read_index(1).val.is_nan());
    assert_eq!(roster.canonical(0), Some("BTCUSDT"));
}
