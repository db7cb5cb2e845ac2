//! Multiplexer integration tests.
//!
//! The multiplexer is driven through a channel-backed `FrameSink`: every
//! frame it writes lands on an mpsc receiver, and inbound traffic is fed
//! straight into `handle_frame`. Notification payloads come from
//! `fixtures/notifications/`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use solrpc_core::{Commitment, Encoding, JsonRpcRequest, TransportError};
use solrpc_ws::{
    json_decoder, FrameSink, Multiplexer, SubscriptionError, SubscriptionId, SubscriptionState,
    SyndicaTransactionParams, TransactionSubscribeFilter, TransactionSubscribeOpts,
    WsClientConfig,
};

// ─── Helpers ──────────────────────────────────────────────────────────────────

struct ChannelSink(mpsc::UnboundedSender<String>);

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        self.0.send(frame).map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&self) {}
}

/// A sink whose writes always fail.
struct BrokenSink;

#[async_trait]
impl FrameSink for BrokenSink {
    async fn send_frame(&self, _frame: String) -> Result<(), TransportError> {
        Err(TransportError::Other("socket write failed".into()))
    }

    async fn close(&self) {}
}

fn harness() -> (Multiplexer, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let config = WsClientConfig {
        request_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    (Multiplexer::new(Arc::new(ChannelSink(tx)), &config), rx)
}

/// Wait for the next outgoing request and answer it with `result`.
/// Returns the request as sent.
async fn respond(
    mux: &Multiplexer,
    sent: &mut mpsc::UnboundedReceiver<String>,
    result: Value,
) -> Value {
    let frame = sent.recv().await.expect("no request sent");
    let req: Value = serde_json::from_str(&frame).expect("request is not JSON");
    mux.handle_frame(&json!({ "jsonrpc": "2.0", "result": result, "id": req["id"] }).to_string());
    req
}

fn notification(subscription: impl Into<Value>, result: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": "transactionNotification",
        "params": { "subscription": subscription.into(), "result": result }
    })
    .to_string()
}

fn tx_payload(slot: u64, signature: &str) -> Value {
    json!({ "transaction": { "transaction": ["AQ==", "base64"] }, "slot": slot, "signature": signature })
}

fn fixture_path(name: &str) -> std::path::PathBuf {
    let mut p = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    p.push("../../fixtures/notifications");
    p.push(name);
    p
}

fn load_fixture(name: &str) -> Value {
    let content = std::fs::read_to_string(fixture_path(name)).expect("fixture not found");
    serde_json::from_str(&content).expect("invalid fixture JSON")
}

// ─── Subscribe requests ───────────────────────────────────────────────────────

#[tokio::test]
async fn signature_filter_is_sent_sparse() {
    let (mux, mut sent) = harness();
    let filter = TransactionSubscribeFilter::signature("sig1");

    let (sub, req) = tokio::join!(
        mux.transaction_subscribe(&filter, None),
        respond(&mux, &mut sent, json!(11)),
    );

    assert_eq!(req["method"], "transactionSubscribe");
    assert_eq!(req["params"], json!([{ "signature": "sig1" }]));
    assert_eq!(sub.unwrap().id(), &SubscriptionId::Number(11));
}

#[tokio::test]
async fn options_are_sent_second() {
    let (mux, mut sent) = harness();
    let filter = TransactionSubscribeFilter::account_include(["abc"]);
    let opts = TransactionSubscribeOpts {
        commitment: Some(Commitment::Confirmed),
        encoding: Some(Encoding::Base58),
        ..Default::default()
    };

    let (sub, req) = tokio::join!(
        mux.transaction_subscribe(&filter, Some(&opts)),
        respond(&mux, &mut sent, json!(12)),
    );

    sub.unwrap();
    assert_eq!(
        req["params"],
        json!([
            { "accountInclude": ["abc"] },
            { "commitment": "confirmed", "encoding": "base58" }
        ])
    );
}

#[tokio::test]
async fn disallowed_encoding_sends_nothing() {
    let (mux, mut sent) = harness();
    let opts = TransactionSubscribeOpts {
        encoding: Some(Encoding::JsonParsed),
        ..Default::default()
    };

    let err = mux
        .transaction_subscribe(&TransactionSubscribeFilter::default(), Some(&opts))
        .await
        .unwrap_err();

    assert!(matches!(err, SubscriptionError::Validation(_)));
    assert!(sent.try_recv().is_err());
    assert_eq!(mux.subscription_count(), 0);
}

#[tokio::test]
async fn missing_provider_params_send_nothing() {
    let (mux, mut sent) = harness();

    let err = mux.syndica_transaction_subscribe(None).await.unwrap_err();
    assert!(matches!(err, SubscriptionError::Validation(_)));

    let err = mux
        .syndica_transaction_subscribe(Some(&SyndicaTransactionParams::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, SubscriptionError::Validation(_)));

    assert!(sent.try_recv().is_err());
}

#[tokio::test]
async fn provider_params_are_named() {
    let (mux, mut sent) = harness();
    let params = SyndicaTransactionParams::new("solana-mainnet").exclude_votes(true);

    let (sub, req) = tokio::join!(
        mux.syndica_transaction_subscribe(Some(&params)),
        respond(&mux, &mut sent, json!("stream-1")),
    );

    assert_eq!(req["method"], "chainstream.transactionsSubscribe");
    assert_eq!(req["params"]["network"], "solana-mainnet");
    assert_eq!(req["params"]["filter"]["excludeVotes"], true);
    assert_eq!(sub.unwrap().id(), &SubscriptionId::String("stream-1".into()));
}

// ─── Delivery ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn account_include_end_to_end() {
    let (mux, mut sent) = harness();
    let f = load_fixture("transaction-wrapped.json");
    let filter = TransactionSubscribeFilter::account_include(["abc"]);

    let (sub, req) = tokio::join!(
        mux.transaction_subscribe(&filter, None),
        respond(&mux, &mut sent, f["subscriptionId"].clone()),
    );
    assert_eq!(req["params"], json!([{ "accountInclude": ["abc"] }]));
    let mut sub = sub.unwrap();

    mux.handle_frame(&f["frame"].to_string());

    let res = sub.recv().await.unwrap();
    assert_eq!(res.slot, f["expectedSlot"].as_u64().unwrap());
    assert_eq!(res.signature, f["expectedSignature"].as_str().unwrap());
    let tx = res.transaction.expect("transaction missing");
    assert_eq!(tx.encoded().unwrap().1.as_str(), f["expectedEncoding"].as_str().unwrap());
}

#[tokio::test]
async fn bare_payload_end_to_end() {
    let (mux, mut sent) = harness();
    let f = load_fixture("transaction-bare.json");

    let filter = TransactionSubscribeFilter::default();
    let (sub, _) = tokio::join!(
        mux.transaction_subscribe(&filter, None),
        respond(&mux, &mut sent, f["subscriptionId"].clone()),
    );
    let mut sub = sub.unwrap();

    mux.handle_frame(&f["frame"].to_string());

    let res = sub.response().await.unwrap();
    assert_eq!(res.slot, f["expectedSlot"].as_u64().unwrap());
    assert_eq!(res.signature, f["expectedSignature"].as_str().unwrap());
    assert!(res.is_failed());
}

#[tokio::test]
async fn chainstream_end_to_end() {
    let (mux, mut sent) = harness();
    let f = load_fixture("chainstream-transaction.json");
    let params = SyndicaTransactionParams::new("solana-mainnet");

    let (sub, _) = tokio::join!(
        mux.syndica_transaction_subscribe(Some(&params)),
        respond(&mux, &mut sent, f["subscriptionId"].clone()),
    );
    let mut sub = sub.unwrap();

    mux.handle_frame(&f["frame"].to_string());

    let res = sub.recv().await.unwrap();
    assert_eq!(res.context.index, f["expectedIndex"].as_u64().unwrap());
    assert_eq!(res.context.signature, f["expectedSignature"].as_str().unwrap());
    assert!(res.context.node_time.is_some());
    assert_eq!(res.value.unwrap().slot, f["expectedSlot"].as_u64());
}

#[tokio::test]
async fn notifications_arrive_in_order_and_closure_comes_last() {
    let (mux, mut sent) = harness();
    let filter = TransactionSubscribeFilter::default();
    let (sub, _) = tokio::join!(
        mux.transaction_subscribe(&filter, None),
        respond(&mux, &mut sent, json!(7)),
    );
    let mut sub = sub.unwrap();

    let total = 5;
    let delivered = 3;
    for slot in 0..delivered {
        mux.handle_frame(&notification(7, tx_payload(slot, "s")));
    }
    mux.on_closed();
    for slot in delivered..total {
        mux.handle_frame(&notification(7, tx_payload(slot, "s")));
    }

    for slot in 0..delivered {
        assert_eq!(sub.recv().await.unwrap().slot, slot);
    }
    assert!(matches!(sub.recv().await, Err(SubscriptionError::ConnectionClosed)));
    assert_eq!(sub.state(), SubscriptionState::Closed);
    assert!(matches!(sub.recv().await, Err(SubscriptionError::ConnectionClosed)));

    // closed handles stay quiet
    sub.unsubscribe().await.unwrap();
    assert!(sent.try_recv().is_err());
}

#[tokio::test]
async fn stream_ends_after_connection_closed() {
    let (mux, mut sent) = harness();
    let filter = TransactionSubscribeFilter::default();
    let (sub, _) = tokio::join!(
        mux.transaction_subscribe(&filter, None),
        respond(&mux, &mut sent, json!(8)),
    );
    let mut sub = sub.unwrap();

    mux.handle_frame(&notification(8, tx_payload(1, "a")));
    mux.handle_frame(&notification(8, tx_payload(2, "b")));
    mux.close().await;

    let mut slots = Vec::new();
    let mut closed = false;
    while let Some(item) = sub.next().await {
        match item {
            Ok(res) => slots.push(res.slot),
            Err(e) => {
                assert!(matches!(e, SubscriptionError::ConnectionClosed));
                closed = true;
            }
        }
    }
    assert_eq!(slots, vec![1, 2]);
    assert!(closed);
    assert!(mux.is_closed());
}

#[tokio::test]
async fn decode_failure_is_scoped_to_one_handle() {
    let (mux, mut sent) = harness();
    let filter = TransactionSubscribeFilter::default();
    let (a, _) = tokio::join!(
        mux.transaction_subscribe(&filter, None),
        respond(&mux, &mut sent, json!(1)),
    );
    let (b, _) = tokio::join!(
        mux.transaction_subscribe(&filter, None),
        respond(&mux, &mut sent, json!(2)),
    );
    let (mut a, mut b) = (a.unwrap(), b.unwrap());

    mux.handle_frame(&notification(1, json!({ "slot": "not a number" })));
    mux.handle_frame(&notification(2, tx_payload(9, "b")));
    assert!(matches!(a.recv().await, Err(SubscriptionError::Decode(_))));
    assert_eq!(b.recv().await.unwrap().slot, 9);

    mux.handle_frame(&notification(1, tx_payload(10, "a")));
    assert_eq!(a.recv().await.unwrap().slot, 10);
    assert_eq!(a.state(), SubscriptionState::Active);
}

#[tokio::test]
async fn queued_results_are_returned_before_queued_errors() {
    let (mux, mut sent) = harness();
    let filter = TransactionSubscribeFilter::default();
    let (sub, _) = tokio::join!(
        mux.transaction_subscribe(&filter, None),
        respond(&mux, &mut sent, json!(4)),
    );
    let mut sub = sub.unwrap();

    mux.handle_frame(&notification(4, json!({ "slot": "bad" })));
    mux.handle_frame(&notification(4, tx_payload(2, "later")));

    assert_eq!(sub.recv().await.unwrap().slot, 2);
    assert!(matches!(sub.recv().await, Err(SubscriptionError::Decode(_))));
    assert_eq!(sub.state(), SubscriptionState::Active);
}

#[tokio::test]
async fn missing_result_is_a_protocol_error() {
    let (mux, mut sent) = harness();
    let filter = TransactionSubscribeFilter::default();
    let (sub, _) = tokio::join!(
        mux.transaction_subscribe(&filter, None),
        respond(&mux, &mut sent, json!(3)),
    );
    let mut sub = sub.unwrap();

    mux.handle_frame(
        &json!({ "jsonrpc": "2.0", "method": "transactionNotification", "params": { "subscription": 3 } })
            .to_string(),
    );

    let err = sub.errors().recv().await.unwrap();
    assert!(matches!(err, SubscriptionError::Protocol(_)));
}

#[tokio::test]
async fn no_cross_talk_between_subscriptions() {
    let (mux, mut sent) = harness();
    let filter = TransactionSubscribeFilter::default();
    let (a, _) = tokio::join!(
        mux.transaction_subscribe(&filter, None),
        respond(&mux, &mut sent, json!(100)),
    );
    let (b, _) = tokio::join!(
        mux.transaction_subscribe(&filter, None),
        respond(&mux, &mut sent, json!(200)),
    );
    let params = SyndicaTransactionParams::new("solana-mainnet");
    let (c, _) = tokio::join!(
        mux.syndica_transaction_subscribe(Some(&params)),
        respond(&mux, &mut sent, json!("300")),
    );
    let (mut a, mut b, mut c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(mux.subscription_count(), 3);

    mux.handle_frame(&notification(100, tx_payload(1, "for-a")));

    assert_eq!(a.recv().await.unwrap().signature, "for-a");
    assert!(b.recv().now_or_never().is_none());
    assert!(c.recv().now_or_never().is_none());

    // a generic frame naming an unknown id reaches nobody
    mux.handle_frame(&notification(300, tx_payload(2, "stray")));
    assert!(a.recv().now_or_never().is_none());
    assert!(b.recv().now_or_never().is_none());
    assert!(c.recv().now_or_never().is_none());
}

// ─── Unsubscribe ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn unsubscribe_twice_sends_one_frame() {
    let (mux, mut sent) = harness();
    let filter = TransactionSubscribeFilter::default();
    let (sub, _) = tokio::join!(
        mux.transaction_subscribe(&filter, None),
        respond(&mux, &mut sent, json!(42)),
    );
    let mut sub = sub.unwrap();

    let (first, req) = tokio::join!(sub.unsubscribe(), respond(&mux, &mut sent, json!(true)));
    first.unwrap();
    assert_eq!(req["method"], "transactionUnsubscribe");
    assert_eq!(req["params"], json!([42]));

    sub.unsubscribe().await.unwrap();
    assert!(sent.try_recv().is_err());
    assert_eq!(sub.state(), SubscriptionState::Unsubscribed);
    assert_eq!(mux.subscription_count(), 0);

    // the multiplexer-level call is a no-op for a removed id as well
    mux.unsubscribe("jsonrpc", &SubscriptionId::Number(42)).await.unwrap();
    assert!(sent.try_recv().is_err());

    assert!(matches!(sub.recv().await, Err(SubscriptionError::Unsubscribed)));
}

#[tokio::test]
async fn queued_results_survive_unsubscribe() {
    let (mux, mut sent) = harness();
    let filter = TransactionSubscribeFilter::default();
    let (sub, _) = tokio::join!(
        mux.transaction_subscribe(&filter, None),
        respond(&mux, &mut sent, json!(5)),
    );
    let mut sub = sub.unwrap();

    mux.handle_frame(&notification(5, tx_payload(77, "kept")));
    let (res, _) = tokio::join!(sub.unsubscribe(), respond(&mux, &mut sent, json!(true)));
    res.unwrap();

    // arrives after the route is gone
    mux.handle_frame(&notification(5, tx_payload(78, "late")));

    assert_eq!(sub.recv().await.unwrap().slot, 77);
    assert!(matches!(sub.recv().await, Err(SubscriptionError::Unsubscribed)));
}

#[tokio::test]
async fn chainstream_unsubscribe_uses_string_id() {
    let (mux, mut sent) = harness();
    let params = SyndicaTransactionParams::new("solana-mainnet");
    let (sub, _) = tokio::join!(
        mux.syndica_transaction_subscribe(Some(&params)),
        respond(&mux, &mut sent, json!("abc")),
    );
    let mut sub = sub.unwrap();

    let (res, req) = tokio::join!(sub.unsubscribe(), respond(&mux, &mut sent, json!(true)));
    res.unwrap();
    assert_eq!(req["method"], "chainstream.transactionsUnsubscribe");
    assert_eq!(req["params"], json!(["abc"]));
}

#[tokio::test]
async fn dropping_a_handle_unsubscribes() {
    let (mux, mut sent) = harness();
    let filter = TransactionSubscribeFilter::default();
    let (sub, _) = tokio::join!(
        mux.transaction_subscribe(&filter, None),
        respond(&mux, &mut sent, json!(9)),
    );
    drop(sub.unwrap());

    assert_eq!(mux.subscription_count(), 0);
    let frame = sent.recv().await.expect("no unsubscribe sent");
    let req: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(req["method"], "transactionUnsubscribe");
    assert_eq!(req["params"], json!([9]));
}

// ─── Custom subscriptions ─────────────────────────────────────────────────────

#[tokio::test]
async fn generic_subscribe_with_custom_decoder() {
    let (mux, mut sent) = harness();
    let (sub, req) = tokio::join!(
        mux.subscribe(
            vec![],
            "slotSubscribe",
            "slotUnsubscribe",
            |payload: Value| Ok(payload["slot"].as_u64().unwrap_or_default()),
        ),
        respond(&mux, &mut sent, json!(0)),
    );
    assert_eq!(req["params"], json!([]));
    let mut sub = sub.unwrap();

    mux.handle_frame(
        &json!({
            "jsonrpc": "2.0",
            "method": "slotNotification",
            "params": { "subscription": 0, "result": { "parent": 74, "root": 43, "slot": 75 } }
        })
        .to_string(),
    );
    assert_eq!(sub.recv().await.unwrap(), 75);
}

#[tokio::test]
async fn duplicate_subscription_id_is_rejected() {
    let (mux, mut sent) = harness();
    let (first, _) = tokio::join!(
        mux.subscribe(vec![], "slotSubscribe", "slotUnsubscribe", json_decoder::<Value>),
        respond(&mux, &mut sent, json!(1)),
    );
    let _first = first.unwrap();

    let (second, _) = tokio::join!(
        mux.subscribe(vec![], "rootSubscribe", "rootUnsubscribe", json_decoder::<u64>),
        respond(&mux, &mut sent, json!(1)),
    );
    assert!(matches!(second, Err(SubscriptionError::Protocol(_))));
    assert_eq!(mux.subscription_count(), 1);
}

#[tokio::test]
async fn same_id_in_both_dialects_routes_separately() {
    let (mux, mut sent) = harness();
    let (slots, _) = tokio::join!(
        mux.subscribe(vec![], "slotSubscribe", "slotUnsubscribe", json_decoder::<Value>),
        respond(&mux, &mut sent, json!(5)),
    );
    let params = SyndicaTransactionParams::new("solana-mainnet");
    let (stream, _) = tokio::join!(
        mux.syndica_transaction_subscribe(Some(&params)),
        respond(&mux, &mut sent, json!(5)),
    );
    let (mut slots, mut stream) = (slots.unwrap(), stream.unwrap());
    assert_eq!(mux.subscription_count(), 2);
    assert_eq!(slots.dialect(), "jsonrpc");
    assert_eq!(stream.dialect(), "chainstream");

    let f = load_fixture("chainstream-transaction.json");
    let mut frame = f["frame"].clone();
    frame["params"]["subscription"] = json!(5);
    mux.handle_frame(&frame.to_string());
    mux.handle_frame(
        &json!({
            "jsonrpc": "2.0",
            "method": "slotNotification",
            "params": { "subscription": 5, "result": { "slot": 75 } }
        })
        .to_string(),
    );

    let res = stream.recv().await.unwrap();
    assert_eq!(res.context.index, f["expectedIndex"].as_u64().unwrap());
    assert_eq!(slots.recv().await.unwrap(), json!({ "slot": 75 }));
    assert!(slots.recv().now_or_never().is_none());
    assert!(stream.recv().now_or_never().is_none());

    let (res, req) = tokio::join!(stream.unsubscribe(), respond(&mux, &mut sent, json!(true)));
    res.unwrap();
    assert_eq!(req["method"], "chainstream.transactionsUnsubscribe");
    assert_eq!(mux.subscription_count(), 1);
}

// ─── Requests and failures ────────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_calls_leave_nothing_pending() {
    let (mux, mut sent) = harness();

    for n in 0..5 {
        let call = mux.call(JsonRpcRequest::new(n, "getSlot", vec![]));
        let res = tokio::time::timeout(Duration::from_millis(10), call).await;
        assert!(res.is_err());
    }
    assert_eq!(mux.pending_count(), 0);

    // late responses to the abandoned requests are ignored
    while let Ok(frame) = sent.try_recv() {
        let req: Value = serde_json::from_str(&frame).unwrap();
        mux.handle_frame(&json!({ "jsonrpc": "2.0", "result": 1, "id": req["id"] }).to_string());
    }
    assert_eq!(mux.pending_count(), 0);
    assert!(!mux.is_closed());
}

#[tokio::test]
async fn write_failure_fails_subscribe_immediately() {
    let config = WsClientConfig {
        request_timeout: Duration::from_secs(30),
        ..Default::default()
    };
    let mux = Multiplexer::new(Arc::new(BrokenSink), &config);
    let filter = TransactionSubscribeFilter::default();

    let res = tokio::time::timeout(
        Duration::from_millis(500),
        mux.transaction_subscribe(&filter, None),
    )
    .await
    .expect("subscribe waited for a response that was never requested");

    assert!(matches!(
        res,
        Err(SubscriptionError::Transport(TransportError::Other(_)))
    ));
    assert_eq!(mux.pending_count(), 0);
    assert_eq!(mux.subscription_count(), 0);
}

#[tokio::test]
async fn connection_closed_while_awaiting_ack() {
    let (mux, mut sent) = harness();
    let filter = TransactionSubscribeFilter::default();

    let (res, _) = tokio::join!(mux.transaction_subscribe(&filter, None), async {
        sent.recv().await.expect("no request sent");
        mux.on_closed();
    });

    assert!(matches!(res, Err(SubscriptionError::ConnectionClosed)));
    assert_eq!(mux.pending_count(), 0);
    assert_eq!(mux.subscription_count(), 0);
}
