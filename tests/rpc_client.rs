//! JSON-RPC client failover behaviour.

mod common;

use account_relay::chain::{
    ChainClient, ChainError, Extrinsic, Rejection, RpcChainClient, SignedExtrinsic,
};
use account_relay::config::schema::ChainConfig;
use alloy::primitives::{Address, Bytes, B256};
use common::{rpc_error, rpc_result, start_programmable_backend};
use serde_json::json;

fn client(primary: String, failover: String) -> RpcChainClient {
    RpcChainClient::new(&ChainConfig {
        rpc_url: primary,
        failover_urls: vec![failover],
        rpc_timeout_secs: 5,
        ..ChainConfig::default()
    })
    .unwrap()
}

fn signed() -> SignedExtrinsic {
    SignedExtrinsic {
        call: Extrinsic(Bytes::from_static(b"call")),
        nonce: 4,
        signer: Address::ZERO,
        signature: Bytes::from_static(&[0; 65]),
    }
}

/// An address nothing listens on.
async fn closed_addr() -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn test_reads_fail_over_on_gateway_error() {
    let head = B256::repeat_byte(0xab);
    let (primary, primary_log) = start_programmable_backend(|_, _| (503, "busy".into())).await;
    let (backup, backup_log) =
        start_programmable_backend(move |_, _| (200, rpc_result(json!(head)))).await;

    let chain = client(format!("http://{}", primary), format!("http://{}", backup));
    assert_eq!(chain.finalized_block_hash().await.unwrap(), head);

    assert_eq!(primary_log.lock().unwrap().len(), 1);
    let requests = backup_log.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].json()["method"], "chain_getFinalizedHead");
}

#[tokio::test]
async fn test_pool_rejection_is_returned_without_failover() {
    let (primary, _) = start_programmable_backend(|_, _| {
        (
            200,
            rpc_error(1010, "Invalid Transaction", "Inability to pay some fees"),
        )
    })
    .await;
    let (backup, backup_log) =
        start_programmable_backend(|_, _| (200, rpc_result(json!(B256::ZERO)))).await;

    let chain = client(format!("http://{}", primary), format!("http://{}", backup));
    let err = chain.submit(&signed()).await.unwrap_err();

    assert!(matches!(err, ChainError::Rejected { code: 1010, .. }));
    assert_eq!(err.rejection(), Some(Rejection::InsufficientCapacity));
    assert!(backup_log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_not_repeated_after_request_was_sent() {
    let (primary, _) = start_programmable_backend(|_, _| (502, "bad gateway".into())).await;
    let (backup, backup_log) =
        start_programmable_backend(|_, _| (200, rpc_result(json!(B256::ZERO)))).await;

    let chain = client(format!("http://{}", primary), format!("http://{}", backup));
    let err = chain.submit(&signed()).await.unwrap_err();

    assert!(matches!(err, ChainError::Rpc(_)));
    assert_eq!(err.rejection(), None);
    assert!(backup_log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_fails_over_when_primary_unreachable() {
    let tx_hash = B256::repeat_byte(0x11);
    let primary = closed_addr().await;
    let (backup, backup_log) =
        start_programmable_backend(move |_, _| (200, rpc_result(json!(tx_hash)))).await;

    let chain = client(format!("http://{}", primary), format!("http://{}", backup));
    assert_eq!(chain.submit(&signed()).await.unwrap(), tx_hash);

    let requests = backup_log.lock().unwrap().clone();
    assert_eq!(requests[0].json()["method"], "author_submitExtrinsic");
    assert_eq!(requests[0].json()["params"][0]["nonce"], 4);
}

#[tokio::test]
async fn test_missing_block_maps_to_block_not_found() {
    let (primary, _) = start_programmable_backend(|_, _| (200, rpc_result(json!(null)))).await;
    let (backup, _) = start_programmable_backend(|_, _| (200, rpc_result(json!(null)))).await;

    let chain = client(format!("http://{}", primary), format!("http://{}", backup));
    let err = chain.block(B256::ZERO).await.unwrap_err();
    assert!(matches!(err, ChainError::BlockNotFound(_)));
}
