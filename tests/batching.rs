//! Multi-target commands split into chunks of at most 1500 object ids.

mod common;

use common::*;
use mockito::{Matcher, Server};
use prtg_request::batch::BATCH_LIMIT;
use prtg_request::{
    CommandParameters, EngineConfig, Error, HttpTransport, MultiTargetParameters, RequestEngine,
};
use std::sync::Arc;
use url::Url;

fn ids_in(url: &Url) -> Vec<i32> {
    url.query_pairs()
        .find(|(k, _)| k == "id")
        .map(|(_, v)| v.split(',').map(|s| s.parse().unwrap()).collect())
        .unwrap_or_default()
}

#[test]
fn test_3200_ids_become_three_requests() {
    let transport = ScriptedTransport::new(vec![]);
    let (engine, _) = scripted_engine(transport.clone(), config(0, 0));
    let ids: Vec<i32> = (1..=3200).collect();
    let mut params = CommandParameters::new("api/pause.htm", ids.clone()).with("action", 0);

    engine.execute_multi(&mut params, None).unwrap();

    let calls = transport.calls();
    let sizes: Vec<usize> = calls.iter().map(|c| ids_in(&c.url).len()).collect();
    assert_eq!(sizes, vec![1500, 1500, 200]);

    // chunks are contiguous and in order
    let sent: Vec<i32> = calls.iter().flat_map(|c| ids_in(&c.url)).collect();
    assert_eq!(sent, ids);
    assert!(calls
        .iter()
        .all(|c| c.url.query_pairs().any(|(k, v)| k == "action" && v == "0")));

    assert_eq!(params.object_ids(), ids.as_slice());
}

#[test]
fn test_exact_limit_is_one_request() {
    let transport = ScriptedTransport::new(vec![]);
    let (engine, _) = scripted_engine(transport.clone(), config(0, 0));
    let mut params = CommandParameters::new("api/pause.htm", (0..BATCH_LIMIT as i32).collect());

    engine.execute_multi(&mut params, None).unwrap();
    assert_eq!(transport.call_count(), 1);
}

#[test]
fn test_empty_id_list_sends_nothing() {
    let transport = ScriptedTransport::new(vec![]);
    let (engine, _) = scripted_engine(transport.clone(), config(0, 0));
    let mut params = CommandParameters::new("api/pause.htm", vec![]);

    engine.execute_multi(&mut params, None).unwrap();
    assert_eq!(transport.call_count(), 0);
}

#[test]
fn test_ids_restored_after_mid_sequence_failure() {
    let transport = ScriptedTransport::new(vec![
        Step::Reply(Reply::ok("<ok/>")),
        Step::Reply(Reply::ok("<prtg><error>Object is locked</error></prtg>").status(400)),
    ]);
    let (engine, _) = scripted_engine(transport.clone(), config(2, 0));
    let ids: Vec<i32> = (1..=4000).collect();
    let mut params = CommandParameters::new("deleteobject.htm", ids.clone());

    let err = engine.execute_multi(&mut params, None).unwrap_err();

    assert_eq!(err.request_error().map(|e| e.message.as_str()), Some("Object is locked"));
    // the third chunk is never sent; earlier chunks are not undone
    assert_eq!(transport.call_count(), 2);
    assert_eq!(params.object_ids(), ids.as_slice());
}

#[test]
fn test_each_chunk_has_its_own_retry_budget() {
    let transport = ScriptedTransport::new(vec![
        Step::Fail(refused),
        Step::Reply(Reply::ok("<ok/>")),
        Step::Fail(refused),
        Step::Reply(Reply::ok("<ok/>")),
    ]);
    let (engine, sink) = scripted_engine(transport.clone(), config(1, 0));
    let mut params = CommandParameters::new("api/pause.htm", (1..=3000).collect());

    engine.execute_multi(&mut params, None).unwrap();

    assert_eq!(transport.call_count(), 4);
    assert!(sink.retries().iter().all(|e| e.retries_remaining == 1));
}

#[tokio::test(start_paused = true)]
async fn test_async_cancellation_restores_ids() {
    let transport = ScriptedTransport::new(vec![Step::Reply(Reply::ok("<ok/>")), Step::CancelCaller]);
    let (engine, _) = scripted_engine(transport.clone(), config(3, 1));
    let ids: Vec<i32> = (1..=3100).collect();
    let mut params = CommandParameters::new("api/pause.htm", ids.clone());
    let token = tokio_util::sync::CancellationToken::new();

    let err = engine
        .execute_multi_async(&mut params, Some(&token))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(transport.call_count(), 2);
    assert_eq!(params.object_ids(), ids.as_slice());
}

#[tokio::test]
async fn test_async_batches_over_http() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/pause.htm")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("OK")
        .expect(3)
        .create_async()
        .await;

    let engine = RequestEngine::builder()
        .config(EngineConfig::new().with_retry_count(0).with_timeout_secs(5))
        .connection(connection(&server.url()))
        .transport(Arc::new(HttpTransport::with_options(false, None).unwrap()))
        .build()
        .unwrap();

    let ids: Vec<i32> = (1..=3001).collect();
    let mut params = CommandParameters::new("api/pause.htm", ids.clone()).with("action", 1);
    engine.execute_multi_async(&mut params, None).await.unwrap();

    mock.assert_async().await;
    assert_eq!(params.object_ids(), ids.as_slice());
}
