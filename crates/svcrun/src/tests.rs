//! End-to-end tests: build a table, bind it to the loopback transport and
//! drive every call shape through `ServiceClient`.

use std::sync::Arc;

use futures::FutureExt;
use svcmeta::Code;
use svcmeta::Metadata;
use svcmeta::Status;
use tokio_util::sync::CancellationToken;

use crate::builder::BuildOptions;
use crate::builder::DispatchTableBuilder;
use crate::client::ClientMethod;
use crate::client::ConfigurableCall;
use crate::client::ServiceClient;
use crate::embedded;
use crate::marshal::Raw;
use crate::marshal::Utf8;
use crate::mock_transport::FinishedCall;
use crate::mock_transport::LoopbackInvoker;
use crate::mock_transport::StalledInvoker;
use crate::response::CallHandle;
use crate::response::CallPhase;
use crate::response::Error;
use crate::response::StreamState;
use crate::response::UnaryResponse;
use crate::service::MethodInfo;
use crate::service::MethodKind;
use crate::service::Service;
use crate::service::ServiceContext;
use crate::service::ServiceType;
use crate::transport::AsyncUnaryCall;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct Greeter;
impl Service for Greeter {}

#[derive(Default)]
struct Calc;
impl Service for Calc {}

fn greeter() -> ServiceType {
    ServiceType::of::<Greeter>("Greeter")
        .method(MethodInfo::unary("Hello", |_svc: Greeter, ctx: ServiceContext| async move {
            let name = String::from_utf8(ctx.into_request())?;
            anyhow::Ok(format!("Hello, {}!", name).into_bytes())
        }))
        .method(MethodInfo::unary("WhoAmI", |_svc: Greeter, ctx: ServiceContext| async move {
            let user = ctx.request_headers().get_value("X-User").unwrap_or("anonymous");
            anyhow::Ok(user.as_bytes().to_vec())
        }))
        .method(MethodInfo::unary("Fail", |_svc: Greeter, _ctx: ServiceContext| async move {
            Err::<Vec<u8>, _>(anyhow::anyhow!("greeting quota exceeded"))
        }))
        .method(MethodInfo::unary("Hang", |_svc: Greeter, _ctx: ServiceContext| async move {
            futures::future::pending::<()>().await;
            anyhow::Ok(Vec::new())
        }))
}

fn calc() -> ServiceType {
    ServiceType::of::<Calc>("Calc")
        .method(MethodInfo::client_streaming("Sum", |_svc: Calc, mut ctx: ServiceContext| async move {
            let mut requests = ctx
                .take_request_stream()
                .ok_or_else(|| anyhow::anyhow!("missing request stream"))?;
            let mut total = 0i64;
            while let Some(message) = requests.next().await? {
                total += String::from_utf8(message)?.parse::<i64>()?;
            }
            anyhow::Ok(total.to_string().into_bytes())
        }))
        .method(MethodInfo::server_streaming("Count", |_svc: Calc, mut ctx: ServiceContext| async move {
            let n: u32 = std::str::from_utf8(ctx.request())?.parse()?;
            let mut responses = ctx
                .take_response_stream()
                .ok_or_else(|| anyhow::anyhow!("missing response stream"))?;
            for i in 1..=n {
                responses.write(i.to_string().into_bytes()).await?;
            }
            responses.complete().await?;
            anyhow::Ok(Vec::new())
        }))
        .method(MethodInfo::duplex_streaming("Upper", |_svc: Calc, mut ctx: ServiceContext| async move {
            let mut requests = ctx
                .take_request_stream()
                .ok_or_else(|| anyhow::anyhow!("missing request stream"))?;
            let mut responses = ctx
                .take_response_stream()
                .ok_or_else(|| anyhow::anyhow!("missing response stream"))?;
            while let Some(message) = requests.next().await? {
                responses.write(String::from_utf8(message)?.to_uppercase().into_bytes()).await?;
            }
            anyhow::Ok(Vec::new())
        }))
}

fn loopback(options: &BuildOptions) -> Arc<LoopbackInvoker> {
    init_tracing();
    let table = DispatchTableBuilder::build(vec![greeter(), calc()], options).unwrap();
    Arc::new(LoopbackInvoker::new(table.into_bound()))
}

fn text(name: &str, kind: MethodKind) -> ClientMethod<String, String> {
    ClientMethod::new(name, kind, Utf8, Utf8)
}

#[tokio::test]
async fn test_unary_round_trip() {
    let invoker = loopback(&BuildOptions::default());
    let client = ServiceClient::new("Greeter", invoker);

    let mut handle = client.unary(&text("Hello", MethodKind::Unary), &"Ada".to_string()).unwrap();
    assert_eq!(handle.phase(), CallPhase::Resolving);
    assert!(matches!(handle.status(), Err(Error::InvalidState(_))));
    assert!(matches!(handle.trailers(), Err(Error::InvalidState(_))));

    assert_eq!(handle.response().await.unwrap(), "Hello, Ada!");
    assert_eq!(handle.phase(), CallPhase::Terminated);
    assert!(handle.status().unwrap().is_ok());
    assert_eq!(handle.trailers().unwrap().get_value("x-finished"), Some("true"));

    let headers = handle.response_headers().await.unwrap();
    assert_eq!(headers.get_value("X-Transport"), Some("loopback"));
}

#[tokio::test]
async fn test_request_headers_reach_handler() {
    let invoker = loopback(&BuildOptions::default());
    let client = ServiceClient::new("Greeter", invoker).with_headers(Metadata::new().with("x-user", "grace"));

    let mut handle = client.unary(&text("WhoAmI", MethodKind::Unary), &String::new()).unwrap();
    assert_eq!(handle.response().await.unwrap(), "grace");
}

#[tokio::test]
async fn test_failure_detail_hidden_by_default() {
    let invoker = loopback(&BuildOptions::default());
    let client = ServiceClient::new("Greeter", invoker);

    let mut handle = client.unary(&text("Fail", MethodKind::Unary), &String::new()).unwrap();
    let err = handle.response().await.unwrap_err();
    match err {
        Error::Rpc(status) => {
            assert_eq!(status.code, Code::Unknown);
            assert!(!status.detail.contains("quota"));
        }
        _ => panic!("Expected Rpc error, got {:?}", err),
    }
    assert_eq!(handle.status().unwrap().code, Code::Unknown);
}

#[tokio::test]
async fn test_failure_detail_when_enabled() {
    let invoker = loopback(&BuildOptions::default().return_error_detail(true));
    let client = ServiceClient::new("Greeter", invoker);

    let mut handle = client.unary(&text("Fail", MethodKind::Unary), &String::new()).unwrap();
    let err = handle.response().await.unwrap_err();
    match err {
        Error::Rpc(status) => assert!(status.detail.contains("greeting quota exceeded")),
        _ => panic!("Expected Rpc error, got {:?}", err),
    }
}

#[tokio::test]
async fn test_unknown_method_is_unimplemented() {
    let invoker = loopback(&BuildOptions::default());
    let client = ServiceClient::new("Greeter", invoker);

    let mut handle = client.unary(&text("Secret", MethodKind::Unary), &String::new()).unwrap();
    let expected = svcmeta::Status::unimplemented("method /Greeter/Secret not found");
    assert_eq!(handle.response().await.unwrap_err(), Error::Rpc(expected));
}

#[tokio::test]
async fn test_wrong_shape_rejected_locally() {
    let invoker = loopback(&BuildOptions::default());
    let client = ServiceClient::new("Calc", invoker.clone());

    let err = client.unary(&text("Sum", MethodKind::ClientStreaming), &String::new()).unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert!(invoker.last_call().is_none());
}

#[tokio::test]
async fn test_embedded_ping() {
    let invoker = loopback(&BuildOptions::default());
    let client = ServiceClient::new(embedded::PING_SERVICE, invoker);
    let ping: ClientMethod<Vec<u8>, Vec<u8>> = ClientMethod::new(embedded::PING_METHOD, MethodKind::Unary, Raw, Raw);

    let mut handle = client.unary(&ping, &vec![1, 2, 3]).unwrap();
    assert_eq!(handle.response().await.unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_client_streaming_sum() {
    let invoker = loopback(&BuildOptions::default());
    let client = ServiceClient::new("Calc", invoker);

    let mut handle = client.client_streaming(&text("Sum", MethodKind::ClientStreaming)).unwrap();
    for n in ["1", "2", "39"] {
        handle.request_stream().write(&n.to_string()).await.unwrap();
    }
    handle.request_stream().complete().await.unwrap();
    assert_eq!(handle.request_stream().state(), StreamState::Closed);

    let err = handle.request_stream().write(&"4".to_string()).await.unwrap_err();
    assert_eq!(err, Error::InvalidState("request stream is closed"));

    assert_eq!(handle.response().await.unwrap(), "42");
    assert!(handle.status().unwrap().is_ok());
}

#[tokio::test]
async fn test_server_streaming_count() {
    let invoker = loopback(&BuildOptions::default());
    let client = ServiceClient::new("Calc", invoker);

    let mut handle = client
        .server_streaming(&text("Count", MethodKind::ServerStreaming), &"3".to_string())
        .unwrap();
    let messages = handle.response_stream().collect().await.unwrap();

    assert_eq!(messages, vec!["1", "2", "3"]);
    assert_eq!(handle.response_stream().state(), StreamState::Closed);
    assert_eq!(handle.response_stream().next().await, Ok(None));
    assert!(handle.status().unwrap().is_ok());
}

#[tokio::test]
async fn test_server_streaming_failure_surfaces_status() {
    let invoker = loopback(&BuildOptions::default());
    let client = ServiceClient::new("Calc", invoker);

    let mut handle = client
        .server_streaming(&text("Count", MethodKind::ServerStreaming), &"many".to_string())
        .unwrap();
    let err = handle.response_stream().next().await.unwrap_err();
    match err {
        Error::Rpc(status) => assert_eq!(status.code, Code::Unknown),
        _ => panic!("Expected Rpc error, got {:?}", err),
    }
    assert_eq!(handle.response_stream().state(), StreamState::Closed);
}

#[tokio::test]
async fn test_duplex_sides_progress_independently() {
    let invoker = loopback(&BuildOptions::default());
    let client = ServiceClient::new("Calc", invoker);

    let mut handle = client.duplex_streaming(&text("Upper", MethodKind::DuplexStreaming)).unwrap();

    handle.request_stream().write(&"a".to_string()).await.unwrap();
    handle.request_stream().write(&"b".to_string()).await.unwrap();
    assert_eq!(handle.response_stream().next().await.unwrap().as_deref(), Some("A"));

    handle.request_stream().write(&"c".to_string()).await.unwrap();
    handle.request_stream().complete().await.unwrap();
    assert_eq!(handle.request_stream().state(), StreamState::Closed);
    assert_eq!(handle.response_stream().state(), StreamState::Open);

    let (_, responses) = handle.streams();
    assert_eq!(responses.collect().await.unwrap(), vec!["B", "C"]);
    assert!(handle.status().unwrap().is_ok());
}

#[tokio::test]
async fn test_duplex_dispose_closes_both_sides() {
    let invoker = loopback(&BuildOptions::default());
    let client = ServiceClient::new("Calc", invoker.clone());

    let mut handle = client.duplex_streaming(&text("Upper", MethodKind::DuplexStreaming)).unwrap();
    handle.request_stream().write(&"a".to_string()).await.unwrap();

    handle.dispose();
    handle.dispose();

    assert_eq!(handle.request_stream().state(), StreamState::Closed);
    assert_eq!(handle.response_stream().state(), StreamState::Closed);
    assert_eq!(handle.response_stream().next().await, Err(Error::Cancelled));
    assert_eq!(handle.request_stream().write(&"b".to_string()).await, Err(Error::Cancelled));

    let call = invoker.last_call().unwrap();
    assert_eq!(call.cancels(), 1);
    assert_eq!(handle.status().unwrap().code, Code::Cancelled);
}

#[tokio::test]
async fn test_dispose_before_resolution_cancels() {
    let invoker = StalledInvoker::new();
    let mut handle: UnaryResponse<String> = UnaryResponse::from_call(invoker.unary_call(), Arc::new(Utf8));
    assert_eq!(handle.phase(), CallPhase::Resolving);

    let disposer = handle.disposer();
    let waiter = tokio::spawn(async move { handle.response().await });
    tokio::task::yield_now().await;
    disposer.dispose();

    assert_eq!(waiter.await.unwrap(), Err(Error::Cancelled));
    assert!(disposer.is_disposed());
    assert_eq!(invoker.call.cancels(), 1);
}

#[tokio::test]
async fn test_drop_cancels_unfinished_call() {
    let invoker = StalledInvoker::new();
    let handle: UnaryResponse<String> = UnaryResponse::from_call(invoker.unary_call(), Arc::new(Utf8));
    drop(handle);
    assert_eq!(invoker.call.cancels(), 1);
}

#[tokio::test]
async fn test_dispose_after_completion_does_not_cancel() {
    let invoker = loopback(&BuildOptions::default());
    let client = ServiceClient::new("Greeter", invoker.clone());

    let mut handle = client.unary(&text("Hello", MethodKind::Unary), &"Lin".to_string()).unwrap();
    handle.response().await.unwrap();
    handle.dispose();

    assert_eq!(handle.phase(), CallPhase::Disposed);
    assert_eq!(invoker.last_call().unwrap().cancels(), 0);
    assert!(handle.status().unwrap().is_ok());
}

#[tokio::test]
async fn test_dispose_after_termination_keeps_response() {
    let call = AsyncUnaryCall {
        response: async { Ok::<_, Status>(b"done".to_vec()) }.boxed(),
        call: Arc::new(FinishedCall::ok()),
    };
    let mut handle = UnaryResponse::from_call(call, Arc::new(Utf8));

    handle.dispose();
    assert_eq!(handle.phase(), CallPhase::Disposed);
    assert_eq!(handle.response().await, Ok("done".to_string()));
}

#[tokio::test]
async fn test_caller_token_cancels_call() {
    let invoker = loopback(&BuildOptions::default());
    let token = CancellationToken::new();
    let client = ServiceClient::new("Greeter", invoker.clone()).with_cancellation(token.clone());

    let mut handle = client.unary(&text("Hang", MethodKind::Unary), &String::new()).unwrap();
    token.cancel();

    assert_eq!(handle.response().await, Err(Error::Cancelled));
    assert!(handle.is_disposed());
    assert_eq!(invoker.last_call().unwrap().cancels(), 1);
}

#[tokio::test]
async fn test_caller_token_disposes_without_awaiting_response() {
    let invoker = loopback(&BuildOptions::default());
    let token = CancellationToken::new();
    let client = ServiceClient::new("Greeter", invoker.clone()).with_cancellation(token.clone());

    let handle = client.unary(&text("Hang", MethodKind::Unary), &String::new()).unwrap();
    token.cancel();

    assert_eq!(handle.response_headers().await, Err(Error::Cancelled));
    assert!(handle.is_disposed());
    assert_eq!(handle.phase(), CallPhase::Disposed);
    assert_eq!(invoker.last_call().unwrap().cancels(), 1);
}

#[tokio::test]
async fn test_caller_token_cancels_idle_handle() {
    let invoker = loopback(&BuildOptions::default());
    let token = CancellationToken::new();
    let client = ServiceClient::new("Greeter", invoker.clone()).with_cancellation(token.clone());

    let handle = client.unary(&text("Hang", MethodKind::Unary), &String::new()).unwrap();
    let call = invoker.last_call().unwrap();
    token.cancel();

    // The watcher task runs once this task yields.
    for _ in 0..10 {
        if call.cancels() > 0 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(call.cancels(), 1);
    assert_eq!(handle.phase(), CallPhase::Disposed);
}
