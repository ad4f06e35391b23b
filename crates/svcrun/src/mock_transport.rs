//! Mock transports for testing.
//!
//! These are used internally by the test suite and are not part of the public API.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use futures::FutureExt;
use svcmeta::Metadata;
use svcmeta::Status;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::client::CallOptions;
use crate::registrar::ServiceDefinition;
use crate::service::ServiceContext;
use crate::transport::AsyncClientStreamingCall;
use crate::transport::AsyncDuplexStreamingCall;
use crate::transport::AsyncServerStreamingCall;
use crate::transport::AsyncUnaryCall;
use crate::transport::CallInvoker;
use crate::transport::CallState;
use crate::transport::StreamReader;
use crate::transport::StreamWriter;

/// Call state driven by the loopback server task.
pub struct LoopbackCall {
    headers: Metadata,
    status: Mutex<Option<Status>>,
    trailers: Mutex<Option<Metadata>>,
    token: CancellationToken,
    cancels: AtomicUsize,
}

impl LoopbackCall {
    pub fn new() -> Self {
        Self {
            headers: Metadata::new().with("x-transport", "loopback"),
            status: Mutex::new(None),
            trailers: Mutex::new(None),
            token: CancellationToken::new(),
            cancels: AtomicUsize::new(0),
        }
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    fn finish(&self, result: &Result<Vec<u8>, Status>) {
        let mut status = self.status.lock().unwrap();
        if status.is_none() {
            *status = Some(match result {
                Ok(_) => Status::ok(),
                Err(e) => e.clone(),
            });
            *self.trailers.lock().unwrap() = Some(Metadata::new().with("x-finished", "true"));
        }
    }
}

#[async_trait::async_trait]
impl CallState for LoopbackCall {
    async fn response_headers(&self) -> Result<Metadata, Status> {
        Ok(self.headers.clone())
    }

    fn status(&self) -> Option<Status> {
        self.status.lock().unwrap().clone()
    }

    fn trailers(&self) -> Option<Metadata> {
        self.trailers.lock().unwrap().clone()
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        let mut status = self.status.lock().unwrap();
        if status.is_none() {
            *status = Some(Status::cancelled("cancelled by client"));
        }
        self.token.cancel();
    }
}

/// A call that already finished with the given status.
pub struct FinishedCall {
    status: Status,
}

impl FinishedCall {
    pub fn ok() -> Self {
        Self { status: Status::ok() }
    }
}

#[async_trait::async_trait]
impl CallState for FinishedCall {
    async fn response_headers(&self) -> Result<Metadata, Status> {
        Ok(Metadata::new())
    }

    fn status(&self) -> Option<Status> {
        Some(self.status.clone())
    }

    fn trailers(&self) -> Option<Metadata> {
        Some(Metadata::new())
    }

    fn cancel(&self) {}
}

/// Read side of an in-memory stream.
///
/// On exhaustion, reports the call's failure status if there is one.
pub struct ChannelReader {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    call: Option<Arc<LoopbackCall>>,
}

#[async_trait::async_trait]
impl StreamReader for ChannelReader {
    async fn next(&mut self) -> Result<Option<Vec<u8>>, Status> {
        match self.rx.recv().await {
            Some(message) => Ok(Some(message)),
            None => match self.call.as_ref().and_then(|call| call.status()) {
                Some(status) if !status.is_ok() => Err(status),
                _ => Ok(None),
            },
        }
    }
}

/// Write side of an in-memory stream.
pub struct ChannelWriter {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

#[async_trait::async_trait]
impl StreamWriter for ChannelWriter {
    async fn write(&mut self, message: Vec<u8>) -> Result<(), Status> {
        let tx = self.tx.as_ref().ok_or_else(|| Status::internal("write after complete"))?;
        tx.send(message).map_err(|_| Status::cancelled("stream closed"))
    }

    async fn complete(&mut self) -> Result<(), Status> {
        self.tx = None;
        Ok(())
    }
}

fn channel(
    call: Option<Arc<LoopbackCall>>,
) -> (ChannelWriter, ChannelReader, mpsc::UnboundedSender<Vec<u8>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let keep = tx.clone();
    (ChannelWriter { tx: Some(tx) }, ChannelReader { rx, call }, keep)
}

/// Runs `ctx` against `definition` until it finishes or the call is cancelled.
async fn serve(
    definition: Arc<ServiceDefinition>,
    path: String,
    ctx: ServiceContext,
    call: Arc<LoopbackCall>,
) -> Result<Vec<u8>, Status> {
    let result = tokio::select! {
        biased;
        _ = call.token.cancelled() => Err(Status::cancelled("call cancelled")),
        result = definition.dispatch(&path, ctx) => result,
    };
    call.finish(&result);
    result
}

/// Invoker that runs calls in-process against a bound service definition.
pub struct LoopbackInvoker {
    definition: Arc<ServiceDefinition>,
    calls: Mutex<Vec<Arc<LoopbackCall>>>,
}

impl LoopbackInvoker {
    pub fn new(definition: ServiceDefinition) -> Self {
        Self {
            definition: Arc::new(definition),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The most recently started call.
    pub fn last_call(&self) -> Option<Arc<LoopbackCall>> {
        self.calls.lock().unwrap().last().cloned()
    }

    fn start(&self) -> Arc<LoopbackCall> {
        let call = Arc::new(LoopbackCall::new());
        self.calls.lock().unwrap().push(call.clone());
        call
    }
}

impl CallInvoker for LoopbackInvoker {
    fn unary(&self, path: &str, options: &CallOptions, request: Vec<u8>) -> AsyncUnaryCall {
        let call = self.start();
        let ctx = ServiceContext::unary(options.headers.clone(), request);
        let response = serve(self.definition.clone(), path.to_string(), ctx, call.clone()).boxed();
        AsyncUnaryCall { response, call }
    }

    fn client_streaming(&self, path: &str, options: &CallOptions) -> AsyncClientStreamingCall {
        let call = self.start();
        let (writer, reader, _) = channel(None);
        let ctx = ServiceContext::client_streaming(options.headers.clone(), Box::new(reader));

        let (tx, rx) = oneshot::channel();
        let server = serve(self.definition.clone(), path.to_string(), ctx, call.clone());
        tokio::spawn(async move {
            let _ = tx.send(server.await);
        });

        let response = async move {
            rx.await
                .unwrap_or_else(|_| Err(Status::internal("server task dropped")))
        }
        .boxed();
        AsyncClientStreamingCall {
            request_stream: Box::new(writer),
            response,
            call,
        }
    }

    fn server_streaming(
        &self,
        path: &str,
        options: &CallOptions,
        request: Vec<u8>,
    ) -> AsyncServerStreamingCall {
        let call = self.start();
        let (writer, reader, keep) = channel(Some(call.clone()));
        let ctx = ServiceContext::server_streaming(options.headers.clone(), request, Box::new(writer));

        let server = serve(self.definition.clone(), path.to_string(), ctx, call.clone());
        tokio::spawn(async move {
            let _ = server.await;
            drop(keep);
        });

        AsyncServerStreamingCall {
            response_stream: Box::new(reader),
            call,
        }
    }

    fn duplex_streaming(&self, path: &str, options: &CallOptions) -> AsyncDuplexStreamingCall {
        let call = self.start();
        let (request_writer, request_reader, _) = channel(None);
        let (response_writer, response_reader, keep) = channel(Some(call.clone()));
        let ctx = ServiceContext::duplex_streaming(
            options.headers.clone(),
            Box::new(request_reader),
            Box::new(response_writer),
        );

        let server = serve(self.definition.clone(), path.to_string(), ctx, call.clone());
        tokio::spawn(async move {
            let _ = server.await;
            drop(keep);
        });

        AsyncDuplexStreamingCall {
            request_stream: Box::new(request_writer),
            response_stream: Box::new(response_reader),
            call,
        }
    }
}

/// Invoker whose unary calls never complete on their own.
pub struct StalledInvoker {
    pub call: Arc<LoopbackCall>,
}

impl StalledInvoker {
    pub fn new() -> Self {
        Self {
            call: Arc::new(LoopbackCall::new()),
        }
    }

    pub fn unary_call(&self) -> AsyncUnaryCall {
        let call = self.call.clone();
        let response = async move {
            call.token.cancelled().await;
            Err::<Vec<u8>, _>(Status::cancelled("call cancelled"))
        }
        .boxed();
        AsyncUnaryCall {
            response,
            call: self.call.clone(),
        }
    }
}
