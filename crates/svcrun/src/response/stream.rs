//! Typed read and write sides of a streaming call.
//!
//! Each side moves `Open -> Closed` on its own. Disposing the call closes
//! both.

use std::sync::Arc;

use crate::marshal::Marshaller;
use crate::transport::StreamReader;
use crate::transport::StreamWriter;

use super::Error;
use super::Lifecycle;
use super::Result;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Closed,
}

/// Write side: requests sent by the caller.
pub struct RequestStream<T> {
    writer: Box<dyn StreamWriter>,
    marshaller: Arc<dyn Marshaller<T>>,
    state: StreamState,
    completed: bool,
    lifecycle: Arc<Lifecycle>,
}

impl<T: Send + 'static> RequestStream<T> {
    pub(crate) fn new(
        writer: Box<dyn StreamWriter>,
        marshaller: Arc<dyn Marshaller<T>>,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            writer,
            marshaller,
            state: StreamState::Open,
            completed: false,
            lifecycle,
        }
    }

    pub fn state(&self) -> StreamState {
        if self.lifecycle.is_disposed() {
            StreamState::Closed
        } else {
            self.state
        }
    }

    /// Sends one message.
    pub async fn write(&mut self, message: &T) -> Result<()> {
        match self.state() {
            StreamState::Closed if self.lifecycle.is_disposed() => return Err(Error::Cancelled),
            StreamState::Closed => return Err(Error::InvalidState("request stream is closed")),
            StreamState::Open => {}
        }

        let bytes = self.marshaller.serialize(message)?;
        let lifecycle = self.lifecycle.clone();
        let result = lifecycle
            .guard(async { self.writer.write(bytes).await.map_err(Error::Rpc) })
            .await;

        if result.is_err() {
            self.state = StreamState::Closed;
        }
        result
    }

    /// Signals that no more requests follow. Completing twice is a no-op.
    ///
    /// A stream closed by a failed write cannot be completed.
    pub async fn complete(&mut self) -> Result<()> {
        if self.completed {
            return Ok(());
        }
        if self.state == StreamState::Closed {
            return Err(Error::InvalidState("request stream is closed"));
        }
        self.state = StreamState::Closed;
        self.completed = true;

        if self.lifecycle.is_disposed() {
            return Err(Error::Cancelled);
        }

        let lifecycle = self.lifecycle.clone();
        lifecycle
            .guard(async { self.writer.complete().await.map_err(Error::Rpc) })
            .await
    }
}

/// Read side: responses sent by the server.
pub struct ResponseStream<T> {
    reader: Box<dyn StreamReader>,
    marshaller: Arc<dyn Marshaller<T>>,
    state: StreamState,
    lifecycle: Arc<Lifecycle>,
}

impl<T: Send + 'static> ResponseStream<T> {
    pub(crate) fn new(
        reader: Box<dyn StreamReader>,
        marshaller: Arc<dyn Marshaller<T>>,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            reader,
            marshaller,
            state: StreamState::Open,
            lifecycle,
        }
    }

    pub fn state(&self) -> StreamState {
        if self.lifecycle.is_disposed() {
            StreamState::Closed
        } else {
            self.state
        }
    }

    /// Next message, or `None` once the stream is exhausted.
    ///
    /// A closed stream keeps returning `None`, except after disposal, which
    /// reports [`Error::Cancelled`].
    pub async fn next(&mut self) -> Result<Option<T>> {
        if self.lifecycle.is_disposed() {
            self.state = StreamState::Closed;
            return Err(Error::Cancelled);
        }
        if self.state == StreamState::Closed {
            return Ok(None);
        }

        let lifecycle = self.lifecycle.clone();
        let next = lifecycle
            .guard(async { self.reader.next().await.map_err(Error::Rpc) })
            .await;

        match next {
            Ok(Some(bytes)) => Ok(Some(self.marshaller.deserialize(&bytes)?)),
            Ok(None) => {
                self.state = StreamState::Closed;
                Ok(None)
            }
            Err(e) => {
                self.state = StreamState::Closed;
                Err(e)
            }
        }
    }

    /// Reads the remaining messages.
    pub async fn collect(&mut self) -> Result<Vec<T>> {
        let mut messages = Vec::new();
        while let Some(message) = self.next().await? {
            messages.push(message);
        }
        Ok(messages)
    }
}
