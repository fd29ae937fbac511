//! Default transport built on `reqwest`.

use std::{sync::Arc, time::Duration};

use futures_util::StreamExt;
use tokio::{runtime::Handle, time::timeout};
use tracing::{debug, warn};

use super::{StreamHandle, StreamRequest, StreamSink, Transport};
use crate::{
    config::EventSourceConfig,
    error::{EventSourceError, EventSourceResult, TransportError},
};

/// HTTP/1.1 and HTTP/2 streaming transport.
///
/// Each stream runs in its own task on the runtime captured at construction.
/// Responses must be 2xx and, when a `Content-Type` is present, an event
/// stream.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    runtime: Handle,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
}

impl HttpTransport {
    /// Build a transport for `config` on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if called outside a runtime or the HTTP client cannot
    /// be built.
    pub fn new(config: &EventSourceConfig) -> EventSourceResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| EventSourceError::runtime(format!("No tokio runtime: {e}")))?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| EventSourceError::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client, runtime, config))
    }

    /// Build a transport around an existing client.
    pub fn with_client(client: reqwest::Client, runtime: Handle, config: &EventSourceConfig) -> Self {
        Self {
            client,
            runtime,
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
        }
    }
}

impl Transport for HttpTransport {
    fn open_stream(&self, request: StreamRequest, sink: Arc<dyn StreamSink>) -> StreamHandle {
        let task = self.runtime.spawn(run_stream(
            self.client.clone(),
            request,
            self.connect_timeout,
            self.read_timeout,
            sink,
        ));
        StreamHandle::from_task(task.abort_handle())
    }
}

async fn run_stream(
    client: reqwest::Client,
    request: StreamRequest,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
    sink: Arc<dyn StreamSink>,
) {
    match read_stream(&client, request, connect_timeout, read_timeout, sink.as_ref()).await {
        Ok(()) => {
            debug!("SSE response ended");
            sink.on_complete();
        }
        Err(err) => {
            warn!(error = %err, "SSE request failed");
            sink.on_error(Some(err));
        }
    }
}

async fn read_stream(
    client: &reqwest::Client,
    request: StreamRequest,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
    sink: &dyn StreamSink,
) -> Result<(), TransportError> {
    let resp = timeout(
        connect_timeout,
        client.get(&request.url).headers(request.headers).send(),
    )
    .await
    .map_err(|_| TransportError::timeout(connect_timeout))??;

    let status = resp.status();
    if !status.is_success() {
        return Err(TransportError::invalid_status(status));
    }

    if let Some(ct) = resp.headers().get(::http::header::CONTENT_TYPE) {
        let ct_str = ct.to_str().unwrap_or("");
        if !ct_str.contains("text/event-stream") {
            return Err(TransportError::invalid_content_type(ct_str));
        }
    }

    let mut body = resp.bytes_stream();
    loop {
        let next = match read_timeout {
            Some(limit) => timeout(limit, body.next())
                .await
                .map_err(|_| TransportError::timeout(limit))?,
            None => body.next().await,
        };

        match next {
            Some(Ok(chunk)) => sink.on_chunk(chunk),
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        }
    }
}
