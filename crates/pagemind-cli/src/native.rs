//! Native-messaging host.
//!
//! Each message is a JSON object preceded by its length as a 4-byte
//! native-endian integer. Requests read from the input are routed to the
//! background context and answered on the output, echoing the request's
//! `id` when it has one. Lifecycle notifications are written to the output
//! as they happen. Stdout belongs to the protocol; logs go to stderr.

use std::sync::Arc;

use anyhow::Context as _;
use futures::{SinkExt, StreamExt};
use pagemind_runtime::{Error, Port, Request, Response, Subscription};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// Largest message accepted from the browser
const MAX_INCOMING_BYTES: usize = 64 * 1024 * 1024;

/// Largest message the browser accepts from a host
const MAX_OUTGOING_BYTES: usize = 1024 * 1024;

type FrameSink<W> = Arc<Mutex<FramedWrite<W, LengthDelimitedCodec>>>;

fn codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .native_endian()
        .max_frame_length(max_frame_length)
        .new_codec()
}

/// Serve native messaging on stdin/stdout until stdin closes
pub async fn run_stdio(background: Port, notifications: Subscription) -> anyhow::Result<()> {
    tracing::info!("Native host starting");
    serve(
        tokio::io::stdin(),
        tokio::io::stdout(),
        background,
        notifications,
    )
    .await?;
    tracing::info!("Native host shut down cleanly");
    Ok(())
}

/// Serve native messaging over arbitrary streams.
///
/// Requests are handled concurrently; responses may be written out of
/// order, so callers match them up by `id`. Returns once the input ends
/// and every in-flight request has been answered.
pub async fn serve<R, W>(
    input: R,
    output: W,
    background: Port,
    mut notifications: Subscription,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut frames = FramedRead::new(input, codec(MAX_INCOMING_BYTES));
    let sink: FrameSink<W> = Arc::new(Mutex::new(FramedWrite::new(
        output,
        codec(MAX_OUTGOING_BYTES),
    )));

    let forward_sink = sink.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            if let Err(e) = write_json(&forward_sink, &notification).await {
                tracing::warn!("Failed to forward notification; stopping forwarder: {:#}", e);
                break;
            }
        }
    });

    let mut in_flight = JoinSet::new();
    let mut read_error = None;

    while let Some(frame) = frames.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                read_error = Some(e);
                break;
            }
        };
        let background = background.clone();
        let sink = sink.clone();
        in_flight.spawn(async move {
            let (id, response) = handle_frame(&frame, &background).await;
            if let Err(e) = write_json(&sink, &reply(id.clone(), &response)).await {
                tracing::warn!("Failed to write response: {:#}", e);
                let failure = undeliverable(id, &e);
                if let Err(e) = write_json(&sink, &failure).await {
                    tracing::warn!("Failed to write failure response: {:#}", e);
                }
            }
        });
        reap(&mut in_flight);
    }

    while let Some(joined) = in_flight.join_next().await {
        log_join(joined);
    }
    forwarder.abort();
    let _ = forwarder.await;

    match read_error {
        Some(e) => Err(e).context("failed to read native message"),
        None => Ok(()),
    }
}

/// Drop request tasks that have already finished
fn reap(in_flight: &mut JoinSet<()>) {
    while let Some(joined) = in_flight.try_join_next() {
        log_join(joined);
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!("Request task failed: {}", e);
    }
}

/// Decode one message and route it. Returns the request id, if any, with the response.
async fn handle_frame(frame: &[u8], background: &Port) -> (Option<Value>, Response) {
    let message: Value = match serde_json::from_slice(frame) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Malformed native message: {}", e);
            let error = Error::InvalidRequest(format!("malformed JSON: {e}"));
            return (None, Response::failure(&error));
        }
    };

    let id = message.get("id").cloned();
    let response = match Request::from_value(message) {
        Ok(request) => background.send(request).await,
        Err(e) => Response::failure(&e),
    };
    (id, response)
}

/// Short failure sent in place of a response that could not be written
fn undeliverable(id: Option<Value>, error: &anyhow::Error) -> Value {
    let mut value = serde_json::json!({
        "success": false,
        "error": format!("Response could not be sent: {}", error.root_cause()),
    });
    if let (Some(id), Some(object)) = (id, value.as_object_mut()) {
        object.insert("id".to_string(), id);
    }
    value
}

fn reply(id: Option<Value>, response: &Response) -> Value {
    let mut value = serde_json::to_value(response).unwrap_or_else(|e| {
        serde_json::json!({"success": false, "error": format!("failed to encode response: {e}")})
    });
    if let (Some(id), Some(object)) = (id, value.as_object_mut()) {
        object.insert("id".to_string(), id);
    }
    value
}

async fn write_json<W, T>(sink: &FrameSink<W>, value: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = serde_json::to_vec(value).context("failed to encode message")?;
    sink.lock()
        .await
        .send(Bytes::from(bytes))
        .await
        .context("failed to write message")?;
    Ok(())
}
