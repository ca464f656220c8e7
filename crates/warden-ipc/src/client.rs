//! IPC client implementation

use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tracing::trace;
use warden_api::{Command, Event, Request, Response, ResponseResult};

use crate::{IpcError, IpcResult};

/// IPC Client for connecting to wardend
pub struct IpcClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_request_id: u64,
    pending_events: VecDeque<Event>,
}

impl IpcClient {
    /// Connect to wardend
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_request_id: 1,
            pending_events: VecDeque::new(),
        })
    }

    /// Send a command and wait for its response.
    ///
    /// Events that arrive first are kept for a later [`EventStream`].
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let request = Request::new(request_id, command);
        let mut json = serde_json::to_string(&request)?;
        json.push('\n');

        self.writer.write_all(json.as_bytes()).await?;

        loop {
            let line = read_message(&mut self.reader).await?;
            let value: Value = serde_json::from_str(&line)?;

            if value.get("request_id").is_none() {
                let event: Event = serde_json::from_value(value)?;
                trace!(event = ?event.payload, "Event buffered while awaiting response");
                self.pending_events.push_back(event);
                continue;
            }

            let response: Response = serde_json::from_value(value)?;
            if response.request_id != request_id {
                return Err(IpcError::InvalidMessage(format!(
                    "Expected response to request {}, got {}",
                    request_id, response.request_id
                )));
            }
            return Ok(response);
        }
    }

    /// Subscribe to events and consume this client to return an event stream
    pub async fn subscribe(mut self) -> IpcResult<EventStream> {
        let response = self.send(Command::SubscribeEvents).await?;

        if let ResponseResult::Err(e) = response.result {
            return Err(IpcError::ServerError(e.message));
        }

        Ok(EventStream {
            reader: self.reader,
            pending: self.pending_events,
            _writer: self.writer,
        })
    }
}

/// Stream of events from wardend
pub struct EventStream {
    reader: BufReader<OwnedReadHalf>,
    pending: VecDeque<Event>,
    // Dropping the write half would half-close the socket
    _writer: OwnedWriteHalf,
}

impl EventStream {
    /// Wait for the next event
    pub async fn next(&mut self) -> IpcResult<Event> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }

        let line = read_message(&mut self.reader).await?;
        let event: Event = serde_json::from_str(&line)?;
        Ok(event)
    }
}

/// Next non-empty line, trimmed
async fn read_message(reader: &mut BufReader<OwnedReadHalf>) -> IpcResult<String> {
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(IpcError::ConnectionClosed);
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;
    use warden_api::{EventPayload, ResponsePayload};

    #[tokio::test]
    async fn events_before_response_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("fake.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();

        // Fake daemon: interleave an event ahead of the subscribe response
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let request: Request = serde_json::from_str(line.trim()).unwrap();

            let event = Event::new(EventPayload::Shutdown);
            let response = Response::success(request.request_id, ResponsePayload::Pong);
            let out = format!(
                "{}\n\n{}\n",
                serde_json::to_string(&event).unwrap(),
                serde_json::to_string(&response).unwrap()
            );
            write_half.write_all(out.as_bytes()).await.unwrap();
        });

        let client = IpcClient::connect(&socket_path).await.unwrap();
        let mut stream = client.subscribe().await.unwrap();

        let event = stream.next().await.unwrap();
        assert!(matches!(event.payload, EventPayload::Shutdown));
        assert!(matches!(stream.next().await, Err(IpcError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn connect_without_server_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = IpcClient::connect(dir.path().join("missing.sock")).await;
        assert!(matches!(result, Err(IpcError::Io(_))));
    }
}
