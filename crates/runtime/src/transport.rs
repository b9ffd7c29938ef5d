//! Transports - byte-stream and message-stream framing.
//!
//! Two encodings are supported:
//!
//! - [`PipeTransport`]: every frame is a 4-byte little-endian length followed
//!   by that many bytes of UTF-8 JSON. Used over a driver's stdio pipes.
//! - [`WebSocketTransport`]: one JSON document per text frame.
//!
//! Both split into a sender half ([`Transport`]) and a receiver half
//! ([`TransportReceiver`]) whose read loop pushes decoded messages into an
//! unbounded channel. The channel closing, together with the loop's return
//! value, is how the connection learns the transport is gone.


use std::future::Future;
use std::io;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};

use crate::error::{Error, Result};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Sending half of a transport.
pub trait Transport: Send {
	/// Writes one message as one frame.
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>>;

	/// Closes the outgoing direction. The peer observes end of stream.
	fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Receiving half of a transport.
pub trait TransportReceiver: Send {
	/// Reads frames until the stream ends or fails.
	///
	/// Returns `Ok(())` when the stream ended cleanly or the message channel
	/// was dropped.
	fn run(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// Both halves of a transport plus the channel its reader feeds.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

impl std::fmt::Debug for TransportParts {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TransportParts").finish_non_exhaustive()
	}
}

/// Maps a write failure: a gone peer becomes [`Error::ChannelClosed`].
fn write_error(err: io::Error) -> Error {
	match err.kind() {
		io::ErrorKind::BrokenPipe
		| io::ErrorKind::ConnectionReset
		| io::ErrorKind::ConnectionAborted
		| io::ErrorKind::NotConnected
		| io::ErrorKind::UnexpectedEof
		| io::ErrorKind::WriteZero => Error::ChannelClosed,
		_ => Error::TransportError(format!("Failed to write frame: {err}")),
	}
}

async fn write_frame<W>(writer: &mut W, message: &Value) -> Result<()>
where
	W: AsyncWrite + Unpin,
{
	let bytes = serde_json::to_vec(message)?;
	let length = u32::try_from(bytes.len()).map_err(|_| {
		Error::InvalidArgument(format!("message of {} bytes exceeds the frame limit", bytes.len()))
	})?;

	writer.write_all(&length.to_le_bytes()).await.map_err(write_error)?;
	writer.write_all(&bytes).await.map_err(write_error)?;
	writer.flush().await.map_err(write_error)
}

/// Reads frames until EOF or error. `read_exact` loops over partial reads,
/// so payloads larger than the pipe buffer are reassembled.
async fn read_frames<R>(reader: &mut R, message_tx: &mpsc::UnboundedSender<Value>) -> Result<()>
where
	R: AsyncRead + Unpin,
{
	loop {
		let mut len_buf = [0u8; 4];
		reader
			.read_exact(&mut len_buf)
			.await
			.map_err(|e| Error::TransportError(format!("Failed to read length prefix: {e}")))?;
		let length = u32::from_le_bytes(len_buf) as usize;

		let mut payload = vec![0u8; length];
		reader.read_exact(&mut payload).await.map_err(|e| {
			Error::TransportError(format!("Failed to read {length}-byte frame: {e}"))
		})?;

		let message: Value = serde_json::from_slice(&payload)
			.map_err(|e| Error::ProtocolError(format!("frame is not valid JSON: {e}")))?;

		if message_tx.send(message).is_err() {
			tracing::debug!("message channel closed, stopping pipe reader");
			return Ok(());
		}
	}
}

/// Length-prefixed transport over any async byte stream pair.
pub struct PipeTransport<W, R> {
	writer: W,
	reader: R,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<W, R> PipeTransport<W, R>
where
	W: AsyncWrite + Unpin + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
{
	/// Creates a transport writing to `writer` and reading from `reader`.
	pub fn new(writer: W, reader: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		(
			Self {
				writer,
				reader,
				message_tx,
			},
			message_rx,
		)
	}

	pub async fn send(&mut self, message: Value) -> Result<()> {
		write_frame(&mut self.writer, &message).await
	}

	/// Runs the read loop in place.
	pub async fn run(&mut self) -> Result<()> {
		read_frames(&mut self.reader, &self.message_tx).await
	}

	pub fn into_parts(self) -> (PipeTransportSender<W>, PipeTransportReceiver<R>) {
		(
			PipeTransportSender {
				writer: self.writer,
			},
			PipeTransportReceiver {
				reader: self.reader,
				message_tx: self.message_tx,
			},
		)
	}

	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		let (sender, receiver) = self.into_parts();
		TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		}
	}
}

/// Writing half of a [`PipeTransport`].
pub struct PipeTransportSender<W> {
	writer: W,
}

impl<W> PipeTransportSender<W>
where
	W: AsyncWrite + Unpin + Send,
{
	pub async fn send(&mut self, message: Value) -> Result<()> {
		write_frame(&mut self.writer, &message).await
	}
}

impl<W> Transport for PipeTransportSender<W>
where
	W: AsyncWrite + Unpin + Send,
{
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move { write_frame(&mut self.writer, &message).await })
	}

	fn close(&mut self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			match self.writer.shutdown().await {
				Ok(()) => Ok(()),
				Err(err) => match write_error(err) {
					Error::ChannelClosed => Ok(()),
					other => Err(other),
				},
			}
		})
	}
}

/// Reading half of a [`PipeTransport`].
pub struct PipeTransportReceiver<R> {
	reader: R,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<R> TransportReceiver for PipeTransportReceiver<R>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	fn run(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move { read_frames(&mut self.reader, &self.message_tx).await })
	}
}

/// One JSON document per WebSocket text frame.
pub struct WebSocketTransport;

impl WebSocketTransport {
	/// Connects to `url` (`ws://` or `wss://`) and splits the socket.
	pub async fn connect(url: &str) -> Result<TransportParts> {
		let (stream, _response) = tokio_tungstenite::connect_async(url)
			.await
			.map_err(|e| Error::ConnectionFailed(format!("{url}: {e}")))?;
		tracing::debug!(url, "websocket connected");
		Ok(Self::from_stream(stream))
	}

	/// Wraps an established WebSocket stream.
	pub fn from_stream<S>(stream: WebSocketStream<S>) -> TransportParts
	where
		S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
	{
		let (sink, stream) = stream.split();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		TransportParts {
			sender: Box::new(WebSocketSender { sink }),
			receiver: Box::new(WebSocketReceiver { stream, message_tx }),
			message_rx,
		}
	}
}

fn ws_write_error(err: tungstenite::Error) -> Error {
	match err {
		tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
			Error::ChannelClosed
		}
		tungstenite::Error::Io(io) => write_error(io),
		other => Error::TransportError(format!("WebSocket write failed: {other}")),
	}
}

struct WebSocketSender<S> {
	sink: SplitSink<WebSocketStream<S>, WsMessage>,
}

impl<S> Transport for WebSocketSender<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send,
{
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			let text = serde_json::to_string(&message)?;
			self.sink
				.send(WsMessage::Text(text.into()))
				.await
				.map_err(ws_write_error)
		})
	}

	fn close(&mut self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			match self.sink.close().await.map_err(ws_write_error) {
				Err(Error::ChannelClosed) => Ok(()),
				other => other,
			}
		})
	}
}

struct WebSocketReceiver<S> {
	stream: SplitStream<WebSocketStream<S>>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<S> TransportReceiver for WebSocketReceiver<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	fn run(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move {
			while let Some(frame) = self.stream.next().await {
				let frame = frame
					.map_err(|e| Error::TransportError(format!("WebSocket read failed: {e}")))?;
				let parsed = match frame {
					WsMessage::Text(text) => serde_json::from_str::<Value>(&text),
					WsMessage::Binary(bytes) => serde_json::from_slice::<Value>(&bytes),
					WsMessage::Close(close) => {
						tracing::debug!(?close, "websocket closed by peer");
						return Ok(());
					}
					_ => continue,
				};
				let message = parsed
					.map_err(|e| Error::ProtocolError(format!("frame is not valid JSON: {e}")))?;

				if self.message_tx.send(message).is_err() {
					tracing::debug!("message channel closed, stopping websocket reader");
					return Ok(());
				}
			}
			Ok(())
		})
	}
}
