//! TCP accept loop and the per-connection command pipeline.
//!
//! Every accepted connection runs as its own task:
//!
//! ```text
//! bytes -> line -> TextCommand (session-tagged) -> VerbCommand
//!       -> Dispatcher -> Response -> "<message>\r\n<prompt>" bytes
//! ```
//!
//! The task awaits each dispatch before it reads the next line, so
//! responses leave in the order their lines arrived even when a dispatch
//! suspends on the registry.  Other connections run on their own tasks
//! and are never blocked by it.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use metrics::{counter, gauge};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::metrics::{CONNECTIONS_ACTIVE, CONNECTIONS_TOTAL};
use crate::session::{Session, VerbCommand};
use crate::verb::Verb;
use crate::AppState;

/// Accept connections on `listener` until `shutdown` is cancelled, then wait
/// up to `server.shutdown_timeout` for open connections to finish.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let tracker = TaskTracker::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let state = Arc::clone(&state);
                    let shutdown = shutdown.clone();
                    tracker.spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, state, shutdown).await {
                            warn!(%peer, "Connection error: {e}");
                        }
                    });
                }
                Err(e) => warn!("Failed to accept connection: {e}"),
            },
        }
    }

    tracker.close();
    info!("Stopped accepting; waiting for {} connection(s)", tracker.len());
    let timeout = Duration::from_secs(state.config.server.shutdown_timeout);
    if tokio::time::timeout(timeout, tracker.wait()).await.is_err() {
        warn!(
            "{} connection(s) still open after {}s",
            tracker.len(),
            timeout.as_secs()
        );
    }
    Ok(())
}

/// Run the command pipeline for one connection until the peer hangs up,
/// sends `CLOSE`, or the server shuts down.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let mut session = Session::new(peer);
    debug!(session = %session.id, %peer, "Connection opened");
    counter!(CONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);

    let result = run_pipeline(stream, &mut session, &state, &shutdown).await;

    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
    debug!(session = %session.id, %peer, "Connection closed");
    result
}

async fn run_pipeline(
    stream: TcpStream,
    session: &mut Session,
    state: &AppState,
    shutdown: &CancellationToken,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = LineReader::new(reader, state.config.server.max_line_length);
    let dispatcher = Dispatcher::new(Arc::clone(&state.registry));
    let prompt = state.config.server.prompt.as_str();

    loop {
        let inbound = tokio::select! {
            _ = shutdown.cancelled() => break,
            inbound = lines.next_line() => inbound?,
        };

        let command = match inbound {
            None => break,
            Some(InboundLine::Text(text)) => session.tag(text).parse(),
            Some(InboundLine::Rejected(reason)) => {
                debug!(session = %session.id, "Rejecting line: {reason}");
                VerbCommand {
                    session: session.clone(),
                    verb: Verb::Illegal,
                }
            }
        };

        let response = dispatcher.dispatch(command).await;
        *session = response.session;

        writer
            .write_all(&format_response(&response.message, prompt))
            .await?;
        writer.flush().await?;

        if session.should_close {
            writer.shutdown().await?;
            break;
        }
    }
    Ok(())
}

/// Render a response message followed by the prompt.
pub fn format_response(message: &str, prompt: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(message.len() + 2 + prompt.len());
    buf.put_slice(message.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(prompt.as_bytes());
    buf.freeze()
}

enum InboundLine {
    Text(String),
    /// A line that never reaches the parser; answered as an illegal command.
    Rejected(&'static str),
}

/// Splits the read half of a connection into lines.
///
/// Lines longer than `max_length` bytes (terminator excluded) and lines that
/// are not valid UTF-8 are reported once as [`InboundLine::Rejected`]; the
/// offending bytes are skipped up to their newline and reading continues
/// with the next line.
struct LineReader {
    reader: OwnedReadHalf,
    codec: LinesCodec,
    max_length: usize,
    buf: BytesMut,
    eof: bool,
}

impl LineReader {
    fn new(reader: OwnedReadHalf, max_length: usize) -> Self {
        Self {
            reader,
            // One extra byte so the CR of a CRLF terminator is not counted.
            codec: LinesCodec::new_with_max_length(max_length.saturating_add(1)),
            max_length,
            buf: BytesMut::with_capacity(1024),
            eof: false,
        }
    }

    async fn next_line(&mut self) -> io::Result<Option<InboundLine>> {
        loop {
            let decoded = if self.eof {
                self.codec.decode_eof(&mut self.buf)
            } else {
                self.codec.decode(&mut self.buf)
            };

            match decoded {
                Ok(Some(line)) if line.len() > self.max_length => {
                    return Ok(Some(InboundLine::Rejected("line too long")))
                }
                Ok(Some(line)) => return Ok(Some(InboundLine::Text(line))),
                Ok(None) if self.eof => return Ok(None),
                Ok(None) => {}
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    return Ok(Some(InboundLine::Rejected("line too long")))
                }
                // The codec has already consumed the line when UTF-8 decoding fails.
                Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                    return Ok(Some(InboundLine::Rejected("invalid UTF-8")))
                }
                Err(LinesCodecError::Io(e)) => return Err(e),
            }

            if self.reader.read_buf(&mut self.buf).await? == 0 {
                self.eof = true;
            }
        }
    }
}
