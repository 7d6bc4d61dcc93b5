//! JSON-lines serve loop
//!
//! Every request line is handled on its own task, so a request waiting on
//! one tree's lock never holds up requests for other trees. Responses are
//! written as they complete; callers correlate them by `id`.

use crate::dispatcher::Dispatcher;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const RESPONSE_BUFFER: usize = 256;

/// Serve requests from `reader` until end of input, then flush the last
/// responses. Returns the number of request lines handled.
pub async fn serve<R, W>(dispatcher: Arc<Dispatcher>, reader: R, mut writer: W) -> io::Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::channel(RESPONSE_BUFFER);

    let read = async move {
        let mut lines = reader.lines();
        let mut handled = 0u64;
        while let Some(line) = lines.next_line().await? {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            handled += 1;
            let dispatcher = dispatcher.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let response = dispatcher.handle_line(&line).await;
                // receiver only goes away if the writer failed
                let _ = tx.send(response).await;
            });
        }
        debug!("serve: input closed after {} requests", handled);
        Ok::<u64, io::Error>(handled)
    };

    let write = async move {
        while let Some(response) = rx.recv().await {
            let mut text = match serde_json::to_string(&response) {
                Ok(text) => text,
                Err(e) => {
                    warn!("serve: dropping unencodable response: {}", e);
                    continue;
                }
            };
            text.push('\n');
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await?;
        }
        Ok::<(), io::Error>(())
    };

    let (handled, ()) = tokio::try_join!(read, write)?;
    info!("serve: finished, {} requests handled", handled);
    Ok(handled)
}
