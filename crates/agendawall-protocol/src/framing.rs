//! Length-prefixed message framing.
//!
//! [`encode_message`]/[`decode_message`] work on complete buffers;
//! [`read_frame`]/[`write_frame`] drive an async stream with a per-call
//! timeout and are what both ends of the control socket use.

use std::io::ErrorKind;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

const PREFIX_LEN: usize = 4;

fn check_len(len: usize) -> ProtocolResult<()> {
    if len > MAX_MESSAGE_SIZE as usize {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}

/// Serializes `message` and prepends its big-endian length.
pub fn encode_message<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    let json = serde_json::to_vec(message)?;
    check_len(json.len())?;

    let mut buffer = Vec::with_capacity(PREFIX_LEN + json.len());
    buffer.extend_from_slice(&(json.len() as u32).to_be_bytes());
    buffer.extend_from_slice(&json);
    Ok(buffer)
}

/// Decodes one complete frame (prefix and payload).
pub fn decode_message<T: DeserializeOwned>(data: &[u8]) -> ProtocolResult<T> {
    let Some((prefix, rest)) = data.split_first_chunk::<PREFIX_LEN>() else {
        return Err(ProtocolError::IncompleteMessage {
            expected: PREFIX_LEN,
            received: data.len(),
        });
    };

    let len = u32::from_be_bytes(*prefix) as usize;
    check_len(len)?;
    if len == 0 {
        return Err(ProtocolError::EmptyMessage);
    }
    let Some(json) = rest.get(..len) else {
        return Err(ProtocolError::IncompleteMessage {
            expected: PREFIX_LEN + len,
            received: data.len(),
        });
    };

    Ok(serde_json::from_slice(json)?)
}

/// Reads one frame from `reader`.
///
/// Returns `Ok(None)` when the peer closed the stream before sending a
/// length prefix.
pub async fn read_frame<R, T>(reader: &mut R, timeout: Duration) -> ProtocolResult<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut prefix = [0u8; PREFIX_LEN];
    match tokio::time::timeout(timeout, reader.read_exact(&mut prefix)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::Timeout {
                operation: "read frame length",
            });
        }
    }

    let len = u32::from_be_bytes(prefix) as usize;
    check_len(len)?;
    if len == 0 {
        return Err(ProtocolError::EmptyMessage);
    }

    let mut payload = vec![0u8; len];
    match tokio::time::timeout(timeout, reader.read_exact(&mut payload)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::Timeout {
                operation: "read frame payload",
            });
        }
    }

    Ok(Some(serde_json::from_slice(&payload)?))
}

/// Writes one frame to `writer` and flushes it.
pub async fn write_frame<W, T>(writer: &mut W, message: &T, timeout: Duration) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let buffer = encode_message(message)?;
    let write = async {
        writer.write_all(&buffer).await?;
        writer.flush().await
    };
    match tokio::time::timeout(timeout, write).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ProtocolError::Timeout {
            operation: "write frame",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Envelope, Request, Response};

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn encode_prefixes_length() {
        let bytes = encode_message(&Envelope::new("r", Request::Ping)).unwrap();
        let len = u32::from_be_bytes(bytes[..4].try_into().unwrap()) as usize;
        assert_eq!(len, bytes.len() - 4);
    }

    #[test]
    fn decode_rejects_short_input() {
        let err = decode_message::<Request>(&[0, 0]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::IncompleteMessage {
                expected: 4,
                received: 2
            }
        ));
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let mut bytes = encode_message(&Request::Status).unwrap();
        bytes.truncate(bytes.len() - 1);
        let err = decode_message::<Request>(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::IncompleteMessage { .. }));
    }

    #[test]
    fn decode_rejects_oversized_prefix() {
        let bytes = (MAX_MESSAGE_SIZE + 1).to_be_bytes();
        let err = decode_message::<Request>(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLarge { .. }));
    }

    #[test]
    fn decode_rejects_empty_frame() {
        let err = decode_message::<Request>(&[0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, ProtocolError::EmptyMessage));
    }

    #[tokio::test]
    async fn frames_over_a_stream() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let request = Envelope::new("req-7", Request::ResyncClock);
        write_frame(&mut client, &request, TIMEOUT).await.unwrap();
        let received: Envelope<Request> = read_frame(&mut server, TIMEOUT).await.unwrap().unwrap();
        assert_eq!(received, request);

        let response = Envelope::new("req-7", Response::Ok);
        write_frame(&mut server, &response, TIMEOUT).await.unwrap();
        let received: Envelope<Response> = read_frame(&mut client, TIMEOUT).await.unwrap().unwrap();
        assert_eq!(received.payload, Response::Ok);
    }

    #[tokio::test]
    async fn clean_close_reads_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let frame: Option<Request> = read_frame(&mut server, TIMEOUT).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn close_mid_payload_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0, 0, 0, 10, b'{']).await.unwrap();
        drop(client);
        let err = read_frame::<_, Request>(&mut server, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (_client, mut server) = tokio::io::duplex(64);
        let err = read_frame::<_, Request>(&mut server, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Timeout {
                operation: "read frame length"
            }
        ));
    }
}
