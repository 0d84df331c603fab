//! Stream framing: newline-delimited JSON and raw file frames

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::error::{SwarmError, SwarmResult};

/// Largest accepted envelope line or file frame (16 MiB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Write one message as a single JSON line
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> SwarmResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    debug!(bytes = line.len(), "write_message: sent");
    Ok(())
}

/// Read one JSON line, bounded by `MAX_MESSAGE_SIZE`
pub async fn read_message<R, T>(reader: &mut R) -> SwarmResult<T>
where
    R: AsyncRead + Unpin + ?Sized,
    T: DeserializeOwned,
{
    let mut limited = BufReader::new(reader.take(MAX_MESSAGE_SIZE as u64 + 1));
    let mut line = String::new();
    let bytes_read = limited.read_line(&mut line).await?;

    if bytes_read > MAX_MESSAGE_SIZE {
        return Err(SwarmError::Protocol(format!("Message too large: {} bytes", bytes_read)));
    }
    if line.trim().is_empty() {
        return Err(SwarmError::Protocol("No data received".to_string()));
    }

    debug!(bytes = bytes_read, "read_message: received");
    Ok(serde_json::from_str(line.trim())?)
}

/// Send `name NUL bytes` and close the write half
pub async fn write_file_frame<W>(writer: &mut W, file_name: &str, data: &[u8]) -> SwarmResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if file_name.is_empty() || file_name.contains('\0') {
        return Err(SwarmError::Protocol(format!("Invalid file name: {:?}", file_name)));
    }
    writer.write_all(file_name.as_bytes()).await?;
    writer.write_all(&[0]).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}

/// Read a file frame to EOF and split it at the first NUL
pub async fn read_file_frame<R>(reader: &mut R) -> SwarmResult<(String, Vec<u8>)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut data = Vec::new();
    reader.take(MAX_MESSAGE_SIZE as u64 + 1).read_to_end(&mut data).await?;
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(SwarmError::Protocol(format!("File frame too large: {} bytes", data.len())));
    }

    let nul = data
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| SwarmError::Protocol("Invalid file format".to_string()))?;
    let name = String::from_utf8(data[..nul].to_vec())
        .map_err(|_| SwarmError::Protocol("File name is not valid UTF-8".to_string()))?;
    let body = data.split_off(nul + 1);
    Ok((name, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{MessageType, RequestEnvelope, ResponseEnvelope, ResponseStatus};
    use serde_json::json;

    #[tokio::test]
    async fn test_request_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let env = RequestEnvelope::new(MessageType::TaskResult, &json!({"proposalId": "p"})).unwrap();

        write_message(&mut client, &env).await.unwrap();
        let received: RequestEnvelope = read_message(&mut server).await.unwrap();
        assert_eq!(received, env);

        write_message(&mut server, &ResponseEnvelope::ok(json!(1))).await.unwrap();
        let resp: ResponseEnvelope = read_message(&mut client).await.unwrap();
        assert_eq!(resp.status, ResponseStatus::Ok);
    }

    #[tokio::test]
    async fn test_empty_stream_is_no_data() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let err = read_message::<_, RequestEnvelope>(&mut server).await.unwrap_err();
        assert_eq!(err.to_string(), "Protocol error: No data received");
    }

    #[tokio::test]
    async fn test_garbage_is_protocol_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"not json\n").await.unwrap();
        let err = read_message::<_, RequestEnvelope>(&mut server).await.unwrap_err();
        assert!(matches!(err, SwarmError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_file_frame() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let payload = vec![1u8, 0, 2, 3];
        let writer = tokio::spawn(async move {
            write_file_frame(&mut client, "input.bin", &payload).await.unwrap();
        });
        let (name, data) = read_file_frame(&mut server).await.unwrap();
        writer.await.unwrap();
        assert_eq!(name, "input.bin");
        assert_eq!(data, vec![1u8, 0, 2, 3]);
    }

    #[tokio::test]
    async fn test_file_frame_without_separator() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"no separator").await.unwrap();
        drop(client);
        let err = read_file_frame(&mut server).await.unwrap_err();
        assert_eq!(err.to_string(), "Protocol error: Invalid file format");
    }
}
