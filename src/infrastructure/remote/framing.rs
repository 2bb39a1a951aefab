//! Wire Framing
//!
//! 文本帧：2 字节大端长度 + UTF-8 字节；结果记录的负载长度为 4 字节大端有符号整数

use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// 文本帧最大字节数
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// 写出一个长度前缀文本帧
pub async fn write_frame<W>(writer: &mut W, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = text.as_bytes();
    if bytes.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame too long: {} bytes", bytes.len()),
        ));
    }
    writer.write_u16(bytes.len() as u16).await?;
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// 读取一个长度前缀文本帧
pub async fn read_frame<R>(reader: &mut R) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u16().await? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// 给 I/O future 加上可选的超时；None 表示沿用系统默认（无限等待）
pub async fn with_timeout<F, T>(limit: Option<Duration>, future: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "operation timed out"))?,
        None => future.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_layout() {
        let mut buf = Vec::new();
        write_frame(&mut buf, "TO_SLICE").await.unwrap();
        assert_eq!(&buf[..2], &[0, 8]);
        assert_eq!(&buf[2..], b"TO_SLICE");

        let mut reader = &buf[..];
        assert_eq!(read_frame(&mut reader).await.unwrap(), "TO_SLICE");
    }

    #[tokio::test]
    async fn test_non_ascii_frame_uses_utf8_length() {
        let mut buf = Vec::new();
        write_frame(&mut buf, "说话人").await.unwrap();
        assert_eq!(u16::from_be_bytes([buf[0], buf[1]]), 9);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let mut buf = Vec::new();
        let text = "x".repeat(MAX_FRAME_LEN + 1);
        let err = write_frame(&mut buf, &text).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_frame() {
        let mut reader = &[0u8, 5, b'a', b'b'][..];
        let err = read_frame(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_timeout() {
        let (_writer, mut reader) = tokio::io::duplex(16);
        let err = with_timeout(Some(Duration::from_millis(20)), read_frame(&mut reader))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
