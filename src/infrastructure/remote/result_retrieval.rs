//! Result Retrieval Channel
//!
//! 记录格式：filename 帧 + 4 字节大端长度 + 负载，对端关闭连接表示结束。
//! 读取文件名时失败视为流结束；读取长度或负载时失败是传输错误。

use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::framing::{read_frame, with_timeout};
use crate::application::ports::{ConsolePort, RemoteError};

/// 结果接收器
pub struct ResultReceiver<'a> {
    pub destination: &'a Path,
    pub io_timeout: Option<Duration>,
    pub console: &'a dyn ConsolePort,
}

impl ResultReceiver<'_> {
    /// 接收全部记录，返回写入的文件数
    pub async fn receive<R>(&self, reader: &mut R) -> Result<usize, RemoteError>
    where
        R: AsyncRead + Unpin,
    {
        let mut written = 0;

        loop {
            let file_name = match with_timeout(self.io_timeout, read_frame(reader)).await {
                Ok(name) => name,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    self.console
                        .warn(&format!("Result stream ended after {} file(s): {}", written, e));
                    break;
                }
            };
            let target = self.target_path(&file_name)?;
            if written == 0 {
                // 收到第一条记录时才创建目标目录
                tokio::fs::create_dir_all(self.destination).await.map_err(|e| {
                    RemoteError::transfer(format!(
                        "creating {}: {}",
                        self.destination.display(),
                        e
                    ))
                })?;
            }

            let len = with_timeout(self.io_timeout, reader.read_i32())
                .await
                .map_err(|e| {
                    RemoteError::transfer(format!("reading length of \"{}\": {}", file_name, e))
                })?;
            let len = u64::try_from(len).map_err(|_| {
                RemoteError::protocol(format!("negative length {} for \"{}\"", len, file_name))
            })?;

            self.write_payload(reader, &target, len).await?;
            written += 1;
            tracing::info!(file = %file_name, bytes = len, "Result file received");
        }

        tracing::debug!(files = written, "Result stream closed");
        Ok(written)
    }

    fn target_path(&self, file_name: &str) -> Result<PathBuf, RemoteError> {
        let mut components = Path::new(file_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => Ok(self.destination.join(name)),
            _ => Err(RemoteError::protocol(format!(
                "refusing result file name \"{}\"",
                file_name
            ))),
        }
    }

    async fn write_payload<R>(&self, reader: &mut R, target: &Path, len: u64) -> Result<(), RemoteError>
    where
        R: AsyncRead + Unpin,
    {
        let mut file = tokio::fs::File::create(target).await.map_err(|e| {
            RemoteError::transfer(format!("creating {}: {}", target.display(), e))
        })?;

        let copied = with_timeout(self.io_timeout, async {
            let mut payload = (&mut *reader).take(len);
            tokio::io::copy(&mut payload, &mut file).await
        })
        .await;

        match copied {
            Ok(n) if n == len => Ok(()),
            Ok(n) => {
                let _ = tokio::fs::remove_file(target).await;
                Err(RemoteError::transfer(format!(
                    "truncated payload for {}: {} of {} bytes",
                    target.display(),
                    n,
                    len
                )))
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(target).await;
                Err(RemoteError::transfer(format!(
                    "receiving {}: {}",
                    target.display(),
                    e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::events::ConsolePublisher;
    use tempfile::tempdir;

    fn record(name: &str, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(&(payload.len() as i32).to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[tokio::test]
    async fn test_receive_records() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.flac"), b"stale").unwrap();
        let console = ConsolePublisher::new();

        let mut stream = record("a.flac", b"fresh");
        stream.extend(record("b.flac", &[0u8; 3000]));

        let receiver = ResultReceiver {
            destination: dir.path(),
            io_timeout: None,
            console: &console,
        };
        let count = receiver.receive(&mut &stream[..]).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(std::fs::read(dir.path().join("a.flac")).unwrap(), b"fresh");
        assert_eq!(std::fs::read(dir.path().join("b.flac")).unwrap().len(), 3000);
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let dir = tempdir().unwrap();
        let console = ConsolePublisher::new();
        let receiver = ResultReceiver {
            destination: dir.path(),
            io_timeout: None,
            console: &console,
        };

        assert_eq!(receiver.receive(&mut &b""[..]).await.unwrap(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_destination_created_on_first_record() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("results");
        let console = ConsolePublisher::new();
        let receiver = ResultReceiver {
            destination: &destination,
            io_timeout: None,
            console: &console,
        };

        assert_eq!(receiver.receive(&mut &b""[..]).await.unwrap(), 0);
        assert!(!destination.exists());

        let stream = record("out.flac", b"abc");
        assert_eq!(receiver.receive(&mut &stream[..]).await.unwrap(), 1);
        assert_eq!(std::fs::read(destination.join("out.flac")).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_truncated_payload_is_transfer_error() {
        let dir = tempdir().unwrap();
        let console = ConsolePublisher::new();
        let mut stream = record("c.flac", &[1u8; 100]);
        stream.truncate(stream.len() - 10);

        let receiver = ResultReceiver {
            destination: dir.path(),
            io_timeout: None,
            console: &console,
        };
        let err = receiver.receive(&mut &stream[..]).await.unwrap_err();
        assert!(matches!(err, RemoteError::Transfer(_)));
        assert!(!dir.path().join("c.flac").exists());
    }

    #[tokio::test]
    async fn test_missing_length_is_transfer_error() {
        let dir = tempdir().unwrap();
        let console = ConsolePublisher::new();
        let stream = b"\x00\x01d\x00\x00".to_vec();

        let receiver = ResultReceiver {
            destination: dir.path(),
            io_timeout: None,
            console: &console,
        };
        let err = receiver.receive(&mut &stream[..]).await.unwrap_err();
        assert!(matches!(err, RemoteError::Transfer(_)));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let console = ConsolePublisher::new();
        let stream = record("../escape.flac", b"x");

        let receiver = ResultReceiver {
            destination: dir.path(),
            io_timeout: None,
            console: &console,
        };
        let err = receiver.receive(&mut &stream[..]).await.unwrap_err();
        assert!(matches!(err, RemoteError::Protocol(_)));
    }
}
