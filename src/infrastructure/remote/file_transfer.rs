//! File Transfer Channel
//!
//! 会话格式：usage 帧 + filename 帧 + 原始文件字节，发送方关闭写端表示结束。
//! 每个分片写出并 flush 后上报一次百分比进度。

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::framing::{with_timeout, write_frame};
use crate::application::ports::ProgressPort;
use crate::domain::FileUsage;

/// 单文件上传参数
pub struct TransferSession<'a> {
    pub usage: FileUsage,
    pub file_name: &'a str,
    /// 文件总字节数，用于计算进度
    pub total: u64,
    pub fragment_size: usize,
    pub io_timeout: Option<Duration>,
}

impl TransferSession<'_> {
    /// 发送头部和文件内容，返回发送的负载字节数
    pub async fn send<W, R>(
        &self,
        writer: &mut W,
        source: &mut R,
        progress: &dyn ProgressPort,
    ) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin,
        R: AsyncRead + Unpin,
    {
        with_timeout(self.io_timeout, write_frame(writer, self.usage.as_str())).await?;
        with_timeout(self.io_timeout, write_frame(writer, self.file_name)).await?;

        let mut buf = vec![0u8; self.fragment_size.max(1)];
        let mut sent: u64 = 0;

        loop {
            let filled = fill_fragment(source, &mut buf).await?;
            if filled == 0 {
                break;
            }
            with_timeout(self.io_timeout, async {
                writer.write_all(&buf[..filled]).await?;
                writer.flush().await
            })
            .await?;
            sent += filled as u64;
            progress.file_progress(self.file_name, percent_of(sent, self.total));
        }

        // 空文件没有分片，直接报告完成
        if sent == 0 {
            progress.file_progress(self.file_name, 100);
        }

        tracing::debug!(file = %self.file_name, usage = %self.usage, bytes = sent, "File sent");
        Ok(sent)
    }
}

/// 读满一个分片（文件结尾除外）
async fn fill_fragment<R>(source: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// floor(sent / total * 100)，封顶 100
fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (sent.saturating_mul(100) / total).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<u8>>);

    impl ProgressPort for Recorder {
        fn file_progress(&self, _file_name: &str, percent: u8) {
            self.0.lock().unwrap().push(percent);
        }
    }

    fn session(name: &str, total: u64) -> TransferSession<'_> {
        TransferSession {
            usage: FileUsage::ToInfer,
            file_name: name,
            total,
            fragment_size: 1024,
            io_timeout: None,
        }
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(0, 0), 100);
        assert_eq!(percent_of(1023, 2048), 49);
        assert_eq!(percent_of(2048, 2048), 100);
        assert_eq!(percent_of(3000, 2048), 100);
    }

    #[tokio::test]
    async fn test_send_layout_and_progress() {
        let payload = vec![7u8; 2048];
        let progress = Recorder::default();
        let mut wire = Vec::new();

        let sent = session("a.wav", 2048)
            .send(&mut wire, &mut &payload[..], &progress)
            .await
            .unwrap();
        assert_eq!(sent, 2048);

        // [len]TO_INFER [len]a.wav payload
        assert_eq!(&wire[..10], b"\x00\x08TO_INFER");
        assert_eq!(&wire[10..17], b"\x00\x05a.wav");
        assert_eq!(&wire[17..], &payload[..]);
        assert_eq!(*progress.0.lock().unwrap(), vec![50, 100]);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_for_odd_sizes() {
        let payload = vec![1u8; 5000];
        let progress = Recorder::default();
        let mut wire = Vec::new();

        session("b.wav", 5000)
            .send(&mut wire, &mut &payload[..], &progress)
            .await
            .unwrap();

        let values = progress.0.lock().unwrap().clone();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(values.last(), Some(&100));
        assert_eq!(values.len(), 5);
    }

    #[tokio::test]
    async fn test_progress_reported_for_every_fragment() {
        let payload = vec![3u8; 300];
        let progress = Recorder::default();
        let mut wire = Vec::new();

        let mut small = session("c.wav", 300);
        small.fragment_size = 1;
        small
            .send(&mut wire, &mut &payload[..], &progress)
            .await
            .unwrap();

        let values = progress.0.lock().unwrap().clone();
        assert_eq!(values.len(), 300);
        assert_eq!(values[0], 0);
        assert_eq!(values[2], 1);
        assert_eq!(values.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_empty_file_reports_completion_once() {
        let progress = Recorder::default();
        let mut wire = Vec::new();

        let sent = session("empty.wav", 0)
            .send(&mut wire, &mut &b""[..], &progress)
            .await
            .unwrap();
        assert_eq!(sent, 0);
        assert_eq!(*progress.0.lock().unwrap(), vec![100]);
    }
}
