//! Line Relay - 将字节流逐行转发到控制台
//!
//! 子进程 stdout/stderr 和远程指令响应共用；按 UTF-8 解码（非法字节替换），
//! 每读到一行立即转发，不等待流结束

use std::borrow::Cow;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::application::ports::ConsolePort;

/// 转发 reader 中的所有行，返回转发的行数
///
/// 流中途出错时返回错误，已转发的行不受影响
pub async fn relay_lines<R>(reader: R, console: &dyn ConsolePort) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    relay_lines_with_idle_timeout(reader, console, None).await
}

/// 同 [`relay_lines`]，但两行之间超过 `idle` 没有数据时返回 `TimedOut`
pub async fn relay_lines_with_idle_timeout<R>(
    reader: R,
    console: &dyn ConsolePort,
    idle: Option<Duration>,
) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);
    let mut count = 0;

    loop {
        buf.clear();
        let read = match idle {
            Some(limit) => tokio::time::timeout(limit, reader.read_until(b'\n', &mut buf))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no output within idle timeout"))??,
            None => reader.read_until(b'\n', &mut buf).await?,
        };
        if read == 0 {
            return Ok(count);
        }
        console.output(&decode_line(&buf));
        count += 1;
    }
}

/// 去掉行尾换行并解码
pub fn decode_line(buf: &[u8]) -> Cow<'_, str> {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && buf[end - 1] == b'\r' {
        end -= 1;
    }
    String::from_utf8_lossy(&buf[..end])
}
