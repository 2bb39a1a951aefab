//! TCP Remote Client - 远程 worker 控制客户端
//!
//! 实现 RemoteWorkerPort trait。连接时只做一次探测（建立后立即关闭），
//! 之后每个操作独立建立短连接：
//!
//! - 控制端口：指令帧 → 逐行日志响应，GET_CONF 返回一行 JSON，GET_RESULTS 返回结果记录流
//! - 传输端口：usage + filename 帧 → 文件字节，发送方关闭写端结束

use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::file_transfer::TransferSession;
use super::framing::{with_timeout, write_frame};
use super::result_retrieval::ResultReceiver;
use crate::application::ports::{ConsolePort, ProgressPort, RemoteError, RemoteWorkerPort};
use crate::domain::{EndpointAddress, FileUsage, Instruction, RemoteEndpoint, TrainingConfig};
use crate::infrastructure::events::relay_lines_with_idle_timeout;

/// 远程客户端配置
#[derive(Debug, Clone)]
pub struct RemoteClientConfig {
    /// 文件传输端口（与控制端口不同）
    pub transfer_port: u16,
    /// 建立连接超时，None 为系统默认
    pub connect_timeout: Option<Duration>,
    /// 单次读写超时，None 为无限等待
    pub io_timeout: Option<Duration>,
    /// 上传分片大小（字节）
    pub fragment_size: usize,
}

impl Default for RemoteClientConfig {
    fn default() -> Self {
        Self {
            transfer_port: 23333,
            connect_timeout: None,
            io_timeout: None,
            fragment_size: 1024,
        }
    }
}

/// 单次指令交换的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExchangeState {
    Idle,
    Connecting,
    Sending,
    AwaitingResponse,
    StreamingResponse,
    Closed,
}

/// 指令交换追踪（只用于日志）
struct Exchange {
    kind: &'static str,
    state: ExchangeState,
}

impl Exchange {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            state: ExchangeState::Idle,
        }
    }

    fn enter(&mut self, next: ExchangeState) {
        tracing::debug!(instruction = self.kind, from = ?self.state, to = ?next, "Exchange state");
        self.state = next;
    }

    fn fail(&mut self, err: RemoteError) -> RemoteError {
        tracing::debug!(instruction = self.kind, at = ?self.state, error = %err, "Exchange failed");
        self.state = ExchangeState::Closed;
        err
    }
}

/// TCP 远程客户端
pub struct TcpRemoteClient {
    endpoint: RemoteEndpoint,
    config: RemoteClientConfig,
    console: Arc<dyn ConsolePort>,
    closed: AtomicBool,
}

impl TcpRemoteClient {
    /// 解析地址并探测控制端口
    pub async fn connect(
        address: EndpointAddress,
        config: RemoteClientConfig,
        console: Arc<dyn ConsolePort>,
    ) -> Result<Self, RemoteError> {
        let resolved = with_timeout(
            config.connect_timeout,
            tokio::net::lookup_host((address.host.as_str(), address.port)),
        )
        .await
        .map_err(|e| {
            let err = RemoteError::connect(&address, e);
            console.error(&err.to_string());
            err
        })?
        .next();

        let Some(addr) = resolved else {
            let err = RemoteError::connect(&address, "no address resolved");
            console.error(&err.to_string());
            return Err(err);
        };

        let client = Self {
            endpoint: RemoteEndpoint::new(address.host.clone(), addr),
            config,
            console,
            closed: AtomicBool::new(false),
        };

        // 探测：建立后立即关闭
        let probe = client.open(addr).await?;
        drop(probe);

        tracing::info!(endpoint = %client.endpoint, "Remote worker reachable");
        client
            .console
            .info(&format!("Connected to {}", client.endpoint));
        Ok(client)
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn config(&self) -> &RemoteClientConfig {
        &self.config
    }

    /// 建立新连接；连接失败后端点视为失效
    async fn open(&self, addr: SocketAddr) -> Result<TcpStream, RemoteError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.report(RemoteError::Closed));
        }

        match with_timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                self.closed.store(true, Ordering::SeqCst);
                let err = RemoteError::connect(addr, e);
                self.console.error(&err.to_string());
                Err(err)
            }
        }
    }

    /// 打开控制连接并写出指令帧
    async fn start_exchange(
        &self,
        exchange: &mut Exchange,
        instruction: &Instruction,
    ) -> Result<TcpStream, RemoteError> {
        let wire = instruction
            .to_wire()
            .map_err(|e| self.report(exchange.fail(RemoteError::protocol(e.to_string()))))?;

        exchange.enter(ExchangeState::Connecting);
        let mut stream = match self.open(self.endpoint.control_addr()).await {
            Ok(stream) => stream,
            Err(e) => return Err(exchange.fail(e)),
        };

        exchange.enter(ExchangeState::Sending);
        if let Err(e) = with_timeout(self.config.io_timeout, write_frame(&mut stream, &wire)).await {
            return Err(self.report(exchange.fail(RemoteError::transfer(e.to_string()))));
        }

        exchange.enter(ExchangeState::AwaitingResponse);
        Ok(stream)
    }

    /// 诊断写入控制台后原样返回
    fn report(&self, err: RemoteError) -> RemoteError {
        self.console.error(&err.to_string());
        err
    }
}

#[async_trait]
impl RemoteWorkerPort for TcpRemoteClient {
    fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn send_instruction(&self, instruction: &Instruction) -> Result<(), RemoteError> {
        tracing::info!(endpoint = %self.endpoint, instruction = %instruction, "Sending instruction");
        let mut exchange = Exchange::new(instruction.kind());
        let stream = self.start_exchange(&mut exchange, instruction).await?;

        exchange.enter(ExchangeState::StreamingResponse);
        let lines = relay_lines_with_idle_timeout(stream, self.console.as_ref(), self.config.io_timeout)
            .await
            .map_err(|e| self.report(exchange.fail(RemoteError::transfer(e.to_string()))))?;

        exchange.enter(ExchangeState::Closed);
        tracing::debug!(instruction = instruction.kind(), lines = lines, "Instruction completed");
        Ok(())
    }

    async fn fetch_config(&self) -> Result<TrainingConfig, RemoteError> {
        let mut exchange = Exchange::new("GET_CONF");
        let stream = self.start_exchange(&mut exchange, &Instruction::GetConf).await?;

        exchange.enter(ExchangeState::StreamingResponse);
        let mut line = String::new();
        let mut reader = BufReader::new(stream);
        let read = with_timeout(self.config.io_timeout, reader.read_line(&mut line))
            .await
            .map_err(|e| self.report(exchange.fail(RemoteError::transfer(e.to_string()))))?;
        if read == 0 {
            return Err(self.report(exchange.fail(RemoteError::protocol(
                "empty GET_CONF response",
            ))));
        }

        let config = serde_json::from_str(line.trim_end())
            .ok()
            .and_then(TrainingConfig::from_value)
            .ok_or_else(|| {
                self.report(exchange.fail(RemoteError::protocol(
                    "GET_CONF response is not a JSON object",
                )))
            })?;

        exchange.enter(ExchangeState::Closed);
        Ok(config)
    }

    async fn fetch_results(&self, destination: &Path) -> Result<usize, RemoteError> {
        let mut exchange = Exchange::new("GET_RESULTS");
        let stream = self
            .start_exchange(&mut exchange, &Instruction::GetResults)
            .await?;

        exchange.enter(ExchangeState::StreamingResponse);
        let receiver = ResultReceiver {
            destination,
            io_timeout: self.config.io_timeout,
            console: self.console.as_ref(),
        };
        let mut reader = BufReader::new(stream);
        let count = receiver
            .receive(&mut reader)
            .await
            .map_err(|e| self.report(exchange.fail(e)))?;

        exchange.enter(ExchangeState::Closed);
        self.console.info(&format!(
            "Received {} result file(s) into {}",
            count,
            destination.display()
        ));
        Ok(count)
    }

    async fn transfer(
        &self,
        usage: FileUsage,
        file: &Path,
        progress: &dyn ProgressPort,
    ) -> Result<u64, RemoteError> {
        let file_name = file
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                self.report(RemoteError::transfer(format!(
                    "invalid file name: {}",
                    file.display()
                )))
            })?;

        let mut source = tokio::fs::File::open(file).await.map_err(|e| {
            self.report(RemoteError::transfer(format!("{}: {}", file.display(), e)))
        })?;
        let total = source
            .metadata()
            .await
            .map_err(|e| self.report(RemoteError::transfer(format!("{}: {}", file.display(), e))))?
            .len();

        let mut stream = self
            .open(self.endpoint.with_port(self.config.transfer_port))
            .await?;

        let session = TransferSession {
            usage,
            file_name,
            total,
            fragment_size: self.config.fragment_size,
            io_timeout: self.config.io_timeout,
        };
        let sent = async {
            let sent = session.send(&mut stream, &mut source, progress).await?;
            stream.shutdown().await?;
            Ok::<_, std::io::Error>(sent)
        }
        .await
        .map_err(|e| {
            self.report(RemoteError::transfer(format!("sending {}: {}", file_name, e)))
        })?;

        tracing::info!(
            endpoint = %self.endpoint,
            file = %file_name,
            usage = %usage,
            bytes = sent,
            "File transferred"
        );
        Ok(sent)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!(endpoint = %self.endpoint, "Remote client closed");
        }
    }
}
