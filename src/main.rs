//! sovits-agent - 语音模型流水线命令行
//!
//! 本地模式下动作提交到执行队列并等待队列排空；
//! 指定 `--remote`（或配置了默认端点）时委派给远程 worker

mod cli;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{broadcast, oneshot};

use cli::{Cli, Command};
use sovits_agent::application::{ActionOutcome, ApplicationError, PipelineHandler, TaskQueuePort};
use sovits_agent::config::{load_config_from_path, print_config, AppConfig};
use sovits_agent::infrastructure::events::{drain_events, ConsoleEvent, ConsolePublisher};
use sovits_agent::infrastructure::{ExecutionQueue, FileWorkspace, TcpRemoteClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config_from_path(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);
    print_config(&config);

    let console = ConsolePublisher::with_capacity(config.console.capacity).arc();
    let (stop_tx, stop_rx) = oneshot::channel();
    let printer = tokio::spawn(print_console(console.subscribe(), stop_rx));

    let base = std::env::current_dir()?;
    let settings = config.pipeline.settings(&base, &config.remote);
    let queue = ExecutionQueue::new(console.clone()).arc();
    let workspace = Arc::new(FileWorkspace::new(settings.layout.clone()));
    let handler = Arc::new(PipelineHandler::new(
        settings,
        queue.clone(),
        workspace,
        console.clone(),
        console.clone(),
    ));

    let endpoint = cli
        .remote
        .clone()
        .or_else(|| config.remote.default_endpoint());
    if let Some(endpoint) = endpoint {
        // 连接失败时退回本地模式
        match TcpRemoteClient::connect(endpoint, config.remote.client_config(), console.clone())
            .await
        {
            Ok(client) => handler.attach_remote(client.arc()),
            Err(e) => tracing::warn!(error = %e, "Remote worker unavailable, running locally"),
        }
    }

    let result = tokio::select! {
        result = run_command(&handler, queue.as_ref(), cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received interrupt signal");
            let aborted = handler.abort().await;
            queue.wait_idle().await;
            aborted
        }
    };

    handler.detach_remote();
    let _ = stop_tx.send(());
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Console printer failed");
    }

    match result {
        Ok(outcome) => {
            tracing::debug!(?outcome, "Action finished");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!(e)),
    }
}

fn init_tracing(config: &AppConfig) {
    let log_filter = format!(
        "{},sovits_agent={}",
        config.log.level, config.log.level
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    // 控制台事件自己打印到 stdout，日志走 stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_command(
    handler: &PipelineHandler,
    queue: &dyn TaskQueuePort,
    command: Command,
) -> Result<ActionOutcome, ApplicationError> {
    let outcome = match command {
        Command::Slice(args) => handler.slice(args.into()).await?,
        Command::Preprocess(args) => handler.preprocess(args.into()).await?,
        Command::Train(args) => handler.train(args.into()).await?,
        Command::Infer(args) => handler.infer(args.into()).await?,
        Command::Clear(args) => handler.clear(args.into()).await?,
        Command::Speakers => {
            for speaker in handler.speakers().await? {
                println!("{}", speaker);
            }
            ActionOutcome::NothingToDo
        }
        Command::Results => {
            let count = handler.fetch_results().await?;
            tracing::info!(count = count, "Results retrieved");
            ActionOutcome::RemoteCompleted
        }
    };

    if let ActionOutcome::Queued(count) = outcome {
        tracing::info!(count = count, "Waiting for queued tasks");
        queue.wait_idle().await;
    }
    Ok(outcome)
}

/// 把控制台事件打印到 stdout，收到停止信号后输出剩余事件再退出
async fn print_console(
    mut rx: broadcast::Receiver<ConsoleEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "Console output lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            _ = &mut stop => {
                for event in drain_events(&mut rx) {
                    print_event(&event);
                }
                return;
            }
        }
    }
}

fn print_event(event: &ConsoleEvent) {
    let mut stdout = std::io::stdout().lock();
    let written = match event {
        ConsoleEvent::Line { .. } => match event.display_line() {
            Some(line) => writeln!(stdout, "{}", line),
            None => Ok(()),
        },
        ConsoleEvent::FileProgress { file, percent } => {
            write!(stdout, "\r{}: {:>3}%", file, percent).and_then(|_| {
                if *percent >= 100 {
                    writeln!(stdout)
                } else {
                    stdout.flush()
                }
            })
        }
        ConsoleEvent::BatchProgress { completed, total } => {
            writeln!(stdout, "Uploaded {}/{} file(s)", completed, total)
        }
    };
    if let Err(e) = written {
        tracing::debug!(error = %e, "Failed to write console output");
    }
}
