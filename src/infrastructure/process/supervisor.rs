//! Process Supervisor
//!
//! 启动外部命令，把 stdout/stderr 逐行转发到控制台，并支持整棵进程树的强制终止

use futures_util::future::join_all;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::kill_tree::kill_tree;
use crate::application::ports::{ConsolePort, ProcessError};
use crate::domain::{split_env_prefix, TaskExit};
use crate::infrastructure::events::relay_lines;

/// 进程监督器
pub struct ProcessSupervisor {
    console: Arc<dyn ConsolePort>,
}

impl ProcessSupervisor {
    pub fn new(console: Arc<dyn ConsolePort>) -> Self {
        Self { console }
    }

    /// 启动命令
    ///
    /// 命令开头的 `KEY=VALUE` 作为子进程环境变量；工作目录不存在时给出警告并沿用当前目录
    pub fn spawn(
        &self,
        command: &[String],
        working_dir: Option<&Path>,
    ) -> Result<ProcessHandle, ProcessError> {
        let (envs, argv) = split_env_prefix(command);
        let Some((program, args)) = argv.split_first() else {
            return Err(ProcessError::spawn("", "empty command"));
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(envs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = working_dir {
            if dir.is_dir() {
                cmd.current_dir(dir);
            } else {
                self.console.warn(&format!(
                    "Working directory \"{}\" does not exist, using current directory",
                    dir.display()
                ));
            }
        }

        // 独立进程组，终止时可以整组发送信号
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| ProcessError::spawn(program.as_str(), e.to_string()))?;

        let pid = child.id();
        tracing::debug!(pid = ?pid, program = %program, "Process started");

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(self.spawn_reader(stdout, program));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(self.spawn_reader(stderr, program));
        }

        Ok(ProcessHandle {
            pid,
            program: program.clone(),
            child,
            readers,
            killed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn spawn_reader<R>(&self, stream: R, program: &str) -> JoinHandle<()>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let console = self.console.clone();
        let program = program.to_string();
        tokio::spawn(async move {
            if let Err(e) = relay_lines(stream, console.as_ref()).await {
                tracing::debug!(program = %program, error = %e, "Output stream closed with error");
            }
        })
    }
}

/// 运行中的子进程
pub struct ProcessHandle {
    pid: Option<u32>,
    program: String,
    child: Child,
    readers: Vec<JoinHandle<()>>,
    killed: Arc<AtomicBool>,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// 可在其他任务中持有的终止句柄
    pub fn control(&self) -> ProcessControl {
        ProcessControl {
            pid: self.pid,
            killed: self.killed.clone(),
        }
    }

    /// 等待进程退出，并等输出全部转发完毕
    pub async fn wait(mut self) -> TaskExit {
        let status = self.child.wait().await;
        let killed = self.killed.load(Ordering::SeqCst);

        if killed {
            // 被终止的进程树里可能还有持有管道的孙进程
            for reader in &self.readers {
                reader.abort();
            }
        } else {
            join_all(self.readers.drain(..)).await;
        }

        let exit = match status {
            Ok(_) if killed => TaskExit::Terminated,
            Ok(status) => match status.code() {
                Some(code) => TaskExit::Exited(code),
                None => TaskExit::Terminated,
            },
            Err(e) => {
                tracing::warn!(program = %self.program, error = %e, "Failed to wait for process");
                TaskExit::Terminated
            }
        };
        tracing::debug!(pid = ?self.pid, program = %self.program, exit = %exit, "Process finished");
        exit
    }

    /// 在后台等待退出，结束后调用回调
    pub fn on_exit<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(TaskExit) + Send + 'static,
    {
        tokio::spawn(async move {
            let exit = self.wait().await;
            callback(exit);
        })
    }
}

/// 进程终止句柄
#[derive(Debug, Clone)]
pub struct ProcessControl {
    pid: Option<u32>,
    killed: Arc<AtomicBool>,
}

impl ProcessControl {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// 终止整棵进程树；重复调用无效果
    pub fn kill_tree(&self) -> usize {
        if self.killed.swap(true, Ordering::SeqCst) {
            return 0;
        }
        match self.pid {
            Some(pid) => kill_tree(pid),
            None => 0,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::infrastructure::events::{drain_events, ConsoleEvent, ConsolePublisher};
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn lines(rx: &mut broadcast::Receiver<ConsoleEvent>) -> Vec<String> {
        drain_events(rx)
            .iter()
            .filter_map(|e| e.display_line())
            .collect()
    }

    #[tokio::test]
    async fn test_output_is_forwarded() {
        let console = Arc::new(ConsolePublisher::new());
        let mut rx = console.subscribe();
        let supervisor = ProcessSupervisor::new(console.clone());

        let handle = supervisor
            .spawn(&argv(&["sh", "-c", "echo hello; echo oops >&2"]), None)
            .unwrap();
        assert_eq!(handle.wait().await, TaskExit::Exited(0));

        let output = lines(&mut rx);
        assert!(output.contains(&"hello".to_string()));
        assert!(output.contains(&"oops".to_string()));
    }

    #[tokio::test]
    async fn test_env_prefix_and_exit_code() {
        let console = Arc::new(ConsolePublisher::new());
        let mut rx = console.subscribe();
        let supervisor = ProcessSupervisor::new(console.clone());

        let handle = supervisor
            .spawn(
                &argv(&["GREETING=hi", "sh", "-c", "echo $GREETING; exit 3"]),
                None,
            )
            .unwrap();
        assert_eq!(handle.wait().await, TaskExit::Exited(3));
        assert_eq!(lines(&mut rx), vec!["hi"]);
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let supervisor = ProcessSupervisor::new(Arc::new(ConsolePublisher::new()));
        let result = supervisor.spawn(&argv(&["definitely-not-a-real-binary-xyz"]), None);
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));

        let result = supervisor.spawn(&argv(&["ONLY=env"]), None);
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_invalid_working_dir_falls_back() {
        let console = Arc::new(ConsolePublisher::new());
        let mut rx = console.subscribe();
        let supervisor = ProcessSupervisor::new(console.clone());

        let handle = supervisor
            .spawn(&argv(&["true"]), Some(Path::new("/no/such/dir/here")))
            .unwrap();
        assert!(handle.wait().await.success());

        let output = lines(&mut rx);
        assert!(output.iter().any(|l| l.starts_with("[WARNING] ")));
    }

    #[tokio::test]
    async fn test_kill_tree_terminates_descendants() {
        let supervisor = ProcessSupervisor::new(Arc::new(ConsolePublisher::new()));
        let handle = supervisor
            .spawn(&argv(&["sh", "-c", "sleep 30 & sleep 30; wait"]), None)
            .unwrap();
        let control = handle.control();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(control.kill_tree() >= 1);
        assert_eq!(control.kill_tree(), 0);

        let exit = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("process tree should be gone");
        assert_eq!(exit, TaskExit::Terminated);
    }

    #[tokio::test]
    async fn test_on_exit_callback() {
        let supervisor = ProcessSupervisor::new(Arc::new(ConsolePublisher::new()));
        let handle = supervisor.spawn(&argv(&["true"]), None).unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        handle.on_exit(move |exit| {
            let _ = tx.send(exit);
        });
        assert_eq!(rx.await.unwrap(), TaskExit::Exited(0));
    }
}
