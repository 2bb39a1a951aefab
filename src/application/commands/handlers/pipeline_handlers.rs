//! Pipeline Handler - 流水线动作编排
//!
//! 每个动作有本地和远程两种形式：
//! - 本地：构建命令行并提交到执行队列，完成回调把结果写到控制台
//! - 远程：上传输入、发送一条指令、按需拉取结果，顺序由这里保证
//!
//! 远程端点连接失败后自动断开，之后的动作回到本地模式，直到重新连接。

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::application::commands::pipeline_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::{
    ConsolePort, ProgressPort, RemoteError, RemoteWorkerPort, TaskQueuePort, WorkspacePort,
};
use crate::domain::{
    remove_command, FileUsage, InferSpec, Instruction, PipelineLayout, Task, TaskExit,
    F0_PREDICTORS, SPEECH_ENCODERS, SPEECH_ENCODER_DEFAULT,
};

/// 流水线参数
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub layout: PipelineLayout,
    /// 切片最小静音间隔（毫秒）
    pub min_interval: u32,
    /// 未填写说话人时使用的名称
    pub default_speaker: String,
    /// 连续上传文件之间的间隔
    pub transfer_interval: Duration,
}

impl PipelineSettings {
    pub fn new(layout: PipelineLayout) -> Self {
        Self {
            layout,
            min_interval: 100,
            default_speaker: "default-speaker".to_string(),
            transfer_interval: Duration::from_millis(1),
        }
    }
}

/// 流水线动作处理器
pub struct PipelineHandler {
    settings: PipelineSettings,
    queue: Arc<dyn TaskQueuePort>,
    workspace: Arc<dyn WorkspacePort>,
    console: Arc<dyn ConsolePort>,
    progress: Arc<dyn ProgressPort>,
    remote: RwLock<Option<Arc<dyn RemoteWorkerPort>>>,
}

impl PipelineHandler {
    pub fn new(
        settings: PipelineSettings,
        queue: Arc<dyn TaskQueuePort>,
        workspace: Arc<dyn WorkspacePort>,
        console: Arc<dyn ConsolePort>,
        progress: Arc<dyn ProgressPort>,
    ) -> Self {
        Self {
            settings,
            queue,
            workspace,
            console,
            progress,
            remote: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    // ========================================================================
    // 远程端点
    // ========================================================================

    /// 挂接远程 worker；已有的端点会被关闭
    pub fn attach_remote(&self, remote: Arc<dyn RemoteWorkerPort>) {
        let previous = self
            .remote
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .replace(remote);
        if let Some(previous) = previous {
            previous.close();
        }
    }

    /// 关闭并丢弃远程端点，返回之前是否已连接
    pub fn detach_remote(&self) -> bool {
        let previous = self.remote.write().unwrap_or_else(|e| e.into_inner()).take();
        match previous {
            Some(remote) => {
                remote.close();
                self.console.info("Disconnected from the server.");
                true
            }
            None => false,
        }
    }

    pub fn remote(&self) -> Option<Arc<dyn RemoteWorkerPort>> {
        self.remote.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_remote(&self) -> bool {
        self.remote().is_some()
    }

    /// 远程错误统一处理：端点失效时断开
    fn remote_failed(&self, err: RemoteError) -> ApplicationError {
        if err.is_connection_lost() {
            self.console.error("Connection lost.");
            self.detach_remote();
        }
        err.into()
    }

    async fn send(
        &self,
        remote: &dyn RemoteWorkerPort,
        instruction: Instruction,
    ) -> Result<(), ApplicationError> {
        remote
            .send_instruction(&instruction)
            .await
            .map_err(|e| self.remote_failed(e))
    }

    /// 逐个上传文件；任何一个失败都放弃整批
    async fn upload_all(
        &self,
        remote: &dyn RemoteWorkerPort,
        usage: FileUsage,
        files: &[PathBuf],
    ) -> Result<(), ApplicationError> {
        let total = files.len();
        self.console.info(&format!("Uploading {} file(s)...", total));
        self.progress.batch_progress(0, total);

        for (index, file) in files.iter().enumerate() {
            if index > 0 && !self.settings.transfer_interval.is_zero() {
                tokio::time::sleep(self.settings.transfer_interval).await;
            }
            if let Err(e) = remote.transfer(usage, file, self.progress.as_ref()).await {
                self.console
                    .error("Failed to upload file(s), please check the connection.");
                self.progress.batch_progress(0, total);
                return Err(self.remote_failed(e));
            }
            self.progress.batch_progress(index + 1, total);
        }

        self.console.info("All file(s) are uploaded to server.");
        Ok(())
    }

    // ========================================================================
    // 本地任务
    // ========================================================================

    fn enqueue(&self, task: Task) -> Result<(), ApplicationError> {
        let program = task.program().to_string();
        if self.queue.enqueue(task) {
            Ok(())
        } else {
            Err(ApplicationError::invalid_state(format!(
                "task rejected by queue: \"{}\"",
                program
            )))
        }
    }

    /// 成功时输出一行信息的回调
    fn report_success(&self, message: String) -> impl FnOnce(TaskExit) + Send + 'static {
        let console = self.console.clone();
        move |exit: TaskExit| {
            if exit.success() {
                console.info(&message);
            }
        }
    }

    // ========================================================================
    // 动作
    // ========================================================================

    pub async fn slice(&self, cmd: SliceCommand) -> Result<ActionOutcome, ApplicationError> {
        if cmd.files.is_empty() {
            return Err(ApplicationError::validation(
                "Please select at least 1 voice file.",
            ));
        }
        let speaker = match cmd.speaker.trim() {
            "" => self.settings.default_speaker.clone(),
            name => name.to_string(),
        };
        let min_interval = cmd.min_interval.unwrap_or(self.settings.min_interval);

        if let Some(remote) = self.remote() {
            self.upload_all(remote.as_ref(), FileUsage::ToSlice, &cmd.files)
                .await?;
            self.send(
                remote.as_ref(),
                Instruction::Slice {
                    speaker,
                    min_interval,
                },
            )
            .await?;
            return Ok(ActionOutcome::RemoteCompleted);
        }

        self.console.info("Slicing audio(s)...");
        let layout = &self.settings.layout;
        let last = cmd.files.len() - 1;
        for (index, file) in cmd.files.iter().enumerate() {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let console = self.console.clone();
            let task = Task::new(layout.slice_command(file, &speaker, min_interval)).on_complete(
                move |exit| {
                    if exit.success() {
                        console.info(&format!("Slicing completed: \"{}\"", name));
                    }
                    if index == last {
                        console.info("All slicing done.");
                    }
                },
            );
            self.enqueue(task)?;
        }
        self.queue.run_queued();
        Ok(ActionOutcome::Queued(cmd.files.len()))
    }

    pub async fn preprocess(
        &self,
        cmd: PreprocessCommand,
    ) -> Result<ActionOutcome, ApplicationError> {
        let encoder = if cmd.loudness_embedding {
            SPEECH_ENCODER_DEFAULT.to_string()
        } else {
            cmd.encoder
        };
        if !SPEECH_ENCODERS.contains(&encoder.as_str()) {
            return Err(ApplicationError::validation(format!(
                "Unknown speech encoder: {}",
                encoder
            )));
        }
        if !F0_PREDICTORS.contains(&cmd.f0_predictor.as_str()) {
            return Err(ApplicationError::validation(format!(
                "Unknown f0 predictor: {}",
                cmd.f0_predictor
            )));
        }

        if let Some(remote) = self.remote() {
            self.send(
                remote.as_ref(),
                Instruction::Preprocess {
                    encoder,
                    f0_predictor: cmd.f0_predictor,
                    loudness_embedding: cmd.loudness_embedding,
                },
            )
            .await?;
            return Ok(ActionOutcome::RemoteCompleted);
        }

        if !self.workspace.has_sliced_speakers().await? {
            return Err(ApplicationError::validation(
                "Please slice at least 1 voice file.",
            ));
        }

        self.console.info("Preprocessing dataset...");
        let layout = &self.settings.layout;
        let svc_dir = layout.svc_dir.clone();

        self.enqueue(
            Task::new(layout.resample_command())
                .with_working_dir(&svc_dir)
                .on_complete(self.report_success("Resampled to 44100Hz mono.".into())),
        )?;
        self.enqueue(
            Task::new(layout.flist_config_command(&encoder, cmd.loudness_embedding))
                .with_working_dir(&svc_dir)
                .on_complete(self.report_success(
                    "Training set, validation set, configuration files created.".into(),
                )),
        )?;

        let console = self.console.clone();
        self.enqueue(
            Task::new(layout.hubert_f0_command(&cmd.f0_predictor))
                .with_working_dir(&svc_dir)
                .on_complete(move |exit| {
                    if exit.success() {
                        console.info("Hubert & F0 predictor generated.");
                    }
                    console.info("Preprocessing done.");
                }),
        )?;
        self.queue.run_queued();
        Ok(ActionOutcome::Queued(3))
    }

    pub async fn train(&self, cmd: TrainCommand) -> Result<ActionOutcome, ApplicationError> {
        if let Some(remote) = self.remote() {
            let mut config = remote
                .fetch_config()
                .await
                .map_err(|e| self.remote_failed(e))?;
            config.apply_overrides(&cmd.overrides);
            self.console.info("Training on server...");
            self.send(remote.as_ref(), Instruction::train(config.into_map(), cmd.gpu_id))
                .await?;
            return Ok(ActionOutcome::RemoteCompleted);
        }

        let resuming = self.workspace.is_resuming().await;
        let mut config = self.workspace.load_training_config().await?;
        config.apply_overrides(&cmd.overrides);
        self.workspace.save_training_config(&config).await?;

        if resuming {
            self.console.info("Resuming training from existing checkpoints...");
        } else {
            self.console.info("Training...");
        }

        let layout = &self.settings.layout;
        self.enqueue(
            Task::new(layout.train_command(cmd.gpu_id))
                .with_working_dir(&layout.svc_dir)
                .on_complete(self.report_success("Training complete.".into())),
        )?;
        self.queue.run_queued();
        Ok(ActionOutcome::Queued(1))
    }

    pub async fn infer(&self, cmd: InferCommand) -> Result<ActionOutcome, ApplicationError> {
        if cmd.files.is_empty() {
            return Err(ApplicationError::validation(
                "Please select at least 1 vocal file.",
            ));
        }
        if cmd.speaker.trim().is_empty() {
            return Err(ApplicationError::validation("Please pick a speaker."));
        }
        if !F0_PREDICTORS.contains(&cmd.f0_predictor.as_str()) {
            return Err(ApplicationError::validation(format!(
                "Unknown f0 predictor: {}",
                cmd.f0_predictor
            )));
        }
        let results_dir = self.settings.layout.results_dir.clone();

        if let Some(remote) = self.remote() {
            self.upload_all(remote.as_ref(), FileUsage::ToInfer, &cmd.files)
                .await?;

            self.console
                .info("Inference running... (this may take minutes without console output)");
            self.send(
                remote.as_ref(),
                Instruction::Infer {
                    gpu_id: cmd.gpu_id,
                    speaker: cmd.speaker,
                    f0_predictor: cmd.f0_predictor,
                    nsf_hifigan: cmd.nsf_hifigan,
                },
            )
            .await?;

            self.console.info("Retrieving results from server...");
            remote
                .fetch_results(&results_dir)
                .await
                .map_err(|e| self.remote_failed(e))?;
            self.console
                .info(&format!("Output audios -> \"{}\"", results_dir.display()));
            return Ok(ActionOutcome::RemoteCompleted);
        }

        let Some(model_path) = self.workspace.latest_generator_checkpoint().await? else {
            return Err(ApplicationError::validation("Model not trained."));
        };
        let config = self.workspace.load_training_config().await?;
        let clean_names = self.workspace.stage_inference_inputs(&cmd.files).await?;

        let layout = &self.settings.layout;
        let command = layout.infer_command(&InferSpec {
            gpu_id: cmd.gpu_id,
            model_path: &model_path,
            speaker: &cmd.speaker,
            clean_names: &clean_names,
            f0_predictor: &cmd.f0_predictor,
            nsf_hifigan: cmd.nsf_hifigan,
            pitch_shift: cmd.pitch_shift,
            clip: cmd.clip,
            speech_encoder: config.speech_encoder(),
        });

        let staged: Vec<PathBuf> = clean_names
            .iter()
            .map(|name| layout.inference_input_dir().join(name))
            .filter(|path| !cmd.files.contains(path))
            .collect();
        let console = self.console.clone();
        let output_dir = layout.svc_dir.join("results");

        self.console
            .info("Inference running... (this may take minutes without console output)");
        self.enqueue(
            Task::new(command)
                .with_working_dir(&layout.svc_dir)
                .on_complete(move |exit| {
                    if exit.success() {
                        console.info("Inference complete.");
                        console.info(&format!("Output audios -> \"{}\"", output_dir.display()));
                    }
                    // 暂存的输入文件用完即删
                    for file in staged {
                        if let Err(e) = std::fs::remove_file(&file) {
                            console.warn(&format!(
                                "Failed to remove staged input \"{}\": {}",
                                file.display(),
                                e
                            ));
                        }
                    }
                }),
        )?;
        self.queue.run_queued();
        Ok(ActionOutcome::Queued(1))
    }

    pub async fn clear(&self, cmd: ClearCommand) -> Result<ActionOutcome, ApplicationError> {
        if let Some(remote) = self.remote() {
            self.send(remote.as_ref(), Instruction::Clear { dir: cmd.target })
                .await?;
            return Ok(ActionOutcome::RemoteCompleted);
        }

        let entries = self.workspace.clearable_entries(cmd.target).await?;
        if entries.is_empty() {
            self.console.info(&format!(
                "{} output directory is clean, nothing to clear.",
                cmd.target.as_str()
            ));
            return Ok(ActionOutcome::NothingToDo);
        }

        for entry in &entries {
            let message = format!("Removed: \"{}\"", entry.path.display());
            self.enqueue(
                Task::new(remove_command(&entry.path, entry.is_dir))
                    .on_complete(self.report_success(message)),
            )?;
        }
        self.queue.run_queued();
        Ok(ActionOutcome::Queued(entries.len()))
    }

    /// 中止：本地终止当前进程树并丢弃队列，远程发送 ABORT
    pub async fn abort(&self) -> Result<ActionOutcome, ApplicationError> {
        if let Some(remote) = self.remote() {
            self.send(remote.as_ref(), Instruction::Abort).await?;
            self.console.info("Abort requested on server.");
            return Ok(ActionOutcome::RemoteCompleted);
        }

        let discarded = self.queue.cancel_all();
        self.console.info(&format!(
            "Aborted, {} pending task(s) discarded.",
            discarded
        ));
        Ok(ActionOutcome::Cancelled(discarded))
    }

    /// 训练配置中的说话人
    pub async fn speakers(&self) -> Result<Vec<String>, ApplicationError> {
        let config = match self.remote() {
            Some(remote) => remote
                .fetch_config()
                .await
                .map_err(|e| self.remote_failed(e))?,
            None => self.workspace.load_training_config().await?,
        };
        Ok(config.speakers())
    }

    /// 从远程 worker 拉取结果到结果目录
    pub async fn fetch_results(&self) -> Result<usize, ApplicationError> {
        let Some(remote) = self.remote() else {
            return Err(ApplicationError::invalid_state(
                "Not connected to a remote worker",
            ));
        };
        let results_dir = &self.settings.layout.results_dir;
        self.console.info("Retrieving results from server...");
        let count = remote
            .fetch_results(results_dir)
            .await
            .map_err(|e| self.remote_failed(e))?;
        self.console
            .info(&format!("Output audios -> \"{}\"", results_dir.display()));
        Ok(count)
    }
}
