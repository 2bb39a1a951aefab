//! Pipeline Commands - 流水线动作命令
//!
//! 每个命令在本地模式下转成排队的命令行，在远程模式下转成一条指令

use std::path::PathBuf;

use crate::domain::{
    ClearTarget, TrainOverrides, F0_PREDICTOR_INFER_DEFAULT, F0_PREDICTOR_PREPROCESS_DEFAULT,
    SPEECH_ENCODER_DEFAULT,
};

/// 切片命令
#[derive(Debug, Clone)]
pub struct SliceCommand {
    pub files: Vec<PathBuf>,
    /// 为空时使用默认说话人名
    pub speaker: String,
    /// 最小静音间隔（毫秒），None 使用配置值
    pub min_interval: Option<u32>,
}

/// 预处理命令
#[derive(Debug, Clone)]
pub struct PreprocessCommand {
    pub encoder: String,
    pub f0_predictor: String,
    /// 响度嵌入（强制使用 vec768l12 编码器）
    pub loudness_embedding: bool,
}

impl Default for PreprocessCommand {
    fn default() -> Self {
        Self {
            encoder: SPEECH_ENCODER_DEFAULT.to_string(),
            f0_predictor: F0_PREDICTOR_PREPROCESS_DEFAULT.to_string(),
            loudness_embedding: false,
        }
    }
}

/// 训练命令
#[derive(Debug, Clone, Default)]
pub struct TrainCommand {
    pub gpu_id: u32,
    pub overrides: TrainOverrides,
}

/// 推理命令
#[derive(Debug, Clone)]
pub struct InferCommand {
    pub files: Vec<PathBuf>,
    pub speaker: String,
    pub gpu_id: u32,
    pub f0_predictor: String,
    pub nsf_hifigan: bool,
    /// 变调（半音）
    pub pitch_shift: i32,
    /// 强制切片长度（秒），0 为自动
    pub clip: f32,
}

impl InferCommand {
    pub fn new(files: Vec<PathBuf>, speaker: impl Into<String>) -> Self {
        Self {
            files,
            speaker: speaker.into(),
            gpu_id: 0,
            f0_predictor: F0_PREDICTOR_INFER_DEFAULT.to_string(),
            nsf_hifigan: false,
            pitch_shift: 0,
            clip: 0.0,
        }
    }
}

/// 清理命令
#[derive(Debug, Clone, Copy)]
pub struct ClearCommand {
    pub target: ClearTarget,
}

/// 动作结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// 本地模式：已排队的任务数
    Queued(usize),
    /// 远程模式：指令交换已完成
    RemoteCompleted,
    /// 没有需要做的事（例如目录已经是空的）
    NothingToDo,
    /// 本地中止：丢弃的未开始任务数
    Cancelled(usize),
}
