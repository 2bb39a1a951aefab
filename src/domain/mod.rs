//! Domain Layer - 领域层
//!
//! - task: 排队执行的外部命令及其结束状态
//! - instruction: 远程 worker 指令、文件用途、清理目标
//! - endpoint: 远程 worker 地址
//! - training_config: 训练配置文档
//! - pipeline: 本地工作区布局与各动作的命令行

mod endpoint;
mod instruction;
mod pipeline;
mod task;
mod training_config;

pub use endpoint::{EndpointAddress, EndpointError, RemoteEndpoint};
pub use instruction::{ClearTarget, FileUsage, Instruction, INSTRUCTION_FIELD};
pub use pipeline::{
    generator_checkpoint_step, remove_command, InferSpec, PipelineLayout, AUDIO_OUT_FORMAT,
    F0_PREDICTORS, F0_PREDICTOR_INFER_DEFAULT, F0_PREDICTOR_PREPROCESS_DEFAULT,
    SPEECH_ENCODERS, SPEECH_ENCODER_DEFAULT, TRAIN_LOG_KEEP,
};
pub use task::{parse_env_assignment, split_env_prefix, CompletionCallback, Task, TaskExit};
pub use training_config::{Precision, TrainOverrides, TrainingConfig};
