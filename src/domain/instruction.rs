//! Remote Instructions - 远程 worker 指令
//!
//! 线上格式为扁平 JSON 文档，`INSTRUCTION` 字段区分类型，
//! 其余字段由具体指令决定。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 线上判别字段名
pub const INSTRUCTION_FIELD: &str = "INSTRUCTION";

/// 远程指令
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "INSTRUCTION", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Instruction {
    Slice {
        #[serde(rename = "spk")]
        speaker: String,
        min_interval: u32,
    },
    Preprocess {
        encoder: String,
        f0_predictor: String,
        loudness_embedding: bool,
    },
    /// 训练指令携带完整的训练配置文档（顶层字段展开）
    Train {
        gpu_id: u32,
        #[serde(flatten)]
        config: Map<String, Value>,
    },
    Infer {
        gpu_id: u32,
        #[serde(rename = "spk")]
        speaker: String,
        f0_predictor: String,
        nsf_hifigan: bool,
    },
    Abort,
    Clear {
        dir: ClearTarget,
    },
    GetConf,
    GetResults,
}

impl Instruction {
    /// 构建 TRAIN 指令
    ///
    /// 配置文档中与指令字段同名的键会被移除，保证线上 JSON 无重复键
    pub fn train(mut config: Map<String, Value>, gpu_id: u32) -> Self {
        config.remove(INSTRUCTION_FIELD);
        config.remove("gpu_id");
        Instruction::Train { gpu_id, config }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Instruction::Slice { .. } => "SLICE",
            Instruction::Preprocess { .. } => "PREPROCESS",
            Instruction::Train { .. } => "TRAIN",
            Instruction::Infer { .. } => "INFER",
            Instruction::Abort => "ABORT",
            Instruction::Clear { .. } => "CLEAR",
            Instruction::GetConf => "GET_CONF",
            Instruction::GetResults => "GET_RESULTS",
        }
    }

    /// 序列化为线上 JSON 文本
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// CLEAR 指令的目标输出目录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearTarget {
    Slice,
    Preprocess,
    Train,
}

impl ClearTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClearTarget::Slice => "slice",
            ClearTarget::Preprocess => "preprocess",
            ClearTarget::Train => "train",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "slice" => Some(ClearTarget::Slice),
            "preprocess" => Some(ClearTarget::Preprocess),
            "train" => Some(ClearTarget::Train),
            _ => None,
        }
    }
}

/// 上传文件的用途，决定远端放入哪个接收目录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileUsage {
    ToSlice,
    ToInfer,
}

impl FileUsage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileUsage::ToSlice => "TO_SLICE",
            FileUsage::ToInfer => "TO_INFER",
        }
    }
}

impl fmt::Display for FileUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
