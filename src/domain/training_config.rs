//! Training Config - 训练配置文档
//!
//! 配置文档的领域字段对本系统不透明，只读取 `spk`、`model.speech_encoder`
//! 并整体改写 `train` 段。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 训练精度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Fp32,
    Fp16,
    Bf16,
}

impl Precision {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fp32" => Some(Precision::Fp32),
            "fp16" => Some(Precision::Fp16),
            "bf16" => Some(Precision::Bf16),
            _ => None,
        }
    }

    /// `half_type` 字段值；fp32 不使用半精度
    pub fn half_type(&self) -> Option<&'static str> {
        match self {
            Precision::Fp32 => None,
            Precision::Fp16 => Some("fp16"),
            Precision::Bf16 => Some("bf16"),
        }
    }
}

/// 用户可调整的训练参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainOverrides {
    pub log_interval: u32,
    pub eval_interval: u32,
    pub batch_size: u32,
    pub precision: Precision,
    pub keep_ckpts: u32,
    pub all_in_mem: bool,
}

impl Default for TrainOverrides {
    fn default() -> Self {
        Self {
            log_interval: 50,
            eval_interval: 200,
            batch_size: 4,
            precision: Precision::Fp32,
            keep_ckpts: 1,
            all_in_mem: false,
        }
    }
}

/// 训练配置文档
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainingConfig(Map<String, Value>);

impl TrainingConfig {
    pub fn new(document: Map<String, Value>) -> Self {
        Self(document)
    }

    /// 从 JSON 值构建，顶层必须是对象
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// 说话人名称（`spk` 对象的键）
    pub fn speakers(&self) -> Vec<String> {
        self.0
            .get("spk")
            .and_then(Value::as_object)
            .map(|spk| spk.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn speech_encoder(&self) -> Option<&str> {
        self.0
            .get("model")
            .and_then(|model| model.get("speech_encoder"))
            .and_then(Value::as_str)
    }

    /// 将调整项写入 `train` 段（不存在则创建）
    pub fn apply_overrides(&mut self, overrides: &TrainOverrides) {
        let train = self
            .0
            .entry("train")
            .or_insert_with(|| Value::Object(Map::new()));
        if !train.is_object() {
            *train = Value::Object(Map::new());
        }
        let Some(train) = train.as_object_mut() else {
            return;
        };

        train.insert("log_interval".into(), overrides.log_interval.into());
        train.insert("eval_interval".into(), overrides.eval_interval.into());
        train.insert("batch_size".into(), overrides.batch_size.into());
        match overrides.precision.half_type() {
            None => {
                train.insert("fp16_run".into(), false.into());
            }
            Some(half_type) => {
                train.insert("fp16_run".into(), true.into());
                train.insert("half_type".into(), half_type.into());
            }
        }
        train.insert("keep_ckpts".into(), overrides.keep_ckpts.into());
        train.insert("all_in_mem".into(), overrides.all_in_mem.into());
    }
}
