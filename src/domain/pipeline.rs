//! Pipeline Layout - 本地工作区布局与命令行构建
//!
//! 每个本地流水线动作对应一条（或一组）argv，外部工具只按退出码判定成败。

use std::path::{Path, PathBuf};

use super::instruction::ClearTarget;

pub const SPEECH_ENCODER_DEFAULT: &str = "vec768l12";
pub const SPEECH_ENCODERS: &[&str] = &[
    "vec768l12",
    "vec256l9",
    "hubertsoft",
    "whisper-ppg",
    "cnhubertlarge",
    "dphubert",
    "whisper-ppg-large",
    "wavlmbase+",
];

pub const F0_PREDICTOR_PREPROCESS_DEFAULT: &str = "rmvpe";
pub const F0_PREDICTOR_INFER_DEFAULT: &str = "pm";
pub const F0_PREDICTORS: &[&str] = &["crepe", "dio", "pm", "harvest", "rmvpe", "fcpe"];

/// whisper-ppg 编码器推理时需要固定切片长度
const WHISPER_PPG_ENCODER: &str = "whisper-ppg";
const WHISPER_PPG_CLIP: &str = "25";

/// 推理输出音频格式
pub const AUDIO_OUT_FORMAT: &str = "wav";

/// 训练清理时保留的条目（底模与扩散模型目录）
pub const TRAIN_LOG_KEEP: &[&str] = &["diffusion", "D_0.pth", "G_0.pth"];

/// 本地工作区布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayout {
    /// Python 解释器
    pub python_exe: PathBuf,
    /// 切片脚本
    pub slicer_script: PathBuf,
    /// so-vits-svc 根目录（预处理/训练/推理的工作目录）
    pub svc_dir: PathBuf,
    /// 推理结果目录
    pub results_dir: PathBuf,
    /// 模型名（日志/数据集子目录名）
    pub model_name: String,
}

impl PipelineLayout {
    /// 将相对路径解析到 base 下，保证子进程在其他工作目录中仍能找到文件
    ///
    /// 不含目录的解释器名（如 `python3`）保持原样，交给 PATH 查找
    pub fn absolute(self, base: &Path) -> Self {
        let resolve = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };
        let python_exe = if self.python_exe.components().count() > 1 {
            resolve(self.python_exe)
        } else {
            self.python_exe
        };
        Self {
            python_exe,
            slicer_script: resolve(self.slicer_script),
            svc_dir: resolve(self.svc_dir),
            results_dir: resolve(self.results_dir),
            model_name: self.model_name,
        }
    }

    pub fn slice_out_dir(&self) -> PathBuf {
        self.svc_dir.join("dataset_raw")
    }

    pub fn preprocess_out_dir(&self) -> PathBuf {
        self.svc_dir.join("dataset").join(&self.model_name)
    }

    pub fn train_log_dir(&self) -> PathBuf {
        self.svc_dir.join("logs").join(&self.model_name)
    }

    pub fn inference_input_dir(&self) -> PathBuf {
        self.svc_dir.join("raw")
    }

    /// 训练配置
    pub fn training_config(&self) -> PathBuf {
        self.svc_dir.join("configs").join("config.json")
    }

    /// 训练开始后日志目录中的配置副本（存在即表示续训）
    pub fn training_config_log(&self) -> PathBuf {
        self.train_log_dir().join("config.json")
    }

    /// 清理目标对应的输出目录
    pub fn clear_dir(&self, target: ClearTarget) -> PathBuf {
        match target {
            ClearTarget::Slice => self.slice_out_dir(),
            ClearTarget::Preprocess => self.preprocess_out_dir(),
            ClearTarget::Train => self.train_log_dir(),
        }
    }

    fn script(&self, name: &str) -> String {
        path_arg(&self.svc_dir.join(name))
    }

    pub fn slice_command(&self, voice_file: &Path, speaker: &str, min_interval: u32) -> Vec<String> {
        vec![
            path_arg(&self.python_exe),
            path_arg(&self.slicer_script),
            path_arg(voice_file),
            "--out".to_string(),
            path_arg(&self.slice_out_dir().join(speaker)),
            "--min_interval".to_string(),
            min_interval.to_string(),
        ]
    }

    /// 重采样到 44100Hz 单声道
    pub fn resample_command(&self) -> Vec<String> {
        vec![path_arg(&self.python_exe), self.script("resample.py")]
    }

    /// 划分训练/验证集并生成配置
    pub fn flist_config_command(&self, encoder: &str, loudness_embedding: bool) -> Vec<String> {
        let mut command = vec![
            path_arg(&self.python_exe),
            self.script("preprocess_flist_config.py"),
            "--speech_encoder".to_string(),
            encoder.to_string(),
        ];
        if loudness_embedding {
            command.push("--vol_aug".to_string());
        }
        command
    }

    pub fn hubert_f0_command(&self, f0_predictor: &str) -> Vec<String> {
        vec![
            path_arg(&self.python_exe),
            self.script("preprocess_hubert_f0.py"),
            "--f0_predictor".to_string(),
            f0_predictor.to_string(),
        ]
    }

    pub fn train_command(&self, gpu_id: u32) -> Vec<String> {
        vec![
            cuda_visible_devices(gpu_id),
            path_arg(&self.python_exe),
            self.script("train.py"),
            "-c".to_string(),
            path_arg(&self.training_config()),
            "-m".to_string(),
            self.model_name.clone(),
        ]
    }

    pub fn infer_command(&self, spec: &InferSpec<'_>) -> Vec<String> {
        let mut command = vec![
            cuda_visible_devices(spec.gpu_id),
            path_arg(&self.python_exe),
            self.script("inference_main.py"),
            "--model_path".to_string(),
            path_arg(spec.model_path),
            "--config_path".to_string(),
            path_arg(&self.training_config_log()),
            "--wav_format".to_string(),
            AUDIO_OUT_FORMAT.to_string(),
            "--trans".to_string(),
            spec.pitch_shift.to_string(),
            "--spk_list".to_string(),
            spec.speaker.to_string(),
            "--clean_names".to_string(),
        ];
        command.extend(spec.clean_names.iter().cloned());
        command.push("--f0_predictor".to_string());
        command.push(spec.f0_predictor.to_string());
        if spec.nsf_hifigan {
            command.push("--enhance".to_string());
        }
        command.push("--clip".to_string());
        if spec.speech_encoder == Some(WHISPER_PPG_ENCODER) {
            command.push(WHISPER_PPG_CLIP.to_string());
            command.push("-lg".to_string());
            command.push("1".to_string());
        } else {
            command.push(spec.clip.to_string());
        }
        command
    }
}

/// 本地推理参数
#[derive(Debug, Clone)]
pub struct InferSpec<'a> {
    pub gpu_id: u32,
    pub model_path: &'a Path,
    pub speaker: &'a str,
    pub clean_names: &'a [String],
    pub f0_predictor: &'a str,
    pub nsf_hifigan: bool,
    pub pitch_shift: i32,
    pub clip: f32,
    pub speech_encoder: Option<&'a str>,
}

/// 删除目录或文件的命令
#[cfg(not(windows))]
pub fn remove_command(path: &Path, _is_dir: bool) -> Vec<String> {
    vec!["rm".to_string(), "-rf".to_string(), path_arg(path)]
}

/// 删除目录或文件的命令
#[cfg(windows)]
pub fn remove_command(path: &Path, is_dir: bool) -> Vec<String> {
    let mut command = vec!["cmd.exe".to_string(), "/c".to_string()];
    if is_dir {
        command.extend(["rmdir", "/s", "/q"].map(String::from));
    } else {
        command.extend(["del", "/f", "/q"].map(String::from));
    }
    command.push(path_arg(path));
    command
}

/// 训练好的生成器检查点步数（`G_<n>.pth`，n ≥ 1）
pub fn generator_checkpoint_step(file_name: &str) -> Option<u64> {
    let digits = file_name.strip_prefix("G_")?.strip_suffix(".pth")?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn cuda_visible_devices(gpu_id: u32) -> String {
    format!("CUDA_VISIBLE_DEVICES={}", gpu_id)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
