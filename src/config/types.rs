//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::application::PipelineSettings;
use crate::domain::{EndpointAddress, PipelineLayout};
use crate::infrastructure::remote::RemoteClientConfig;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 远程 worker 配置
    #[serde(default)]
    pub remote: RemoteConfig,

    /// 本地流水线配置
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// 控制台配置
    #[serde(default)]
    pub console: ConsoleConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 远程 worker 配置
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// 默认连接的主机（命令行 `--remote` 优先）
    #[serde(default)]
    pub host: Option<String>,

    /// 控制端口
    #[serde(default)]
    pub port: Option<u16>,

    /// 文件传输端口
    #[serde(default = "default_transfer_port")]
    pub transfer_port: u16,

    /// 连接超时（秒），0 表示使用系统默认
    #[serde(default)]
    pub connect_timeout_secs: u64,

    /// 读写超时（秒），0 表示不限制
    #[serde(default)]
    pub io_timeout_secs: u64,

    /// 上传分片大小（字节）
    #[serde(default = "default_fragment_size")]
    pub fragment_size: usize,

    /// 连续上传之间的间隔（毫秒）
    #[serde(default = "default_transfer_interval")]
    pub transfer_interval_ms: u64,
}

fn default_transfer_port() -> u16 {
    23333
}

fn default_fragment_size() -> usize {
    1024
}

fn default_transfer_interval() -> u64 {
    1
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            transfer_port: default_transfer_port(),
            connect_timeout_secs: 0,
            io_timeout_secs: 0,
            fragment_size: default_fragment_size(),
            transfer_interval_ms: default_transfer_interval(),
        }
    }
}

impl RemoteConfig {
    /// 配置文件中的默认端点（host 与 port 都设置时才有效）
    pub fn default_endpoint(&self) -> Option<EndpointAddress> {
        match (&self.host, self.port) {
            (Some(host), Some(port)) if !host.is_empty() => {
                Some(EndpointAddress::new(host.clone(), port))
            }
            _ => None,
        }
    }

    pub fn client_config(&self) -> RemoteClientConfig {
        let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));
        RemoteClientConfig {
            transfer_port: self.transfer_port,
            connect_timeout: secs(self.connect_timeout_secs),
            io_timeout: secs(self.io_timeout_secs),
            fragment_size: self.fragment_size,
        }
    }
}

/// 本地流水线配置
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// so-vits-svc 根目录
    #[serde(default = "default_svc_dir")]
    pub svc_dir: PathBuf,

    /// Python 解释器
    #[serde(default = "default_python_exe")]
    pub python_exe: PathBuf,

    /// 切片脚本
    #[serde(default = "default_slicer_script")]
    pub slicer_script: PathBuf,

    /// 远程推理结果目录
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// 模型名（数据集与日志子目录）
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// 切片最小静音间隔（毫秒）
    #[serde(default = "default_min_interval")]
    pub min_interval: u32,

    /// 未填写说话人时使用的名称
    #[serde(default = "default_speaker")]
    pub default_speaker: String,
}

fn default_svc_dir() -> PathBuf {
    PathBuf::from("so-vits-svc-4.1-Stable")
}

#[cfg(windows)]
fn default_python_exe() -> PathBuf {
    PathBuf::from("workenv/python.exe")
}

#[cfg(not(windows))]
fn default_python_exe() -> PathBuf {
    PathBuf::from("workenv/bin/python")
}

fn default_slicer_script() -> PathBuf {
    PathBuf::from("audio-slicer-main/slicer2.py")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_model_name() -> String {
    "44k".to_string()
}

fn default_min_interval() -> u32 {
    100 // ms
}

fn default_speaker() -> String {
    "default-speaker".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            svc_dir: default_svc_dir(),
            python_exe: default_python_exe(),
            slicer_script: default_slicer_script(),
            results_dir: default_results_dir(),
            model_name: default_model_name(),
            min_interval: default_min_interval(),
            default_speaker: default_speaker(),
        }
    }
}

impl PipelineConfig {
    /// 以 base 为根目录的工作区布局
    pub fn layout(&self, base: &Path) -> PipelineLayout {
        PipelineLayout {
            python_exe: self.python_exe.clone(),
            slicer_script: self.slicer_script.clone(),
            svc_dir: self.svc_dir.clone(),
            results_dir: self.results_dir.clone(),
            model_name: self.model_name.clone(),
        }
        .absolute(base)
    }

    pub fn settings(&self, base: &Path, remote: &RemoteConfig) -> PipelineSettings {
        let mut settings = PipelineSettings::new(self.layout(base));
        settings.min_interval = self.min_interval;
        settings.default_speaker = self.default_speaker.clone();
        settings.transfer_interval = Duration::from_millis(remote.transfer_interval_ms);
        settings
    }
}

/// 控制台配置
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// broadcast 通道容量
    #[serde(default = "default_console_capacity")]
    pub capacity: usize,
}

fn default_console_capacity() -> usize {
    1024
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            capacity: default_console_capacity(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.remote.transfer_port, 23333);
        assert_eq!(config.remote.fragment_size, 1024);
        assert_eq!(config.pipeline.model_name, "44k");
        assert_eq!(config.pipeline.min_interval, 100);
        assert!(config.remote.default_endpoint().is_none());
    }

    #[test]
    fn test_client_config_timeouts() {
        let mut remote = RemoteConfig::default();
        assert_eq!(remote.client_config().io_timeout, None);

        remote.connect_timeout_secs = 5;
        remote.io_timeout_secs = 30;
        let client = remote.client_config();
        assert_eq!(client.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(client.io_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_default_endpoint() {
        let remote = RemoteConfig {
            host: Some("gpu-box".to_string()),
            port: Some(23332),
            ..Default::default()
        };
        assert_eq!(
            remote.default_endpoint(),
            Some(EndpointAddress::new("gpu-box", 23332))
        );
    }

    #[test]
    fn test_layout_resolution() {
        let config = PipelineConfig::default();
        let layout = config.layout(Path::new("/srv/sovits"));
        assert_eq!(
            layout.train_log_dir(),
            PathBuf::from("/srv/sovits/so-vits-svc-4.1-Stable/logs/44k")
        );
        assert!(layout.python_exe.starts_with("/srv/sovits/workenv"));
    }
}
