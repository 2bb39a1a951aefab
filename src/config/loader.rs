//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml 或 `--config` 指定的文件）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// # 环境变量示例
/// - `SOVITS_REMOTE__HOST=192.168.1.20`
/// - `SOVITS_REMOTE__PORT=23332`
/// - `SOVITS_PIPELINE__SVC_DIR=/opt/so-vits-svc`
/// - `SOVITS_LOG__LEVEL=debug`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("remote.transfer_port", 23333)?
        .set_default("remote.connect_timeout_secs", 0)?
        .set_default("remote.io_timeout_secs", 0)?
        .set_default("remote.fragment_size", 1024)?
        .set_default("remote.transfer_interval_ms", 1)?
        .set_default("pipeline.min_interval", 100)?
        .set_default("pipeline.model_name", "44k")?
        .set_default("console.capacity", 1024)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    // 前缀: SOVITS_
    // 层级分隔符: __ (双下划线)
    builder = builder.add_source(
        Environment::with_prefix("SOVITS")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.remote.transfer_port == 0 {
        return Err(ConfigError::ValidationError(
            "Transfer port cannot be 0".to_string(),
        ));
    }

    if let Some(port) = config.remote.port {
        if port == 0 {
            return Err(ConfigError::ValidationError(
                "Remote port cannot be 0".to_string(),
            ));
        }
        if port == config.remote.transfer_port {
            return Err(ConfigError::ValidationError(format!(
                "Remote port and transfer port must differ (both {})",
                port
            )));
        }
    }

    if config.remote.fragment_size == 0 {
        return Err(ConfigError::ValidationError(
            "Fragment size cannot be 0".to_string(),
        ));
    }

    if config.pipeline.python_exe.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "Python executable cannot be empty".to_string(),
        ));
    }

    if config.pipeline.model_name.is_empty() {
        return Err(ConfigError::ValidationError(
            "Model name cannot be empty".to_string(),
        ));
    }

    if config.console.capacity == 0 {
        return Err(ConfigError::ValidationError(
            "Console capacity cannot be 0".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    match config.remote.default_endpoint() {
        Some(endpoint) => tracing::info!("Remote Worker: {}", endpoint),
        None => tracing::info!("Remote Worker: (none)"),
    }
    tracing::info!("Transfer Port: {}", config.remote.transfer_port);
    tracing::info!("Fragment Size: {}", config.remote.fragment_size);
    tracing::info!("SVC Directory: {:?}", config.pipeline.svc_dir);
    tracing::info!("Python: {:?}", config.pipeline.python_exe);
    tracing::info!("Results Directory: {:?}", config.pipeline.results_dir);
    tracing::info!("Model: {}", config.pipeline.model_name);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_port() {
        let mut config = AppConfig::default();
        config.remote.port = Some(0);
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.remote.transfer_port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_shared_port() {
        let mut config = AppConfig::default();
        config.remote.port = Some(config.remote.transfer_port);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_zero_fragment() {
        let mut config = AppConfig::default();
        config.remote.fragment_size = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_empty_python() {
        let mut config = AppConfig::default();
        config.pipeline.python_exe = Default::default();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[remote]\nhost = \"gpu-box\"\nport = 23332\n\n[pipeline]\nmodel_name = \"48k\""
        )
        .unwrap();

        let config = load_config_from_path(Some(file.path())).unwrap();
        assert_eq!(config.remote.host.as_deref(), Some("gpu-box"));
        assert_eq!(config.remote.port, Some(23332));
        assert_eq!(config.remote.transfer_port, 23333);
        assert_eq!(config.pipeline.model_name, "48k");
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = load_config_from_path(Some(Path::new("/nonexistent/sovits.toml")));
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }
}
