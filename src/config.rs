use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl ServerConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }
    fn default_port() -> u16 {
        10000
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// 日志格式
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
    fn default_format() -> String {
        "full".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: Self::default_format(),
        }
    }
}

/// CORS 配置
///
/// 默认对 `/process` 放开任意来源（与上线的六个变体保持一致），
/// 预检只回显 POST 与 Content-Type。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// 是否启用 CORS
    #[serde(default = "CorsConfig::default_enabled")]
    pub enabled: bool,
    /// 允许的 Origin 列表（支持 "*" 表示任意）
    #[serde(default = "CorsConfig::default_origins")]
    pub allowed_origins: Vec<String>,
    /// 允许的方法列表
    #[serde(default = "CorsConfig::default_methods")]
    pub allowed_methods: Vec<String>,
    /// 允许的请求头列表
    #[serde(default = "CorsConfig::default_headers")]
    pub allowed_headers: Vec<String>,
    /// 预检缓存时间（秒）
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl CorsConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_origins() -> Vec<String> {
        vec!["*".to_string()]
    }
    fn default_methods() -> Vec<String> {
        vec!["POST".to_string(), "OPTIONS".to_string()]
    }
    fn default_headers() -> Vec<String> {
        vec!["Content-Type".to_string()]
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            allowed_origins: Self::default_origins(),
            allowed_methods: Self::default_methods(),
            allowed_headers: Self::default_headers(),
            max_age_secs: None,
        }
    }
}

/// 上传限制配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 整个 multipart 请求体的字节上限
    #[serde(default = "UploadConfig::default_max_request_bytes")]
    pub max_request_bytes: usize,
    /// 单个上传文件的字节上限
    #[serde(default = "UploadConfig::default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl UploadConfig {
    fn default_max_request_bytes() -> usize {
        32 * 1024 * 1024
    }
    fn default_max_file_bytes() -> u64 {
        8 * 1024 * 1024
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: Self::default_max_request_bytes(),
            max_file_bytes: Self::default_max_file_bytes(),
        }
    }
}

/// 合成流水线配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 内容图缩略图边长上限（超过则按比例缩小，绝不放大）
    #[serde(default = "PipelineConfig::default_max_dimension")]
    pub max_dimension: u32,
    /// 输出 JPEG 质量（1-100）
    #[serde(default = "PipelineConfig::default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// 并发抠图许可数（0=自动，取 CPU 核心数）
    #[serde(default)]
    pub max_parallel: u32,
}

impl PipelineConfig {
    fn default_max_dimension() -> u32 {
        1024
    }
    fn default_jpeg_quality() -> u8 {
        90
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_dimension: Self::default_max_dimension(),
            jpeg_quality: Self::default_jpeg_quality(),
            max_parallel: 0,
        }
    }
}

/// 抠图实现类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RemoverKind {
    /// 本地边缘取色启发式（零外部依赖，可独立运行）
    #[default]
    BorderKey,
    /// 远程分割服务（HTTP 转发，返回带 alpha 的 PNG）
    Remote,
}

/// 背景移除配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoverConfig {
    /// 实现选择
    #[serde(default)]
    pub kind: RemoverKind,
    /// 远程分割服务地址（kind = remote 时必填）
    #[serde(default)]
    pub endpoint: Option<String>,
    /// 远程调用超时（秒）
    #[serde(default = "RemoverConfig::default_timeout")]
    pub timeout_secs: u64,
    /// 边缘取色容差（kind = border-key 时生效，0-255 色距）
    #[serde(default = "RemoverConfig::default_tolerance")]
    pub tolerance: u8,
}

impl RemoverConfig {
    fn default_timeout() -> u64 {
        30
    }
    fn default_tolerance() -> u8 {
        32
    }
}

impl Default for RemoverConfig {
    fn default() -> Self {
        Self {
            kind: RemoverKind::default(),
            endpoint: None,
            timeout_secs: Self::default_timeout(),
            tolerance: Self::default_tolerance(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// CORS 配置
    #[serde(default)]
    pub cors: CorsConfig,
    /// 上传限制配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 合成流水线配置
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// 背景移除配置
    #[serde(default)]
    pub remover: RemoverConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    ///
    /// `config.toml` 可缺省，此时全部字段取默认值。
    pub fn load() -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::builder()
            .add_source(File::with_name("config.toml").required(false))
            // 支持环境变量覆盖，例如：APP_SERVER_PORT
            .add_source(
                Environment::with_prefix("APP")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?;

        builder.try_deserialize()
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<(), ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(())
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 并发抠图许可数（0=自动，取 CPU 核心数）
    pub fn removal_permits(&self) -> usize {
        let m = self.pipeline.max_parallel as usize;
        if m == 0 { num_cpus::get() } else { m }
    }
}
