use serde::Deserialize;

use crate::domain::entity::LimitationSnapshot;

/// Application configuration for subscription quota server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&content)?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8098
}

/// DatabaseConfig はデータベース接続の設定を表す（URL形式）。
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// 起動時に migrations/ を適用するか。
    #[serde(default)]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

/// RedisConfig は Redis 接続の設定を表す。
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_key_prefix() -> String {
    "quota:usage:".to_string()
}

/// QuotaConfig はクォータエンジン固有の設定を表す。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotaConfig {
    /// 全ての制限を免除するサブジェクト ID。
    #[serde(default)]
    pub root_subject_id: Option<String>,
}

/// SubscriptionConfig は購読管理サービスとデフォルトプランの設定を表す。
/// service が指定されていれば HTTP 経由、無ければ default_plan を使うインメモリ実装になる。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(default)]
    pub service: Option<SubscriptionServiceConfig>,
    #[serde(default)]
    pub default_plan: Option<DefaultPlanConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionServiceConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    5
}

/// DefaultPlanConfig は有効な購読が無いサブジェクトに自動登録するプラン。
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultPlanConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_duration_days")]
    pub duration_days: u32,
    #[serde(default)]
    pub limitation: LimitationSnapshot,
}

fn default_duration_days() -> u32 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" の場合はプレーンテキスト、それ以外は JSON。
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}
