//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use std::collections::HashMap;
use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::observability::ObservabilityConfig;

/// 单个渠道的提供方配置
///
/// `provider` 为提供方名称（目前仅支持 "mock"），`settings` 为提供方自定义的键值配置，
/// 例如邮件渠道的 `default_sender`。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub provider: String,
    pub enabled: bool,
    pub settings: HashMap<String, String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            enabled: true,
            settings: HashMap::new(),
        }
    }
}

impl ChannelConfig {
    /// 指定提供方名称的配置
    pub fn with_provider(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Default::default()
        }
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

/// 各渠道提供方配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub email: ChannelConfig,
    pub sms: ChannelConfig,
    pub push: ChannelConfig,
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub observability: ObservabilityConfig,
    pub providers: ProvidersConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（NOTIFY_ 前缀，`__` 分隔层级，
    ///    如 NOTIFY_PROVIDERS__EMAIL__SETTINGS__DEFAULT_SENDER -> providers.email.settings.default_sender）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("NOTIFY_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .set_default("observability.service_name", service_name)?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("NOTIFY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.providers.email.provider, "mock");
        assert!(config.providers.sms.enabled);
        assert!(config.providers.push.settings.is_empty());
        assert!(!config.is_production());
    }

    #[test]
    fn test_channel_setting_lookup() {
        let mut config = ChannelConfig::with_provider("mock");
        config
            .settings
            .insert("default_sender".to_string(), "ops@example.com".to_string());
        assert_eq!(config.setting("default_sender"), Some("ops@example.com"));
        assert_eq!(config.setting("missing"), None);
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        // 配置目录不存在时所有文件源都是可选的
        // SAFETY: 仅在本测试中修改该变量
        unsafe {
            std::env::set_var("CONFIG_DIR", "/nonexistent-notify-config");
        }
        let config = AppConfig::load("notification-dispatch").expect("load config");
        assert_eq!(config.service_name, "notification-dispatch");
        assert_eq!(config.observability.service_name, "notification-dispatch");
        assert_eq!(config.providers.push.provider, "mock");
        unsafe {
            std::env::remove_var("CONFIG_DIR");
        }
    }

    #[test]
    fn test_load_from_toml_source() {
        let raw = r#"
            service_name = "dispatch"
            [providers.email]
            provider = "mock"
            [providers.email.settings]
            default_sender = "team@example.com"
            [providers.sms]
            provider = "twilio"
            enabled = false
        "#;
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(raw, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("parse config");

        assert_eq!(
            config.providers.email.setting("default_sender"),
            Some("team@example.com")
        );
        assert_eq!(config.providers.sms.provider, "twilio");
        assert!(!config.providers.sms.enabled);
        // 未配置的渠道回落到默认值
        assert_eq!(config.providers.push.provider, "mock");
    }
}
