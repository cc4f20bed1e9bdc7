// Конфигурация приложения
// Логирование можно отключить только в режиме разработки

use crate::error::ConfigError;
use crate::peer::ice::default_ice_servers;
use crate::peer::types::{IceServerConfig, IceServerKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // В режиме отладки логирование включено

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // В продакшене включается только через RUST_LOG

// Дополнительные настройки для режима разработки
#[cfg(debug_assertions)]
pub mod dev {
    // Для полного отключения логирования в режиме разработки
    // измените эту константу на false
    pub const ENABLE_LOGGING: bool = true;
}

#[cfg(not(debug_assertions))]
pub mod dev {
    pub const ENABLE_LOGGING: bool = false;
}

/// Максимум участников в комнате
pub const ROOM_CAPACITY: usize = 2;

/// Таймаут обмена offer/answer по умолчанию
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Настройки автомата согласования
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NegotiatorConfig {
    /// Сколько секунд ждать завершения обмена offer/answer
    pub negotiation_timeout_secs: u64,
    /// Сколько секунд ждать восстановления после `disconnected` (0 - сразу Failed)
    pub disconnect_grace_secs: u64,
    /// Запрашивать медиа сразу при входе в комнату
    pub acquire_media_on_join: bool,
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout_secs: DEFAULT_NEGOTIATION_TIMEOUT.as_secs(),
            disconnect_grace_secs: 0,
            acquire_media_on_join: false,
            ice_servers: default_ice_servers(),
        }
    }
}

impl NegotiatorConfig {
    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_secs(self.negotiation_timeout_secs)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }

    /// Читает конфигурацию из JSON файла; отсутствующие поля берутся по умолчанию
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.negotiation_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "negotiation_timeout_secs must be positive".into(),
            ));
        }
        self.ice_servers.iter().try_for_each(IceServerConfig::validate)
    }
}

impl IceServerConfig {
    /// Валидация сервера: пустой URL запрещён, TURN требует логин и пароль
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "ICE server {}: URL cannot be empty",
                self.id
            )));
        }
        if self.r#type == IceServerKind::Turn
            && (self.username.is_none() || self.credential.is_none())
        {
            return Err(ConfigError::Invalid(format!(
                "ICE server {}: TURN servers require username and credential",
                self.id
            )));
        }
        Ok(())
    }
}
