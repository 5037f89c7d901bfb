use core::str::FromStr;

use serde::{Deserialize, Serialize};

use worklane_core::{DomainError, EntityMeta, TenantScopedEntity};

/// Closed set of tenant setting names.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    DefaultLanguage,
    FileStorageProvider,
    TimeFormat,
    AllowScreenshotCapture,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::DefaultLanguage,
        SettingKey::FileStorageProvider,
        SettingKey::TimeFormat,
        SettingKey::AllowScreenshotCapture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::DefaultLanguage => "default_language",
            SettingKey::FileStorageProvider => "file_storage_provider",
            SettingKey::TimeFormat => "time_format",
            SettingKey::AllowScreenshotCapture => "allow_screenshot_capture",
        }
    }
}

impl FromStr for SettingKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown setting '{s}'")))
    }
}

/// Settings seeded for every new tenant.
pub const DEFAULT_TENANT_SETTINGS: &[(SettingKey, &str)] = &[
    (SettingKey::DefaultLanguage, "en"),
    (SettingKey::FileStorageProvider, "LOCAL"),
    (SettingKey::TimeFormat, "24"),
    (SettingKey::AllowScreenshotCapture, "true"),
];

/// A named setting value.
///
/// Rows with `tenant_id = null` are platform-wide defaults every tenant can read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSetting {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub name: SettingKey,
    pub value: String,
}

impl TenantSetting {
    pub fn new(name: SettingKey, value: impl Into<String>) -> Self {
        Self {
            meta: EntityMeta::new(),
            name,
            value: value.into(),
        }
    }
}

impl TenantScopedEntity for TenantSetting {
    const COLLECTION: &'static str = "tenant_settings";
    const SHARES_GLOBAL_DEFAULTS: bool = true;
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[&["name"]];

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip() {
        for key in SettingKey::ALL {
            assert_eq!(key.as_str().parse::<SettingKey>().unwrap(), key);
            assert_eq!(serde_json::to_value(key).unwrap(), key.as_str());
        }
        assert!("theme".parse::<SettingKey>().is_err());
    }
}
