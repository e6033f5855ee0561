//! Key/value lookups backing the [`crate::ConfigurationHub`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Resolves dotted setting names such as `Http.AdminKey`.
///
/// `None` means the setting is absent, which callers treat differently from a
/// present but empty value.
pub trait SettingSource: Send + Sync {
    /// Looks up a single setting.
    fn get_setting(&self, name: &str) -> Option<String>;
}

impl<T> SettingSource for Arc<T>
where
    T: SettingSource + ?Sized,
{
    fn get_setting(&self, name: &str) -> Option<String> {
        (**self).get_setting(name)
    }
}

/// Settings held in memory, typically supplied on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticSettings {
    values: BTreeMap<String, String>,
}

impl StaticSettings {
    /// Wraps an existing map.
    #[must_use]
    pub const fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Adds or replaces a setting, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl SettingSource for StaticSettings {
    fn get_setting(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Reads settings from process environment variables.
///
/// `Http.AdminKey` with the `NUHOST` prefix maps to `NUHOST_HTTP_ADMINKEY`.
#[derive(Debug, Clone)]
pub struct EnvironmentSettings {
    prefix: String,
}

impl EnvironmentSettings {
    /// Builds a source using the given variable prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable consulted for a setting name.
    #[must_use]
    pub fn variable_name(&self, name: &str) -> String {
        let suffix: String = name
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() {
                    ch.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_{suffix}", self.prefix)
    }
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self::new("NUHOST")
    }
}

impl SettingSource for EnvironmentSettings {
    fn get_setting(&self, name: &str) -> Option<String> {
        std::env::var(self.variable_name(name)).ok()
    }
}

/// Adapts a callback into a [`SettingSource`].
pub struct FnSettings<F> {
    lookup: F,
}

impl<F> FnSettings<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    /// Wraps the callback.
    pub const fn new(lookup: F) -> Self {
        Self { lookup }
    }
}

impl<F> fmt::Debug for FnSettings<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSettings").finish_non_exhaustive()
    }
}

impl<F> SettingSource for FnSettings<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn get_setting(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("Http.AdminKey", "NUHOST_HTTP_ADMINKEY")]
    #[case("Azure.ManagementCertificateThumbprint", "NUHOST_AZURE_MANAGEMENTCERTIFICATETHUMBPRINT")]
    #[case("Host.Name", "NUHOST_HOST_NAME")]
    fn maps_setting_names_to_variables(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(EnvironmentSettings::default().variable_name(name), expected);
    }

    #[rstest]
    fn static_settings_distinguish_empty_from_absent() {
        let settings = StaticSettings::default().with("Http.AdminKey", "");
        assert_eq!(settings.get_setting("Http.AdminKey"), Some(String::new()));
        assert_eq!(settings.get_setting("Http.AllowInsecure"), None);
    }

    #[rstest]
    fn callback_settings_delegate_to_closure() {
        let settings = FnSettings::new(|name: &str| (name == "Host.Name").then(|| "box".to_owned()));
        assert_eq!(settings.get_setting("Host.Name").as_deref(), Some("box"));
        assert!(settings.get_setting("Host.TraceLevel").is_none());
    }
}
