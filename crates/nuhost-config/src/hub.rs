//! Typed access to service settings.

use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::keys;
use crate::source::SettingSource;

/// HTTP settings shared by every hosted service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpSettings {
    /// Shared admin secret; `None` disables admin authentication.
    pub admin_key: Option<String>,
    /// Allows admin authentication over plaintext transports.
    pub allow_insecure: bool,
}

/// Entry point services use to read configuration.
#[derive(Clone)]
pub struct ConfigurationHub {
    source: Arc<dyn SettingSource>,
}

impl ConfigurationHub {
    /// Wraps a setting source.
    #[must_use]
    pub fn new(source: Arc<dyn SettingSource>) -> Self {
        Self { source }
    }

    /// Raw lookup of a single setting.
    #[must_use]
    pub fn get_setting(&self, name: &str) -> Option<String> {
        self.source.get_setting(name)
    }

    /// Reads a setting, treating an empty or whitespace-only value as absent.
    #[must_use]
    pub fn get_non_empty(&self, name: &str) -> Option<String> {
        self.get_setting(name)
            .filter(|value| !value.trim().is_empty())
    }

    /// Reads a boolean flag; anything other than a case-insensitive `true` is false.
    #[must_use]
    pub fn get_flag(&self, name: &str) -> bool {
        self.get_setting(name)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
    }

    /// HTTP settings view.
    #[must_use]
    pub fn http(&self) -> HttpSettings {
        HttpSettings {
            admin_key: self.get_non_empty(keys::HTTP_ADMIN_KEY),
            allow_insecure: self.get_flag(keys::HTTP_ALLOW_INSECURE),
        }
    }

    /// Configured logical host name, if any.
    #[must_use]
    pub fn host_name(&self) -> Option<String> {
        self.get_non_empty(keys::HOST_NAME)
    }

    /// Configured trace level for service event sources, if any.
    #[must_use]
    pub fn trace_level(&self) -> Option<String> {
        self.get_non_empty(keys::HOST_TRACE_LEVEL)
    }

    /// Configured certificate store root, if any.
    #[must_use]
    pub fn certificate_store(&self) -> Option<Utf8PathBuf> {
        self.get_non_empty(keys::CERTIFICATE_STORE_PATH)
            .map(Utf8PathBuf::from)
    }

    /// Configured management certificate thumbprint, if any.
    #[must_use]
    pub fn management_thumbprint(&self) -> Option<String> {
        self.get_non_empty(keys::MANAGEMENT_CERTIFICATE_THUMBPRINT)
    }
}

impl fmt::Debug for ConfigurationHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationHub").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::{fixture, rstest};

    use super::{ConfigurationHub, HttpSettings};
    use crate::StaticSettings;

    #[fixture]
    fn settings() -> StaticSettings {
        StaticSettings::default()
            .with("Http.AdminKey", "s3cret")
            .with("Http.AllowInsecure", "True")
            .with("Host.Name", "  ")
    }

    #[rstest]
    fn http_view_reads_admin_settings(settings: StaticSettings) {
        let hub = ConfigurationHub::new(Arc::new(settings));
        assert_eq!(
            hub.http(),
            HttpSettings {
                admin_key: Some("s3cret".to_owned()),
                allow_insecure: true,
            }
        );
    }

    #[rstest]
    fn blank_values_are_treated_as_absent(settings: StaticSettings) {
        let hub = ConfigurationHub::new(Arc::new(settings));
        assert_eq!(hub.get_setting("Host.Name").as_deref(), Some("  "));
        assert!(hub.host_name().is_none());
    }

    #[rstest]
    #[case("false")]
    #[case("yes")]
    #[case("")]
    fn non_true_flags_are_false(#[case] value: &str) {
        let hub = ConfigurationHub::new(Arc::new(
            StaticSettings::default().with("Http.AllowInsecure", value),
        ));
        assert!(!hub.http().allow_insecure);
    }
}
