//! Certificate store abstraction and the hub services query through.

use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;
use nuhost_config::ConfigurationHub;
use thiserror::Error;
use time::OffsetDateTime;

use super::identity::NuGetCertificate;
use crate::clock::Clock;

/// Store locations searched for certificates, in search order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreLocation {
    /// Certificates installed for the whole machine.
    LocalMachine,
    /// Certificates installed for the current user.
    CurrentUser,
}

impl StoreLocation {
    /// Every location, machine-wide first.
    pub const SEARCH_ORDER: [Self; 2] = [Self::LocalMachine, Self::CurrentUser];
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LocalMachine => "LocalMachine",
            Self::CurrentUser => "CurrentUser",
        })
    }
}

/// A certificate as enumerated from a store.
#[derive(Clone, PartialEq, Eq)]
pub struct InstalledCertificate {
    thumbprint: String,
    subject: String,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    der: Arc<[u8]>,
}

impl InstalledCertificate {
    /// Builds a certificate record. The thumbprint is normalised to upper case.
    #[must_use]
    pub fn new(
        thumbprint: &str,
        subject: impl Into<String>,
        not_before: OffsetDateTime,
        not_after: OffsetDateTime,
        der: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            thumbprint: thumbprint.to_ascii_uppercase(),
            subject: subject.into(),
            not_before,
            not_after,
            der: der.into(),
        }
    }

    /// Upper-case hexadecimal SHA-1 thumbprint.
    #[must_use]
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Subject distinguished name, most specific attribute first.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Start of the validity window.
    #[must_use]
    pub const fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    /// End of the validity window.
    #[must_use]
    pub const fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    /// DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Whether `now` falls inside the validity window.
    #[must_use]
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// Compares thumbprints ignoring case and embedded whitespace.
    #[must_use]
    pub fn matches_thumbprint(&self, thumbprint: &str) -> bool {
        let wanted = thumbprint
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .map(|ch| ch.to_ascii_uppercase());
        self.thumbprint.chars().eq(wanted)
    }
}

impl fmt::Debug for InstalledCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstalledCertificate")
            .field("thumbprint", &self.thumbprint)
            .field("subject", &self.subject)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

/// Errors raised while enumerating a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading the store failed.
    #[error("failed to read certificate store '{path}': {source}")]
    Io {
        /// Path that could not be read.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// A file in the store did not contain a readable certificate.
    #[error("failed to parse certificate '{path}': {message}")]
    Parse {
        /// Offending file.
        path: Utf8PathBuf,
        /// Parser diagnostic.
        message: String,
    },
}

/// Enumerates installed certificates.
pub trait CertificateStore: Send + Sync {
    /// Lists every certificate in a location, in the store's own order.
    fn certificates(&self, location: StoreLocation) -> Result<Vec<InstalledCertificate>, StoreError>;
}

impl<T> CertificateStore for Arc<T>
where
    T: CertificateStore + ?Sized,
{
    fn certificates(&self, location: StoreLocation) -> Result<Vec<InstalledCertificate>, StoreError> {
        (**self).certificates(location)
    }
}

/// Certificate queries shared by hosted services.
#[derive(Clone)]
pub struct CertificateHub {
    store: Arc<dyn CertificateStore>,
    config: ConfigurationHub,
    clock: Arc<dyn Clock>,
}

impl CertificateHub {
    /// Builds a hub over a store.
    #[must_use]
    pub fn new(
        store: Arc<dyn CertificateStore>,
        config: ConfigurationHub,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Recognised certificates that are valid now, in store order.
    ///
    /// # Errors
    ///
    /// Propagates store enumeration failures.
    pub fn all_certificates(
        &self,
        location: StoreLocation,
    ) -> Result<Vec<NuGetCertificate>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .store
            .certificates(location)?
            .iter()
            .filter(|certificate| certificate.is_valid_at(now))
            .filter_map(NuGetCertificate::from_installed)
            .collect())
    }

    /// Valid recognised certificates whose purpose matches, in store order.
    ///
    /// # Errors
    ///
    /// Propagates store enumeration failures.
    pub fn by_purpose(
        &self,
        purpose: &str,
        location: StoreLocation,
    ) -> Result<Vec<NuGetCertificate>, StoreError> {
        Ok(self
            .all_certificates(location)?
            .into_iter()
            .filter(|certificate| certificate.has_purpose(purpose))
            .collect())
    }

    /// Certificate whose thumbprint is named by a setting.
    ///
    /// The lookup ignores the validity window. Returns `None` when the setting
    /// is absent or blank, or no certificate carries that thumbprint.
    ///
    /// # Errors
    ///
    /// Propagates store enumeration failures.
    pub fn from_setting(
        &self,
        setting: &str,
        location: StoreLocation,
    ) -> Result<Option<NuGetCertificate>, StoreError> {
        let Some(thumbprint) = self.config.get_non_empty(setting) else {
            return Ok(None);
        };
        Ok(self
            .store
            .certificates(location)?
            .iter()
            .find(|certificate| certificate.matches_thumbprint(&thumbprint))
            .map(NuGetCertificate::bind))
    }
}

impl fmt::Debug for CertificateHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateHub").finish_non_exhaustive()
    }
}
