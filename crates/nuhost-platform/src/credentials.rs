//! Management credentials derived from installed certificates.
//!
//! Selection walks [`StoreLocation::SEARCH_ORDER`]. Within a location an
//! explicitly configured thumbprint wins; otherwise the first valid
//! certificate whose purpose is `azure-management` is used. The selected
//! certificate's target, written `Name[Id]`, names the subscription.

use std::sync::Arc;

use nuhost_config::keys;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::certificates::{CertificateHub, NuGetCertificate, StoreError, StoreLocation, purposes};

pub(crate) const CREDENTIALS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::credentials");

#[expect(clippy::expect_used, reason = "the pattern is a compile-time constant")]
static TARGET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<name>[^,]+)\[(?P<id>[^\]]+)\]").expect("target pattern is valid")
});

/// Subscription identity backed by a management certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    subscription_id: String,
    subscription_name: String,
    certificate: NuGetCertificate,
}

impl Credentials {
    /// Subscription identifier, the `Id` part of `Name[Id]`.
    #[must_use]
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Subscription display name, the `Name` part of `Name[Id]`.
    #[must_use]
    pub fn subscription_name(&self) -> &str {
        &self.subscription_name
    }

    /// Certificate the identity was read from.
    #[must_use]
    pub const fn certificate(&self) -> &NuGetCertificate {
        &self.certificate
    }
}

/// Configuration errors raised while resolving credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No management certificate is installed and one was required.
    #[error("no management certificate was found in any certificate store")]
    MissingCertificate,
    /// The selected certificate does not name a subscription.
    #[error("management certificate {thumbprint} does not specify a subscription target")]
    MissingSubscription {
        /// Thumbprint of the selected certificate.
        thumbprint: String,
    },
    /// The selected certificate's target is not of the form `Name[Id]`.
    #[error("management certificate {thumbprint} has invalid subscription target '{target}'")]
    InvalidTarget {
        /// Thumbprint of the selected certificate.
        thumbprint: String,
        /// Target as written in the subject.
        target: String,
    },
    /// A certificate store could not be read.
    #[error("failed to search the {location} certificate store: {source}")]
    Store {
        /// Location being searched.
        location: StoreLocation,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
}

/// Resolves management credentials on behalf of services.
#[derive(Debug, Clone)]
pub struct CredentialHub {
    certificates: Arc<CertificateHub>,
}

impl CredentialHub {
    /// Builds a hub over the shared certificate hub.
    #[must_use]
    pub const fn new(certificates: Arc<CertificateHub>) -> Self {
        Self { certificates }
    }

    /// Resolves credentials.
    ///
    /// Returns `Ok(None)` when no certificate exists and `throw_if_missing` is
    /// false.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::MissingCertificate`] when no certificate
    /// exists and one is required, a target error when the selected
    /// certificate does not carry a usable `Name[Id]` target, and
    /// [`CredentialError::Store`] when a store cannot be read.
    pub fn get_credentials(
        &self,
        throw_if_missing: bool,
    ) -> Result<Option<Credentials>, CredentialError> {
        let Some(certificate) = self.find_certificate()? else {
            if throw_if_missing {
                return Err(CredentialError::MissingCertificate);
            }
            return Ok(None);
        };

        let (subscription_name, subscription_id) = parse_target(&certificate)?;
        info!(
            target: CREDENTIALS_TARGET,
            event = "using_credentials",
            subscription_name = %subscription_name,
            subscription_id = %subscription_id,
            thumbprint = %certificate.thumbprint(),
            "using management credentials"
        );
        Ok(Some(Credentials {
            subscription_id,
            subscription_name,
            certificate,
        }))
    }

    fn find_certificate(&self) -> Result<Option<NuGetCertificate>, CredentialError> {
        for location in StoreLocation::SEARCH_ORDER {
            if let Some(found) = self.find_in(location)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn find_in(&self, location: StoreLocation) -> Result<Option<NuGetCertificate>, CredentialError> {
        let store_error = |source| CredentialError::Store { location, source };

        if let Some(specific) = self
            .certificates
            .from_setting(keys::MANAGEMENT_CERTIFICATE_THUMBPRINT, location)
            .map_err(store_error)?
        {
            report_match(location, &specific, "single_match");
            return Ok(Some(specific));
        }

        let candidates = self
            .certificates
            .by_purpose(purposes::AZURE_MANAGEMENT, location)
            .map_err(store_error)?;
        let count = candidates.len();
        let Some(first) = candidates.into_iter().next() else {
            debug!(
                target: CREDENTIALS_TARGET,
                event = "no_match",
                location = %location,
                "no management certificate in store"
            );
            return Ok(None);
        };
        report_match(
            location,
            &first,
            if count == 1 { "single_match" } else { "multiple_matches" },
        );
        Ok(Some(first))
    }
}

fn report_match(location: StoreLocation, certificate: &NuGetCertificate, event: &'static str) {
    info!(
        target: CREDENTIALS_TARGET,
        event,
        location = %location,
        thumbprint = %certificate.thumbprint(),
        subject = %certificate.subject(),
        "selected management certificate"
    );
}

/// Splits a `Name[Id]` target into `(name, id)`.
fn parse_target(certificate: &NuGetCertificate) -> Result<(String, String), CredentialError> {
    let thumbprint = certificate.thumbprint().to_owned();
    let Some(target) = certificate.target() else {
        return Err(CredentialError::MissingSubscription { thumbprint });
    };
    let invalid = || CredentialError::InvalidTarget {
        thumbprint: thumbprint.clone(),
        target: target.to_owned(),
    };
    let captures = TARGET_PATTERN.captures(target).ok_or_else(invalid)?;
    let name = captures.name("name").ok_or_else(invalid)?.as_str();
    let id = captures.name("id").ok_or_else(invalid)?.as_str();
    Ok((name.to_owned(), id.to_owned()))
}
