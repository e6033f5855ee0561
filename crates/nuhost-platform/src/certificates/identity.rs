//! Structured identity encoded in a certificate subject.
//!
//! Subjects follow `CN=<name>, OU=<subtarget...>, OU=<target>, OU=<purpose>,
//! OU=<environment>, OU=nuget-services`: the organisational units read from
//! right to left describe a path from the marker down to the leaf subtarget.

use super::store::InstalledCertificate;

/// Marker closing the organisational unit chain of recognised certificates.
pub const SERVICES_MARKER: &str = "nuget-services";

/// Well-known certificate purposes.
pub mod purposes {
    /// Cloud management credentials.
    pub const AZURE_MANAGEMENT: &str = "azure-management";
    /// Certificate authority.
    pub const CERTIFICATE_AUTHORITY: &str = "ca";
    /// TLS client authentication.
    pub const CLIENT_AUTHENTICATION: &str = "client-auth";
}

/// Identity parsed from a certificate subject, optionally bound to the certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NuGetCertificate {
    name: String,
    environment: Option<String>,
    purpose: Option<String>,
    target: Option<String>,
    subtargets: Vec<String>,
    certificate: Option<InstalledCertificate>,
}

impl NuGetCertificate {
    /// Parses a subject distinguished name.
    ///
    /// Returns `None` when the subject is not a recognised identity: the first
    /// attribute is not `CN`, or the `OU` chain does not end in the services
    /// marker.
    #[must_use]
    pub fn parse_subject(subject: &str) -> Option<Self> {
        let mut fragments = subject.split(',').filter_map(split_fragment);

        let (attribute, name) = fragments.next()?;
        if !attribute.eq_ignore_ascii_case("CN") {
            return None;
        }

        let mut units: Vec<&str> = fragments
            .take_while(|(attribute, _)| attribute.eq_ignore_ascii_case("OU"))
            .map(|(_, value)| value)
            .collect();
        units.reverse();

        let mut chain = units.into_iter();
        if !chain.next()?.eq_ignore_ascii_case(SERVICES_MARKER) {
            return None;
        }

        let environment = chain.next().and_then(non_empty);
        let purpose = chain.next().and_then(non_empty);
        let target = chain.next().and_then(non_empty);
        let subtargets = chain.map(str::to_owned).collect();

        Some(Self {
            name: name.to_owned(),
            environment,
            purpose,
            target,
            subtargets,
            certificate: None,
        })
    }

    /// Parses the subject of an installed certificate and binds it.
    #[must_use]
    pub fn from_installed(certificate: &InstalledCertificate) -> Option<Self> {
        Self::parse_subject(certificate.subject())
            .map(|identity| identity.with_certificate(certificate.clone()))
    }

    /// Binds a certificate whether or not its subject is recognised.
    ///
    /// Used for certificates selected by an explicit thumbprint.
    #[must_use]
    pub fn bind(certificate: &InstalledCertificate) -> Self {
        Self::from_installed(certificate).unwrap_or_else(|| Self {
            name: String::new(),
            environment: None,
            purpose: None,
            target: None,
            subtargets: Vec::new(),
            certificate: Some(certificate.clone()),
        })
    }

    /// Attaches the certificate this identity was parsed from.
    #[must_use]
    pub fn with_certificate(mut self, certificate: InstalledCertificate) -> Self {
        self.certificate = Some(certificate);
        self
    }

    /// Common name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deployment environment.
    #[must_use]
    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// What the certificate is for.
    #[must_use]
    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    /// Resource the certificate targets.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Finer-grained scopes in root-to-leaf order.
    #[must_use]
    pub fn subtargets(&self) -> &[String] {
        &self.subtargets
    }

    /// Bound certificate, if any.
    #[must_use]
    pub const fn certificate(&self) -> Option<&InstalledCertificate> {
        self.certificate.as_ref()
    }

    /// Thumbprint of the bound certificate, or an empty string.
    #[must_use]
    pub fn thumbprint(&self) -> &str {
        self.certificate
            .as_ref()
            .map_or("", InstalledCertificate::thumbprint)
    }

    /// Subject of the bound certificate, or an empty string.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.certificate
            .as_ref()
            .map_or("", InstalledCertificate::subject)
    }

    /// Whether the parsed purpose matches, ignoring ASCII case.
    #[must_use]
    pub fn has_purpose(&self, purpose: &str) -> bool {
        self.purpose
            .as_deref()
            .is_some_and(|own| own.eq_ignore_ascii_case(purpose))
    }
}

fn split_fragment(fragment: &str) -> Option<(&str, &str)> {
    let parts: Vec<&str> = fragment.split('=').collect();
    match parts.as_slice() {
        [attribute, value] => Some((attribute.trim(), value.trim())),
        _ => None,
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}
