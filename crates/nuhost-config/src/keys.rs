//! Well-known setting names read by the platform.

/// Thumbprint of the certificate used for cloud management credentials.
pub const MANAGEMENT_CERTIFICATE_THUMBPRINT: &str = "Azure.ManagementCertificateThumbprint";

/// Shared secret granting the admin role over HTTP Basic authentication.
pub const HTTP_ADMIN_KEY: &str = "Http.AdminKey";

/// Permits admin authentication over plaintext HTTP when `true`.
pub const HTTP_ALLOW_INSECURE: &str = "Http.AllowInsecure";

/// Logical host name.
pub const HOST_NAME: &str = "Host.Name";

/// Trace level applied to service event sources.
pub const HOST_TRACE_LEVEL: &str = "Host.TraceLevel";

/// Root directory of the PEM certificate store.
pub const CERTIFICATE_STORE_PATH: &str = "Certificates.StorePath";
