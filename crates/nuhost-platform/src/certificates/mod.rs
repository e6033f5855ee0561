//! Certificate store adapter: enumeration, validity filtering and subject parsing.

mod identity;
mod pem;
mod store;

pub use identity::{NuGetCertificate, SERVICES_MARKER, purposes};
pub use pem::{PemDirectoryStore, thumbprint};
pub use store::{CertificateHub, CertificateStore, InstalledCertificate, StoreError, StoreLocation};
