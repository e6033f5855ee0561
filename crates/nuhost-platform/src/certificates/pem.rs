//! A certificate store backed by directories of PEM files.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use sha1::{Digest, Sha1};
use x509_parser::certificate::X509Certificate;
use x509_parser::oid_registry::{
    OID_PKCS9_EMAIL_ADDRESS, OID_X509_COMMON_NAME, OID_X509_COUNTRY_NAME, OID_X509_LOCALITY_NAME,
    OID_X509_ORGANIZATION_NAME, OID_X509_ORGANIZATIONAL_UNIT, OID_X509_STATE_OR_PROVINCE_NAME,
};
use x509_parser::pem::Pem;
use x509_parser::x509::X509Name;

use super::store::{CertificateStore, InstalledCertificate, StoreError, StoreLocation};

const EXTENSIONS: [&str; 3] = ["pem", "crt", "cer"];
const SYSTEM_ROOT: &str = "/etc/nuhost/certificates";
const STORE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::certificates");

/// Maps each [`StoreLocation`] to a directory of PEM certificates.
///
/// Files are enumerated in file name order and each may hold several
/// certificates. A missing directory is an empty store; a file that cannot
/// be read or parsed is skipped with a warning.
#[derive(Debug, Clone)]
pub struct PemDirectoryStore {
    local_machine: Utf8PathBuf,
    current_user: Utf8PathBuf,
}

impl PemDirectoryStore {
    /// Uses explicit directories for each location.
    #[must_use]
    pub const fn new(local_machine: Utf8PathBuf, current_user: Utf8PathBuf) -> Self {
        Self {
            local_machine,
            current_user,
        }
    }

    /// Uses `<root>/local-machine` and `<root>/current-user`.
    #[must_use]
    pub fn under(root: &Utf8Path) -> Self {
        Self::new(root.join("local-machine"), root.join("current-user"))
    }

    /// Machine-wide certificates under `/etc/nuhost/certificates`, user
    /// certificates under the user's configuration directory.
    #[must_use]
    pub fn system() -> Self {
        let current_user = dirs::config_dir()
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            .map_or_else(
                || Utf8PathBuf::from(SYSTEM_ROOT).join("current-user"),
                |dir| dir.join("nuhost").join("certificates"),
            );
        Self::new(Utf8PathBuf::from(SYSTEM_ROOT), current_user)
    }

    /// Directory backing a location.
    #[must_use]
    pub fn directory(&self, location: StoreLocation) -> &Utf8Path {
        match location {
            StoreLocation::LocalMachine => &self.local_machine,
            StoreLocation::CurrentUser => &self.current_user,
        }
    }
}

impl CertificateStore for PemDirectoryStore {
    fn certificates(&self, location: StoreLocation) -> Result<Vec<InstalledCertificate>, StoreError> {
        let directory = self.directory(location);
        let mut files = match list_certificate_files(directory) {
            Ok(files) => files,
            Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: directory.to_owned(),
                    source,
                });
            }
        };
        files.sort();

        let mut certificates = Vec::new();
        for path in files {
            match read_pem_file(&path) {
                Ok(found) => certificates.extend(found),
                Err(error) => tracing::warn!(
                    target: STORE_TARGET,
                    event = "certificate_skipped",
                    location = ?location,
                    path = %path,
                    error = %error,
                    "skipping unreadable certificate file"
                ),
            }
        }
        Ok(certificates)
    }
}

fn list_certificate_files(directory: &Utf8Path) -> io::Result<Vec<Utf8PathBuf>> {
    let mut files = Vec::new();
    for entry in directory.read_dir_utf8()? {
        let entry = entry?;
        let path = entry.path();
        let recognised = path
            .extension()
            .is_some_and(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)));
        if recognised && entry.file_type()?.is_file() {
            files.push(path.to_owned());
        }
    }
    Ok(files)
}

fn read_pem_file(path: &Utf8Path) -> Result<Vec<InstalledCertificate>, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })?;
    let parse_error = |message: String| StoreError::Parse {
        path: path.to_owned(),
        message,
    };

    let mut certificates = Vec::new();
    for block in Pem::iter_from_buffer(&bytes) {
        let block = block.map_err(|error| parse_error(error.to_string()))?;
        if block.label != "CERTIFICATE" {
            continue;
        }
        let (_, parsed) = x509_parser::parse_x509_certificate(&block.contents)
            .map_err(|error| parse_error(error.to_string()))?;
        certificates.push(installed(&parsed, &block.contents));
    }
    Ok(certificates)
}

fn installed(certificate: &X509Certificate<'_>, der: &[u8]) -> InstalledCertificate {
    let validity = certificate.validity();
    InstalledCertificate::new(
        &thumbprint(der),
        render_name(certificate.subject()),
        validity.not_before.to_datetime(),
        validity.not_after.to_datetime(),
        der.to_vec(),
    )
}

/// Upper-case hexadecimal SHA-1 of the DER encoding.
#[must_use]
pub fn thumbprint(der: &[u8]) -> String {
    Sha1::digest(der)
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect()
}

/// Renders a name most specific attribute first, e.g. `CN=a, OU=b`.
fn render_name(name: &X509Name<'_>) -> String {
    let rdns: Vec<String> = name
        .iter()
        .map(|rdn| {
            rdn.iter()
                .map(|attribute| {
                    let key = attribute_name(attribute.attr_type());
                    let value = attribute.as_str().unwrap_or_default();
                    format!("{key}={value}")
                })
                .collect::<Vec<_>>()
                .join(" + ")
        })
        .collect();
    rdns.into_iter().rev().collect::<Vec<_>>().join(", ")
}

fn attribute_name(oid: &x509_parser::der_parser::oid::Oid<'_>) -> String {
    let known = [
        (&OID_X509_COMMON_NAME, "CN"),
        (&OID_X509_ORGANIZATIONAL_UNIT, "OU"),
        (&OID_X509_ORGANIZATION_NAME, "O"),
        (&OID_X509_LOCALITY_NAME, "L"),
        (&OID_X509_STATE_OR_PROVINCE_NAME, "S"),
        (&OID_X509_COUNTRY_NAME, "C"),
        (&OID_PKCS9_EMAIL_ADDRESS, "E"),
    ];
    known
        .iter()
        .find(|(candidate, _)| *candidate == oid)
        .map_or_else(|| oid.to_id_string(), |(_, short)| (*short).to_owned())
}
