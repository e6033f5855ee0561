//! Management credential selection over a mocked certificate store.

use std::sync::Arc;

use mockall::mock;
use nuhost_config::{ConfigurationHub, keys};
use rstest::{fixture, rstest};
use time::{Duration, OffsetDateTime};

use super::support::{VALID_AT, at, settings};
use crate::certificates::{
    CertificateHub, CertificateStore, InstalledCertificate, StoreError, StoreLocation,
};
use crate::clock::FixedClock;
use crate::credentials::{CredentialError, CredentialHub};

mock! {
    pub Store {}
    impl CertificateStore for Store {
        fn certificates(
            &self,
            location: StoreLocation,
        ) -> Result<Vec<InstalledCertificate>, StoreError>;
    }
}

const MANAGEMENT_SUBJECT: &str =
    "CN=mgmt, OU=Foo[abc], OU=azure-management, OU=dev, OU=nuget-services";

fn now() -> OffsetDateTime {
    at(VALID_AT)
}

fn certificate(thumbprint: &str, subject: &str) -> InstalledCertificate {
    InstalledCertificate::new(
        thumbprint,
        subject,
        now() - Duration::days(1),
        now() + Duration::days(365),
        vec![0_u8; 4],
    )
}

fn expired(thumbprint: &str, subject: &str) -> InstalledCertificate {
    InstalledCertificate::new(
        thumbprint,
        subject,
        now() - Duration::days(30),
        now() - Duration::days(1),
        vec![0_u8; 4],
    )
}

fn store_with(
    local_machine: Vec<InstalledCertificate>,
    current_user: Vec<InstalledCertificate>,
) -> MockStore {
    let mut store = MockStore::new();
    store
        .expect_certificates()
        .returning(move |location| match location {
            StoreLocation::LocalMachine => Ok(local_machine.clone()),
            StoreLocation::CurrentUser => Ok(current_user.clone()),
        });
    store
}

fn hub(store: MockStore, pairs: &[(&str, &str)]) -> CredentialHub {
    let config = ConfigurationHub::new(Arc::new(settings(pairs)));
    let certificates = CertificateHub::new(
        Arc::new(store),
        config,
        Arc::new(FixedClock::new(now())),
    );
    CredentialHub::new(Arc::new(certificates))
}

#[fixture]
fn management() -> InstalledCertificate {
    certificate("AA01", MANAGEMENT_SUBJECT)
}

#[rstest]
fn reads_subscription_from_target(management: InstalledCertificate) {
    let hub = hub(store_with(vec![management], Vec::new()), &[]);
    let credentials = hub
        .get_credentials(true)
        .expect("credentials resolve")
        .expect("credentials present");
    assert_eq!(credentials.subscription_name(), "Foo");
    assert_eq!(credentials.subscription_id(), "abc");
    assert_eq!(credentials.certificate().thumbprint(), "AA01");
    assert_eq!(credentials.certificate().environment(), Some("dev"));
}

#[rstest]
fn missing_certificate_is_optional_unless_required() {
    let hub = hub(store_with(Vec::new(), Vec::new()), &[]);
    assert!(hub.get_credentials(false).expect("lookup succeeds").is_none());
    assert!(matches!(
        hub.get_credentials(true),
        Err(CredentialError::MissingCertificate)
    ));
}

#[rstest]
fn configured_thumbprint_beats_purpose_match(management: InstalledCertificate) {
    let pinned = certificate(
        "BB02",
        "CN=other, OU=Bar[xyz], OU=azure-management, OU=prod, OU=nuget-services",
    );
    let hub = hub(
        store_with(vec![management, pinned], Vec::new()),
        &[(keys::MANAGEMENT_CERTIFICATE_THUMBPRINT, "bb 02")],
    );
    let credentials = hub
        .get_credentials(true)
        .expect("credentials resolve")
        .expect("credentials present");
    assert_eq!(credentials.subscription_id(), "xyz");
    assert_eq!(credentials.certificate().thumbprint(), "BB02");
}

#[rstest]
fn configured_thumbprint_is_searched_in_every_location(management: InstalledCertificate) {
    let pinned = certificate(
        "CC03",
        "CN=user, OU=Baz[u1], OU=azure-management, OU=dev, OU=nuget-services",
    );
    let hub = hub(
        store_with(Vec::new(), vec![management, pinned]),
        &[(keys::MANAGEMENT_CERTIFICATE_THUMBPRINT, "CC03")],
    );
    let credentials = hub
        .get_credentials(true)
        .expect("credentials resolve")
        .expect("credentials present");
    assert_eq!(credentials.subscription_name(), "Baz");
}

#[rstest]
fn first_purpose_match_is_selected_repeatably(management: InstalledCertificate) {
    let second = certificate(
        "DD04",
        "CN=second, OU=Second[two], OU=azure-management, OU=dev, OU=nuget-services",
    );
    let hub = hub(store_with(vec![management, second], Vec::new()), &[]);
    for _ in 0..3 {
        let credentials = hub
            .get_credentials(true)
            .expect("credentials resolve")
            .expect("credentials present");
        assert_eq!(credentials.subscription_id(), "abc");
    }
}

#[rstest]
fn local_machine_is_searched_before_current_user(management: InstalledCertificate) {
    let user = certificate(
        "EE05",
        "CN=user, OU=User[u], OU=azure-management, OU=dev, OU=nuget-services",
    );
    let hub = hub(store_with(vec![management], vec![user]), &[]);
    let credentials = hub
        .get_credentials(true)
        .expect("credentials resolve")
        .expect("credentials present");
    assert_eq!(credentials.subscription_id(), "abc");
}

#[rstest]
fn falls_back_to_current_user() {
    let user = certificate(
        "EE05",
        "CN=user, OU=User[u], OU=azure-management, OU=dev, OU=nuget-services",
    );
    let hub = hub(store_with(Vec::new(), vec![user]), &[]);
    let credentials = hub
        .get_credentials(true)
        .expect("credentials resolve")
        .expect("credentials present");
    assert_eq!(credentials.subscription_name(), "User");
}

#[rstest]
fn expired_and_unrelated_certificates_are_ignored() {
    let hub = hub(
        store_with(
            vec![
                expired("FF06", MANAGEMENT_SUBJECT),
                certificate(
                    "FF07",
                    "CN=ca, OU=Foo[abc], OU=ca, OU=dev, OU=nuget-services",
                ),
                certificate("FF08", "CN=example.org"),
            ],
            Vec::new(),
        ),
        &[],
    );
    assert!(hub.get_credentials(false).expect("lookup succeeds").is_none());
}

#[rstest]
#[case("CN=m, OU=azure-management, OU=dev, OU=nuget-services", true)]
#[case("CN=m, OU=NoBrackets, OU=azure-management, OU=dev, OU=nuget-services", false)]
fn unusable_targets_are_configuration_errors(#[case] subject: &str, #[case] missing: bool) {
    let hub = hub(store_with(vec![certificate("AB12", subject)], Vec::new()), &[]);
    let error = hub.get_credentials(false).expect_err("target must be rejected");
    if missing {
        assert!(matches!(error, CredentialError::MissingSubscription { .. }));
    } else {
        assert!(matches!(
            error,
            CredentialError::InvalidTarget { ref target, .. } if target == "NoBrackets"
        ));
    }
}

#[rstest]
fn store_failures_name_the_location() {
    let mut store = MockStore::new();
    store.expect_certificates().returning(|_| {
        Err(StoreError::Parse {
            path: "broken.pem".into(),
            message: "truncated".to_owned(),
        })
    });
    let hub = hub(store, &[]);
    let error = hub.get_credentials(true).expect_err("store error surfaces");
    assert!(matches!(
        error,
        CredentialError::Store {
            location: StoreLocation::LocalMachine,
            ..
        }
    ));
    assert!(error.to_string().contains("LocalMachine"));
}
