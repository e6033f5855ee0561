//! Listener lifecycle for the shared multiplexer.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::{Host, Url};

use super::{HTTP_TARGET, HttpError};
use crate::health::HostReporter;

const DEFAULT_PORT: u16 = 80;

/// A bound endpoint: socket address plus the path prefix the router sits under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoint {
    pub(crate) address: SocketAddr,
    pub(crate) path: String,
}

impl Endpoint {
    /// Parses a bind URL. `+` and `*` stand for every interface.
    pub(crate) fn parse(url: &str) -> Result<Self, HttpError> {
        let normalised = url.replace("://+", "://0.0.0.0").replace("://*", "://0.0.0.0");
        let parsed = Url::parse(&normalised).map_err(|source| HttpError::InvalidUrl {
            url: url.to_owned(),
            source,
        })?;
        if parsed.scheme() != "http" {
            return Err(HttpError::UnsupportedScheme {
                url: url.to_owned(),
                scheme: parsed.scheme().to_owned(),
            });
        }
        let ip = match parsed.host() {
            Some(Host::Ipv4(ip)) => IpAddr::V4(ip),
            Some(Host::Ipv6(ip)) => IpAddr::V6(ip),
            Some(Host::Domain(domain)) if domain.eq_ignore_ascii_case("localhost") => {
                IpAddr::V4(Ipv4Addr::LOCALHOST)
            }
            Some(Host::Domain(_)) | None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };
        let port = parsed.port().unwrap_or(DEFAULT_PORT);
        Ok(Self {
            address: SocketAddr::new(ip, port),
            path: parsed.path().trim_end_matches('/').to_owned(),
        })
    }
}

/// Serving tasks for every bound URL.
#[derive(Debug)]
pub(crate) struct HttpServer {
    addresses: Vec<SocketAddr>,
    stop: CancellationToken,
    tasks: Vec<JoinHandle<io::Result<()>>>,
}

impl HttpServer {
    /// Binds every URL before serving any of them, so a failure leaves nothing
    /// listening.
    pub(crate) async fn bind(
        urls: &[String],
        router: Router,
        shutdown: &CancellationToken,
        reporter: &dyn HostReporter,
    ) -> Result<Self, HttpError> {
        let mut listeners = Vec::with_capacity(urls.len());
        for url in urls {
            reporter.http_binding(url);
            let endpoint = Endpoint::parse(url)?;
            let listener = TcpListener::bind(endpoint.address)
                .await
                .map_err(|source| HttpError::Bind {
                    url: url.clone(),
                    source,
                })?;
            let address = listener.local_addr().map_err(|source| HttpError::Bind {
                url: url.clone(),
                source,
            })?;
            listeners.push((listener, address, endpoint.path));
        }

        let stop = shutdown.child_token();
        let mut addresses = Vec::with_capacity(listeners.len());
        let mut tasks = Vec::with_capacity(listeners.len());
        for (listener, address, path) in listeners {
            let app = if path.is_empty() {
                router.clone()
            } else {
                Router::new().nest(&path, router.clone())
            };
            let token = stop.clone();
            tasks.push(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { token.cancelled().await })
                    .await
            }));
            addresses.push(address);
        }
        Ok(Self {
            addresses,
            stop,
            tasks,
        })
    }

    pub(crate) fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }

    /// Stops accepting connections and waits for in-flight requests.
    pub(crate) async fn stop(self) {
        self.stop.cancel();
        for task in self.tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => tracing::warn!(
                    target: HTTP_TARGET,
                    event = "http_stop_failed",
                    error = %error,
                    "listener ended with an error"
                ),
                Err(error) => tracing::warn!(
                    target: HTTP_TARGET,
                    event = "http_stop_failed",
                    error = %error,
                    "listener task did not complete"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use rstest::rstest;

    use super::Endpoint;
    use crate::http::HttpError;

    #[rstest]
    #[case("http://localhost:8080/", "127.0.0.1:8080", "")]
    #[case("http://+:9000/api/", "0.0.0.0:9000", "/api")]
    #[case("http://*:0", "0.0.0.0:0", "")]
    #[case("http://127.0.0.1", "127.0.0.1:80", "")]
    fn parses_bind_urls(#[case] url: &str, #[case] address: &str, #[case] path: &str) {
        let endpoint = Endpoint::parse(url).expect("valid url");
        assert_eq!(endpoint.address, address.parse::<SocketAddr>().expect("addr"));
        assert_eq!(endpoint.path, path);
    }

    #[rstest]
    fn rejects_https() {
        let error = Endpoint::parse("https://localhost:443/").expect_err("https rejected");
        assert!(matches!(error, HttpError::UnsupportedScheme { ref scheme, .. } if scheme == "https"));
    }

    #[rstest]
    fn rejects_garbage() {
        assert!(matches!(
            Endpoint::parse("not a url"),
            Err(HttpError::InvalidUrl { .. })
        ));
    }

    #[rstest]
    fn localhost_maps_to_loopback() {
        let endpoint = Endpoint::parse("http://LOCALHOST:1/").expect("valid url");
        assert_eq!(endpoint.address.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}
