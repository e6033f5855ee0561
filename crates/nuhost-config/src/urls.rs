/// Derives bind URLs for a port.
///
/// Unless `local_only` is set, a wildcard URL (`http://+:<port>/<path>`) is
/// produced ahead of the loopback one.
#[must_use]
pub fn bind_urls(http_port: Option<u16>, base_path: &str, local_only: bool) -> Vec<String> {
    let Some(port) = http_port else {
        return Vec::new();
    };
    let path = base_path.trim_start_matches('/');
    let mut urls = Vec::with_capacity(2);
    if !local_only {
        urls.push(format!("http://+:{port}/{path}"));
    }
    urls.push(format!("http://localhost:{port}/{path}"));
    urls
}
