//! Reverse-proxy header trust for a single fronting proxy.
//!
//! The last hop of each `X-Forwarded-*` header is taken as the value set by the
//! proxy; the peer socket address is used when no forwarded address is present.

use std::net::{IpAddr, SocketAddr};
use std::task::{Context, Poll};

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, header};
use tower::{Layer, Service};
use tracing::debug;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Client address, scheme, and host as seen in front of the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Originating client address.
    pub ip: Option<IpAddr>,
    /// Scheme the client used (`http` or `https`).
    pub scheme: String,
    /// Host the client addressed.
    pub host: Option<String>,
}

/// Layer that installs [`ProxyFix`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyFixLayer;

impl ProxyFixLayer {
    /// Create the layer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for ProxyFixLayer {
    type Service = ProxyFix<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ProxyFix { inner }
    }
}

/// Service that records [`ClientInfo`] and rewrites `Host` from forwarded headers.
#[derive(Debug, Clone)]
pub struct ProxyFix<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for ProxyFix<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        apply_forwarded(&mut req);
        self.inner.call(req)
    }
}

fn apply_forwarded<B>(req: &mut Request<B>) {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let headers = req.headers();

    let ip = last_hop(headers, &X_FORWARDED_FOR)
        .and_then(parse_hop)
        .or(peer);
    let scheme = last_hop(headers, &X_FORWARDED_PROTO)
        .map(str::to_ascii_lowercase)
        .or_else(|| req.uri().scheme_str().map(ToString::to_string))
        .unwrap_or_else(|| "http".to_string());
    let forwarded_host = last_hop(headers, &X_FORWARDED_HOST).map(ToString::to_string);
    let host = forwarded_host.clone().or_else(|| {
        headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string)
    });

    if let Some(forwarded_host) = forwarded_host {
        match HeaderValue::from_str(&forwarded_host) {
            Ok(value) => {
                req.headers_mut().insert(header::HOST, value);
            }
            Err(_) => debug!(host = %forwarded_host, "ignoring invalid forwarded host"),
        }
    }
    req.extensions_mut().insert(ClientInfo { ip, scheme, host });
}

/// Accepts `1.2.3.4`, `1.2.3.4:5678`, `::1`, `[::1]` and `[::1]:5678`.
fn parse_hop(value: &str) -> Option<IpAddr> {
    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
        .or_else(|| {
            value
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .and_then(|inner| inner.parse::<IpAddr>().ok())
        })
}

fn last_hop<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::ServiceExt;

    async fn client_info(req: Request<()>) -> anyhow::Result<(ClientInfo, Option<String>)> {
        let service = ProxyFixLayer::new().layer(tower::service_fn(|req: Request<()>| async move {
            let info = req.extensions().get::<ClientInfo>().cloned();
            let host = req
                .headers()
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
                .map(ToString::to_string);
            Ok::<_, Infallible>((info, host))
        }));
        let (info, host) = service.oneshot(req).await?;
        let info = info.ok_or_else(|| anyhow::anyhow!("client info missing"))?;
        Ok((info, host))
    }

    #[tokio::test]
    async fn forwarded_headers_override_peer() -> anyhow::Result<()> {
        let mut req = Request::builder()
            .uri("/")
            .header(header::HOST, "internal:8080")
            .header("x-forwarded-for", "203.0.113.9, 198.51.100.7")
            .header("x-forwarded-proto", "HTTPS")
            .header("x-forwarded-host", "shop.example.com")
            .body(())?;
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 2], 41000))));

        let (info, host) = client_info(req).await?;
        assert_eq!(info.ip, Some(IpAddr::from([198, 51, 100, 7])));
        assert_eq!(info.scheme, "https");
        assert_eq!(info.host.as_deref(), Some("shop.example.com"));
        assert_eq!(host.as_deref(), Some("shop.example.com"));
        Ok(())
    }

    #[tokio::test]
    async fn peer_address_used_without_headers() -> anyhow::Result<()> {
        let mut req = Request::builder()
            .uri("/")
            .header(header::HOST, "localhost:5000")
            .body(())?;
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 50000))));

        let (info, host) = client_info(req).await?;
        assert_eq!(info.ip, Some(IpAddr::from([127, 0, 0, 1])));
        assert_eq!(info.scheme, "http");
        assert_eq!(info.host.as_deref(), Some("localhost:5000"));
        assert_eq!(host.as_deref(), Some("localhost:5000"));
        Ok(())
    }

    #[test]
    fn hops_with_ports_or_brackets_parse() {
        let v4 = IpAddr::from([203, 0, 113, 9]);
        let v6 = IpAddr::from([0x2001, 0xdb8, 0, 0, 0, 0, 0, 1]);
        assert_eq!(parse_hop("203.0.113.9"), Some(v4));
        assert_eq!(parse_hop("203.0.113.9:5678"), Some(v4));
        assert_eq!(parse_hop("2001:db8::1"), Some(v6));
        assert_eq!(parse_hop("[2001:db8::1]"), Some(v6));
        assert_eq!(parse_hop("[2001:db8::1]:443"), Some(v6));
        assert!(parse_hop("unknown").is_none());
    }

    #[tokio::test]
    async fn forwarded_hop_with_port_beats_peer() -> anyhow::Result<()> {
        let mut req = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "198.51.100.7:5678")
            .body(())?;
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 2], 41000))));

        let (info, _host) = client_info(req).await?;
        assert_eq!(info.ip, Some(IpAddr::from([198, 51, 100, 7])));
        Ok(())
    }
}
