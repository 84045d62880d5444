use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::Uri;
use http::header::HeaderValue;
use hyper::rt::{Read as HyperRead, ReadBufCursor, Write as HyperWrite};
use hyper_util::client::legacy::connect::proxy::Tunnel;
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use percent_encoding::percent_decode_str;
use tower_service::Service;
use url::Url;

use crate::error::Error;

pub(crate) type BoxConnectError = Box<dyn StdError + Send + Sync>;

fn invalid_proxy(proxy: &str, message: impl Into<String>) -> Error {
    Error::InvalidProxy {
        proxy: proxy.to_owned(),
        message: message.into(),
    }
}

/// Parses a forward-proxy address.
///
/// Rejects empty input, anything [`Url`] cannot parse, schemes other than
/// `http`/`https`, and URLs without a host.
pub fn validate_proxy(proxy: &str) -> crate::Result<Url> {
    if proxy.is_empty() {
        return Err(invalid_proxy(proxy, "proxy string is empty"));
    }
    let url = Url::parse(proxy).map_err(|error| invalid_proxy(proxy, error.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid_proxy(
            proxy,
            format!("unsupported proxy scheme {}", url.scheme()),
        ));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid_proxy(proxy, "proxy url has no host"));
    }
    Ok(url)
}

#[derive(Clone, Debug)]
pub(crate) struct ProxyConfig {
    pub(crate) uri: Uri,
    pub(crate) authorization: Option<HeaderValue>,
}

impl ProxyConfig {
    /// Splits userinfo off the proxy url into a basic `Proxy-Authorization`
    /// value; the remaining url becomes the connect target.
    pub(crate) fn from_url(proxy: &Url) -> crate::Result<Self> {
        let raw = proxy.as_str();
        let authorization = if proxy.username().is_empty() && proxy.password().is_none() {
            None
        } else {
            let username = percent_decode_str(proxy.username()).decode_utf8_lossy();
            let password = proxy
                .password()
                .map(|password| percent_decode_str(password).decode_utf8_lossy())
                .unwrap_or_default();
            let encoded = STANDARD.encode(format!("{username}:{password}"));
            let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))
                .map_err(|error| invalid_proxy(raw, error.to_string()))?;
            value.set_sensitive(true);
            Some(value)
        };

        let host = proxy
            .host_str()
            .ok_or_else(|| invalid_proxy(raw, "proxy url has no host"))?;
        let port = proxy
            .port_or_known_default()
            .ok_or_else(|| invalid_proxy(raw, "proxy url has no port"))?;
        let authority = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        let uri = format!("{}://{authority}", proxy.scheme())
            .parse::<Uri>()
            .map_err(|error| invalid_proxy(raw, error.to_string()))?;

        Ok(Self { uri, authorization })
    }

    /// Header the origin request itself must carry. Only plain-http targets
    /// talk to the proxy in absolute-form; https targets authenticate on the
    /// `CONNECT` instead.
    pub(crate) fn forward_authorization(&self, target: &Uri) -> Option<&HeaderValue> {
        if is_https(target) {
            return None;
        }
        self.authorization.as_ref()
    }
}

type TcpIo = <HttpConnector as Service<Uri>>::Response;
type Connecting = Pin<Box<dyn Future<Output = Result<ProxyStream, BoxConnectError>> + Send>>;

/// TCP stream that records whether its far end is a forward proxy. Hyper
/// reads that flag to send plain-http requests in absolute-form.
#[derive(Debug)]
pub(crate) struct ProxyStream {
    io: TcpIo,
    forward_proxy: bool,
}

impl HyperRead for ProxyStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl HyperWrite for ProxyStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

impl Connection for ProxyStream {
    fn connected(&self) -> Connected {
        self.io.connected().proxy(self.forward_proxy)
    }
}

#[derive(Clone)]
struct ForwardProxy {
    address: Uri,
    tunnel: Tunnel<HttpConnector>,
}

/// Dials the destination, or the configured proxy when there is one:
/// `https` destinations get a `CONNECT` tunnel, `http` destinations a plain
/// connection to the proxy that carries absolute-form requests.
#[derive(Clone)]
pub(crate) struct ProxyConnector {
    tcp: HttpConnector,
    proxy: Option<ForwardProxy>,
}

impl ProxyConnector {
    pub(crate) fn new(proxy_config: Option<ProxyConfig>, connect_timeout: Duration) -> Self {
        let mut tcp = HttpConnector::new();
        tcp.enforce_http(false);
        tcp.set_connect_timeout(Some(connect_timeout));
        let proxy = proxy_config.map(|config| {
            let tunnel = Tunnel::new(config.uri.clone(), tcp.clone());
            ForwardProxy {
                address: config.uri,
                tunnel: match config.authorization {
                    Some(authorization) => tunnel.with_auth(authorization),
                    None => tunnel,
                },
            }
        });
        Self { tcp, proxy }
    }
}

impl Service<Uri> for ProxyConnector {
    type Response = ProxyStream;
    type Error = BoxConnectError;
    type Future = Connecting;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // the tunnel dials through a clone of the same connector
        self.tcp.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let mut tcp = self.tcp.clone();
        let proxy = self.proxy.clone();
        Box::pin(async move {
            let Some(mut proxy) = proxy else {
                let io = tcp.call(dst).await?;
                return Ok(ProxyStream {
                    io,
                    forward_proxy: false,
                });
            };
            if is_https(&dst) {
                let io = proxy.tunnel.call(tunnel_target(dst)).await?;
                return Ok(ProxyStream {
                    io,
                    forward_proxy: false,
                });
            }
            let io = tcp.call(proxy.address).await?;
            Ok::<_, BoxConnectError>(ProxyStream {
                io,
                forward_proxy: true,
            })
        })
    }
}

fn is_https(uri: &Uri) -> bool {
    uri.scheme_str()
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https"))
}

/// `CONNECT` names an explicit port; https destinations default to 443.
fn tunnel_target(dst: Uri) -> Uri {
    if dst.port().is_some() {
        return dst;
    }
    let Some(host) = dst.host() else {
        return dst;
    };
    let authority = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:443")
    } else {
        format!("{host}:443")
    };
    let Ok(authority) = authority.parse() else {
        return dst;
    };
    let mut parts = dst.clone().into_parts();
    parts.authority = Some(authority);
    Uri::from_parts(parts).unwrap_or(dst)
}
