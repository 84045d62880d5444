use std::sync::{Arc, OnceLock};
use std::time::Duration;

use http::header::{CONTENT_TYPE, HeaderValue, PROXY_AUTHORIZATION};
use http::{HeaderMap, Method, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, debug, info_span, warn};
use url::Url;

use crate::body::{ReqBody, build_http_request};
use crate::config::{RequestConfig, is_allowed_method};
use crate::context::RequestContext;
use crate::error::Error;
use crate::proxy::{ProxyConfig, ProxyConnector, validate_proxy};
use crate::response::{CallBounds, RawResponse};
use crate::util::{classify_transport_error, redact_uri_for_logs};

type HttpsConnector = hyper_rustls::HttpsConnector<ProxyConnector>;
type TransportClient = Client<HttpsConnector, ReqBody>;

const JSON_CONTENT_TYPE: &str = "application/json";
const UNBOUNDED_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the request and hands back the unprocessed response.
///
/// Steps run in a fixed order and the first failure wins: body resolution,
/// throttle wait, endpoint parse, query injection, method check, request
/// construction, proxy validation, send. Status codes are not classified.
pub async fn request_raw(ctx: &RequestContext, config: RequestConfig) -> crate::Result<RawResponse> {
    let span = info_span!(
        "reqlet.request",
        method = %config.method(),
        uri = %redact_uri_for_logs(config.endpoint()),
    );
    execute(ctx, config).instrument(span).await
}

async fn execute(ctx: &RequestContext, config: RequestConfig) -> crate::Result<RawResponse> {
    let body = config.resolve_body()?;

    if let Some(throttle) = config.throttle() {
        debug!("waiting on throttle");
        throttle.wait(ctx).await?;
    }

    let mut url = parse_endpoint(config.endpoint())?;
    if let Some(query) = config.encoded_query() {
        url.set_query(Some(&query));
    }

    if !is_allowed_method(config.method()) {
        return Err(Error::InvalidMethod {
            method: config.method().to_owned(),
        });
    }
    let method = Method::from_bytes(config.method().as_bytes()).map_err(|_| {
        Error::InvalidMethod {
            method: config.method().to_owned(),
        }
    })?;
    let uri: Uri = url.as_str().parse().map_err(|error: http::uri::InvalidUri| {
        Error::InvalidEndpoint {
            endpoint: config.endpoint().to_owned(),
            message: error.to_string(),
        }
    })?;
    let redacted_uri = redact_uri_for_logs(url.as_str());

    let mut headers = HeaderMap::new();
    if body.is_present() && !config.headers().contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    }
    for (name, value) in config.headers() {
        headers.append(name.clone(), value.clone());
    }

    let mut request = build_http_request(method.clone(), uri, headers, body)?;

    let proxy_config = match config.proxy() {
        Some(proxy) => Some(ProxyConfig::from_url(&validate_proxy(proxy)?)?),
        None => None,
    };
    if let Some(authorization) = proxy_config
        .as_ref()
        .and_then(|proxy| proxy.forward_authorization(request.uri()))
        && !request.headers().contains_key(PROXY_AUTHORIZATION)
    {
        let authorization = authorization.clone();
        request
            .headers_mut()
            .insert(PROXY_AUTHORIZATION, authorization);
    }
    let proxied = proxy_config.is_some();
    let timeout = config.timeout();
    let transport = build_transport(proxy_config, timeout)?;

    let started_at = Instant::now();
    // zero or an unrepresentable timeout disables the per-request deadline;
    // the context still applies
    let deadline = if timeout.is_zero() {
        None
    } else {
        started_at.checked_add(timeout)
    };
    let send = async {
        match deadline {
            Some(deadline) => timeout_at(deadline, transport.request(request)).await.ok(),
            None => Some(transport.request(request).await),
        }
    };

    debug!(proxied, "sending request");
    let response = match ctx.run(send).await {
        Err(error) => {
            debug!(?error, "request aborted by context");
            return Err(error.into());
        }
        Ok(None) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "request timed out");
            return Err(Error::Timeout {
                timeout_ms: timeout.as_millis(),
                method,
                uri: redacted_uri,
            });
        }
        Ok(Some(Err(source))) => {
            let kind = classify_transport_error(&source, proxied);
            warn!(%kind, error = %source, "transport error");
            return Err(Error::Transport {
                kind,
                method,
                uri: redacted_uri,
                source: Box::new(source),
            });
        }
        Ok(Some(Ok(response))) => response,
    };

    debug!(
        status = response.status().as_u16(),
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "received response headers"
    );
    let (parts, incoming) = response.into_parts();
    Ok(RawResponse::new(
        parts,
        incoming,
        CallBounds {
            ctx: ctx.clone(),
            deadline,
            timeout,
            method,
            uri: redacted_uri,
            max_response_body_bytes: config.max_response_body_bytes(),
        },
    ))
}

fn parse_endpoint(endpoint: &str) -> crate::Result<Url> {
    let invalid = |message: String| Error::InvalidEndpoint {
        endpoint: endpoint.to_owned(),
        message,
    };
    let url = Url::parse(endpoint).map_err(|error| invalid(error.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_owned()));
    }
    Ok(url)
}

fn tls_config() -> crate::Result<rustls::ClientConfig> {
    static CONFIG: OnceLock<Arc<rustls::ClientConfig>> = OnceLock::new();
    if let Some(config) = CONFIG.get() {
        return Ok(config.as_ref().clone());
    }

    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|source| Error::TlsInit {
        message: source.to_string(),
    })?
    .with_root_certificates(root_store)
    .with_no_client_auth();
    Ok(CONFIG.get_or_init(|| Arc::new(config)).as_ref().clone())
}

/// One client per call; nothing is pooled across requests.
fn build_transport(
    proxy_config: Option<ProxyConfig>,
    connect_timeout: Duration,
) -> crate::Result<TransportClient> {
    let connect_timeout = if connect_timeout.is_zero() {
        UNBOUNDED_CONNECT_TIMEOUT
    } else {
        connect_timeout
    };
    let connector = ProxyConnector::new(proxy_config, connect_timeout);
    let https = HttpsConnectorBuilder::new()
        .with_tls_config(tls_config()?)
        .https_or_http()
        .enable_http1()
        .wrap_connector(connector);
    Ok(Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(0)
        .build(https))
}
