//! Shared HTTP/JSON transport for the REST-speaking engines
//!
//! Each collaborator owns its own [`HttpEngine`]; building one parses the
//! host and connection params and configures a `reqwest::Client`, but sends
//! nothing.

use crate::params::{parse_params, ParamRole, Params};
use crate::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: f64 = 90.0;

/// Connection parameters understood by every HTTP engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HttpConnectionParams {
    /// Request timeout in seconds
    pub timeout: f64,
    /// API key, sent the way the engine expects it
    pub api_key: Option<String>,
    /// Basic-auth user
    pub user: Option<String>,
    /// Basic-auth password
    pub password: Option<String>,
    /// Port override
    pub port: Option<u16>,
    /// `http` or `https`
    pub scheme: String,
    /// Engine-specific keys not interpreted here
    #[serde(flatten)]
    pub extra: Params,
}

impl Default for HttpConnectionParams {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_SECS,
            api_key: None,
            user: None,
            password: None,
            port: None,
            scheme: "http".to_string(),
            extra: Params::new(),
        }
    }
}

/// How an engine expects its API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApiKeyStyle {
    /// `api-key: <key>` (qdrant)
    Header,
    /// `Authorization: ApiKey <key>` (elastic)
    ApiKey,
    /// `Authorization: Bearer <key>` (weaviate, milvus)
    Bearer,
}

/// Resolve a benchmark host into a base URL.
///
/// Accepts `name`, `name:port` or a full `http(s)://` URL; `default_port`
/// applies when neither the host nor the params name one.
pub(crate) fn base_url(
    host: &str,
    default_port: u16,
    params: &HttpConnectionParams,
) -> Result<Url> {
    let raw = if host.contains("://") {
        host.to_string()
    } else {
        format!("{}://{host}", params.scheme)
    };
    let mut url =
        Url::parse(&raw).map_err(|e| Error::Connection(format!("invalid host {host:?}: {e}")))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::Connection(format!("invalid host {host:?}: missing host name")));
    }
    let port = params.port.or_else(|| url.port()).unwrap_or(default_port);
    url.set_port(Some(port))
        .map_err(|()| Error::Connection(format!("invalid host {host:?}: cannot carry a port")))?;
    Ok(url)
}

/// A configured HTTP endpoint of one engine.
#[derive(Debug, Clone)]
pub(crate) struct HttpEngine {
    engine: &'static str,
    base: Url,
    client: reqwest::Client,
    basic_auth: Option<(String, Option<String>)>,
}

impl HttpEngine {
    /// Build the transport without contacting the engine.
    pub(crate) fn connect(
        engine: &'static str,
        host: &str,
        default_port: u16,
        connection_params: &Params,
        key_style: ApiKeyStyle,
    ) -> Result<Self> {
        let params: HttpConnectionParams =
            parse_params(engine, ParamRole::Connection, connection_params)?;
        if !(params.timeout.is_finite() && params.timeout > 0.0) {
            return Err(Error::InvalidParams {
                engine: engine.to_string(),
                role: ParamRole::Connection.as_str(),
                reason: format!("timeout must be positive, got {}", params.timeout),
            });
        }
        let timeout =
            Duration::try_from_secs_f64(params.timeout).map_err(|e| Error::InvalidParams {
                engine: engine.to_string(),
                role: ParamRole::Connection.as_str(),
                reason: format!("timeout {}: {e}", params.timeout),
            })?;
        let base = base_url(host, default_port, &params)?;

        let mut headers = HeaderMap::new();
        if let Some(key) = &params.api_key {
            let (name, value) = match key_style {
                ApiKeyStyle::Header => (HeaderName::from_static("api-key"), key.clone()),
                ApiKeyStyle::ApiKey => (AUTHORIZATION, format!("ApiKey {key}")),
                ApiKeyStyle::Bearer => (AUTHORIZATION, format!("Bearer {key}")),
            };
            let value = HeaderValue::from_str(&value).map_err(|e| Error::InvalidParams {
                engine: engine.to_string(),
                role: ParamRole::Connection.as_str(),
                reason: format!("api_key: {e}"),
            })?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        debug!(engine, %base, "http transport ready");
        Ok(Self {
            engine,
            base,
            client,
            basic_auth: params.user.map(|u| (u, params.password)),
        })
    }

    pub(crate) const fn engine(&self) -> &'static str {
        self.engine
    }

    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::Connection(format!("invalid path {path:?}: {e}")))
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let builder = self.client.request(method, self.url(path)?);
        Ok(match &self.basic_auth {
            Some((user, password)) => builder.basic_auth(user, password.as_ref()),
            None => builder,
        })
    }

    /// Send a JSON request; non-2xx answers become [`Error::Backend`].
    pub(crate) async fn json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        self.send(method, path, body, false)
            .await
            .map(Option::unwrap_or_default)
    }

    /// Like [`Self::json`] but a 404 yields `None`.
    pub(crate) async fn json_allow_missing(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        self.send(method, path, body, true).await
    }

    /// Send a newline-delimited JSON body (bulk APIs).
    pub(crate) async fn ndjson(&self, path: &str, body: String) -> Result<Value> {
        let request = self
            .request(Method::POST, path)?
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        self.finish(request, path, false)
            .await
            .map(Option::unwrap_or_default)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        allow_missing: bool,
    ) -> Result<Option<Value>> {
        trace!(engine = self.engine, %method, path, "request");
        let mut request = self.request(method, path)?;
        if let Some(body) = body {
            request = request.json(body);
        }
        self.finish(request, path, allow_missing).await
    }

    async fn finish(
        &self,
        request: reqwest::RequestBuilder,
        path: &str,
        allow_missing: bool,
    ) -> Result<Option<Value>> {
        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                Error::Connection(format!("{}: {path}: {e}", self.engine))
            } else {
                Error::Http(e)
            }
        })?;
        let status = response.status();
        if allow_missing && status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Backend {
                engine: self.engine.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Some(Value::Null));
        }
        Ok(Some(serde_json::from_str(&text)?))
    }
}

/// Read a JSON number as a point id.
pub(crate) fn id_from_value(engine: &str, value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| Error::Backend {
        engine: engine.to_string(),
        status: 0,
        body: format!("unexpected point id {value}"),
    })
}

/// Interval between readiness polls while waiting on the engine; must be non-zero.
pub(crate) fn poll_interval(engine: &str, millis: u64) -> Result<Duration> {
    if millis == 0 {
        return Err(Error::InvalidParams {
            engine: engine.to_string(),
            role: ParamRole::Upload.as_str(),
            reason: "poll_interval_ms must be positive".to_string(),
        });
    }
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::params_from;
    use serde_json::json;

    #[test]
    fn test_base_url_bare_host_gets_default_port() {
        let url = base_url("localhost", 6333, &HttpConnectionParams::default()).unwrap();
        assert_eq!(url.as_str(), "http://localhost:6333/");
    }

    #[test]
    fn test_base_url_keeps_explicit_port() {
        let url = base_url("db.internal:7000", 6333, &HttpConnectionParams::default()).unwrap();
        assert_eq!(url.port(), Some(7000));
    }

    #[test]
    fn test_base_url_param_port_wins() {
        let params = HttpConnectionParams {
            port: Some(9999),
            ..HttpConnectionParams::default()
        };
        let url = base_url("https://es.example.com", 9200, &params).unwrap();
        assert_eq!(url.as_str(), "https://es.example.com:9999/");
    }

    #[test]
    fn test_connect_rejects_bad_timeout() {
        let err = HttpEngine::connect(
            "qdrant",
            "localhost",
            6333,
            &params_from(json!({"timeout": -1})),
            ApiKeyStyle::Header,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParams { role: "connection", .. }));
    }

    #[test]
    fn test_connect_rejects_unrepresentable_timeout() {
        let err = HttpEngine::connect(
            "qdrant",
            "localhost",
            6333,
            &params_from(json!({"timeout": 1e20})),
            ApiKeyStyle::Header,
        )
        .unwrap_err();
        match err {
            Error::InvalidParams { engine, role, reason } => {
                assert_eq!(engine, "qdrant");
                assert_eq!(role, "connection");
                assert!(reason.starts_with("timeout"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_connect_rejects_malformed_params() {
        let err = HttpEngine::connect(
            "elastic",
            "localhost",
            9200,
            &params_from(json!({"timeout": "soon"})),
            ApiKeyStyle::ApiKey,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParams { .. }));
    }

    #[test]
    fn test_url_join() {
        let engine =
            HttpEngine::connect("qdrant", "localhost", 6333, &Params::new(), ApiKeyStyle::Header)
                .unwrap();
        assert_eq!(
            engine.url("collections/benchmark").unwrap().as_str(),
            "http://localhost:6333/collections/benchmark"
        );
    }

    #[test]
    fn test_poll_interval_rejects_zero() {
        assert_eq!(poll_interval("qdrant", 250).unwrap(), Duration::from_millis(250));
        assert!(matches!(
            poll_interval("qdrant", 0),
            Err(Error::InvalidParams { role: "upload", .. })
        ));
    }

    #[test]
    fn test_id_from_value() {
        assert_eq!(id_from_value("x", &json!(7)).unwrap(), 7);
        assert_eq!(id_from_value("x", &json!("8")).unwrap(), 8);
        assert!(id_from_value("x", &json!(null)).is_err());
    }
}
