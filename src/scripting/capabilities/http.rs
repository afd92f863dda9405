// src/scripting/capabilities/http.rs — `http::*` functions (blocking client, bounded timeout)
//
// Every call returns `[result, error]`: `[response, ()]` on success and
// `[(), "message"]` on any transport or decode failure. Malformed requests
// (bad method, missing url) are caller errors and raise instead.

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use rhai::{Array, Dynamic, ImmutableString, Map, Module, INT};

use super::{caller_error, CapResult, CapabilityContext};
use crate::infra::files;
use crate::scripting::marshal::{self, as_string, classify, kind_of, Shape};

/// Settings shared by every request an engine makes.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            user_agent: format!("totalcontrol/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub status: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Present when the response declared `Content-Type: application/json`.
    pub json: Option<serde_json::Value>,
}

impl HttpResponse {
    fn into_dynamic(self) -> Dynamic {
        let mut headers = Map::new();
        for (name, value) in self.headers {
            headers.insert(name.into(), Dynamic::from(value));
        }

        let mut map = Map::new();
        map.insert("status_code".into(), Dynamic::from(self.status_code as INT));
        map.insert("status".into(), Dynamic::from(self.status));
        map.insert("headers".into(), Dynamic::from_map(headers));
        map.insert("body".into(), Dynamic::from(self.body));
        map.insert(
            "json".into(),
            self.json
                .as_ref()
                .map(marshal::json_to_dynamic)
                .unwrap_or(Dynamic::UNIT),
        );
        Dynamic::from_map(map)
    }
}

/// Parse a method name. Only the verbs scripts are allowed to use are accepted.
pub fn parse_method(name: &str) -> Result<Method, String> {
    match name.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        "PATCH" => Ok(Method::PATCH),
        "HEAD" => Ok(Method::HEAD),
        "OPTIONS" => Ok(Method::OPTIONS),
        other => Err(format!("unsupported HTTP method '{other}'")),
    }
}

/// Build a request from a URL string or a `#{ url, method, headers, body }` map.
///
/// `forced` overrides any method named in the map.
pub fn parse_request(value: &Dynamic, forced: Option<Method>) -> Result<HttpRequest, String> {
    if let Some(url) = as_string(value) {
        return Ok(HttpRequest {
            method: forced.unwrap_or(Method::GET),
            url,
            headers: Vec::new(),
            body: None,
        });
    }

    let map = match classify(value) {
        Shape::Record(map) => map,
        _ => {
            return Err(format!(
                "expected a url string or a request map, got {}",
                kind_of(value)
            ))
        }
    };

    let url = map
        .get("url")
        .and_then(as_string)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| "request is missing 'url'".to_string())?;

    let method = match forced {
        Some(method) => method,
        None => match map.get("method") {
            None => Method::GET,
            Some(m) if m.is_unit() => Method::GET,
            Some(m) => {
                let name = as_string(m)
                    .ok_or_else(|| format!("'method' must be a string, got {}", kind_of(m)))?;
                parse_method(&name)?
            }
        },
    };

    let mut headers = Vec::new();
    if let Some(raw) = map.get("headers").filter(|h| !h.is_unit()) {
        let header_map = classify(raw)
            .into_record()
            .map_err(|e| format!("'headers' must be a map: {e}"))?;
        for (name, value) in &header_map {
            let value = match marshal::to_host(value) {
                Some(serde_json::Value::String(s)) => s,
                Some(serde_json::Value::Null) => continue,
                Some(other) => other.to_string(),
                None => {
                    return Err(format!(
                        "header '{name}' must be a scalar, got {}",
                        kind_of(value)
                    ))
                }
            };
            headers.push((name.to_string(), value));
        }
    }

    let body = match map.get("body") {
        None => None,
        Some(b) if b.is_unit() => None,
        Some(b) => Some(encode_body(b, &mut headers)?),
    };

    Ok(HttpRequest {
        method,
        url,
        headers,
        body,
    })
}

/// Strings are sent as-is. Maps and arrays are sent as JSON.
fn encode_body(body: &Dynamic, headers: &mut Vec<(String, String)>) -> Result<String, String> {
    if let Some(text) = as_string(body) {
        return Ok(text);
    }
    let json = match classify(body) {
        Shape::Record(map) => serde_json::Value::Object(marshal::record_to_host(&map)?),
        Shape::List(items) => serde_json::Value::Array(marshal::list_to_host(&items)?),
        Shape::Invalid { .. } => match marshal::to_host(body) {
            Some(scalar) => return Ok(scalar.to_string()),
            None => return Err(format!("unsupported body type '{}'", kind_of(body))),
        },
    };
    if !headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
    {
        headers.push(("Content-Type".into(), "application/json".into()));
    }
    serde_json::to_string(&json).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Per-engine HTTP client, built on first use.
pub struct HttpCapability {
    settings: HttpSettings,
    client: OnceLock<Client>,
}

impl HttpCapability {
    pub fn new(settings: HttpSettings) -> Self {
        Self {
            settings,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&Client, String> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .timeout(self.settings.timeout)
            .user_agent(self.settings.user_agent.clone())
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(self.client.get_or_init(|| client))
    }

    fn describe(&self, err: reqwest::Error) -> String {
        if err.is_timeout() {
            format!("request timed out after {:?}", self.settings.timeout)
        } else {
            err.to_string()
        }
    }

    /// Perform one request. A JSON content type that fails to decode fails the call.
    pub fn execute(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let client = self.client()?;
        let method = request.method.clone();
        let mut builder = client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            if method != Method::GET {
                builder = builder.body(body);
            }
        }

        tracing::debug!(method = %method, url = %request.url, "Script HTTP request");
        let response = builder.send().map_err(|e| self.describe(e))?;

        let status = response.status();
        let headers = collect_headers(response.headers());
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().map_err(|e| self.describe(e))?;

        let json = if content_type.as_deref() == Some("application/json") {
            let decoded = serde_json::from_str(&body)
                .map_err(|e| format!("failed to decode JSON response: {e}"))?;
            Some(decoded)
        } else {
            None
        };

        Ok(HttpResponse {
            status_code: status.as_u16(),
            status: status.to_string(),
            headers,
            body,
            json,
        })
    }

    /// Download `url` into `destination`. Nothing is written unless the
    /// directory exists and the server answered 200 with a complete body.
    pub fn download(&self, url: &str, destination: &Path) -> Result<(), String> {
        let directory = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !directory.is_dir() {
            return Err(format!(
                "destination directory does not exist: {}",
                directory.display()
            ));
        }

        let client = self.client()?;
        tracing::debug!(url, destination = %destination.display(), "Script download");
        let response = client.get(url).send().map_err(|e| self.describe(e))?;
        if response.status() != StatusCode::OK {
            return Err(format!("download failed with status {}", response.status()));
        }
        let bytes = response.bytes().map_err(|e| self.describe(e))?;

        files::write_atomic(destination, &bytes)
            .map_err(|e| format!("failed to write {}: {e}", destination.display()))
    }
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    let mut collected = Vec::new();
    for name in headers.keys() {
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        collected.push((name.as_str().to_string(), values.join(", ")));
    }
    collected
}

fn pair(result: Result<Dynamic, String>) -> Array {
    match result {
        Ok(value) => vec![value, Dynamic::UNIT],
        Err(message) => vec![Dynamic::UNIT, Dynamic::from(message)],
    }
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

pub fn module(ctx: &CapabilityContext) -> Module {
    let http = Arc::new(HttpCapability::new(ctx.http.clone()));
    let mut module = Module::new();

    let client = http.clone();
    module.set_native_fn("get", move |request: Dynamic| -> CapResult<Array> {
        let request =
            parse_request(&request, Some(Method::GET)).map_err(|e| caller_error("http::get", e))?;
        Ok(pair(client.execute(request).map(HttpResponse::into_dynamic)))
    });

    let client = http.clone();
    module.set_native_fn("post", move |request: Dynamic| -> CapResult<Array> {
        let request = parse_request(&request, Some(Method::POST))
            .map_err(|e| caller_error("http::post", e))?;
        Ok(pair(client.execute(request).map(HttpResponse::into_dynamic)))
    });

    let client = http.clone();
    module.set_native_fn("request", move |request: Dynamic| -> CapResult<Array> {
        let request =
            parse_request(&request, None).map_err(|e| caller_error("http::request", e))?;
        Ok(pair(client.execute(request).map(HttpResponse::into_dynamic)))
    });

    let client = http;
    module.set_native_fn(
        "download_file",
        move |url: ImmutableString, destination: ImmutableString| -> CapResult<Array> {
            if url.is_empty() {
                return Err(caller_error("http::download_file", "url cannot be empty"));
            }
            let result = client
                .download(&url, Path::new(destination.as_str()))
                .map(|()| Dynamic::from(true));
            Ok(match result {
                Ok(done) => vec![done, Dynamic::UNIT],
                Err(message) => {
                    tracing::debug!(url = %url, "Script download failed: {}", message);
                    vec![Dynamic::from(false), Dynamic::from(message)]
                }
            })
        },
    );

    module
}
