//! Authenticated HTTP session

use super::headers::browser_headers;
use super::transport::{
    HttpMethod, HttpRequest, HttpResponse, RequestBody, StreamingResponse, Transport,
};
use crate::config::{OutgoingSettings, SessionSettings};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::cookie::Jar;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

fn timeout(name: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::Validation(format!("invalid {} {}: {}", name, secs, e)))
}

/// HTTP session shared by every call: cookie jar, browser headers and
/// connection pool
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a session authenticated with `session.token`
    pub fn with_settings(session: &SessionSettings, settings: &OutgoingSettings) -> Result<Self> {
        let token = session
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Validation("session token must not be empty".to_string()))?;

        let base_url = session.base_url();
        let origin = Url::parse(base_url)
            .map_err(|e| Error::Validation(format!("invalid base URL {}: {}", base_url, e)))?;

        // Set-Cookie values from priming land in the same jar
        let cookies = Arc::new(Jar::default());
        cookies.add_cookie_str(&format!("{}={}", session.cookie_name, token), &origin);

        let mut builder = Client::builder()
            .cookie_provider(cookies)
            .default_headers(browser_headers(
                base_url,
                settings.user_agent.as_deref(),
                &settings.extra_headers,
            ))
            .timeout(timeout("request_timeout", settings.request_timeout)?)
            .connect_timeout(timeout("connect_timeout", settings.connect_timeout)?)
            .pool_max_idle_per_host(settings.pool_maxsize)
            .gzip(true)
            .brotli(true);

        // SSL verification
        if !settings.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        // Proxy settings
        if let Some(ref proxy_url) = settings.proxies.all {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        } else {
            if let Some(ref http) = settings.proxies.http {
                builder = builder.proxy(reqwest::Proxy::http(http)?);
            }
            if let Some(ref https) = settings.proxies.https {
                builder = builder.proxy(reqwest::Proxy::https(https)?);
            }
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    fn prepare(&self, request: HttpRequest) -> Result<RequestBuilder> {
        let mut req_builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        for (key, value) in &request.headers {
            req_builder = req_builder.header(key, value);
        }

        if !request.params.is_empty() {
            req_builder = req_builder.query(&request.params);
        }

        if let Some(body) = request.data {
            req_builder = match body {
                RequestBody::Json(json) => req_builder.json(&json),
                RequestBody::Multipart(form) => {
                    let mut multipart = Form::new();
                    for (key, value) in form.fields {
                        multipart = multipart.text(key, value);
                    }
                    let part = Part::bytes(form.content)
                        .file_name(form.file_name)
                        .mime_str(&form.content_type)?;
                    req_builder.multipart(multipart.part(form.file_field, part))
                }
            };
        }

        Ok(req_builder)
    }

    /// Parse response into HttpResponse
    async fn parse_response(response: Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let text = response.text().await?;

        Ok(HttpResponse { status, text, url })
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!("{:?} {}", request.method, request.url);
        let response = self.prepare(request)?.send().await?;
        Self::parse_response(response).await
    }

    async fn open_stream(&self, request: HttpRequest) -> Result<StreamingResponse> {
        debug!("{:?} {} (streaming)", request.method, request.url);
        let response = self.prepare(request)?.send().await?;

        Ok(StreamingResponse {
            status: response.status().as_u16(),
            url: response.url().to_string(),
            body: response
                .bytes_stream()
                .map_ok(|chunk| chunk.to_vec())
                .map_err(Error::from)
                .boxed(),
        })
    }
}
