use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// 一次出站 HTTP 请求
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
}

/// `http` 节点使用的客户端；响应体作为节点结果
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<Value>;
}

#[cfg(feature = "http-client")]
pub use self::reqwest_client::ReqwestHttpClient;

#[cfg(feature = "http-client")]
mod reqwest_client {
    use super::*;

    use crate::error::FlowEngineError;

    #[derive(Clone)]
    pub struct ReqwestHttpClient {
        client: reqwest::Client,
    }

    impl ReqwestHttpClient {
        pub fn new() -> Result<Self> {
            let client = reqwest::Client::builder()
                .pool_max_idle_per_host(10)
                .pool_idle_timeout(Duration::from_secs(90))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| FlowEngineError::HttpCall(e.to_string()))?;
            Ok(Self { client })
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl HttpClient for ReqwestHttpClient {
        async fn send(&self, request: HttpRequest) -> Result<Value> {
            let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
                .map_err(|e| FlowEngineError::HttpCall(e.to_string()))?;
            let mut builder = self.client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| FlowEngineError::HttpCall(e.to_string()))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| FlowEngineError::HttpCall(e.to_string()))?;
            if !status.is_success() {
                return Err(FlowEngineError::HttpCall(format!(
                    "status {status}: {text}"
                )));
            }
            Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        }
    }
}
