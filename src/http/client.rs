use std::time::{Duration, Instant};

use crate::Result;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::types::NetworkFailure;
use tracing::debug;

/// 进程内共享的 HTTP 客户端
///
/// 内部的 reqwest::Client 自带连接池，Clone 只增加引用计数，可被并发运行共享
#[derive(Clone)]
pub struct Client {
    inner: reqwest::Client,
    timeout: Duration,
}

impl Client {
    pub fn new(timeout: Duration) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self { inner, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 派发请求
    ///
    /// 耗时只覆盖网络往返（发送 + 读取 body）；非 2xx 不视为错误；不做重试
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let url = request.full_url();
        let mut req = self
            .inner
            .request(request.method.to_reqwest(), url.clone())
            .headers(request.headers);

        if let Some(body) = request.body {
            req = req.body(body.to_text()?);
        }

        debug!(method = %request.method, url = %url, "Dispatching request");

        let start = Instant::now();
        let response = req
            .send()
            .await
            .map_err(|e| NetworkFailure::classify(&e, self.timeout))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| NetworkFailure::classify(&e, self.timeout))?;
        let duration = start.elapsed();

        debug!(status, elapsed_ms = duration.as_millis() as u64, "Response received");

        Response::new(status, headers, body, duration)
    }
}
