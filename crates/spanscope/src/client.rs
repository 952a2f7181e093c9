use anyhow::Context;
use futures::Stream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use spanscope_core::model::notification::NotificationEvent;
use spanscope_core::query::ErrorBody;

/// Talks to a running `spanscope serve` over its HTTP API.
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    pub fn new(addr: &str) -> anyhow::Result<Self> {
        let base = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", addr.trim_end_matches('/'))
        };
        let http = reqwest::Client::builder()
            .build()
            .context("build http client")?;
        Ok(Self { http, base })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .with_context(|| format!("request {path} from {}", self.base))?;
        decode(path, response).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<T> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("request {path} from {}", self.base))?;
        decode(path, response).await
    }

    pub async fn get_text(&self, path: &str) -> anyhow::Result<String> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("request {path} from {}", self.base))?;
        let response = check(path, response).await?;
        response.text().await.context("read response body")
    }

    /// Follows the server-sent notification feed until the server closes it.
    pub async fn notification_events(
        &self,
    ) -> anyhow::Result<impl Stream<Item = anyhow::Result<NotificationEvent>>> {
        let path = "/api/notifications/stream";
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .context("open notification stream")?;
        let mut response = check(path, response).await?;

        Ok(async_stream::try_stream! {
            let mut buffer = String::new();
            while let Some(chunk) = response.chunk().await.context("read notification stream")? {
                let text = std::str::from_utf8(&chunk)
                    .context("notification stream contained invalid utf8")?;
                buffer.push_str(text);

                while let Some(frame_end) = buffer.find("\n\n") {
                    let frame: String = buffer.drain(..frame_end + 2).collect();
                    for line in frame.lines() {
                        if let Some(data) = line.strip_prefix("data:") {
                            let event: NotificationEvent = serde_json::from_str(data.trim())
                                .context("decode notification event")?;
                            yield event;
                        }
                    }
                }
            }
        })
    }
}

async fn check(path: &str, response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    anyhow::bail!("{path} failed with status {status}: {message}")
}

async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> anyhow::Result<T> {
    let response = check(path, response).await?;
    response
        .json::<T>()
        .await
        .with_context(|| format!("decode response from {path}"))
}
