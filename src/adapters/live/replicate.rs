//! Live adapter for the Replicate prediction API.

use std::time::{Duration, Instant};

use futures_util::TryStreamExt;
use reqwest::{Client, Response};
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::ports::model_backend::{Delivery, Invocation, ModelBackend, RawOutput, RunFuture};

/// Longest error body kept in messages.
const MAX_ERROR_BODY: usize = 500;

/// Live backend that creates Replicate predictions and waits for them.
pub struct ReplicateBackend {
    client: Client,
    api_key: String,
    api_base: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl ReplicateBackend {
    /// Create a new backend with the given API token and base URL.
    #[must_use]
    pub fn new(api_key: String, api_base: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base,
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(600),
        }
    }

    /// Override the polling cadence.
    #[must_use]
    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    /// Endpoint and body that create a prediction for `invocation`.
    ///
    /// `owner/name:version` targets a pinned version; `owner/name` targets
    /// the model's latest deployment.
    fn prediction_request(&self, invocation: &Invocation) -> (String, Value) {
        match invocation.model.split_once(':') {
            Some((_, version)) => (
                format!("{}/predictions", self.api_base),
                json!({ "version": version, "input": invocation.input }),
            ),
            None => (
                format!("{}/models/{}/predictions", self.api_base, invocation.model),
                json!({ "input": invocation.input }),
            ),
        }
    }

    /// Parse a JSON response, turning HTTP failures into backend errors.
    async fn json_or_error(&self, response: Response) -> Result<Value, GatewayError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Backend {
                status: status.as_u16(),
                message: self.redact(truncate(&body, MAX_ERROR_BODY)),
            });
        }
        serde_json::from_str(&body).map_err(|e| GatewayError::Backend {
            status: 200,
            message: format!("Failed to parse response: {e}"),
        })
    }

    /// Poll until the prediction reaches a terminal status.
    async fn settle(&self, mut prediction: Value) -> Result<Value, GatewayError> {
        let started = Instant::now();
        loop {
            match status_of(&prediction).as_str() {
                "succeeded" => return Ok(prediction),
                "failed" | "canceled" => {
                    let reason = prediction
                        .get("error")
                        .filter(|e| !e.is_null())
                        .map_or_else(|| "no reason given".to_string(), value_text);
                    return Err(GatewayError::Backend {
                        status: 200,
                        message: self.redact(format!(
                            "prediction {} {}: {reason}",
                            id_of(&prediction),
                            status_of(&prediction)
                        )),
                    });
                }
                _ => {}
            }

            if started.elapsed() >= self.poll_timeout {
                return Err(GatewayError::Backend {
                    status: 0,
                    message: format!(
                        "prediction {} timed out after {}s",
                        id_of(&prediction),
                        self.poll_timeout.as_secs()
                    ),
                });
            }

            let poll_url = prediction
                .pointer("/urls/get")
                .and_then(Value::as_str)
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| GatewayError::Backend {
                    status: 200,
                    message: format!("prediction {} has no poll URL", id_of(&prediction)),
                })?
                .to_string();

            tokio::time::sleep(self.poll_interval).await;
            tracing::debug!(prediction = %id_of(&prediction), "polling prediction");
            let response = self.client.get(&poll_url).bearer_auth(&self.api_key).send().await?;
            prediction = self.json_or_error(response).await?;
        }
    }

    /// Open a byte stream over a hosted file output.
    async fn stream_file(&self, url: &str) -> Result<RawOutput, GatewayError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Backend {
                status: status.as_u16(),
                message: format!("file download failed: {}", truncate(&body, MAX_ERROR_BODY)),
            });
        }
        let stream = response.bytes_stream().map_err(GatewayError::Network);
        Ok(RawOutput::Stream(Box::pin(stream)))
    }

    /// Strip the API token from text that may reach callers.
    fn redact(&self, message: String) -> String {
        if self.api_key.is_empty() {
            message
        } else {
            message.replace(&self.api_key, "[redacted]")
        }
    }
}

impl ModelBackend for ReplicateBackend {
    fn run(&self, invocation: &Invocation) -> RunFuture<'_> {
        let invocation = invocation.clone();
        Box::pin(async move {
            let (endpoint, body) = self.prediction_request(&invocation);
            tracing::debug!(model = %invocation.model, %endpoint, "creating prediction");

            let response = self
                .client
                .post(&endpoint)
                .bearer_auth(&self.api_key)
                .header("Prefer", "wait")
                .json(&body)
                .send()
                .await?;
            let prediction = self.json_or_error(response).await?;
            let mut prediction = self.settle(prediction).await?;
            tracing::debug!(prediction = %id_of(&prediction), "prediction succeeded");

            let output = prediction.get_mut("output").map(Value::take).unwrap_or(Value::Null);
            if invocation.delivery == Delivery::Stream {
                if let Some(url) = file_url(&output) {
                    return self.stream_file(url).await;
                }
            }
            Ok(RawOutput::Value(output))
        })
    }
}

fn status_of(prediction: &Value) -> String {
    prediction.get("status").and_then(Value::as_str).unwrap_or_default().to_ascii_lowercase()
}

fn id_of(prediction: &Value) -> &str {
    prediction.get("id").and_then(Value::as_str).unwrap_or("<unknown>")
}

fn value_text(value: &Value) -> String {
    value.as_str().map_or_else(|| value.to_string(), str::to_string)
}

/// The hosted URL of a file output to stream.
///
/// Stream delivery serves single-output operations, so of several files only
/// the first is downloaded.
fn file_url(output: &Value) -> Option<&str> {
    let url = match output {
        Value::String(s) => s.as_str(),
        Value::Array(items) => {
            if items.len() > 1 {
                tracing::debug!(files = items.len(), "streaming the first of several output files");
            }
            items.first()?.as_str()?
        }
        _ => return None,
    };
    (url.starts_with("https://") || url.starts_with("http://")).then_some(url)
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
