use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use deluge_http::{HttpRequest, HttpResponse};
use deluge_recording::HttpRecorder;
use deluge_value::{ObjectMap, Value};

use crate::executor::HttpExecutor;
use crate::script::ScriptError;

/// The `http(name, descriptor)` builtin bound to one scenario's recorder.
#[derive(Clone)]
pub(crate) struct HttpBuiltin {
    executor: Arc<dyn HttpExecutor>,
    recorder: Arc<HttpRecorder>,
}

impl HttpBuiltin {
    pub(crate) fn new(executor: Arc<dyn HttpExecutor>, recorder: Arc<HttpRecorder>) -> Self {
        Self { executor, recorder }
    }

    /// Performs the call and records its latency under `name`.
    ///
    /// Latency covers sending the request up to the response head. Calls that fail
    /// before a status code is known are returned as script errors and never recorded.
    pub(crate) async fn call(
        &self,
        iteration: u64,
        name: &str,
        descriptor: &Value,
    ) -> Result<Value, ScriptError> {
        let req = build_request(descriptor)?;
        tracing::debug!(request = name, method = %req.method, url = %req.url, "performing HTTP request");

        let started = Instant::now();
        let pending = self.executor.send(req).await.map_err(|err| {
            tracing::debug!(request = name, error = %err, "HTTP request failed");
            ScriptError::new(err.to_string())
        })?;
        let elapsed = started.elapsed();
        tracing::debug!(request = name, status = pending.status, ?elapsed, "HTTP response");

        if let Err(err) = self
            .recorder
            .add_http_record(iteration, name, elapsed, pending.status)
        {
            tracing::error!(request = name, error = %err, "failed to record HTTP call");
        }

        let res = pending
            .into_response()
            .await
            .map_err(|err| ScriptError::new(err.to_string()))?;
        Ok(response_object(res))
    }
}

fn invalid_request(detail: impl std::fmt::Display) -> ScriptError {
    ScriptError::new(format!("invalid HTTP request: {detail}"))
}

fn wrong_type(key: &str, expected: &str, got: &Value) -> ScriptError {
    invalid_request(format_args!(
        "'{key}' should be of type {expected} but was {}",
        got.type_name()
    ))
}

/// Turns a request descriptor `{ url, method?, body?, headers? }` into a request.
pub(crate) fn build_request(descriptor: &Value) -> Result<HttpRequest, ScriptError> {
    let Some(fields) = descriptor.as_object() else {
        return Err(invalid_request(format_args!(
            "descriptor should be of type OBJECT but was {}",
            descriptor.type_name()
        )));
    };

    let url = match fields.get("url") {
        None | Some(Value::Null) => return Err(invalid_request("missing 'url' field")),
        Some(Value::String(url)) => url.to_string(),
        Some(other) => return Err(wrong_type("url", "STRING", other)),
    };

    let method = match fields.get("method") {
        None | Some(Value::Null) => http::Method::GET,
        Some(Value::String(m)) => http::Method::from_bytes(m.as_bytes())
            .map_err(|_| invalid_request(format_args!("invalid method '{m}'")))?,
        Some(other) => return Err(wrong_type("method", "STRING", other)),
    };

    let mut req = HttpRequest::new(method, url);

    match fields.get("body") {
        None | Some(Value::Null) => {}
        Some(Value::String(body)) => req.body = Bytes::copy_from_slice(body.as_bytes()),
        Some(Value::Bytes(body)) => req.body = body.clone(),
        Some(other) => return Err(wrong_type("body", "STRING", other)),
    }

    match fields.get("headers") {
        None | Some(Value::Null) => {}
        Some(Value::Object(headers)) => {
            for (name, value) in headers {
                let Value::String(value) = value else {
                    return Err(ScriptError::new(format!(
                        "invalid HTTP header '{name}': should be of type STRING but was {}",
                        value.type_name()
                    )));
                };
                req.headers.push((name.to_string(), value.to_string()));
            }
        }
        Some(other) => return Err(wrong_type("headers", "OBJECT", other)),
    }

    Ok(req)
}

/// Immutable `{ status, headers, body }` object handed back to the script.
fn response_object(res: HttpResponse) -> Value {
    let headers: ObjectMap = res
        .headers
        .into_iter()
        .map(|(k, v)| (Arc::<str>::from(k), Value::from(v)))
        .collect();

    let body = match std::str::from_utf8(&res.body) {
        Ok(text) => Value::from(text),
        Err(_) => Value::Bytes(res.body),
    };

    Value::object([
        ("status", Value::I64(i64::from(res.status))),
        ("headers", Value::Object(headers)),
        ("body", body),
    ])
}
