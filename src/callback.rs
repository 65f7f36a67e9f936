use serde_json::Value;

/// Receives the outcome of a server request.
///
/// Exactly one of `on_success` or `on_error` is delivered per request. `on_status` carries
/// informational messages (transient failures, cancellation) and may be called any number of
/// times before that.
///
/// Callbacks are invoked from the request worker thread, so implementations must be thread-safe
/// and should not block for long.
pub trait RequestCallback: Send + Sync {
    /// The request succeeded with the server's JSON `response`.
    fn on_success(&self, id: i32, response: Value);

    /// The request failed for good. `code` is the HTTP status, or `0` when no response applies.
    fn on_error(&self, id: i32, code: i32, message: &str);

    /// Informational progress, e.g. a failed attempt that will be retried. Ignored by default.
    fn on_status(&self, _id: i32, _code: i32, _message: &str) {}
}

/// A callback that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallback;

impl RequestCallback for NoopCallback {
    fn on_success(&self, _id: i32, _response: Value) {}

    fn on_error(&self, _id: i32, _code: i32, _message: &str) {}
}

/// Any `Fn(Result<Value, String>)` closure can be used as a callback. Errors are reported as
/// `"{code}: {message}"`.
impl<T> RequestCallback for T
where
    T: Fn(std::result::Result<Value, String>) + Send + Sync,
{
    fn on_success(&self, _id: i32, response: Value) {
        self(Ok(response));
    }

    fn on_error(&self, _id: i32, code: i32, message: &str) {
        self(Err(format!("{code}: {message}")));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::{json, Value};

    use super::RequestCallback;

    #[test]
    fn closures_are_callbacks() {
        let results = Mutex::new(Vec::new());
        let callback = |result: Result<Value, String>| results.lock().unwrap().push(result);

        callback.on_success(0, json!({"url": "https://bnc.lt/x"}));
        callback.on_status(0, 0, "ignored");
        callback.on_error(0, 404, "Not Found");

        assert_eq!(
            *results.lock().unwrap(),
            vec![
                Ok(json!({"url": "https://bnc.lt/x"})),
                Err("404: Not Found".to_owned())
            ]
        );
    }
}
