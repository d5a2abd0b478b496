use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use hyper::header::{self, HeaderValue};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;

use crate::error::SnapError;
use crate::process::{MetricsProvider, ProcessRecord, build_forest};

/// Response envelope for `GET /processdetails`. The list is always an
/// array, `[]` when the snapshot is empty.
#[derive(Debug, Serialize)]
pub struct ProcessDetails {
    #[serde(rename = "ProcessList")]
    pub process_list: Vec<ProcessRecord>,
}

/// Serve the process-tree endpoint until the process is killed.
///
/// The provider is shared across requests behind a mutex: sysinfo keeps
/// per-process CPU state between refreshes, which is what turns
/// `cpu_percent` into a since-last-sample figure.
pub async fn serve<P>(addr: SocketAddr, provider: P) -> Result<(), SnapError>
where
    P: MetricsProvider + Send + 'static,
{
    let provider = Arc::new(Mutex::new(provider));

    let make_svc = make_service_fn(move |_conn| {
        let provider = provider.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let provider = provider.clone();
                async move { Ok::<_, Infallible>(route(req, &provider)) }
            }))
        }
    });

    log::info!("Listening on http://{}", addr);
    Server::try_bind(&addr)?.serve(make_svc).await?;
    Ok(())
}

fn route<P: MetricsProvider>(req: Request<Body>, provider: &Mutex<P>) -> Response<Body> {
    log::debug!("{} {}", req.method(), req.uri().path());
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/processdetails") => process_details(provider),
        _ => not_found(),
    }
}

/// Build the snapshot and wrap it in the envelope. Enumeration failure is
/// logged and served as an empty list with status 200; the response is
/// never blocked on provider errors.
fn process_details<P: MetricsProvider>(provider: &Mutex<P>) -> Response<Body> {
    let samples = {
        let mut guard = match provider.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.sample().unwrap_or_else(|e| {
            log::warn!("{}", e);
            Vec::new()
        })
    };

    let forest = build_forest(&samples);
    respond_json(&ProcessDetails {
        process_list: forest,
    })
}

/// Encoding failure is the one path that produces a non-200 response.
fn respond_json<T: Serialize>(payload: &T) -> Response<Body> {
    match serde_json::to_vec(payload) {
        Ok(body) => {
            let mut response = Response::new(Body::from(body));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            with_cors(&mut response);
            response
        }
        Err(e) => {
            let e = SnapError::Serialization(e);
            log::warn!("{}", e);
            let mut response = Response::new(Body::from(e.to_string()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            with_cors(&mut response);
            response
        }
    }
}

/// POST/PUT are accepted at the transport layer but no route handles them;
/// they fall through here, as does any unknown path.
fn not_found() -> Response<Body> {
    let mut response = Response::new(Body::from("no matching route"));
    *response.status_mut() = StatusCode::NOT_FOUND;
    with_cors(&mut response);
    response
}

fn with_cors(response: &mut Response<Body>) {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, HEAD"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcSample;
    use serde_json::{Value, json};

    struct FixedProvider(Vec<ProcSample>);
    impl MetricsProvider for FixedProvider {
        fn sample(&mut self) -> Result<Vec<ProcSample>, SnapError> {
            Ok(self.0.clone())
        }
    }

    struct FailingProvider;
    impl MetricsProvider for FailingProvider {
        fn sample(&mut self) -> Result<Vec<ProcSample>, SnapError> {
            Err(SnapError::Provider("enumeration refused".into()))
        }
    }

    fn request(method: Method, path: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response<Body>) -> Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn serves_published_field_names() {
        let provider = Mutex::new(FixedProvider(vec![
            ProcSample {
                pid: 1,
                ppid: None,
                name: "init".into(),
                memory_percent: 2.5,
                cpu_percent: 1.5,
            },
            ProcSample {
                pid: 7,
                ppid: Some(1),
                name: "worker".into(),
                memory_percent: 0.5,
                cpu_percent: 0.25,
            },
        ]));

        let response = route(request(Method::GET, "/processdetails"), &provider);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );

        let body = body_json(response).await;
        assert_eq!(
            body,
            json!({
                "ProcessList": [{
                    "ProcessName": "init",
                    "Pid": 1,
                    "Ppid": 0,
                    "MemoryPercent": 2.5,
                    "CpuPercent": 1.5,
                    "ChildProcess": [{
                        "ProcessName": "worker",
                        "Pid": 7,
                        "Ppid": 1,
                        "MemoryPercent": 0.5,
                        "CpuPercent": 0.25,
                        "ChildProcess": null,
                    }],
                }],
            })
        );
    }

    #[tokio::test]
    async fn empty_snapshot_serves_empty_array() {
        let provider = Mutex::new(FixedProvider(Vec::new()));
        let response = route(request(Method::GET, "/processdetails"), &provider);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "ProcessList": [] }));
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_empty_list() {
        let provider = Mutex::new(FailingProvider);
        let response = route(request(Method::GET, "/processdetails"), &provider);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "ProcessList": [] }));
    }

    #[tokio::test]
    async fn encoding_failure_serves_500_with_error_text() {
        // serde_json refuses maps whose keys are not strings
        let mut bad_payload = std::collections::BTreeMap::new();
        bad_payload.insert(vec![0u8], 0u32);

        let response = respond_json(&bad_payload);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.contains("key must be a string"), "body: {body}");
    }

    #[test]
    fn unrouted_methods_and_paths_fall_through_to_404() {
        let provider = Mutex::new(FixedProvider(Vec::new()));

        let response = route(request(Method::POST, "/processdetails"), &provider);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = route(request(Method::GET, "/nope"), &provider);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn cors_headers_on_every_response() {
        let provider = Mutex::new(FixedProvider(Vec::new()));

        for response in [
            route(request(Method::GET, "/processdetails"), &provider),
            route(request(Method::GET, "/nope"), &provider),
        ] {
            assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
            assert_eq!(
                response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
                "GET, POST, PUT, HEAD"
            );
        }
    }
}
