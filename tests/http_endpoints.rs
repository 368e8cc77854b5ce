/// HTTP status handling of the live client and downloader
///
/// Each test serves one canned response from a local listener and points
/// `EarthEngineClient` or the `reqwest` downloader at it, so the non-2xx
/// paths run without reaching Earth Engine.
///
/// Run with: cargo test --test http_endpoints

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use sentinel_series::ingest::earth_engine::EarthEngineClient;
use sentinel_series::ingest::expression::Expr;
use sentinel_series::ingest::{Download, ImageryService};
use sentinel_series::PipelineError;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Accept one connection, answer it with `status_line` and `body`, and hand
/// back the request as received (head and body).
fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);

        let mut request = String::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap();
                }
            }
            request.push_str(&line);
            if line == "\r\n" || line.is_empty() {
                break;
            }
        }
        let mut payload = vec![0u8; content_length];
        reader.read_exact(&mut payload).unwrap();
        request.push_str(&String::from_utf8_lossy(&payload));

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        let mut stream = reader.into_inner();
        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();
        request
    });

    (base, handle)
}

fn client(base: &str) -> EarthEngineClient {
    EarthEngineClient::new(reqwest::blocking::Client::new(), base, "p", "tok")
}

fn table() -> Expr {
    Expr::call("Collection.map", [("collection", Expr::argument("c"))])
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

#[test]
fn test_download_forbidden_is_status_error() {
    let (base, server) = serve_once("403 Forbidden", "");
    let http = reqwest::blocking::Client::new();

    let err = http.fetch(&format!("{}/v1/projects/p/tables/t1:getFeatures", base)).unwrap_err();

    assert!(matches!(err, PipelineError::HttpStatus(403)), "{}", err);
    let request = server.join().unwrap().to_ascii_lowercase();
    assert!(request.starts_with("get /v1/projects/p/tables/t1:getfeatures"));
}

#[test]
fn test_download_returns_body_bytes() {
    let (base, server) = serve_once("200 OK", "system:index,Date,.geo\n0,2024-01-05,{}\n");
    let http = reqwest::blocking::Client::new();

    let body = http.fetch(&format!("{}/table.csv", base)).unwrap();

    assert_eq!(body, b"system:index,Date,.geo\n0,2024-01-05,{}\n");
    server.join().unwrap();
}

// ---------------------------------------------------------------------------
// Table export
// ---------------------------------------------------------------------------

#[test]
fn test_export_error_envelope_is_remote_error() {
    let (base, server) = serve_once(
        "400 Bad Request",
        r#"{"error":{"code":400,"message":"Collection.load: ImageCollection asset 'X' not found.","status":"INVALID_ARGUMENT"}}"#,
    );

    let err = client(&base).export_csv(table()).unwrap_err();

    match err {
        PipelineError::Remote { status, message } => {
            assert_eq!(status, 400);
            assert!(message.starts_with("INVALID_ARGUMENT: Collection.load"), "{}", message);
        }
        other => panic!("unexpected {:?}", other),
    }
    server.join().unwrap();
}

#[test]
fn test_export_forbidden_without_body_is_status_error() {
    let (base, server) = serve_once("403 Forbidden", "");

    let err = client(&base).export_csv(table()).unwrap_err();

    assert!(matches!(err, PipelineError::HttpStatus(403)), "{}", err);
    server.join().unwrap();
}

#[test]
fn test_export_success_returns_download_url() {
    let (base, server) = serve_once("200 OK", r#"{"name":"projects/p/tables/t1"}"#);

    let url = client(&base).export_csv(table()).unwrap();

    assert_eq!(url, format!("{}/v1/projects/p/tables/t1:getFeatures", base));

    let request = server.join().unwrap();
    let lowered = request.to_ascii_lowercase();
    assert!(lowered.starts_with("post /v1/projects/p/tables "), "{}", request);
    assert!(lowered.contains("authorization: bearer tok"), "{}", request);
    assert!(request.contains(r#""fileFormat":"CSV""#), "{}", request);
    assert!(request.contains(r#""functionName":"Collection.map""#), "{}", request);
}
