use iam_catalog::{CatalogError, CatalogSource};
use std::io::Write;
use std::thread;
use tiny_http::{Response, Server};

const FEED: &str = r#"app.PolicyEditorConfig={"serviceMap":{"Amazon SQS":{"StringPrefix":"sqs","Actions":["SendMessage","ReceiveMessage"]}}}"#;

fn serve_once(status: u16, body: &'static str) -> (String, thread::JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let handle = thread::spawn(move || {
        if let Ok(request) = server.recv() {
            let response = Response::from_string(body).with_status_code(status);
            let _ = request.respond(response);
        }
    });
    (format!("http://{addr}/js/policies.js"), handle)
}

#[test]
fn source_parse_distinguishes_urls_and_paths() {
    assert_eq!(
        CatalogSource::parse(" https://example.com/policies.js "),
        CatalogSource::Url("https://example.com/policies.js".to_string())
    );
    assert!(matches!(
        CatalogSource::parse("fixtures/catalog.json"),
        CatalogSource::File(_)
    ));
}

#[tokio::test]
async fn loads_catalog_snapshot_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FEED.as_bytes()).unwrap();

    let source = CatalogSource::File(file.path().to_path_buf());
    let catalog = source.load(&reqwest::Client::new()).await.unwrap();

    assert!(catalog.contains("sqs", "SendMessage"));
    assert!(!catalog.contains("sqs", "DeleteQueue"));
}

#[tokio::test]
async fn fetches_catalog_over_http() {
    let (url, handle) = serve_once(200, FEED);

    let catalog = CatalogSource::Url(url)
        .load(&reqwest::Client::new())
        .await
        .unwrap();
    handle.join().unwrap();

    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.action_count(), 2);
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let (url, handle) = serve_once(503, "unavailable");

    let err = CatalogSource::Url(url)
        .load(&reqwest::Client::new())
        .await
        .unwrap_err();
    handle.join().unwrap();

    assert!(matches!(err, CatalogError::Status { status: 503, .. }));
}

#[tokio::test]
async fn empty_catalog_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{}").unwrap();

    let err = CatalogSource::File(file.path().to_path_buf())
        .load(&reqwest::Client::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Invalid(_)));
}
