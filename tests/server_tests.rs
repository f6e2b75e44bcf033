use std::fs;
use std::path::Path;

use clap::Parser;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::time::{Duration, sleep};

use bucketedit::cli::Cli;
use bucketedit::server::Server;

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    listener.local_addr().expect("local addr").port()
}

fn write_credential(dir: &Path) {
    fs::create_dir_all(dir).expect("Failed to create credentials dir");
    fs::write(
        dir.join("admin.json"),
        r#"{"login": "admin", "salt": "pepper", "hash": "ca458f67a1e64e60f40414c062c57abbfc1d41b5d0c30cd07d12704540067f21"}"#,
    )
    .expect("Failed to write credential");
}

async fn start_server(args: &[&str]) -> (tokio::task::JoinHandle<()>, u16) {
    let port = free_port().await;
    let port_arg = port.to_string();
    let mut argv = vec!["bucketedit", "--port", port_arg.as_str()];
    argv.extend_from_slice(args);
    let server = Server::new(Cli::parse_from(argv));

    let handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            eprintln!("Server error: {e}");
        }
    });
    sleep(Duration::from_millis(100)).await;
    (handle, port)
}

#[tokio::test]
async fn test_memory_backend_with_pinned_bucket() {
    let config = TempDir::new().expect("Failed to create temp directory");
    let credentials = config.path().join("credentials");
    write_credential(&credentials);
    let credentials = credentials.to_string_lossy().to_string();

    let (handle, port) = start_server(&[
        "--backend",
        "memory",
        "--bucket",
        "scratch",
        "--base-path",
        "/edit",
        "--credentials-dir",
        &credentials,
    ])
    .await;
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("client");

    let response = client
        .post(format!("http://127.0.0.1:{port}/edit?o=s&b=ignored&f=todo.txt"))
        .basic_auth("admin", Some("hunter2"))
        .multipart(reqwest::multipart::Form::new().text("c", "- write tests\n"))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), reqwest::StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some("/edit/?o=l&b=scratch")
    );

    let listing = client
        .get(format!("http://127.0.0.1:{port}/edit/?o=l"))
        .basic_auth("admin", Some("hunter2"))
        .send()
        .await
        .expect("Failed to send request")
        .text()
        .await
        .expect("body");
    assert!(listing.contains("todo.txt [14 B]"));

    let outside = client
        .get(format!("http://127.0.0.1:{port}/"))
        .basic_auth("admin", Some("hunter2"))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(outside.status(), reqwest::StatusCode::NOT_FOUND);

    handle.abort();
}

#[tokio::test]
async fn test_disable_auth_serves_without_credentials() {
    let root = TempDir::new().expect("Failed to create temp directory");
    fs::create_dir_all(root.path().join("public")).expect("bucket dir");
    let root_dir = root.path().to_string_lossy().to_string();
    let missing = root.path().join("no-credentials");
    let missing = missing.to_string_lossy().to_string();

    let (handle, port) = start_server(&[
        "--root-dir",
        &root_dir,
        "--credentials-dir",
        &missing,
        "--disable-auth",
    ])
    .await;

    let body = reqwest::get(format!("http://127.0.0.1:{port}/"))
        .await
        .expect("Failed to send request")
        .text()
        .await
        .expect("body");
    assert!(body.contains("<option value=\"public\">public</option>"));

    handle.abort();
}
