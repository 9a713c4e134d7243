mod common;

use rocket::{
    http::Status,
    serde::json::json,
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        sync::mpsc,
    },
};

const LINK: &str = "https://i.imgur.com/uploaded.png";

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.expect("read request");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let length = text[..head_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Stand-in image host answering one connection per canned reply. Returns
/// its endpoint and the raw requests it received.
async fn image_host(replies: Vec<(&'static str, String)>) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind image host");
    let addr = listener.local_addr().expect("image host address");
    let (seen, requests) = mpsc::unbounded_channel();

    rocket::tokio::spawn(async move {
        for (status, body) in replies {
            let (mut socket, _) = listener.accept().await.expect("accept upload");
            let request = read_request(&mut socket).await;
            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.expect("write reply");
            let _ = socket.shutdown().await;
            let _ = seen.send(request);
        }
    });

    (format!("http://{addr}/3/image"), requests)
}

async fn spawn_against(endpoint: String) -> common::TestApp {
    common::spawn_configured(|figment| {
        figment
            .merge(("image_host.endpoint", endpoint))
            .merge(("image_host.client_id", "test-client"))
    })
    .await
}

#[rocket::async_test]
async fn uploaded_link_becomes_the_profile_picture() {
    let reply = json!({ "success": true, "data": { "link": LINK } }).to_string();
    let (endpoint, mut requests) = image_host(vec![("200 OK", reply)]).await;
    let app = spawn_against(endpoint).await;
    let ada = app.register("ada").await;

    let user = app
        .post_json(
            "/api/image/upload",
            Some(&ada.token),
            json!({ "file": "aGVsbG8=" }),
        )
        .await;
    assert_eq!(user["profile_picture"], json!(LINK));

    let me = app.get_json("/api/whoami", Some(&ada.token)).await;
    assert_eq!(me["profile_picture"], json!(LINK));

    let request = requests.recv().await.expect("upload request").to_lowercase();
    assert!(request.starts_with("post /3/image "));
    assert!(request.contains("authorization: client-id test-client"));
    assert!(request.contains(r#""image":"ahvsbg8=""#));
    assert!(request.contains(r#""type":"base64""#));
}

#[rocket::async_test]
async fn rejected_uploads_leave_the_profile_picture_alone() {
    let (endpoint, _requests) = image_host(vec![
        ("200 OK", json!({ "success": false }).to_string()),
        (
            "400 Bad Request",
            json!({ "success": false, "data": { "error": "bad image" } }).to_string(),
        ),
    ])
    .await;
    let app = spawn_against(endpoint).await;
    let ada = app.register("ada").await;

    for _ in 0..2 {
        let response = app
            .post(
                "/api/image/upload",
                Some(&ada.token),
                json!({ "file": "aGVsbG8=" }),
            )
            .await;
        assert_eq!(response.status(), Status::InternalServerError);
        assert_eq!(response.into_string().await.unwrap(), "An error occurred");
    }

    let me = app.get_json("/api/whoami", Some(&ada.token)).await;
    assert_eq!(
        me["profile_picture"],
        json!(fitsocial::user::DEFAULT_PROFILE_PICTURE)
    );
}

#[rocket::async_test]
async fn upload_without_a_client_id_fails_cleanly() {
    let app = common::spawn().await;
    let ada = app.register("ada").await;

    let response = app
        .post(
            "/api/image/upload",
            Some(&ada.token),
            json!({ "file": "aGVsbG8=" }),
        )
        .await;
    assert_eq!(response.status(), Status::InternalServerError);
    assert_eq!(response.into_string().await.unwrap(), "An error occurred");
    assert_eq!(app.count("users").await, 1);
}
