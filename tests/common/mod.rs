#![allow(dead_code)]

use fitsocial::{chat::ChatProxy, db::Db};
use rocket::{
    figment::Figment,
    http::{Header, Status},
    local::asynchronous::{Client, LocalResponse},
    serde::json::{json, Value},
};
use rocket_db_pools::Database;
use tempfile::TempDir;

pub struct TestApp {
    pub client: Client,
    _dir: TempDir,
}

fn fitbot() -> ChatProxy {
    ChatProxy::mock(|_, question| Ok(format!("FitBot says: {question}")))
}

pub async fn spawn() -> TestApp {
    spawn_with(fitbot(), |figment| figment).await
}

pub async fn spawn_with_chat(chat: ChatProxy) -> TestApp {
    spawn_with(chat, |figment| figment).await
}

/// Spawns the app with extra settings merged over the test defaults.
pub async fn spawn_configured(configure: impl FnOnce(Figment) -> Figment) -> TestApp {
    spawn_with(fitbot(), configure).await
}

async fn spawn_with(chat: ChatProxy, configure: impl FnOnce(Figment) -> Figment) -> TestApp {
    let dir = tempfile::tempdir().expect("temporary directory");
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("fitsocial.db").display()
    );
    let static_dir = dir.path().join("dist").display().to_string();
    let figment = rocket::Config::figment()
        .merge(("databases.fitsocial.url", url))
        .merge(("jwt_secret", "test-secret"))
        .merge(("static_dir", static_dir))
        .merge(("log_level", "off"));

    let client = Client::tracked(fitsocial::app(configure(figment)).manage(chat))
        .await
        .expect("valid rocket instance");
    TestApp { client, _dir: dir }
}

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {token}"))
}

pub struct Account {
    pub token: String,
    pub id: String,
}

impl TestApp {
    pub async fn register(&self, username: &str) -> Account {
        let response = self
            .client
            .post("/api/register")
            .json(&json!({ "username": username, "name": username, "password": "hunter2" }))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let body: Value = response.into_json().await.expect("session body");
        Account {
            token: body["token"].as_str().expect("token").to_string(),
            id: body["user"]["_id"].as_str().expect("user id").to_string(),
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> LocalResponse<'_> {
        let mut request = self.client.get(uri.to_string());
        if let Some(token) = token {
            request = request.header(bearer(token));
        }
        request.dispatch().await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> LocalResponse<'_> {
        let mut request = self.client.post(uri.to_string()).json(&body);
        if let Some(token) = token {
            request = request.header(bearer(token));
        }
        request.dispatch().await
    }

    pub async fn get_json(&self, uri: &str, token: Option<&str>) -> Value {
        let response = self.get(uri, token).await;
        assert_eq!(response.status(), Status::Ok, "GET {uri}");
        response.into_json().await.expect("json body")
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: Value) -> Value {
        let response = self.post(uri, token, body).await;
        assert_eq!(response.status(), Status::Ok, "POST {uri}");
        response.into_json().await.expect("json body")
    }

    /// Creates a draft workout owned by `account` and returns its id.
    pub async fn create_workout(&self, account: &Account) -> String {
        let workout = self
            .post_json(
                "/api/workout/create",
                Some(&account.token),
                json!({ "current": true }),
            )
            .await;
        workout["_id"].as_str().expect("workout id").to_string()
    }

    pub async fn create_exercise(&self, account: &Account, workout: &str) -> String {
        let exercise = self
            .post_json(
                "/api/exercise/create",
                Some(&account.token),
                json!({ "workoutId": workout }),
            )
            .await;
        exercise["_id"].as_str().expect("exercise id").to_string()
    }

    pub async fn count(&self, table: &str) -> i64 {
        let db = Db::fetch(self.client.rocket()).expect("database attached");
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&**db)
            .await
            .expect("row count")
    }
}
