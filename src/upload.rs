use log::{error, info};
use rocket::{
    fairing::AdHoc,
    http::Status,
    response::status::Custom,
    serde::{json::Json, Deserialize, Serialize},
    State,
};
use rocket_db_pools::Connection;
use thiserror::Error;

use crate::{
    auth::AuthenticatedUser,
    config::{AppConfig, ImageHostConfig},
    db::Db,
    user::User,
};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("no image host client id configured")]
    MissingClientId,

    #[error("image host request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("image host responded with status {0}")]
    Status(u16),

    #[error("image host rejected the upload")]
    Rejected,
}

/// Client for an Imgur-style anonymous image upload API.
pub struct ImageHost {
    client: reqwest::Client,
    config: ImageHostConfig,
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
struct UploadBody<'a> {
    image: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
struct UploadReply {
    success: bool,
    data: Option<UploadedImage>,
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
struct UploadedImage {
    link: String,
}

impl ImageHost {
    pub fn new(config: ImageHostConfig) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    /// Uploads a base64 encoded image and returns its public link.
    pub async fn upload(&self, image: &str) -> Result<String, UploadError> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or(UploadError::MissingClientId)?;

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Client-ID {client_id}"))
            .json(&UploadBody {
                image,
                kind: "base64",
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UploadError::Status(response.status().as_u16()));
        }

        let reply: UploadReply = response.json().await?;
        match reply.data {
            Some(image) if reply.success => Ok(image.link),
            _ => Err(UploadError::Rejected),
        }
    }
}

pub fn stage() -> AdHoc {
    AdHoc::try_on_ignite("Image host", |rocket| async {
        let config = match rocket.figment().extract::<AppConfig>() {
            Ok(config) => config.image_host,
            Err(e) => {
                error!("Invalid image host configuration: {}", e);
                return Err(rocket);
            }
        };
        match ImageHost::new(config) {
            Ok(host) => Ok(rocket.manage(host)),
            Err(e) => {
                error!("Failed to build image host client: {}", e);
                Err(rocket)
            }
        }
    })
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct ImageUpload {
    file: String,
}

const UPLOAD_FAILED: &str = "An error occurred";

fn failed<E: std::fmt::Display>(e: E) -> Custom<&'static str> {
    error!("Profile picture upload failed: {}", e);
    Custom(Status::InternalServerError, UPLOAD_FAILED)
}

/// Replaces the caller's profile picture with an uploaded image.
#[post("/image/upload", data = "<upload>")]
pub async fn upload(
    mut db: Connection<Db>,
    host: &State<ImageHost>,
    caller: AuthenticatedUser,
    upload: Json<ImageUpload>,
) -> Result<Json<User>, Custom<&'static str>> {
    let link = host.upload(&upload.file).await.map_err(failed)?;

    let mut user = User::find(&mut db, caller.id())
        .await
        .map_err(failed)?
        .ok_or_else(|| failed("caller has no user document"))?;
    user.profile_picture = link;
    user.save(&mut db).await.map_err(failed)?;

    info!("Updated profile picture of {}", user.id);
    Ok(Json(user))
}
