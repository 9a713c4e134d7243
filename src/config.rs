use std::path::PathBuf;

use rocket::serde::Deserialize;

/// Application settings read from the Rocket figment (`Rocket.toml` and
/// `ROCKET_*` environment variables).
#[derive(Debug, Clone, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct AppConfig {
    /// Key used for symmetric token signing. Release builds must set
    /// `ROCKET_JWT_SECRET`.
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    /// Directory holding the built single-page front end, mounted at `/`
    /// when it exists.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub image_host: ImageHostConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(crate = "rocket::serde", default)]
pub struct ChatConfig {
    /// Falls back to the `ANYSCALE_API_KEY` environment variable.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.endpoints.anyscale.com/v1/".to_string(),
            model: "meta-llama/Llama-2-13b-chat-hf".to_string(),
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(crate = "rocket::serde", default)]
pub struct ImageHostConfig {
    pub client_id: Option<String>,
    pub endpoint: String,
}

impl Default for ImageHostConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            endpoint: "https://api.imgur.com/3/image".to_string(),
        }
    }
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("dist")
}
