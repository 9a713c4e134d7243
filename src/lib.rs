//! Backend of a fitness-social workout log.
//!
//! Users log workouts made of exercises and sets, publish them to a feed,
//! follow each other, comment, like and star posts, and can ask FitBot (a
//! proxied chat model) for training advice. Everything is served as JSON
//! under `/api`; the built front end, when present, is served from `/`.

#[macro_use]
extern crate rocket;

pub mod auth;
pub mod chat;
pub mod comment;
pub mod config;
pub mod db;
pub mod error;
pub mod exercise;
pub mod ids;
pub mod reaction;
pub mod social;
pub mod upload;
pub mod user;
pub mod workout;

use log::{error, info, warn};
use rocket::{
    fairing::AdHoc,
    figment::Figment,
    fs::FileServer,
    http::Status,
    serde::json::{json, Json, Value},
    Build, Request, Rocket,
};
use rocket_cors::CorsOptions;

pub use error::{ApiError, Result};

use config::AppConfig;

#[catch(404)]
fn not_found(request: &Request) -> Json<Value> {
    info!("API route not found: {} {}", request.method(), request.uri());
    Json(json!({ "msg": "API route not found" }))
}

#[catch(default)]
fn api_error(status: Status, _request: &Request) -> Json<Value> {
    Json(json!({ "msg": status.reason_lossy() }))
}

fn static_files() -> AdHoc {
    AdHoc::on_ignite("Static files", |rocket| async {
        let dir = match rocket.state::<AppConfig>() {
            Some(config) => config.static_dir.clone(),
            None => return rocket,
        };
        if dir.is_dir() {
            info!("Serving front end from {}", dir.display());
            rocket.mount("/", FileServer::from(dir))
        } else {
            warn!("Static directory {} not found, serving the API only", dir.display());
            rocket
        }
    })
}

fn cors() -> AdHoc {
    AdHoc::try_on_ignite("CORS", |rocket| async {
        match CorsOptions::default().to_cors() {
            Ok(cors) => Ok(rocket.attach(cors)),
            Err(e) => {
                error!("Invalid CORS options: {}", e);
                Err(rocket)
            }
        }
    })
}

/// The application without a chat backend; callers manage a
/// [`chat::ChatProxy`] themselves.
pub fn app(figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .attach(AdHoc::config::<AppConfig>())
        .attach(db::stage())
        .attach(upload::stage())
        .attach(cors())
        .attach(static_files())
        .mount(
            "/api",
            routes![
                user::register,
                user::login,
                user::logout,
                user::whoami,
                user::info,
                user::profile,
                user::update,
                user::explore,
                user::follow,
                user::unfollow,
                upload::upload,
                workout::current,
                workout::create,
                workout::save_workout,
                workout::post_workout,
                workout::delete_workout,
                workout::change_visibility,
                workout::feed,
                workout::friends_feed,
                workout::profile,
                workout::public_profile,
                workout::drafts,
                workout::starred,
                exercise::year,
                exercise::by_parent,
                exercise::read,
                exercise::read_name,
                exercise::mine,
                exercise::by_user,
                exercise::prs,
                exercise::update_pr,
                exercise::create,
                exercise::delete_exercise,
                exercise::update,
                comment::create,
                comment::by_parent,
                reaction::like,
                reaction::likes,
                reaction::star,
                reaction::stars,
                chat::query,
                db::nukedb,
            ],
        )
        .register("/api", catchers![not_found, api_error])
}

/// The application as configured by `Rocket.toml` and `ROCKET_*` variables.
pub fn rocket() -> Rocket<Build> {
    app(rocket::Config::figment()).attach(chat::stage())
}
