use log::error;
use rocket::{
    http::Status,
    request::Request,
    response::{self, status::Custom, Responder},
    serde::json::serde_json,
};
use thiserror::Error;

/// Errors a route handler can surface to the client.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Malformed document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::Unauthorized(_) => Status::Unauthorized,
            ApiError::Conflict(_) => Status::Conflict,
            ApiError::Database(_) | ApiError::Json(_) | ApiError::Internal(_) => {
                Status::InternalServerError
            }
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status == Status::InternalServerError {
            error!("{} {} failed: {}", request.method(), request.uri(), self);
        }
        Custom(status, self.to_string()).respond_to(request)
    }
}
