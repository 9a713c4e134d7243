//! FitBot: relays a user's question to an OpenAI-compatible chat completion
//! endpoint.

use std::{env, sync::Arc};

use log::{debug, error, info, warn};
use openai::{
    chat::{ChatCompletion, ChatCompletionMessage, ChatCompletionMessageRole},
    Credentials,
};
use rocket::{
    fairing::AdHoc,
    http::Status,
    response::status::Custom,
    serde::{
        json::{json, Json, Value},
        Deserialize, Serialize,
    },
    State,
};
use thiserror::Error;

use crate::{auth::AuthenticatedUser, config::AppConfig};

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("no API key configured for the chat backend")]
    MissingApiKey,

    #[error("chat backend request failed: {0}")]
    Upstream(String),

    #[error("chat backend returned no choices")]
    EmptyReply,
}

type MockFn = Arc<dyn Fn(&str, &str) -> Result<String, ChatError> + Send + Sync>;

enum ChatBackend {
    OpenAi {
        model: String,
        temperature: f32,
        credentials: Option<Credentials>,
    },
    Mock {
        responder: MockFn,
    },
}

pub struct ChatProxy {
    backend: ChatBackend,
}

/// System prompt templated with the caller's name.
pub fn system_prompt(name: &str) -> String {
    format!(
        "Your role is to be a professional personal trainer named FitBot which answer questions for {name}.\n\
         Please do not mention that you were given any context in your response and be very professional."
    )
}

impl ChatProxy {
    pub fn openai(
        api_key: Option<String>,
        base_url: &str,
        model: String,
        temperature: f32,
    ) -> Self {
        info!("ChatProxy::openai selected model={} base_url={}", model, base_url);
        let credentials = api_key.map(|key| Credentials::new(key, base_url));
        if credentials.is_none() {
            warn!("No chat API key configured; /api/query will fail");
        }
        Self {
            backend: ChatBackend::OpenAi {
                model,
                temperature,
                credentials,
            },
        }
    }

    /// Backend answering from a closure of `(system, user)`, for tests.
    pub fn mock(f: impl Fn(&str, &str) -> Result<String, ChatError> + Send + Sync + 'static) -> Self {
        debug!("ChatProxy::mock creating mock backend");
        Self {
            backend: ChatBackend::Mock {
                responder: Arc::new(f),
            },
        }
    }

    /// Asks `question` on behalf of `name`. The question is passed through
    /// verbatim.
    pub async fn ask(&self, name: &str, question: &str) -> Result<String, ChatError> {
        let system = system_prompt(name);
        match &self.backend {
            ChatBackend::OpenAi {
                model,
                temperature,
                credentials,
            } => {
                let credentials = credentials.clone().ok_or(ChatError::MissingApiKey)?;
                debug!("OpenAI call using model={} question_len={}", model, question.len());
                let messages = vec![
                    ChatCompletionMessage {
                        role: ChatCompletionMessageRole::System,
                        content: Some(system),
                        name: None,
                        function_call: None,
                        tool_call_id: None,
                        tool_calls: None,
                    },
                    ChatCompletionMessage {
                        role: ChatCompletionMessageRole::User,
                        content: Some(question.to_string()),
                        name: None,
                        function_call: None,
                        tool_call_id: None,
                        tool_calls: None,
                    },
                ];
                let completion = ChatCompletion::builder(model, messages)
                    .temperature(*temperature)
                    .credentials(credentials)
                    .create()
                    .await
                    .map_err(|e| ChatError::Upstream(e.to_string()))?;
                let content = completion
                    .choices
                    .first()
                    .ok_or(ChatError::EmptyReply)?
                    .message
                    .content
                    .clone()
                    .unwrap_or_default();
                debug!("OpenAI response length={}", content.len());
                Ok(content)
            }
            ChatBackend::Mock { responder } => responder(&system, question),
        }
    }
}

/// Builds the configured chat backend and hands it to Rocket.
pub fn stage() -> AdHoc {
    AdHoc::try_on_ignite("Chat backend", |rocket| async {
        let config = match rocket.figment().extract::<AppConfig>() {
            Ok(config) => config.chat,
            Err(e) => {
                error!("Invalid chat configuration: {}", e);
                return Err(rocket);
            }
        };
        let api_key = config
            .api_key
            .or_else(|| env::var("ANYSCALE_API_KEY").ok());
        let proxy = ChatProxy::openai(api_key, &config.base_url, config.model, config.temperature);
        Ok(rocket.manage(proxy))
    })
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct Question {
    query: String,
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Answer {
    response: String,
}

#[post("/query", data = "<question>")]
pub async fn query(
    chat: &State<ChatProxy>,
    caller: AuthenticatedUser,
    question: Json<Question>,
) -> Result<Json<Answer>, Custom<Json<Value>>> {
    match chat.ask(&caller.name, &question.query).await {
        Ok(response) => Ok(Json(Answer { response })),
        Err(e) => {
            error!("Chat query for {} failed: {}", caller.id(), e);
            Err(Custom(Status::InternalServerError, Json(json!({}))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_names_the_caller() {
        let prompt = system_prompt("Ada");
        assert!(prompt.starts_with(
            "Your role is to be a professional personal trainer named FitBot which answer questions for Ada.\n"
        ));
        assert!(prompt.ends_with("be very professional."));
    }

    #[rocket::async_test]
    async fn mock_receives_prompt_and_question_verbatim() {
        let proxy = ChatProxy::mock(|system, user| Ok(format!("{}|{}", system.len(), user)));
        let reply = proxy.ask("Ada", "  how do I squat?  ").await.unwrap();
        assert_eq!(
            reply,
            format!("{}|  how do I squat?  ", system_prompt("Ada").len())
        );
    }

    #[rocket::async_test]
    async fn openai_backend_without_key_fails() {
        let proxy = ChatProxy::openai(None, "http://localhost:1/", "model".into(), 0.7);
        let result = proxy.ask("Ada", "hi").await;
        assert!(matches!(result, Err(ChatError::MissingApiKey)));
    }
}
