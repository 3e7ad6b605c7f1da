use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder, ResponseError};
use log::{error, info, warn};
use thiserror::Error;

use crate::model::prompts::{self, AnalysisTask};
use crate::model::ProviderError;
use crate::web::models::{
    AnalyzeRequest, AnalyzeResponse, ChatRequest, ChatResponse, ErrorBody, HealthResponse,
    SuggestContext, SuggestionSet,
};
use crate::AppState;

pub const SERVICE_NAME: &str = "S.U.S.M.I AI Service";

/// Failure surfaced to callers as `500 {"detail": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            detail: self.to_string(),
        })
    }
}

// Body validation failures answer 422 with the parser's message
pub fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    warn!("Rejected request body: {}", err);
    let response = HttpResponse::UnprocessableEntity().json(ErrorBody {
        detail: err.to_string(),
    });
    InternalError::from_response(err, response).into()
}

// Health check endpoint
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// Chat API endpoint
pub async fn chat(
    data: web::Data<AppState>,
    req: web::Json<ChatRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = req.into_inner();
    let provider = &data.model.chat;

    info!(
        "Chat request via {}: {} message(s), user {}",
        provider.name(),
        req.messages.len(),
        req.user_id.as_deref().unwrap_or("-")
    );

    let params = req.into_params();
    match provider.complete(&params).await {
        Ok(completion) => Ok(HttpResponse::Ok().json(ChatResponse::from(completion))),
        Err(e) => {
            error!("Chat provider {} failed: {}", provider.name(), e);
            Err(e.into())
        }
    }
}

// Text analysis endpoint; only OpenAI can serve it
pub async fn analyze(
    data: web::Data<AppState>,
    req: web::Json<AnalyzeRequest>,
) -> Result<HttpResponse, ApiError> {
    let AnalyzeRequest { text, task } = req.into_inner();

    let Some(analyst) = data.model.analyst.as_ref() else {
        info!("Analyze request for task {:?} without OpenAI key", task);
        return Ok(HttpResponse::Ok().json(AnalyzeResponse {
            result: prompts::ANALYZE_FALLBACK.to_string(),
            task,
        }));
    };

    match analyst.analyze(AnalysisTask::from_label(&task), &text).await {
        Ok(result) => Ok(HttpResponse::Ok().json(AnalyzeResponse { result, task })),
        Err(e) => {
            error!("Analysis of task {:?} failed: {}", task, e);
            Err(e.into())
        }
    }
}

// Proactive suggestions; the context does not influence them yet
pub async fn suggest(_context: web::Json<SuggestContext>) -> impl Responder {
    HttpResponse::Ok().json(SuggestionSet {
        suggestions: prompts::SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use actix_web::{test, App};
    use async_trait::async_trait;
    use httpmock::prelude::*;
    use serde_json::{json, Value};

    use super::*;
    use crate::model::{
        ChatParams, ChatProvider, Completion, FallbackProvider, ModelManager, OpenAiProvider, Usage,
    };
    use crate::web::models::Role;
    use crate::web::routes;

    /// Records every conversation it receives.
    struct StubProvider {
        seen: Mutex<Vec<ChatParams>>,
        fail: bool,
    }

    impl StubProvider {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl ChatProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn complete(&self, params: &ChatParams) -> Result<Completion, ProviderError> {
            self.seen.lock().unwrap().push(params.clone());
            if self.fail {
                return Err(ProviderError::MalformedResponse {
                    provider: "stub",
                    reason: "boom".to_string(),
                });
            }
            Ok(Completion {
                content: "resposta".to_string(),
                model: "stub-model".to_string(),
                usage: Some(Usage::Messages {
                    input_tokens: 1,
                    output_tokens: 2,
                }),
            })
        }
    }

    fn state(chat: Arc<dyn ChatProvider>, analyst: Option<Arc<OpenAiProvider>>) -> web::Data<AppState> {
        web::Data::new(AppState {
            model: ModelManager { chat, analyst },
        })
    }

    macro_rules! service {
        ($state:expr) => {
            test::init_service(App::new().app_data($state).configure(routes::configure)).await
        };
    }

    #[actix_web::test]
    async fn health_is_constant() {
        let app = service!(state(Arc::new(FallbackProvider), None));
        for _ in 0..2 {
            let req = test::TestRequest::get().uri("/health").to_request();
            let body: Value = test::call_and_read_body_json(&app, req).await;
            assert_eq!(
                body,
                json!({"status": "ok", "service": "S.U.S.M.I AI Service", "version": "1.0.0"})
            );
        }
    }

    #[actix_web::test]
    async fn chat_without_keys_returns_fallback() {
        let app = service!(state(Arc::new(FallbackProvider), None));
        let req = test::TestRequest::post()
            .uri("/chat")
            .set_json(json!({"messages": [{"role": "user", "content": "Hi"}]}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body,
            json!({"content": prompts::CHAT_FALLBACK, "model": "fallback", "usage": null})
        );
    }

    #[actix_web::test]
    async fn chat_passes_merged_params_to_provider() {
        let stub = StubProvider::new(false);
        let app = service!(state(stub.clone(), None));
        let req = test::TestRequest::post()
            .uri("/chat")
            .set_json(json!({
                "messages": [
                    {"role": "system", "content": "s"},
                    {"role": "user", "content": "Oi"}
                ],
                "max_tokens": 42
            }))
            .to_request();
        let body: ChatResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.content, "resposta");
        assert_eq!(body.model, "stub-model");
        assert_eq!(
            body.usage,
            Some(Usage::Messages {
                input_tokens: 1,
                output_tokens: 2
            })
        );

        let seen = stub.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model, "gpt-4");
        assert_eq!(seen[0].temperature, 0.7);
        assert_eq!(seen[0].max_tokens, 42);
        assert_eq!(seen[0].messages[0].role, Role::System);
        assert_eq!(seen[0].messages[1].content, "Oi");
    }

    #[actix_web::test]
    async fn chat_failure_is_500_with_detail() {
        let app = service!(state(StubProvider::new(true), None));
        let req = test::TestRequest::post()
            .uri("/chat")
            .set_json(json!({"messages": [{"role": "user", "content": "Oi"}]}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"detail": "malformed stub response: boom"}));
    }

    #[actix_web::test]
    async fn malformed_chat_body_is_422() {
        let stub = StubProvider::new(false);
        let app = service!(state(stub.clone(), None));
        let req = test::TestRequest::post()
            .uri("/chat")
            .set_json(json!({"messages": "not a list"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["detail"].is_string());
        assert!(stub.seen.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn analyze_without_openai_key_skips_providers() {
        let stub = StubProvider::new(false);
        let app = service!(state(stub.clone(), None));
        let req = test::TestRequest::post()
            .uri("/analyze")
            .set_json(json!({"text": "long text", "task": "extract"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body,
            json!({"result": prompts::ANALYZE_FALLBACK, "task": "extract"})
        );
        assert!(stub.seen.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn analyze_unknown_task_uses_summary_prompt_and_echoes_task() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .body_contains("Resuma o seguinte texto de forma concisa:\\n\\nlong text");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "model": "gpt-4-0613",
                        "choices": [{"message": {"role": "assistant", "content": "Resumo."}}],
                        "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
                    }));
            })
            .await;

        let analyst = Arc::new(
            OpenAiProvider::new("sk-test".to_string(), server.base_url(), Duration::from_secs(5))
                .unwrap(),
        );
        let app = service!(state(analyst.clone(), Some(analyst)));
        let req = test::TestRequest::post()
            .uri("/analyze")
            .set_json(json!({"text": "long text", "task": "unknown"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        mock.assert_async().await;
        assert_eq!(body, json!({"result": "Resumo.", "task": "unknown"}));
    }

    #[actix_web::test]
    async fn analyze_provider_failure_is_500() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(503).body("upstream unavailable");
            })
            .await;

        let analyst = Arc::new(
            OpenAiProvider::new("sk-test".to_string(), server.base_url(), Duration::from_secs(5))
                .unwrap(),
        );
        let app = service!(state(analyst.clone(), Some(analyst)));
        let req = test::TestRequest::post()
            .uri("/analyze")
            .set_json(json!({"text": "abc"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.starts_with("openai returned 503"));
        assert!(detail.contains("upstream unavailable"));
    }

    #[actix_web::test]
    async fn chat_timeout_is_500_with_detail() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).delay(Duration::from_secs(3)).body("{}");
            })
            .await;

        let provider = Arc::new(
            OpenAiProvider::new(
                "sk-test".to_string(),
                server.base_url(),
                Duration::from_millis(300),
            )
            .unwrap(),
        );
        let app = service!(state(provider, None));
        let req = test::TestRequest::post()
            .uri("/chat")
            .set_json(json!({"messages": [{"role": "user", "content": "Oi"}]}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert!(!body["detail"].as_str().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn suggest_ignores_its_context() {
        let app = service!(state(Arc::new(FallbackProvider), None));
        let expected = json!({"suggestions": [
            "Você tem 3 tarefas pendentes para hoje",
            "Considere agendar uma pausa às 15h",
            "Seu relatório mensal está pendente"
        ]});
        for context in [json!({}), json!({"user": "ana", "tasks": [1, 2, 3]})] {
            let req = test::TestRequest::post()
                .uri("/suggest")
                .set_json(context)
                .to_request();
            let body: Value = test::call_and_read_body_json(&app, req).await;
            assert_eq!(body, expected);
        }
    }
}
