use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    serve, Router,
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

use crate::completion::{CompletionClient, CompletionError};
use crate::config::AppConfig;
use crate::prompts;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    completions: Arc<CompletionClient>,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let templates = create_minijinja_env().context("Failed to initialize template engine")?;
        let completions =
            CompletionClient::new(config).context("Failed to initialize completion client")?;

        Ok(Self {
            templates: Arc::new(templates),
            completions: Arc::new(completions),
        })
    }
}

#[derive(Debug, serde::Deserialize)]
struct ProblemRequest {
    #[serde(default)]
    problem: String,
}

#[derive(Debug, serde::Serialize)]
struct SolutionResponse {
    solution: String,
}

#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

// Minijinja Environment setup
fn create_minijinja_env() -> Result<AutoReloader> {
    // Use AutoReloader for development convenience
    let reloader = AutoReloader::new(|notifier| {
        let loader = path_loader("templates");
        let mut env = Environment::new();
        env.set_loader(loader);
        // Watch the templates directory for changes
        notifier.watch_path("templates", true);
        Ok(env)
    });
    Ok(reloader)
}

async fn index_handler(
    State(state): State<AppState>,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                let context = minijinja::context! {
                    title => "BabyStepper - Feeling stuck? Take a baby step right now to tackle it!",
                    description => "Break down your challenges into small, manageable steps with BabyStepper.",
                };
                tmpl.render(context)
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
        })
}

/// `POST /api/generate`: the "first step" variant. Failure bodies carry
/// only an `error` field.
async fn generate_handler(
    State(state): State<AppState>,
    Json(payload): Json<ProblemRequest>,
) -> axum::response::Response {
    let problem = payload.problem.trim();
    if problem.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Field \"problem\" must be a non-empty string".to_string(),
                details: None,
            }),
        )
            .into_response();
    }

    info!("Received problem: {}", problem);

    match state
        .completions
        .chat_completion(
            prompts::GENERATE_SYSTEM_PROMPT,
            problem,
            prompts::GENERATE_MAX_TOKENS,
        )
        .await
    {
        Ok(solution) => (StatusCode::OK, Json(SolutionResponse { solution })).into_response(),
        Err(err) => {
            error!("Error: {}", err);
            failure_response(&err, "Failed to generate solution", false)
        }
    }
}

/// `POST /api/solve`: the "baby step" variant. Failure bodies carry the
/// underlying message under `details` for diagnostics.
async fn solve_handler(
    State(state): State<AppState>,
    Json(payload): Json<ProblemRequest>,
) -> axum::response::Response {
    let problem = payload.problem.trim();
    if problem.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Field \"problem\" must be a non-empty string".to_string(),
                details: None,
            }),
        )
            .into_response();
    }

    info!("Received problem: {}", problem);

    match state
        .completions
        .chat_completion(prompts::SOLVE_SYSTEM_PROMPT, problem, prompts::SOLVE_MAX_TOKENS)
        .await
    {
        Ok(solution) => (StatusCode::OK, Json(SolutionResponse { solution })).into_response(),
        Err(err) => {
            error!("Detailed API error: {}", err);
            failure_response(&err, "Failed to generate baby step", true)
        }
    }
}

/// Map a completion failure to its response status: a missing
/// credential is a configuration error, everything else is an upstream
/// failure relayed through the gateway.
fn failure_response(
    err: &CompletionError,
    summary: &str,
    with_details: bool,
) -> axum::response::Response {
    let status = if err.is_configuration() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_GATEWAY
    };

    let body = if err.is_configuration() {
        ErrorResponse {
            error: err.to_string(),
            details: None,
        }
    } else {
        ErrorResponse {
            error: summary.to_string(),
            details: with_details.then(|| err.to_string()),
        }
    };

    (status, Json(body)).into_response()
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Not found".to_string(),
            details: None,
        }),
    )
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/generate", post(generate_handler))
        .route("/api/solve", post(solve_handler))
        // Route for static files must be nested under a path like /static
        // or it will conflict with other routes.
        .nest_service("/static", ServeDir::new("static"))
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(port: u16, config: AppConfig) -> Result<()> {
    let state = AppState::new(&config)?;
    let app = build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
