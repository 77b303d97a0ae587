use crate::agent::DecisionAgent;
use crate::cli::Args;
use crate::models::chat::{ ChatMode, ChatTurn, Modality };
use crate::speech::{ AudioFormat, AudioPayload, SpeechError };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use axum::{
    routing::{ get, post },
    Router,
    Json,
    body::Body,
    extract::{ DefaultBodyLimit, Multipart, State },
    http::{ header, StatusCode },
    response::{ IntoResponse, Response },
};
use serde::Serialize;
use serde_json::{ json, Value };
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error, warn };

/// Upper bound on a request body; the 2 MiB audio cap is enforced
/// separately, this only keeps multipart overhead from tripping the
/// framework limit.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const STT_PROVIDER_FALLBACK: &str =
    "I'm having trouble processing your audio. Please try again with clearer audio.";
const STT_EMPTY_FALLBACK: &str = "I couldn't transcribe that clearly. Please try speaking again.";

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
}

#[derive(Clone)]
struct AppState {
    agent: Arc<RwLock<DecisionAgent>>,
}

pub async fn start_http_server(
    addr: &str,
    agent: Arc<RwLock<DecisionAgent>>,
    args: Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;

    let app_state = AppState { agent };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/speech-to-text", post(speech_to_text_handler))
        .route("/api/text-to-speech", post(text_to_speech_handler))
        .route("/api/reload-prompts", get(reload_prompts_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(app_state);

    if args.enable_tls && args.tls_cert_path.is_some() && args.tls_key_path.is_some() {
        let cert_path = args.tls_cert_path.as_deref().unwrap_or_default();
        let key_path = args.tls_key_path.as_deref().unwrap_or_default();

        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        info!("Starting HTTPS API server on: https://{}", addr);
        axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
    } else {
        info!("Starting HTTP API server on: http://{}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app.into_make_service()).await?;
    }

    Ok(())
}

// --- /api/chat -----------------------------------------------------------

#[derive(Debug, PartialEq)]
enum ChatRequestError {
    NotAnArray,
    BadMessage,
}

#[derive(Debug)]
struct ChatPlan {
    turns: Vec<ChatTurn>,
    mode: ChatMode,
    user_name: Option<String>,
    category: Option<String>,
    modality: Modality,
    stream: bool,
}

fn parse_chat_request(body: &Value) -> Result<ChatPlan, ChatRequestError> {
    let messages = body.get("messages").ok_or(ChatRequestError::NotAnArray)?;
    if !messages.is_array() {
        return Err(ChatRequestError::NotAnArray);
    }

    let turns: Vec<ChatTurn> = serde_json
        ::from_value(messages.clone())
        .map_err(|_| ChatRequestError::BadMessage)?;

    let mode = body
        .get("mode")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<ChatMode>().ok())
        .unwrap_or_default();

    let user_name = body
        .get("user_name")
        .and_then(Value::as_str)
        .map(|s| s.to_string());
    let category = body
        .get("category")
        .and_then(Value::as_str)
        .map(|s| s.to_string());

    let modality = match body.get("modality").and_then(Value::as_str) {
        Some("voice") => Modality::Voice,
        _ => Modality::Text,
    };

    let stream = body
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    Ok(ChatPlan {
        turns,
        mode,
        user_name,
        category,
        modality,
        stream,
    })
}

async fn chat_handler(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let plan = match parse_chat_request(&body) {
        Ok(plan) => plan,
        Err(ChatRequestError::NotAnArray) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid request format: messages must be an array" })),
            ).into_response();
        }
        Err(ChatRequestError::BadMessage) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid request format: malformed message entries" })),
            ).into_response();
        }
    };

    let agent = state.agent.read().await;

    if plan.stream {
        match
            agent.respond_stream(
                plan.mode,
                plan.user_name.as_deref(),
                plan.category.as_deref(),
                plan.turns,
                plan.modality
            ).await
        {
            Ok(stream) => {
                (
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    Body::from_stream(stream),
                ).into_response()
            }
            Err(e) => {
                error!("Chat completion error: {}", e);
                internal_error(e.to_string())
            }
        }
    } else {
        match
            agent.respond(
                plan.mode,
                plan.user_name.as_deref(),
                plan.category.as_deref(),
                plan.turns,
                plan.modality
            ).await
        {
            Ok(text) => Json(json!({ "text": text })).into_response(),
            Err(e) => {
                error!("Chat completion error: {}", e);
                internal_error(e.to_string())
            }
        }
    }
}

fn internal_error(details: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error", "details": details })),
    ).into_response()
}

// --- /api/speech-to-text -------------------------------------------------

async fn speech_to_text_handler(
    State(state): State<AppState>,
    mut multipart: Multipart
) -> Response {
    let mut audio: Option<AudioPayload> = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("audio") {
                    continue;
                }
                let format = AudioFormat::from_mime(field.content_type().unwrap_or("audio/webm"));
                match field.bytes().await {
                    Ok(bytes) => {
                        audio = Some(AudioPayload::new(bytes.to_vec(), format));
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read audio upload: {}", e);
                        return (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            Json(
                                json!({
                                "text": "Sorry, there was a problem with voice recognition. Please try again.",
                                "error": "Speech-to-text failed",
                                "details": e.to_string(),
                            })
                            ),
                        ).into_response();
                    }
                }
            }
            Ok(None) => {
                break;
            }
            Err(e) => {
                warn!("Malformed multipart upload: {}", e);
                break;
            }
        }
    }

    let Some(audio) = audio else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No audio file provided" })),
        ).into_response();
    };

    match audio.validate() {
        Err(SpeechError::EmptyAudio) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Audio file is empty" })),
            ).into_response();
        }
        Err(SpeechError::AudioTooLarge) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Audio file too large. Maximum size is 2MB." })),
            ).into_response();
        }
        Err(e) => {
            return internal_error(e.to_string());
        }
        Ok(()) => {}
    }

    info!(
        "Processing audio upload: size={} bytes, type={}",
        audio.data.len(),
        audio.format.mime_type()
    );

    let agent = state.agent.read().await;
    match agent.transcribe(&audio).await {
        Ok(transcription) => {
            let text = transcription.text.trim();
            if text.is_empty() {
                Json(
                    json!({
                    "text": STT_EMPTY_FALLBACK,
                    "error": "No transcription text found",
                })
                ).into_response()
            } else {
                Json(json!({ "text": text })).into_response()
            }
        }
        Err(e) => {
            error!("Speech-to-text error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(
                    json!({
                    "error": format!("Speech-to-text API error: {}", e),
                    "text": STT_PROVIDER_FALLBACK,
                })
                ),
            ).into_response()
        }
    }
}

// --- /api/text-to-speech -------------------------------------------------

#[derive(serde::Deserialize)]
pub struct SpeechRequest {
    pub text: Option<String>,
    pub voice: Option<String>,
}

async fn text_to_speech_handler(
    State(state): State<AppState>,
    Json(req): Json<SpeechRequest>
) -> Response {
    let text = req.text.unwrap_or_default();
    if text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No text provided" })),
        ).into_response();
    }

    let agent = state.agent.read().await;
    match agent.synthesize(&text, req.voice.as_deref()).await {
        Ok(audio) => ([(header::CONTENT_TYPE, "audio/wav")], audio).into_response(),
        Err(e) => {
            error!("Text-to-speech error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(
                    json!({
                    "error": "Text-to-speech failed",
                    "details": e.to_string(),
                })
                ),
            ).into_response()
        }
    }
}

// --- /api/reload-prompts -------------------------------------------------

async fn reload_prompts_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut agent = match state.agent.try_write() {
        Ok(guard) => guard,
        Err(_) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReloadResponse {
                    success: false,
                    message: "Agent busy".into(),
                }),
            ).into_response();
        }
    };

    match agent.reload_prompts_if_changed() {
        Ok(true) =>
            (
                StatusCode::OK,
                Json(ReloadResponse {
                    success: true,
                    message: "Prompts reloaded".into(),
                }),
            ).into_response(),
        Ok(false) =>
            (
                StatusCode::OK,
                Json(ReloadResponse {
                    success: true,
                    message: "Prompts unchanged".into(),
                }),
            ).into_response(),
        Err(e) =>
            (
                StatusCode::BAD_REQUEST,
                Json(ReloadResponse {
                    success: false,
                    message: format!("Reload error: {}", e),
                }),
            ).into_response(),
    }
}
