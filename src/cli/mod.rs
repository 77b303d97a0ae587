use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (groq, openai)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "groq")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API. Adapters supply the hosted
    /// endpoint if not set.
    #[arg(long, env = "CHAT_BASE_URL")]
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider (e.g., Groq, OpenAI)
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., llama3-70b-8192, gpt-4o)
    #[arg(long, env = "CHAT_MODEL")]
    pub chat_model: Option<String>,

    // --- Speech Provider Args ---
    /// Provider for speech-to-text and text-to-speech (groq)
    #[arg(long, env = "SPEECH_PROVIDER", default_value = "groq")]
    pub speech_provider: String,

    /// API Key for the speech provider. Falls back to the chat API key.
    #[arg(long, env = "SPEECH_API_KEY", default_value = "")]
    pub speech_api_key: String,

    /// Model name for transcription (e.g., whisper-large-v3-turbo)
    #[arg(long, env = "STT_MODEL")]
    pub stt_model: Option<String>,

    /// Model name for speech synthesis (e.g., playai-tts)
    #[arg(long, env = "TTS_MODEL")]
    pub tts_model: Option<String>,

    /// Default synthesis voice (e.g., Fritz-PlayAI)
    #[arg(long, env = "TTS_VOICE")]
    pub tts_voice: Option<String>,

    // --- General App Args ---
    /// Path to the prompt configuration file. Compiled-in templates are used
    /// when not set.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Optional path to the TLS certificate file (PEM format) for enabling
    /// HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling
    /// HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}
