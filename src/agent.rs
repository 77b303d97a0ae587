use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig };
use crate::llm::LlmConfig;
use crate::llm::chat::{ new_client as new_chat_client, ChatClient, CompletionRequest, TokenStream };
use crate::models::chat::{ ChatMode, ChatTurn, Modality };
use crate::speech::{
    new_synthesizer,
    new_transcriber,
    AudioPayload,
    SpeechConfig,
    SpeechError,
    Synthesizer,
    Transcriber,
    Transcription,
};

use log::info;
use std::error::Error;
use std::sync::Arc;

/// Everything one conversation needs: the completion client, the speech
/// services and the mode prompt templates.
#[derive(Clone)]
pub struct DecisionAgent {
    chat_client: Arc<dyn ChatClient>,
    transcriber: Arc<dyn Transcriber>,
    synthesizer: Arc<dyn Synthesizer>,
    prompt_config: Arc<PromptConfig>,
    prompts_path: Option<String>,
}

impl DecisionAgent {
    pub async fn new(args: Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let chat_llm_type = args.chat_llm_type
            .parse()
            .map_err(|e| format!("Invalid chat LLM type: {}", e))?;
        let chat_api_key = if !args.chat_api_key.is_empty() {
            Some(args.chat_api_key.clone())
        } else {
            None
        };
        let chat_config = LlmConfig {
            llm_type: chat_llm_type,
            base_url: args.chat_base_url.clone(),
            api_key: chat_api_key.clone(),
            completion_model: args.chat_model.clone(),
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!("Chat completion model: {}", chat_client.get_model());

        let speech_provider = args.speech_provider
            .parse()
            .map_err(|e| format!("Invalid speech provider: {}", e))?;
        // The speech services share the chat key unless one is set for them.
        let speech_api_key = if !args.speech_api_key.is_empty() {
            Some(args.speech_api_key.clone())
        } else {
            chat_api_key
        };
        let speech_config = SpeechConfig {
            provider: speech_provider,
            api_key: speech_api_key,
            stt_model: args.stt_model.clone(),
            tts_model: args.tts_model.clone(),
            tts_voice: args.tts_voice.clone(),
            base_url: None,
        };
        let transcriber = new_transcriber(&speech_config)?;
        let synthesizer = new_synthesizer(&speech_config)?;

        let prompt_config = match &args.prompts_path {
            Some(path) => prompt::load_prompts(path)?,
            None => prompt::default_prompts(),
        };

        Ok(Self {
            chat_client,
            transcriber,
            synthesizer,
            prompt_config,
            prompts_path: args.prompts_path.clone(),
        })
    }

    pub fn chat_client(&self) -> Arc<dyn ChatClient> {
        Arc::clone(&self.chat_client)
    }

    pub fn transcriber(&self) -> Arc<dyn Transcriber> {
        Arc::clone(&self.transcriber)
    }

    pub fn synthesizer(&self) -> Arc<dyn Synthesizer> {
        Arc::clone(&self.synthesizer)
    }

    pub fn system_prompt(
        &self,
        mode: ChatMode,
        user_name: Option<&str>,
        category: Option<&str>
    ) -> Result<String, prompt::PromptError> {
        prompt::get_system_prompt(&self.prompt_config, mode, user_name, category)
    }

    fn build_request(
        &self,
        mode: ChatMode,
        user_name: Option<&str>,
        category: Option<&str>,
        messages: Vec<ChatTurn>,
        modality: Modality
    ) -> Result<CompletionRequest, Box<dyn Error + Send + Sync>> {
        let system = self.system_prompt(mode, user_name, category)?;
        Ok(CompletionRequest::new(system, messages, modality))
    }

    /// Non-streaming completion, used by the voice-chat loop.
    pub async fn respond(
        &self,
        mode: ChatMode,
        user_name: Option<&str>,
        category: Option<&str>,
        messages: Vec<ChatTurn>,
        modality: Modality
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let request = self.build_request(mode, user_name, category, messages, modality)?;
        let response = self.chat_client.complete(&request).await?;
        Ok(response.response)
    }

    /// Token-by-token completion for the interactive transcript.
    pub async fn respond_stream(
        &self,
        mode: ChatMode,
        user_name: Option<&str>,
        category: Option<&str>,
        messages: Vec<ChatTurn>,
        modality: Modality
    ) -> Result<TokenStream, Box<dyn Error + Send + Sync>> {
        let request = self.build_request(mode, user_name, category, messages, modality)?;
        self.chat_client.stream_completion(&request).await
    }

    pub async fn transcribe(&self, audio: &AudioPayload) -> Result<Transcription, SpeechError> {
        self.transcriber.transcribe(audio).await
    }

    pub async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>
    ) -> Result<Vec<u8>, SpeechError> {
        let voice = match voice {
            Some(v) if !v.trim().is_empty() => v.to_string(),
            _ => self.synthesizer.default_voice(),
        };
        self.synthesizer.synthesize(text, &voice).await
    }

    /// Reload the prompt templates when the backing file changed on disk.
    /// No-op when running on the compiled-in defaults.
    pub fn reload_prompts_if_changed(&mut self) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let Some(path) = self.prompts_path.clone() else {
            return Ok(false);
        };
        match prompt::reload_prompts_if_changed(&path, &self.prompt_config)? {
            Some(new_config) => {
                self.prompt_config = new_config;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
