use serde::{Deserialize, Serialize};

use crate::codec::{to_base64, EncodedAudioChunk, EncodedVideoFrame, PLAYBACK_SAMPLE_RATE};

/// Message sent to the remote service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session configuration, sent once right after connecting
    Setup(SetupMessage),
    /// Streamed microphone or camera media
    RealtimeInput(RealtimeInputMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    /// Present (and empty) to enable transcription of the user's speech
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionConfig>,
    /// Present (and empty) to enable transcription of synthesized speech
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<TranscriptionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptionConfig {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub media_chunks: Vec<MediaChunk>,
}

/// One piece of media on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    /// Base64-encoded payload
    pub data: String,
}

impl From<&EncodedAudioChunk> for MediaChunk {
    fn from(chunk: &EncodedAudioChunk) -> Self {
        Self {
            mime_type: chunk.mime_type(),
            data: to_base64(chunk.data()),
        }
    }
}

impl From<EncodedVideoFrame> for MediaChunk {
    fn from(frame: EncodedVideoFrame) -> Self {
        Self {
            mime_type: frame.mime_type.to_string(),
            data: frame.data,
        }
    }
}

/// Message received from the remote service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    /// Acknowledges the setup message; the channel is open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_complete: Option<SetupComplete>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServerError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetupComplete {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<ModelTurn>,

    /// Transcription of the user's speech
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_transcription: Option<Transcription>,

    /// Transcription of the synthesized reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_transcription: Option<Transcription>,

    /// The current reply was cut off and must be silenced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_complete: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Base64-encoded payload
    pub data: String,
}

impl InlineData {
    /// Sample rate declared in the mime type (`audio/pcm;rate=24000`)
    pub fn sample_rate(&self) -> u32 {
        self.mime_type
            .as_deref()
            .and_then(|mime| {
                mime.split(';')
                    .filter_map(|param| param.trim().strip_prefix("rate="))
                    .find_map(|rate| rate.parse().ok())
            })
            .unwrap_or(PLAYBACK_SAMPLE_RATE)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

impl ServerMessage {
    /// Text of the synthesized reply, if this message carries any
    pub fn output_text(&self) -> Option<&str> {
        self.server_content
            .as_ref()?
            .output_transcription
            .as_ref()?
            .text
            .as_deref()
    }

    /// Text of the user's speech, if this message carries any
    pub fn input_text(&self) -> Option<&str> {
        self.server_content
            .as_ref()?
            .input_transcription
            .as_ref()?
            .text
            .as_deref()
    }

    /// Audio of the first part of the model turn
    pub fn audio_payload(&self) -> Option<&InlineData> {
        self.server_content
            .as_ref()?
            .model_turn
            .as_ref()?
            .parts
            .first()?
            .inline_data
            .as_ref()
    }

    pub fn is_interrupted(&self) -> bool {
        self.server_content
            .as_ref()
            .and_then(|content| content.interrupted)
            .unwrap_or(false)
    }
}
