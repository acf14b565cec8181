use std::sync::Arc;
use tokio::sync::mpsc;

use super::messages::{
    ClientMessage, Content, GenerationConfig, MediaChunk, PrebuiltVoiceConfig,
    RealtimeInputMessage, ServerMessage, SetupMessage, SpeechConfig, TextPart,
    TranscriptionConfig, VoiceConfig,
};
use crate::codec::{EncodedAudioChunk, EncodedVideoFrame};
use crate::error::ChannelError;

/// Media handed to the channel by the capture pipelines
#[derive(Debug, Clone)]
pub enum RealtimeInput {
    Audio(EncodedAudioChunk),
    Video(EncodedVideoFrame),
}

impl RealtimeInput {
    pub fn into_message(self) -> ClientMessage {
        let chunk: MediaChunk = match self {
            Self::Audio(chunk) => (&chunk).into(),
            Self::Video(frame) => frame.into(),
        };

        ClientMessage::RealtimeInput(RealtimeInputMessage {
            media_chunks: vec![chunk],
        })
    }
}

/// Inbound events from the remote channel, in arrival order
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The remote side is ready to receive media
    Open,
    Message(ServerMessage),
    /// The remote side reported a failure
    Error(String),
    /// The connection ended
    Close { reason: Option<String> },
}

/// Outbound half of an open channel
pub trait RemoteChannel: Send + Sync {
    /// Queue media for sending; never blocks
    fn send_realtime_input(&self, input: RealtimeInput) -> Result<(), ChannelError>;

    /// Close the connection
    fn close(&self) -> Result<(), ChannelError>;
}

/// Opens remote channels
#[async_trait::async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Connect and send the setup message
    ///
    /// Inbound events, starting with [`ChannelEvent::Open`] once the remote
    /// side acknowledges the setup, are delivered on the returned receiver.
    async fn connect(
        &self,
        config: &LiveConnectConfig,
    ) -> Result<(Arc<dyn RemoteChannel>, mpsc::Receiver<ChannelEvent>), ChannelError>;
}

/// What the remote session is configured with at connect time
#[derive(Debug, Clone)]
pub struct LiveConnectConfig {
    pub session_id: String,
    pub model: String,
    pub voice_name: String,
    pub system_instruction: String,
    pub input_transcription: bool,
    pub output_transcription: bool,
}

impl LiveConnectConfig {
    pub fn setup_message(&self) -> ClientMessage {
        ClientMessage::Setup(SetupMessage {
            model: self.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.voice_name.clone(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: self.system_instruction.clone(),
                }],
            },
            input_audio_transcription: self
                .input_transcription
                .then(TranscriptionConfig::default),
            output_audio_transcription: self
                .output_transcription
                .then(TranscriptionConfig::default),
        })
    }
}
