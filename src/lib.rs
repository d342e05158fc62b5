pub mod audio;
pub mod capture;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod interaction;
pub mod voice;

pub use audio::{
    AudioChunk, AudioFile, AudioFrame, CaptureConstraints, FileSource, FrameAccumulator,
    MicrophoneSource, Resampler, SourceEvent, FRAME_BYTES, FRAME_SAMPLES, TARGET_SAMPLE_RATE,
};
pub use capture::{CaptureEvent, CaptureSession, CaptureStats};
pub use client::{ClientConfig, ClientEvent, ClientStatus, SourceFactory, VoiceClient};
pub use config::Config;
pub use error::{CaptureError, ClientError, SessionError};
pub use http::{create_router, AppState};
pub use interaction::{InteractionState, InteractionTracker, LocalRecordingState, VoiceMode};
pub use voice::{
    ConnectionState, ControlMessage, DuplexByteConnection, SessionEvent, SessionUpdate,
    SpeechClip, VoiceSessionClient, WebSocketConnection,
};
