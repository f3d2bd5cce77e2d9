use reel_core::{JobKind, JobParams, TaskStatus, TimeValue};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// A job submission body that maps onto one [`JobKind`].
pub trait JobRequest: Validate {
    const KIND: JobKind;

    /// Split into the source URL and the kind-specific parameters.
    ///
    /// Empty strings count as absent so the kind's defaults apply.
    fn into_job(self) -> (String, JobParams);
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct VideoJobRequest {
    /// Source page or media URL.
    #[validate(
        required(message = "URL is required"),
        length(min = 1, message = "URL is required"),
        custom(function = "not_option_like")
    )]
    pub url: Option<String>,
    /// yt-dlp video selector (default `bestvideo`).
    pub video_format: Option<String>,
    /// yt-dlp audio selector (default `bestaudio`, `none` for video only).
    pub audio_format: Option<String>,
    /// Merge container (default `mp4`).
    pub output_format: Option<String>,
    /// Cut start, as seconds or `h:mm:ss`.
    pub start_time: Option<TimeValue>,
    /// Cut end, as seconds or `h:mm:ss`.
    pub end_time: Option<TimeValue>,
    /// Re-encode around cut points for frame-accurate sections.
    pub force_keyframes: Option<bool>,
}

impl JobRequest for VideoJobRequest {
    const KIND: JobKind = JobKind::GetVideo;

    fn into_job(self) -> (String, JobParams) {
        let params = JobParams {
            video_format: non_empty(self.video_format),
            audio_format: non_empty(self.audio_format),
            output_format: non_empty(self.output_format),
            start_time: time_text(self.start_time),
            end_time: time_text(self.end_time),
            force_keyframes: self.force_keyframes.unwrap_or(false),
            ..Default::default()
        };
        (self.url.unwrap_or_default(), params)
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AudioJobRequest {
    #[validate(
        required(message = "URL is required"),
        length(min = 1, message = "URL is required"),
        custom(function = "not_option_like")
    )]
    pub url: Option<String>,
    /// yt-dlp audio selector (default `best`).
    pub audio_format: Option<String>,
    /// Extracted audio codec (default `mp3`).
    pub output_format: Option<String>,
}

impl JobRequest for AudioJobRequest {
    const KIND: JobKind = JobKind::GetAudio;

    fn into_job(self) -> (String, JobParams) {
        let params = JobParams {
            audio_format: non_empty(self.audio_format),
            output_format: non_empty(self.output_format),
            ..Default::default()
        };
        (self.url.unwrap_or_default(), params)
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LiveVideoJobRequest {
    #[validate(
        required(message = "URL is required"),
        length(min = 1, message = "URL is required"),
        custom(function = "not_option_like")
    )]
    pub url: Option<String>,
    /// How much of the stream to capture from its start.
    pub duration: Option<TimeValue>,
    pub video_format: Option<String>,
    pub audio_format: Option<String>,
    pub output_format: Option<String>,
}

impl JobRequest for LiveVideoJobRequest {
    const KIND: JobKind = JobKind::GetLiveVideo;

    fn into_job(self) -> (String, JobParams) {
        let params = JobParams {
            video_format: non_empty(self.video_format),
            audio_format: non_empty(self.audio_format),
            output_format: non_empty(self.output_format),
            duration: time_text(self.duration),
            ..Default::default()
        };
        (self.url.unwrap_or_default(), params)
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LiveAudioJobRequest {
    #[validate(
        required(message = "URL is required"),
        length(min = 1, message = "URL is required"),
        custom(function = "not_option_like")
    )]
    pub url: Option<String>,
    pub duration: Option<TimeValue>,
    pub audio_format: Option<String>,
    pub output_format: Option<String>,
}

impl JobRequest for LiveAudioJobRequest {
    const KIND: JobKind = JobKind::GetLiveAudio;

    fn into_job(self) -> (String, JobParams) {
        let params = JobParams {
            audio_format: non_empty(self.audio_format),
            output_format: non_empty(self.output_format),
            duration: time_text(self.duration),
            ..Default::default()
        };
        (self.url.unwrap_or_default(), params)
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct InfoJobRequest {
    #[validate(
        required(message = "URL is required"),
        length(min = 1, message = "URL is required"),
        custom(function = "not_option_like")
    )]
    pub url: Option<String>,
}

impl JobRequest for InfoJobRequest {
    const KIND: JobKind = JobKind::GetInfo;

    fn into_job(self) -> (String, JobParams) {
        (self.url.unwrap_or_default(), JobParams::default())
    }
}

/// Acknowledgement returned as soon as a task is stored.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobAccepted {
    pub status: TaskStatus,
    pub task_id: String,
}

/// yt-dlp would read a leading `-` as an option.
fn not_option_like(url: &str) -> Result<(), ValidationError> {
    if url.trim_start().starts_with('-') {
        return Err(ValidationError::new("url_option_like")
            .with_message("URL must not start with '-'".into()));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn time_text(value: Option<TimeValue>) -> Option<String> {
    value.map(TimeValue::into_text).filter(|v| !v.trim().is_empty())
}
