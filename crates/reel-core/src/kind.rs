//! Job kinds and the yt-dlp argument dialect each one speaks.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::task::{JobParams, Task};
use crate::timespec::{format_seconds, parse_time};

/// Name of the metadata document written by [`JobKind::GetInfo`].
pub const INFO_FILENAME: &str = "info.json";

/// Audio format value that disables the audio half of a video selector.
const NO_AUDIO: &str = "none";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    GetVideo,
    GetAudio,
    GetLiveVideo,
    GetLiveAudio,
    GetInfo,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::GetVideo,
        JobKind::GetAudio,
        JobKind::GetLiveVideo,
        JobKind::GetLiveAudio,
        JobKind::GetInfo,
    ];

    pub fn is_live(self) -> bool {
        matches!(self, JobKind::GetLiveVideo | JobKind::GetLiveAudio)
    }

    fn is_audio_only(self) -> bool {
        matches!(self, JobKind::GetAudio | JobKind::GetLiveAudio)
    }

    /// Filename prefix of the primary artifact in the task directory.
    pub fn output_prefix(self) -> &'static str {
        match self {
            JobKind::GetVideo => "video.",
            JobKind::GetAudio => "audio.",
            JobKind::GetLiveVideo => "live_video.",
            JobKind::GetLiveAudio => "live_audio.",
            JobKind::GetInfo => "info.",
        }
    }

    /// Fill unset format parameters with this kind's defaults.
    pub fn apply_defaults(self, params: &mut JobParams) {
        match self {
            JobKind::GetVideo | JobKind::GetLiveVideo => {
                params.video_format.get_or_insert_with(|| "bestvideo".to_owned());
                params.audio_format.get_or_insert_with(|| "bestaudio".to_owned());
                params.output_format.get_or_insert_with(|| "mp4".to_owned());
            }
            JobKind::GetAudio | JobKind::GetLiveAudio => {
                params.audio_format.get_or_insert_with(|| "best".to_owned());
                params.output_format.get_or_insert_with(|| "mp3".to_owned());
            }
            JobKind::GetInfo => {}
        }
    }

    /// Build the argument list for this task. The output template is
    /// relative because the tool runs with the task directory as cwd.
    ///
    /// The URL always comes last, after `--`, so it is never read as an option.
    pub fn build_args(self, task: &Task) -> Vec<String> {
        let mut args = self.option_args(task);
        args.extend(["--".to_owned(), task.url.clone()]);
        args
    }

    fn option_args(self, task: &Task) -> Vec<String> {
        let mut args = Vec::new();

        if self == JobKind::GetInfo {
            args.extend(["--dump-json".to_owned(), "--no-download".to_owned()]);
            return args;
        }

        if self.is_audio_only() {
            args.push("-x".to_owned());
            // output_format takes precedence over audio_format.
            if let Some(codec) = task.output_format.as_deref().or(task.audio_format.as_deref()) {
                args.extend(["--audio-format".to_owned(), codec.to_owned()]);
            }
        } else {
            let selector = format_selector(task.video_format.as_deref(), task.audio_format.as_deref());
            args.extend(["-f".to_owned(), selector]);
            if let Some(container) = task.output_format.as_deref() {
                args.extend(["--merge-output-format".to_owned(), container.to_owned()]);
            }
        }

        if self.is_live() {
            args.push("--live-from-start".to_owned());
            if let Some(secs) = task.duration.as_deref().and_then(parse_time) {
                args.extend([
                    "--download-sections".to_owned(),
                    format!("*0-{}", format_seconds(secs)),
                ]);
            }
        } else if self == JobKind::GetVideo {
            if let Some(range) = section_range(task.start_time.as_deref(), task.end_time.as_deref()) {
                args.extend(["--download-sections".to_owned(), range]);
                if task.force_keyframes {
                    args.push("--force-keyframes-at-cuts".to_owned());
                }
            }
        }

        args.extend(["-o".to_owned(), format!("{}%(ext)s", self.output_prefix())]);
        args
    }
}

/// `video+audio`, or just `video` when audio is explicitly `none`.
fn format_selector(video: Option<&str>, audio: Option<&str>) -> String {
    let video = video.unwrap_or("bestvideo");
    match audio {
        Some(a) if a.eq_ignore_ascii_case(NO_AUDIO) => video.to_owned(),
        Some(a) => format!("{video}+{a}"),
        None => format!("{video}+bestaudio"),
    }
}

/// `*start-end` for `--download-sections`; `None` when neither bound parses.
fn section_range(start: Option<&str>, end: Option<&str>) -> Option<String> {
    let start = start.and_then(parse_time);
    let end = end.and_then(parse_time);
    if start.is_none() && end.is_none() {
        return None;
    }
    let start = format_seconds(start.unwrap_or(0.0));
    let end = end.map(format_seconds).unwrap_or_else(|| "inf".to_owned());
    Some(format!("*{start}-{end}"))
}
