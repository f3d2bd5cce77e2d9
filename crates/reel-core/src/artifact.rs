//! Artifact lookup and on-the-fly projection of the `info.json` document.

use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::ArtifactError;
use crate::kind::INFO_FILENAME;

const VIDEO_FIELDS: &[&str] = &[
    "height",
    "width",
    "fps",
    "vcodec",
    "format_note",
    "dynamic_range",
    "filesize",
];
const AUDIO_FIELDS: &[&str] = &["abr", "acodec", "audio_channels", "filesize"];

/// Resolve `<root>/<task_id>/<filename>` to an existing regular file.
///
/// Both parts must be single, normal path components; anything that could
/// escape the task directory is reported as not found.
pub async fn resolve_artifact(
    root: &Path,
    task_id: &str,
    filename: &str,
) -> Result<PathBuf, ArtifactError> {
    if !is_plain_component(task_id) || !is_plain_component(filename) {
        return Err(ArtifactError::NotFound(format!("{task_id}/{filename}")));
    }

    let path = root.join(task_id).join(filename);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(path),
        _ => Err(ArtifactError::NotFound(format!("{task_id}/{filename}"))),
    }
}

fn is_plain_component(part: &str) -> bool {
    let mut components = Path::new(part).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !part.contains(['/', '\\'])
}

pub fn is_info_file(filename: &str) -> bool {
    filename == INFO_FILENAME
}

/// Query parameters accepted by the file endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactQuery {
    /// Serve the file untouched (and as an attachment).
    pub raw: bool,
    /// Summarise `formats` into video / audio quality maps.
    pub qualities: bool,
    /// Top-level document fields to keep, in request order.
    pub fields: Vec<String>,
}

impl ArtifactQuery {
    /// Build from raw `(name, value)` query pairs.
    ///
    /// `raw` counts when its value is non-empty and not `false`/`0`;
    /// `qualities` counts by presence; every other name is a field filter.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut query = ArtifactQuery::default();
        for (name, value) in pairs {
            match name.as_str() {
                "raw" => query.raw = is_truthy(&value),
                "qualities" => query.qualities = true,
                _ => {
                    if !query.fields.contains(&name) {
                        query.fields.push(name);
                    }
                }
            }
        }
        query
    }
}

fn is_truthy(value: &str) -> bool {
    let v = value.trim();
    !(v.is_empty() || v.eq_ignore_ascii_case("false") || v == "0")
}

/// What the file endpoint should send back for `info.json`.
#[derive(Debug, Clone, PartialEq)]
pub enum InfoView {
    /// Stream the file bytes unchanged.
    Raw,
    /// Send this JSON value.
    Json(Value),
}

/// Apply the query's mode to the metadata document at `path`.
///
/// Precedence: raw, then qualities, then field filter, else the whole document.
pub async fn render_info(path: &Path, query: &ArtifactQuery) -> Result<InfoView, ArtifactError> {
    if query.raw {
        return Ok(InfoView::Raw);
    }

    let content = tokio::fs::read(path).await?;
    let doc: Value = serde_json::from_slice(&content)?;

    let view = if query.qualities {
        qualities(&doc)
    } else if !query.fields.is_empty() {
        filter_fields(&doc, &query.fields)
    } else {
        doc
    };
    Ok(InfoView::Json(view))
}

/// Bucket `doc.formats` into `{"qualities": {"video": {..}, "audio": {..}}}`.
///
/// A format with a real video codec is video; otherwise one with a real
/// audio codec is audio; anything else is dropped.
pub fn qualities(doc: &Value) -> Value {
    let mut video = Map::new();
    let mut audio = Map::new();

    let formats = doc.get("formats").and_then(Value::as_array);
    for format in formats.into_iter().flatten() {
        let Some(id) = format.get("format_id").map(format_id) else {
            continue;
        };
        if has_codec(format, "vcodec") {
            video.insert(id, pick(format, VIDEO_FIELDS));
        } else if has_codec(format, "acodec") {
            audio.insert(id, pick(format, AUDIO_FIELDS));
        }
    }

    serde_json::json!({
        "qualities": {
            "video": video,
            "audio": audio,
        }
    })
}

/// Keep only the requested top-level fields that exist in `doc`.
pub fn filter_fields(doc: &Value, fields: &[String]) -> Value {
    let mut out = Map::new();
    if let Some(obj) = doc.as_object() {
        for name in fields {
            if let Some(v) = obj.get(name) {
                out.insert(name.clone(), v.clone());
            }
        }
    }
    Value::Object(out)
}

fn has_codec(format: &Value, key: &str) -> bool {
    matches!(format.get(key).and_then(Value::as_str), Some(c) if !c.is_empty() && c != "none")
}

fn format_id(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn pick(format: &Value, keys: &[&str]) -> Value {
    let mut out = Map::new();
    for key in keys {
        if let Some(v) = format.get(*key) {
            out.insert((*key).to_owned(), v.clone());
        }
    }
    Value::Object(out)
}
