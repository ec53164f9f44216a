// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat message model shared by IM adapters, dispatch rules, and blocks.
//!
//! An [`IMMessage`] is a sender plus an ordered list of [`MessageElement`]s.
//! Media elements wrap a [`MediaMessage`] which holds exactly one source
//! (URL, local path, or in-memory bytes) and materializes the others lazily.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::ChatflowError;
use crate::sender::ChatSender;

#[derive(Debug, Clone, PartialEq, Eq)]
enum MediaSource {
    Url(String),
    Path(PathBuf),
    Bytes(Arc<Vec<u8>>),
}

/// Media payload (image, voice, file, video) with one authoritative source.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "MediaRepr", into = "MediaRepr")]
pub struct MediaMessage {
    source: MediaSource,
    format: Option<String>,
    data_cache: Arc<OnceCell<Arc<Vec<u8>>>>,
    path_cache: Arc<OnceCell<PathBuf>>,
}

impl MediaMessage {
    fn with_source(source: MediaSource, format: Option<String>) -> Self {
        Self {
            source,
            format,
            data_cache: Arc::new(OnceCell::new()),
            path_cache: Arc::new(OnceCell::new()),
        }
    }

    /// Media served from a URL. The format is taken from the URL's extension.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let format = extension_of(url.split(['?', '#']).next().unwrap_or_default());
        Self::with_source(MediaSource::Url(url), format)
    }

    /// Media stored in a local file. The format is taken from the extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        Self::with_source(MediaSource::Path(path), format)
    }

    /// In-memory media. Bytes carry no extension, so the format is explicit.
    pub fn from_bytes(data: Vec<u8>, format: impl Into<String>) -> Self {
        Self::with_source(MediaSource::Bytes(Arc::new(data)), Some(format.into()))
    }

    /// Build from optional parts, enforcing that exactly one source is set.
    pub fn new(
        url: Option<String>,
        path: Option<PathBuf>,
        data: Option<Vec<u8>>,
        format: Option<String>,
    ) -> Result<Self, ChatflowError> {
        match (url, path, data) {
            (Some(url), None, None) => {
                let mut media = Self::from_url(url);
                if format.is_some() {
                    media.format = format;
                }
                Ok(media)
            }
            (None, Some(path), None) => {
                let mut media = Self::from_path(path);
                if format.is_some() {
                    media.format = format;
                }
                Ok(media)
            }
            (None, None, Some(data)) => match format {
                Some(format) => Ok(Self::from_bytes(data, format)),
                None => Err(ChatflowError::adapter(
                    "media bytes require an explicit format",
                )),
            },
            _ => Err(ChatflowError::adapter(
                "media must have exactly one of url, path, or data",
            )),
        }
    }

    /// The URL, if this media was created from one.
    pub fn url(&self) -> Option<&str> {
        match &self.source {
            MediaSource::Url(url) => Some(url),
            _ => None,
        }
    }

    /// The local path, if this media was created from one.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            MediaSource::Path(path) => Some(path),
            _ => None,
        }
    }

    /// File format (extension without the dot), when known.
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    /// MIME type for this media within a category such as `image` or `audio`.
    pub fn mime_type(&self, category: &str) -> String {
        format!("{category}/{}", self.format.as_deref().unwrap_or("octet-stream"))
    }

    /// Raw bytes, reading the file or fetching the URL on first access.
    pub async fn data(&self) -> Result<Arc<Vec<u8>>, ChatflowError> {
        self.data_cache
            .get_or_try_init(|| async {
                match &self.source {
                    MediaSource::Bytes(data) => Ok::<_, ChatflowError>(data.clone()),
                    MediaSource::Path(path) => Ok(Arc::new(tokio::fs::read(path).await?)),
                    MediaSource::Url(url) => fetch_url(url).await.map(Arc::new),
                }
            })
            .await
            .cloned()
    }

    /// A URL for this media; non-URL sources become a base64 `data:` URL.
    pub async fn data_url(&self, category: &str) -> Result<String, ChatflowError> {
        if let MediaSource::Url(url) = &self.source {
            return Ok(url.clone());
        }
        let data = self.data().await?;
        Ok(format!(
            "data:{};base64,{}",
            self.mime_type(category),
            BASE64.encode(data.as_slice())
        ))
    }

    /// A local file for this media; non-path sources are written to a kept temp file.
    pub async fn local_path(&self) -> Result<PathBuf, ChatflowError> {
        if let MediaSource::Path(path) = &self.source {
            return Ok(path.clone());
        }
        self.path_cache
            .get_or_try_init(|| async {
                let data = self.data().await?;
                let suffix = self
                    .format
                    .as_deref()
                    .map(|f| format!(".{f}"))
                    .unwrap_or_default();
                let file = tempfile::Builder::new()
                    .prefix("chatflow-media-")
                    .suffix(&suffix)
                    .tempfile()?;
                let (_, path) = file.keep().map_err(|e| ChatflowError::storage(e.error))?;
                tokio::fs::write(&path, data.as_slice()).await?;
                Ok::<PathBuf, ChatflowError>(path)
            })
            .await
            .cloned()
    }
}

async fn fetch_url(url: &str) -> Result<Vec<u8>, ChatflowError> {
    if let Some(rest) = url.strip_prefix("data:") {
        let (_, encoded) = rest
            .split_once(";base64,")
            .ok_or_else(|| ChatflowError::adapter("unsupported data URL encoding"))?;
        return BASE64
            .decode(encoded)
            .map_err(|e| ChatflowError::adapter(format!("invalid data URL: {e}")));
    }
    let response = reqwest::get(url).await.map_err(|e| ChatflowError::Adapter {
        message: format!("failed to fetch media from {url}"),
        source: Some(Box::new(e)),
    })?;
    let bytes = response.bytes().await.map_err(|e| ChatflowError::Adapter {
        message: format!("failed to read media body from {url}"),
        source: Some(Box::new(e)),
    })?;
    Ok(bytes.to_vec())
}

fn extension_of(s: &str) -> Option<String> {
    let name = s.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

impl PartialEq for MediaMessage {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.format == other.format
    }
}

impl std::fmt::Debug for MediaMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            MediaSource::Url(url) => format!("url({url})"),
            MediaSource::Path(path) => format!("path({})", path.display()),
            MediaSource::Bytes(data) => format!("bytes({} bytes)", data.len()),
        };
        f.debug_struct("MediaMessage")
            .field("source", &source)
            .field("format", &self.format)
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct MediaRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    format: Option<String>,
}

impl TryFrom<MediaRepr> for MediaMessage {
    type Error = ChatflowError;

    fn try_from(repr: MediaRepr) -> Result<Self, Self::Error> {
        let data = repr
            .data
            .map(|encoded| {
                BASE64
                    .decode(encoded)
                    .map_err(|e| ChatflowError::adapter(format!("invalid base64 media data: {e}")))
            })
            .transpose()?;
        MediaMessage::new(repr.url, repr.path, data, repr.format)
    }
}

impl From<MediaMessage> for MediaRepr {
    fn from(media: MediaMessage) -> Self {
        let (url, path, data) = match media.source {
            MediaSource::Url(url) => (Some(url), None, None),
            MediaSource::Path(path) => (None, Some(path), None),
            MediaSource::Bytes(data) => (None, None, Some(BASE64.encode(data.as_slice()))),
        };
        Self {
            url,
            path,
            data,
            format: media.format,
        }
    }
}

/// One element of a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageElement {
    Text { text: String },
    Image(MediaMessage),
    Voice(MediaMessage),
    File(MediaMessage),
    Video(MediaMessage),
    Mention { target: ChatSender },
    Reply { message_id: String },
    Json { data: serde_json::Value },
    Face {
        face_id: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl MessageElement {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn mention(target: ChatSender) -> Self {
        Self::Mention { target }
    }

    /// Plain-text rendering used for `IMMessage::content` and rule matching.
    pub fn to_plain(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Image(_) => "[image]".to_string(),
            Self::Voice(_) => "[voice]".to_string(),
            Self::File(media) => match media.path().and_then(|p| p.file_name()) {
                Some(name) => format!("[file:{}]", name.to_string_lossy()),
                None => "[file]".to_string(),
            },
            Self::Video(_) => "[video]".to_string(),
            Self::Mention { target } => format!("@{}", target.display_name),
            Self::Reply { .. } => String::new(),
            Self::Json { .. } => "[json]".to_string(),
            Self::Face { face_id, name } => {
                format!("[face:{}]", name.as_deref().unwrap_or(face_id))
            }
        }
    }

    /// The media payload and its MIME category, for media variants.
    pub fn media(&self) -> Option<(&'static str, &MediaMessage)> {
        match self {
            Self::Image(m) => Some(("image", m)),
            Self::Voice(m) => Some(("audio", m)),
            Self::File(m) => Some(("application", m)),
            Self::Video(m) => Some(("video", m)),
            _ => None,
        }
    }
}

/// A chat message flowing between IM adapters and workflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IMMessage {
    pub sender: ChatSender,
    #[serde(default)]
    pub elements: Vec<MessageElement>,
    #[serde(default)]
    pub raw: serde_json::Map<String, serde_json::Value>,
}

impl IMMessage {
    pub fn new(sender: ChatSender, elements: Vec<MessageElement>) -> Self {
        Self {
            sender,
            elements,
            raw: serde_json::Map::new(),
        }
    }

    /// A message holding a single text element.
    pub fn text(sender: ChatSender, text: impl Into<String>) -> Self {
        Self::new(sender, vec![MessageElement::text(text)])
    }

    /// Attach the platform payload this message was converted from.
    pub fn with_raw(mut self, raw: serde_json::Map<String, serde_json::Value>) -> Self {
        self.raw = raw;
        self
    }

    /// Concatenated plain-text rendering of every element.
    pub fn content(&self) -> String {
        self.elements.iter().map(MessageElement::to_plain).collect()
    }

    /// Senders mentioned in this message, in element order.
    pub fn mentions(&self) -> impl Iterator<Item = &ChatSender> {
        self.elements.iter().filter_map(|e| match e {
            MessageElement::Mention { target } => Some(target),
            _ => None,
        })
    }
}
