//! Export of rendered captures.
//!
//! File names follow the host plugin's download naming:
//! `{prefix}_{sender}_{shortId}_{timestamp}.png` when the capture is tied to
//! a message, `{prefix}_{hint}_{isoTimestamp}.png` otherwise. Every
//! component degrades to a fallback instead of failing.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};

use crate::host::MessageMeta;
use crate::rasterizer::RasterImage;
use crate::{Error, Result};

pub const DEFAULT_PREFIX: &str = "SillyTavern";
const SENDER_MAX_CHARS: usize = 20;
const SHORT_ID_CHARS: usize = 5;

/// Message metadata used to name an export
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamingContext {
    pub sender: Option<String>,
    pub id: Option<String>,
    pub timestamp: Option<String>,
    pub is_own_message: bool,
}

impl From<MessageMeta> for NamingContext {
    fn from(meta: MessageMeta) -> Self {
        Self {
            sender: meta.sender,
            id: meta.id,
            timestamp: meta.timestamp,
            is_own_message: meta.is_user,
        }
    }
}

/// Keep only `[A-Za-z0-9_-]`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn iso_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn short_id(id: Option<&str>, now: DateTime<Utc>) -> String {
    let from_id = id
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let chars: Vec<char> = s.chars().collect();
            chars[chars.len().saturating_sub(SHORT_ID_CHARS)..].iter().collect::<String>()
        });
    from_id.unwrap_or_else(|| {
        // `m` plus four digits of the current epoch milliseconds
        let millis = now.timestamp_millis().unsigned_abs().to_string();
        let end = millis.len().saturating_sub(4);
        let start = millis.len().saturating_sub(8);
        format!("m{}", &millis[start..end])
    })
}

fn timestamp_component(timestamp: Option<&str>, now: DateTime<Utc>) -> String {
    let raw = timestamp
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| iso_timestamp(now));
    let mapped: String = raw
        .chars()
        .map(|c| if matches!(c, ':' | 'T' | 'Z' | '.') || c.is_whitespace() { '_' } else { c })
        .collect();
    let mut collapsed = String::with_capacity(mapped.len());
    for c in sanitize(&mapped).chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }
    if collapsed.is_empty() {
        collapsed = sanitize(&iso_timestamp(now).replace([':', '.'], "_"));
    }
    collapsed
}

/// Derive the download file name for a capture.
pub fn derive_filename(prefix: &str, naming: Option<&NamingContext>, hint: &str, now: DateTime<Utc>) -> String {
    let prefix = Some(sanitize(prefix))
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PREFIX.to_string());

    match naming {
        Some(ctx) => {
            let sender = if ctx.is_own_message {
                "User".to_string()
            } else {
                ctx.sender
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .unwrap_or("Character")
                    .to_string()
            };
            let sender: String = sanitize(&sender).chars().take(SENDER_MAX_CHARS).collect();
            let sender = if sender.is_empty() { "Character".to_string() } else { sender };
            format!(
                "{}_{}_{}_{}.png",
                prefix,
                sender,
                short_id(ctx.id.as_deref(), now),
                timestamp_component(ctx.timestamp.as_deref(), now)
            )
        }
        None => {
            let hint = Some(sanitize(hint))
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| "screenshot".to_string());
            let stamp = iso_timestamp(now).replace([':', '.', 'T', 'Z'], "-");
            format!("{}_{}_{}.png", prefix, hint, stamp)
        }
    }
}

/// Where finished downloads go
pub trait DownloadSink: Send + Sync {
    /// Persist `image` under `filename`; returns the name actually used.
    fn deliver(&self, filename: &str, image: &RasterImage) -> Result<String>;
}

impl<S: DownloadSink + ?Sized> DownloadSink for Arc<S> {
    fn deliver(&self, filename: &str, image: &RasterImage) -> Result<String> {
        (**self).deliver(filename, image)
    }
}

/// Writes downloads into a directory. Existing files are never
/// overwritten; duplicates get a numbered suffix.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn free_path(&self, filename: &str) -> PathBuf {
        let first = self.dir.join(filename);
        if !first.exists() {
            return first;
        }
        let stem = filename.strip_suffix(".png").unwrap_or(filename);
        (1..)
            .map(|n| self.dir.join(format!("{}-{}.png", stem, n)))
            .find(|p| !p.exists())
            .unwrap_or(first)
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&self, filename: &str, image: &RasterImage) -> Result<String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::ExportFailure(format!("cannot create {}: {}", self.dir.display(), e)))?;
        let path = self.free_path(filename);
        std::fs::write(&path, &image.png_data)
            .map_err(|e| Error::ExportFailure(format!("cannot write {}: {}", path.display(), e)))?;
        Ok(path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string()))
    }
}

/// Keeps downloads in memory as data URIs
#[derive(Debug, Default)]
pub struct MemorySink {
    downloads: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(filename, data URI)` pairs in delivery order
    pub fn downloads(&self) -> Vec<(String, String)> {
        self.downloads.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl DownloadSink for MemorySink {
    fn deliver(&self, filename: &str, image: &RasterImage) -> Result<String> {
        let mut downloads = self
            .downloads
            .lock()
            .map_err(|_| Error::ExportFailure("download list poisoned".into()))?;
        downloads.push((filename.to_string(), image.to_data_uri()));
        Ok(filename.to_string())
    }
}

/// Names captures and hands them to a sink
pub struct Exporter {
    prefix: String,
    sink: Box<dyn DownloadSink>,
}

impl Exporter {
    pub fn new(prefix: impl Into<String>, sink: Box<dyn DownloadSink>) -> Self {
        Self {
            prefix: prefix.into(),
            sink,
        }
    }

    pub fn export(&self, image: &RasterImage, naming: Option<&NamingContext>, hint: &str) -> Result<String> {
        self.export_at(image, naming, hint, Utc::now())
    }

    pub fn export_at(
        &self,
        image: &RasterImage,
        naming: Option<&NamingContext>,
        hint: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let filename = derive_filename(&self.prefix, naming, hint, now);
        debug!("exporting {}x{} image as {}", image.width, image.height, filename);
        let delivered = self.sink.deliver(&filename, image)?;
        info!("image downloaded as {}", delivered);
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 20, 30).unwrap()
    }

    #[test]
    fn sanitize_keeps_only_safe_characters() {
        let out = sanitize("A/b:c*d");
        assert_eq!(out, "Abcd");
        assert!(out.len() <= "A/b:c*d".len());
        assert!(out.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        assert_eq!(sanitize("名字"), "");
        assert_eq!(sanitize("ok_name-1"), "ok_name-1");
    }

    #[test]
    fn filename_with_naming_context() {
        let ctx = NamingContext {
            sender: Some("  Seraphina the Great Healer  ".into()),
            id: Some("msg-000123".into()),
            timestamp: Some("2024-05-01T10:00:00.000Z".into()),
            is_own_message: false,
        };
        let name = derive_filename("SillyTavern", Some(&ctx), "message", fixed_now());
        assert_eq!(name, "SillyTavern_SeraphinatheGreatHea_00123_2024-05-01_10_00_00_000_.png");
    }

    #[test]
    fn own_messages_are_named_user() {
        let ctx = NamingContext {
            sender: Some("Bob".into()),
            id: Some("7".into()),
            timestamp: Some("May 1, 2024 10:00am".into()),
            is_own_message: true,
        };
        let name = derive_filename("SillyTavern", Some(&ctx), "message", fixed_now());
        assert_eq!(name, "SillyTavern_User_7_May_1_2024_10_00am.png");
    }

    #[test]
    fn missing_fields_degrade_to_fallbacks() {
        let ctx = NamingContext::default();
        let name = derive_filename("SillyTavern", Some(&ctx), "message", fixed_now());
        let millis = fixed_now().timestamp_millis().to_string();
        let digits = &millis[millis.len() - 8..millis.len() - 4];
        assert_eq!(
            name,
            format!("SillyTavern_Character_m{}_2024-05-01_10_20_30_000_.png", digits)
        );

        let unicode = NamingContext {
            sender: Some("小明".into()),
            ..Default::default()
        };
        let name = derive_filename("", Some(&unicode), "message", fixed_now());
        assert!(name.starts_with("SillyTavern_Character_m"));
    }

    #[test]
    fn filename_without_naming_context() {
        let name = derive_filename("SillyTavern", None, "last message!", fixed_now());
        assert_eq!(name, "SillyTavern_lastmessage_2024-05-01-10-20-30-000-.png");
        let name = derive_filename("SillyTavern", None, "???", fixed_now());
        assert!(name.starts_with("SillyTavern_screenshot_"));
    }

    #[test]
    fn directory_sink_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());
        let img = RasterImage::new(1, 1, vec![1, 2, 3]);
        let a = sink.deliver("shot.png", &img).unwrap();
        let b = sink.deliver("shot.png", &img).unwrap();
        assert_eq!(a, "shot.png");
        assert_eq!(b, "shot-1.png");
        assert_eq!(std::fs::read(dir.path().join("shot-1.png")).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn exporter_delivers_to_memory_sink() {
        let sink = Arc::new(MemorySink::new());
        let exporter = Exporter::new(DEFAULT_PREFIX, Box::new(sink.clone()));
        let img = RasterImage::new(1, 1, b"abc".to_vec());
        let name = exporter.export_at(&img, None, "conversation", fixed_now()).unwrap();
        let downloads = sink.downloads();
        assert_eq!(downloads.len(), 1);
        assert_eq!(downloads[0].0, name);
        assert_eq!(downloads[0].1, "data:image/png;base64,YWJj");
    }
}
