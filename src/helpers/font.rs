use lopdf::{Object, Stream, dictionary};
use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use ttf_parser::Face;

use crate::error::EnvelopeError;

pub const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/opentype/ipafont-gothic/ipag.ttf";

/// Where the CJK typeface may come from, tried in order.
#[derive(Debug, Clone)]
pub struct FontSettings {
    pub path: Option<PathBuf>,
    pub url: Option<String>,
    pub cache_dir: PathBuf,
}

impl Default for FontSettings {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from(DEFAULT_FONT_PATH)),
            url: None,
            cache_dir: PathBuf::from(".font-cache"),
        }
    }
}

/// The typeface handed to the composer. Loaded once, then shared read-only.
#[derive(Debug, Clone)]
pub enum Typeface {
    Embedded(EmbeddedFont),
    /// Built-in Helvetica. Text outside Latin-1 cannot be shown.
    Fallback { warning: String },
}

impl Typeface {
    pub fn fallback(reason: impl Into<String>) -> Self {
        Typeface::Fallback {
            warning: reason.into(),
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            Typeface::Embedded(_) => None,
            Typeface::Fallback { warning } => Some(warning),
        }
    }
}

/// A TrueType font kept in memory together with the metrics the PDF font
/// descriptor needs, scaled to 1000 units per em.
///
/// The `FontFile2` stream is deflated once on load; every composed sheet
/// embeds a copy of it as is.
#[derive(Clone)]
pub struct EmbeddedFont {
    pub name: String,
    data: Arc<[u8]>,
    font_file: Arc<Stream>,
    pub ascent: i64,
    pub descent: i64,
    pub cap_height: i64,
    pub bbox: [i64; 4],
    units_per_em: u16,
}

impl fmt::Debug for EmbeddedFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedFont")
            .field("name", &self.name)
            .field("size", &self.data.len())
            .field("units_per_em", &self.units_per_em)
            .finish_non_exhaustive()
    }
}

impl EmbeddedFont {
    /// Only single-face TrueType files can be embedded as `FontFile2`, so
    /// collections and CFF-flavoured OpenType are rejected here.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, EnvelopeError> {
        if let Some(count) = ttf_parser::fonts_in_collection(&data) {
            return Err(EnvelopeError::Font(format!(
                "font collection with {} faces cannot be embedded, use a single .ttf",
                count
            )));
        }

        let data: Arc<[u8]> = Arc::from(data);
        let face = Face::parse(&data, 0)
            .map_err(|e| EnvelopeError::Font(format!("unreadable font file: {}", e)))?;

        if face.tables().glyf.is_none() {
            return Err(EnvelopeError::Font(
                "font has no TrueType outlines (glyf table), CFF fonts cannot be embedded"
                    .to_string(),
            ));
        }

        if face.glyph_index('年').is_none() {
            warn!("Typeface has no glyph for 年, Japanese text may not render");
        }

        let units_per_em = face.units_per_em();
        let scale = |v: i16| i64::from(v) * 1000 / i64::from(units_per_em.max(1));
        let bbox = face.global_bounding_box();
        let name = face
            .names()
            .into_iter()
            .filter(|n| n.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
            .find_map(|n| n.to_string())
            .map(|n| sanitize_font_name(&n))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "EmbeddedCJK".to_string());
        let ascent = scale(face.ascender());
        let descent = scale(face.descender());
        let cap_height = scale(face.capital_height().unwrap_or(face.ascender()));
        let bbox = [
            scale(bbox.x_min),
            scale(bbox.y_min),
            scale(bbox.x_max),
            scale(bbox.y_max),
        ];

        let mut font_file = Stream::new(
            dictionary! {
                "Length1" => Object::Integer(data.len() as i64),
            },
            data.to_vec(),
        );
        font_file.compress()?;

        Ok(Self {
            name,
            data,
            font_file: Arc::new(font_file),
            ascent,
            descent,
            cap_height,
            bbox,
            units_per_em,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The deflated `FontFile2` stream, ready to add to a document.
    pub fn font_file(&self) -> &Stream {
        &self.font_file
    }

    pub fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    pub fn face(&self) -> Result<Face<'_>, EnvelopeError> {
        Face::parse(&self.data, 0).map_err(|e| EnvelopeError::Font(e.to_string()))
    }
}

/// PDF names cannot carry whitespace or delimiters.
fn sanitize_font_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_graphic() && !"()<>[]{}/%#".contains(*c))
        .collect()
}

/// Resolves the typeface once at start-up: a local file first, then a cached
/// or freshly downloaded copy of the remote font. Never fails, falling back
/// to Helvetica with a warning.
pub async fn resolve_typeface(client: &Client, settings: &FontSettings) -> Typeface {
    let mut reasons = Vec::new();

    if let Some(path) = &settings.path {
        match load_font_file(path).await {
            Ok(font) => {
                info!("Loaded typeface {} from {}", font.name, path.display());
                return Typeface::Embedded(font);
            }
            Err(e) => {
                warn!("Could not load typeface from {}: {}", path.display(), e);
                reasons.push(format!("{}: {}", path.display(), e));
            }
        }
    }

    if let Some(url) = &settings.url {
        match fetch_cached_font(client, url, &settings.cache_dir).await {
            Ok(font) => {
                info!("Loaded typeface {} from {}", font.name, url);
                return Typeface::Embedded(font);
            }
            Err(e) => {
                error!("Could not fetch typeface from {}: {}", url, e);
                reasons.push(format!("{}: {}", url, e));
            }
        }
    }

    let warning = if reasons.is_empty() {
        "no Japanese typeface configured, using Helvetica".to_string()
    } else {
        format!(
            "Japanese typeface not found ({}), using Helvetica",
            reasons.join("; ")
        )
    };
    warn!("{}", warning);
    Typeface::fallback(warning)
}

pub async fn load_font_file(path: &Path) -> Result<EmbeddedFont, EnvelopeError> {
    let data = tokio::fs::read(path).await?;
    EmbeddedFont::from_bytes(data)
}

async fn fetch_cached_font(
    client: &Client,
    url: &str,
    cache_dir: &Path,
) -> Result<EmbeddedFont, EnvelopeError> {
    let cached = cache_dir.join(cache_file_name(url));

    if tokio::fs::try_exists(&cached).await.unwrap_or(false) {
        info!("Using cached typeface at {}", cached.display());
        return load_font_file(&cached).await;
    }

    info!("Downloading typeface from {}", url);
    let response = client.get(url).send().await?.error_for_status()?;
    let data = response.bytes().await?.to_vec();
    info!("Downloaded typeface, size: {} bytes", data.len());

    let font = EmbeddedFont::from_bytes(data)?;
    tokio::fs::create_dir_all(cache_dir).await?;
    tokio::fs::write(&cached, font.data()).await?;
    info!("Cached typeface at {}", cached.display());

    Ok(font)
}

fn cache_file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or("");
    if name.is_empty() {
        "typeface.ttf".to_string()
    } else {
        name.to_string()
    }
}

/// Standard Helvetica advance widths for ASCII 32..=126, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0..9
    278, 278, 584, 584, 584, 556, 1015, // :..@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A..M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N..Z
    278, 278, 278, 469, 556, 333, // [..`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a..m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n..z
    334, 260, 334, 584, // {..~
];

pub fn helvetica_width(byte: u8) -> u16 {
    match byte {
        32..=126 => HELVETICA_WIDTHS[usize::from(byte - 32)],
        _ => 556,
    }
}

/// Maps a character onto WinAnsiEncoding, which matches Latin-1 for the
/// printable ranges.
pub fn win_ansi_byte(ch: char) -> u8 {
    match u32::from(ch) {
        code @ (0x20..=0x7e | 0xa0..=0xff) => code as u8,
        _ => b'?',
    }
}
