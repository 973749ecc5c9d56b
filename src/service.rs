use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::{
    error::EnvelopeError,
    helpers::{
        font::Typeface,
        pdf::{PDF_MIME, compose, suggested_filename},
        roster_csv::{self, CSV_MIME, EXPORT_FILENAME},
    },
    models::{
        layout::LayoutPreset,
        roster::{MemberRecord, RosterConfiguration, sample_roster, validate_members},
    },
};

pub const TYPEFACE_WARNING_HEADER: &str = "x-typeface-warning";

/// Configuration for the envelope service
#[derive(Clone, Debug, Default)]
pub struct EnvelopeConfig {
    pub settings: RosterConfiguration,
    pub preset: LayoutPreset,
}

/// Sheet settings as edited through the API.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SheetSettings {
    #[serde(flatten)]
    pub roster: RosterConfiguration,
    #[serde(default)]
    pub preset: LayoutPreset,
}

/// The editable state behind the service: the current roster and the
/// settings the next sheet is composed with.
#[derive(Debug, Clone)]
pub struct RosterSession {
    pub members: Vec<MemberRecord>,
    pub settings: RosterConfiguration,
    pub preset: LayoutPreset,
}

impl RosterSession {
    /// A fresh session seeded with the sample roster.
    pub fn new(config: &EnvelopeConfig) -> Self {
        Self {
            members: sample_roster(config.settings.default_fee),
            settings: config.settings.clone(),
            preset: config.preset,
        }
    }

    /// Replaces the roster only when the whole CSV is valid.
    pub fn import_csv(&mut self, data: &[u8]) -> Result<usize, EnvelopeError> {
        let members = roster_csv::import_roster(data)?;
        self.members = members;
        Ok(self.members.len())
    }

    pub fn replace_members(&mut self, members: Vec<MemberRecord>) -> Result<(), EnvelopeError> {
        validate_members(&members)?;
        self.members = members;
        Ok(())
    }

    pub fn update_settings(&mut self, settings: SheetSettings) -> Result<(), EnvelopeError> {
        settings.roster.validate()?;
        self.settings = settings.roster;
        self.preset = settings.preset;
        Ok(())
    }

    pub fn sheet_settings(&self) -> SheetSettings {
        SheetSettings {
            roster: self.settings.clone(),
            preset: self.preset,
        }
    }

    /// Composes the sheet for the current roster. An empty roster is refused
    /// before any layout work happens.
    pub fn compose(&self, typeface: &Typeface) -> Result<Vec<u8>, EnvelopeError> {
        if self.members.is_empty() {
            return Err(EnvelopeError::EmptyRoster);
        }
        compose(
            &self.members,
            &self.settings,
            self.preset.geometry(),
            typeface,
        )
    }
}

/// The envelope service: owns the roster session and the typeface, and
/// serves roster editing, CSV import/export and the PDF download.
#[derive(Clone)]
pub struct EnvelopeService {
    pub typeface: Arc<Typeface>,
    pub session: Arc<RwLock<RosterSession>>,
}

impl EnvelopeService {
    /// Create a new envelope service instance
    pub fn new(typeface: Typeface, config: EnvelopeConfig) -> Self {
        info!("Creating new EnvelopeService instance");
        if let Some(warning) = typeface.warning() {
            warn!("Envelopes will use the fallback typeface: {}", warning);
        }
        Self {
            typeface: Arc::new(typeface),
            session: Arc::new(RwLock::new(RosterSession::new(&config))),
        }
    }

    /// Create an Axum router for the envelope service
    pub fn router(self) -> Router {
        info!("Creating envelope service router");
        let shared_state = Arc::new(self);

        Router::new()
            .route("/roster", get(get_roster).put(put_roster))
            .route("/roster/import", post(import_roster))
            .route("/roster/export", get(export_roster))
            .route("/settings", get(get_settings).put(put_settings))
            .route("/envelopes", post(create_envelopes))
            .with_state(shared_state)
    }

    /// Render the current session into a PDF. Layout and serialization are
    /// CPU-bound, so they run on the blocking pool over a session snapshot.
    pub async fn create_envelopes(&self) -> Result<(String, Vec<u8>), EnvelopeError> {
        let session = self.session.read().await.clone();
        let members = session.members.len();
        let filename = suggested_filename(session.settings.fiscal_year);

        let typeface = Arc::clone(&self.typeface);
        let pdf = tokio::task::spawn_blocking(move || session.compose(&typeface)).await??;

        info!(
            "Created envelope PDF for {} member(s), size: {} bytes",
            members,
            pdf.len()
        );
        Ok((filename, pdf))
    }
}

impl IntoResponse for EnvelopeError {
    fn into_response(self) -> Response {
        let status = if self.is_input_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let message = match &self {
            EnvelopeError::EmptyRoster => "no data: the roster is empty".to_string(),
            other => other.to_string(),
        };
        (status, message).into_response()
    }
}

fn attachment_headers(content_type: &'static str, filename: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers
}

// Route handlers
async fn get_roster(State(service): State<Arc<EnvelopeService>>) -> Json<Vec<MemberRecord>> {
    Json(service.session.read().await.members.clone())
}

async fn put_roster(
    State(service): State<Arc<EnvelopeService>>,
    Json(members): Json<Vec<MemberRecord>>,
) -> Result<StatusCode, EnvelopeError> {
    info!("Replacing roster with {} member(s)", members.len());
    service
        .session
        .write()
        .await
        .replace_members(members)
        .inspect_err(|e| warn!("Rejected roster edit: {}", e))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn import_roster(
    State(service): State<Arc<EnvelopeService>>,
    body: Bytes,
) -> Result<String, EnvelopeError> {
    info!("Received roster CSV, size: {} bytes", body.len());
    match service.session.write().await.import_csv(&body) {
        Ok(count) => {
            info!("Roster replaced with {} imported member(s)", count);
            Ok(format!("imported {} member(s)", count))
        }
        Err(e) => {
            warn!("Roster import rejected, keeping previous roster: {}", e);
            Err(e)
        }
    }
}

async fn export_roster(
    State(service): State<Arc<EnvelopeService>>,
) -> Result<(HeaderMap, Vec<u8>), EnvelopeError> {
    let members = service.session.read().await.members.clone();
    let csv = roster_csv::export_roster(&members)?;
    Ok((attachment_headers(CSV_MIME, EXPORT_FILENAME), csv))
}

async fn get_settings(State(service): State<Arc<EnvelopeService>>) -> Json<SheetSettings> {
    Json(service.session.read().await.sheet_settings())
}

async fn put_settings(
    State(service): State<Arc<EnvelopeService>>,
    Json(settings): Json<SheetSettings>,
) -> Result<Json<SheetSettings>, EnvelopeError> {
    let mut session = service.session.write().await;
    session.update_settings(settings)?;
    info!(
        "Settings updated: fiscal year {}, default fee {}, preset {}",
        session.settings.fiscal_year, session.settings.default_fee, session.preset
    );
    Ok(Json(session.sheet_settings()))
}

async fn create_envelopes(
    State(service): State<Arc<EnvelopeService>>,
) -> Result<(HeaderMap, Vec<u8>), EnvelopeError> {
    info!("Processing envelope PDF request");

    match service.create_envelopes().await {
        Ok((filename, pdf)) => {
            let mut headers = attachment_headers(PDF_MIME, &filename);
            if let Some(warning) = service.typeface.warning() {
                // header values must be visible ASCII
                let ascii: String = warning
                    .chars()
                    .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '?' })
                    .collect();
                if let Ok(value) = HeaderValue::from_str(&ascii) {
                    headers.insert(TYPEFACE_WARNING_HEADER, value);
                }
            }
            Ok((headers, pdf))
        }
        Err(EnvelopeError::EmptyRoster) => {
            warn!("Envelope PDF requested for an empty roster");
            Err(EnvelopeError::EmptyRoster)
        }
        Err(e) => {
            error!("Failed to create envelope PDF: {}", e);
            Err(e)
        }
    }
}
