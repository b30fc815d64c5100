pub mod codec;
pub mod config;
pub mod ingest;
pub mod templates;

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use codec::{CodecError, ConvertedActivity, convert_track};
use config::CodecConfig;
use ingest::{GpxError, parse_gpx};
use templates::{render_landing_page, render_summary_line};
use thiserror::Error;

/// Largest accepted upload; long GPX tracks easily exceed axum's 2 MB default.
pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;
pub const FIT_CONTENT_TYPE: &str = "application/vnd.ant.fit";
pub const SUMMARY_HEADER: &str = "x-activity-summary";

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error(transparent)]
    Gpx(#[from] GpxError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Parse a GPX upload and convert it into a FIT activity file.
pub fn convert_gpx(bytes: &[u8], config: &CodecConfig) -> Result<ConvertedActivity, ConversionError> {
    let document = parse_gpx(bytes)?;
    Ok(convert_track(&document, config)?)
}

#[derive(Debug, Clone)]
struct AppState {
    codec: Arc<CodecConfig>,
}

pub fn build_app(config: CodecConfig) -> Router {
    Router::new()
        .route("/", get(landing_page))
        .route("/convert", post(handle_convert))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(AppState {
            codec: Arc::new(config),
        })
}

async fn landing_page() -> Html<String> {
    Html(render_landing_page())
}

async fn handle_convert(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut uploaded: Option<(Vec<u8>, Option<String>)> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            let file_name = field.file_name().map(str::to_string);
            match field.bytes().await {
                Ok(bytes) => uploaded = Some((bytes.to_vec(), file_name)),
                Err(err) => {
                    return (
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read uploaded file: {err}"),
                    )
                        .into_response();
                }
            }
        }
    }

    let Some((bytes, file_name)) = uploaded else {
        return (StatusCode::BAD_REQUEST, "No file provided").into_response();
    };

    let config = Arc::clone(&state.codec);
    let converted = tokio::task::spawn_blocking(move || convert_gpx(&bytes, &config)).await;

    match converted {
        Ok(Ok(activity)) => fit_download(activity, file_name.as_deref()),
        Ok(Err(err)) => render_conversion_error(err),
        Err(err) => {
            tracing::error!(error = %err, "conversion task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Conversion failed").into_response()
        }
    }
}

fn fit_download(activity: ConvertedActivity, file_name: Option<&str>) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}.fit\"",
        download_stem(file_name)
    );
    tracing::info!(
        points = activity.summary.point_count,
        sport = activity.summary.sport.as_str(),
        bytes = activity.bytes.len(),
        "served converted activity"
    );

    let mut response = activity.bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(FIT_CONTENT_TYPE));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&render_summary_line(&activity.summary)) {
        headers.insert(SUMMARY_HEADER, value);
    }
    response
}

/// Derive a safe download name from the uploaded file name.
fn download_stem(file_name: Option<&str>) -> String {
    let stem = file_name
        .map(|name| name.rsplit(['/', '\\']).next().unwrap_or(name))
        .map(|name| name.rsplit_once('.').map_or(name, |(stem, _)| stem))
        .unwrap_or_default();
    let cleaned: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect();
    if cleaned.is_empty() {
        "activity".to_string()
    } else {
        cleaned
    }
}

fn render_conversion_error(error: ConversionError) -> Response {
    let status = match &error {
        ConversionError::Gpx(_) => StatusCode::BAD_REQUEST,
        ConversionError::Codec(err) if err.is_input_error() => StatusCode::BAD_REQUEST,
        ConversionError::Codec(CodecError::Encoding { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        ConversionError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!(status = status.as_u16(), error = %error, "rejected upload");
    (status, error.to_string()).into_response()
}
