//! Upload relay: browser multipart form in, Bot API `sendPhoto`/`sendDocument` out.

use axum::extract::{Multipart, State};
use axum::Json;
use tracing::{debug, info, warn};

use super::error::ApiError;
use super::protocol::MessageResponse;
use super::AppState;
use crate::config::non_blank;
use crate::telegram::{FileUpload, PlatformError, SendKind, UploadTarget};

const DEFAULT_FILE_NAME: &str = "upload";
const DEFAULT_MIME: &str = "application/octet-stream";

/// Fields of the upload form; overrides are `None` when absent or blank
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<FileUpload>,
    token: Option<String>,
    chat_id: Option<String>,
    caption: Option<String>,
}

impl UploadForm {
    async fn read(multipart: &mut Multipart) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::Validation(format!("Invalid form data: {}", e)))?
        {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "file" => {
                    let file_name = field
                        .file_name()
                        .filter(|f| !f.is_empty())
                        .unwrap_or(DEFAULT_FILE_NAME)
                        .to_string();
                    let mime_type = field.content_type().unwrap_or(DEFAULT_MIME).to_string();
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::Validation(format!("Failed to read file: {}", e)))?;
                    // Browsers send an empty part when no file was picked
                    if !data.is_empty() {
                        form.file = Some(FileUpload {
                            file_name,
                            mime_type,
                            data,
                        });
                    }
                }
                "token" | "chatid" | "caption" => {
                    let value = field.text().await.map_err(|e| {
                        ApiError::Validation(format!("Invalid field {}: {}", name, e))
                    })?;
                    let value = non_blank(Some(value));
                    match name.as_str() {
                        "token" => form.token = value,
                        "chatid" => form.chat_id = value,
                        _ => form.caption = value,
                    }
                }
                other => debug!(field = other, "Ignoring unknown form field"),
            }
        }

        Ok(form)
    }
}

/// Upload failures are reported as 400 or 500 only; the upload page has
/// no retry handling, so a flood wait is shown as a platform rejection
fn upload_error(err: PlatformError) -> ApiError {
    match err {
        PlatformError::RateLimited(wait) => ApiError::Upstream(format!(
            "Too Many Requests: retry after {}",
            wait.as_secs()
        )),
        other => other.into(),
    }
}

/// `POST /api/upload`
pub async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<MessageResponse>, ApiError> {
    let form = UploadForm::read(&mut multipart).await?;

    let token = form.token.or_else(|| state.settings.bot_token.clone());
    let chat_id = form.chat_id.or_else(|| state.settings.chat_id.clone());
    let (Some(token), Some(chat_id)) = (token, chat_id) else {
        return Err(ApiError::Validation("Missing Bot Token or Chat ID.".to_string()));
    };

    let Some(upload) = form.file else {
        return Err(ApiError::Validation("No file was provided.".to_string()));
    };

    let kind = SendKind::for_mime(&upload.mime_type);
    let target = UploadTarget { token, chat_id };
    let file_name = upload.file_name.clone();

    let sent = match state
        .platform
        .send_file(&target, upload, form.caption, kind)
        .await
    {
        Ok(sent) => sent,
        Err(e) => {
            warn!(file = %file_name, error = %e, "Upload rejected");
            return Err(upload_error(e));
        }
    };

    if state.settings.is_default_target(&target) {
        if let Some(metadata) = sent.metadata {
            state.recent.record(metadata);
        }
    }

    info!(file = %file_name, message_id = sent.message_id, "Upload relayed");
    Ok(Json(MessageResponse::success("✅ Upload successful!")))
}
