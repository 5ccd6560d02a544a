use crate::{
    engine::InfernumEngine,
    messages::{AnswerResponse, ErrorResponse, StatusResponse},
    model::{InfernumModel, VqaRequest, VqaResponse},
};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;

/// Name of the multipart text field carrying the question.
pub const QUESTION_FIELD: &str = "question";
/// Name of the multipart file field carrying the picture.
pub const IMAGE_FIELD: &str = "image";

pub const HEALTH_MESSAGE: &str = "Vision AI service is running";

/// Any model the http layer can serve.
pub trait VqaModel:
    InfernumModel<Request = VqaRequest, Response = VqaResponse> + Send + 'static
{
}

impl<M> VqaModel for M where
    M: InfernumModel<Request = VqaRequest, Response = VqaResponse> + Send + 'static
{
}

/// Every way a request can fail, mapped onto a status code and `{"error": ...}`.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Missing 'question' parameter")]
    MissingQuestion,

    #[error("Missing 'image' file")]
    MissingImage,

    #[error("Invalid multipart payload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    Inference(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingQuestion | ApiError::MissingImage => StatusCode::BAD_REQUEST,
            // 400 for a broken stream, 413 once the body limit is hit
            ApiError::Multipart(e) => e.status(),
            ApiError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.to_string();

        if status.is_server_error() {
            log::error!("Request failed: {error}");
        } else {
            log::warn!("Rejected request: {error}");
        }

        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Build the application router around an already running engine.
///
/// # Arguments
///
/// * `engine` - The engine holding the loaded model
/// * `max_upload_bytes` - The largest request body accepted on the upload route
pub fn router<M: VqaModel>(engine: Arc<InfernumEngine<M>>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(|| async { HEALTH_MESSAGE }))
        .route("/status", get(get_status::<M>))
        .route(
            "/vision-ai",
            post(post_vision_ai::<M>).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(engine)
}

async fn get_status<M: VqaModel>(
    State(engine): State<Arc<InfernumEngine<M>>>,
) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: engine.state().as_str().to_string(),
    })
}

async fn post_vision_ai<M: VqaModel>(
    State(engine): State<Arc<InfernumEngine<M>>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let request = match multipart {
        Ok(multipart) => read_form(multipart).await?,
        Err(rejection) => {
            // not a form at all, so neither field can be present
            log::debug!("Body is not a multipart form: {rejection}");
            return Err(ApiError::MissingQuestion);
        }
    };

    log::debug!(
        "Answering {:?} about a {} byte image",
        request.question,
        request.image.len()
    );

    let reply = engine
        .infer(request)
        .await
        .map_err(|e| ApiError::Inference(e.to_string()))?;

    Ok(Json(AnswerResponse {
        answer: reply.response.answer,
    }))
}

/// Collect the question and the image out of the form, ignoring unknown fields.
///
/// The question must be a plain text part and the image a file part with a non-empty
/// file name; a part with the right name but the wrong kind does not count. Both fields
/// are read before validating so the question is always reported first, whatever their
/// order in the body.
async fn read_form(mut multipart: Multipart) -> Result<VqaRequest, ApiError> {
    let mut question = None;
    let mut image = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        let is_file = field.file_name().is_some();
        let has_file_name = field.file_name().is_some_and(|f| !f.is_empty());

        match name.as_deref() {
            Some(QUESTION_FIELD) if !is_file => question = Some(field.text().await?),
            Some(IMAGE_FIELD) if has_file_name => image = Some(field.bytes().await?),
            other => log::debug!("Ignoring form field {other:?} (file: {is_file})"),
        }
    }

    let question = question
        .filter(|q| !q.is_empty())
        .ok_or(ApiError::MissingQuestion)?;
    // an empty upload is still an upload, decoding reports it
    let image = image.ok_or(ApiError::MissingImage)?;

    Ok(VqaRequest {
        question,
        image: image.to_vec(),
    })
}
