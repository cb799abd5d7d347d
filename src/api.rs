use std::{path::Path, sync::Arc};
use anyhow::{Context, Result};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    config::AppCfg,
    database::load_database,
    matcher::{IdentifyError, MatchResult, Matcher},
    pages::{self, Flash},
    store::{self, AddError},
};

#[derive(Clone)]
pub struct AppState {
    cfg: Arc<AppCfg>,
    matcher: Matcher,
}

pub fn router(cfg: AppCfg) -> Router {
    let cfg = Arc::new(cfg);
    let state = AppState { matcher: Matcher::from_cfg(&cfg), cfg: cfg.clone() };

    Router::new()
        .route("/", get(index))
        .route("/about", get(about))
        .route("/identify", post(identify))
        .route("/add", post(add))
        .route("/api/identify", post(api_identify))
        .route("/api/entries", get(list_entries))
        .nest_service("/uploads", ServeDir::new(&cfg.upload_dir))
        .nest_service("/fungi_images", ServeDir::new(&cfg.db_dir))
        .layer(DefaultBodyLimit::max(cfg.max_upload_mb.max(1) * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(cfg: AppCfg) -> Result<()> {
    cfg.ensure_dirs().await?;
    tracing::info!(db_dir = %cfg.db_dir.display(), upload_dir = %cfg.upload_dir.display(), max_hash_diff = cfg.max_hash_diff, "starting");

    let bind = cfg.bind.clone();
    let app = router(cfg);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .context(format!("Failed to bind {bind}"))?;
    tracing::info!("fungid listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index(headers: HeaderMap) -> Response {
    let flash = read_flash(&headers);
    let html = Html(pages::index(flash));
    if flash.is_some() {
        ([(header::SET_COOKIE, "flash=; Path=/; Max-Age=0")], html).into_response()
    } else {
        html.into_response()
    }
}

async fn about() -> Html<String> {
    Html(pages::about())
}

fn read_flash(headers: &HeaderMap) -> Option<Flash> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|kv| kv.trim().strip_prefix("flash="))
        .find_map(Flash::from_code)
}

fn redirect_with_flash(flash: Flash) -> Response {
    let cookie = format!("flash={}; Path=/; Max-Age=60; HttpOnly; SameSite=Lax", flash.code());
    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, "/".to_string()), (header::SET_COOKIE, cookie)],
    )
        .into_response()
}

#[derive(Default)]
struct UploadForm {
    name: Option<String>,
    description: Option<String>,
    image: Option<(String, Vec<u8>)>,
}

async fn read_form(mut mp: Multipart) -> Result<UploadForm, ApiErr> {
    let mut form = UploadForm::default();
    while let Some(field) = mp.next_field().await.map_err(ApiErr::multipart)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(ApiErr::multipart)?;
                form.image = Some((file_name, bytes.to_vec()));
            }
            "name" => form.name = Some(field.text().await.map_err(ApiErr::multipart)?),
            "description" => form.description = Some(field.text().await.map_err(ApiErr::multipart)?),
            _ => {}
        }
    }
    Ok(form)
}

/// Pull the image part out of the form, rejecting absent files and unsupported extensions.
fn take_image(form: &mut UploadForm) -> Result<(String, Vec<u8>), Flash> {
    let (file_name, bytes) = form.image.take().ok_or(Flash::NoFile)?;
    if file_name.is_empty() || bytes.is_empty() {
        return Err(Flash::NoFile);
    }
    if store::allowed_extension(&file_name).is_none() {
        return Err(Flash::BadExtension);
    }
    Ok((file_name, bytes))
}

fn upload_url(path: &Path) -> String {
    let name = path.file_name().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    format!("/uploads/{name}")
}

/// Save the upload and run the match; `Err(Flash)` for problems the user caused.
async fn run_identify(st: &AppState, form: &mut UploadForm) -> Result<Result<(MatchResult, String), Flash>, ApiErr> {
    let (file_name, bytes) = match take_image(form) {
        Ok(v) => v,
        Err(f) => return Ok(Err(f)),
    };
    let saved = store::save_upload(&st.cfg.upload_dir, &file_name, &bytes).await?;
    tracing::info!(upload = %saved.display(), client_name = %file_name, "identify request");

    match st.matcher.identify(&saved).await {
        Ok(res) => {
            tracing::info!(matched = res.matched, score = ?res.score, name = ?res.name, "identify result");
            Ok(Ok((res, upload_url(&saved))))
        }
        Err(IdentifyError::UnreadableUpload(e)) => {
            tracing::warn!(upload = %saved.display(), error = %format!("{e:#}"), "uploaded image unreadable");
            Ok(Err(Flash::Unreadable))
        }
        Err(IdentifyError::Internal(e)) => Err(ApiErr::internal(e)),
    }
}

async fn identify(State(st): State<AppState>, mp: Multipart) -> Result<Response, ApiErr> {
    let mut form = read_form(mp).await?;
    Ok(match run_identify(&st, &mut form).await? {
        Ok((res, uploaded)) => Html(pages::result(&res, &uploaded)).into_response(),
        Err(flash) => redirect_with_flash(flash),
    })
}

#[derive(Serialize)]
struct IdentifyResp {
    #[serde(flatten)]
    result: MatchResult,
    uploaded_image: String,
}

async fn api_identify(State(st): State<AppState>, mp: Multipart) -> Result<Json<IdentifyResp>, ApiErr> {
    let mut form = read_form(mp).await?;
    match run_identify(&st, &mut form).await? {
        Ok((result, uploaded_image)) => Ok(Json(IdentifyResp { result, uploaded_image })),
        Err(flash) => Err(ApiErr::rejected(flash)),
    }
}

async fn add(State(st): State<AppState>, mp: Multipart) -> Result<Response, ApiErr> {
    let mut form = read_form(mp).await?;
    let (file_name, bytes) = match take_image(&mut form) {
        Ok(v) => v,
        Err(f) => return Ok(redirect_with_flash(f)),
    };
    let name = form.name.unwrap_or_default();
    let description = form.description.unwrap_or_default();

    let flash = match store::add_entry(&st.cfg.db_dir, &name, &description, &file_name, &bytes).await {
        Ok(_) => Flash::Added,
        Err(AddError::BadName) => Flash::BadName,
        Err(AddError::BadExtension) => Flash::BadExtension,
        Err(AddError::NotAnImage) => Flash::NotImage,
        Err(AddError::Io(e)) => return Err(ApiErr::internal(e)),
    };
    Ok(redirect_with_flash(flash))
}

#[derive(Serialize)]
struct EntryItem { name: String, image: String, has_description: bool }

async fn list_entries(State(st): State<AppState>) -> Json<Vec<EntryItem>> {
    let items = load_database(&st.cfg.db_dir)
        .await
        .into_iter()
        .map(|e| EntryItem { image: e.image_url(), has_description: e.has_description(), name: e.name })
        .collect();
    Json(items)
}

#[derive(Debug)]
struct ApiErr {
    status: StatusCode,
    code: String,
    message: String,
    suggestion: Option<String>,
}

impl ApiErr {
    fn internal(e: impl std::fmt::Display) -> Self {
        tracing::error!("internal error: {e}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error".to_string(),
            message: format!("Internal error: {}", e),
            suggestion: None,
        }
    }

    fn multipart(e: MultipartError) -> Self {
        Self {
            status: e.status(),
            code: "bad_multipart".to_string(),
            message: e.body_text(),
            suggestion: None,
        }
    }

    fn rejected(flash: Flash) -> Self {
        let (status, suggestion) = match flash {
            Flash::Unreadable => (StatusCode::UNPROCESSABLE_ENTITY, Some("Upload a valid JPEG or PNG photo.".to_string())),
            Flash::BadExtension => (StatusCode::BAD_REQUEST, Some("Accepted extensions: .jpg, .jpeg, .png".to_string())),
            _ => (StatusCode::BAD_REQUEST, None),
        };
        Self {
            status,
            code: flash.code().to_string(),
            message: flash.message().to_string(),
            suggestion,
        }
    }
}

impl<E: Into<anyhow::Error>> From<E> for ApiErr {
    fn from(e: E) -> Self {
        Self::internal(format!("{:#}", e.into()))
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> axum::response::Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            code: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            suggestion: Option<String>,
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code,
                suggestion: self.suggestion,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn flash_cookie_is_parsed_among_others() {
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_static("theme=dark; flash=bad_extension; x=1"));
        assert_eq!(read_flash(&h), Some(Flash::BadExtension));

        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_static("flash="));
        assert_eq!(read_flash(&h), None);
    }

    #[test]
    fn take_image_validates() {
        let mut f = UploadForm::default();
        assert_eq!(take_image(&mut f).unwrap_err(), Flash::NoFile);

        let mut f = UploadForm { image: Some((String::new(), vec![])), ..Default::default() };
        assert_eq!(take_image(&mut f).unwrap_err(), Flash::NoFile);

        let mut f = UploadForm { image: Some(("x.bmp".into(), vec![1])), ..Default::default() };
        assert_eq!(take_image(&mut f).unwrap_err(), Flash::BadExtension);

        let mut f = UploadForm { image: Some(("x.JPG".into(), vec![1])), ..Default::default() };
        assert_eq!(take_image(&mut f).unwrap().0, "x.JPG");
    }

    #[test]
    fn redirect_sets_cookie() {
        let resp = redirect_with_flash(Flash::Added);
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/");
        assert!(resp.headers()[header::SET_COOKIE].to_str().unwrap().starts_with("flash=added;"));
    }
}
