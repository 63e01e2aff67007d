use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::FormRejection;
use axum::extract::{DefaultBodyLimit, Form, Multipart, Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use docx_from_html::{build_blocks, html_to_docx, BorderSpec, DocxError, DocxOptions, ImageData};
use html_prep::{
    prepare_html, prepare_markdown, render_page, PageOptions, PrepOptions, Prepared, TableStyle,
};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tokio::task::JoinError;

use crate::config::{Config, Engine};
use crate::error::ServiceError;
use crate::filename::{content_disposition, sanitize_filename};
use crate::pandoc::{Pandoc, PandocOptions};

const DOCX_TYPE: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const HTML_TYPE: &str = "text/html; charset=utf-8";

pub struct AppState {
    pub engine: Engine,
    pub pandoc: Pandoc,
    pub border: BorderSpec,
    pub api_key: Option<String>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let mut pandoc = Pandoc::new(
            config.pandoc.clone(),
            Duration::from_secs(config.pandoc_timeout_secs),
        );
        pandoc.reference_doc = config.reference_doc.clone();
        Self {
            engine: config.engine,
            pandoc,
            border: config.border_color.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api_key = state.api_key.clone();
    let limit = state.max_body_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/convert/", post(convert_legacy))
        .route("/convert/html", post(convert_html))
        .route("/convert/markdown", post(convert_markdown))
        .route("/render/html", post(render_html))
        .route("/convert/cover", post(convert_cover))
        .layer(DefaultBodyLimit::max(limit))
        .layer(middleware::from_fn(move |req: Request, next: Next| {
            let key = api_key.clone();
            api_key_middleware(req, next, key)
        }))
        .with_state(Arc::new(state))
}

async fn api_key_middleware(
    req: Request,
    next: Next,
    expected_key: Option<String>,
) -> Result<Response, ServiceError> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }
    let Some(expected) = expected_key else {
        return Ok(next.run(req).await);
    };
    let provided = req.headers().get("X-API-Key").and_then(|v| v.to_str().ok());
    match provided {
        Some(key) if bool::from(key.as_bytes().ct_eq(expected.as_bytes())) => {
            Ok(next.run(req).await)
        }
        _ => Err(ServiceError::Unauthorized),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ConvertForm {
    pub html: Option<String>,
    pub markdown: Option<String>,
    pub filename: Option<String>,
    pub title: Option<String>,
    pub toc: Option<String>,
    pub borders: Option<String>,
    pub engine: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum SourceKind {
    Html,
    Markdown,
    Either,
}

enum Source {
    Html(String),
    Markdown(String),
}

struct Job {
    source: Source,
    filename: Option<String>,
    title: Option<String>,
    toc: bool,
    borders: bool,
    engine: Engine,
    cover: Option<ImageData>,
}

fn is_truthy(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "on" | "yes"
    )
}

fn flag(v: Option<&str>, default: bool) -> bool {
    match v.map(str::trim) {
        None | Some("") => default,
        Some(s) => is_truthy(s),
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

impl ConvertForm {
    fn set(&mut self, name: &str, value: String) {
        let slot = match name {
            "html" => &mut self.html,
            "markdown" => &mut self.markdown,
            "filename" => &mut self.filename,
            "title" => &mut self.title,
            "toc" => &mut self.toc,
            "borders" => &mut self.borders,
            "engine" => &mut self.engine,
            _ => {
                tracing::debug!(field = name, "ignoring unknown form field");
                return;
            }
        };
        *slot = Some(value);
    }

    fn into_job(self, kind: SourceKind, default_engine: Engine) -> Result<Job, ServiceError> {
        let source = match kind {
            SourceKind::Html => non_blank(self.html)
                .map(Source::Html)
                .ok_or_else(|| ServiceError::MissingInput("html".to_string()))?,
            SourceKind::Markdown => non_blank(self.markdown)
                .map(Source::Markdown)
                .ok_or_else(|| ServiceError::MissingInput("markdown".to_string()))?,
            SourceKind::Either => non_blank(self.markdown)
                .map(Source::Markdown)
                .or_else(|| non_blank(self.html).map(Source::Html))
                .ok_or_else(|| ServiceError::MissingInput("markdown or html".to_string()))?,
        };
        let engine = match self.engine.as_deref().map(str::trim) {
            None | Some("") => default_engine,
            Some(name) => Engine::parse(name)
                .ok_or_else(|| ServiceError::BadRequest(format!("unknown engine {name:?}")))?,
        };
        Ok(Job {
            source,
            filename: self.filename,
            title: non_blank(self.title).map(|t| t.trim().to_string()),
            toc: flag(self.toc.as_deref(), false),
            borders: flag(self.borders.as_deref(), true),
            engine,
            cover: None,
        })
    }
}

fn prepare(job: &Job, border: &BorderSpec) -> Prepared {
    let opts = PrepOptions {
        table_style: job.borders.then(|| TableStyle {
            border_color: format!("#{}", border.color),
            ..TableStyle::default()
        }),
        ..PrepOptions::default()
    };
    match &job.source {
        Source::Html(html) => prepare_html(html, &opts),
        Source::Markdown(md) => prepare_markdown(md, &opts),
    }
}

fn builtin_docx(job: Job, border: &BorderSpec) -> Result<Vec<u8>, ServiceError> {
    let prepared = prepare(&job, border);
    let opts = DocxOptions {
        title: job.title,
        toc: job.toc,
        cover: job.cover,
        table_borders: job.borders.then(|| border.clone()),
        ..DocxOptions::default()
    };
    Ok(html_to_docx(&prepared.nodes, &opts)?)
}

/// Prepared HTML for pandoc; input that lowers to nothing is rejected here
/// as it is by the builtin engine.
fn pandoc_input(job: Job, border: &BorderSpec) -> Result<(Job, String), ServiceError> {
    let prepared = prepare(&job, border);
    if build_blocks(&prepared.nodes).is_empty() {
        return Err(DocxError::Empty.into());
    }
    Ok((job, prepared.html))
}

fn join_error(e: JoinError) -> ServiceError {
    ServiceError::Internal(format!("conversion task failed: {e}"))
}

async fn write_docx(state: &AppState, job: Job) -> Result<Vec<u8>, ServiceError> {
    let started = Instant::now();
    let engine = job.engine;
    let border = state.border.clone();
    let bytes = match engine {
        Engine::Builtin => tokio::task::spawn_blocking(move || builtin_docx(job, &border))
            .await
            .map_err(join_error)??,
        Engine::Pandoc => {
            let (job, html) = tokio::task::spawn_blocking(move || pandoc_input(job, &border))
                .await
                .map_err(join_error)??;
            let opts = PandocOptions {
                title: job.title.as_deref(),
                toc: job.toc,
                cover: job.cover.as_ref(),
            };
            state.pandoc.html_to_docx(&html, &opts).await?
        }
    };
    tracing::info!(
        engine = ?engine,
        bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "converted"
    );
    Ok(bytes)
}

fn attachment(
    body: Vec<u8>,
    content_type: &'static str,
    filename: &str,
) -> Result<Response, ServiceError> {
    let disposition = HeaderValue::from_str(&content_disposition(filename))
        .map_err(|e| ServiceError::Internal(e.to_string()))?;
    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    Ok((headers, body).into_response())
}

fn read_form(form: Result<Form<ConvertForm>, FormRejection>) -> Result<ConvertForm, ServiceError> {
    form.map(|Form(f)| f)
        .map_err(|e| ServiceError::Rejected(e.status(), e.body_text()))
}

async fn docx_response(state: &AppState, job: Job) -> Result<Response, ServiceError> {
    let name = sanitize_filename(job.filename.as_deref(), "docx");
    let bytes = write_docx(state, job).await?;
    attachment(bytes, DOCX_TYPE, &name)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let pandoc = state.pandoc.version().await;
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "engine": state.engine,
        "pandoc": pandoc,
    }))
}

/// Form field `html` in, `converted.docx` out.
#[tracing::instrument(name = "convert", skip_all)]
async fn convert_legacy(
    State(state): State<Arc<AppState>>,
    form: Result<Form<ConvertForm>, FormRejection>,
) -> Result<Response, ServiceError> {
    let mut job = read_form(form)?.into_job(SourceKind::Html, state.engine)?;
    job.filename = None;
    docx_response(&state, job).await
}

#[tracing::instrument(name = "convert_html", skip_all)]
async fn convert_html(
    State(state): State<Arc<AppState>>,
    form: Result<Form<ConvertForm>, FormRejection>,
) -> Result<Response, ServiceError> {
    let job = read_form(form)?.into_job(SourceKind::Html, state.engine)?;
    docx_response(&state, job).await
}

#[tracing::instrument(name = "convert_markdown", skip_all)]
async fn convert_markdown(
    State(state): State<Arc<AppState>>,
    form: Result<Form<ConvertForm>, FormRejection>,
) -> Result<Response, ServiceError> {
    let job = read_form(form)?.into_job(SourceKind::Markdown, state.engine)?;
    docx_response(&state, job).await
}

#[tracing::instrument(name = "render_html", skip_all)]
async fn render_html(
    State(state): State<Arc<AppState>>,
    form: Result<Form<ConvertForm>, FormRejection>,
) -> Result<Response, ServiceError> {
    let job = read_form(form)?.into_job(SourceKind::Either, state.engine)?;
    let prepared = prepare(&job, &state.border);
    let page = render_page(
        &prepared,
        &PageOptions {
            title: job.title.clone(),
            toc: job.toc,
        },
    );
    tracing::info!(bytes = page.len(), headings = prepared.headings.len(), "rendered html");
    let name = sanitize_filename(job.filename.as_deref(), "html");
    attachment(page.into_bytes(), HTML_TYPE, &name)
}

/// Multipart: text fields as for the form routes plus a `cover` image file.
#[tracing::instrument(name = "convert_cover", skip_all)]
async fn convert_cover(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ServiceError> {
    let mut multipart = multipart.map_err(|e| ServiceError::Rejected(e.status(), e.body_text()))?;
    let mut form = ConvertForm::default();
    let mut cover: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::Rejected(e.status(), e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "cover" {
            let data = field
                .bytes()
                .await
                .map_err(|e| ServiceError::Rejected(e.status(), e.body_text()))?;
            cover = Some(data.to_vec());
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ServiceError::Rejected(e.status(), e.body_text()))?;
            form.set(&name, value);
        }
    }

    let cover = cover
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ServiceError::MissingInput("cover".to_string()))?;
    let cover = ImageData::from_bytes(cover).map_err(|e| ServiceError::InvalidCover(e.to_string()))?;
    tracing::debug!(width = cover.width_px, height = cover.height_px, "cover accepted");

    let mut job = form.into_job(SourceKind::Either, state.engine)?;
    job.cover = Some(cover);
    docx_response(&state, job).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, Bytes};
    use axum::http::{HeaderMap, Request as HttpRequest, StatusCode};
    use base64::Engine as _;
    use http_body_util::BodyExt;
    use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
    use tower::ServiceExt;

    const PNG_1X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    fn test_state() -> AppState {
        AppState {
            engine: Engine::Builtin,
            pandoc: Pandoc::new("/nonexistent/pandoc-binary", Duration::from_secs(5)),
            border: BorderSpec::default(),
            api_key: None,
            max_body_bytes: 1024 * 1024,
        }
    }

    fn form_request(uri: &str, pairs: &[(&str, &str)]) -> HttpRequest<Body> {
        let body = pairs
            .iter()
            .map(|(k, v)| format!("{k}={}", utf8_percent_encode(v, NON_ALPHANUMERIC)))
            .collect::<Vec<_>>()
            .join("&");
        HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    fn multipart_request(parts: &[(&str, Option<&str>, &[u8])]) -> HttpRequest<Body> {
        let boundary = "XBOUNDARYX";
        let mut body: Vec<u8> = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match filename {
                Some(f) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        HttpRequest::builder()
            .method("POST")
            .uri("/convert/cover")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(state: AppState, req: HttpRequest<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let resp = router(state).oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    fn error_message(body: &Bytes) -> String {
        let v: serde_json::Value = serde_json::from_slice(body).unwrap();
        v["error"].as_str().unwrap().to_string()
    }

    fn png() -> Vec<u8> {
        base64::engine::general_purpose::STANDARD.decode(PNG_1X1).unwrap()
    }

    #[tokio::test]
    async fn health_reports_status_without_pandoc() {
        let req = HttpRequest::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::OK);
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["status"], "ok");
        assert_eq!(v["engine"], "builtin");
        assert!(v["pandoc"].is_null());
    }

    #[tokio::test]
    async fn legacy_route_returns_converted_docx() {
        let req = form_request(
            "/convert/",
            &[("html", "<h1>Hi</h1><p></p><table><tr><td>1</td></tr></table>"), ("filename", "ignored")],
        );
        let (status, headers, body) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], DOCX_TYPE);
        assert!(headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("filename=\"converted.docx\""));
        assert!(body.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn markdown_route_uses_sanitized_filename() {
        let req = form_request(
            "/convert/markdown",
            &[("markdown", "# Report\n\n- a\n- b\n"), ("filename", "../My Report.docx"), ("toc", "yes")],
        );
        let (status, headers, body) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("filename=\"My_Report.docx\""));
        assert!(body.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn missing_input_is_bad_request() {
        let req = form_request("/convert/html", &[("html", "   ")]);
        let (status, _, body) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_message(&body), "missing input: html");

        let req = form_request("/convert/markdown", &[("html", "<p>x</p>")]);
        let (status, _, _) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_engine_is_rejected() {
        let req = form_request("/convert/html", &[("html", "<p>x</p>"), ("engine", "word")]);
        let (status, _, body) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error_message(&body).contains("unknown engine"));
    }

    #[tokio::test]
    async fn render_html_returns_styled_page() {
        let req = form_request(
            "/render/html",
            &[
                ("markdown", "# Intro\n\n| a | b |\n|---|---|\n| 1 | 2 |\n"),
                ("title", "Notes"),
                ("toc", "1"),
                ("filename", "notes"),
            ],
        );
        let (status, headers, body) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], HTML_TYPE);
        assert!(headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("filename=\"notes.html\""));
        let page = String::from_utf8(body.to_vec()).unwrap();
        assert!(page.contains("<title>Notes</title>"));
        assert!(page.contains("<nav class=\"toc\">"));
        assert!(page.contains("border:1px solid #D9D9D9"));
        assert!(page.contains("<thead>"));
    }

    #[tokio::test]
    async fn render_html_without_borders() {
        let req = form_request(
            "/render/html",
            &[("html", "<table><tr><td>1</td></tr></table>"), ("borders", "false")],
        );
        let (status, _, body) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::OK);
        let page = String::from_utf8(body.to_vec()).unwrap();
        assert!(!page.contains("border=\"1\""));
    }

    #[tokio::test]
    async fn api_key_guards_everything_but_health() {
        let keyed = || AppState {
            api_key: Some("s3cret".to_string()),
            ..test_state()
        };

        let req = form_request("/convert/html", &[("html", "<p>x</p>")]);
        let (status, _, _) = send(keyed(), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut req = form_request("/convert/html", &[("html", "<p>x</p>")]);
        req.headers_mut()
            .insert("X-API-Key", HeaderValue::from_static("s3cret"));
        let (status, _, _) = send(keyed(), req).await;
        assert_eq!(status, StatusCode::OK);

        let req = HttpRequest::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(keyed(), req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn pandoc_engine_without_binary_is_unavailable() {
        let req = form_request("/convert/html", &[("html", "<p>x</p>"), ("engine", "pandoc")]);
        let (status, _, body) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(error_message(&body).starts_with("pandoc is not available"));
    }

    #[tokio::test]
    async fn pandoc_engine_rejects_empty_input_before_spawning() {
        let req = form_request(
            "/convert/html",
            &[("html", "<p>&nbsp;</p>"), ("engine", "pandoc")],
        );
        let (status, _, body) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_message(&body), DocxError::Empty.to_string());
    }

    #[tokio::test]
    async fn api_key_of_different_length_is_rejected() {
        for key in ["s3cre", "s3cret!", ""] {
            let state = AppState {
                api_key: Some("s3cret".to_string()),
                ..test_state()
            };
            let mut req = form_request("/convert/html", &[("html", "<p>x</p>")]);
            req.headers_mut()
                .insert("X-API-Key", HeaderValue::from_str(key).unwrap());
            let (status, _, _) = send(state, req).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{key:?}");
        }
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let state = AppState {
            max_body_bytes: 64,
            ..test_state()
        };
        let big = "x".repeat(1024);
        let req = form_request("/convert/html", &[("html", &big)]);
        let (status, _, _) = send(state, req).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn cover_route_accepts_png() {
        let cover = png();
        let req = multipart_request(&[
            ("markdown", None, b"# With cover\n\nbody".as_slice()),
            ("title", None, b"Covered".as_slice()),
            ("cover", Some("cover.png"), cover.as_slice()),
        ]);
        let (status, headers, body) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], DOCX_TYPE);
        assert!(body.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn cover_route_validates_cover() {
        let req = multipart_request(&[
            ("markdown", None, b"# Doc".as_slice()),
            ("cover", Some("cover.png"), b"not an image".as_slice()),
        ]);
        let (status, _, body) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(error_message(&body).starts_with("invalid cover image"));

        let req = multipart_request(&[("markdown", None, b"# Doc".as_slice())]);
        let (status, _, body) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_message(&body), "missing input: cover");
    }
}
