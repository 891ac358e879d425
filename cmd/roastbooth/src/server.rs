//! HTTP server for the booth front end.
//!
//! API endpoints:
//! - GET  /api/people       - [{id, name}]
//! - GET  /api/people/full  - [{id, name, annotations}]
//! - POST /api/people       - multipart name + photos, enrolls a person
//! - POST /api/annotations  - form person_id + text
//! - POST /api/identify     - multipart frame, streams audio/mpeg or a JSON outcome
//! - GET  /                 - Static files, when a directory is configured

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Form, Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use roastbooth_gallery::{GalleryError, PersonId};
use roastbooth_pipeline::{FailureKind, Outcome, Pipeline};
use serde::Deserialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

/// Uploads carry full-resolution photos.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Builds the router. Static files are served as the fallback when
/// `static_dir` exists.
pub fn router(pipeline: Arc<Pipeline>, static_dir: Option<PathBuf>) -> Router {
    let state = AppState { pipeline };

    let mut app = Router::new()
        .route("/api/people", get(list_people).post(create_person))
        .route("/api/people/full", get(list_people_full))
        .route("/api/annotations", post(create_annotation))
        .route("/api/identify", post(identify))
        .with_state(state);

    if let Some(dir) = static_dir {
        if dir.exists() {
            app = app.fallback_service(ServeDir::new(dir));
        } else {
            warn!(dir = %dir.display(), "static dir not found");
        }
    }

    app.layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serves `app` on `addr` until the process is stopped.
pub async fn serve(addr: &str, app: Router) -> Result<()> {
    let addr = parse_addr(addr)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "server started");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Parses an address, treating ":port" as every interface.
fn parse_addr(addr: &str) -> Result<SocketAddr> {
    let addr = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    Ok(addr.parse()?)
}

// ============================================================================
// Errors
// ============================================================================

enum ApiError {
    BadRequest(String),
    Gallery(GalleryError),
    Internal(String),
}

impl From<GalleryError> for ApiError {
    fn from(e: GalleryError) -> Self {
        ApiError::Gallery(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Gallery(e) => {
                let status = match &e {
                    GalleryError::NotFound(_) => StatusCode::NOT_FOUND,
                    e if e.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::BAD_REQUEST,
                };
                if status == StatusCode::SERVICE_UNAVAILABLE {
                    warn!(error = %e, "gallery unavailable");
                }
                (status, e.to_string())
            }
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ============================================================================
// Gallery handlers
// ============================================================================

async fn list_people(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.pipeline.gallery().list_people()?))
}

async fn list_people_full(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.pipeline.gallery().people_with_annotations()?))
}

async fn create_person(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut name = String::new();
    let mut photos: Vec<Bytes> = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("name") => name = field.text().await?.trim().to_string(),
            Some("photos") => photos.push(field.bytes().await?),
            _ => {}
        }
    }

    let gallery = state.pipeline.gallery().clone();
    let id = tokio::task::spawn_blocking(move || gallery.enroll(&name, &photos))
        .await
        .map_err(|e| ApiError::Internal(format!("enroll task failed: {e}")))??;

    Ok(Json(json!({
        "id": id,
        "message": "Roastee created successfully",
    })))
}

#[derive(Deserialize)]
struct AnnotationForm {
    person_id: PersonId,
    text: String,
}

async fn create_annotation(
    State(state): State<AppState>,
    Form(form): Form<AnnotationForm>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .pipeline
        .gallery()
        .add_annotation(form.person_id, form.text.trim())?;
    Ok(Json(json!({ "message": "Roast added successfully" })))
}

// ============================================================================
// Identification
// ============================================================================

async fn identify(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut frame = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("frame") {
            frame = Some(field.bytes().await?);
        }
    }
    let frame = match frame {
        Some(f) if !f.is_empty() => f,
        _ => return Err(ApiError::BadRequest("missing frame".to_string())),
    };

    let run = state.pipeline.run(frame).await;
    Ok(outcome_response(run.outcome))
}

fn outcome_response(outcome: Outcome) -> Response {
    let status = match &outcome {
        Outcome::Failed {
            kind: FailureKind::StorageUnavailable,
            ..
        } => StatusCode::SERVICE_UNAVAILABLE,
        Outcome::Failed {
            kind: FailureKind::NoFaceDetected,
            ..
        } => StatusCode::OK,
        Outcome::Failed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    };
    if let Some(report) = outcome.report() {
        return (status, Json(report)).into_response();
    }

    let Outcome::Audio {
        person,
        media_type,
        stream,
        ..
    } = outcome
    else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    (
        [
            (header::CONTENT_TYPE, media_type),
            (header::CACHE_CONTROL, "no-store".to_string()),
            (
                header::HeaderName::from_static("x-roastee-id"),
                person.id.to_string(),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use reqwest::multipart::{Form as MultipartForm, Part};
    use roastbooth_facematch::{
        EmbedError, EmbeddingMatcher, FaceEmbedder, IdentificationPolicy, MatcherConfig,
    };
    use roastbooth_gallery::{GalleryStore, KVError, KVResult, KVStore};
    use roastbooth_roast::{
        AudioStream, GeneratedText, GenerationRequest, ProviderError, SpeechSynthesizer,
        TextGenerator,
    };
    use serde_json::Value;

    use super::*;

    struct CoordEmbedder;

    #[async_trait]
    impl FaceEmbedder for CoordEmbedder {
        async fn embed(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
            let text =
                std::str::from_utf8(image).map_err(|e| EmbedError::Model(e.to_string()))?;
            if text == "noface" {
                return Err(EmbedError::NoFace);
            }
            text.split(',')
                .map(|v| v.trim().parse::<f32>().map_err(|e| EmbedError::Model(e.to_string())))
                .collect()
        }

        fn model(&self) -> &str {
            "coord"
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl FaceEmbedder for DownEmbedder {
        async fn embed(&self, _: &[u8]) -> Result<Vec<f32>, EmbedError> {
            Err(EmbedError::Unavailable("connection refused".into()))
        }

        fn model(&self) -> &str {
            "down"
        }
    }

    /// A store that cannot be read or written.
    struct DownStore;

    impl KVStore for DownStore {
        fn get(&self, _: &str) -> KVResult<Option<Vec<u8>>> {
            Err(KVError::Storage("disk unavailable".into()))
        }

        fn set(&self, _: &str, _: &[u8]) -> KVResult<()> {
            Err(KVError::Storage("disk unavailable".into()))
        }

        fn scan(&self, _: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
            Err(KVError::Storage("disk unavailable".into()))
        }

        fn batch_set(&self, _: &[(&str, &[u8])]) -> KVResult<()> {
            Err(KVError::Storage("disk unavailable".into()))
        }
    }

    struct FixedGenerator(Result<String, ProviderError>);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _: &GenerationRequest) -> Result<GeneratedText, ProviderError> {
            self.0.clone().map(|text| GeneratedText {
                text,
                model: "fixed".into(),
            })
        }
    }

    struct ChunkSynthesizer;

    #[async_trait]
    impl SpeechSynthesizer for ChunkSynthesizer {
        async fn synthesize(&self, _: &str) -> Result<AudioStream, ProviderError> {
            Ok(Box::pin(futures::stream::iter(vec![
                Ok(Bytes::from_static(b"ID3")),
                Ok(Bytes::from_static(b"-frame1")),
                Ok(Bytes::from_static(b"-frame2")),
            ])))
        }
    }

    struct TestServer {
        base: String,
        client: reqwest::Client,
        gallery: Arc<GalleryStore>,
    }

    impl TestServer {
        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }
    }

    async fn spawn_with(generator: FixedGenerator) -> TestServer {
        spawn_over(GalleryStore::in_memory(), Arc::new(CoordEmbedder), generator).await
    }

    async fn spawn_over(
        gallery: GalleryStore,
        embedder: Arc<dyn FaceEmbedder>,
        generator: FixedGenerator,
    ) -> TestServer {
        let gallery = Arc::new(gallery);
        let matcher = EmbeddingMatcher::new(gallery.clone(), embedder, MatcherConfig { workers: 2 });
        let pipeline = Pipeline::new(
            gallery.clone(),
            Arc::new(matcher),
            IdentificationPolicy::default(),
            Arc::new(generator),
            Arc::new(ChunkSynthesizer),
        );
        let app = router(Arc::new(pipeline), None);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            gallery,
        }
    }

    async fn spawn() -> TestServer {
        spawn_with(FixedGenerator(Ok("You call that a haircut?".into()))).await
    }

    fn frame(data: &str) -> MultipartForm {
        MultipartForm::new().part(
            "frame",
            Part::bytes(data.as_bytes().to_vec()).file_name("frame.jpg"),
        )
    }

    #[tokio::test]
    async fn list_people_starts_empty() {
        let srv = spawn().await;
        let resp = srv.client.get(srv.url("/api/people")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.json::<Value>().await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn enroll_then_annotate_then_list_full() {
        let srv = spawn().await;

        let form = MultipartForm::new()
            .text("name", "Alice")
            .part("photos", Part::bytes(b"1,0".to_vec()).file_name("a.jpg"))
            .part("photos", Part::bytes(b"0.9,0.1".to_vec()).file_name("b.jpg"));
        let resp = srv
            .client
            .post(srv.url("/api/people"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let id = resp.json::<Value>().await.unwrap()["id"].as_u64().unwrap();
        assert_eq!(srv.gallery.images_of(id).unwrap().len(), 2);

        let resp = srv
            .client
            .post(srv.url("/api/annotations"))
            .form(&[("person_id", id.to_string()), ("text", "loud laugh".to_string())])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = srv
            .client
            .get(srv.url("/api/people/full"))
            .send()
            .await
            .unwrap();
        assert_eq!(
            resp.json::<Value>().await.unwrap(),
            json!([{"id": id, "name": "Alice", "annotations": ["loud laugh"]}])
        );
    }

    #[tokio::test]
    async fn enroll_without_photos_is_bad_request() {
        let srv = spawn().await;
        let resp = srv
            .client
            .post(srv.url("/api/people"))
            .multipart(MultipartForm::new().text("name", "Alice"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(srv.gallery.list_people().unwrap().is_empty());
    }

    #[tokio::test]
    async fn annotate_unknown_person_is_not_found() {
        let srv = spawn().await;
        let resp = srv
            .client
            .post(srv.url("/api/annotations"))
            .form(&[("person_id", "42"), ("text", "hello")])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn identify_streams_audio() {
        let srv = spawn().await;
        srv.gallery.enroll("Alice", &[b"1,0".to_vec()]).unwrap();

        let resp = srv
            .client
            .post(srv.url("/api/identify"))
            .multipart(frame("1,0.1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(resp.headers()["x-roastee-id"], "1");
        assert_eq!(&resp.bytes().await.unwrap()[..], b"ID3-frame1-frame2");
    }

    #[tokio::test]
    async fn identify_against_empty_gallery_reports_no_match() {
        let srv = spawn().await;
        let resp = srv
            .client
            .post(srv.url("/api/identify"))
            .multipart(frame("1,0"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["outcome"], "no_match");
        assert_eq!(body["message"], "No matching roastee found");
    }

    #[tokio::test]
    async fn identify_without_face_reports_no_face() {
        let srv = spawn().await;
        srv.gallery.enroll("Alice", &[b"1,0".to_vec()]).unwrap();
        let resp = srv
            .client
            .post(srv.url("/api/identify"))
            .multipart(frame("noface"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.json::<Value>().await.unwrap()["outcome"], "no_face");
    }

    #[tokio::test]
    async fn identify_generator_outage_is_bad_gateway() {
        let srv = spawn_with(FixedGenerator(Err(ProviderError::Unavailable(
            "HTTP 500".into(),
        ))))
        .await;
        srv.gallery.enroll("Alice", &[b"1,0".to_vec()]).unwrap();
        let resp = srv
            .client
            .post(srv.url("/api/identify"))
            .multipart(frame("1,0"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["outcome"], "provider_unavailable");
        assert_eq!(body["retryable"], true);
    }

    #[tokio::test]
    async fn identify_with_unreadable_gallery_is_unavailable() {
        let srv = spawn_over(
            GalleryStore::new(Box::new(DownStore)),
            Arc::new(CoordEmbedder),
            FixedGenerator(Ok("unused".into())),
        )
        .await;
        let resp = srv
            .client
            .post(srv.url("/api/identify"))
            .multipart(frame("1,0"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["outcome"], "storage_unavailable");
        assert_eq!(body["retryable"], true);

        let resp = srv.client.get(srv.url("/api/people")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn identify_embedder_outage_is_bad_gateway() {
        let srv = spawn_over(
            GalleryStore::in_memory(),
            Arc::new(DownEmbedder),
            FixedGenerator(Ok("unused".into())),
        )
        .await;
        srv.gallery.enroll("Alice", &[b"1,0".to_vec()]).unwrap();
        let resp = srv
            .client
            .post(srv.url("/api/identify"))
            .multipart(frame("1,0"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["outcome"], "provider_unavailable");
        assert_eq!(body["retryable"], true);
    }

    #[tokio::test]
    async fn identify_without_frame_is_bad_request() {
        let srv = spawn().await;
        let resp = srv
            .client
            .post(srv.url("/api/identify"))
            .multipart(MultipartForm::new().text("other", "x"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn parse_addr_variants() {
        assert_eq!(
            parse_addr(":8080").unwrap(),
            "0.0.0.0:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_addr("127.0.0.1:9000").unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_addr("nonsense").is_err());
    }
}
