use axum::{
    extract::{Multipart, State},
    http::{header, Method},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    error::AppError,
    models::{CorrelationReport, UploadedFile},
    services::{heatmap::render_svg, pipeline::CorrelationRequest},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/correlate", post(correlate))
        .route("/correlate/heatmap", post(correlate_heatmap))
        .layer(cors)
}

/// Collects the upload form: `files` parts, optional `columns`, `compute` flag.
///
/// No `columns` part means the default selection. A blank one is an explicit
/// empty selection, unless `all_columns` is also set.
async fn read_request(mut multipart: Multipart) -> Result<CorrelationRequest, AppError> {
    let mut request = CorrelationRequest::default();
    let mut all_columns = false;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "files" | "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                if file_name.is_empty() {
                    // Browsers send an empty part when no file was picked.
                    if data.is_empty() {
                        continue;
                    }
                    return Err(AppError::InvalidInput("file part without a filename".to_string()));
                }
                tracing::debug!("Received {} ({}KB)", file_name, data.len() / 1024);
                request.files.push(UploadedFile::new(file_name, data));
            }
            "columns" => {
                let text = field.text().await?;
                let names = text
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                request.selected.get_or_insert_with(Vec::new).extend(names);
            }
            "all_columns" => all_columns = is_checked(&field.text().await?),
            "compute" => request.compute = is_checked(&field.text().await?),
            other => tracing::debug!("Ignoring multipart field {:?}", other),
        }
    }

    if all_columns && request.selected.as_ref().is_some_and(Vec::is_empty) {
        request.selected = None;
    }
    Ok(request)
}

fn is_checked(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "on" | "yes"
    )
}

async fn run_pipeline(
    state: Arc<AppState>,
    request: CorrelationRequest,
) -> Result<CorrelationReport, AppError> {
    let start = std::time::Instant::now();
    let file_count = request.files.len();

    let report = tokio::task::spawn_blocking(move || state.pipeline.run(&request))
        .await
        .map_err(|e| AppError::Internal(format!("pipeline task failed: {}", e)))?;

    tracing::info!(
        "Processed {} file(s) in {:?} with {} notice(s)",
        file_count,
        start.elapsed(),
        report.notices.len()
    );
    Ok(report)
}

async fn correlate(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<CorrelationReport>, AppError> {
    let request = read_request(multipart).await?;
    tracing::info!(
        "Correlate request: {} file(s), selection {:?}, compute={}",
        request.files.len(),
        request.selected,
        request.compute
    );

    Ok(Json(run_pipeline(state, request).await?))
}

async fn correlate_heatmap(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut request = read_request(multipart).await?;
    request.compute = true;

    let report = run_pipeline(state, request).await?;
    match report.correlation.as_ref() {
        Some(section) => Ok((
            [(header::CONTENT_TYPE, "image/svg+xml")],
            render_svg(&section.heatmap)?,
        )
            .into_response()),
        None => {
            let reason = report
                .blocking_notice()
                .map(|n| n.message.clone())
                .unwrap_or_else(|| "no files were uploaded".to_string());
            Err(AppError::NothingToRender(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::TOO_FEW_COLUMNS_WARNING;
    use crate::routes::router;
    use axum::{body::Body, http::{Request, StatusCode}};
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "correlate-test-boundary";

    enum Part<'a> {
        File(&'a str, &'a str),
        Text(&'a str, &'a str),
    }

    fn multipart_body(parts: &[Part]) -> Body {
        let mut body = String::new();
        for part in parts {
            body.push_str(&format!("--{}\r\n", BOUNDARY));
            match part {
                Part::File(name, content) => {
                    body.push_str(&format!(
                        "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\nContent-Type: text/csv\r\n\r\n{}\r\n",
                        name, content
                    ));
                }
                Part::Text(name, value) => {
                    body.push_str(&format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                        name, value
                    ));
                }
            }
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        Body::from(body)
    }

    fn post(uri: &str, parts: &[Part]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(multipart_body(parts))
            .unwrap()
    }

    fn app() -> Router {
        router(Arc::new(AppState::new(Config::default())))
    }

    async fn json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const A_CSV: &str = "Date,Temp\n2024-01-01,10\n2024-01-02,12\n2024-01-03,15";
    const B_CSV: &str = "date, Humidity\n2024-01-01,80\n2024-01-02,70\n2024-01-03,65";

    #[tokio::test]
    async fn health_is_ok() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn upload_form_is_served() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("Show Correlation Matrix"));
    }

    #[tokio::test]
    async fn correlate_returns_matrix_and_pairs() {
        let request = post(
            "/correlate",
            &[
                Part::File("a.csv", A_CSV),
                Part::File("b.csv", B_CSV),
                Part::Text("columns", "temp, humidity"),
                Part::Text("compute", "true"),
            ],
        );
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["merged"]["row_count"], 3);
        assert_eq!(body["merged"]["columns"], serde_json::json!(["date", "temp", "humidity"]));
        assert_eq!(body["correlation"]["matrix"]["columns"], serde_json::json!(["temp", "humidity"]));
        assert_eq!(body["correlation"]["significant_pairs"].as_array().unwrap().len(), 1);
        assert_eq!(body["correlation"]["heatmap"]["cells"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn without_compute_only_previews_are_returned() {
        let request = post("/correlate", &[Part::File("a.csv", A_CSV), Part::File("b.csv", B_CSV)]);
        let body = json(app().oneshot(request).await.unwrap()).await;

        assert_eq!(body["files"].as_array().unwrap().len(), 2);
        assert_eq!(body["numeric_columns"], serde_json::json!(["temp", "humidity"]));
        assert!(body["correlation"].is_null());
    }

    #[tokio::test]
    async fn heatmap_renders_svg() {
        let request = post("/correlate/heatmap", &[Part::File("a.csv", A_CSV), Part::File("b.csv", B_CSV)]);
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/svg+xml");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("temp - humidity: "));
    }

    #[tokio::test]
    async fn heatmap_with_one_column_reports_the_warning() {
        let request = post(
            "/correlate/heatmap",
            &[Part::File("a.csv", A_CSV), Part::Text("columns", "temp")],
        );
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json(response).await;
        assert!(body["error"].as_str().unwrap().contains(TOO_FEW_COLUMNS_WARNING));
    }

    #[tokio::test]
    async fn blank_columns_is_an_empty_selection() {
        let request = post(
            "/correlate",
            &[
                Part::File("a.csv", A_CSV),
                Part::File("b.csv", B_CSV),
                Part::Text("columns", ""),
                Part::Text("compute", "true"),
            ],
        );
        let body = json(app().oneshot(request).await.unwrap()).await;

        assert!(body["correlation"].is_null());
        assert_eq!(body["selected_columns"], serde_json::json!([]));
        assert_eq!(body["notices"][0]["message"], TOO_FEW_COLUMNS_WARNING);
    }

    #[tokio::test]
    async fn all_columns_flag_fills_a_blank_selection() {
        let request = post(
            "/correlate",
            &[
                Part::File("a.csv", A_CSV),
                Part::File("b.csv", B_CSV),
                Part::Text("columns", " "),
                Part::Text("all_columns", "on"),
                Part::Text("compute", "on"),
            ],
        );
        let body = json(app().oneshot(request).await.unwrap()).await;

        assert_eq!(body["selected_columns"], serde_json::json!(["temp", "humidity"]));
        assert_eq!(body["correlation"]["matrix"]["columns"], serde_json::json!(["temp", "humidity"]));
    }

    #[tokio::test]
    async fn nameless_file_part_is_rejected() {
        let request = post("/correlate", &[Part::File("", "date,x\n2024-01-01,1")]);
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
