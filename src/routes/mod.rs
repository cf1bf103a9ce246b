use std::sync::Arc;
use axum::{extract::DefaultBodyLimit, response::Html, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod correlate;

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Multi-Correlate Data Analysis</title></head>
<body>
<h1>Multi-Correlate Data Analysis</h1>
<p>Upload multiple files to combine them for analysis.</p>
<form method="post" enctype="multipart/form-data">
  <p><label>Upload your files (CSV/Excel)
    <input type="file" name="files" accept=".csv,.xlsx" multiple></label></p>
  <p><label>Variables for correlation analysis (comma separated)
    <input type="text" name="columns" size="60"></label></p>
  <p><label><input type="checkbox" name="all_columns" value="on" checked>
    Use every numeric column when the list is blank</label></p>
  <input type="hidden" name="compute" value="true">
  <button type="submit" formaction="/correlate/heatmap">Show Correlation Matrix</button>
  <button type="submit" formaction="/correlate">Show Report (JSON)</button>
</form>
</body>
</html>
"#;

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_request_size;

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .merge(correlate::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_check() -> &'static str {
    "OK"
}
