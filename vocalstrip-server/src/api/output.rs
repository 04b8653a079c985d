//! Static serving of published results under `/out`

use std::path::Path;

use axum::http::{header, HeaderValue};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::AppState;

pub const OUTPUT_CACHE_CONTROL: &str = "public, max-age=3600";

pub fn output_routes(out_dir: &Path) -> Router<AppState> {
    let files = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static(OUTPUT_CACHE_CONTROL),
        ))
        .service(ServeDir::new(out_dir));

    Router::new().nest_service("/out", files)
}
