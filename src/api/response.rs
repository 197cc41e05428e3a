use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use pulldown_cmark::{html, Options, Parser};
use serde::Serialize;

use crate::error::ErrorCategory;

/// Flat JSON envelope: `{status, ...data, message?, category?, timestamp}`.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    pub timestamp: String,
}

pub fn success<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (
        StatusCode::OK,
        Json(ApiResponse {
            status: "success",
            data: Some(data),
            message: None,
            category: None,
            timestamp: Utc::now().to_rfc3339(),
        }),
    )
}

pub fn error<T>(status: StatusCode, category: ErrorCategory, message: String) -> (StatusCode, Json<ApiResponse<T>>) {
    (
        status,
        Json(ApiResponse {
            status: "error",
            data: None,
            message: Some(message),
            category: Some(category),
            timestamp: Utc::now().to_rfc3339(),
        }),
    )
}

/// Renders summary Markdown for display.
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, Parser::new_ext(markdown, options));
    out
}
