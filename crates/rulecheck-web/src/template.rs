use axum::response::Html;

const INDEX_HTML: &str = include_str!("../templates/index.html");

/// Render the upload form.
pub fn render_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
