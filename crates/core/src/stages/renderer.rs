//! Default HTML renderer.

use async_trait::async_trait;

use crate::worker::StageError;

use super::traits::{GeneratedArticle, SiteRenderer};

/// Renders an article into a self-contained HTML page.
///
/// Static-site build tools slot in behind the same trait; this built-in
/// keeps the pipeline runnable end to end without one.
pub struct HtmlRenderer;

impl HtmlRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl SiteRenderer for HtmlRenderer {
    fn name(&self) -> &str {
        "html"
    }

    async fn render(&self, article: &GeneratedArticle) -> Result<String, StageError> {
        if article.slug.is_empty() {
            return Err(StageError::Render("article has no slug".to_string()));
        }

        let mut paragraphs = String::new();
        for block in article.body.split("\n\n") {
            let block = block.trim();
            if block.is_empty() {
                continue;
            }
            if let Some(heading) = block.strip_prefix("## ") {
                paragraphs.push_str(&format!("    <h2>{}</h2>\n", escape(heading)));
            } else {
                paragraphs.push_str(&format!("    <p>{}</p>\n", escape(block)));
            }
        }

        Ok(format!(
            "<!doctype html>\n<html>\n<head>\n  <meta charset=\"utf-8\">\n  <title>{title}</title>\n  <meta name=\"description\" content=\"{summary}\">\n</head>\n<body>\n  <article id=\"{slug}\">\n    <h1>{title}</h1>\n{paragraphs}  </article>\n</body>\n</html>\n",
            title = escape(&article.title),
            summary = escape(&article.summary),
            slug = escape(&article.slug),
            paragraphs = paragraphs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> GeneratedArticle {
        GeneratedArticle {
            slug: "digest-abc".to_string(),
            title: "Weekly digest".to_string(),
            summary: "Things happened".to_string(),
            body: "## First\n\nalpha body\n\n## Second\n\nbeta body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_renders_title_and_sections() {
        let renderer = HtmlRenderer::new();
        let html = renderer.render(&article()).await.unwrap();

        assert!(html.contains("<title>Weekly digest</title>"));
        assert!(html.contains("<h2>First</h2>"));
        assert!(html.contains("<p>beta body</p>"));
        assert!(html.contains("id=\"digest-abc\""));
    }

    #[tokio::test]
    async fn test_escapes_markup_in_content() {
        let renderer = HtmlRenderer::new();
        let mut a = article();
        a.body = "<script>alert(1)</script>".to_string();

        let html = renderer.render(&a).await.unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn test_deterministic_output() {
        let renderer = HtmlRenderer::new();
        let a = renderer.render(&article()).await.unwrap();
        let b = renderer.render(&article()).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_missing_slug_is_rejected() {
        let renderer = HtmlRenderer::new();
        let mut a = article();
        a.slug = String::new();

        let result = renderer.render(&a).await;
        assert!(matches!(result, Err(StageError::Render(_))));
    }
}
