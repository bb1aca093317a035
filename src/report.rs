//! Report orchestrator – picks HTML, PDF, or paginated PDF and returns the
//! finished artifact.

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::chrome::ChromeEngine;
use crate::config::ForgeConfig;
use crate::context::{ContextRenderer, RenderOptions};
use crate::engine::RenderEngine;
use crate::error::Result;
use crate::page_size::PageSize;
use crate::pdf::PdfRenderer;
use crate::store::TemplateStore;
use crate::templates::TemplateCache;

/// Requested output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Html,
    Pdf,
}

impl FromStr for ReportFormat {
    type Err = std::convert::Infallible;

    /// `"pdf"` (any case) selects PDF; anything else is HTML.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(if s.eq_ignore_ascii_case("pdf") {
            ReportFormat::Pdf
        } else {
            ReportFormat::Html
        })
    }
}

/// A report generation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    pub template: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
    #[serde(default)]
    pub options: Option<RenderOptions>,
}

/// The finished artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Html(String),
    Pdf(Vec<u8>),
}

impl Report {
    pub fn content_type(&self) -> &'static str {
        match self {
            Report::Html(_) => "text/html",
            Report::Pdf(_) => "application/pdf",
        }
    }

    pub fn suggested_filename(&self) -> &'static str {
        match self {
            Report::Html(_) => "report.html",
            Report::Pdf(_) => "report.pdf",
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Report::Html(html) => html.as_bytes(),
            Report::Pdf(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Report::Html(html) => html.into_bytes(),
            Report::Pdf(bytes) => bytes,
        }
    }
}

/// Owns the template cache and the PDF renderer. Construct once and share.
#[derive(Debug)]
pub struct ReportService<E> {
    cache: Arc<TemplateCache>,
    renderer: ContextRenderer,
    pdf: PdfRenderer<E>,
}

impl ReportService<ChromeEngine> {
    /// Service backed by headless Chromium.
    pub fn from_config(config: &ForgeConfig) -> Self {
        Self::new(config, ChromeEngine::new(config.browser.clone()))
    }
}

impl<E: RenderEngine> ReportService<E> {
    pub fn new(config: &ForgeConfig, engine: E) -> Self {
        let cache = Arc::new(TemplateCache::new(TemplateStore::new(
            config.templates_root.clone(),
        )));
        Self {
            renderer: ContextRenderer::new(Arc::clone(&cache)),
            pdf: PdfRenderer::new(engine, config.pagination_script_candidates.clone()),
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<TemplateCache> {
        &self.cache
    }

    pub fn pdf_renderer(&self) -> &PdfRenderer<E> {
        &self.pdf
    }

    /// Template names available in the store, sorted.
    pub async fn list_templates(&self) -> Vec<String> {
        self.cache.store().list().await
    }

    /// Render a template to markup with the caller's options.
    pub async fn generate_html(
        &self,
        template: &str,
        content: &Value,
        config: Option<&Map<String, Value>>,
        options: Option<&RenderOptions>,
    ) -> Result<String> {
        self.renderer.render(template, content, config, options).await
    }

    /// Single-pass PDF of already-rendered markup.
    pub async fn generate_pdf(
        &self,
        html: &str,
        config: Option<&Map<String, Value>>,
    ) -> Result<Vec<u8>> {
        self.pdf.html_to_pdf(html, PageSize::from_config(config)).await
    }

    /// Produce the report for `request` in `format`.
    ///
    /// PDF output is paginated unless the request sets `options.paged` to
    /// `false`. The paginated path always renders the template with
    /// `options.paged = true`.
    pub async fn generate(&self, request: &GenerateRequest, format: ReportFormat) -> Result<Report> {
        let config = request.config.as_ref();
        let options = request.options.clone().unwrap_or_default();
        match format {
            ReportFormat::Html => {
                let html = self
                    .generate_html(&request.template, &request.content, config, Some(&options))
                    .await?;
                Ok(Report::Html(html))
            }
            ReportFormat::Pdf if options.paged == Some(false) => {
                let html = self
                    .generate_html(&request.template, &request.content, config, Some(&options))
                    .await?;
                Ok(Report::Pdf(self.generate_pdf(&html, config).await?))
            }
            ReportFormat::Pdf => {
                let paged = options.with_paged();
                let html = self
                    .generate_html(&request.template, &request.content, config, Some(&paged))
                    .await?;
                let page_size = PageSize::from_config(config);
                log::info!(
                    "Generating paginated PDF for '{}' ({page_size})",
                    request.template
                );
                Ok(Report::Pdf(self.pdf.html_to_pdf_paged(&html, page_size).await?))
            }
        }
    }
}
