//! Context renderer – runs a compiled template against
//! `{content, config, options}`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::templates::TemplateCache;

/// Rendering hints visible to templates as `options.*`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    /// Pagination mode. `None` means the caller did not say.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paged: Option<bool>,
    /// Render only the cover page.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cover_only: bool,
    /// Render only the body, without the cover.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub body_only: bool,
}

impl RenderOptions {
    pub fn paged() -> Self {
        Self {
            paged: Some(true),
            ..Self::default()
        }
    }

    /// Same options with pagination forced on.
    pub fn with_paged(&self) -> Self {
        Self {
            paged: Some(true),
            ..self.clone()
        }
    }
}

/// The value a template is rendered against.
#[derive(Debug, Clone, Serialize)]
pub struct RenderContext<'a> {
    pub content: &'a Value,
    pub config: Map<String, Value>,
    pub options: RenderOptions,
}

/// Renders named templates to markup. Holds a handle to the shared cache.
#[derive(Debug, Clone)]
pub struct ContextRenderer {
    cache: Arc<TemplateCache>,
}

impl ContextRenderer {
    pub fn new(cache: Arc<TemplateCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<TemplateCache> {
        &self.cache
    }

    /// Render `template` to markup.
    ///
    /// `config` is copied into the context, so nothing a template does can
    /// reach the caller's map. Rendering always re-executes; only
    /// compilation is cached.
    pub async fn render(
        &self,
        template: &str,
        content: &Value,
        config: Option<&Map<String, Value>>,
        options: Option<&RenderOptions>,
    ) -> Result<String> {
        let compiled = self.cache.get(template).await?;
        let context = RenderContext {
            content,
            config: config.cloned().unwrap_or_default(),
            options: options.cloned().unwrap_or_default(),
        };
        compiled.render(&context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAIN_DOCUMENT;
    use crate::store::TemplateStore;
    use serde_json::json;

    async fn renderer_with(main: &str) -> (tempfile::TempDir, ContextRenderer) {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("t")).unwrap();
        std::fs::write(root.path().join("t").join(MAIN_DOCUMENT), main).unwrap();
        let cache = Arc::new(TemplateCache::new(TemplateStore::new(root.path())));
        (root, ContextRenderer::new(cache))
    }

    #[tokio::test]
    async fn renders_all_three_sections() {
        let (_root, renderer) = renderer_with(
            "{{content.title}}|{{config.pageSize}}|{{#if options.paged}}paged{{else}}flow{{/if}}",
        )
        .await;
        let config = json!({"pageSize": "A3"}).as_object().cloned().unwrap();
        let out = renderer
            .render("t", &json!({"title": "Q4"}), Some(&config), Some(&RenderOptions::paged()))
            .await
            .unwrap();
        assert_eq!(out, "Q4|A3|paged");
    }

    #[tokio::test]
    async fn missing_config_and_options_are_empty() {
        let (_root, renderer) =
            renderer_with("[{{config.pageSize}}][{{#if options.paged}}p{{/if}}]").await;
        let out = renderer.render("t", &json!({}), None, None).await.unwrap();
        assert_eq!(out, "[][]");
    }

    #[tokio::test]
    async fn rerenders_with_new_content() {
        let (_root, renderer) = renderer_with("{{content.n}}").await;
        let a = renderer.render("t", &json!({"n": 1}), None, None).await.unwrap();
        let b = renderer.render("t", &json!({"n": 2}), None, None).await.unwrap();
        assert_eq!((a.as_str(), b.as_str()), ("1", "2"));
    }

    #[test]
    fn options_serialize_camel_case() {
        let options = RenderOptions {
            paged: Some(false),
            cover_only: true,
            body_only: false,
        };
        assert_eq!(
            serde_json::to_value(&options).unwrap(),
            json!({"paged": false, "coverOnly": true})
        );
        let forced = options.with_paged();
        assert_eq!(forced.paged, Some(true));
        assert!(forced.cover_only);
    }
}
