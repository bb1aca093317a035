//! Rendering-engine abstraction.
//!
//! A [`RenderEngine`] launches one isolated [`EngineSession`] per render call.
//! Sessions are never shared or pooled; the caller owns the session for the
//! whole call and must [`close`](EngineSession::close) it on every exit path.
//!
//! DOM work inside a session goes through typed operations
//! ([`PagedDocument`]) instead of free-form script strings.

use std::future::Future;

use crate::error::Result;
use crate::page_size::PageSize;
use crate::paged::{HeaderRepair, PageFooter, PageStructure};

/// Print settings for rasterizing the current document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrintOptions {
    pub page_size: PageSize,
    pub print_background: bool,
}

impl PrintOptions {
    pub fn new(page_size: PageSize) -> Self {
        Self {
            page_size,
            print_background: true,
        }
    }
}

/// Typed view of a paginated document.
pub trait PagedDocument: Send {
    /// Page containers in document order, with the tables each one holds.
    fn page_structure(&mut self) -> impl Future<Output = Result<PageStructure>> + Send;

    /// Footer text from the document's `data-footer` hint, or empty.
    fn footer_text(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Deep-copy a table header from the previous page onto a table that lacks one.
    fn copy_table_header(
        &mut self,
        repair: &HeaderRepair,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Append a footer block to a page.
    fn append_footer(&mut self, footer: &PageFooter) -> impl Future<Output = Result<()>> + Send;
}

/// One live rendering-engine instance with a single document loaded.
pub trait EngineSession: PagedDocument + Sized {
    /// Load `markup` as a full document and wait until no sub-resource loads
    /// are in flight.
    fn load(&mut self, markup: &str) -> impl Future<Output = Result<()>> + Send;

    /// Execute `source` in the page context.
    fn inject_script(&mut self, source: &str) -> impl Future<Output = Result<()>> + Send;

    /// Run the pagination engine's entry point. `Ok(false)` when the entry
    /// point does not exist.
    fn run_pagination(&mut self) -> impl Future<Output = Result<bool>> + Send;

    /// Rasterize the current document to PDF.
    fn print_pdf(
        &mut self,
        options: &PrintOptions,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Tear the instance down.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// Factory for sessions.
pub trait RenderEngine: Send + Sync {
    type Session: EngineSession;

    fn launch(&self) -> impl Future<Output = Result<Self::Session>> + Send;
}
