//! PDF synthesis – single-pass and paginated.
//!
//! Both paths own one engine session for the duration of the call and close
//! it on every exit path. There is no partial output: a call returns a
//! complete PDF or an error.

use std::path::PathBuf;

use crate::engine::{EngineSession, PrintOptions, RenderEngine};
use crate::error::Result;
use crate::page_size::PageSize;
use crate::paged::{inject_footers, repair_table_headers, PaginationScript};

/// Renders markup to PDF through a [`RenderEngine`].
#[derive(Debug, Clone)]
pub struct PdfRenderer<E> {
    engine: E,
    script_candidates: Vec<PathBuf>,
}

impl<E: RenderEngine> PdfRenderer<E> {
    pub fn new(engine: E, script_candidates: Vec<PathBuf>) -> Self {
        Self {
            engine,
            script_candidates,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// One layout pass: load, wait for resources, print.
    pub async fn html_to_pdf(&self, markup: &str, page_size: PageSize) -> Result<Vec<u8>> {
        let mut session = self.engine.launch().await?;
        let outcome = async {
            session.load(markup).await?;
            session.print_pdf(&PrintOptions::new(page_size)).await
        }
        .await;
        finish(session, outcome).await
    }

    /// Paginated render: load, paginate, repair headers, inject footers, print.
    ///
    /// The pagination script is located and read before any engine is
    /// launched, so a missing script fails with a configuration error
    /// without acquiring a browser.
    pub async fn html_to_pdf_paged(&self, markup: &str, page_size: PageSize) -> Result<Vec<u8>> {
        let script = PaginationScript::locate(&self.script_candidates)?;
        let source = script.read().await?;

        let mut session = self.engine.launch().await?;
        let outcome = async {
            session.load(markup).await?;
            session.inject_script(&source).await?;
            if !session.run_pagination().await? {
                log::warn!(
                    "Pagination entry point missing in {}; using existing page structure",
                    script.path().display()
                );
            }
            let headers = repair_table_headers(&mut session).await?;
            let footers = inject_footers(&mut session).await?;
            log::debug!("Paged render: {headers} header(s) repaired, {footers} footer(s) injected");
            session.print_pdf(&PrintOptions::new(page_size)).await
        }
        .await;
        finish(session, outcome).await
    }
}

/// Close `session`, then hand back `outcome`. A teardown failure after a
/// successful render is logged; the PDF is already complete.
async fn finish<S: EngineSession>(session: S, outcome: Result<Vec<u8>>) -> Result<Vec<u8>> {
    let closed = session.close().await;
    match (outcome, closed) {
        (Ok(bytes), Ok(())) => {
            log::info!("Rendered PDF ({} bytes)", bytes.len());
            Ok(bytes)
        }
        (Ok(bytes), Err(e)) => {
            log::warn!("Engine teardown failed after render: {e}");
            Ok(bytes)
        }
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                log::warn!("Engine teardown failed after error: {close_err}");
            }
            Err(e)
        }
    }
}
