//! Headless Chromium engine, driven over the DevTools protocol.
//!
//! Each [`ChromeEngine::launch`] starts a fresh browser process with its own
//! throwaway profile directory. The process is killed when the session is
//! closed or dropped.

use std::collections::HashSet;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::config::BrowserOptions;
use crate::engine::{EngineSession, PagedDocument, PrintOptions, RenderEngine};
use crate::error::{ReportError, Result};
use crate::paged::{
    HeaderRepair, PageFooter, PageStructure, FOOTER_ATTRIBUTE, FOOTER_CLASS, PAGE_CLASS,
    PAGE_NUMBER_CLASS,
};

/// Resolves once the load event has fired and web fonts are ready.
const WAIT_FOR_FONTS: &str = r#"(async () => {
  if (document.readyState !== 'complete') {
    await new Promise((resolve) => window.addEventListener('load', resolve, { once: true }));
  }
  if (document.fonts && document.fonts.ready) { await document.fonts.ready; }
  return true;
})()"#;

/// No request may be in flight for this long before the network counts as idle.
const NETWORK_QUIET: Duration = Duration::from_millis(500);

const RUN_PAGINATION: &str = r#"(async () => {
  const polyfill = window.PagedPolyfill;
  if (polyfill && typeof polyfill.preview === 'function') {
    await polyfill.preview();
    return true;
  }
  return false;
})()"#;

fn render_err(context: &str) -> impl Fn(chromiumoxide::error::CdpError) -> ReportError + '_ {
    move |e| ReportError::Render(format!("{context}: {e}"))
}

/// A network request starting or reaching a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NetworkActivity {
    Started(String),
    Settled(String),
}

/// Wait until no request has been in flight for `quiet`. Fails once
/// `timeout` has passed without reaching that state.
async fn wait_for_network_idle<S>(mut activity: S, quiet: Duration, timeout: Duration) -> Result<()>
where
    S: Stream<Item = NetworkActivity> + Unpin,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut in_flight = HashSet::new();
    loop {
        match tokio::time::timeout(quiet, activity.next()).await {
            Ok(Some(NetworkActivity::Started(id))) => {
                in_flight.insert(id);
            }
            Ok(Some(NetworkActivity::Settled(id))) => {
                in_flight.remove(&id);
            }
            Ok(None) => {
                return Err(ReportError::Render(
                    "page closed while waiting for the network".to_string(),
                ))
            }
            Err(_) if in_flight.is_empty() => return Ok(()),
            Err(_) => {}
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(ReportError::Render(format!(
                "network still busy after {timeout:?} ({} request(s) in flight)",
                in_flight.len()
            )));
        }
    }
}

/// Launches one headless Chromium per render call.
#[derive(Debug, Clone, Default)]
pub struct ChromeEngine {
    options: BrowserOptions,
}

impl ChromeEngine {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }
}

impl RenderEngine for ChromeEngine {
    type Session = ChromeSession;

    async fn launch(&self) -> Result<ChromeSession> {
        let profile = TempDir::new()
            .map_err(|e| ReportError::Render(format!("cannot create browser profile: {e}")))?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile.path())
            .request_timeout(self.options.request_timeout);
        if self.options.no_sandbox {
            builder = builder.no_sandbox().arg("--disable-setuid-sandbox");
        }
        if let Some(executable) = &self.options.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(ReportError::Render)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(render_err("browser launch failed"))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        log::debug!("Launched headless browser (profile {})", profile.path().display());

        let mut session = ChromeSession {
            browser,
            page: None,
            idle_timeout: self.options.request_timeout,
            handler: Some(handler),
            _profile: profile,
        };
        match session.browser.new_page("about:blank").await {
            Ok(page) => {
                session.page = Some(page);
                Ok(session)
            }
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    log::warn!("Browser teardown after failed launch: {close_err}");
                }
                Err(render_err("cannot open page")(e))
            }
        }
    }
}

/// A live browser with one page.
pub struct ChromeSession {
    browser: Browser,
    page: Option<Page>,
    idle_timeout: Duration,
    handler: Option<JoinHandle<()>>,
    _profile: TempDir,
}

impl ChromeSession {
    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| ReportError::Render("no page open".to_string()))
    }

    /// Evaluate `expression`, awaiting a returned promise, and deserialize the result.
    async fn eval<T: DeserializeOwned>(&self, expression: String) -> Result<T> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(ReportError::Render)?;
        let result = self
            .page()?
            .evaluate_expression(params)
            .await
            .map_err(render_err("script evaluation failed"))?;
        result
            .into_value()
            .map_err(|e| ReportError::Render(format!("unexpected script result: {e}")))
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

impl PagedDocument for ChromeSession {
    async fn page_structure(&mut self) -> Result<PageStructure> {
        let flags: Vec<Vec<bool>> = self
            .eval(format!(
                "Array.from(document.querySelectorAll('.{PAGE_CLASS}')).map((page) => \
                 Array.from(page.querySelectorAll('table')).map((t) => t.querySelector('thead') !== null))"
            ))
            .await?;
        Ok(PageStructure::from_header_flags(flags))
    }

    async fn footer_text(&mut self) -> Result<String> {
        self.eval(format!(
            "(document.body && document.body.getAttribute('{FOOTER_ATTRIBUTE}')) || ''"
        ))
        .await
    }

    async fn copy_table_header(&mut self, repair: &HeaderRepair) -> Result<()> {
        let source_page = repair.require_source_page()?;
        let copied: bool = self
            .eval(format!(
                "((page, table, sourcePage) => {{
                   const pages = document.querySelectorAll('.{PAGE_CLASS}');
                   const target = pages[page] && pages[page].querySelectorAll('table')[table];
                   const source = pages[sourcePage] && pages[sourcePage].querySelectorAll('table')[table];
                   const thead = source && source.querySelector('thead');
                   if (!target || !thead) return false;
                   target.insertBefore(thead.cloneNode(true), target.firstChild);
                   return true;
                 }})({}, {}, {})",
                repair.page,
                repair.table,
                source_page
            ))
            .await?;
        if !copied {
            return Err(ReportError::Render(format!(
                "cannot copy header onto table {} of page {}",
                repair.table, repair.page
            )));
        }
        Ok(())
    }

    async fn append_footer(&mut self, footer: &PageFooter) -> Result<()> {
        let appended: bool = self
            .eval(format!(
                "((index, text, label) => {{
                   const page = document.querySelectorAll('.{PAGE_CLASS}')[index];
                   if (!page) return false;
                   const footer = document.createElement('div');
                   footer.className = '{FOOTER_CLASS}';
                   const left = document.createElement('span');
                   left.textContent = text;
                   const right = document.createElement('span');
                   right.className = '{PAGE_NUMBER_CLASS}';
                   right.textContent = label;
                   footer.appendChild(left);
                   footer.appendChild(right);
                   page.appendChild(footer);
                   return true;
                 }})({}, {}, {})",
                footer.page_index,
                serde_json::to_string(&footer.text)?,
                serde_json::to_string(&footer.page_label)?
            ))
            .await?;
        if !appended {
            return Err(ReportError::Render(format!(
                "page {} does not exist",
                footer.page_index
            )));
        }
        Ok(())
    }
}

impl EngineSession for ChromeSession {
    async fn load(&mut self, markup: &str) -> Result<()> {
        let page = self.page()?;
        let started = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(render_err("cannot watch network"))?
            .map(|e| NetworkActivity::Started(e.request_id.inner().clone()));
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(render_err("cannot watch network"))?
            .map(|e| NetworkActivity::Settled(e.request_id.inner().clone()));
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(render_err("cannot watch network"))?
            .map(|e| NetworkActivity::Settled(e.request_id.inner().clone()));
        let activity = Box::pin(futures::stream::select(
            started,
            futures::stream::select(finished, failed),
        ));

        page.set_content(markup)
            .await
            .map_err(render_err("cannot load document"))?;
        wait_for_network_idle(activity, NETWORK_QUIET, self.idle_timeout).await?;
        let _: bool = self.eval(WAIT_FOR_FONTS.to_string()).await?;
        Ok(())
    }

    async fn inject_script(&mut self, source: &str) -> Result<()> {
        let _: bool = self
            .eval(format!(
                "((src) => {{
                   const script = document.createElement('script');
                   script.textContent = src;
                   (document.head || document.documentElement).appendChild(script);
                   return true;
                 }})({})",
                serde_json::to_string(source)?
            ))
            .await?;
        Ok(())
    }

    async fn run_pagination(&mut self) -> Result<bool> {
        self.eval(RUN_PAGINATION.to_string()).await
    }

    async fn print_pdf(&mut self, options: &PrintOptions) -> Result<Vec<u8>> {
        let (width, height) = options.page_size.dimensions_in();
        let params = PrintToPdfParams {
            print_background: Some(options.print_background),
            paper_width: Some(width),
            paper_height: Some(height),
            ..Default::default()
        };
        self.page()?
            .pdf(params)
            .await
            .map_err(render_err("PDF rasterization failed"))
    }

    async fn close(mut self) -> Result<()> {
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            log::warn!("Waiting for browser exit failed: {e}");
        }
        if let Some(handler) = self.handler.take() {
            let _ = handler.await;
        }
        log::debug!("Browser torn down");
        closed
            .map(|_| ())
            .map_err(render_err("browser close failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    const QUIET: Duration = Duration::from_millis(20);
    const TIMEOUT: Duration = Duration::from_millis(300);

    fn started(id: &str) -> NetworkActivity {
        NetworkActivity::Started(id.to_string())
    }

    fn settled(id: &str) -> NetworkActivity {
        NetworkActivity::Settled(id.to_string())
    }

    #[tokio::test]
    async fn idle_once_every_request_settles() {
        let events = stream::iter(vec![started("doc"), started("img"), settled("doc"), settled("img")])
            .chain(stream::pending());
        wait_for_network_idle(events, QUIET, TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn redirects_count_once() {
        let events = stream::iter(vec![started("css"), started("css"), settled("css")])
            .chain(stream::pending());
        wait_for_network_idle(events, QUIET, TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn hanging_request_times_out() {
        let events = stream::iter(vec![started("xhr")]).chain(stream::pending());
        let err = wait_for_network_idle(events, QUIET, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ReportError::Render(_)), "{err}");
        assert!(err.to_string().contains("1 request(s) in flight"), "{err}");
    }

    #[tokio::test]
    async fn closed_page_is_an_error() {
        let events = stream::iter(vec![started("doc")]);
        let err = wait_for_network_idle(events, QUIET, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ReportError::Render(_)));
    }
}
