//! Post-pagination repair passes.
//!
//! After the pagination engine has split a document into page containers,
//! two passes fix up the result:
//!
//! 1. **Header repair** – a table continued onto a new page often loses its
//!    `<thead>`. For every page after the first, each header-less table gets a
//!    copy of the header of the table at the same ordinal position on the
//!    previous page. Matching is by position only; if the layout reorders
//!    tables between pages the wrong header is attached.
//! 2. **Footer injection** – every page after the first gets a footer with the
//!    document's footer text and `"{page} / {total}"`. The first page is the
//!    cover and never gets one.
//!
//! Both passes are planned as pure functions over a [`PageStructure`] and
//! applied through a [`PagedDocument`], so the same code drives a live browser
//! page and the in-process [`Document`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dom::{Document, DomNode, ElementNode, NodePath, Tag};
use crate::engine::PagedDocument;
use crate::error::{ReportError, Result};

/// Class the pagination engine puts on each page container.
pub const PAGE_CLASS: &str = "pagedjs_page";
/// `<body>` attribute carrying the footer text.
pub const FOOTER_ATTRIBUTE: &str = "data-footer";
/// Class of an injected footer block.
pub const FOOTER_CLASS: &str = "paged-injected-footer";
/// Class of the page-number span inside an injected footer.
pub const PAGE_NUMBER_CLASS: &str = "paged-page-num";

// ---------------------------------------------------------------------------
// Page structure model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageStructure {
    pub pages: Vec<PageInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub tables: Vec<TableInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub has_header: bool,
}

impl PageStructure {
    /// Build from per-page lists of "table has a header" flags.
    pub fn from_header_flags(pages: Vec<Vec<bool>>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|tables| PageInfo {
                    tables: tables
                        .into_iter()
                        .map(|has_header| TableInfo { has_header })
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Copy the header of table `table` on page `page - 1` onto table `table`
/// on page `page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderRepair {
    pub page: usize,
    pub table: usize,
}

impl HeaderRepair {
    /// Page the header is copied from. `None` for the first page.
    pub fn source_page(&self) -> Option<usize> {
        self.page.checked_sub(1)
    }

    pub(crate) fn require_source_page(&self) -> Result<usize> {
        self.source_page().ok_or_else(|| {
            ReportError::Render(format!("table {} on page 0 has no previous page", self.table))
        })
    }
}

/// A footer to append to one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFooter {
    /// Zero-based page position.
    pub page_index: usize,
    pub text: String,
    /// `"{page_index + 1} / {total}"`.
    pub page_label: String,
}

impl PageFooter {
    /// `<div class="paged-injected-footer"><span>text</span><span class="paged-page-num">n / t</span></div>`
    pub fn to_element(&self) -> ElementNode {
        let mut footer = ElementNode::new(Tag::Div).with_class(FOOTER_CLASS);
        footer
            .children
            .push(DomNode::Element(ElementNode::new(Tag::Span).with_text(&self.text)));
        footer.children.push(DomNode::Element(
            ElementNode::new(Tag::Span)
                .with_class(PAGE_NUMBER_CLASS)
                .with_text(&self.page_label),
        ));
        footer
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Header copies needed for `structure`, in application order.
///
/// Pages are processed first to last and a planned copy counts as a header
/// for the next page, so a header keeps propagating across a table that
/// spans several pages.
pub fn plan_header_repairs(structure: &PageStructure) -> Vec<HeaderRepair> {
    let mut has_header: Vec<Vec<bool>> = structure
        .pages
        .iter()
        .map(|p| p.tables.iter().map(|t| t.has_header).collect())
        .collect();
    let mut plan = Vec::new();
    for page in 1..has_header.len() {
        for table in 0..has_header[page].len() {
            if has_header[page][table] {
                continue;
            }
            if has_header[page - 1].get(table).copied().unwrap_or(false) {
                has_header[page][table] = true;
                plan.push(HeaderRepair { page, table });
            }
        }
    }
    plan
}

/// Footers for every page after the first.
pub fn plan_footers(total_pages: usize, text: &str) -> Vec<PageFooter> {
    (1..total_pages)
        .map(|page_index| PageFooter {
            page_index,
            text: text.to_string(),
            page_label: format!("{} / {}", page_index + 1, total_pages),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

/// Run the header repair pass. Returns the number of headers copied.
pub async fn repair_table_headers<D: PagedDocument>(doc: &mut D) -> Result<usize> {
    let structure = doc.page_structure().await?;
    let plan = plan_header_repairs(&structure);
    for repair in &plan {
        doc.copy_table_header(repair).await?;
    }
    Ok(plan.len())
}

/// Run the footer injection pass. Returns the number of footers added.
pub async fn inject_footers<D: PagedDocument>(doc: &mut D) -> Result<usize> {
    let total = doc.page_structure().await?.page_count();
    let text = doc.footer_text().await?;
    let plan = plan_footers(total, &text);
    for footer in &plan {
        doc.append_footer(footer).await?;
    }
    Ok(plan.len())
}

/// Apply both passes to already-paginated markup without a browser.
pub async fn repair_paged_html(markup: &str) -> Result<String> {
    let mut doc = Document::parse(markup);
    let headers = repair_table_headers(&mut doc).await?;
    let footers = inject_footers(&mut doc).await?;
    log::debug!("Offline repair: {headers} header(s) copied, {footers} footer(s) injected");
    Ok(doc.to_html())
}

// ---------------------------------------------------------------------------
// In-process document
// ---------------------------------------------------------------------------

fn is_page(e: &ElementNode) -> bool {
    e.has_class(PAGE_CLASS)
}

fn is_table(e: &ElementNode) -> bool {
    e.tag == Tag::Table
}

fn is_thead(e: &ElementNode) -> bool {
    e.tag == Tag::Thead
}

fn table_path(doc: &Document, pages: &[NodePath], page: usize, table: usize) -> Result<NodePath> {
    let page_path = pages
        .get(page)
        .ok_or_else(|| ReportError::Render(format!("page {page} does not exist")))?;
    doc.find_all_within(page_path, &is_table)
        .into_iter()
        .nth(table)
        .ok_or_else(|| ReportError::Render(format!("page {page} has no table {table}")))
}

impl PagedDocument for Document {
    async fn page_structure(&mut self) -> Result<PageStructure> {
        let pages = self
            .find_all(&is_page, false)
            .iter()
            .map(|page| {
                self.find_all_within(page, &is_table)
                    .iter()
                    .map(|t| {
                        self.element(t)
                            .is_some_and(|table| table.find_descendant(&is_thead).is_some())
                    })
                    .collect()
            })
            .collect();
        Ok(PageStructure::from_header_flags(pages))
    }

    async fn footer_text(&mut self) -> Result<String> {
        Ok(self
            .body()
            .and_then(|b| b.attribute(FOOTER_ATTRIBUTE))
            .unwrap_or_default()
            .to_string())
    }

    async fn copy_table_header(&mut self, repair: &HeaderRepair) -> Result<()> {
        let pages = self.find_all(&is_page, false);
        let source_page = repair.require_source_page()?;
        let source = table_path(self, &pages, source_page, repair.table)?;
        let target = table_path(self, &pages, repair.page, repair.table)?;
        let header = self
            .element(&source)
            .and_then(|t| t.find_descendant(&is_thead))
            .cloned()
            .ok_or_else(|| {
                ReportError::Render(format!(
                    "table {} on page {} has no header",
                    repair.table, source_page
                ))
            })?;
        let table = self
            .element_mut(&target)
            .ok_or_else(|| ReportError::Render("target table vanished".to_string()))?;
        table.children.insert(0, DomNode::Element(header));
        Ok(())
    }

    async fn append_footer(&mut self, footer: &PageFooter) -> Result<()> {
        let page = self
            .find_all(&is_page, false)
            .into_iter()
            .nth(footer.page_index)
            .ok_or_else(|| ReportError::Render(format!("page {} does not exist", footer.page_index)))?;
        let element = self
            .element_mut(&page)
            .ok_or_else(|| ReportError::Render("page vanished".to_string()))?;
        element.children.push(DomNode::Element(footer.to_element()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pagination script
// ---------------------------------------------------------------------------

/// Location of the pagination engine's script on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationScript {
    path: PathBuf,
}

impl PaginationScript {
    /// First candidate that exists, or a configuration error if none do.
    pub fn locate(candidates: &[PathBuf]) -> Result<Self> {
        candidates
            .iter()
            .find(|p| p.is_file())
            .map(|p| Self { path: p.clone() })
            .ok_or_else(|| {
                ReportError::Configuration(format!(
                    "pagination script not found (tried: {}); install pagedjs or set PAGEDJS_PATH",
                    candidates
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ReportError::Configuration(format!(
                "cannot read pagination script {}: {e}",
                self.path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(inner: &str) -> String {
        format!("<div class=\"{PAGE_CLASS}\">{inner}</div>")
    }

    const HEADED: &str = "<table><thead><tr><th>Item</th><th>Qty</th></tr></thead><tbody><tr><td>a</td><td>1</td></tr></tbody></table>";
    const BARE: &str = "<table><tbody><tr><td>b</td><td>2</td></tr></tbody></table>";

    #[test]
    fn plan_copies_onto_continuation_pages() {
        let structure = PageStructure::from_header_flags(vec![vec![true], vec![false]]);
        assert_eq!(
            plan_header_repairs(&structure),
            vec![HeaderRepair { page: 1, table: 0 }]
        );
    }

    #[test]
    fn plan_propagates_across_several_pages() {
        let structure =
            PageStructure::from_header_flags(vec![vec![true], vec![false], vec![false]]);
        assert_eq!(
            plan_header_repairs(&structure),
            vec![HeaderRepair { page: 1, table: 0 }, HeaderRepair { page: 2, table: 0 }]
        );
    }

    #[test]
    fn plan_matches_by_position_only() {
        // Page 1 has two tables; only position 0 has a counterpart with a header.
        let structure =
            PageStructure::from_header_flags(vec![vec![true, false], vec![false, false, false]]);
        assert_eq!(
            plan_header_repairs(&structure),
            vec![HeaderRepair { page: 1, table: 0 }]
        );
    }

    #[test]
    fn plan_skips_first_page_and_headed_tables() {
        let structure = PageStructure::from_header_flags(vec![vec![false], vec![true]]);
        assert!(plan_header_repairs(&structure).is_empty());
        assert!(plan_header_repairs(&PageStructure::default()).is_empty());
    }

    #[test]
    fn footers_for_three_pages() {
        let footers = plan_footers(3, "ACME");
        assert_eq!(footers.len(), 2);
        assert_eq!(footers[0].page_index, 1);
        assert_eq!(footers[0].page_label, "2 / 3");
        assert_eq!(footers[1].page_index, 2);
        assert_eq!(footers[1].page_label, "3 / 3");
        assert!(footers.iter().all(|f| f.text == "ACME"));
        assert!(plan_footers(1, "x").is_empty());
        assert!(plan_footers(0, "x").is_empty());
    }

    #[tokio::test]
    async fn header_copied_from_previous_page() {
        let html = format!("<body>{}{}</body>", page(HEADED), page(BARE));
        let mut doc = Document::parse(&html);
        assert_eq!(repair_table_headers(&mut doc).await.unwrap(), 1);

        let pages = doc.find_all(&is_page, false);
        let first = table_path(&doc, &pages, 0, 0).unwrap();
        let second = table_path(&doc, &pages, 1, 0).unwrap();
        let original = doc.element(&first).unwrap().find_descendant(&is_thead).cloned();
        let copied = doc.element(&second).unwrap().children.first().cloned();
        assert_eq!(copied, original.map(DomNode::Element));

        let structure = doc.page_structure().await.unwrap();
        assert!(structure.pages[1].tables[0].has_header);
    }

    #[tokio::test]
    async fn first_page_repair_is_rejected() {
        let html = format!("<body>{}</body>", page(HEADED));
        let mut doc = Document::parse(&html);
        let repair = HeaderRepair { page: 0, table: 0 };
        assert_eq!(repair.source_page(), None);
        let err = doc.copy_table_header(&repair).await.unwrap_err();
        assert!(matches!(err, ReportError::Render(_)), "{err}");
        assert_eq!(doc.to_html(), html);
    }

    #[tokio::test]
    async fn offline_repair_keeps_character_references() {
        let html = format!(
            "<body data-footer=\"ACME &copy; 2024\">{}{}</body>",
            page("<p>a&#x60;b &mdash; &#8364;5</p>"),
            page("<p>&lt;next&gt;</p>")
        );
        let out = repair_paged_html(&html).await.unwrap();
        assert!(out.contains("<p>a`b \u{2014} \u{20ac}5</p>"), "{out}");
        assert!(out.contains("<p>&lt;next&gt;</p>"), "{out}");
        assert!(out.contains("<span>ACME \u{a9} 2024</span>"), "{out}");
        assert!(!out.contains("&amp;"), "{out}");
    }

    #[tokio::test]
    async fn repair_without_source_header_is_noop() {
        let html = format!("<body>{}{}</body>", page(BARE), page(BARE));
        let mut doc = Document::parse(&html);
        assert_eq!(repair_table_headers(&mut doc).await.unwrap(), 0);
        assert_eq!(doc.to_html(), html);
    }

    #[tokio::test]
    async fn footers_injected_after_cover() {
        let html = format!(
            "<body data-footer=\"Quarterly report\">{}{}{}</body>",
            page("cover"),
            page("one"),
            page("two")
        );
        let out = repair_paged_html(&html).await.unwrap();
        let doc = Document::parse(&out);
        let pages = doc.find_all(&is_page, false);
        assert_eq!(pages.len(), 3);

        let footer_of = |i: usize| {
            doc.find_all_within(&pages[i], &|e| e.has_class(FOOTER_CLASS))
                .first()
                .and_then(|p| doc.element(p))
                .cloned()
        };
        assert!(footer_of(0).is_none(), "cover page has no footer");
        assert_eq!(footer_of(1).unwrap().text_content(), "Quarterly report2 / 3");
        assert_eq!(footer_of(2).unwrap().text_content(), "Quarterly report3 / 3");
    }

    #[tokio::test]
    async fn missing_footer_hint_is_empty_text() {
        let html = format!("<body>{}{}</body>", page("a"), page("b"));
        let mut doc = Document::parse(&html);
        assert_eq!(doc.footer_text().await.unwrap(), "");
        assert_eq!(inject_footers(&mut doc).await.unwrap(), 1);
        assert!(doc
            .to_html()
            .contains("<span></span><span class=\"paged-page-num\">2 / 2</span>"));
    }

    #[test]
    fn locate_script() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.js");
        let present = dir.path().join("paged.polyfill.js");
        std::fs::write(&present, "window.PagedPolyfill = {};").unwrap();

        let found = PaginationScript::locate(&[missing.clone(), present.clone()]).unwrap();
        assert_eq!(found.path(), present.as_path());

        let err = PaginationScript::locate(&[missing]).unwrap_err();
        assert!(matches!(err, ReportError::Configuration(_)), "{err}");
    }
}
