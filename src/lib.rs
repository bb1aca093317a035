//! # report-forge – named templates to HTML or paginated PDF
//!
//! A report is produced from a template name plus a data payload:
//!
//! 1. **Resolve** – validate the name against the template store ([`store`])
//! 2. **Compile** – load main document and partials, memoize ([`templates`])
//! 3. **Render** – run the template on `{content, config, options}` ([`context`])
//! 4. **Print** – drive a headless browser to PDF ([`pdf`], [`chrome`]),
//!    optionally paginating and repairing the page DOM ([`paged`])
//!
//! [`report::ReportService`] ties the stages together.

pub mod chrome;
pub mod config;
pub mod context;
pub mod dom;
pub mod engine;
pub mod error;
pub mod helpers;
pub mod page_size;
pub mod paged;
pub mod pdf;
pub mod report;
pub mod store;
pub mod templates;

// Re-exports for convenience
pub use config::ForgeConfig;
pub use context::RenderOptions;
pub use error::{ReportError, Result};
pub use page_size::PageSize;
pub use report::{GenerateRequest, Report, ReportFormat, ReportService};
