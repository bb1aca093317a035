//! forge – command-line report generator.
//!
//! Usage:
//!   forge list
//!   forge render <request.json> [output] [--format html|pdf]
//!   forge repair <paged.html> [output]
//!
//! Templates are read from `TEMPLATES_PATH` (default `./templates`). If
//! `output` is omitted the report is written next to the request file with
//! the extension of the chosen format.

use std::{
    env, fs,
    path::{Path, PathBuf},
    process,
};

use report_forge::{
    paged::repair_paged_html, ForgeConfig, GenerateRequest, ReportFormat, ReportService,
};

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("forge");

    match args.get(1).map(String::as_str) {
        Some("list") => list().await,
        Some("render") => render(prog, &args[2..]).await,
        Some("repair") => repair(prog, &args[2..]).await,
        Some("--help" | "-h") => {
            print_usage(prog);
            process::exit(0);
        }
        Some(other) => {
            eprintln!("Unknown command: {other}");
            print_usage(prog);
            process::exit(1);
        }
        None => {
            print_usage(prog);
            process::exit(1);
        }
    }
}

async fn list() {
    let service = ReportService::from_config(&ForgeConfig::from_env());
    for name in service.list_templates().await {
        println!("{name}");
    }
}

async fn render(prog: &str, args: &[String]) {
    let mut format = ReportFormat::Html;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--format" | "-f" => match iter.next() {
                Some(v) => format = v.parse().unwrap_or_default(),
                None => {
                    eprintln!("--format needs a value");
                    process::exit(1);
                }
            },
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(prog);
                process::exit(1);
            }
            path => positional.push(PathBuf::from(path)),
        }
    }

    let (input, output) = split_paths(prog, positional, match format {
        ReportFormat::Html => "html",
        ReportFormat::Pdf => "pdf",
    });

    let request: GenerateRequest = match fs::read_to_string(&input)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error reading request '{}': {e}", input.display());
            process::exit(1);
        }
    };

    let service = ReportService::from_config(&ForgeConfig::from_env());
    match service.generate(&request, format).await {
        Ok(report) => {
            write_output(&output, report.as_bytes());
            eprintln!(
                "Wrote '{}' ({} bytes, {})",
                output.display(),
                report.as_bytes().len(),
                report.content_type()
            );
        }
        Err(e) => {
            eprintln!("Error generating report: {e}");
            process::exit(if e.is_client_error() { 2 } else { 1 });
        }
    }
}

async fn repair(prog: &str, args: &[String]) {
    let positional = args.iter().map(PathBuf::from).collect();
    let (input, output) = split_paths(prog, positional, "paged.html");

    let html = match fs::read_to_string(&input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading '{}': {e}", input.display());
            process::exit(1);
        }
    };
    match repair_paged_html(&html).await {
        Ok(repaired) => {
            write_output(&output, repaired.as_bytes());
            eprintln!("Wrote '{}'", output.display());
        }
        Err(e) => {
            eprintln!("Error repairing '{}': {e}", input.display());
            process::exit(1);
        }
    }
}

/// `<input> [output]`; the default output swaps the input's extension.
fn split_paths(prog: &str, positional: Vec<PathBuf>, extension: &str) -> (PathBuf, PathBuf) {
    let mut positional = positional.into_iter();
    let input = match positional.next() {
        Some(p) => p,
        None => {
            eprintln!("Error: no input file specified.");
            print_usage(prog);
            process::exit(1);
        }
    };
    let output = positional.next().unwrap_or_else(|| {
        let mut o = input.clone();
        o.set_extension(extension);
        o
    });
    if let Some(extra) = positional.next() {
        eprintln!("Unexpected argument: {}", extra.display());
        print_usage(prog);
        process::exit(1);
    }
    (input, output)
}

fn write_output(output: &Path, bytes: &[u8]) {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Error creating output directory: {e}");
                process::exit(1);
            }
        }
    }
    if let Err(e) = fs::write(output, bytes) {
        eprintln!("Error writing '{}': {e}", output.display());
        process::exit(1);
    }
}

fn print_usage(prog: &str) {
    eprintln!("forge – template-driven report generator (report-forge)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} list");
    eprintln!("  {prog} render <request.json> [output] [--format html|pdf]");
    eprintln!("  {prog} repair <paged.html> [output]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  list           Print the templates found under TEMPLATES_PATH");
    eprintln!("  render         Render a request {{template, content, config?, options?}}");
    eprintln!("  repair         Repeat table headers and add page footers to paginated HTML");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TEMPLATES_PATH Template store root (default: ./templates)");
    eprintln!("  PAGEDJS_PATH   Paged.js polyfill script (default: node_modules lookup)");
    eprintln!("  CHROME_PATH    Chromium executable (default: auto-detect)");
    eprintln!("  RUST_LOG       Log filter, e.g. RUST_LOG=report_forge=debug");
}
