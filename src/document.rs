use crate::error::{RagError, Result};
use futures::stream::{self, Stream, StreamExt};
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text_by_pages;
use std::fs;
use std::path::{Path, PathBuf};

/// Page separator used by plain-text sources
const FORM_FEED: char = '\x0c';

/// One page of extracted text from a source file
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// The source file name (used as source ID)
    pub source_id: String,
    /// 1-based page number in document order
    pub page_number: usize,
    /// Extracted, whitespace-normalized text
    pub text: String,
    /// Number of characters in `text`
    pub char_count: usize,
}

impl Page {
    pub fn new(source_id: impl Into<String>, page_number: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        Page {
            source_id: source_id.into(),
            page_number,
            char_count: text.chars().count(),
            text,
        }
    }
}

/// Pages gathered from a directory, plus the files that could not be read
#[derive(Debug, Default)]
pub struct LoadedPages {
    pub pages: Vec<Page>,
    pub files_loaded: usize,
    pub failures: Vec<RagError>,
}

/// Whether the loader knows how to extract text from this MIME type
fn is_supported(mime_type: &str) -> bool {
    mime_type.starts_with("application/pdf") || mime_type.starts_with("text/")
}

/// List the supported files directly inside `dir`, in name order
pub fn list_source_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(RagError::load(dir, "not a directory"));
    }

    let entries = fs::read_dir(dir).map_err(|e| RagError::load(dir, e))?;
    let mut files = Vec::new();

    for entry in entries {
        let path = entry.map_err(|e| RagError::load(dir, e))?.path();
        if !path.is_file() {
            continue;
        }

        let mime_type = from_path(&path).first_or_octet_stream().to_string();
        if is_supported(&mime_type) {
            files.push(path);
        } else {
            debug!("Skipping {} ({})", path.display(), mime_type);
        }
    }

    files.sort();
    Ok(files)
}

/// Read every page of one file, in document order
pub fn load_file(path: &Path) -> Result<Vec<Page>> {
    let source_id = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| RagError::load(path, "invalid file name"))?
        .to_string();

    let mime_type = from_path(path).first_or_octet_stream().to_string();
    debug!("Detected MIME type: {}", mime_type);

    let raw_pages = read_pages(path, &mime_type)?;
    if raw_pages.iter().all(|page| page.trim().is_empty()) {
        warn!("No text extracted from {}", path.display());
    }

    Ok(raw_pages
        .iter()
        .enumerate()
        .map(|(idx, raw)| Page::new(source_id.clone(), idx + 1, normalize_whitespace(raw)))
        .collect())
}

/// Read raw page texts from a document based on its MIME type
fn read_pages(path: &Path, mime_type: &str) -> Result<Vec<String>> {
    match mime_type {
        mime if mime.starts_with("application/pdf") => {
            info!("Processing PDF document: {}", path.display());
            extract_text_by_pages(path).map_err(|e| RagError::load(path, e))
        }

        mime if mime.starts_with("text/") => {
            info!("Processing text document: {}", path.display());
            let content = fs::read_to_string(path).map_err(|e| RagError::load(path, e))?;
            Ok(content.split(FORM_FEED).map(str::to_string).collect())
        }

        _ => Err(RagError::load(
            path,
            format!("unsupported document format: {}", mime_type),
        )),
    }
}

/// Load all supported files of `dir` with at most `concurrency` files in flight.
///
/// Yields one item per file. Files finish in any order; pages inside one item
/// keep document order. A failing file yields an `Err` without affecting the
/// others.
pub fn load_dir(
    dir: &Path,
    concurrency: usize,
) -> Result<impl Stream<Item = Result<Vec<Page>>>> {
    let files = list_source_files(dir)?;
    info!("Found {} source files in {}", files.len(), dir.display());

    Ok(stream::iter(files)
        .map(|path| async move {
            let display_path = path.clone();
            // Extraction is blocking and may panic on malformed PDFs
            tokio::task::spawn_blocking(move || load_file(&path))
                .await
                .map_err(|e| RagError::load(display_path, format!("extraction aborted: {}", e)))?
        })
        .buffer_unordered(concurrency.max(1)))
}

/// Load a directory, logging and collecting per-file failures instead of aborting
pub async fn collect_pages(dir: &Path, concurrency: usize) -> Result<LoadedPages> {
    let mut files = Box::pin(load_dir(dir, concurrency)?);
    let mut loaded = LoadedPages::default();

    while let Some(result) = files.next().await {
        match result {
            Ok(pages) => {
                loaded.files_loaded += 1;
                loaded.pages.extend(pages);
            }
            Err(err) => {
                warn!("Skipping file: {}", err);
                loaded.failures.push(err);
            }
        }
    }

    Ok(loaded)
}

/// Normalize whitespace in text (remove multiple consecutive spaces, newlines, etc.)
fn normalize_whitespace(text: &str) -> String {
    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(text.len());

    let flush_newlines = |normalized: &mut String, count: usize| match count {
        0 => {}
        1 => normalized.push('\n'),
        _ => normalized.push_str("\n\n"),
    };

    for c in text.chars().filter(|&c| c != '\r') {
        if c == '\n' {
            newline_count += 1;
            continue;
        }

        flush_newlines(&mut normalized, newline_count);
        if newline_count > 0 {
            prev_char = '\n';
        }
        newline_count = 0;

        if !(c == ' ' && prev_char == ' ') {
            normalized.push(c);
        }
        prev_char = c;
    }

    normalized.trim().to_string()
}
