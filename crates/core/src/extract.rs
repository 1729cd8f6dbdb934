use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use tracing::{debug, warn};

use crate::error::{DedupeError, Result};
use crate::scan::extension_of;

pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extensions(&self) -> &'static [&'static str];

    fn extract(&self, path: &Path) -> AnyResult<String>;
}

pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "text", "md", "markdown"]
    }

    fn extract(&self, path: &Path) -> AnyResult<String> {
        let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["pdf"]
    }

    fn extract(&self, path: &Path) -> AnyResult<String> {
        let doc = lopdf::Document::load(path)
            .with_context(|| format!("failed to load PDF {}", path.display()))?;
        let pages = doc.get_pages().keys().copied().collect::<Vec<_>>();
        doc.extract_text(&pages)
            .with_context(|| format!("failed to extract text from {}", path.display()))
    }
}

pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["docx"]
    }

    fn extract(&self, path: &Path) -> AnyResult<String> {
        read_zip_entry(path, "word/document.xml").map(|xml| xml_to_text(&xml))
    }
}

pub struct OdtExtractor;

impl TextExtractor for OdtExtractor {
    fn name(&self) -> &'static str {
        "odt"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["odt"]
    }

    fn extract(&self, path: &Path) -> AnyResult<String> {
        read_zip_entry(path, "content.xml").map(|xml| xml_to_text(&xml))
    }
}

pub struct RtfExtractor;

impl TextExtractor for RtfExtractor {
    fn name(&self) -> &'static str {
        "rtf"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rtf"]
    }

    fn extract(&self, path: &Path) -> AnyResult<String> {
        let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(rtf_to_text(&String::from_utf8_lossy(&bytes)))
    }
}

/// Extension-keyed registry of text extractors.
///
/// Unsupported extensions are an error; a supported file that fails to parse
/// yields empty text so batches always complete.
#[derive(Clone)]
pub struct DocumentExtractor {
    registry: HashMap<String, Arc<dyn TextExtractor>>,
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        let mut extractor = Self {
            registry: HashMap::new(),
        };
        extractor.register(Arc::new(PlainTextExtractor));
        extractor.register(Arc::new(PdfExtractor));
        extractor.register(Arc::new(DocxExtractor));
        extractor.register(Arc::new(OdtExtractor));
        extractor.register(Arc::new(RtfExtractor));
        extractor
    }
}

impl DocumentExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extractor: Arc<dyn TextExtractor>) {
        for ext in extractor.extensions() {
            self.registry
                .insert(ext.to_string(), Arc::clone(&extractor));
        }
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        let mut extensions = self.registry.keys().map(String::as_str).collect::<Vec<_>>();
        extensions.sort_unstable();
        extensions
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.registry.contains_key(&ext))
    }

    pub fn extract(&self, path: &Path) -> Result<String> {
        let extension = extension_of(path).unwrap_or_default();
        let extractor = self.registry.get(&extension).ok_or_else(|| {
            DedupeError::InvalidFormat(format!(
                "no text extractor for '{}' ({})",
                extension,
                path.display()
            ))
        })?;

        match extractor.extract(path) {
            Ok(text) => {
                debug!(
                    path = %path.display(),
                    extractor = extractor.name(),
                    chars = text.len(),
                    "text extracted"
                );
                Ok(text)
            }
            Err(err) => {
                warn!("text extraction failed for {}: {:#}", path.display(), err);
                Ok(String::new())
            }
        }
    }

    pub fn extract_batch(&self, paths: &[PathBuf]) -> Vec<(PathBuf, String)> {
        paths
            .iter()
            .map(|path| {
                let text = self.extract(path).unwrap_or_else(|err| {
                    warn!("text extraction skipped for {}: {}", path.display(), err);
                    String::new()
                });
                (path.clone(), text)
            })
            .collect()
    }
}

fn read_zip_entry(path: &Path, entry: &str) -> AnyResult<String> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("{} is not a zip container", path.display()))?;
    let mut member = archive
        .by_name(entry)
        .with_context(|| format!("{} has no {}", path.display(), entry))?;
    let mut xml = String::new();
    member
        .read_to_string(&mut xml)
        .with_context(|| format!("failed to read {} from {}", entry, path.display()))?;
    Ok(xml)
}

const PARAGRAPH_TAGS: &[&str] = &["w:p", "text:p", "text:h", "w:br", "text:line-break"];
const SPACING_TAGS: &[&str] = &["w:tab", "text:tab", "text:s"];

/// Flattens WordprocessingML / OpenDocument XML to text, one line per paragraph.
fn xml_to_text(xml: &str) -> String {
    let mut text = String::new();
    let mut rest = xml;

    while let Some(open) = rest.find('<') {
        text.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('>') else {
            rest = "";
            break;
        };
        let tag = &rest[open + 1..open + close];
        let closing = tag.starts_with('/');
        let self_closing = tag.ends_with('/');
        let name = tag
            .trim_start_matches('/')
            .split(|ch: char| ch.is_whitespace() || ch == '/')
            .next()
            .unwrap_or_default();

        if PARAGRAPH_TAGS.contains(&name) && (closing || (self_closing && name != "w:p")) {
            text.push('\n');
        } else if SPACING_TAGS.contains(&name) && !closing {
            text.push(' ');
        }
        rest = &rest[open + close + 1..];
    }
    text.push_str(rest);

    decode_entities(&text)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

const RTF_SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "pict",
    "header",
    "footer",
    "listtable",
    "listoverridetable",
    "generator",
];

/// Strips RTF control words and groups, keeping the visible text.
fn rtf_to_text(rtf: &str) -> String {
    let mut out = String::new();
    let mut chars = rtf.chars().peekable();
    let mut depth = 0_usize;
    let mut skip_from: Option<usize> = None;

    while let Some(ch) = chars.next() {
        match ch {
            '{' => depth += 1,
            '}' => {
                if skip_from == Some(depth) {
                    skip_from = None;
                }
                depth = depth.saturating_sub(1);
            }
            '\\' => match chars.peek().copied() {
                Some(escaped @ ('\\' | '{' | '}')) => {
                    chars.next();
                    if skip_from.is_none() {
                        out.push(escaped);
                    }
                }
                Some('\'') => {
                    chars.next();
                    let hex = chars.by_ref().take(2).collect::<String>();
                    if skip_from.is_none() {
                        if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                            out.push(char::from(byte));
                        }
                    }
                }
                Some('*') => {
                    chars.next();
                    skip_from.get_or_insert(depth);
                }
                Some(letter) if letter.is_ascii_alphabetic() => {
                    let mut word = String::new();
                    while let Some(&next) = chars.peek() {
                        if !next.is_ascii_alphabetic() {
                            break;
                        }
                        word.push(next);
                        chars.next();
                    }
                    let mut param = String::new();
                    if chars.peek() == Some(&'-') {
                        param.push('-');
                        chars.next();
                    }
                    while let Some(&next) = chars.peek() {
                        if !next.is_ascii_digit() {
                            break;
                        }
                        param.push(next);
                        chars.next();
                    }
                    if chars.peek() == Some(&' ') {
                        chars.next();
                    }

                    if RTF_SKIPPED_DESTINATIONS.contains(&word.as_str()) {
                        skip_from.get_or_insert(depth);
                        continue;
                    }
                    if skip_from.is_some() {
                        continue;
                    }
                    match word.as_str() {
                        "par" | "line" | "row" => out.push('\n'),
                        "tab" | "cell" => out.push('\t'),
                        "u" => {
                            if let Ok(code) = param.parse::<i32>() {
                                let code = if code < 0 { code + 65_536 } else { code };
                                if let Some(decoded) = char::from_u32(code as u32) {
                                    out.push(decoded);
                                }
                            }
                            // Skip the ANSI fallback character.
                            if matches!(chars.peek(), Some(c) if !matches!(c, '\\' | '{' | '}')) {
                                chars.next();
                            }
                        }
                        _ => {}
                    }
                }
                Some(_) => {
                    chars.next();
                    if skip_from.is_none() {
                        out.push(' ');
                    }
                }
                None => {}
            },
            '\r' | '\n' => {}
            other => {
                if skip_from.is_none() {
                    out.push(other);
                }
            }
        }
    }

    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
