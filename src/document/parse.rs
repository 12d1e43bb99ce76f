//! DocTags → [`StructuredDocument`].
//!
//! DocTags is a flat XML-like markup: one `<doctag>` root, element tags such
//! as `<text>` or `<otsl>`, and void tags for locations (`<loc_N>`), table
//! cells (`<fcel>`, `<nl>`, …), code languages (`<_Python_>`) and picture
//! classes. Locations are four `<loc_N>` values `x0 y0 x1 y1` on a 0–500 grid
//! and are scaled into the pixel space of the page image.
//!
//! Anything after the closing `</doctag>` (typically `<end_of_utterance>`) is
//! ignored. Inside text-bearing elements, a `<Name>` outside the vocabulary is
//! kept as literal text. Everything else that doesn't fit the vocabulary is
//! rejected with [`DoctagsError::MalformedTags`].

use crate::document::{
    BoundingBox, CellKind, DocItem, ItemBody, Label, ListEntry, PageSize, PictureData,
    StructuredDocument, TableCell, TableData,
};
use crate::error::DoctagsError;
use crate::pipeline::encode;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Upper bound of the location grid.
pub const LOC_GRID: u32 = 500;

static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(/?)([A-Za-z_][A-Za-z0-9_]*)>").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Open(&'a str),
    Close(&'a str),
    Text(&'a str),
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for caps in RE_TAG.captures_iter(input) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        if whole.start() > last {
            tokens.push(Token::Text(&input[last..whole.start()]));
        }
        if caps.get(1).is_some_and(|m| !m.as_str().is_empty()) {
            tokens.push(Token::Close(name.as_str()));
        } else {
            tokens.push(Token::Open(name.as_str()));
        }
        last = whole.end();
    }
    if last < input.len() {
        tokens.push(Token::Text(&input[last..]));
    }
    tokens
}

/// Element names that take a closing tag.
const ELEMENTS: &[&str] = &[
    "doctag",
    "title",
    "section_header_level_1",
    "section_header_level_2",
    "section_header_level_3",
    "section_header_level_4",
    "section_header_level_5",
    "section_header_level_6",
    "text",
    "caption",
    "footnote",
    "page_header",
    "page_footer",
    "code",
    "formula",
    "list_item",
    "ordered_list",
    "unordered_list",
    "otsl",
    "picture",
    "checkbox_selected",
    "checkbox_unselected",
    "key_value_region",
    "form",
    "document_index",
];

/// Whether `name` belongs to the DocTags vocabulary (element or void tag).
fn is_vocabulary(name: &str) -> bool {
    ELEMENTS.contains(&name)
        || name == "nl"
        || name == "page_break"
        || name.starts_with("loc_")
        || CellKind::from_tag(name).is_some()
}

/// `<name>` / `</name>` as literal text.
fn push_literal(text: &mut String, name: &str, closing: bool) {
    text.push('<');
    if closing {
        text.push('/');
    }
    text.push_str(name);
    text.push('>');
}

fn text_label(name: &str) -> Option<Label> {
    if let Some(level) = name.strip_prefix("section_header_level_") {
        return match level.parse::<u8>() {
            Ok(n @ 1..=6) => Some(Label::SectionHeader(n)),
            _ => None,
        };
    }
    Some(match name {
        "title" => Label::Title,
        "text" => Label::Text,
        "caption" => Label::Caption,
        "footnote" => Label::Footnote,
        "page_header" => Label::PageHeader,
        "page_footer" => Label::PageFooter,
        "formula" => Label::Formula,
        "list_item" => Label::ListItem,
        "checkbox_selected" => Label::CheckboxSelected,
        "checkbox_unselected" => Label::CheckboxUnselected,
        _ => return None,
    })
}

/// `_Python_` → `Python`.
fn language_marker(name: &str) -> Option<&str> {
    if name.len() > 2 && name.starts_with('_') && name.ends_with('_') {
        Some(&name[1..name.len() - 1])
    } else {
        None
    }
}

/// Parse DocTags against the page image they were generated from.
///
/// `name` becomes the document name.
pub fn parse_doctags(
    tags: &str,
    image: &DynamicImage,
    name: &str,
) -> Result<StructuredDocument, DoctagsError> {
    let page = PageSize {
        width: image.width(),
        height: image.height(),
    };
    let tokens = tokenize(tags);
    let mut parser = Parser {
        tokens,
        pos: 0,
        raw: tags,
        page,
        image,
    };
    let items = parser.document()?;
    debug!("Parsed {} items from {} chars of DocTags", items.len(), tags.len());

    Ok(StructuredDocument {
        name: name.to_string(),
        page,
        items,
    })
}

/// Accumulator for the content of one element.
#[derive(Default)]
struct Content {
    locs: Vec<u32>,
    text: String,
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    raw: &'a str,
    page: PageSize,
    image: &'a DynamicImage,
}

impl<'a> Parser<'a> {
    fn malformed(&self, detail: impl Into<String>) -> DoctagsError {
        DoctagsError::malformed(detail, self.raw)
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let tok = self.tokens.get(self.pos).copied();
        self.pos += 1;
        tok
    }

    fn document(&mut self) -> Result<Vec<DocItem>, DoctagsError> {
        loop {
            match self.next() {
                Some(Token::Text(t)) if t.trim().is_empty() => continue,
                Some(Token::Open("doctag")) => break,
                Some(Token::Text(_)) => return Err(self.malformed("text before the <doctag> root")),
                Some(_) | None => return Err(self.malformed("missing <doctag> root")),
            }
        }

        let mut items = Vec::new();
        loop {
            match self.next() {
                None => return Err(self.malformed("unclosed <doctag> root")),
                Some(Token::Close("doctag")) => return Ok(items),
                Some(Token::Text(t)) => {
                    if !t.trim().is_empty() {
                        return Err(self.malformed(format!(
                            "text outside of any element: {:?}",
                            t.trim()
                        )));
                    }
                }
                Some(Token::Close(name)) => {
                    return Err(self.malformed(format!("unexpected </{name}>")));
                }
                Some(Token::Open("form")) => items.extend(self.group("form")?),
                Some(Token::Open(name)) => items.push(self.item(name)?),
            }
        }
    }

    /// Children of a container element, flattened into the item list.
    fn group(&mut self, name: &str) -> Result<Vec<DocItem>, DoctagsError> {
        let mut items = Vec::new();
        let mut locs = Vec::new();
        loop {
            match self.next() {
                None => return Err(self.malformed(format!("unclosed <{name}>"))),
                Some(Token::Close(n)) if n == name => break,
                Some(Token::Close(n)) => {
                    return Err(self.malformed(format!("</{n}> while inside <{name}>")));
                }
                Some(Token::Text(t)) if t.trim().is_empty() => {}
                Some(Token::Text(t)) => {
                    return Err(self.malformed(format!("text {:?} directly inside <{name}>", t.trim())));
                }
                Some(Token::Open("form")) => items.extend(self.group("form")?),
                Some(Token::Open(n)) => {
                    if !self.location(n, &mut locs)? {
                        items.push(self.item(n)?);
                    }
                }
            }
        }
        self.bbox(&locs)?;
        Ok(items)
    }

    fn item(&mut self, name: &str) -> Result<DocItem, DoctagsError> {
        match name {
            "page_break" => Ok(DocItem {
                label: Label::PageBreak,
                bbox: None,
                body: ItemBody::Break,
            }),
            "code" => self.code(),
            "ordered_list" => self.list(name, true),
            "unordered_list" => self.list(name, false),
            "otsl" => self.table("otsl", Label::Table),
            "document_index" => self.table("document_index", Label::DocumentIndex),
            "key_value_region" => self.key_value_region(),
            "picture" => self.picture(),
            _ => match text_label(name) {
                Some(label) => {
                    let content = self.simple(name)?;
                    Ok(DocItem {
                        label,
                        bbox: self.bbox(&content.locs)?,
                        body: ItemBody::Text(content.text.trim().to_string()),
                    })
                }
                None => Err(self.malformed(format!("unknown tag <{name}>"))),
            },
        }
    }

    /// Record `<loc_N>` if `name` is one. Returns `Ok(false)` for other tags.
    fn location(&self, name: &str, locs: &mut Vec<u32>) -> Result<bool, DoctagsError> {
        let Some(value) = name.strip_prefix("loc_") else {
            return Ok(false);
        };
        let v: u32 = value
            .parse()
            .map_err(|_| self.malformed(format!("bad location tag <{name}>")))?;
        if v > LOC_GRID {
            return Err(self.malformed(format!("location {v} exceeds {LOC_GRID}")));
        }
        locs.push(v);
        Ok(true)
    }

    /// Content of a text-only element: locations and text until `</name>`.
    fn simple(&mut self, name: &str) -> Result<Content, DoctagsError> {
        let mut content = Content::default();
        loop {
            match self.next() {
                None => return Err(self.malformed(format!("unclosed <{name}>"))),
                Some(Token::Close(n)) if n == name => return Ok(content),
                Some(Token::Close(n)) if !is_vocabulary(n) => push_literal(&mut content.text, n, true),
                Some(Token::Close(n)) => {
                    return Err(self.malformed(format!("</{n}> while inside <{name}>")));
                }
                Some(Token::Text(t)) => content.text.push_str(t),
                Some(Token::Open(n)) => {
                    if self.location(n, &mut content.locs)? {
                        continue;
                    }
                    if is_vocabulary(n) {
                        return Err(self.malformed(format!("unexpected <{n}> inside <{name}>")));
                    }
                    push_literal(&mut content.text, n, false);
                }
            }
        }
    }

    /// A form's key/value region: its own text plus the text of nested
    /// text elements, in order.
    fn key_value_region(&mut self) -> Result<DocItem, DoctagsError> {
        const NAME: &str = "key_value_region";
        let mut locs = Vec::new();
        let mut parts: Vec<String> = Vec::new();
        let mut text = String::new();
        loop {
            match self.next() {
                None => return Err(self.malformed(format!("unclosed <{NAME}>"))),
                Some(Token::Close(NAME)) => break,
                Some(Token::Close(n)) if !is_vocabulary(n) => push_literal(&mut text, n, true),
                Some(Token::Close(n)) => {
                    return Err(self.malformed(format!("</{n}> while inside <{NAME}>")));
                }
                Some(Token::Text(t)) => text.push_str(t),
                Some(Token::Open(n)) => {
                    if self.location(n, &mut locs)? {
                        continue;
                    }
                    let Some(label) = text_label(n) else {
                        if is_vocabulary(n) {
                            return Err(self.malformed(format!("unexpected <{n}> inside <{NAME}>")));
                        }
                        push_literal(&mut text, n, false);
                        continue;
                    };
                    parts.push(std::mem::take(&mut text));
                    let inner = self.simple(n)?.text;
                    parts.push(match label {
                        Label::CheckboxSelected => format!("[x] {}", inner.trim()),
                        Label::CheckboxUnselected => format!("[ ] {}", inner.trim()),
                        _ => inner,
                    });
                }
            }
        }
        parts.push(text);
        let joined = parts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(DocItem {
            label: Label::KeyValueRegion,
            bbox: self.bbox(&locs)?,
            body: ItemBody::Text(joined),
        })
    }

    fn code(&mut self) -> Result<DocItem, DoctagsError> {
        let mut locs = Vec::new();
        let mut text = String::new();
        let mut language = None;
        loop {
            match self.next() {
                None => return Err(self.malformed("unclosed <code>")),
                Some(Token::Close("code")) => break,
                Some(Token::Close(n)) if !is_vocabulary(n) => push_literal(&mut text, n, true),
                Some(Token::Close(n)) => {
                    return Err(self.malformed(format!("</{n}> while inside <code>")));
                }
                Some(Token::Text(t)) => text.push_str(t),
                Some(Token::Open(n)) => {
                    if self.location(n, &mut locs)? {
                        continue;
                    }
                    match language_marker(n) {
                        Some(lang) if language.is_none() => language = Some(lang.to_string()),
                        _ if is_vocabulary(n) => {
                            return Err(self.malformed(format!("unexpected <{n}> inside <code>")));
                        }
                        _ => push_literal(&mut text, n, false),
                    }
                }
            }
        }
        Ok(DocItem {
            label: Label::Code,
            bbox: self.bbox(&locs)?,
            body: ItemBody::Code {
                language,
                text: text.trim_matches('\n').to_string(),
            },
        })
    }

    fn list(&mut self, name: &str, ordered: bool) -> Result<DocItem, DoctagsError> {
        let mut locs = Vec::new();
        let mut entries = Vec::new();
        loop {
            match self.next() {
                None => return Err(self.malformed(format!("unclosed <{name}>"))),
                Some(Token::Close(n)) if n == name => break,
                Some(Token::Close(n)) => {
                    return Err(self.malformed(format!("</{n}> while inside <{name}>")));
                }
                Some(Token::Text(t)) if t.trim().is_empty() => {}
                Some(Token::Text(t)) => {
                    return Err(self.malformed(format!("text {:?} outside of <list_item>", t.trim())));
                }
                Some(Token::Open("list_item")) => {
                    let content = self.simple("list_item")?;
                    entries.push(ListEntry {
                        text: content.text.trim().to_string(),
                        bbox: self.bbox(&content.locs)?,
                    });
                }
                Some(Token::Open(n)) => {
                    if !self.location(n, &mut locs)? {
                        return Err(self.malformed(format!("unexpected <{n}> inside <{name}>")));
                    }
                }
            }
        }
        Ok(DocItem {
            label: Label::List,
            bbox: self.bbox(&locs)?,
            body: ItemBody::List { ordered, entries },
        })
    }

    fn caption(&mut self) -> Result<String, DoctagsError> {
        // Caption location is not kept separately from its parent.
        Ok(self.simple("caption")?.text.trim().to_string())
    }

    /// An OTSL grid closed by `</name>`.
    fn table(&mut self, name: &str, label: Label) -> Result<DocItem, DoctagsError> {
        let mut locs = Vec::new();
        let mut caption = None;
        let mut rows: Vec<Vec<TableCell>> = Vec::new();
        let mut row: Vec<TableCell> = Vec::new();

        loop {
            match self.next() {
                None => return Err(self.malformed(format!("unclosed <{name}>"))),
                Some(Token::Close(n)) if n == name => break,
                Some(Token::Close(n)) if !is_vocabulary(n) && !row.is_empty() => {
                    if let Some(cell) = row.last_mut() {
                        push_literal(&mut cell.text, n, true);
                    }
                }
                Some(Token::Close(n)) => {
                    return Err(self.malformed(format!("</{n}> while inside <{name}>")));
                }
                Some(Token::Text(t)) => match row.last_mut() {
                    Some(cell) => cell.text.push_str(t),
                    None if t.trim().is_empty() => {}
                    None => {
                        return Err(self.malformed(format!("text {:?} outside of a table cell", t.trim())));
                    }
                },
                Some(Token::Open("nl")) => rows.push(std::mem::take(&mut row)),
                Some(Token::Open("caption")) => caption = Some(self.caption()?),
                Some(Token::Open(n)) => {
                    if self.location(n, &mut locs)? {
                        continue;
                    }
                    match CellKind::from_tag(n) {
                        Some(kind) => row.push(TableCell {
                            kind,
                            text: String::new(),
                        }),
                        None if !is_vocabulary(n) && !row.is_empty() => {
                            if let Some(cell) = row.last_mut() {
                                push_literal(&mut cell.text, n, false);
                            }
                        }
                        None => {
                            return Err(self.malformed(format!("unexpected <{n}> inside <{name}>")));
                        }
                    }
                }
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }

        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for r in &mut rows {
            for cell in r.iter_mut() {
                cell.text = cell.text.trim().to_string();
            }
            r.resize_with(width, || TableCell {
                kind: CellKind::Empty,
                text: String::new(),
            });
        }
        rows.retain(|r| !r.is_empty());

        Ok(DocItem {
            label,
            bbox: self.bbox(&locs)?,
            body: ItemBody::Table(TableData { rows, caption }),
        })
    }

    fn picture(&mut self) -> Result<DocItem, DoctagsError> {
        let mut locs = Vec::new();
        let mut caption = None;
        let mut classification = None;
        let mut chart = None;
        loop {
            match self.next() {
                None => return Err(self.malformed("unclosed <picture>")),
                Some(Token::Close("picture")) => break,
                Some(Token::Close(n)) => {
                    return Err(self.malformed(format!("</{n}> while inside <picture>")));
                }
                Some(Token::Text(t)) if t.trim().is_empty() => {}
                Some(Token::Text(t)) => {
                    return Err(self.malformed(format!("text {:?} inside <picture>", t.trim())));
                }
                Some(Token::Open("caption")) => caption = Some(self.caption()?),
                Some(Token::Open("otsl")) => {
                    if let ItemBody::Table(data) = self.table("otsl", Label::Table)?.body {
                        chart = Some(data);
                    }
                }
                Some(Token::Open(n)) => {
                    if self.location(n, &mut locs)? {
                        continue;
                    }
                    if ELEMENTS.contains(&n) {
                        return Err(self.malformed(format!("unexpected <{n}> inside <picture>")));
                    }
                    classification = Some(n.to_string());
                }
            }
        }

        let bbox = self.bbox(&locs)?;
        let png = bbox.and_then(|b| self.crop(b));
        Ok(DocItem {
            label: Label::Picture,
            bbox,
            body: ItemBody::Picture(PictureData {
                caption,
                classification,
                chart,
                png,
            }),
        })
    }

    /// Scale grid locations into a pixel box clamped to the page.
    fn bbox(&self, locs: &[u32]) -> Result<Option<BoundingBox>, DoctagsError> {
        match *locs {
            [] => Ok(None),
            [x0, y0, x1, y1] => {
                if x0 > x1 || y0 > y1 {
                    return Err(self.malformed(format!(
                        "inverted location box ({x0}, {y0}, {x1}, {y1})"
                    )));
                }
                let sx = |v: u32| scale(v, self.page.width);
                let sy = |v: u32| scale(v, self.page.height);
                Ok(Some(BoundingBox {
                    l: sx(x0),
                    t: sy(y0),
                    r: sx(x1),
                    b: sy(y1),
                }))
            }
            _ => Err(self.malformed(format!(
                "expected 4 location values, found {}",
                locs.len()
            ))),
        }
    }

    fn crop(&self, b: BoundingBox) -> Option<Vec<u8>> {
        if b.is_empty() {
            return None;
        }
        let region = self.image.crop_imm(b.l, b.t, b.width(), b.height());
        match encode::encode_png(&region) {
            Ok(png) => Some(png),
            Err(e) => {
                warn!("Failed to encode picture crop: {}", e);
                None
            }
        }
    }
}

fn scale(v: u32, extent: u32) -> u32 {
    let px = (u64::from(v) * u64::from(extent) + u64::from(LOC_GRID) / 2) / u64::from(LOC_GRID);
    (px as u32).min(extent)
}
