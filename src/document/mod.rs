//! The structured document built from DocTags, and its exporters.
//!
//! ```text
//! DocTags ──▶ parse ──▶ StructuredDocument ──┬──▶ markdown
//!  + image                                   └──▶ html
//! ```
//!
//! A [`StructuredDocument`] is built once by [`parse::parse_doctags`] and is
//! only read afterwards. Every item either carries a [`BoundingBox`] inside
//! the page, in image pixel space, or is text-only (`bbox: None`).

pub mod html;
pub mod markdown;
pub mod parse;

pub use html::{render_html, save_html};
pub use markdown::export_markdown;
pub use parse::parse_doctags;

use serde::Serialize;

/// Pixel size of the page image the document was anchored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageSize {
    pub width: u32,
    pub height: u32,
}

/// An item's region on the page, in pixels, left/top inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub l: u32,
    pub t: u32,
    pub r: u32,
    pub b: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.r.saturating_sub(self.l)
    }

    pub fn height(&self) -> u32 {
        self.b.saturating_sub(self.t)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Semantic role of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Label {
    Title,
    /// Section header with level 1..=6.
    SectionHeader(u8),
    Text,
    Caption,
    Footnote,
    PageHeader,
    PageFooter,
    Code,
    Formula,
    ListItem,
    List,
    Table,
    Picture,
    PageBreak,
    CheckboxSelected,
    CheckboxUnselected,
    /// A key/value region of a form, flattened to its text.
    KeyValueRegion,
    /// Table of contents, carried as an OTSL table.
    DocumentIndex,
}

impl Label {
    /// Page furniture that exporters leave out of the body.
    pub fn is_furniture(&self) -> bool {
        matches!(self, Label::PageHeader | Label::PageFooter)
    }
}

/// One entry of a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub text: String,
    pub bbox: Option<BoundingBox>,
}

/// OTSL cell kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellKind {
    /// `fcel`: cell with content.
    Filled,
    /// `ecel`: empty cell.
    Empty,
    /// `ched`: column header.
    ColumnHeader,
    /// `rhed`: row header.
    RowHeader,
    /// `srow`: section row.
    Section,
    /// `lcel`: merged with the cell to the left.
    MergeLeft,
    /// `ucel`: merged with the cell above.
    MergeUp,
    /// `xcel`: merged both left and up.
    MergeBoth,
}

impl CellKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "fcel" => CellKind::Filled,
            "ecel" => CellKind::Empty,
            "ched" => CellKind::ColumnHeader,
            "rhed" => CellKind::RowHeader,
            "srow" => CellKind::Section,
            "lcel" => CellKind::MergeLeft,
            "ucel" => CellKind::MergeUp,
            "xcel" => CellKind::MergeBoth,
            _ => return None,
        })
    }

    /// Whether this cell continues a span started elsewhere.
    pub fn is_merge(&self) -> bool {
        matches!(self, CellKind::MergeLeft | CellKind::MergeUp | CellKind::MergeBoth)
    }

    pub fn is_header(&self) -> bool {
        matches!(self, CellKind::ColumnHeader | CellKind::RowHeader)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCell {
    pub kind: CellKind,
    pub text: String,
}

/// A table as a rectangular OTSL grid. Short rows are padded with empty cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableData {
    pub rows: Vec<Vec<TableCell>>,
    pub caption: Option<String>,
}

impl TableData {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_cols(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Cell texts with merged cells resolved to the text of their origin cell.
    pub fn resolved_grid(&self) -> Vec<Vec<String>> {
        let mut grid: Vec<Vec<String>> = Vec::with_capacity(self.rows.len());
        for (r, row) in self.rows.iter().enumerate() {
            let mut out: Vec<String> = Vec::with_capacity(row.len());
            for (c, cell) in row.iter().enumerate() {
                let left = c.checked_sub(1).and_then(|lc| out.get(lc)).cloned();
                let up = r
                    .checked_sub(1)
                    .and_then(|ur| grid.get(ur))
                    .and_then(|prev| prev.get(c))
                    .cloned();
                let text = match cell.kind {
                    CellKind::MergeLeft => left.unwrap_or_default(),
                    CellKind::MergeUp => up.unwrap_or_default(),
                    CellKind::MergeBoth => left.or(up).unwrap_or_default(),
                    _ => cell.text.clone(),
                };
                out.push(text);
            }
            grid.push(out);
        }
        grid
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PictureData {
    pub caption: Option<String>,
    /// Classification marker emitted inside the picture, e.g. `pie_chart`.
    pub classification: Option<String>,
    /// Data table extracted from a chart, when the model emitted one.
    pub chart: Option<TableData>,
    /// PNG crop of the picture region.
    #[serde(skip)]
    pub png: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ItemBody {
    Text(String),
    Code { language: Option<String>, text: String },
    List { ordered: bool, entries: Vec<ListEntry> },
    Table(TableData),
    Picture(PictureData),
    Break,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocItem {
    pub label: Label,
    pub bbox: Option<BoundingBox>,
    pub body: ItemBody,
}

impl DocItem {
    /// The item's text, for text-like items.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            ItemBody::Text(t) | ItemBody::Code { text: t, .. } => Some(t),
            _ => None,
        }
    }
}

/// A parsed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredDocument {
    pub name: String,
    pub page: PageSize,
    pub items: Vec<DocItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: CellKind, text: &str) -> TableCell {
        TableCell {
            kind,
            text: text.to_string(),
        }
    }

    #[test]
    fn resolved_grid_copies_origin_text() {
        let table = TableData {
            rows: vec![
                vec![cell(CellKind::ColumnHeader, "A"), cell(CellKind::MergeLeft, "")],
                vec![cell(CellKind::Filled, "x"), cell(CellKind::Filled, "y")],
                vec![cell(CellKind::MergeUp, ""), cell(CellKind::MergeBoth, "")],
            ],
            caption: None,
        };
        assert_eq!(
            table.resolved_grid(),
            vec![vec!["A", "A"], vec!["x", "y"], vec!["x", "x"]]
        );
    }

    #[test]
    fn merge_both_in_first_column_copies_up() {
        let table = TableData {
            rows: vec![
                vec![cell(CellKind::Filled, "top")],
                vec![cell(CellKind::MergeBoth, "")],
            ],
            caption: None,
        };
        assert_eq!(table.resolved_grid()[1][0], "top");
    }

    #[test]
    fn bbox_dimensions() {
        let b = BoundingBox { l: 10, t: 20, r: 30, b: 20 };
        assert_eq!(b.width(), 20);
        assert!(b.is_empty());
    }
}
