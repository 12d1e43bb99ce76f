//! HTML export: one self-contained page.
//!
//! Picture crops are inlined as `data:image/png;base64` URIs so the file has
//! no external references. Table spans are rebuilt from the OTSL merge cells.

use crate::document::{CellKind, DocItem, ItemBody, Label, PictureData, StructuredDocument, TableData};
use crate::error::DoctagsError;
use crate::output;
use crate::pipeline::encode::png_data_uri;
use html_escape::encode_text;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

const STYLE: &str = "body{font-family:-apple-system,Segoe UI,Helvetica,Arial,sans-serif;\
max-width:900px;margin:2em auto;padding:0 1em;line-height:1.5;color:#222}\
table{border-collapse:collapse;margin:1em 0}\
th,td{border:1px solid #bbb;padding:4px 8px;vertical-align:top}\
th{background:#f3f3f3}\
figure{margin:1em 0}figure img{max-width:100%;border:1px solid #ddd}\
pre{background:#f6f8fa;padding:1em;overflow-x:auto}\
.formula{font-family:monospace;margin:1em 0}\
.footnote{font-size:0.85em;color:#555}";

/// Render the document to a complete HTML string.
pub fn render_html(doc: &StructuredDocument) -> String {
    let mut body = String::new();
    for item in doc.items.iter().filter(|i| !i.label.is_furniture()) {
        render_item(&mut body, item);
    }
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <title>{}</title>\n<style>{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        encode_text(&doc.name),
        STYLE,
        body
    )
}

/// Write the HTML export to `path`, replacing any existing file.
pub async fn save_html(doc: &StructuredDocument, path: &Path) -> Result<(), DoctagsError> {
    let html = render_html(doc);
    output::write_atomic(path, html.as_bytes()).await?;
    info!("HTML written to {}", path.display());
    Ok(())
}

fn render_item(out: &mut String, item: &DocItem) {
    match (&item.label, &item.body) {
        (_, ItemBody::Break) => out.push_str("<hr>\n"),
        (Label::Title, ItemBody::Text(t)) => tag(out, "h1", None, t),
        (Label::SectionHeader(level), ItemBody::Text(t)) => {
            let h = format!("h{}", (*level as usize + 1).min(6));
            tag(out, &h, None, t);
        }
        (Label::Caption, ItemBody::Text(t)) => tag(out, "p", Some("caption"), t),
        (Label::Footnote, ItemBody::Text(t)) => tag(out, "p", Some("footnote"), t),
        (Label::Formula, ItemBody::Text(t)) => tag(out, "div", Some("formula"), t),
        (Label::CheckboxSelected, ItemBody::Text(t)) => {
            let _ = writeln!(out, "<p><input type=\"checkbox\" checked disabled> {}</p>", encode_text(t));
        }
        (Label::CheckboxUnselected, ItemBody::Text(t)) => {
            let _ = writeln!(out, "<p><input type=\"checkbox\" disabled> {}</p>", encode_text(t));
        }
        (Label::ListItem, ItemBody::Text(t)) => {
            let _ = writeln!(out, "<ul><li>{}</li></ul>", encode_text(t));
        }
        (_, ItemBody::Text(t)) => tag(out, "p", None, t),
        (_, ItemBody::Code { language, text }) => {
            let class = language
                .as_deref()
                .map(|l| format!(" class=\"language-{}\"", encode_text(&l.to_lowercase())))
                .unwrap_or_default();
            let _ = writeln!(out, "<pre><code{}>{}</code></pre>", class, encode_text(text));
        }
        (_, ItemBody::List { ordered, entries }) => {
            let list = if *ordered { "ol" } else { "ul" };
            let _ = writeln!(out, "<{list}>");
            for e in entries {
                let _ = writeln!(out, "<li>{}</li>", encode_text(&e.text));
            }
            let _ = writeln!(out, "</{list}>");
        }
        (_, ItemBody::Table(table)) => render_table(out, table),
        (_, ItemBody::Picture(pic)) => render_picture(out, pic),
    }
}

fn tag(out: &mut String, name: &str, class: Option<&str>, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    match class {
        Some(c) => {
            let _ = writeln!(out, "<{name} class=\"{c}\">{}</{name}>", encode_text(text));
        }
        None => {
            let _ = writeln!(out, "<{name}>{}</{name}>", encode_text(text));
        }
    }
}

fn render_picture(out: &mut String, pic: &PictureData) {
    out.push_str("<figure>\n");
    match &pic.png {
        Some(png) => {
            let alt = pic.caption.as_deref().unwrap_or("picture");
            let _ = writeln!(out, "<img src=\"{}\" alt=\"{}\">", png_data_uri(png), encode_text(alt));
        }
        None => out.push_str("<!-- image -->\n"),
    }
    if let Some(chart) = &pic.chart {
        render_table(out, chart);
    }
    if let Some(c) = &pic.caption {
        let _ = writeln!(out, "<figcaption>{}</figcaption>", encode_text(c));
    }
    out.push_str("</figure>\n");
}

/// Column and row span of the origin cell at `(r, c)`.
fn spans(table: &TableData, r: usize, c: usize) -> (usize, usize) {
    let row = &table.rows[r];
    let colspan = 1 + row[c + 1..]
        .iter()
        .take_while(|cell| matches!(cell.kind, CellKind::MergeLeft | CellKind::MergeBoth))
        .count();
    let rowspan = 1 + table.rows[r + 1..]
        .iter()
        .take_while(|next| {
            next.get(c)
                .is_some_and(|cell| matches!(cell.kind, CellKind::MergeUp | CellKind::MergeBoth))
        })
        .count();
    (colspan, rowspan)
}

fn render_table(out: &mut String, table: &TableData) {
    if table.num_rows() == 0 {
        if let Some(c) = &table.caption {
            tag(out, "p", Some("caption"), c);
        }
        return;
    }

    out.push_str("<table>\n");
    if let Some(c) = &table.caption {
        let _ = writeln!(out, "<caption>{}</caption>", encode_text(c));
    }
    for (r, row) in table.rows.iter().enumerate() {
        out.push_str("<tr>");
        for (c, cell) in row.iter().enumerate() {
            if cell.kind.is_merge() {
                continue;
            }
            let el = if cell.kind.is_header() { "th" } else { "td" };
            let (colspan, rowspan) = spans(table, r, c);
            let _ = write!(out, "<{el}");
            if colspan > 1 {
                let _ = write!(out, " colspan=\"{colspan}\"");
            }
            if rowspan > 1 {
                let _ = write!(out, " rowspan=\"{rowspan}\"");
            }
            if cell.kind == CellKind::Section {
                out.push_str(" class=\"section\"");
            }
            let _ = write!(out, ">{}</{el}>", encode_text(&cell.text));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
}
