//! Markdown export.
//!
//! Page headers and footers are left out. Tables are GitHub-flavoured with
//! the first OTSL row as the header row; merged cells repeat the text of the
//! cell they were merged into. Checkboxes render as task-list entries.

use crate::document::{DocItem, ItemBody, Label, StructuredDocument, TableData};

/// Render the document as Markdown. Blocks are separated by a blank line.
pub fn export_markdown(doc: &StructuredDocument) -> String {
    doc.items
        .iter()
        .filter(|item| !item.label.is_furniture())
        .filter_map(render_item)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_item(item: &DocItem) -> Option<String> {
    match (&item.label, &item.body) {
        (_, ItemBody::Break) => None,
        (Label::Title, ItemBody::Text(t)) => heading(1, t),
        (Label::SectionHeader(level), ItemBody::Text(t)) => heading(*level as usize + 1, t),
        (Label::ListItem, ItemBody::Text(t)) => non_empty(t).map(|t| format!("- {t}")),
        (Label::CheckboxSelected, ItemBody::Text(t)) => Some(format!("- [x] {}", t.trim())),
        (Label::CheckboxUnselected, ItemBody::Text(t)) => Some(format!("- [ ] {}", t.trim())),
        (Label::Formula, ItemBody::Text(t)) => non_empty(t).map(|t| format!("$${t}$$")),
        (_, ItemBody::Text(t)) => non_empty(t).map(str::to_string),
        (_, ItemBody::Code { language, text }) => Some(format!(
            "```{}\n{}\n```",
            language.as_deref().unwrap_or(""),
            text
        )),
        (_, ItemBody::List { ordered, entries }) => {
            let lines: Vec<String> = entries
                .iter()
                .enumerate()
                .map(|(i, e)| {
                    if *ordered {
                        format!("{}. {}", i + 1, e.text)
                    } else {
                        format!("- {}", e.text)
                    }
                })
                .collect();
            (!lines.is_empty()).then(|| lines.join("\n"))
        }
        (_, ItemBody::Table(table)) => {
            let mut blocks = Vec::new();
            if let Some(c) = table.caption.as_deref().and_then(non_empty) {
                blocks.push(c.to_string());
            }
            if let Some(t) = table_markdown(table) {
                blocks.push(t);
            }
            (!blocks.is_empty()).then(|| blocks.join("\n\n"))
        }
        (_, ItemBody::Picture(pic)) => {
            let mut blocks = Vec::new();
            if let Some(c) = pic.caption.as_deref().and_then(non_empty) {
                blocks.push(c.to_string());
            }
            blocks.push("<!-- image -->".to_string());
            if let Some(t) = pic.chart.as_ref().and_then(table_markdown) {
                blocks.push(t);
            }
            Some(blocks.join("\n\n"))
        }
    }
}

fn non_empty(t: &str) -> Option<&str> {
    let t = t.trim();
    (!t.is_empty()).then_some(t)
}

fn heading(level: usize, text: &str) -> Option<String> {
    non_empty(text).map(|t| format!("{} {}", "#".repeat(level.min(6)), t))
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn table_markdown(table: &TableData) -> Option<String> {
    let grid = table.resolved_grid();
    let cols = table.num_cols();
    if grid.is_empty() || cols == 0 {
        return None;
    }

    let row_line = |row: &[String]| -> String {
        let cells: Vec<String> = row.iter().map(|c| escape_cell(c)).collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(grid.len() + 1);
    lines.push(row_line(&grid[0]));
    lines.push(format!("|{}", " --- |".repeat(cols)));
    for row in &grid[1..] {
        lines.push(row_line(row));
    }
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_doctags;
    use image::{DynamicImage, RgbaImage};

    fn md(tags: &str) -> String {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(100, 100));
        export_markdown(&parse_doctags(tags, &img, "SampleDocument").unwrap())
    }

    #[test]
    fn hello_world() {
        assert_eq!(
            md("<doctag><text><loc_0><loc_0><loc_500><loc_500>Hello World</text></doctag>"),
            "Hello World"
        );
    }

    #[test]
    fn headings_paragraphs_and_lists() {
        let out = md("<doctag><title>Plan</title><section_header_level_1>Costs</section_header_level_1>\
                      <text>Body</text><unordered_list><list_item>a</list_item><list_item>b</list_item>\
                      </unordered_list><ordered_list><list_item>x</list_item></ordered_list></doctag>");
        assert_eq!(out, "# Plan\n\n## Costs\n\nBody\n\n- a\n- b\n\n1. x");
    }

    #[test]
    fn furniture_is_omitted() {
        let out = md("<doctag><page_header>H</page_header><text>t</text><page_footer>F</page_footer></doctag>");
        assert_eq!(out, "t");
    }

    #[test]
    fn table_with_merged_cells() {
        let out = md("<doctag><otsl><ched>Service<ched>Cost<lcel><nl><fcel>A|B<fcel>$1<fcel>$2<nl>\
                      <caption>Table 1</caption></otsl></doctag>");
        assert_eq!(
            out,
            "Table 1\n\n| Service | Cost | Cost |\n| --- | --- | --- |\n| A\\|B | $1 | $2 |"
        );
    }

    #[test]
    fn code_formula_and_picture() {
        let out = md("<doctag><code><_Rust_>fn main() {}</code><formula>E=mc^2</formula>\
                      <picture><caption>Fig</caption></picture></doctag>");
        assert_eq!(out, "```Rust\nfn main() {}\n```\n\n$$E=mc^2$$\n\nFig\n\n<!-- image -->");
    }

    #[test]
    fn empty_document_is_empty_string() {
        assert_eq!(md("<doctag></doctag>"), "");
    }

    #[test]
    fn checkboxes_render_as_task_list() {
        let out = md("<doctag><checkbox_selected>Yes</checkbox_selected>\
                      <checkbox_unselected>No</checkbox_unselected></doctag>");
        assert_eq!(out, "- [x] Yes\n\n- [ ] No");
    }

    #[test]
    fn chart_table_follows_image_marker() {
        let out = md("<doctag><picture><pie_chart><otsl><ched>Part<ched>Share<nl><fcel>A<fcel>60%<nl></otsl>\
                      </picture></doctag>");
        assert_eq!(
            out,
            "<!-- image -->\n\n| Part | Share |\n| --- | --- |\n| A | 60% |"
        );
    }
}
