//! Line-group block parsing for the chat markdown dialect

use super::inline::render_inline;
use regex::Regex;
use std::sync::LazyLock;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*)$").expect("valid heading pattern"));
static BLOCKQUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*>\s?(.*)$").expect("valid blockquote pattern"));
static ORDERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\.\s+(.*)$").expect("valid ordered item pattern"));
static UNORDERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*+]\s+(.*)$").expect("valid unordered item pattern"));
static SEPARATOR_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^:?-+:?$").expect("valid separator pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Default,
    Left,
    Center,
    Right,
}

impl Alignment {
    fn from_separator(cell: &str) -> Self {
        match (cell.starts_with(':'), cell.ends_with(':')) {
            (true, true) if cell.len() > 1 => Alignment::Center,
            (true, false) => Alignment::Left,
            (false, true) => Alignment::Right,
            _ => Alignment::Default,
        }
    }

    fn style_attr(self) -> &'static str {
        match self {
            Alignment::Default => "",
            Alignment::Left => r#" style="text-align:left;""#,
            Alignment::Center => r#" style="text-align:center;""#,
            Alignment::Right => r#" style="text-align:right;""#,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: usize, text: String },
    Paragraph(Vec<String>),
    Blockquote(Vec<String>),
    List { ordered: bool, items: Vec<String> },
    Table {
        header: Vec<String>,
        alignments: Vec<Alignment>,
        rows: Vec<Vec<String>>,
    },
}

impl Block {
    pub fn to_html(&self) -> String {
        match self {
            Block::Heading { level, text } => {
                format!("<h{level}>{}</h{level}>", render_inline(text))
            }
            Block::Paragraph(lines) => format!("<p>{}</p>", render_lines(lines)),
            Block::Blockquote(lines) => {
                format!("<blockquote>{}</blockquote>", render_lines(lines))
            }
            Block::List { ordered, items } => {
                let tag = if *ordered { "ol" } else { "ul" };
                let items: String = items
                    .iter()
                    .map(|item| format!("<li>{}</li>", render_inline(item)))
                    .collect();
                format!("<{tag}>{items}</{tag}>")
            }
            Block::Table {
                header,
                alignments,
                rows,
            } => {
                let head = render_row(header, alignments, "th");
                let body: String = rows
                    .iter()
                    .map(|row| format!("<tr>{}</tr>", render_row(row, alignments, "td")))
                    .collect();
                format!("<table><thead><tr>{head}</tr></thead><tbody>{body}</tbody></table>")
            }
        }
    }
}

/// Each line is formatted on its own, then joined with line breaks
fn render_lines(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| render_inline(line))
        .collect::<Vec<_>>()
        .join("<br>")
}

fn render_row(cells: &[String], alignments: &[Alignment], tag: &str) -> String {
    cells
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let align = alignments
                .get(idx)
                .copied()
                .unwrap_or(Alignment::Default)
                .style_attr();
            format!("<{tag}{align}>{}</{tag}>", render_inline(cell))
        })
        .collect()
}

fn split_table_row(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('|').unwrap_or(trimmed);
    trimmed.split('|').map(|cell| cell.trim().to_string()).collect()
}

fn is_table_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.contains('|')
        && split_table_row(trimmed)
            .iter()
            .all(|cell| SEPARATOR_CELL.is_match(cell))
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    paragraph: Vec<String>,
    blockquote: Vec<String>,
    list: Option<(bool, Vec<String>)>,
}

impl BlockBuilder {
    fn flush_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            self.blocks
                .push(Block::Paragraph(std::mem::take(&mut self.paragraph)));
        }
    }

    fn flush_blockquote(&mut self) {
        if !self.blockquote.is_empty() {
            self.blocks
                .push(Block::Blockquote(std::mem::take(&mut self.blockquote)));
        }
    }

    fn flush_list(&mut self) {
        if let Some((ordered, items)) = self.list.take() {
            self.blocks.push(Block::List { ordered, items });
        }
    }

    fn flush_all(&mut self) {
        self.flush_paragraph();
        self.flush_list();
        self.flush_blockquote();
    }

    fn push_item(&mut self, ordered: bool, item: String) {
        self.flush_paragraph();
        if matches!(self.list, Some((kind, _)) if kind != ordered) {
            self.flush_list();
        }
        self.list
            .get_or_insert_with(|| (ordered, Vec::new()))
            .1
            .push(item);
    }
}

pub fn parse_blocks(text: &str) -> Vec<Block> {
    let lines: Vec<&str> = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();
    let mut builder = BlockBuilder::default();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        i += 1;

        if line.trim().is_empty() {
            builder.flush_all();
            continue;
        }

        if let Some(caps) = HEADING.captures(line) {
            builder.flush_all();
            builder.blocks.push(Block::Heading {
                level: caps[1].len(),
                text: caps[2].to_string(),
            });
            continue;
        }

        if let Some(caps) = BLOCKQUOTE.captures(line) {
            builder.flush_paragraph();
            builder.flush_list();
            builder.blockquote.push(caps[1].to_string());
            continue;
        }
        builder.flush_blockquote();

        let next = lines.get(i).copied().unwrap_or_default();
        if !next.is_empty() && line.contains('|') && is_table_separator(next) {
            builder.flush_all();
            let header = split_table_row(line);
            let alignments = split_table_row(next)
                .iter()
                .map(|cell| Alignment::from_separator(cell))
                .collect();
            let mut rows = Vec::new();
            i += 1;
            while let Some(row) = lines.get(i) {
                if row.trim().is_empty() || !row.contains('|') || is_table_separator(row) {
                    break;
                }
                rows.push(split_table_row(row));
                i += 1;
            }
            builder.blocks.push(Block::Table {
                header,
                alignments,
                rows,
            });
            continue;
        }

        if let Some(caps) = ORDERED_ITEM.captures(line) {
            builder.push_item(true, caps[1].to_string());
            continue;
        }
        if let Some(caps) = UNORDERED_ITEM.captures(line) {
            builder.push_item(false, caps[1].to_string());
            continue;
        }

        builder.flush_list();
        builder.paragraph.push(line.to_string());
    }

    builder.flush_all();
    builder.blocks
}

pub fn render_blocks(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    parse_blocks(text).iter().map(Block::to_html).collect()
}
