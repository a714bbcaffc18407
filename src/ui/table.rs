// Tue Jan 13 2026 - Alex

use colored::*;
use std::cmp::max;

pub struct TableBuilder {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    column_widths: Vec<usize>,
    alignment: Vec<Alignment>,
    use_color: bool,
    border_style: BorderStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderStyle {
    None,
    Ascii,
    Unicode,
}

struct BorderChars {
    vertical: char,
    horizontal: char,
    corners: [char; 9],
}

impl BorderChars {
    fn for_style(style: BorderStyle) -> Option<Self> {
        match style {
            BorderStyle::None => None,
            BorderStyle::Ascii => Some(Self {
                vertical: '|',
                horizontal: '-',
                corners: ['+'; 9],
            }),
            BorderStyle::Unicode => Some(Self {
                vertical: '│',
                horizontal: '─',
                corners: ['┌', '┬', '┐', '├', '┼', '┤', '└', '┴', '┘'],
            }),
        }
    }
}

#[derive(Clone, Copy)]
enum LinePosition {
    Top = 0,
    Middle = 3,
    Bottom = 6,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
            rows: Vec::new(),
            column_widths: Vec::new(),
            alignment: Vec::new(),
            use_color: true,
            border_style: BorderStyle::Unicode,
        }
    }

    pub fn with_headers(mut self, headers: &[&str]) -> Self {
        self.headers = headers.iter().map(|s| s.to_string()).collect();
        self.column_widths = self.headers.iter().map(|h| h.chars().count()).collect();
        self.alignment = vec![Alignment::Left; self.headers.len()];
        self
    }

    pub fn add_row<T: std::fmt::Display>(mut self, row: &[T]) -> Self {
        let string_row: Vec<String> = row.iter().map(|c| c.to_string()).collect();

        for (i, cell) in string_row.iter().enumerate() {
            let len = cell.chars().count();
            if i < self.column_widths.len() {
                self.column_widths[i] = max(self.column_widths[i], len);
            } else {
                self.column_widths.push(len);
            }
        }

        self.rows.push(string_row);
        self
    }

    pub fn with_alignment(mut self, column: usize, alignment: Alignment) -> Self {
        if column < self.alignment.len() {
            self.alignment[column] = alignment;
        }
        self
    }

    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    pub fn with_border_style(mut self, style: BorderStyle) -> Self {
        self.border_style = style;
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn align_cell(&self, content: &str, width: usize, alignment: Alignment) -> String {
        match alignment {
            Alignment::Left => format!("{:<width$}", content, width = width),
            Alignment::Right => format!("{:>width$}", content, width = width),
        }
    }

    pub fn build(&self) -> String {
        if self.headers.is_empty() && self.rows.is_empty() {
            return String::new();
        }

        let chars = BorderChars::for_style(self.border_style);
        let mut output = Vec::new();

        if let Some(chars) = &chars {
            output.push(self.build_horizontal_line(chars, LinePosition::Top));
        }
        if !self.headers.is_empty() {
            output.push(self.build_row(&self.headers, chars.as_ref(), true));
            if let Some(chars) = &chars {
                output.push(self.build_horizontal_line(chars, LinePosition::Middle));
            }
        }
        for row in &self.rows {
            output.push(self.build_row(row, chars.as_ref(), false));
        }
        if let Some(chars) = &chars {
            output.push(self.build_horizontal_line(chars, LinePosition::Bottom));
        }

        output.join("\n")
    }

    fn build_row(&self, cells: &[String], chars: Option<&BorderChars>, is_header: bool) -> String {
        let mut parts = Vec::new();
        if let Some(chars) = chars {
            parts.push(chars.vertical.to_string());
        }

        for (i, width) in self.column_widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            let alignment = self.alignment.get(i).copied().unwrap_or(Alignment::Left);
            let aligned = self.align_cell(cell, *width, alignment);
            let formatted = if is_header && self.use_color {
                aligned.bold().to_string()
            } else {
                aligned
            };

            parts.push(format!(" {} ", formatted));
            if let Some(chars) = chars {
                parts.push(chars.vertical.to_string());
            }
        }

        parts.join("")
    }

    fn build_horizontal_line(&self, chars: &BorderChars, position: LinePosition) -> String {
        let at = position as usize;
        let (left, middle, right) = (chars.corners[at], chars.corners[at + 1], chars.corners[at + 2]);

        let mut line = left.to_string();
        for (i, &width) in self.column_widths.iter().enumerate() {
            line.push_str(&chars.horizontal.to_string().repeat(width + 2));
            if i + 1 < self.column_widths.len() {
                line.push(middle);
            }
        }
        line.push(right);
        line
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}
