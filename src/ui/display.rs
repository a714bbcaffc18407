// Tue Jan 13 2026 - Alex

use crate::rebind::{IndirectSlot, PreviousAddress, RebindReport};
use crate::ui::table::{Alignment, BorderStyle, TableBuilder};
use crate::utils::{pluralize, truncate_start};
use colored::*;

const LIBRARY_COLUMN_WIDTH: usize = 40;

pub struct DisplayRenderer {
    use_color: bool,
    border_style: BorderStyle,
}

impl DisplayRenderer {
    pub fn new() -> Self {
        Self {
            use_color: true,
            border_style: BorderStyle::Unicode,
        }
    }

    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    pub fn with_border_style(mut self, style: BorderStyle) -> Self {
        self.border_style = style;
        self
    }

    fn table(&self, headers: &[&str]) -> TableBuilder {
        TableBuilder::new()
            .with_headers(headers)
            .with_color(self.use_color)
            .with_border_style(self.border_style)
    }

    pub fn render_slots(&self, slots: &[IndirectSlot]) -> String {
        let mut table = self
            .table(&["Section", "Slot", "Symbol", "Ord", "Library", "Value"])
            .with_alignment(3, Alignment::Right);
        for slot in slots {
            let library = match (&slot.library, slot.ordinal) {
                (Some(lib), _) => truncate_start(lib, LIBRARY_COLUMN_WIDTH),
                (None, 0) => "(self)".to_string(),
                (None, _) => "?".to_string(),
            };
            table = table.add_row(&[
                slot.section.clone(),
                slot.address.to_string(),
                slot.symbol.clone(),
                slot.ordinal.to_string(),
                library,
                slot.value.to_string(),
            ]);
        }
        format!("{}\n{}", table.build(), pluralize(slots.len(), "slot", "slots"))
    }

    pub fn render_report(&self, report: &RebindReport) -> String {
        let mut out = Vec::new();
        let header = report.to_string();
        out.push(match (&report.skipped, self.use_color) {
            (_, false) => header,
            (Some(_), true) => header.yellow().to_string(),
            (None, true) => header.green().to_string(),
        });

        if !report.rewrites.is_empty() {
            let mut table = self
                .table(&["Section", "Slot", "Symbol", "Ord", "Previous", "Replacement"])
                .with_alignment(3, Alignment::Right);
            for rewrite in &report.rewrites {
                table = table.add_row(&[
                    rewrite.section.clone(),
                    rewrite.slot.to_string(),
                    rewrite.symbol.clone(),
                    rewrite.ordinal.to_string(),
                    rewrite.previous.to_string(),
                    rewrite.replacement.to_string(),
                ]);
            }
            out.push(table.build());
        }
        out.join("\n")
    }

    /// One line per request: what its previous-address cell captured.
    pub fn render_captures(&self, captures: &[(String, PreviousAddress)]) -> String {
        captures
            .iter()
            .map(|(name, previous)| {
                let value = match previous.get() {
                    Some(addr) => addr.to_string(),
                    None => "not captured".to_string(),
                };
                if self.use_color {
                    format!("  {} {} {}", name.cyan(), "was".dimmed(), value)
                } else {
                    format!("  {} was {}", name, value)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for DisplayRenderer {
    fn default() -> Self {
        Self::new()
    }
}
