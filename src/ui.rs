//! Terminal table for the build summary.
//!
//! Columns size to their widest cell and the widest column gives way
//! first when the terminal is too narrow. Cells may carry ANSI colors.

use colored::*;

const MIN_COLUMN: usize = 8;

pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Rows with the wrong number of cells are ignored.
    pub fn add_row(&mut self, row: Vec<String>) {
        if row.len() == self.headers.len() {
            self.rows.push(row);
        }
    }

    fn column_widths(&self, max_width: usize) -> Vec<usize> {
        let mut widths: Vec<usize> = self
            .headers
            .iter()
            .map(|h| console::measure_text_width(h))
            .collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(console::measure_text_width(&flatten(cell)));
            }
        }

        // "  │" + " cell │" per column
        let overhead = 3 + 3 * widths.len();
        let budget = max_width.saturating_sub(overhead);
        while widths.iter().sum::<usize>() > budget {
            let Some((idx, &widest)) = widths.iter().enumerate().max_by_key(|(_, w)| **w) else {
                break;
            };
            if widest <= MIN_COLUMN {
                break;
            }
            widths[idx] -= 1;
        }
        widths
    }

    pub fn render(&self, max_width: usize) -> Vec<String> {
        if self.headers.is_empty() {
            return Vec::new();
        }
        let widths = self.column_widths(max_width);

        let border = |left: &str, mid: &str, right: &str| {
            let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("  {}{}{}", left, segments.join(mid), right)
        };
        let line = |cells: Vec<String>| {
            let mut s = String::from("  │");
            for (cell, width) in cells.iter().zip(&widths) {
                let fitted = console::truncate_str(cell, *width, "...");
                let pad = width.saturating_sub(console::measure_text_width(&fitted));
                s.push_str(&format!(" {}{} │", fitted, " ".repeat(pad)));
            }
            s
        };

        let mut out = vec![border("┌", "┬", "┐")];
        out.push(line(
            self.headers.iter().map(|h| h.bold().to_string()).collect(),
        ));
        out.push(border("├", "┼", "┤"));
        for row in &self.rows {
            out.push(line(row.iter().map(|c| flatten(c)).collect()));
        }
        out.push(border("└", "┴", "┘"));
        out
    }

    pub fn print(&self) {
        let (_rows, cols) = console::Term::stdout().size();
        for line in self.render(cols as usize) {
            println!("{}", line);
        }
    }
}

fn flatten(s: &str) -> String {
    s.chars()
        .map(|c| if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c })
        .collect()
}
