#![allow(dead_code)]

use rollcall_recon::{PageText, SourcePage, TextToken};
use tracing_subscriber::EnvFilter;

pub const ROW_PITCH: f32 = 16.0;
pub const GLYPH_WIDTH: f32 = 6.0;

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rollcall_recon=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .without_time()
        .try_init();
}

pub fn token(text: &str, x: f32, y: f32) -> TextToken {
    TextToken::new(text, x, y, GLYPH_WIDTH * text.chars().count() as f32, 10.0)
}

/// One token per cell, rows `ROW_PITCH` apart starting at `top`.
pub fn grid_tokens(rows: &[&[&str]], columns: &[f32], top: f32) -> Vec<TextToken> {
    let mut tokens = Vec::new();
    for (row_index, row) in rows.iter().enumerate() {
        let y = top + row_index as f32 * ROW_PITCH;
        for (cell, x) in row.iter().zip(columns) {
            if !cell.is_empty() {
                tokens.push(token(cell, *x, y));
            }
        }
    }
    tokens
}

/// Free text, one token per line, left-aligned at `x`.
pub fn line_tokens(lines: &[&str], x: f32, top: f32) -> Vec<TextToken> {
    lines
        .iter()
        .enumerate()
        .map(|(index, line)| token(line, x, top + index as f32 * ROW_PITCH))
        .collect()
}

pub fn source_page(file: &str, page_id: u32, tokens: Vec<TextToken>) -> SourcePage {
    SourcePage {
        source_file: file.to_string(),
        page: PageText { page_id, tokens },
    }
}

pub fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|cell| (*cell).to_string()).collect())
        .collect()
}
