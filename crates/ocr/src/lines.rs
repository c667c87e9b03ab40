use std::collections::HashMap;

use crate::types::OcrToken;

/// `(block_id, paragraph_id, line_id)` as reported by the engine.
pub type LineKey = (u32, u32, u32);

#[derive(Debug, Clone, PartialEq)]
pub struct LineToken {
    pub text: String,
    pub left: i32,
    pub center_x: f64,
}

/// One structural OCR line, tokens ordered left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub key: LineKey,
    pub tokens: Vec<LineToken>,
}

impl Line {
    pub fn new(key: LineKey, mut tokens: Vec<LineToken>) -> Self {
        tokens.sort_by_key(|t| t.left);
        Self { key, tokens }
    }

    /// Space-joined token text.
    pub fn text(&self) -> String {
        self.tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ")
    }
}

/// Group confident, non-blank tokens into lines, in order of each line's first token.
pub fn assemble_lines(tokens: &[OcrToken], min_confidence: f32) -> Vec<Line> {
    let mut order: Vec<LineKey> = Vec::new();
    let mut grouped: HashMap<LineKey, Vec<LineToken>> = HashMap::new();

    for token in tokens {
        let text = token.text.trim();
        // NaN confidences fail this comparison and are dropped too.
        if text.is_empty() || !(token.confidence >= min_confidence) {
            continue;
        }
        let key = (token.block_id, token.paragraph_id, token.line_id);
        grouped
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(LineToken { text: text.to_string(), left: token.left, center_x: token.center_x() });
    }

    order
        .into_iter()
        .filter_map(|key| grouped.remove(&key).map(|tokens| Line::new(key, tokens)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(text: &str, conf: f32, left: i32, line: u32) -> OcrToken {
        OcrToken::new(text, conf, left, 20).on_line(1, 1, line)
    }

    #[test]
    fn groups_by_structural_key_and_sorts_by_left() {
        let tokens = vec![
            tok("CARAPAU", 90.0, 300, 2),
            tok("1092", 95.0, 10, 2),
            tok("LOTE", 80.0, 10, 1),
            tok("1", 92.0, 120, 2),
        ];
        let lines = assemble_lines(&tokens, 30.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].key, (1, 1, 2));
        assert_eq!(lines[0].text(), "1092 1 CARAPAU");
        assert_eq!(lines[1].text(), "LOTE");
        assert_eq!(lines[0].tokens[0].center_x, 20.0);
    }

    #[test]
    fn drops_low_confidence_and_blank_tokens() {
        let tokens = vec![
            tok("1092", 95.0, 10, 1),
            tok("noise", 29.9, 50, 1),
            tok("   ", 99.0, 60, 1),
            tok("7,4", 30.0, 900, 1),
            tok("ghost", -1.0, 400, 2),
        ];
        let lines = assemble_lines(&tokens, 30.0);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text(), "1092 7,4");
    }

    #[test]
    fn same_line_id_in_different_blocks_stays_apart() {
        let tokens = vec![
            OcrToken::new("PESO", 90.0, 800, 40).on_line(1, 1, 1),
            OcrToken::new("TOTAL", 90.0, 10, 40).on_line(2, 1, 1),
        ];
        assert_eq!(assemble_lines(&tokens, 30.0).len(), 2);
    }

    #[test]
    fn token_text_is_trimmed() {
        let lines = assemble_lines(&[tok(" 9,9 ", 70.0, 5, 1)], 30.0);
        assert_eq!(lines[0].tokens[0].text, "9,9");
    }
}
