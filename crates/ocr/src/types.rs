use serde::{Deserialize, Deserializer, Serialize};

use crate::recognizer::OcrError;

/// A single word reported by the OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrToken {
    pub text: String,
    /// Engine confidence, 0–100. Negative when the engine reported none.
    pub confidence: f32,
    pub left: i32,
    pub width: i32,
    pub block_id: u32,
    pub paragraph_id: u32,
    pub line_id: u32,
}

impl OcrToken {
    pub fn new(text: impl Into<String>, confidence: f32, left: i32, width: i32) -> Self {
        Self {
            text: text.into(),
            confidence,
            left,
            width,
            block_id: 0,
            paragraph_id: 0,
            line_id: 0,
        }
    }

    /// Place the token on a structural line.
    pub fn on_line(mut self, block_id: u32, paragraph_id: u32, line_id: u32) -> Self {
        self.block_id = block_id;
        self.paragraph_id = paragraph_id;
        self.line_id = line_id;
        self
    }

    pub fn center_x(&self) -> f64 {
        self.left as f64 + self.width as f64 / 2.0
    }
}

/// Token stream in the engine's parallel-array shape, one entry per index.
///
/// Structural arrays (`block_num`, `par_num`, `line_num`) may be omitted, in which
/// case every token is placed on block/paragraph/line 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenTable {
    pub text: Vec<String>,
    #[serde(deserialize_with = "lenient_confidences")]
    pub conf: Vec<f32>,
    pub left: Vec<i32>,
    pub width: Vec<i32>,
    #[serde(default)]
    pub block_num: Vec<u32>,
    #[serde(default)]
    pub par_num: Vec<u32>,
    #[serde(default)]
    pub line_num: Vec<u32>,
}

impl TokenTable {
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn push(&mut self, token: OcrToken) {
        self.text.push(token.text);
        self.conf.push(token.confidence);
        self.left.push(token.left);
        self.width.push(token.width);
        self.block_num.push(token.block_id);
        self.par_num.push(token.paragraph_id);
        self.line_num.push(token.line_id);
    }

    /// Zip the parallel arrays into tokens, rejecting tables whose arrays disagree in length.
    pub fn into_tokens(self) -> Result<Vec<OcrToken>, OcrError> {
        let n = self.text.len();
        let required = [("conf", self.conf.len()), ("left", self.left.len()), ("width", self.width.len())];
        for (name, len) in required {
            if len != n {
                return Err(OcrError::MalformedTokens(format!(
                    "'{name}' has {len} entries, 'text' has {n}"
                )));
            }
        }
        let optional = [
            ("block_num", self.block_num.len()),
            ("par_num", self.par_num.len()),
            ("line_num", self.line_num.len()),
        ];
        for (name, len) in optional {
            if len != 0 && len != n {
                return Err(OcrError::MalformedTokens(format!(
                    "'{name}' has {len} entries, 'text' has {n}"
                )));
            }
        }

        let structural = |v: &[u32], i: usize| v.get(i).copied().unwrap_or(0);
        Ok(self
            .text
            .iter()
            .enumerate()
            .map(|(i, text)| OcrToken {
                text: text.clone(),
                confidence: self.conf[i],
                left: self.left[i],
                width: self.width[i],
                block_id: structural(&self.block_num, i),
                paragraph_id: structural(&self.par_num, i),
                line_id: structural(&self.line_num, i),
            })
            .collect())
    }
}

impl FromIterator<OcrToken> for TokenTable {
    fn from_iter<I: IntoIterator<Item = OcrToken>>(iter: I) -> Self {
        let mut table = TokenTable::default();
        for token in iter {
            table.push(token);
        }
        table
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawConfidence {
    Number(f64),
    Text(String),
}

// Engines report confidence as numbers or as strings such as "96.5" or "-1".
fn lenient_confidences<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f32>, D::Error> {
    let raw = Vec::<RawConfidence>::deserialize(d)?;
    Ok(raw
        .into_iter()
        .map(|c| match c {
            RawConfidence::Number(n) => n as f32,
            RawConfidence::Text(s) => s.trim().parse().unwrap_or(-1.0),
        })
        .collect())
}

/// What the OCR engine returned for one page.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrOutput {
    Text(String),
    Tokens(Vec<OcrToken>),
}

impl OcrOutput {
    pub fn is_empty(&self) -> bool {
        match self {
            OcrOutput::Text(t) => t.trim().is_empty(),
            OcrOutput::Tokens(t) => t.is_empty(),
        }
    }
}

/// Tesseract page segmentation modes used by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSegMode {
    /// Orientation and script detection only.
    OsdOnly,
    /// A single column of text of variable sizes; suits tabular sheets.
    SingleColumn,
    /// A single uniform block of text; the fast pass used when scoring rotations.
    UniformBlock,
}

impl PageSegMode {
    pub fn as_psm(self) -> u8 {
        match self {
            PageSegMode::OsdOnly => 0,
            PageSegMode::SingleColumn => 4,
            PageSegMode::UniformBlock => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_is_left_plus_half_width() {
        let t = OcrToken::new("7,4", 90.0, 100, 31);
        assert_eq!(t.center_x(), 115.5);
    }

    #[test]
    fn table_zips_parallel_arrays() {
        let table: TokenTable = vec![
            OcrToken::new("1092", 95.0, 10, 40).on_line(1, 1, 3),
            OcrToken::new("7,4", 88.0, 900, 30).on_line(1, 1, 3),
        ]
        .into_iter()
        .collect();
        let tokens = table.into_tokens().unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].text, "7,4");
        assert_eq!(tokens[1].line_id, 3);
    }

    #[test]
    fn table_rejects_ragged_arrays() {
        let table = TokenTable {
            text: vec!["a".into(), "b".into()],
            conf: vec![90.0],
            left: vec![0, 10],
            width: vec![5, 5],
            ..Default::default()
        };
        assert!(matches!(table.into_tokens(), Err(OcrError::MalformedTokens(_))));
    }

    #[test]
    fn missing_structure_defaults_to_line_zero() {
        let json = r#"{"text":["PESO"],"conf":["91.2"],"left":[400],"width":[60]}"#;
        let table: TokenTable = serde_json::from_str(json).unwrap();
        let tokens = table.into_tokens().unwrap();
        assert_eq!(tokens[0].confidence, 91.2);
        assert_eq!((tokens[0].block_id, tokens[0].paragraph_id, tokens[0].line_id), (0, 0, 0));
    }

    #[test]
    fn unparseable_confidence_becomes_negative() {
        let json = r#"{"text":["x","y"],"conf":["n/a", -1],"left":[0,1],"width":[1,1]}"#;
        let table: TokenTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.conf, vec![-1.0, -1.0]);
    }

    #[test]
    fn psm_numbers() {
        assert_eq!(PageSegMode::OsdOnly.as_psm(), 0);
        assert_eq!(PageSegMode::SingleColumn.as_psm(), 4);
        assert_eq!(PageSegMode::UniformBlock.as_psm(), 6);
    }
}
