//! Parsers for Tesseract's textual outputs: the TSV word table and the OSD report.

use crate::types::{OcrToken, TokenTable};

/// Level value of word rows in Tesseract TSV output.
const WORD_LEVEL: u32 = 5;

/// Parse `tesseract ... tsv` output into a token table.
///
/// Columns: level, page_num, block_num, par_num, line_num, word_num, left, top,
/// width, height, conf, text. Only word rows are kept; rows that do not have the
/// expected shape are skipped.
pub fn parse_tsv(tsv: &str) -> TokenTable {
    tsv.lines()
        .filter(|l| !l.starts_with("level"))
        .filter_map(parse_row)
        .collect()
}

fn parse_row(row: &str) -> Option<OcrToken> {
    let cols: Vec<&str> = row.splitn(12, '\t').collect();
    if cols.len() < 12 {
        return None;
    }
    let level: u32 = cols[0].trim().parse().ok()?;
    if level != WORD_LEVEL {
        return None;
    }
    let confidence = cols[10].trim().parse().unwrap_or(-1.0);
    Some(
        OcrToken::new(cols[11], confidence, cols[6].trim().parse().ok()?, cols[8].trim().parse().ok()?)
            .on_line(
                cols[2].trim().parse().ok()?,
                cols[3].trim().parse().ok()?,
                cols[4].trim().parse().ok()?,
            ),
    )
}

/// Extract the `Rotate: N` value (clockwise degrees) from an OSD report.
pub fn parse_osd_rotation(osd: &str) -> Option<u32> {
    osd.lines()
        .find(|l| l.contains("Rotate"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse().ok())
}
