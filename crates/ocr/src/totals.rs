use albaran_core::DocumentTotals;

use crate::patterns::{re_total_boxes, re_total_kg};

/// Read the footer totals ("Total Quilos", "Numero Cxs") from a document's text.
pub fn extract_totals(text: &str) -> DocumentTotals {
    let total_kg = re_total_kg()
        .captures(text)
        .and_then(|c| c[1].replace(',', ".").parse().ok());
    let total_boxes = re_total_boxes().captures(text).and_then(|c| c[1].parse().ok());
    DocumentTotals { total_kg, total_boxes }
}
