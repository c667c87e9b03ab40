use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest lot number a sheet may carry (three digits).
pub const MIN_LOT: u32 = 100;
/// Exclusive upper bound on lot numbers (five digits).
pub const MAX_LOT: u32 = 100_000;

/// One line item recovered from a delivery note.
///
/// Records are built once from a single matched line and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub lot: u32,
    pub boxes: u32,
    pub species: String,
    pub weight_kg: Option<f64>,
    /// The OCR line this record was derived from, trimmed.
    pub original_line: String,
}

impl ProductRecord {
    /// Build a record, refusing lot numbers outside `[MIN_LOT, MAX_LOT)`.
    pub fn new(
        lot: u32,
        boxes: u32,
        species: impl Into<String>,
        weight_kg: Option<f64>,
        original_line: impl Into<String>,
    ) -> Option<Self> {
        if !(MIN_LOT..MAX_LOT).contains(&lot) {
            return None;
        }
        Some(Self {
            lot,
            boxes,
            species: species.into(),
            weight_kg,
            original_line: original_line.into().trim().to_string(),
        })
    }
}

impl fmt::Display for ProductRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (lot {}, boxes {})", self.species, self.lot, self.boxes)?;
        if let Some(w) = self.weight_kg {
            write!(f, " - {w} kg")?;
        }
        Ok(())
    }
}

/// Sheet-level totals printed in the footer of a delivery note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentTotals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_boxes: Option<u32>,
}

impl DocumentTotals {
    pub fn is_empty(&self) -> bool {
        self.total_kg.is_none() && self.total_boxes.is_none()
    }
}

/// The structured outcome of processing one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(rename = "total_productos")]
    pub total_products: usize,
    #[serde(rename = "productos")]
    pub products: Vec<ProductRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<DocumentTotals>,
}

impl ExtractionResult {
    pub fn new(products: Vec<ProductRecord>) -> Self {
        Self { total_products: products.len(), products, totals: None }
    }

    pub fn with_totals(mut self, totals: DocumentTotals) -> Self {
        self.totals = (!totals.is_empty()).then_some(totals);
        self
    }
}
