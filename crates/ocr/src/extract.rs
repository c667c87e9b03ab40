use rust_decimal::Decimal;
use std::str::FromStr;

use albaran_core::{AlbaranConfig, ProductRecord, ReconcileConfig};

use crate::columns::ColumnModel;
use crate::lines::{assemble_lines, Line, LineToken};
use crate::patterns::{re_box_count, re_decimal, re_decimal_token, re_one_decimal_token, re_product_line};
use crate::reconcile::reconcile_weight;
use crate::species::SpeciesCleaner;
use crate::types::OcrOutput;

// ── Public extraction API ─────────────────────────────────────────────────────

/// Turns OCR lines into product records.
///
/// Holds configuration only; every call is independent of the previous ones.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    species: SpeciesCleaner,
    reconcile: ReconcileConfig,
    min_confidence: f32,
}

impl FieldExtractor {
    pub fn new(species: SpeciesCleaner, reconcile: ReconcileConfig, min_confidence: f32) -> Self {
        Self { species, reconcile, min_confidence }
    }

    pub fn from_config(config: &AlbaranConfig) -> Self {
        Self::new(
            SpeciesCleaner::from_config(&config.species),
            config.reconcile.clone(),
            config.min_confidence,
        )
    }

    /// Extract every product of one page, choosing the strategy by output shape.
    pub fn extract(&self, output: &OcrOutput) -> Vec<ProductRecord> {
        match output {
            OcrOutput::Text(text) => self.extract_text(text),
            OcrOutput::Tokens(tokens) => {
                let lines = assemble_lines(tokens, self.min_confidence);
                let model = ColumnModel::build(&lines);
                self.extract_lines(&lines, model.as_ref())
            }
        }
    }

    /// Token mode: numbers are chosen by their position relative to the page's columns.
    pub fn extract_lines(&self, lines: &[Line], model: Option<&ColumnModel>) -> Vec<ProductRecord> {
        lines.iter().filter_map(|line| self.extract_line(line, model)).collect()
    }

    /// Raw-text mode: one candidate line per `\n`.
    pub fn extract_text(&self, text: &str) -> Vec<ProductRecord> {
        text.split('\n').filter_map(|line| self.extract_text_line(line)).collect()
    }

    fn extract_line(&self, line: &Line, model: Option<&ColumnModel>) -> Option<ProductRecord> {
        let text = line.text();
        let head = LineHead::parse(&text)?;

        let weight = select_weight_from_tokens(&line.tokens, model)
            .or_else(|| select_weight_from_text(&text));

        let tolerance = model.and_then(|m| m.tolerance);
        let price = select_decimal(&line.tokens, model.and_then(|m| m.price), tolerance);
        let value = select_decimal(&line.tokens, model.and_then(|m| m.value), tolerance);
        let (price, value) = match (price, value) {
            (Some(p), Some(v)) => (Some(p), Some(v)),
            _ => price_and_value_from_text(&text),
        };

        self.finish(head, head.boxes, weight, price, value, &text)
    }

    fn extract_text_line(&self, line: &str) -> Option<ProductRecord> {
        let head = LineHead::parse(line)?;
        let weight = select_weight_from_text(line);
        let (price, value) = price_and_value_from_text(line);

        // An explicit "<n> Cxs" mention beats the positional box count.
        let boxes = match re_box_count().captures(line) {
            Some(c) => c[1].parse().ok()?,
            None => head.boxes,
        };

        self.finish(head, boxes, weight, price, value, line)
    }

    fn finish(
        &self,
        head: LineHead<'_>,
        boxes: u32,
        weight: Option<Decimal>,
        price: Option<Decimal>,
        value: Option<Decimal>,
        line: &str,
    ) -> Option<ProductRecord> {
        let weight = reconcile_weight(weight, price, value, &self.reconcile);
        let species = self.species.clean(head.species);
        ProductRecord::new(head.lot, boxes, species, weight.and_then(to_kg), line)
    }
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::from_config(&AlbaranConfig::default())
    }
}

// ── Line shape ────────────────────────────────────────────────────────────────

/// The lot / box count / species prefix of a product line.
#[derive(Debug, Clone, Copy)]
struct LineHead<'a> {
    lot: u32,
    boxes: u32,
    species: &'a str,
}

impl<'a> LineHead<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let c = re_product_line().captures(line)?;
        Some(Self {
            lot: c.get(1)?.as_str().parse().ok()?,
            boxes: c.get(2)?.as_str().parse().ok()?,
            species: c.get(3)?.as_str().trim(),
        })
    }
}

// ── Number selection ──────────────────────────────────────────────────────────

fn select_weight_from_tokens(tokens: &[LineToken], model: Option<&ColumnModel>) -> Option<Decimal> {
    let candidates: Vec<&LineToken> = tokens.iter().filter(|t| re_decimal_token().is_match(&t.text)).collect();
    if candidates.is_empty() {
        return None;
    }

    let Some(weight_x) = model.and_then(|m| m.weight) else {
        let joined = candidates.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ");
        return select_weight_from_text(&joined);
    };

    // Single-decimal numbers first, then nearest to the column; ties keep the leftmost.
    let rank = |t: &LineToken| (!re_one_decimal_token().is_match(&t.text), (t.center_x - weight_x).abs());
    let best = candidates
        .into_iter()
        .reduce(|best, t| if rank(t) < rank(best) { t } else { best })?;

    let distance = (best.center_x - weight_x).abs();
    if model.and_then(|m| m.tolerance).is_some_and(|tol| distance > tol) {
        return None;
    }
    if model.and_then(|m| m.value).is_some_and(|value_x| distance >= (best.center_x - value_x).abs()) {
        return None;
    }
    parse_decimal(&best.text)
}

/// Nearest decimal token to `target`, if within `tolerance`.
fn select_decimal(tokens: &[LineToken], target: Option<f64>, tolerance: Option<f64>) -> Option<Decimal> {
    let target = target?;
    let best = tokens
        .iter()
        .filter(|t| re_decimal_token().is_match(&t.text))
        .reduce(|best, t| {
            if (t.center_x - target).abs() < (best.center_x - target).abs() { t } else { best }
        })?;
    if tolerance.is_some_and(|tol| (best.center_x - target).abs() > tol) {
        return None;
    }
    parse_decimal(&best.text)
}

/// First single-decimal number in the text, else the last decimal number.
fn select_weight_from_text(text: &str) -> Option<Decimal> {
    let numbers: Vec<&str> = re_decimal().find_iter(text).map(|m| m.as_str()).collect();
    let chosen = numbers
        .iter()
        .find(|n| re_one_decimal_token().is_match(n))
        .or_else(|| numbers.last())?;
    parse_decimal(chosen)
}

/// The 2nd and 3rd decimal numbers of a line are taken as price and value.
fn price_and_value_from_text(text: &str) -> (Option<Decimal>, Option<Decimal>) {
    let numbers: Vec<&str> = re_decimal().find_iter(text).map(|m| m.as_str()).collect();
    if numbers.len() < 2 {
        return (None, None);
    }
    (parse_decimal(numbers[1]), numbers.get(2).and_then(|n| parse_decimal(n)))
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(&s.replace(',', ".")).ok()
}

// Through the decimal string so `7.4` stays the nearest f64 to 7.4.
fn to_kg(weight: Decimal) -> Option<f64> {
    weight.normalize().to_string().parse().ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
