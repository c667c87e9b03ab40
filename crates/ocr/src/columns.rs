//! Per-page estimate of where the weight, price and value columns sit.

use regex::Regex;

use crate::lines::Line;
use crate::patterns::{re_header_price, re_header_value, re_header_weight, re_one_decimal_token};

/// Narrowest histogram bucket (pixels) used when inferring the weight column.
pub const MIN_BUCKET_WIDTH: f64 = 30.0;
/// The spread of single-decimal tokens is cut into this many buckets.
const BUCKETS_ACROSS_SPREAD: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightSource {
    /// Found under a "peso" header.
    Header,
    /// Inferred from where single-decimal numbers cluster.
    Inferred,
}

/// Horizontal centers (pixels) of the numeric columns of one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnModel {
    pub weight: Option<f64>,
    pub weight_source: Option<WeightSource>,
    /// Accepted distance from a column center; only known when single-decimal numbers exist.
    pub tolerance: Option<f64>,
    pub price: Option<f64>,
    pub value: Option<f64>,
}

impl ColumnModel {
    /// Build the model from a page's lines; `None` when no column evidence exists.
    pub fn build(lines: &[Line]) -> Option<Self> {
        let header_weight = header_median(lines, re_header_weight());
        let price = header_median(lines, re_header_price());
        let value = header_rightmost(lines, re_header_value());
        let inferred = infer_weight_column(lines);

        let (weight, weight_source) = match (header_weight, inferred) {
            (Some(x), _) => (Some(x), Some(WeightSource::Header)),
            (None, Some(col)) => (Some(col.center), Some(WeightSource::Inferred)),
            (None, None) => (None, None),
        };

        if weight.is_none() && price.is_none() && value.is_none() {
            return None;
        }

        let model = Self { weight, weight_source, tolerance: inferred.map(|c| c.tolerance), price, value };
        tracing::debug!(?model, "Column model built");
        Some(model)
    }
}

fn matching_centers(lines: &[Line], pattern: &Regex) -> Vec<f64> {
    lines
        .iter()
        .flat_map(|l| l.tokens.iter())
        .filter(|t| pattern.is_match(&t.text))
        .map(|t| t.center_x)
        .collect()
}

/// Upper median of the centers of tokens matching `pattern`.
fn header_median(lines: &[Line], pattern: &Regex) -> Option<f64> {
    let mut xs = matching_centers(lines, pattern);
    if xs.is_empty() {
        return None;
    }
    xs.sort_by(f64::total_cmp);
    Some(xs[xs.len() / 2])
}

// Several "val"-style labels can appear; the value column is the rightmost.
fn header_rightmost(lines: &[Line], pattern: &Regex) -> Option<f64> {
    matching_centers(lines, pattern).into_iter().reduce(f64::max)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferredColumn {
    pub center: f64,
    pub tolerance: f64,
    pub bucket_width: f64,
}

/// Locate the densest cluster of single-decimal numbers (weights are printed as `7,4`).
pub fn infer_weight_column(lines: &[Line]) -> Option<InferredColumn> {
    let xs = matching_centers(lines, re_one_decimal_token());
    let min_x = xs.iter().copied().reduce(f64::min)?;
    let max_x = xs.iter().copied().reduce(f64::max)?;
    let bucket_width = MIN_BUCKET_WIDTH.max((max_x - min_x) / BUCKETS_ACROSS_SPREAD);

    // Buckets in order of first appearance; the first most populous one wins.
    let mut buckets: Vec<(i64, Vec<f64>)> = Vec::new();
    for &x in &xs {
        let index = ((x - min_x) / bucket_width).round_ties_even() as i64;
        match buckets.iter_mut().find(|(i, _)| *i == index) {
            Some((_, members)) => members.push(x),
            None => buckets.push((index, vec![x])),
        }
    }
    let best = buckets
        .iter()
        .fold(None::<&Vec<f64>>, |best, (_, members)| match best {
            Some(b) if b.len() >= members.len() => Some(b),
            _ => Some(members),
        })?;

    let center = median(best);
    let deviations: Vec<f64> = best.iter().map(|x| (x - center).abs()).collect();
    let mad = median(&deviations);
    let tolerance = (mad * 3.0).max(bucket_width * 2.0);
    Some(InferredColumn { center, tolerance, bucket_width })
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
