use std::fmt;
use std::io::Write;

use albaran_core::ExtractionResult;
use albaran_ocr::DocumentExtraction;
use anyhow::Result;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
    Txt,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Txt => "txt",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Serialize a document in the requested format.
pub fn render(doc: &DocumentExtraction, format: OutputFormat) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_vec_pretty(&doc.result)?),
        OutputFormat::Csv => {
            let mut buf = Vec::new();
            write_csv(&mut buf, &doc.result)?;
            Ok(buf)
        }
        OutputFormat::Txt => Ok(render_txt(doc).into_bytes()),
    }
}

/// `Lote,Especie,Cajas,Peso_KG`, one row per product; unknown weights are left blank.
pub fn write_csv<W: Write>(writer: W, result: &ExtractionResult) -> Result<()> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(["Lote", "Especie", "Cajas", "Peso_KG"])?;
    for p in &result.products {
        let weight = p.weight_kg.map(|kg| kg.to_string()).unwrap_or_default();
        w.write_record([p.lot.to_string(), p.species.clone(), p.boxes.to_string(), weight])?;
    }
    w.flush()?;
    Ok(())
}

/// Human-readable report, followed by the full OCR text for manual checking.
pub fn render_txt(doc: &DocumentExtraction) -> String {
    let rule = "=".repeat(80);
    let mut out = String::new();
    out.push_str("PRODUCTOS EXTRAÍDOS DEL ALBARÁN\n");
    out.push_str(&rule);
    out.push_str("\n\n");
    out.push_str(&format!("Total de productos encontrados: {}\n\n", doc.result.total_products));

    for (idx, p) in doc.result.products.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", idx + 1, p.species));
        out.push_str(&format!("   Lote: {}\n", p.lot));
        out.push_str(&format!("   Cajas: {}\n", p.boxes));
        if let Some(kg) = p.weight_kg {
            out.push_str(&format!("   Peso: {kg} kg\n"));
        }
        out.push_str(&format!("   Original: {}\n", p.original_line));
        out.push_str(&"-".repeat(80));
        out.push('\n');
    }

    if let Some(totals) = &doc.result.totals {
        out.push('\n');
        if let Some(kg) = totals.total_kg {
            out.push_str(&format!("Total Quilos: {kg}\n"));
        }
        if let Some(boxes) = totals.total_boxes {
            out.push_str(&format!("Numero Cxs: {boxes}\n"));
        }
    }

    out.push_str("\n\nTEXTO COMPLETO OCR (para verificación):\n");
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&doc.text);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use albaran_core::{DocumentTotals, ProductRecord};

    fn doc() -> DocumentExtraction {
        let products = vec![
            ProductRecord::new(1092, 1, "CARAPAU T1/A", Some(7.4), "1092 1 CARAPAU T1/A ... 7,4").unwrap(),
            ProductRecord::new(1093, 2, "SARDINHA", None, "1093 2 SARDINHA").unwrap(),
        ];
        DocumentExtraction {
            result: ExtractionResult::new(products)
                .with_totals(DocumentTotals { total_kg: Some(7.4), total_boxes: None }),
            text: "1092 1 CARAPAU T1/A ... 7,4\n1093 2 SARDINHA\n".into(),
        }
    }

    #[test]
    fn csv_rows() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &doc().result).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "Lote,Especie,Cajas,Peso_KG\n1092,CARAPAU T1/A,1,7.4\n1093,SARDINHA,2,\n");
    }

    #[test]
    fn json_uses_sheet_keys() {
        let bytes = render(&doc(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["total_productos"], 2);
        assert_eq!(value["productos"][0]["species"], "CARAPAU T1/A");
        assert_eq!(value["totals"]["total_kg"], 7.4);
    }

    #[test]
    fn txt_report_lists_products_and_text() {
        let report = render_txt(&doc());
        assert!(report.contains("Total de productos encontrados: 2"));
        assert!(report.contains("1. CARAPAU T1/A\n   Lote: 1092\n   Cajas: 1\n   Peso: 7.4 kg\n"));
        assert!(!report.contains("Peso: \n"));
        assert!(report.ends_with("1093 2 SARDINHA\n"));
    }
}
