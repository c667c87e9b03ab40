use regex::Regex;
use std::sync::OnceLock;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        pub(crate) fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// Lot (3–5 digits), box count, then the species run.
re!(re_product_line,
    r"(?i)^\s*(\d{3,5})\s+(\d+)\s+([A-Z0-9][A-Z0-9/\s-]+)");

re!(re_decimal, r"\d+[,.]\d+");
re!(re_decimal_token, r"^\d+[,.]\d+$");
re!(re_one_decimal_token, r"^\d+[,.]\d$");

re!(re_box_count, r"(?i)(\d+)\s*(?:Cxs|cajas|Cxa)");

re!(re_header_weight, r"(?i)^peso$");
re!(re_header_price, r"(?i)^(?:preco|precio|preço)$");
re!(re_header_value, r"(?i)^(?:val\.?|valor|val\.pesc\.?|valpesc\.?)$");

re!(re_trailing_punct, r"[^\w\s/-]+$");

re!(re_total_kg, r"(?i)Total\s+Quilos[.:\s]+(\d+[,.]\d+)");
re!(re_total_boxes, r"(?i)Numero\s+Cxs[/CbzDornas]*[.:\s]+(\d+)");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_line_captures() {
        let c = re_product_line().captures("  1092 1 CARAPAU T1/A ... 7,4").unwrap();
        assert_eq!(&c[1], "1092");
        assert_eq!(&c[2], "1");
        assert_eq!(c[3].trim(), "CARAPAU T1/A");
    }

    #[test]
    fn product_line_rejects_short_or_long_lots() {
        assert!(re_product_line().captures("12 1 CARAPAU").is_none());
        assert!(re_product_line().captures("123456 1 CARAPAU").is_none());
        assert!(re_product_line().captures("LOTE CXS ESPECIE").is_none());
    }

    #[test]
    fn decimal_tokens() {
        assert!(re_one_decimal_token().is_match("7,4"));
        assert!(re_one_decimal_token().is_match("12.5"));
        assert!(!re_one_decimal_token().is_match("11,47"));
        assert!(re_decimal_token().is_match("11,47"));
        assert!(!re_decimal_token().is_match("7,4kg"));
    }

    #[test]
    fn header_labels() {
        assert!(re_header_weight().is_match("PESO"));
        assert!(!re_header_weight().is_match("PESO:"));
        assert!(re_header_price().is_match("Preço"));
        assert!(re_header_price().is_match("precio"));
        for label in ["Val", "VAL.", "Valor", "Val.Pesc.", "ValPesc"] {
            assert!(re_header_value().is_match(label), "{label}");
        }
        assert!(!re_header_value().is_match("Valores"));
    }
}
