use albaran_core::SpeciesConfig;

use crate::patterns::re_trailing_punct;

/// Stop tokens at least this long also end a name when they only begin a word
/// segment, which catches unabbreviated forms ("Apres" → "Apresentacao").
const PREFIX_MATCH_MIN_LEN: usize = 4;

#[derive(Debug, Clone)]
struct StopToken {
    exact: String,
    folded: String,
}

/// Trims scientific names, column headers and FAO codes off a raw species run.
///
/// A word terminates the name when it contains a stop token exactly as configured
/// (so glued labels like "ValPesc" still stop it), or when one of its alphanumeric
/// segments equals a stop token or starts with a long one, compared case-insensitively.
#[derive(Debug, Clone)]
pub struct SpeciesCleaner {
    stop_tokens: Vec<StopToken>,
}

impl SpeciesCleaner {
    pub fn new<I, S>(stop_tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stop_tokens: stop_tokens
                .into_iter()
                .map(|t| t.as_ref().trim().to_string())
                .filter(|t| !t.is_empty())
                .map(|exact| StopToken { folded: exact.to_lowercase(), exact })
                .collect(),
        }
    }

    pub fn from_config(config: &SpeciesConfig) -> Self {
        Self::new(&config.stop_tokens)
    }

    pub fn is_terminator(&self, word: &str) -> bool {
        if self.stop_tokens.iter().any(|stop| word.contains(stop.exact.as_str())) {
            return true;
        }
        word.split(|c: char| !c.is_alphanumeric())
            .filter(|seg| !seg.is_empty())
            .map(str::to_lowercase)
            .any(|seg| {
                self.stop_tokens.iter().any(|stop| {
                    seg == stop.folded
                        || (stop.folded.chars().count() >= PREFIX_MATCH_MIN_LEN && seg.starts_with(stop.folded.as_str()))
                })
            })
    }

    /// Clean a raw species run; never returns an empty name for a non-empty input.
    pub fn clean(&self, raw: &str) -> String {
        let kept: Vec<&str> = raw
            .split_whitespace()
            .take_while(|w| !self.is_terminator(w))
            .collect();
        let joined = kept.join(" ");
        let cleaned = re_trailing_punct().replace(&joined, "");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            raw.to_string()
        } else {
            cleaned.to_string()
        }
    }
}

impl Default for SpeciesCleaner {
    fn default() -> Self {
        Self::from_config(&SpeciesConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_scientific_name() {
        let c = SpeciesCleaner::default();
        assert_eq!(c.clean("GAMBA-BRANC-MIU Parapenaeus longiros DPS Inte 9"), "GAMBA-BRANC-MIU");
    }

    #[test]
    fn keeps_size_grades() {
        let c = SpeciesCleaner::default();
        assert_eq!(c.clean("CARAPAU T1/A"), "CARAPAU T1/A");
    }

    #[test]
    fn stops_at_fao_codes_in_any_case() {
        let c = SpeciesCleaner::default();
        assert_eq!(c.clean("PESCADA T3 hke 12"), "PESCADA T3");
        assert_eq!(c.clean("LINGUADO whb"), "LINGUADO");
    }

    #[test]
    fn short_tokens_do_not_match_inside_words() {
        let c = SpeciesCleaner::default();
        assert_eq!(c.clean("CAVALA T2"), "CAVALA T2");
        assert_eq!(c.clean("ESPADARTE"), "ESPADARTE");
        assert_eq!(c.clean("PEIXE-ESPADA PRETO"), "PEIXE-ESPADA PRETO");
    }

    #[test]
    fn long_tokens_match_as_prefixes() {
        let c = SpeciesCleaner::default();
        assert_eq!(c.clean("POLVO Apresentacao Inteiro"), "POLVO");
        assert_eq!(c.clean("SARDINHA Val/Pesc 12"), "SARDINHA");
    }

    #[test]
    fn glued_labels_stop_the_name() {
        let c = SpeciesCleaner::default();
        assert_eq!(c.clean("SARDINHA ValPesc 12"), "SARDINHA");
        assert_eq!(c.clean("PESCADA EspCientifica"), "PESCADA");
        assert_eq!(c.clean("GAMBA-BRANC-MIU DPSInte 9"), "GAMBA-BRANC-MIU");
    }

    #[test]
    fn empty_result_falls_back_to_raw() {
        let c = SpeciesCleaner::default();
        assert_eq!(c.clean("HKE 12"), "HKE 12");
    }

    #[test]
    fn strips_trailing_punctuation() {
        let c = SpeciesCleaner::new(Vec::<String>::new());
        assert_eq!(c.clean("POLVO **"), "POLVO");
        assert_eq!(c.clean("T1/A-"), "T1/A-");
    }

    #[test]
    fn custom_terminators() {
        let c = SpeciesCleaner::new(["Sardina"]);
        assert_eq!(c.clean("SARDINHA SARDINA pilchardus"), "SARDINHA");
    }
}
