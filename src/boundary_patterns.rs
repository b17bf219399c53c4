//! Opener patterns for Brazilian legal document starts.
//!
//! Each pattern recognizes the first line of a document type commonly
//! found inside composite exhibit bundles. Base confidences reflect how
//! unambiguous the opener is: a procuração heading almost never appears
//! mid-document, while a payment-receipt line sometimes does.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::DocumentClass;

pub struct OpenerPattern {
    pub id: &'static str,
    pub regex: Regex,
    pub class: DocumentClass,
    pub base_confidence: f32,
}

fn opener(id: &'static str, pattern: &str, class: DocumentClass, base_confidence: f32) -> OpenerPattern {
    OpenerPattern {
        id,
        // Patterns are fixed at compile time; a malformed one is a bug.
        regex: Regex::new(&format!("(?i)^{pattern}")).unwrap(),
        class,
        base_confidence,
    }
}

pub static DEFAULT_OPENERS: LazyLock<Vec<OpenerPattern>> = LazyLock::new(|| {
    vec![
        opener(
            "procuracao_ad_judicia",
            r"PROCURA[ÇC][ÃA]O(\s+AD\s+JUDICIA)?",
            DocumentClass::Procuration,
            0.9,
        ),
        opener(
            "instrumento_mandato",
            r"INSTRUMENTO\s+(PARTICULAR\s+)?DE\s+MANDATO",
            DocumentClass::Procuration,
            0.9,
        ),
        opener(
            "contrato_prestacao",
            r"CONTRATO\s+DE\s+PRESTA[ÇC][ÃA]O\s+DE\s+SERVI[ÇC]OS",
            DocumentClass::Contract,
            0.9,
        ),
        opener(
            "contrato_social",
            r"CONTRATO\s+SOCIAL",
            DocumentClass::Contract,
            0.9,
        ),
        opener(
            "instrumento_particular",
            r"INSTRUMENTO\s+PARTICULAR\s+DE",
            DocumentClass::Contract,
            0.85,
        ),
        opener(
            "nota_fiscal_eletronica",
            r"(DANFE|NOTA\s+FISCAL\s+ELETR[ÔO]NICA|NF-?E)\b",
            DocumentClass::Invoice,
            0.85,
        ),
        opener(
            "nota_fiscal_servico",
            r"NOTA\s+FISCAL\s+DE\s+SERVI[ÇC]OS?",
            DocumentClass::Invoice,
            0.85,
        ),
        opener(
            "comprovante_pagamento",
            r"COMPROVANTE\s+DE\s+(PAGAMENTO|TRANSFER[ÊE]NCIA)",
            DocumentClass::Receipt,
            0.8,
        ),
        opener(
            "boleto_bancario",
            r"BOLETO\s+(BANC[ÁA]RIO|DE\s+COBRAN[ÇC]A)",
            DocumentClass::BankSlip,
            0.8,
        ),
        opener(
            "doc_numerado",
            r"DOC\.?\s*N?[ºO°]?\s*\d+",
            DocumentClass::NumberedExhibit,
            0.85,
        ),
        opener(
            "anexo_numerado",
            r"ANEXO\s+\d+",
            DocumentClass::NumberedExhibit,
            0.85,
        ),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;

    fn best_match(line: &str) -> Option<(&'static str, f32)> {
        DEFAULT_OPENERS
            .iter()
            .filter(|p| p.regex.is_match(line))
            .map(|p| (p.id, p.base_confidence))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
    }

    #[test]
    fn test_procuracao_heading_matches() {
        let (id, conf) = best_match("PROCURAÇÃO AD JUDICIA").unwrap();
        assert_eq!(id, "procuracao_ad_judicia");
        assert_eq!(conf, 0.9);
    }

    #[test]
    fn test_unaccented_ocr_output_still_matches() {
        assert!(best_match("PROCURACAO").is_some());
        assert!(best_match("contrato de prestacao de servicos").is_some());
    }

    #[test]
    fn test_openers_anchor_at_line_start() {
        assert!(best_match("conforme a PROCURAÇÃO anexa").is_none());
    }

    #[test]
    fn test_numbered_exhibit_variants() {
        assert!(best_match("DOC. Nº 3").is_some());
        assert!(best_match("DOC 12").is_some());
        assert!(best_match("ANEXO 4").is_some());
    }

    #[test]
    fn test_body_text_does_not_match() {
        assert!(best_match("pelo presente instrumento as partes ajustam").is_none());
    }
}
