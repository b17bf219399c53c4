//! Conservative document-boundary detection.
//!
//! Scans extracted page text for lines that open a new embedded
//! sub-document (procurações, contracts, invoices, numbered exhibits)
//! inside a composite bundle. Boundaries mark where the next document
//! *starts*, never where the current one ends, so closing clauses and
//! signature blocks are never cut off. Candidates below the configured
//! confidence floor are discarded outright: merging two documents is
//! recoverable downstream, severing an instrument mid-clause is not.

use crate::boundary_patterns::{OpenerPattern, DEFAULT_OPENERS};
use crate::config::BoundaryConfig;
use crate::models::{BoundaryCandidate, DocumentClass, PageText, Section, Segment};

const MATCH_PREVIEW_CHARS: usize = 80;

pub struct BoundaryDetector {
    min_confidence: f32,
    min_line_gap: usize,
    patterns: &'static [OpenerPattern],
}

impl BoundaryDetector {
    pub fn new(config: &BoundaryConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            min_line_gap: config.min_line_gap,
            patterns: &DEFAULT_OPENERS,
        }
    }

    /// Detector over a custom pattern set. Used by tests and callers
    /// with domain-specific openers.
    pub fn with_patterns(config: &BoundaryConfig, patterns: &'static [OpenerPattern]) -> Self {
        Self {
            min_confidence: config.min_confidence,
            min_line_gap: config.min_line_gap,
            patterns,
        }
    }

    /// Scan the page sequence for probable sub-document starts.
    ///
    /// Pure over its input: the same pages always yield the same
    /// candidates. Matches closer together than `min_line_gap` lines
    /// (counted across page breaks) collapse to the highest-confidence
    /// one.
    pub fn detect_boundaries(&self, pages: &[PageText]) -> Vec<BoundaryCandidate> {
        let mut raw: Vec<(usize, BoundaryCandidate)> = Vec::new();
        let mut global_line = 0usize;

        for page in pages {
            for (idx, line) in page.text.lines().enumerate() {
                global_line += 1;
                let trimmed = line.trim();
                if trimmed.chars().count() < 3 {
                    continue;
                }

                if let Some(candidate) = self.match_line(page.page_num, idx + 1, trimmed) {
                    if candidate.confidence >= self.min_confidence {
                        raw.push((global_line, candidate));
                    }
                }
            }
        }

        self.dedup(raw)
    }

    /// Best-confidence pattern match for one trimmed line.
    fn match_line(&self, page_num: usize, line: usize, trimmed: &str) -> Option<BoundaryCandidate> {
        self.patterns
            .iter()
            .filter(|p| p.regex.is_match(trimmed))
            .max_by(|a, b| {
                a.base_confidence
                    .partial_cmp(&b.base_confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|p| BoundaryCandidate {
                page_num,
                line,
                class: p.class,
                confidence: p.base_confidence,
                matched_text: trimmed.chars().take(MATCH_PREVIEW_CHARS).collect(),
            })
    }

    /// Collapse candidates within `min_line_gap` global lines of each
    /// other, keeping the higher confidence one (the earlier on ties).
    fn dedup(&self, raw: Vec<(usize, BoundaryCandidate)>) -> Vec<BoundaryCandidate> {
        let mut kept: Vec<(usize, BoundaryCandidate)> = Vec::new();

        for (line, candidate) in raw {
            match kept.last_mut() {
                Some((prev_line, prev)) if line - *prev_line < self.min_line_gap => {
                    if candidate.confidence > prev.confidence {
                        *prev_line = line;
                        *prev = candidate;
                    }
                }
                _ => kept.push((line, candidate)),
            }
        }

        kept.into_iter().map(|(_, c)| c).collect()
    }

    /// Refine a classifier-labelled section into sub-document segments.
    ///
    /// Non-composite sections are never split; the empty result means
    /// "leave the section as-is". Idempotent: refining the pages of any
    /// produced segment again yields no further splits beyond its own
    /// opener.
    pub fn refine_section(&self, section: &Section, pages: &[PageText]) -> Vec<Segment> {
        if !section.composite {
            return Vec::new();
        }

        let section_pages: Vec<PageText> = pages
            .iter()
            .filter(|p| p.page_num >= section.start_page && p.page_num <= section.end_page)
            .cloned()
            .collect();

        let candidates = self.detect_boundaries(&section_pages);
        self.assemble_segments(&section_pages, &candidates)
    }

    /// Turn boundary candidates into contiguous segments covering the
    /// whole page sequence.
    ///
    /// Content before the first boundary becomes an `Unknown` segment at
    /// reduced confidence, unless the first boundary sits on the very
    /// first line of the first page.
    pub fn assemble_segments(
        &self,
        pages: &[PageText],
        candidates: &[BoundaryCandidate],
    ) -> Vec<Segment> {
        if pages.is_empty() {
            return Vec::new();
        }

        let last_page = pages.last().map(|p| p.page_num).unwrap_or(1);
        let lines_of = |page_num: usize| -> usize {
            pages
                .iter()
                .find(|p| p.page_num == page_num)
                .map(|p| p.text.lines().count().max(1))
                .unwrap_or(1)
        };
        let first_page = pages.first().map(|p| p.page_num).unwrap_or(1);

        if candidates.is_empty() {
            return vec![Segment {
                start_page: first_page,
                start_line: 1,
                end_page: last_page,
                end_line: lines_of(last_page),
                class: DocumentClass::Unknown,
                confidence: 0.5,
            }];
        }

        let mut segments = Vec::new();

        let first = &candidates[0];
        if !(first.page_num == first_page && first.line == 1) {
            let (end_page, end_line) = previous_position(first, &lines_of);
            segments.push(Segment {
                start_page: first_page,
                start_line: 1,
                end_page,
                end_line,
                class: DocumentClass::Unknown,
                confidence: 0.5,
            });
        }

        for (i, candidate) in candidates.iter().enumerate() {
            let (end_page, end_line) = match candidates.get(i + 1) {
                Some(next) => previous_position(next, &lines_of),
                None => (last_page, lines_of(last_page)),
            };
            segments.push(Segment {
                start_page: candidate.page_num,
                start_line: candidate.line,
                end_page,
                end_line,
                class: candidate.class,
                confidence: candidate.confidence,
            });
        }

        segments
    }
}

/// The page/line position immediately before a boundary candidate.
fn previous_position(
    boundary: &BoundaryCandidate,
    lines_of: &impl Fn(usize) -> usize,
) -> (usize, usize) {
    if boundary.line > 1 {
        (boundary.page_num, boundary.line - 1)
    } else {
        let prev = boundary.page_num.saturating_sub(1).max(1);
        (prev, lines_of(prev))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(num: usize, text: &str) -> PageText {
        PageText {
            page_num: num,
            text: text.to_string(),
        }
    }

    fn detector() -> BoundaryDetector {
        BoundaryDetector::new(&BoundaryConfig::default())
    }

    #[test]
    fn test_detects_procuracao_start() {
        let pages = vec![
            page(1, "peças iniciais do processo\nmais texto corrido"),
            page(2, "PROCURAÇÃO\npelo presente instrumento"),
        ];
        let candidates = detector().detect_boundaries(&pages);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].page_num, 2);
        assert_eq!(candidates[0].line, 1);
        assert_eq!(candidates[0].class, DocumentClass::Procuration);
    }

    #[test]
    fn test_low_confidence_matches_discarded() {
        let config = BoundaryConfig {
            min_confidence: 0.85,
            ..BoundaryConfig::default()
        };
        let pages = vec![page(1, "COMPROVANTE DE PAGAMENTO\nvalor R$ 100,00")];
        let detector = BoundaryDetector::new(&config);
        // Receipt opener carries 0.8, below the floor.
        assert!(detector.detect_boundaries(&pages).is_empty());
    }

    #[test]
    fn test_nearby_matches_collapse_to_strongest() {
        let pages = vec![page(
            1,
            "DOC. Nº 1\nPROCURAÇÃO AD JUDICIA\ncorpo do instrumento",
        )];
        let candidates = detector().detect_boundaries(&pages);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].class, DocumentClass::Procuration);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let pages = vec![
            page(1, "ANEXO 1\nconteúdo"),
            page(2, "CONTRATO SOCIAL\ncláusula primeira"),
        ];
        let d = detector();
        assert_eq!(d.detect_boundaries(&pages), d.detect_boundaries(&pages));
    }

    #[test]
    fn test_short_lines_skipped() {
        let pages = vec![page(1, "NF\n..\nconteúdo sem abertura")];
        assert!(detector().detect_boundaries(&pages).is_empty());
    }

    #[test]
    fn test_non_composite_section_untouched() {
        let section = Section {
            label: "contrato".into(),
            composite: false,
            start_page: 1,
            end_page: 2,
        };
        let pages = vec![page(1, "CONTRATO SOCIAL\ncláusulas"), page(2, "PROCURAÇÃO")];
        assert!(detector().refine_section(&section, &pages).is_empty());
    }

    #[test]
    fn test_segments_cover_sequence_without_truncation() {
        let pages = vec![
            page(1, "capa do caderno\níndice de documentos"),
            page(2, "PROCURAÇÃO\noutorgante: fulano\noutorgado: advogado"),
            page(3, "assinaturas e reconhecimento de firma"),
            page(4, "CONTRATO DE PRESTAÇÃO DE SERVIÇOS\ncláusula primeira"),
        ];
        let d = detector();
        let candidates = d.detect_boundaries(&pages);
        let segments = d.assemble_segments(&pages, &candidates);

        assert_eq!(segments.len(), 3);
        // Leading unmatched content survives as an unknown segment.
        assert_eq!(segments[0].class, DocumentClass::Unknown);
        assert_eq!(segments[0].start_page, 1);
        assert_eq!(segments[0].end_page, 1);
        // The procuração keeps its trailing signature page.
        assert_eq!(segments[1].class, DocumentClass::Procuration);
        assert_eq!(segments[1].start_page, 2);
        assert_eq!(segments[1].end_page, 3);
        // The contract runs to the end.
        assert_eq!(segments[2].class, DocumentClass::Contract);
        assert_eq!(segments[2].start_page, 4);
        assert_eq!(segments[2].end_page, 4);
    }

    #[test]
    fn test_boundary_on_first_line_leaves_no_leading_segment() {
        let pages = vec![page(1, "PROCURAÇÃO\ncorpo"), page(2, "continuação")];
        let d = detector();
        let candidates = d.detect_boundaries(&pages);
        let segments = d.assemble_segments(&pages, &candidates);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].class, DocumentClass::Procuration);
        assert_eq!(segments[0].start_page, 1);
        assert_eq!(segments[0].start_line, 1);
    }

    #[test]
    fn test_resplitting_a_segment_finds_no_new_boundaries() {
        let pages = vec![
            page(1, "PROCURAÇÃO\noutorgante: fulano"),
            page(2, "poderes da cláusula ad judicia"),
            page(3, "CONTRATO SOCIAL\ncláusula primeira"),
        ];
        let d = detector();
        let candidates = d.detect_boundaries(&pages);
        let segments = d.assemble_segments(&pages, &candidates);
        assert_eq!(segments.len(), 2);

        // Re-running detection on one segment's pages finds only that
        // segment's own opener, never an additional split.
        let first_segment_pages: Vec<PageText> = pages
            .iter()
            .filter(|p| p.page_num >= segments[0].start_page && p.page_num <= segments[0].end_page)
            .cloned()
            .collect();
        let again = d.detect_boundaries(&first_segment_pages);
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].page_num, segments[0].start_page);
        assert_eq!(again[0].line, segments[0].start_line);
    }

    #[test]
    fn test_only_confident_opener_splits_composite_bundle() {
        let config = BoundaryConfig {
            min_confidence: 0.85,
            ..BoundaryConfig::default()
        };
        let d = BoundaryDetector::new(&config);
        let section = Section {
            label: "anexos".into(),
            composite: true,
            start_page: 1,
            end_page: 6,
        };
        // Six pages: a procuração opener above the floor, a receipt and a
        // boleto below it.
        let pages = vec![
            page(1, "índice dos anexos do processo"),
            page(2, "PROCURAÇÃO\noutorgante: fulano de tal"),
            page(3, "assinaturas e reconhecimento de firma"),
            page(4, "COMPROVANTE DE PAGAMENTO\nvalor R$ 1.500,00"),
            page(5, "BOLETO BANCÁRIO\nvencimento 10/03"),
            page(6, "encerramento do caderno"),
        ];

        let candidates = d.detect_boundaries(&pages);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].class, DocumentClass::Procuration);
        assert_eq!(candidates[0].page_num, 2);

        // The weak signals stay merged with their neighbors.
        let segments = d.refine_section(&section, &pages);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].class, DocumentClass::Unknown);
        assert_eq!(segments[1].class, DocumentClass::Procuration);
        assert_eq!(segments[1].start_page, 2);
        assert_eq!(segments[1].end_page, 6);
    }

    #[test]
    fn test_no_candidates_yields_single_unknown_segment() {
        let pages = vec![page(1, "texto corrido sem aberturas")];
        let d = detector();
        let segments = d.assemble_segments(&pages, &[]);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].class, DocumentClass::Unknown);
        assert!((segments[0].confidence - 0.5).abs() < 1e-6);
    }
}
