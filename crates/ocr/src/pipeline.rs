use image::{DynamicImage, GrayImage};
use thiserror::Error;
use tracing::{debug, info, warn};

use albaran_core::{AlbaranConfig, ExtractionResult, ProductRecord};

use crate::columns::ColumnModel;
use crate::extract::FieldExtractor;
use crate::lines::assemble_lines;
use crate::orientation::normalize_orientation;
use crate::preprocess::{self, PreprocessError};
use crate::recognizer::OcrBackend;
use crate::totals::extract_totals;
use crate::types::{OcrOutput, PageSegMode};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
}

/// What one page yielded.
#[derive(Debug, Clone)]
pub struct PageExtraction {
    /// Plain OCR text of the page, kept for reports and footer totals.
    pub text: String,
    /// `None` in raw-text mode or when the page had no column evidence.
    pub column_model: Option<ColumnModel>,
    pub products: Vec<ProductRecord>,
}

/// A whole document: the structured result plus the concatenated page text.
#[derive(Debug, Clone)]
pub struct DocumentExtraction {
    pub result: ExtractionResult,
    pub text: String,
}

impl DocumentExtraction {
    /// Join pages in order; totals are read from the combined text.
    pub fn from_pages(pages: Vec<PageExtraction>) -> Self {
        let mut text = String::new();
        let mut products = Vec::new();
        for page in pages {
            text.push_str(&page.text);
            text.push('\n');
            products.extend(page.products);
        }
        let result = ExtractionResult::new(products).with_totals(extract_totals(&text));
        Self { result, text }
    }
}

/// Orchestrates: orientation → binarization → OCR → line assembly → extraction.
///
/// Configuration is fixed at construction; nothing is shared between documents.
pub struct AlbaranPipeline<R: OcrBackend> {
    backend: R,
    config: AlbaranConfig,
    extractor: FieldExtractor,
}

impl<R: OcrBackend> AlbaranPipeline<R> {
    pub fn new(backend: R, config: AlbaranConfig) -> Self {
        let extractor = FieldExtractor::from_config(&config);
        Self { backend, config, extractor }
    }

    pub fn config(&self) -> &AlbaranConfig {
        &self.config
    }

    pub fn extractor(&self) -> &FieldExtractor {
        &self.extractor
    }

    /// Decode an encoded page and apply its capture orientation.
    pub fn load_page(&self, data: &[u8]) -> Result<DynamicImage, PipelineError> {
        Ok(preprocess::load_page(data)?)
    }

    /// Bring the page upright, then binarize it.
    pub fn prepare_page(&self, page: DynamicImage) -> GrayImage {
        let upright = normalize_orientation(page, &self.backend, &self.config.lang, &self.config.orientation);
        let binarized = preprocess::prepare_for_ocr(&upright, &self.config.binarize);
        debug!(
            threshold = binarized.threshold,
            otsu = binarized.otsu_threshold,
            fallback = binarized.used_fallback,
            "Page binarized"
        );
        binarized.image
    }

    /// Plain-text OCR with the fallback ladder; an engine that fails every rung yields "".
    pub fn recognize_text(&self, page: &DynamicImage) -> String {
        let lang = self.config.lang.as_str();
        let attempts = [(lang, PageSegMode::SingleColumn), (lang, PageSegMode::UniformBlock), ("eng", PageSegMode::UniformBlock)];
        for (lang, mode) in attempts {
            match self.backend.recognize(page, lang, mode) {
                Ok(text) => return text,
                Err(e) => warn!(error = %e, lang, psm = mode.as_psm(), "Text recognition failed"),
            }
        }
        String::new()
    }

    /// OCR one prepared page and extract its products.
    ///
    /// Token output is preferred; when the engine cannot produce it the page is
    /// extracted from plain text instead.
    pub fn extract_page(&self, page: &GrayImage) -> PageExtraction {
        let page = DynamicImage::ImageLuma8(page.clone());
        let text = self.recognize_text(&page);

        let output = match self.backend.recognize_tokens(&page, &self.config.lang).and_then(|t| t.into_tokens()) {
            Ok(tokens) => OcrOutput::Tokens(tokens),
            Err(e) => {
                warn!(error = %e, "Token recognition failed, extracting from plain text");
                OcrOutput::Text(text.clone())
            }
        };
        self.extract_output(text, &output)
    }

    /// Extract from an OCR result obtained elsewhere.
    pub fn extract_output(&self, text: String, output: &OcrOutput) -> PageExtraction {
        match output {
            OcrOutput::Text(raw) => PageExtraction {
                text,
                column_model: None,
                products: self.extractor.extract_text(raw),
            },
            OcrOutput::Tokens(tokens) => {
                let lines = assemble_lines(tokens, self.config.min_confidence);
                let column_model = ColumnModel::build(&lines);
                let products = self.extractor.extract_lines(&lines, column_model.as_ref());
                PageExtraction { text, column_model, products }
            }
        }
    }

    /// Run every page of a document, in order.
    pub fn process_document<I>(&self, pages: I) -> DocumentExtraction
    where
        I: IntoIterator<Item = DynamicImage>,
    {
        let extracted: Vec<PageExtraction> = pages
            .into_iter()
            .enumerate()
            .map(|(index, page)| {
                let prepared = self.prepare_page(page);
                let extraction = self.extract_page(&prepared);
                debug!(page = index + 1, products = extraction.products.len(), "Page extracted");
                extraction
            })
            .collect();
        let document = DocumentExtraction::from_pages(extracted);
        info!(products = document.result.total_products, "Document processed");
        document
    }

    pub fn process_pages<I>(&self, pages: I) -> ExtractionResult
    where
        I: IntoIterator<Item = DynamicImage>,
    {
        self.process_document(pages).result
    }

    /// Decode and process encoded pages; a page that cannot be decoded fails the document.
    pub fn process_page_bytes(&self, pages: &[Vec<u8>]) -> Result<DocumentExtraction, PipelineError> {
        let decoded = pages
            .iter()
            .map(|data| self.load_page(data))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.process_document(decoded))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
