pub mod columns;
pub mod extract;
pub mod lines;
pub mod orientation;
mod patterns;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod reconcile;
pub mod species;
pub mod totals;
pub mod tsv;
pub mod types;

pub use columns::{ColumnModel, WeightSource};
pub use extract::FieldExtractor;
pub use lines::{assemble_lines, Line, LineToken};
pub use orientation::{normalize_orientation, try_rotations};
pub use pipeline::{AlbaranPipeline, DocumentExtraction, PageExtraction, PipelineError};
pub use preprocess::{binarize, load_page, load_page_file, otsu_threshold, prepare_for_ocr, Binarization, PreprocessError};
pub use recognizer::{MockRecognizer, OcrBackend, OcrError, TesseractCli};
#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
pub use reconcile::reconcile_weight;
pub use species::SpeciesCleaner;
pub use totals::extract_totals;
pub use tsv::{parse_osd_rotation, parse_tsv};
pub use types::{OcrOutput, OcrToken, PageSegMode, TokenTable};
