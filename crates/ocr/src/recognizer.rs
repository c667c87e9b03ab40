use image::DynamicImage;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use thiserror::Error;

use crate::preprocess::encode_png;
use crate::tsv;
use crate::types::{OcrToken, PageSegMode, TokenTable};

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image encode error: {0}")]
    ImageEncode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Malformed token table: {0}")]
    MalformedTokens(String),
    #[error("Capability not available in this OCR backend")]
    NotAvailable,
}

/// Abstraction over an OCR engine.
///
/// Every call may fail; the pipeline treats failures as "nothing recognized" rather
/// than aborting the document.
pub trait OcrBackend: Send + Sync {
    /// Recognize the page as plain text.
    fn recognize(&self, image: &DynamicImage, lang: &str, mode: PageSegMode) -> Result<String, OcrError>;

    /// Recognize the page as a word table with confidences and positions.
    fn recognize_tokens(&self, image: &DynamicImage, lang: &str) -> Result<TokenTable, OcrError>;

    /// Estimate how many degrees clockwise the page must be rotated to be upright.
    fn detect_orientation(&self, image: &DynamicImage, lang: &str) -> Result<u32, OcrError>;
}

impl<T: OcrBackend + ?Sized> OcrBackend for Box<T> {
    fn recognize(&self, image: &DynamicImage, lang: &str, mode: PageSegMode) -> Result<String, OcrError> {
        (**self).recognize(image, lang, mode)
    }

    fn recognize_tokens(&self, image: &DynamicImage, lang: &str) -> Result<TokenTable, OcrError> {
        (**self).recognize_tokens(image, lang)
    }

    fn detect_orientation(&self, image: &DynamicImage, lang: &str) -> Result<u32, OcrError> {
        (**self).detect_orientation(image, lang)
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

type ImagePredicate = Box<dyn Fn(&DynamicImage) -> bool + Send + Sync>;

/// Scripted backend for exercising the pipeline without Tesseract installed.
///
/// Text recognition returns the preset text (or an empty string when the image
/// fails the `readable_when` predicate). Token recognition and orientation
/// estimation are unavailable unless configured.
pub struct MockRecognizer {
    pub text: String,
    tokens: Option<Vec<OcrToken>>,
    rotation: Option<u32>,
    failing: bool,
    readable: Option<ImagePredicate>,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), tokens: None, rotation: None, failing: false, readable: None }
    }

    /// A backend whose every call fails with an engine error.
    pub fn failing() -> Self {
        Self { failing: true, ..Self::new("") }
    }

    pub fn with_tokens(mut self, tokens: Vec<OcrToken>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_rotation(mut self, degrees: u32) -> Self {
        self.rotation = Some(degrees);
        self
    }

    /// Only recognize text on images for which `f` returns true.
    pub fn readable_when(mut self, f: impl Fn(&DynamicImage) -> bool + Send + Sync + 'static) -> Self {
        self.readable = Some(Box::new(f));
        self
    }

    fn check(&self) -> Result<(), OcrError> {
        if self.failing {
            return Err(OcrError::Engine("mock engine failure".into()));
        }
        Ok(())
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, image: &DynamicImage, _lang: &str, _mode: PageSegMode) -> Result<String, OcrError> {
        self.check()?;
        match &self.readable {
            Some(f) if !f(image) => Ok(String::new()),
            _ => Ok(self.text.clone()),
        }
    }

    fn recognize_tokens(&self, _image: &DynamicImage, _lang: &str) -> Result<TokenTable, OcrError> {
        self.check()?;
        match &self.tokens {
            Some(tokens) => Ok(tokens.iter().cloned().collect()),
            None => Err(OcrError::NotAvailable),
        }
    }

    fn detect_orientation(&self, _image: &DynamicImage, _lang: &str) -> Result<u32, OcrError> {
        self.check()?;
        self.rotation.ok_or(OcrError::NotAvailable)
    }
}

// ── Tesseract executable backend ──────────────────────────────────────────────

/// Drives the `tesseract` command-line program, piping PNG pages through stdin.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: PathBuf,
    dpi: Option<u32>,
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self { program: PathBuf::from("tesseract"), dpi: None }
    }
}

impl TesseractCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = Some(dpi);
        self
    }

    fn base_args(&self, mode: PageSegMode) -> Vec<String> {
        let mut args = vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "--psm".to_string(),
            mode.as_psm().to_string(),
        ];
        if let Some(dpi) = self.dpi {
            args.push("--dpi".into());
            args.push(dpi.to_string());
        }
        args
    }

    fn lang_args(lang: &str) -> [String; 2] {
        ["-l".to_string(), lang.to_string()]
    }

    fn run(&self, image: &DynamicImage, args: &[String]) -> Result<String, OcrError> {
        let png = encode_png(image).map_err(|e| OcrError::ImageEncode(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OcrError::Engine(format!("failed to launch {}: {e}", self.program.display())))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OcrError::Engine("tesseract stdin unavailable".into()))?;
        // Feed stdin from a separate thread so a full stdout pipe cannot deadlock us.
        let writer = std::thread::spawn(move || stdin.write_all(&png));

        let output = child
            .wait_with_output()
            .map_err(|e| OcrError::Engine(e.to_string()))?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(OcrError::Engine(format!("failed to send page: {e}"))),
            Err(_) => return Err(OcrError::Engine("stdin writer panicked".into())),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(format!("tesseract exited with {}: {}", output.status, stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl OcrBackend for TesseractCli {
    fn recognize(&self, image: &DynamicImage, lang: &str, mode: PageSegMode) -> Result<String, OcrError> {
        let mut args = self.base_args(mode);
        args.extend(Self::lang_args(lang));
        if mode == PageSegMode::SingleColumn {
            args.extend(["-c".to_string(), "preserve_interword_spaces=1".to_string()]);
        }
        self.run(image, &args)
    }

    fn recognize_tokens(&self, image: &DynamicImage, lang: &str) -> Result<TokenTable, OcrError> {
        let mut args = self.base_args(PageSegMode::SingleColumn);
        args.extend(Self::lang_args(lang));
        args.extend(["-c".to_string(), "preserve_interword_spaces=1".to_string(), "tsv".to_string()]);
        Ok(tsv::parse_tsv(&self.run(image, &args)?))
    }

    fn detect_orientation(&self, image: &DynamicImage, _lang: &str) -> Result<u32, OcrError> {
        let osd = self.run(image, &self.base_args(PageSegMode::OsdOnly))?;
        tsv::parse_osd_rotation(&osd)
            .ok_or_else(|| OcrError::Engine("OSD report has no rotation".into()))
    }
}

// ── Tesseract library backend (optional, gated behind `tesseract` feature) ─────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{OcrBackend, OcrError};
    use crate::preprocess::encode_png;
    use crate::tsv;
    use crate::types::{PageSegMode, TokenTable};
    use image::DynamicImage;
    use leptess::{LepTess, Variable};

    /// In-process Tesseract through libtesseract. Offers no orientation estimate,
    /// so pages always take the brute-force rotation search.
    pub struct TesseractRecognizer {
        data_path: Option<String>,
        dpi: Option<i32>,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>) -> Self {
            Self { data_path, dpi: None }
        }

        pub fn with_dpi(mut self, dpi: u32) -> Self {
            self.dpi = i32::try_from(dpi).ok();
            self
        }

        fn load(&self, image: &DynamicImage, lang: &str, mode: PageSegMode) -> Result<LepTess, OcrError> {
            let png = encode_png(image).map_err(|e| OcrError::ImageEncode(e.to_string()))?;
            let mut lt = LepTess::new(self.data_path.as_deref(), lang)
                .map_err(|e| OcrError::Engine(format!("{e:?}")))?;
            lt.set_variable(Variable::TesseditPagesegMode, &mode.as_psm().to_string())
                .map_err(|e| OcrError::Engine(format!("{e:?}")))?;
            lt.set_variable(Variable::PreserveInterwordSpaces, "1")
                .map_err(|e| OcrError::Engine(format!("{e:?}")))?;
            lt.set_image_from_mem(&png)
                .map_err(|e| OcrError::ImageEncode(format!("{e:?}")))?;
            if let Some(dpi) = self.dpi {
                lt.set_source_resolution(dpi);
            }
            Ok(lt)
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image: &DynamicImage, lang: &str, mode: PageSegMode) -> Result<String, OcrError> {
            let mut lt = self.load(image, lang, mode)?;
            lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
        }

        fn recognize_tokens(&self, image: &DynamicImage, lang: &str) -> Result<TokenTable, OcrError> {
            let mut lt = self.load(image, lang, PageSegMode::SingleColumn)?;
            let tsv_text = lt.get_tsv_text(0).map_err(|e| OcrError::Engine(e.to_string()))?;
            Ok(tsv::parse_tsv(&tsv_text))
        }

        fn detect_orientation(&self, _image: &DynamicImage, _lang: &str) -> Result<u32, OcrError> {
            Err(OcrError::NotAvailable)
        }
    }
}
