use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use albaran_ocr::{
    assemble_lines, load_page_file, parse_tsv, AlbaranPipeline, DocumentExtraction, OcrBackend, OcrOutput,
    PageExtraction, TokenTable,
};
use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::export::{render, OutputFormat};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "webp"];

pub type SharedPipeline<R> = Arc<AlbaranPipeline<R>>;

/// One document to process: a name for its outputs and its pages in order.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSource {
    pub name: String,
    pub pages: Vec<PathBuf>,
}

impl DocumentSource {
    pub fn single(path: &Path) -> Self {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        Self { name, pages: vec![path.to_path_buf()] }
    }
}

/// Tally of a batch run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
    pub products: usize,
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
}

/// Each image in `dir` is a one-page document; each subdirectory of images is a
/// multi-page document with pages in file-name order.
pub fn collect_documents(dir: &Path) -> Result<Vec<DocumentSource>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    let mut docs = Vec::new();
    for path in entries {
        if path.is_dir() {
            let mut pages: Vec<PathBuf> = std::fs::read_dir(&path)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| is_image(p))
                .collect();
            if pages.is_empty() {
                continue;
            }
            pages.sort();
            let name = path
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".to_string());
            docs.push(DocumentSource { name, pages });
        } else if is_image(&path) {
            docs.push(DocumentSource::single(&path));
        }
    }
    Ok(docs)
}

/// Process one document on the blocking pool.
pub async fn extract_document<R>(pipeline: SharedPipeline<R>, pages: Vec<PathBuf>) -> Result<DocumentExtraction>
where
    R: OcrBackend + 'static,
{
    tokio::task::spawn_blocking(move || -> Result<DocumentExtraction> {
        let images = pages
            .iter()
            .map(|p| load_page_file(p).with_context(|| format!("loading page {}", p.display())))
            .collect::<Result<Vec<_>>>()?;
        Ok(pipeline.process_document(images))
    })
    .await?
}

/// Write `<name>_productos.<ext>` for every requested format.
pub async fn write_outputs(
    doc: &DocumentExtraction,
    name: &str,
    out_dir: &Path,
    formats: &[OutputFormat],
) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(out_dir).await?;
    let mut written = Vec::with_capacity(formats.len());
    for &format in formats {
        let path = out_dir.join(format!("{name}_productos.{}", format.extension()));
        tokio::fs::write(&path, render(doc, format)?).await?;
        written.push(path);
    }
    Ok(written)
}

/// Process a document and write its outputs; failures are logged and reported, not raised.
async fn run_document<R>(
    pipeline: SharedPipeline<R>,
    source: DocumentSource,
    out_dir: &Path,
    formats: &[OutputFormat],
) -> Option<usize>
where
    R: OcrBackend + 'static,
{
    tracing::info!(document = %source.name, pages = source.pages.len(), "Processing document");
    let outcome = match extract_document(pipeline, source.pages).await {
        Ok(doc) => write_outputs(&doc, &source.name, out_dir, formats)
            .await
            .map(|_| doc.result.total_products),
        Err(e) => Err(e),
    };
    match outcome {
        Ok(count) => {
            tracing::info!(document = %source.name, products = count, "Document written");
            Some(count)
        }
        Err(e) => {
            let error = format!("{e:#}");
            tracing::warn!(document = %source.name, %error, "Document failed, skipping");
            None
        }
    }
}

/// Process every document found in `dir`; one failure never stops the rest.
pub async fn run_batch<R>(
    pipeline: SharedPipeline<R>,
    dir: &Path,
    out_dir: &Path,
    formats: &[OutputFormat],
) -> Result<BatchSummary>
where
    R: OcrBackend + 'static,
{
    let docs = collect_documents(dir)?;
    tracing::info!(documents = docs.len(), dir = %dir.display(), "Starting batch");

    let mut summary = BatchSummary::default();
    for source in docs {
        match run_document(Arc::clone(&pipeline), source, out_dir, formats).await {
            Some(products) => {
                summary.processed += 1;
                summary.products += products;
            }
            None => summary.failed += 1,
        }
    }
    Ok(summary)
}

// ── Saved OCR output ──────────────────────────────────────────────────────────

/// Read a saved OCR result: a JSON token table, Tesseract TSV, or plain text.
pub fn read_saved_output(path: &Path) -> Result<(String, OcrOutput)> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    let table = match ext.as_str() {
        "json" => serde_json::from_str::<TokenTable>(&raw).with_context(|| format!("parsing {}", path.display()))?,
        "tsv" => parse_tsv(&raw),
        _ => return Ok((raw.clone(), OcrOutput::Text(raw))),
    };
    let tokens = table.into_tokens()?;
    // Readable text for the report and the footer totals.
    let text = assemble_lines(&tokens, 0.0)
        .iter()
        .map(|l| l.text())
        .collect::<Vec<_>>()
        .join("\n");
    Ok((text, OcrOutput::Tokens(tokens)))
}

/// Extract a document from saved OCR results, one file per page.
pub fn extract_saved<R: OcrBackend>(pipeline: &AlbaranPipeline<R>, paths: &[PathBuf]) -> Result<DocumentExtraction> {
    let pages = paths
        .iter()
        .map(|p| {
            let (text, output) = read_saved_output(p)?;
            Ok(pipeline.extract_output(text, &output))
        })
        .collect::<Result<Vec<PageExtraction>>>()?;
    Ok(DocumentExtraction::from_pages(pages))
}

// ── Watch-folder integration ──────────────────────────────────────────────────

/// A file is processed once it has gone this long without a write event.
const SETTLE_TIME: Duration = Duration::from_millis(1500);
const SETTLE_POLL: Duration = Duration::from_millis(250);

/// Events that mean a file appeared or its contents changed.
fn is_intake_event(kind: &notify::EventKind) -> bool {
    use notify::event::{AccessKind, AccessMode, ModifyKind};
    use notify::EventKind;

    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}

/// Paths waiting for their writer to finish.
///
/// Every event pushes a path's deadline back; a path is released once it has been
/// quiet for the settle time, so a scan still being copied is not decoded half-written.
#[derive(Debug)]
pub struct IntakeQueue {
    settle: Duration,
    pending: HashMap<PathBuf, Instant>,
}

impl IntakeQueue {
    pub fn new(settle: Duration) -> Self {
        Self { settle, pending: HashMap::new() }
    }

    pub fn touch(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path, now);
    }

    /// Remove and return every settled path, in path order.
    pub fn take_settled(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut settled: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) >= self.settle)
            .map(|(path, _)| path.clone())
            .collect();
        settled.sort();
        for path in &settled {
            self.pending.remove(path);
        }
        settled
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Spawn a notify watcher on `watch_dir` that sends created or written file paths to `tx`.
/// Returns the watcher; it must be kept alive for watching to continue.
pub fn spawn_intake_watcher(watch_dir: &Path, tx: mpsc::Sender<PathBuf>) -> notify::Result<impl notify::Watcher> {
    use notify::{RecursiveMode, Watcher};

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        if let Ok(ev) = event {
            if is_intake_event(&ev.kind) {
                for path in ev.paths {
                    let _ = tx.try_send(path);
                }
            }
        }
    })?;

    watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Process images as they land in `dir` until the channel closes or Ctrl-C.
pub async fn run_watch<R>(
    pipeline: SharedPipeline<R>,
    dir: &Path,
    out_dir: &Path,
    formats: &[OutputFormat],
) -> Result<()>
where
    R: OcrBackend + 'static,
{
    let (tx, mut rx) = mpsc::channel::<PathBuf>(64);
    let _watcher = spawn_intake_watcher(dir, tx).with_context(|| format!("watching {}", dir.display()))?;
    tracing::info!(dir = %dir.display(), "Watching intake folder");

    let mut queue = IntakeQueue::new(SETTLE_TIME);
    let mut poll = tokio::time::interval(SETTLE_POLL);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some(path) = received else { break };
                if is_image(&path) {
                    queue.touch(path, Instant::now());
                }
            }
            _ = poll.tick(), if !queue.is_empty() => {
                for path in queue.take_settled(Instant::now()) {
                    if !path.is_file() {
                        continue;
                    }
                    run_document(Arc::clone(&pipeline), DocumentSource::single(&path), out_dir, formats).await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping intake watcher");
                break;
            }
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use albaran_core::AlbaranConfig;
    use albaran_ocr::MockRecognizer;
    use image::{DynamicImage, ImageBuffer, Luma};

    const SHEET: &str = "1092 1 CARAPAU T1/A ... 7,4\n249 1 GAMBA-BRANC-MIU Parapenaeus longiros DPS Inte 9,9\n";

    fn pipeline() -> SharedPipeline<MockRecognizer> {
        let mut config = AlbaranConfig::default();
        config.binarize.target_width = 40;
        Arc::new(AlbaranPipeline::new(MockRecognizer::new(SHEET).with_rotation(0), config))
    }

    fn save_page(path: &Path) {
        let img = DynamicImage::ImageLuma8(ImageBuffer::from_fn(20, 30, |x, _| {
            Luma([if x % 3 == 0 { 10u8 } else { 240 }])
        }));
        img.save(path).unwrap();
    }

    #[test]
    fn image_extensions() {
        assert!(is_image(Path::new("a/page.PNG")));
        assert!(is_image(Path::new("scan.jpeg")));
        assert!(!is_image(Path::new("notes.txt")));
        assert!(!is_image(Path::new("noext")));
    }

    #[test]
    fn documents_from_files_and_folders() {
        let dir = tempfile::tempdir().unwrap();
        save_page(&dir.path().join("b.png"));
        std::fs::write(dir.path().join("readme.txt"), "x").unwrap();
        let multi = dir.path().join("a_sheet");
        std::fs::create_dir(&multi).unwrap();
        save_page(&multi.join("page-2.png"));
        save_page(&multi.join("page-1.png"));
        std::fs::create_dir(dir.path().join("empty")).unwrap();

        let docs = collect_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name, "a_sheet");
        assert_eq!(docs[0].pages, vec![multi.join("page-1.png"), multi.join("page-2.png")]);
        assert_eq!(docs[1].name, "b");
    }

    #[tokio::test]
    async fn batch_isolates_failures() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        save_page(&input.path().join("good.png"));
        std::fs::write(input.path().join("broken.png"), b"not really a png").unwrap();

        let summary = run_batch(pipeline(), input.path(), output.path(), &[OutputFormat::Json, OutputFormat::Csv])
            .await
            .unwrap();
        assert_eq!(summary, BatchSummary { processed: 1, failed: 1, products: 2 });
        assert!(output.path().join("good_productos.json").exists());
        assert!(output.path().join("good_productos.csv").exists());
        assert!(!output.path().join("broken_productos.json").exists());
    }

    #[tokio::test]
    async fn multi_page_document_appends_pages() {
        let input = tempfile::tempdir().unwrap();
        let pages = vec![input.path().join("p1.png"), input.path().join("p2.png")];
        pages.iter().for_each(|p| save_page(p));

        let doc = extract_document(pipeline(), pages).await.unwrap();
        assert_eq!(doc.result.total_products, 4);
    }

    #[test]
    fn saved_token_table_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("page.json");
        std::fs::write(
            &json,
            r#"{"text":["Peso","1092","1","CARAPAU","7,4"],
                "conf":[90,95,95,"91.5",88],
                "left":[580,0,50,150,585],
                "width":[40,40,10,100,30],
                "block_num":[1,1,1,1,1],
                "par_num":[1,2,2,2,2],
                "line_num":[1,1,1,1,1]}"#,
        )
        .unwrap();
        let txt = dir.path().join("page.txt");
        std::fs::write(&txt, "Total Quilos: 7,4\n").unwrap();

        let pipeline = AlbaranPipeline::new(MockRecognizer::failing(), AlbaranConfig::default());
        let doc = extract_saved(&pipeline, &[json, txt]).unwrap();
        assert_eq!(doc.result.total_products, 1);
        assert_eq!(doc.result.products[0].weight_kg, Some(7.4));
        assert_eq!(doc.result.totals.as_ref().unwrap().total_kg, Some(7.4));
        assert!(doc.text.starts_with("Peso\n1092 1 CARAPAU 7,4\n"));
    }

    #[test]
    fn intake_events() {
        use notify::event::{AccessKind, AccessMode, CreateKind, DataChange, ModifyKind, RemoveKind};
        use notify::EventKind;

        assert!(is_intake_event(&EventKind::Create(CreateKind::File)));
        assert!(is_intake_event(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(is_intake_event(&EventKind::Access(AccessKind::Close(AccessMode::Write))));
        assert!(!is_intake_event(&EventKind::Access(AccessKind::Close(AccessMode::Read))));
        assert!(!is_intake_event(&EventKind::Remove(RemoveKind::File)));
    }

    #[test]
    fn intake_waits_for_writes_to_settle() {
        let start = Instant::now();
        let mut queue = IntakeQueue::new(Duration::from_secs(1));
        queue.touch(PathBuf::from("scan.png"), start);
        queue.touch(PathBuf::from("other.png"), start);
        assert!(queue.take_settled(start + Duration::from_millis(500)).is_empty());

        // A later write to scan.png pushes its deadline back.
        queue.touch(PathBuf::from("scan.png"), start + Duration::from_millis(800));
        assert_eq!(queue.take_settled(start + Duration::from_secs(1)), vec![PathBuf::from("other.png")]);
        assert!(queue.take_settled(start + Duration::from_millis(1500)).is_empty());
        assert_eq!(
            queue.take_settled(start + Duration::from_millis(1800)),
            vec![PathBuf::from("scan.png")]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn ragged_token_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("bad.json");
        std::fs::write(&json, r#"{"text":["a","b"],"conf":[90],"left":[0,1],"width":[1,1]}"#).unwrap();
        assert!(read_saved_output(&json).is_err());
    }
}
