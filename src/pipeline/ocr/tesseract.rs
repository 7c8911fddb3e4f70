use std::io::Write;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::types::{BoundingBox, EngineOutput, RecognitionEngine};
use super::OcrError;

/// Vietnamese first, English for stamps and codes.
pub const DEFAULT_LANGUAGES: &str = "vie+eng";

/// Tesseract page segmentation mode 6: a single uniform block of text.
const DEFAULT_PAGE_SEGMENTATION: u8 = 6;

/// Tesseract through its command-line binary.
///
/// The binary is checked once at construction (`tesseract --version`); if the
/// check fails the engine reports itself unavailable and is never called.
pub struct TesseractCli {
    binary: String,
    languages: String,
    page_segmentation: u8,
    available: bool,
}

impl TesseractCli {
    pub fn new(binary: &str, languages: &str) -> Self {
        let available = binary_runs(binary);
        Self {
            binary: binary.to_string(),
            languages: languages.to_string(),
            page_segmentation: DEFAULT_PAGE_SEGMENTATION,
            available,
        }
    }

    /// `tesseract` on PATH with Vietnamese + English.
    pub fn default_system() -> Self {
        Self::new("tesseract", DEFAULT_LANGUAGES)
    }

    pub fn with_page_segmentation(mut self, psm: u8) -> Self {
        self.page_segmentation = psm;
        self
    }
}

fn binary_runs(binary: &str) -> bool {
    match Command::new(binary).arg("--version").output() {
        Ok(output) => output.status.success(),
        Err(e) => {
            tracing::debug!(binary, error = %e, "Tesseract binary check failed");
            false
        }
    }
}

impl RecognitionEngine for TesseractCli {
    fn engine_id(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn recognize(&self, image_bytes: &[u8]) -> Result<EngineOutput, OcrError> {
        if !self.available {
            return Err(OcrError::EngineUnavailable(self.binary.clone()));
        }

        let mut image = tempfile::Builder::new().prefix("dossier-page-").tempfile()?;
        image.write_all(image_bytes)?;
        image.flush()?;

        let output = Command::new(&self.binary)
            .arg(image.path())
            .arg("stdout")
            .args(["-l", &self.languages])
            .args(["--psm", &self.page_segmentation.to_string()])
            .arg("tsv")
            .output()?;

        if !output.status.success() {
            return Err(OcrError::EngineExit {
                engine: self.binary.clone(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let words = parse_tsv_words(&tsv);
        Ok(assemble_page(&words))
    }
}

/// One recognized word from Tesseract TSV output.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f32,
    /// (block, paragraph, line): words sharing it are on the same line.
    pub line: (u32, u32, u32),
    pub bounding_box: Option<BoundingBox>,
}

/// Parse Tesseract TSV output into words.
/// TSV columns: level page_num block_num par_num line_num word_num left top width height conf text
/// Level 5 = individual word entries. Confidence is 0-100 (integer or
/// decimal depending on version), scaled to 0.0-1.0; -1 becomes 0.
pub fn parse_tsv_words(tsv: &str) -> Vec<OcrWord> {
    let mut words = Vec::new();

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 || fields[0] != "5" {
            continue;
        }

        let Ok(conf) = fields[10].trim().parse::<f32>() else {
            continue;
        };

        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }

        let line_key = (
            fields[2].parse().unwrap_or(0),
            fields[3].parse().unwrap_or(0),
            fields[4].parse().unwrap_or(0),
        );

        words.push(OcrWord {
            text: text.to_string(),
            confidence: if conf < 0.0 { 0.0 } else { (conf / 100.0).min(1.0) },
            line: line_key,
            bounding_box: parse_bounding_box(fields[6], fields[7], fields[8], fields[9]),
        });
    }

    words
}

/// Parse bounding box coordinates from TSV string fields.
/// Returns None if any field fails to parse.
fn parse_bounding_box(left: &str, top: &str, width: &str, height: &str) -> Option<BoundingBox> {
    Some(BoundingBox {
        x: left.parse().ok()?,
        y: top.parse().ok()?,
        width: width.parse().ok()?,
        height: height.parse().ok()?,
    })
}

/// Rebuild page text line by line. Page confidence is the mean over words
/// Tesseract scored above zero.
pub fn assemble_page(words: &[OcrWord]) -> EngineOutput {
    let mut lines: Vec<String> = Vec::new();
    let mut current: Option<(u32, u32, u32)> = None;

    for word in words {
        if current == Some(word.line) {
            if let Some(last) = lines.last_mut() {
                last.push(' ');
                last.push_str(&word.text);
            }
        } else {
            lines.push(word.text.clone());
            current = Some(word.line);
        }
    }

    let scored: Vec<f32> = words
        .iter()
        .map(|w| w.confidence)
        .filter(|c| *c > 0.0)
        .collect();
    let confidence = if scored.is_empty() {
        0.0
    } else {
        scored.iter().sum::<f32>() / scored.len() as f32
    };

    let bounding_box = words
        .iter()
        .filter_map(|w| w.bounding_box)
        .reduce(|acc, b| acc.union(&b));

    EngineOutput {
        text: lines.join("\n"),
        confidence,
        bounding_box,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MockBehavior {
    Answer,
    Fail,
    Panic,
}

/// Mock OCR engine for unit testing without Tesseract.
pub struct MockOcrEngine {
    id: String,
    text: String,
    confidence: f32,
    available: bool,
    behavior: MockBehavior,
    delay: Option<Duration>,
    availability_checks: AtomicUsize,
}

impl MockOcrEngine {
    pub fn new(id: &str, text: &str, confidence: f32) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            confidence,
            available: true,
            behavior: MockBehavior::Answer,
            delay: None,
            availability_checks: AtomicUsize::new(0),
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn failing(mut self) -> Self {
        self.behavior = MockBehavior::Fail;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.behavior = MockBehavior::Panic;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `is_available` has been called.
    pub fn availability_checks(&self) -> usize {
        self.availability_checks.load(Ordering::SeqCst)
    }
}

impl RecognitionEngine for MockOcrEngine {
    fn engine_id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        self.availability_checks.fetch_add(1, Ordering::SeqCst);
        self.available
    }

    fn recognize(&self, _image_bytes: &[u8]) -> Result<EngineOutput, OcrError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match self.behavior {
            MockBehavior::Answer => Ok(EngineOutput::new(self.text.clone(), self.confidence)),
            MockBehavior::Fail => Err(OcrError::OcrProcessing(format!("{} failed", self.id))),
            MockBehavior::Panic => panic!("mock engine {} panicked", self.id),
        }
    }
}
