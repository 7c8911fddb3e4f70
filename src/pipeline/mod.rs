pub mod ocr;
pub mod structuring;
pub mod processor;
