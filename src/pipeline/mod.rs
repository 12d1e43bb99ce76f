//! Pipeline stages for one DocTags run.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ ocr ──▶ llm
//! (URL/path) (pdfium)  (PNG/b64)  (Textract) (VLM)
//! ```
//!
//! 1. [`input`] : fetch or read the source bytes and decide PDF vs image
//! 2. [`render`]: rasterise the first PDF page at 2×; runs in
//!    `spawn_blocking`
//! 3. [`encode`]: PNG-encode a `DynamicImage` and wrap it for the VLM request
//! 4. [`ocr`]   : optional Textract comparison with ordered credential strategies
//! 5. [`llm`]   : batch generation with a streaming fallback
//!
//! Parsing and export of the generated DocTags live in [`crate::document`].

pub mod encode;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod render;
