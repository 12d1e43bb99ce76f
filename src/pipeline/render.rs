//! PDF rasterisation: render the first page to a `DynamicImage` via pdfium.
//!
//! ## Threading
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state. Rendering runs on `spawn_blocking`, never on executor threads.
//!
//! ## Scale
//!
//! pdfium's default page resolution is one pixel per PDF point (72 DPI). The
//! page is rendered at [`RENDER_SCALE`]× that in both axes, so an A4 page
//! (595 × 842 pt) becomes roughly 1190 × 1684 px.

use crate::error::DoctagsError;
use crate::pipeline::encode;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Linear upscale factor relative to the page's point size.
pub const RENDER_SCALE: f32 = 2.0;

/// Rasterise page 1 of `pdf_bytes`.
///
/// Returns the rendered image and its lossless PNG encoding.
pub async fn render_first_page(
    pdf_bytes: Vec<u8>,
) -> Result<(DynamicImage, Vec<u8>), DoctagsError> {
    tokio::task::spawn_blocking(move || render_first_page_blocking(&pdf_bytes))
        .await
        .map_err(|e| DoctagsError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of first-page rendering.
fn render_first_page_blocking(pdf_bytes: &[u8]) -> Result<(DynamicImage, Vec<u8>), DoctagsError> {
    let pdfium = pdfium_auto::bind_pdfium_silent()
        .map_err(|e| DoctagsError::PdfiumBindingFailed(e.to_string()))?;

    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| DoctagsError::RasterisationFailed {
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages, rendering page 1", pages.len());

    let page = pages.get(0).map_err(|e| DoctagsError::RasterisationFailed {
        detail: format!("document has no first page: {:?}", e),
    })?;

    let render_config = PdfRenderConfig::new().scale_page_by_factor(RENDER_SCALE);
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| DoctagsError::RasterisationFailed {
            detail: format!("{:?}", e),
        })?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page 1 ({}x{} pt) → {}x{} px",
        page.width().value,
        page.height().value,
        image.width(),
        image.height()
    );

    let png = encode::encode_png(&image).map_err(|e| DoctagsError::RasterisationFailed {
        detail: format!("PNG encoding failed: {}", e),
    })?;

    Ok((image, png))
}
