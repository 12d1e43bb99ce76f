//! Prompt and DocTags marker constants.
//!
//! SmolDocling-style models are trained on a single short instruction; the
//! page content comes entirely from the image. Callers can override the
//! instruction via [`crate::config::PipelineConfig::prompt`].

/// Default instruction sent alongside the page image.
pub const DOCTAGS_PROMPT: &str = "Convert this page to docling.";

/// Sentinel closing tag: the model is done once this appears.
pub const DOCTAG_CLOSE: &str = "</doctag>";

/// Returned when every generation strategy failed.
///
/// It looks like DocTags but carries bare text in the root, so the parser
/// rejects it with a malformed-tags error instead of producing an empty page.
pub const PLACEHOLDER_DOCTAGS: &str = "<doctag>Error generating output</doctag>";

/// Name given to the structured document built from the page.
pub const DEFAULT_DOCUMENT_NAME: &str = "SampleDocument";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_wrapped_in_root_tags() {
        assert!(PLACEHOLDER_DOCTAGS.starts_with("<doctag>"));
        assert!(PLACEHOLDER_DOCTAGS.ends_with(DOCTAG_CLOSE));
    }
}
