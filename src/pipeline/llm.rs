//! VLM interaction: generate DocTags for the page image.
//!
//! Generation is a fixed strategy chain. [`GenerationStrategy::Batch`] makes
//! one blocking call bounded by `max_tokens`. If it fails, the driver moves to
//! [`GenerationStrategy::Streaming`], which consumes fragments in order and
//! stops as soon as the accumulated text contains the `</doctag>` sentinel.
//! If every strategy fails the driver returns [`PLACEHOLDER_DOCTAGS`] instead
//! of an error, so the caller always has something to hand to the parser.

use crate::error::GenerationError;
use crate::progress::ProgressCallback;
use crate::prompts::{DOCTAG_CLOSE, PLACEHOLDER_DOCTAGS};
use async_trait::async_trait;
use edgequake_llm::traits::StreamChunk;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use futures::StreamExt;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::Stream;
use tracing::{debug, info, trace, warn};

/// A boxed stream of generated text fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// One instruction turn: prompt text plus the page image. No history.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image: ImageData,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// The vision-language model collaborator.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Blocking call returning the whole output at once.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Incremental call returning fragments in production order.
    ///
    /// Dropping the stream must stop the producer.
    async fn stream_generate(&self, request: &GenerationRequest) -> Result<FragmentStream, GenerationError>;
}

/// A model served behind an edgequake-llm provider.
///
/// The batch strategy uses `chat`; the streaming strategy uses
/// `chat_with_tools_stream` with no tools and keeps only content chunks.
pub struct ServedModel {
    provider: Arc<dyn LLMProvider>,
}

impl ServedModel {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

/// The single user turn (prompt + page image) and its sampling options.
fn chat_turn(request: &GenerationRequest) -> (Vec<ChatMessage>, CompletionOptions) {
    let messages = vec![ChatMessage::user_with_images(
        request.prompt.as_str(),
        vec![request.image.clone()],
    )];
    let options = CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_tokens),
        ..Default::default()
    };
    (messages, options)
}

#[async_trait]
impl VisionModel for ServedModel {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let (messages, options) = chat_turn(request);
        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| GenerationError::Provider(e.to_string()))?;
        debug!(
            "Batch generation: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }

    async fn stream_generate(&self, request: &GenerationRequest) -> Result<FragmentStream, GenerationError> {
        let (messages, options) = chat_turn(request);
        let chunks = self
            .provider
            .chat_with_tools_stream(&messages, &[], None, Some(&options))
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        debug!("Streaming generation opened on provider '{}'", self.provider.name());

        let fragments = chunks.filter_map(|chunk| async move {
            match chunk {
                Ok(StreamChunk::Content(text)) if !text.is_empty() => Some(Ok(text)),
                Ok(StreamChunk::Finished { reason, .. }) => {
                    debug!("Stream finished: {}", reason);
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(GenerationError::Stream(e.to_string()))),
            }
        });
        Ok(Box::pin(fragments))
    }
}

/// How a generation attempt is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum GenerationStrategy {
    Batch,
    Streaming,
}

impl GenerationStrategy {
    /// Strategies in the order they are attempted.
    pub const CHAIN: [GenerationStrategy; 2] = [GenerationStrategy::Batch, GenerationStrategy::Streaming];
}

impl fmt::Display for GenerationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationStrategy::Batch => f.write_str("batch"),
            GenerationStrategy::Streaming => f.write_str("streaming"),
        }
    }
}

/// Where the final DocTags text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum GenerationSource {
    Strategy(GenerationStrategy),
    Placeholder,
}

/// Result of the generation stage.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Generation {
    pub text: String,
    pub source: GenerationSource,
    /// True when the streaming strategy stopped on the sentinel.
    pub stopped_on_sentinel: bool,
    pub duration_ms: u64,
}

/// Run the strategy chain and return the generated DocTags.
pub async fn generate(
    model: &dyn VisionModel,
    request: &GenerationRequest,
    progress: Option<&ProgressCallback>,
) -> Generation {
    let start = Instant::now();

    for strategy in GenerationStrategy::CHAIN {
        let attempt = match strategy {
            GenerationStrategy::Batch => model.generate(request).await.map(|text| (text, false)),
            GenerationStrategy::Streaming => consume_until_sentinel(model, request, progress).await,
        };

        match attempt {
            Ok((text, stopped_on_sentinel)) => {
                info!(
                    "Generated {} chars via {} strategy in {:?}",
                    text.len(),
                    strategy,
                    start.elapsed()
                );
                return Generation {
                    text,
                    source: GenerationSource::Strategy(strategy),
                    stopped_on_sentinel,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
            Err(e) => {
                warn!("Error during {} generation: {}", strategy, e);
                if let Some(cb) = progress {
                    cb.on_strategy_failed(strategy, &e.to_string());
                }
            }
        }
    }

    warn!("All generation strategies failed; using placeholder DocTags");
    Generation {
        text: PLACEHOLDER_DOCTAGS.to_string(),
        source: GenerationSource::Placeholder,
        stopped_on_sentinel: false,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

/// Streaming strategy: append fragments in order, stop on the sentinel.
///
/// Returns the accumulated text and whether the sentinel ended it. When the
/// stream is exhausted first the text is returned as-is, possibly truncated.
async fn consume_until_sentinel(
    model: &dyn VisionModel,
    request: &GenerationRequest,
    progress: Option<&ProgressCallback>,
) -> Result<(String, bool), GenerationError> {
    let mut fragments = model.stream_generate(request).await?;
    let mut output = String::new();
    let mut stopped = false;

    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        // Only the new tail can complete a sentinel that wasn't there before.
        let search_from = output.len().saturating_sub(DOCTAG_CLOSE.len() - 1);
        output.push_str(&fragment);
        trace!("fragment: {:?}", fragment);
        if let Some(cb) = progress {
            cb.on_fragment(&fragment);
        }
        if contains_sentinel_from(&output, search_from) {
            stopped = true;
            break;
        }
    }
    // Dropping the stream is the stop request to the producer.
    drop(fragments);

    Ok((output, stopped))
}

fn contains_sentinel_from(text: &str, from: usize) -> bool {
    let needle = DOCTAG_CLOSE.as_bytes();
    text.as_bytes()[from..]
        .windows(needle.len())
        .any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_llm::{LLMResponse, LlmError, ToolChoice, ToolDefinition};
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "Convert this page to docling.".into(),
            image: ImageData::new("AAAA", "image/png"),
            max_tokens: 64,
            temperature: 0.0,
        }
    }

    /// Model whose batch call fails and whose stream yields `fragments`,
    /// counting how many fragments were actually pulled.
    struct StreamingOnly {
        fragments: Vec<Result<String, GenerationError>>,
        pulled: Arc<AtomicUsize>,
        batch: Result<String, GenerationError>,
    }

    impl StreamingOnly {
        fn new(fragments: &[&str]) -> Self {
            Self {
                fragments: fragments.iter().map(|f| Ok(f.to_string())).collect(),
                pulled: Arc::new(AtomicUsize::new(0)),
                batch: Err(GenerationError::Provider("batch unavailable".into())),
            }
        }
    }

    #[async_trait]
    impl VisionModel for StreamingOnly {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
            self.batch.clone()
        }

        async fn stream_generate(&self, _request: &GenerationRequest) -> Result<FragmentStream, GenerationError> {
            let pulled = self.pulled.clone();
            let items = self.fragments.clone();
            Ok(Box::pin(stream::iter(items).inspect(move |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            })))
        }
    }

    #[tokio::test]
    async fn batch_success_skips_streaming() {
        let mut model = StreamingOnly::new(&["never"]);
        model.batch = Ok("<doctag><text>hi</text></doctag>".into());
        let out = generate(&model, &request(), None).await;
        assert_eq!(out.source, GenerationSource::Strategy(GenerationStrategy::Batch));
        assert_eq!(out.text, "<doctag><text>hi</text></doctag>");
        assert_eq!(model.pulled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn streaming_stops_at_first_sentinel() {
        let model = StreamingOnly::new(&[
            "<doctag>",
            "<text>a</text>",
            "</doctag>",
            "<end_of_utterance>",
            "</doctag>",
        ]);
        let out = generate(&model, &request(), None).await;
        assert_eq!(out.source, GenerationSource::Strategy(GenerationStrategy::Streaming));
        assert!(out.stopped_on_sentinel);
        assert_eq!(out.text, "<doctag><text>a</text></doctag>");
        assert_eq!(out.text.matches(DOCTAG_CLOSE).count(), 1);
        assert_eq!(model.pulled.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn sentinel_split_across_fragments_is_detected() {
        let model = StreamingOnly::new(&["<doctag><text>x</text></doc", "tag>", "trailing"]);
        let out = generate(&model, &request(), None).await;
        assert!(out.stopped_on_sentinel);
        assert!(out.text.ends_with(DOCTAG_CLOSE));
        assert_eq!(model.pulled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_stream_returns_truncated_text() {
        let model = StreamingOnly::new(&["<doctag>", "<text>cut"]);
        let out = generate(&model, &request(), None).await;
        assert!(!out.stopped_on_sentinel);
        assert_eq!(out.text, "<doctag><text>cut");
    }

    #[tokio::test]
    async fn stream_error_yields_placeholder() {
        let mut model = StreamingOnly::new(&["<doctag>"]);
        model
            .fragments
            .push(Err(GenerationError::Stream("connection reset".into())));
        let out = generate(&model, &request(), None).await;
        assert_eq!(out.source, GenerationSource::Placeholder);
        assert_eq!(out.text, PLACEHOLDER_DOCTAGS);
    }

    #[tokio::test]
    async fn fragments_reach_progress_callback_in_order() {
        #[derive(Default)]
        struct Collect(Mutex<Vec<String>>, Mutex<Vec<GenerationStrategy>>);
        impl crate::progress::ConversionProgressCallback for Collect {
            fn on_fragment(&self, fragment: &str) {
                self.0.lock().unwrap().push(fragment.to_string());
            }
            fn on_strategy_failed(&self, strategy: GenerationStrategy, _error: &str) {
                self.1.lock().unwrap().push(strategy);
            }
        }

        let collect = Arc::new(Collect::default());
        let cb: ProgressCallback = collect.clone();
        let model = StreamingOnly::new(&["<doctag>", "</doctag>"]);
        generate(&model, &request(), Some(&cb)).await;

        assert_eq!(*collect.0.lock().unwrap(), vec!["<doctag>", "</doctag>"]);
        assert_eq!(*collect.1.lock().unwrap(), vec![GenerationStrategy::Batch]);
    }

    /// edgequake-llm provider whose `chat` fails and whose tool stream
    /// replays `chunks`, recording whether the turn carried an image.
    struct ChunkedProvider {
        chunks: Vec<edgequake_llm::Result<StreamChunk>>,
        saw_image: std::sync::atomic::AtomicBool,
        saw_tools: AtomicUsize,
    }

    impl ChunkedProvider {
        fn new(chunks: Vec<edgequake_llm::Result<StreamChunk>>) -> Self {
            Self {
                chunks,
                saw_image: std::sync::atomic::AtomicBool::new(false),
                saw_tools: AtomicUsize::new(0),
            }
        }
    }

    fn content(text: &str) -> edgequake_llm::Result<StreamChunk> {
        Ok(StreamChunk::Content(text.to_string()))
    }

    #[async_trait]
    impl LLMProvider for ChunkedProvider {
        fn name(&self) -> &str {
            "chunked"
        }
        fn model(&self) -> &str {
            "smoldocling"
        }
        fn max_context_length(&self) -> usize {
            8192
        }
        async fn complete(&self, _prompt: &str) -> edgequake_llm::Result<LLMResponse> {
            Err(LlmError::ApiError("batch disabled".into()))
        }
        async fn complete_with_options(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.complete(prompt).await
        }
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.complete("").await
        }
        async fn chat_with_tools_stream(
            &self,
            messages: &[ChatMessage],
            tools: &[ToolDefinition],
            _tool_choice: Option<ToolChoice>,
            _options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<futures::stream::BoxStream<'static, edgequake_llm::Result<StreamChunk>>> {
            let has_image = messages
                .iter()
                .any(|m| m.images.as_ref().is_some_and(|imgs| !imgs.is_empty()));
            self.saw_image.store(has_image, Ordering::SeqCst);
            self.saw_tools.store(tools.len(), Ordering::SeqCst);
            let chunks: Vec<_> = self
                .chunks
                .iter()
                .map(|c| match c {
                    Ok(chunk) => Ok(chunk.clone()),
                    Err(e) => Err(LlmError::NetworkError(e.to_string())),
                })
                .collect();
            Ok(stream::iter(chunks).boxed())
        }
    }

    #[tokio::test]
    async fn served_model_streams_content_chunks_from_provider() {
        let provider = Arc::new(ChunkedProvider::new(vec![
            content("<doctag>"),
            Ok(StreamChunk::ThinkingContent {
                text: "reading the page".into(),
                tokens_used: None,
                budget_total: None,
            }),
            content("<text>Hi</text>"),
            content(""),
            content("</doctag>"),
            content("<end_of_utterance>"),
            Ok(StreamChunk::Finished {
                reason: "stop".into(),
                ttft_ms: None,
            }),
        ]));
        let model = ServedModel::new(provider.clone());

        let out = generate(&model, &request(), None).await;
        assert_eq!(out.source, GenerationSource::Strategy(GenerationStrategy::Streaming));
        assert!(out.stopped_on_sentinel);
        assert_eq!(out.text, "<doctag><text>Hi</text></doctag>");
        assert!(provider.saw_image.load(Ordering::SeqCst));
        assert_eq!(provider.saw_tools.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn served_model_mid_stream_error_yields_placeholder() {
        let provider = Arc::new(ChunkedProvider::new(vec![
            content("<doctag>"),
            Err(LlmError::NetworkError("connection reset".into())),
            content("</doctag>"),
        ]));
        let out = generate(&ServedModel::new(provider), &request(), None).await;
        assert_eq!(out.source, GenerationSource::Placeholder);
        assert_eq!(out.text, PLACEHOLDER_DOCTAGS);
    }

    #[tokio::test]
    async fn provider_without_streaming_yields_placeholder() {
        // Default `chat_with_tools_stream` reports NotSupported.
        struct NoStream;
        #[async_trait]
        impl LLMProvider for NoStream {
            fn name(&self) -> &str {
                "nostream"
            }
            fn model(&self) -> &str {
                "m"
            }
            fn max_context_length(&self) -> usize {
                1
            }
            async fn complete(&self, _p: &str) -> edgequake_llm::Result<LLMResponse> {
                Err(LlmError::AuthError("no key".into()))
            }
            async fn complete_with_options(
                &self,
                p: &str,
                _o: &CompletionOptions,
            ) -> edgequake_llm::Result<LLMResponse> {
                self.complete(p).await
            }
            async fn chat(
                &self,
                _m: &[ChatMessage],
                _o: Option<&CompletionOptions>,
            ) -> edgequake_llm::Result<LLMResponse> {
                self.complete("").await
            }
        }

        let out = generate(&ServedModel::new(Arc::new(NoStream)), &request(), None).await;
        assert_eq!(out.source, GenerationSource::Placeholder);
    }

    #[tokio::test]
    async fn served_model_batch_uses_provider_chat() {
        let provider = edgequake_llm::providers::MockAgentProvider::new();
        provider.add_response_sync("<doctag><text>batch</text></doctag>");
        let model = ServedModel::new(Arc::new(provider));
        let out = generate(&model, &request(), None).await;
        assert_eq!(out.source, GenerationSource::Strategy(GenerationStrategy::Batch));
        assert_eq!(out.text, "<doctag><text>batch</text></doctag>");
    }

    #[test]
    fn sentinel_search_respects_offset() {
        let text = "</doctag>abc";
        assert!(contains_sentinel_from(text, 0));
        assert!(!contains_sentinel_from(text, 1));
    }
}
