//! Generation engine.
//!
//! The engine owns the inference session and runs the autoregressive decode
//! loop. Requests share one session, so each request holds the session mutex
//! for its whole decode loop and requests run one after another in arrival
//! order.
//!
//! ## Lifecycle
//!
//! ```text
//!                initialize()
//! Uninitialized ─────────────▶ Initializing ──ok──▶ Ready
//!       ▲                           │
//!       └──────────── err ──────────┘
//! ```
//!
//! ## Decode Loop
//!
//! ```text
//! prompt ──▶ encode ──▶ ids
//!                        │
//!          ┌─────────────▼─────────────┐
//!          │ session.run(ids[-window:]) │ × max_tokens
//!          │ logits[0, -1, :]           │
//!          │ sampler.sample             │
//!          │ ids.push(next)             │
//!          └─────────────┬─────────────┘
//!                        ▼
//!          decode(generated ids) ──▶ trimmed text
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex as AsyncMutex;
use log::{debug, info, warn};

use super::sampler::Sampler;
use super::session::{
    input_ids_tensor, last_position_logits, InferenceSession, SessionFactory, SessionInputs,
};
use crate::config::{EngineConfig, SamplingConfig};
use crate::error::{Error, Result};
use crate::tokenizer::{TokenId, Tokenizer};

/// Request for text generation.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Input prompt text.
    pub prompt: String,
    /// Sampling configuration for this request.
    pub sampling_config: SamplingConfig,
}

impl GenerationRequest {
    /// Create a new generation request with default settings.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            sampling_config: SamplingConfig::default(),
        }
    }

    /// Replace the whole sampling configuration.
    pub fn with_config(mut self, sampling_config: SamplingConfig) -> Self {
        self.sampling_config = sampling_config;
        self
    }

    /// Set the number of tokens to generate.
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.sampling_config.max_tokens = max_tokens;
        self
    }

    /// Set the temperature for sampling.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.sampling_config.temperature = temperature;
        self
    }

    /// Set top-k sampling parameter.
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.sampling_config.top_k = top_k;
        self
    }

    /// Set nucleus sampling parameter.
    pub fn top_p(mut self, top_p: f32) -> Self {
        self.sampling_config.top_p = top_p;
        self
    }
}

/// Output from a generation request.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    /// Input prompt text.
    pub prompt: String,
    /// Generated text, trimmed.
    pub output_text: String,
    /// Generated token ids (prompt excluded).
    pub output_tokens: Vec<TokenId>,
    /// Number of prompt tokens.
    pub prompt_len: usize,
}

/// Observable engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineStatus {
    /// No session; `initialize` has not run or the last attempt failed.
    Uninitialized,
    /// An initialization attempt is in flight.
    Initializing,
    /// Generation may proceed.
    Ready,
}

impl EngineStatus {
    /// Get the status name as a static string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Initializing => "Initializing",
            Self::Ready => "Ready",
        }
    }
}

/// Everything a request needs exclusive access to while decoding.
struct DecodeContext {
    session: Box<dyn InferenceSession>,
    sampler: Sampler,
}

struct ReadySession {
    /// Fair (FIFO) async mutex; waiting on it is the generation queue.
    context: AsyncMutex<DecodeContext>,
}

type InitOutcome = std::result::Result<Arc<ReadySession>, Arc<Error>>;
type InitAttempt = Shared<BoxFuture<'static, InitOutcome>>;

enum EngineState {
    Uninitialized,
    Initializing(InitAttempt),
    Ready(Arc<ReadySession>),
}

/// Text generation engine over one inference session.
///
/// Construct it once per loaded model and share it by reference or `Arc`.
pub struct GenerationEngine {
    config: Arc<EngineConfig>,
    tokenizer: Arc<Tokenizer>,
    factory: Arc<dyn SessionFactory>,
    state: Arc<Mutex<EngineState>>,
}

impl GenerationEngine {
    /// Create an engine with a fresh tokenizer built from `config.tokenizer`.
    pub fn new(config: EngineConfig, factory: Arc<dyn SessionFactory>) -> Self {
        let tokenizer = Arc::new(Tokenizer::new(&config.tokenizer));
        Self::with_tokenizer(config, tokenizer, factory)
    }

    /// Create an engine around an existing tokenizer.
    pub fn with_tokenizer(
        config: EngineConfig,
        tokenizer: Arc<Tokenizer>,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            tokenizer,
            factory,
            state: Arc::new(Mutex::new(EngineState::Uninitialized)),
        }
    }

    /// Loads the merge rules, then constructs the inference session.
    ///
    /// Concurrent callers share the single in-flight attempt and all observe
    /// its result. A failed attempt leaves the engine `Uninitialized`, so a
    /// later call starts over. Returns immediately once `Ready`.
    ///
    /// The attempt only makes progress while some caller awaits it. If every
    /// caller is dropped mid-flight the engine stays `Initializing` and the
    /// next call resumes the same attempt.
    pub async fn initialize(&self) -> Result<()> {
        let attempt = {
            let mut state = self.lock_state();
            match &*state {
                EngineState::Ready(_) => return Ok(()),
                EngineState::Initializing(attempt) => attempt.clone(),
                EngineState::Uninitialized => {
                    info!(
                        "initializing generation engine (merges: {}, model: {})",
                        self.config.merges_path.display(),
                        self.config.model_path.display()
                    );
                    let attempt = initialize_session(
                        Arc::clone(&self.config),
                        Arc::clone(&self.tokenizer),
                        Arc::clone(&self.factory),
                        Arc::downgrade(&self.state),
                    )
                    .boxed()
                    .shared();
                    *state = EngineState::Initializing(attempt.clone());
                    attempt
                }
            }
        };

        attempt.await.map(|_| ()).map_err(Error::EngineInit)
    }

    /// Current lifecycle state. Never blocks on initialization or generation.
    pub fn status(&self) -> EngineStatus {
        match &*self.lock_state() {
            EngineState::Uninitialized => EngineStatus::Uninitialized,
            EngineState::Initializing(_) => EngineStatus::Initializing,
            EngineState::Ready(_) => EngineStatus::Ready,
        }
    }

    /// Whether generation may proceed.
    pub fn is_ready(&self) -> bool {
        self.status() == EngineStatus::Ready
    }

    /// Generate text from a prompt (convenience method).
    pub async fn generate(&self, prompt: &str, options: &SamplingConfig) -> Result<String> {
        let request = GenerationRequest::new(prompt).with_config(options.clone());
        let output = self.generate_request(request).await?;
        Ok(output.output_text)
    }

    /// Run one generation request to completion.
    ///
    /// Waits behind every request that reached the session first. Fails with
    /// [`Error::EngineNotReady`] before initialization and with
    /// [`Error::Inference`] if the session fails; partial output is discarded.
    pub async fn generate_request(&self, request: GenerationRequest) -> Result<GenerationOutput> {
        let ready = self.ready_session().ok_or(Error::EngineNotReady)?;

        let prompt_tokens = self.tokenizer.encode(&request.prompt);
        if prompt_tokens.is_empty() {
            return Err(Error::Tokenization("empty prompt".to_string()));
        }

        let output_tokens = {
            let mut context = ready.context.lock().await;
            debug!(
                "acquired inference session: {} prompt tokens, {} to generate",
                prompt_tokens.len(),
                request.sampling_config.max_tokens
            );
            self.decode_loop(&mut context, &prompt_tokens, &request.sampling_config)
                .await?
        };

        let output_text = self.tokenizer.decode(&output_tokens).trim().to_string();
        Ok(GenerationOutput {
            prompt: request.prompt,
            output_text,
            output_tokens,
            prompt_len: prompt_tokens.len(),
        })
    }

    /// Get reference to the tokenizer.
    pub fn tokenizer(&self) -> &Arc<Tokenizer> {
        &self.tokenizer
    }

    /// Get reference to the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn decode_loop(
        &self,
        context: &mut DecodeContext,
        prompt_tokens: &[TokenId],
        sampling_config: &SamplingConfig,
    ) -> Result<Vec<TokenId>> {
        let mut tokens = prompt_tokens.to_vec();
        let mut generated = Vec::new();

        for step in 0..sampling_config.max_tokens {
            let logits = self
                .run_session(context, self.window(&tokens))
                .await
                .map_err(|source| {
                    warn!("inference failed at step {step}, abandoning request: {source}");
                    Error::Inference {
                        step,
                        source: Box::new(source),
                    }
                })?;

            let next = context.sampler.sample(&logits, sampling_config)?;
            debug!("step {step}: sampled token {next}");
            tokens.push(next);
            generated.push(next);
        }

        Ok(generated)
    }

    async fn run_session(&self, context: &mut DecodeContext, ids: &[TokenId]) -> Result<Vec<f32>> {
        let inputs = SessionInputs::from([(self.config.input_name.clone(), input_ids_tensor(ids)?)]);
        let outputs = context.session.run(inputs).await?;
        last_position_logits(&outputs, &self.config.output_name)
    }

    /// The ids sent to the session: all of them, or the last `context_window`.
    fn window<'a>(&self, tokens: &'a [TokenId]) -> &'a [TokenId] {
        match self.config.context_window {
            Some(n) if n > 0 && tokens.len() > n => &tokens[tokens.len() - n..],
            _ => tokens,
        }
    }

    fn ready_session(&self) -> Option<Arc<ReadySession>> {
        match &*self.lock_state() {
            EngineState::Ready(ready) => Some(Arc::clone(ready)),
            _ => None,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The attempt lives inside the engine state it settles, so it only holds a
/// `Weak` to that state. An attempt whose engine is gone settles nothing.
async fn initialize_session(
    config: Arc<EngineConfig>,
    tokenizer: Arc<Tokenizer>,
    factory: Arc<dyn SessionFactory>,
    state: Weak<Mutex<EngineState>>,
) -> InitOutcome {
    let outcome = build_session(&config, &tokenizer, factory.as_ref())
        .await
        .map_err(Arc::new);
    if let Some(state) = state.upgrade() {
        settle(&state, &outcome);
    }
    outcome
}

async fn build_session(
    config: &EngineConfig,
    tokenizer: &Tokenizer,
    factory: &dyn SessionFactory,
) -> Result<Arc<ReadySession>> {
    tokenizer.load(&config.merges_path)?;
    let session = factory.create(&config.model_path).await?;
    Ok(Arc::new(ReadySession {
        context: AsyncMutex::new(DecodeContext {
            session,
            sampler: Sampler::from_seed(config.seed),
        }),
    }))
}

fn settle(state: &Mutex<EngineState>, outcome: &InitOutcome) {
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    *state = match outcome {
        Ok(ready) => {
            info!("generation engine ready");
            EngineState::Ready(Arc::clone(ready))
        }
        Err(error) => {
            warn!("generation engine initialization failed: {error}");
            EngineState::Uninitialized
        }
    };
}
