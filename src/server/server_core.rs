//! TTS Server Core
//!
//! Shared state, router and the serve loop

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};

use crate::core::error::{InferenceStage, Result, TtsError};
use crate::engine::{IndexTts, IndexTtsConfig, InferenceMode, InferenceOutcome, TtsModel};
use crate::server::cache::OutputCache;
use crate::server::config::ServerConfig;
use crate::server::middleware::{performance_monitor, MetricsState};
use crate::server::routes;
use crate::server::types::ServerStats;
use crate::server::upload::ReferenceAudio;

/// Server state shared across handlers
pub struct ServerState {
    /// Server configuration
    pub config: ServerConfig,
    /// Loaded model; empty until startup loading succeeds
    model: RwLock<Option<Arc<dyn TtsModel>>>,
    /// Request digest -> synthesized WAV
    cache: RwLock<OutputCache>,
    /// Bounds concurrent inference calls
    inference_permits: Arc<Semaphore>,
    /// Request timing
    pub metrics: Arc<MetricsState>,
    /// Start time for uptime calculation
    pub start_time: Instant,
    inferences: AtomicU64,
    cache_hits: AtomicU64,
}

impl ServerState {
    /// Create new server state with an empty model slot
    pub fn new(config: ServerConfig) -> Self {
        let permits = config.limits.max_concurrent.max(1);
        Self {
            model: RwLock::new(None),
            cache: RwLock::new(OutputCache::new(config.cache.size_limit)),
            inference_permits: Arc::new(Semaphore::new(permits)),
            metrics: Arc::new(MetricsState::new(config.logging.access_log)),
            start_time: Instant::now(),
            inferences: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            config,
        }
    }

    /// Create state with a model already loaded
    pub async fn with_model(config: ServerConfig, model: Arc<dyn TtsModel>) -> Self {
        let state = Self::new(config);
        state.set_model(model).await;
        state
    }

    pub async fn set_model(&self, model: Arc<dyn TtsModel>) {
        *self.model.write().await = Some(model);
    }

    pub async fn model(&self) -> Option<Arc<dyn TtsModel>> {
        self.model.read().await.clone()
    }

    /// Loaded model, or `ModelNotLoaded`
    pub async fn require_model(&self) -> Result<Arc<dyn TtsModel>> {
        self.model().await.ok_or(TtsError::ModelNotLoaded)
    }

    pub async fn is_model_loaded(&self) -> bool {
        self.model.read().await.is_some()
    }

    /// Cached output for `key` with its bytes.
    ///
    /// An entry whose file can no longer be read (e.g. deleted by eviction
    /// after the lookup) is dropped and reported as a miss.
    pub async fn cached_audio(&self, key: &str) -> Option<(PathBuf, Vec<u8>)> {
        if !self.config.cache.enabled {
            return None;
        }

        let cached = self.cache.read().await.get(key).cloned()?;
        match tokio::fs::read(&cached).await {
            Ok(audio) => {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit: {}", cached.display());
                Some((cached, audio))
            }
            Err(e) => {
                debug!("Cached output {} unreadable, dropping entry: {}", cached.display(), e);
                let mut cache = self.cache.write().await;
                // Only if no newer output replaced it meanwhile
                if cache.get(key) == Some(&cached) {
                    cache.remove(key);
                }
                None
            }
        }
    }

    /// Remember `path` as the output for `key`.
    ///
    /// Outputs the cache stops referencing are deleted when
    /// `cache.delete_evicted` is set.
    pub async fn store_output(&self, key: String, path: PathBuf) {
        if !self.config.cache.enabled {
            return;
        }

        let evicted = self.cache.write().await.insert(key, path);
        if evicted.is_empty() || !self.config.cache.delete_evicted {
            return;
        }

        tokio::spawn(async move {
            for path in evicted {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    debug!("Failed to remove released output {}: {}", path.display(), e);
                }
            }
        });
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    /// Fresh output path: `output_<unix secs>_<8 hex>.wav`
    pub fn next_output_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("output_{}_{}.wav", chrono::Utc::now().timestamp(), &id[..8]);
        self.config.output_dir.join(name)
    }

    /// Run the model on a blocking thread, holding an inference permit.
    ///
    /// The permit moves into the blocking task, so it is held until the
    /// model returns even if this future is dropped first.
    pub async fn run_inference(
        &self,
        model: Arc<dyn TtsModel>,
        mode: InferenceMode,
        reference: &Path,
        text: &str,
        output: &Path,
    ) -> Result<InferenceOutcome> {
        let permit = self
            .inference_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| TtsError::Internal {
                message: format!("Inference semaphore closed: {}", e),
                location: Some("ServerState::run_inference".to_string()),
            })?;

        let reference = reference.to_path_buf();
        let text = text.to_string();
        let output = output.to_path_buf();

        let outcome = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            model.synthesize(mode, &reference, &text, &output)
        })
        .await
        .map_err(|e| {
            TtsError::inference(
                InferenceStage::ModelInvocation,
                format!("Inference task failed: {}", e),
            )
        })??;

        self.inferences.fetch_add(1, Ordering::Relaxed);
        info!(
            "Synthesized {} in {:.2}s ({} mode)",
            outcome.output_path.display(),
            outcome.elapsed.as_secs_f64(),
            mode.as_str()
        );
        Ok(outcome)
    }

    /// Stage the reference, run the model, read the WAV back and cache it.
    ///
    /// A failed call leaves no output file behind; the staged reference is
    /// removed on every path.
    pub async fn synthesize_uncached(
        &self,
        key: String,
        model: Arc<dyn TtsModel>,
        mode: InferenceMode,
        text: &str,
        reference: &[u8],
        suffix: &str,
    ) -> Result<(PathBuf, Vec<u8>)> {
        let staged = ReferenceAudio::stage(reference, suffix)?;
        let output = self.next_output_path();

        let outcome = match self.run_inference(model, mode, staged.path(), text, &output).await {
            Ok(outcome) => outcome,
            Err(e) => {
                discard_output(&output).await;
                return Err(e);
            }
        };
        drop(staged);

        let path = outcome.output_path;
        let audio = match tokio::fs::read(&path).await {
            Ok(audio) => audio,
            Err(e) => {
                discard_output(&path).await;
                return Err(TtsError::Audio {
                    message: format!("Failed to read synthesized audio: {}", e),
                    path: Some(path),
                });
            }
        };

        self.store_output(key, path.clone()).await;
        Ok((path, audio))
    }

    /// Get server uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get server statistics
    pub async fn get_stats(&self) -> ServerStats {
        let metrics = self.metrics.get_metrics().await;

        ServerStats {
            total_requests: metrics.total_requests,
            successful_requests: metrics.successful_requests,
            failed_requests: metrics.failed_requests,
            avg_processing_time_ms: metrics.avg_processing_time(),
            inferences: self.inferences.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_entries: self.cache_len().await,
            model_loaded: self.is_model_loaded().await,
            uptime: self.uptime().as_secs(),
        }
    }
}

/// Best-effort removal of a partial output
async fn discard_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}

/// Create the router with all routes
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id = axum::http::HeaderName::from_static("x-request-id");

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/stats", get(routes::stats::get_stats))
        .route("/synthesize", post(routes::synthesis::synthesize))
        .route("/synthesize_base64", post(routes::synthesis::synthesize_base64))
        .layer(DefaultBodyLimit::max(state.config.limits.max_body_bytes))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            performance_monitor,
        ))
        .with_state(state)
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(cors)
}

/// Load IndexTTS on a blocking thread
pub async fn load_model(config: IndexTtsConfig) -> Result<Arc<dyn TtsModel>> {
    info!("Loading IndexTTS model from {}", config.model_dir.display());
    let model = tokio::task::spawn_blocking(move || IndexTts::load(config))
        .await
        .map_err(|e| TtsError::Internal {
            message: format!("Model loading task failed: {}", e),
            location: Some("load_model".to_string()),
        })??;
    Ok(Arc::new(model))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

/// TTS Server
pub struct TtsServer {
    config: ServerConfig,
    model: Option<Arc<dyn TtsModel>>,
}

impl TtsServer {
    /// Create new TTS server; the model is loaded in `run`
    pub fn new(config: ServerConfig) -> Self {
        Self { config, model: None }
    }

    /// Serve an already constructed model instead of loading IndexTTS
    pub fn with_model(config: ServerConfig, model: Arc<dyn TtsModel>) -> Self {
        Self {
            config,
            model: Some(model),
        }
    }

    /// Run the server until Ctrl-C or SIGTERM
    pub async fn run(self) -> anyhow::Result<()> {
        let config = self.config;

        tokio::fs::create_dir_all(&config.output_dir)
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create output directory {}: {}",
                    config.output_dir.display(),
                    e
                )
            })?;

        let state = Arc::new(ServerState::new(config.clone()));

        let model = match self.model {
            Some(model) => Ok(model),
            None => load_model(config.model.clone()).await,
        };
        match model {
            Ok(model) => {
                info!(
                    "Model loaded: {} (fused activation: {})",
                    model.name(),
                    model.fused_kernel()
                );
                state.set_model(model).await;
            }
            Err(e) if config.require_model => {
                return Err(anyhow::anyhow!("Model loading failed: {}", e));
            }
            Err(e) => {
                error!("Model loading failed: {}", e);
                warn!("Serving without a model; synthesis requests will get 503");
            }
        }

        let router = create_router(state.clone());

        let addr = config.bind_addr();
        info!("Starting IndexTTS API on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        state.clear_cache().await;
        info!("Server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Sleeps while recording how many calls overlap
    struct SlowModel {
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SlowModel {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }

        fn run(&self, output: &Path) -> Result<InferenceOutcome> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            std::fs::write(output, b"RIFF")?;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(InferenceOutcome {
                output_path: output.to_path_buf(),
                elapsed: self.delay,
                sample_rate: None,
                audio_duration: None,
            })
        }
    }

    impl TtsModel for SlowModel {
        fn name(&self) -> &str {
            "slow"
        }

        fn infer(&self, _reference: &Path, _text: &str, output: &Path) -> Result<InferenceOutcome> {
            self.run(output)
        }

        fn infer_fast(&self, _reference: &Path, _text: &str, output: &Path) -> Result<InferenceOutcome> {
            self.run(output)
        }
    }

    fn test_config(dir: &Path) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.output_dir = dir.to_path_buf();
        config.cache.size_limit = 2;
        config
    }

    #[test]
    fn test_output_path_format() {
        let state = ServerState::new(ServerConfig::default());
        let path = state.next_output_path();
        assert!(path.starts_with("outputs"));

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("output_"));
        assert!(name.ends_with(".wav"));

        let stem = name.trim_end_matches(".wav");
        let parts: Vec<&str> = stem.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_empty_state() {
        let state = ServerState::new(ServerConfig::default());
        assert!(!state.is_model_loaded().await);
        assert!(state.model().await.is_none());

        let stats = state.get_stats().await;
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.cache_entries, 0);
        assert!(!stats.model_loaded);
    }

    #[tokio::test]
    async fn test_cache_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = ServerState::new(test_config(dir.path()));

        let path = dir.path().join("a.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        state.store_output("a".into(), path.clone()).await;
        assert_eq!(state.cached_audio("a").await, Some((path.clone(), b"RIFF".to_vec())));

        std::fs::remove_file(&path).unwrap();
        assert!(state.cached_audio("a").await.is_none());
        assert_eq!(state.cache_len().await, 0);
        assert_eq!(state.get_stats().await.cache_hits, 1);
    }

    #[tokio::test]
    async fn test_replaced_output_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let state = ServerState::new(test_config(dir.path()));

        let first = dir.path().join("first.wav");
        let second = dir.path().join("second.wav");
        std::fs::write(&first, b"RIFF").unwrap();
        std::fs::write(&second, b"RIFF").unwrap();
        state.store_output("a".into(), first.clone()).await;
        state.store_output("a".into(), second.clone()).await;

        for _ in 0..50 {
            if !first.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!first.exists());
        assert_eq!(state.cached_audio("a").await.map(|(p, _)| p), Some(second));
    }

    #[tokio::test]
    async fn test_cancelled_inference_keeps_permit() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.limits.max_concurrent = 1;
        let state = ServerState::new(config);
        let model = Arc::new(SlowModel::new(Duration::from_millis(300)));
        let reference = dir.path().join("ref.wav");
        std::fs::write(&reference, b"RIFF").unwrap();

        let first = tokio::time::timeout(
            Duration::from_millis(50),
            state.run_inference(model.clone(), InferenceMode::Fast, &reference, "one", &dir.path().join("1.wav")),
        )
        .await;
        assert!(first.is_err(), "first call should still be running");

        state
            .run_inference(model.clone(), InferenceMode::Fast, &reference, "two", &dir.path().join("2.wav"))
            .await
            .unwrap();

        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        assert_eq!(model.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_synthesize_uncached_stores_and_reads() {
        let dir = tempfile::tempdir().unwrap();
        let state = ServerState::new(test_config(dir.path()));
        let model = Arc::new(SlowModel::new(Duration::ZERO));

        let (path, audio) = state
            .synthesize_uncached("k".into(), model, InferenceMode::Standard, "hi", b"RIFF", ".wav")
            .await
            .unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(audio, b"RIFF");
        assert_eq!(state.cache_len().await, 1);
    }

    #[tokio::test]
    async fn test_require_model() {
        let state = ServerState::new(ServerConfig::default());
        assert!(matches!(state.require_model().await, Err(TtsError::ModelNotLoaded)));

        state.set_model(Arc::new(SlowModel::new(Duration::ZERO))).await;
        assert_eq!(state.require_model().await.unwrap().name(), "slow");
    }

    #[tokio::test]
    async fn test_evicted_outputs_are_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let state = ServerState::new(test_config(dir.path()));

        let paths: Vec<PathBuf> = (0..3).map(|i| dir.path().join(format!("{}.wav", i))).collect();
        for (i, path) in paths.iter().enumerate() {
            std::fs::write(path, b"RIFF").unwrap();
            state.store_output(format!("k{}", i), path.clone()).await;
        }

        // Third insert trims the oldest entry
        assert_eq!(state.cache_len().await, 2);
        for _ in 0..50 {
            if !paths[0].exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!paths[0].exists());
        assert!(paths[2].exists());
    }

    #[tokio::test]
    async fn test_disabled_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.cache.enabled = false;
        let state = ServerState::new(config);

        let path = dir.path().join("a.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        state.store_output("a".into(), path).await;
        assert!(state.cached_audio("a").await.is_none());
    }
}
