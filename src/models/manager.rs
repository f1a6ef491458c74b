use crate::config::schema::LifecycleConfig;
use crate::error::{BackendError, ChatError, LoadError};
use crate::models::backend::{BackendLoader, ChatRequest, ChatResponse, ModelBackend};
use crate::models::catalog::{
    FamilyClassifier, ImageBackendFamily, ModelCatalogEntry, ModelSource, ModelType, RemoteSource,
};
use crate::models::handle::ModelRuntimeHandle;
use crate::models::timer::IdleEvictionTimer;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinError;
use tokio::time::Instant;

/// Loads models on demand, keeps at most one resident and unloads it after
/// `idle_timeout` without a chat request.
///
/// Load, unload, chat and idle eviction all serialize on one lock, so
/// concurrent chat requests queue behind each other. Once a load or chat has
/// taken the lock it runs to completion on its own task, even if the caller
/// stops waiting, so an abandoned build can never overlap the next one.
/// Cloning is cheap and shares the same state.
#[derive(Clone)]
pub struct ModelLifecycleManager {
    inner: Arc<Inner>,
}

struct Inner {
    loader: Arc<dyn BackendLoader>,
    classifier: FamilyClassifier,
    context_window: u32,
    next_instance: AtomicU64,
    state: Arc<Mutex<State>>,
}

struct State {
    catalog: Vec<ModelCatalogEntry>,
    resident: Option<Resident>,
    timer: IdleEvictionTimer,
}

struct Resident {
    handle: ModelRuntimeHandle,
    backend: Arc<dyn ModelBackend>,
}

/// What to ask the loader for, decided before any blocking work
enum LoadPlan {
    Local(PathBuf),
    Text(RemoteSource),
    Image(RemoteSource, ImageBackendFamily),
}

impl State {
    fn unload(&mut self) {
        if let Some(resident) = self.resident.take() {
            tracing::info!("Unloading model: {}", resident.handle.model_id);
            drop(resident);
        }
        self.timer.cancel();
    }

    fn resident_id(&self) -> Option<&str> {
        self.resident.as_ref().map(|r| r.handle.model_id.as_str())
    }
}

impl ModelLifecycleManager {
    /// Create a manager with the default image-family classifier
    pub fn new(
        loader: Arc<dyn BackendLoader>,
        config: &LifecycleConfig,
        catalog: Vec<ModelCatalogEntry>,
    ) -> Result<Self, LoadError> {
        Self::with_classifier(loader, config, catalog, ImageBackendFamily::classify)
    }

    /// Create a manager with a custom repo-id → image family rule
    pub fn with_classifier(
        loader: Arc<dyn BackendLoader>,
        config: &LifecycleConfig,
        catalog: Vec<ModelCatalogEntry>,
        classifier: FamilyClassifier,
    ) -> Result<Self, LoadError> {
        for (i, entry) in catalog.iter().enumerate() {
            if catalog[..i].iter().any(|m| m.model_id == entry.model_id) {
                return Err(LoadError::DuplicateModel(entry.model_id.clone()));
            }
        }

        Ok(Self {
            inner: Arc::new(Inner {
                loader,
                classifier,
                context_window: config.context_window,
                next_instance: AtomicU64::new(1),
                state: Arc::new(Mutex::new(State {
                    catalog,
                    resident: None,
                    timer: IdleEvictionTimer::new(config.idle_timeout()),
                })),
            }),
        })
    }

    /// Add a model to the catalog
    ///
    /// Model ids are unique; registering an id twice is rejected.
    pub async fn register_model(&self, entry: ModelCatalogEntry) -> Result<(), LoadError> {
        let mut state = self.inner.state.lock().await;
        if state.catalog.iter().any(|m| m.model_id == entry.model_id) {
            tracing::warn!("Rejecting duplicate model id '{}'", entry.model_id);
            return Err(LoadError::DuplicateModel(entry.model_id));
        }

        tracing::debug!("Registered model '{}'", entry.model_id);
        state.catalog.push(entry);
        Ok(())
    }

    /// Remove a model from the catalog, unloading it if resident
    ///
    /// Returns whether any entry was removed.
    pub async fn unregister_model(&self, model_id: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        let before = state.catalog.len();
        state.catalog.retain(|m| m.model_id != model_id);

        if state.resident_id() == Some(model_id) {
            state.unload();
        }

        state.catalog.len() != before
    }

    /// Snapshot of the catalog in registration order
    pub async fn list_models(&self) -> Vec<ModelCatalogEntry> {
        self.inner.state.lock().await.catalog.clone()
    }

    /// Make `model_id` the resident model
    ///
    /// Reusing an already resident model does not count as usage: the idle
    /// deadline and `last_used_at` stay as they were.
    pub async fn load_model(&self, model_id: &str) -> Result<ModelRuntimeHandle, LoadError> {
        let id = model_id.to_string();
        self.run_locked(move |manager, mut state| async move {
            let (handle, _backend) = manager.ensure_loaded(&mut state, &id).await?;
            Ok::<_, LoadError>(handle)
        })
        .await
        .unwrap_or_else(|e| {
            Err(LoadError::BackendInitError {
                model_id: model_id.to_string(),
                source: BackendError::Process(format!("Load task failed: {e}")),
            })
        })
    }

    /// Release the resident model, if any
    pub async fn unload_model(&self) {
        self.inner.state.lock().await.unload();
    }

    /// Single-turn chat against `model_id`, loading it first if needed
    ///
    /// With `image`, the request carries a text part and an `image_url` part.
    pub async fn chat_completion(
        &self,
        model_id: &str,
        message: &str,
        image: Option<&str>,
    ) -> Result<String, ChatError> {
        let id = model_id.to_string();
        let request = ChatRequest::user(message, image);
        self.run_locked(move |manager, mut state| async move {
            manager.chat_locked(&mut state, &id, request).await
        })
        .await
        .unwrap_or_else(|e| {
            Err(ChatError::InferenceFailed {
                model_id: model_id.to_string(),
                source: BackendError::Process(format!("Chat task failed: {e}")),
            })
        })
    }

    /// Handle of the resident model
    pub async fn active_model(&self) -> Option<ModelRuntimeHandle> {
        let state = self.inner.state.lock().await;
        state.resident.as_ref().map(|r| r.handle.clone())
    }

    pub async fn is_loaded(&self) -> bool {
        self.inner.state.lock().await.resident.is_some()
    }

    /// When the resident model will be evicted if left unused
    pub async fn eviction_deadline(&self) -> Option<Instant> {
        self.inner.state.lock().await.timer.deadline()
    }

    /// Take the lock and run `f` on a task of its own
    ///
    /// The task owns the guard, so dropping the returned future does not cut
    /// a build or an inference short while the next caller takes the lock.
    async fn run_locked<T, F, Fut>(&self, f: F) -> Result<T, JoinError>
    where
        F: FnOnce(Self, OwnedMutexGuard<State>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(&self.inner.state).lock_owned().await;
        tokio::spawn(f(self.clone(), state)).await
    }

    async fn chat_locked(
        &self,
        state: &mut State,
        model_id: &str,
        request: ChatRequest,
    ) -> Result<String, ChatError> {
        let (_, backend) = self.ensure_loaded(state, model_id).await?;

        if let Some(resident) = state.resident.as_mut() {
            resident.handle.touch();
        }
        self.arm_timer(state);

        let result = tokio::task::spawn_blocking(move || {
            backend
                .complete(&request)
                .and_then(ChatResponse::into_first_content)
        })
        .await
        .unwrap_or_else(|e| Err(BackendError::Process(format!("Inference task failed: {e}"))));

        result.map_err(|source| {
            tracing::warn!("Chat completion on '{model_id}' failed: {source}");
            ChatError::InferenceFailed {
                model_id: model_id.to_string(),
                source,
            }
        })
    }

    async fn ensure_loaded(
        &self,
        state: &mut State,
        model_id: &str,
    ) -> Result<(ModelRuntimeHandle, Arc<dyn ModelBackend>), LoadError> {
        if let Some(resident) = state.resident.as_ref() {
            if resident.handle.model_id == model_id {
                tracing::debug!("Reusing resident model '{model_id}'");
                return Ok((resident.handle.clone(), Arc::clone(&resident.backend)));
            }
        }

        let entry = state
            .catalog
            .iter()
            .find(|m| m.model_id == model_id)
            .cloned()
            .ok_or_else(|| {
                tracing::warn!("Model with ID {model_id} not found");
                LoadError::NotFound(model_id.to_string())
            })?;

        // Never hold two backends at once
        state.unload();

        let plan = self.plan(&entry)?;
        let backend = self.construct(model_id, plan).await?;

        let instance_id = self.inner.next_instance.fetch_add(1, Ordering::Relaxed);
        let handle = ModelRuntimeHandle::new(model_id, instance_id);
        state.resident = Some(Resident {
            handle: handle.clone(),
            backend: Arc::clone(&backend),
        });
        self.arm_timer(state);

        tracing::info!(
            "Loaded model '{}' ({}, instance {instance_id})",
            entry.model_id,
            entry.display_name
        );
        Ok((handle, backend))
    }

    fn plan(&self, entry: &ModelCatalogEntry) -> Result<LoadPlan, LoadError> {
        match (&entry.source, entry.model_type) {
            (ModelSource::Local { path }, _) => Ok(LoadPlan::Local(path.clone())),
            (ModelSource::Remote(remote), ModelType::Text) => Ok(LoadPlan::Text(remote.clone())),
            (ModelSource::Remote(remote), ModelType::Image) => {
                let family = (self.inner.classifier)(&remote.repo_id).ok_or_else(|| {
                    tracing::warn!(
                        "No chat handler for image model '{}' (repo {})",
                        entry.model_id,
                        remote.repo_id
                    );
                    LoadError::UnsupportedModel {
                        model_id: entry.model_id.clone(),
                        repo_id: remote.repo_id.clone(),
                    }
                })?;
                Ok(LoadPlan::Image(remote.clone(), family))
            }
        }
    }

    async fn construct(
        &self,
        model_id: &str,
        plan: LoadPlan,
    ) -> Result<Arc<dyn ModelBackend>, LoadError> {
        let loader = Arc::clone(&self.inner.loader);
        let n_ctx = self.inner.context_window;

        let result = tokio::task::spawn_blocking(move || match plan {
            LoadPlan::Local(path) => loader.load_local(&path, n_ctx),
            LoadPlan::Text(remote) => loader.load_text(&remote, n_ctx),
            LoadPlan::Image(remote, family) => {
                let projector = family.projector_source(&remote.repo_id);
                let handler = loader.load_chat_handler(family, &projector)?;
                loader.load_image(&remote, handler, n_ctx)
            }
        })
        .await
        .unwrap_or_else(|e| Err(BackendError::Process(format!("Loader task failed: {e}"))));

        result.map_err(|source| {
            tracing::error!("Failed to load model '{model_id}': {source}");
            LoadError::BackendInitError {
                model_id: model_id.to_string(),
                source,
            }
        })
    }

    fn arm_timer(&self, state: &mut State) {
        let inner = Arc::downgrade(&self.inner);
        state
            .timer
            .arm(move |generation| async move { evict_idle(inner, generation).await });
    }
}

async fn evict_idle(inner: Weak<Inner>, generation: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };

    let mut state = inner.state.lock().await;
    if !state.timer.is_current(generation) {
        return;
    }

    if let Some(model_id) = state.resident_id() {
        tracing::info!(
            "Model '{model_id}' idle for {}s",
            state.timer.idle_timeout().as_secs()
        );
    }
    state.unload();
}

impl std::fmt::Debug for ModelLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLifecycleManager")
            .field("context_window", &self.inner.context_window)
            .finish_non_exhaustive()
    }
}
