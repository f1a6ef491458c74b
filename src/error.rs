use thiserror::Error;

/// Main error type for the assistant
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Config error: {0}\n\nTroubleshooting:\n- Check config file: ~/.config/llama-assistant/config.toml\n- Every [[models]] entry needs either model_path or both repo_id and filename\n- Run with RUST_LOG=debug for more details")]
    Config(String),

    #[error("Wake word error: {0}")]
    WakeWord(#[from] WakeWordError),

    #[error("Hotkey error: {0}")]
    Hotkey(String),

    #[error("Model load error: {0}")]
    Load(#[from] LoadError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of `ModelLifecycleManager::load_model` and catalog edits
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Model '{0}' not found in catalog\n\nTroubleshooting:\n- List known models: llama-assistant models\n- Add a [[models]] entry to the config file")]
    NotFound(String),

    #[error("Model '{0}' is already registered")]
    DuplicateModel(String),

    #[error("Unsupported model type: {0} (must be 'text' or 'image')")]
    UnsupportedModelType(String),

    #[error("Unsupported image model '{model_id}' from repo '{repo_id}'\n\nTroubleshooting:\n- Supported image families: moondream2, MiniCPM")]
    UnsupportedModel { model_id: String, repo_id: String },

    #[error("Failed to initialize backend for '{model_id}': {source}\n\nTroubleshooting:\n- Check the model path or repo coordinates in config\n- Check internet connection for first-time downloads\n- Is llama-server installed and in PATH?")]
    BackendInitError {
        model_id: String,
        #[source]
        source: BackendError,
    },
}

/// Failures of `ModelLifecycleManager::chat_completion`
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Failed to load model: {0}")]
    LoadFailed(#[from] LoadError),

    #[error("Inference failed on '{model_id}': {source}")]
    InferenceFailed {
        model_id: String,
        #[source]
        source: BackendError,
    },
}

/// Errors raised by an inference backend or its loader
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to resolve '{file}' in {repo}: {reason}")]
    Hub {
        repo: String,
        file: String,
        reason: String,
    },

    #[error("Model file not found: {0}")]
    MissingWeights(String),

    #[error("Backend process error: {0}")]
    Process(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wake word monitor errors; all of them stop the monitor
#[derive(Error, Debug)]
pub enum WakeWordError {
    #[error("Audio source error: {0}")]
    Source(String),

    #[error("Scorer error: {0}")]
    Scorer(String),

    #[error("Failed to start monitor thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AssistantError>;
