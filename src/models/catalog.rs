use crate::error::LoadError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Kind of model a catalog entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Text,
    Image,
}

impl ModelType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            other => Err(LoadError::UnsupportedModelType(other.to_string())),
        }
    }
}

/// Hub coordinates of a remote model file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSource {
    pub repo_id: String,
    /// Exact file name or a `*` wildcard pattern such as `*text-model*`
    pub filename: String,
}

impl RemoteSource {
    #[must_use]
    pub fn new(repo_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            filename: filename.into(),
        }
    }
}

/// Where a model's weights come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Local { path: PathBuf },
    Remote(RemoteSource),
}

/// One installable model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalogEntry {
    pub model_type: ModelType,
    pub model_id: String,
    pub display_name: String,
    pub source: ModelSource,
}

impl ModelCatalogEntry {
    /// Entry backed by a file on disk
    #[must_use]
    pub fn local(
        model_type: ModelType,
        model_id: impl Into<String>,
        display_name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            model_type,
            model_id: model_id.into(),
            display_name: display_name.into(),
            source: ModelSource::Local { path: path.into() },
        }
    }

    /// Entry resolved from the Hugging Face Hub
    #[must_use]
    pub fn remote(
        model_type: ModelType,
        model_id: impl Into<String>,
        display_name: impl Into<String>,
        repo_id: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            model_type,
            model_id: model_id.into(),
            display_name: display_name.into(),
            source: ModelSource::Remote(RemoteSource::new(repo_id, filename)),
        }
    }

    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self.source, ModelSource::Remote(_))
    }
}

/// Families of multimodal models with a known chat handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageBackendFamily {
    Moondream,
    MiniCpm,
}

/// Maps a repo id to the image family that can serve it
pub type FamilyClassifier = fn(&str) -> Option<ImageBackendFamily>;

impl ImageBackendFamily {
    /// Default classifier: substring match on the repo id
    #[must_use]
    pub fn classify(repo_id: &str) -> Option<Self> {
        if repo_id.contains("moondream2") {
            Some(Self::Moondream)
        } else if repo_id.contains("MiniCPM") {
            Some(Self::MiniCpm)
        } else {
            None
        }
    }

    /// Where the vision projector for this family lives
    ///
    /// Moondream always uses the upstream projector; MiniCPM ships it next to
    /// the language weights.
    #[must_use]
    pub fn projector_source(self, model_repo: &str) -> RemoteSource {
        match self {
            Self::Moondream => RemoteSource::new("vikhyatk/moondream2", "*mmproj*"),
            Self::MiniCpm => RemoteSource::new(model_repo, "*mmproj*"),
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Moondream => "moondream",
            Self::MiniCpm => "minicpm-v",
        }
    }
}

/// Catalog shipped when the config file has no `[[models]]` tables
#[must_use]
pub fn default_catalog() -> Vec<ModelCatalogEntry> {
    vec![
        ModelCatalogEntry::remote(
            ModelType::Text,
            "llama_text",
            "Llama 3.2 1B Instruct",
            "hugging-quants/Llama-3.2-1B-Instruct-Q4_K_M-GGUF",
            "*q4_k_m.gguf",
        ),
        ModelCatalogEntry::remote(
            ModelType::Image,
            "moondream",
            "Moondream2",
            "vikhyatk/moondream2",
            "*text-model*",
        ),
        ModelCatalogEntry::remote(
            ModelType::Image,
            "minicpm",
            "MiniCPM-V 2.6",
            "openbmb/MiniCPM-V-2_6-gguf",
            "*Q4_K_M.gguf",
        ),
    ]
}
