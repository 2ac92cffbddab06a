//! Persist and restore a trained classifier as a single directory bundle.
//!
//! A bundle holds `manifest.json` (format version plus the classifier
//! configuration, labels included) next to `model.mpk.gz` with the weights.
//! Bundles are written to a `.partial` sibling and swapped into place, so a
//! reader never sees a half-written checkpoint.

use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};

use super::{ClassifierConfig, ConfigError, Model};

/// The bundle layout version written by [`save`]
pub const FORMAT_VERSION: u32 = 1;

/// Weights are stored at full precision so a restored model predicts exactly
/// what the saved one did
pub type CheckpointRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

static MANIFEST_FILE: &str = "manifest.json";
static MODEL_FILE: &str = "model";

#[derive(Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    classifier: ClassifierConfig,
}

/// Save a model and its configuration to `path`, replacing any previous bundle
pub fn save<B: Backend>(
    path: &Path,
    config: &ClassifierConfig,
    model: &Model<B>,
) -> Result<(), CheckpointError> {
    let staging = sibling(path, "partial");
    let previous = sibling(path, "previous");

    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|e| CheckpointError::io(&staging, e))?;
    }

    fs::create_dir_all(&staging).map_err(|e| CheckpointError::io(&staging, e))?;

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        classifier: config.clone(),
    };

    let manifest_path = staging.join(MANIFEST_FILE);
    fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
        .map_err(|e| CheckpointError::io(&manifest_path, e))?;

    CheckpointRecorder::new()
        .record(model.clone().into_record(), staging.join(MODEL_FILE))
        .map_err(|e| CheckpointError::Record(e.to_string()))?;

    // Without a bundle at `path`, a live `.previous` stays until staging takes its place
    if path.exists() {
        if previous.exists() {
            fs::remove_dir_all(&previous).map_err(|e| CheckpointError::io(&previous, e))?;
        }

        fs::rename(path, &previous).map_err(|e| CheckpointError::io(path, e))?;
    }

    fs::rename(&staging, path).map_err(|e| CheckpointError::io(path, e))?;

    if previous.exists() {
        if let Err(err) = fs::remove_dir_all(&previous) {
            log::warn!(
                "Unable to remove the previous checkpoint at {}: {}",
                previous.display(),
                err
            );
        }
    }

    log::info!("Saved checkpoint to {}", path.display());

    Ok(())
}

/// Restore a model saved with [`save`].
///
/// Returns `Ok(None)` when nothing has been saved at `path`. The stored
/// embedding dimension must equal `embedding_dim`.
pub fn restore<B: Backend>(
    path: &Path,
    embedding_dim: usize,
    device: &B::Device,
) -> Result<Option<(ClassifierConfig, Model<B>)>, CheckpointError> {
    let Some(bundle) = locate(path) else {
        return Ok(None);
    };

    let manifest_path = bundle.join(MANIFEST_FILE);
    let json =
        fs::read_to_string(&manifest_path).map_err(|e| CheckpointError::io(&manifest_path, e))?;

    let manifest: Manifest = serde_json::from_str(&json)?;

    if manifest.format_version != FORMAT_VERSION {
        return Err(CheckpointError::UnsupportedVersion(manifest.format_version));
    }

    let config = manifest.classifier;
    config.validate()?;

    if config.embedding_dim != embedding_dim {
        return Err(CheckpointError::Incompatible {
            expected: embedding_dim,
            found: config.embedding_dim,
        });
    }

    let record = CheckpointRecorder::new()
        .load(bundle.join(MODEL_FILE), device)
        .map_err(|e| CheckpointError::Record(e.to_string()))?;

    let model = config.init::<B>(device).load_record(record);

    log::info!(
        "Restored checkpoint from {} ({} classes)",
        bundle.display(),
        config.n_classes()
    );

    Ok(Some((config, model)))
}

/// Find a complete bundle at `path`, falling back to the previous bundle when
/// a save was interrupted between swapping the old bundle out and the new one in
fn locate(path: &Path) -> Option<PathBuf> {
    if path.join(MANIFEST_FILE).exists() {
        return Some(path.to_path_buf());
    }

    let previous = sibling(path, "previous");

    if !path.exists() && previous.join(MANIFEST_FILE).exists() {
        log::warn!(
            "Using the previous checkpoint at {}",
            previous.display()
        );

        return Some(previous);
    }

    None
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);

    PathBuf::from(name)
}

/// Checkpoint Error
#[derive(thiserror::Error, Debug)]
pub enum CheckpointError {
    /// A file in the bundle could not be read or written
    #[error("checkpoint I/O error at {path}: {source}")]
    Io {
        /// The file or directory involved
        path: PathBuf,

        /// The underlying error
        source: io::Error,
    },

    /// The manifest is not valid JSON for this layout
    #[error("invalid checkpoint manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// The bundle was written by an incompatible version
    #[error("unsupported checkpoint format version {0}")]
    UnsupportedVersion(u32),

    /// The stored configuration is out of range
    #[error("invalid stored configuration: {0}")]
    Config(#[from] ConfigError),

    /// The weights could not be recorded or loaded
    #[error("unable to record model weights: {0}")]
    Record(String),

    /// The checkpoint was trained on embeddings of another dimension
    #[error("checkpoint expects {found}-dimensional embeddings, but {expected} were provided")]
    Incompatible {
        /// The dimension of the current embeddings
        expected: usize,

        /// The dimension stored in the checkpoint
        found: usize,
    },
}

impl CheckpointError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use burn::{backend::NdArray, tensor::Tensor};
    use pretty_assertions::assert_eq;

    use crate::utils::tensors::to_vec;

    use super::*;

    type TestBackend = NdArray;

    fn temp_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "burn-textcnn-checkpoint-{}-{}",
            name,
            std::process::id()
        ));

        let _ = fs::remove_dir_all(&path);
        let _ = fs::remove_dir_all(sibling(&path, "previous"));

        path
    }

    fn config() -> ClassifierConfig {
        let labels: BTreeSet<String> = ["no", "yes"].iter().map(|s| s.to_string()).collect();

        ClassifierConfig::new()
            .with_embedding_dim(3)
            .with_max_seq_length(4)
            .with_feature_maps(2)
            .with_kernel_sizes(vec![1, 2])
            .with_labels(&labels)
    }

    #[test]
    fn test_missing_checkpoint_is_none() {
        let device = Default::default();
        let path = temp_path("missing");

        let restored = restore::<TestBackend>(&path, 3, &device).unwrap();

        assert!(restored.is_none());
    }

    #[test]
    fn test_save_then_restore_gives_identical_outputs() {
        let device = Default::default();
        let path = temp_path("round-trip");
        let config = config();

        let model: Model<TestBackend> = config.init(&device);
        save(&path, &config, &model).unwrap();

        let (restored_config, restored) = restore::<TestBackend>(&path, 3, &device)
            .unwrap()
            .unwrap();

        assert_eq!(restored_config.id2label, config.id2label);
        assert!(!sibling(&path, "partial").exists());

        let input = Tensor::<TestBackend, 3>::ones([2, 4, 3], &device);
        assert_eq!(
            to_vec(model.forward(input.clone())),
            to_vec(restored.forward(input))
        );

        fs::remove_dir_all(&path).unwrap();
    }

    #[test]
    fn test_save_replaces_an_existing_bundle() {
        let device = Default::default();
        let path = temp_path("replace");
        let config = config();

        let model: Model<TestBackend> = config.init(&device);
        save(&path, &config, &model).unwrap();
        save(&path, &config, &model).unwrap();

        assert!(path.join(MANIFEST_FILE).exists());
        assert!(!sibling(&path, "previous").exists());

        fs::remove_dir_all(&path).unwrap();
    }

    #[test]
    fn test_save_after_an_interrupted_swap_keeps_a_restorable_bundle() {
        let device = Default::default();
        let path = temp_path("interrupted");
        let previous = sibling(&path, "previous");
        let config = config();

        let model: Model<TestBackend> = config.init(&device);
        save(&path, &config, &model).unwrap();

        // A swap that stopped after moving the live bundle aside
        fs::rename(&path, &previous).unwrap();
        assert!(restore::<TestBackend>(&path, 3, &device).unwrap().is_some());

        save(&path, &config, &model).unwrap();

        assert!(path.join(MANIFEST_FILE).exists());
        assert!(!previous.exists());
        assert!(!sibling(&path, "partial").exists());
        assert!(restore::<TestBackend>(&path, 3, &device).unwrap().is_some());

        fs::remove_dir_all(&path).unwrap();
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let device = Default::default();
        let path = temp_path("mismatch");
        let config = config();

        let model: Model<TestBackend> = config.init(&device);
        save(&path, &config, &model).unwrap();

        let result = restore::<TestBackend>(&path, 5, &device);

        assert!(matches!(
            result,
            Err(CheckpointError::Incompatible {
                expected: 5,
                found: 3
            })
        ));

        fs::remove_dir_all(&path).unwrap();
    }

    #[test]
    fn test_corrupt_manifest_is_an_error() {
        let device = Default::default();
        let path = temp_path("corrupt");

        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(MANIFEST_FILE), "{ not json").unwrap();

        let result = restore::<TestBackend>(&path, 3, &device);

        assert!(matches!(result, Err(CheckpointError::Manifest(_))));

        fs::remove_dir_all(&path).unwrap();
    }

    #[test]
    fn test_unsupported_version_is_an_error() {
        let device = Default::default();
        let path = temp_path("version");

        let manifest = Manifest {
            format_version: FORMAT_VERSION + 1,
            classifier: config(),
        };

        fs::create_dir_all(&path).unwrap();
        fs::write(
            path.join(MANIFEST_FILE),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();

        let result = restore::<TestBackend>(&path, 3, &device);

        assert!(matches!(result, Err(CheckpointError::UnsupportedVersion(2))));

        fs::remove_dir_all(&path).unwrap();
    }
}
