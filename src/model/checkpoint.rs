//! Model checkpoint loading and saving.
//!
//! Two on-disk formats are understood:
//! - PyTorch `state_dict` files (`.pt`/`.pth`) as written by the training script.
//!   Keys `layer1.0.*` and `layer2.0.*` are remapped onto `conv1` and `conv2`.
//! - Burn named MessagePack records (`.mpk`) at full precision.
//!
//! Parameter shapes are checked on the record before it is applied to the module,
//! so a checkpoint for a different topology is rejected instead of being served.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use burn::{
    module::{Module, Param},
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder, RecorderError},
    tensor::{backend::Backend, Tensor},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use tracing::{debug, info};

use super::cnn::{DigitClassifier, DigitClassifierConfig, DigitClassifierRecord};
use crate::utils::error::{panic_message, DigitError, Result};

/// On-disk checkpoint format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    /// PyTorch pickled `state_dict`
    PyTorch,
    /// Burn named MessagePack record
    Burn,
}

impl CheckpointFormat {
    /// Detect the format from the path's extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("pt") | Some("pth") => Ok(CheckpointFormat::PyTorch),
            Some("mpk") | None => Ok(CheckpointFormat::Burn),
            Some(other) => Err(DigitError::CheckpointCorrupt(
                path.to_path_buf(),
                format!("unsupported checkpoint extension '.{}'", other),
            )),
        }
    }
}

impl std::fmt::Display for CheckpointFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointFormat::PyTorch => write!(f, "PyTorch state_dict"),
            CheckpointFormat::Burn => write!(f, "Burn MessagePack"),
        }
    }
}

/// Resolve the file a recorder will actually read.
///
/// The MessagePack recorder appends `.mpk` itself, so `model` and `model.mpk`
/// name the same file.
fn resolve_path(path: &Path, format: CheckpointFormat) -> PathBuf {
    match format {
        CheckpointFormat::PyTorch => path.to_path_buf(),
        CheckpointFormat::Burn => path.with_extension("mpk"),
    }
}

/// Read a checkpoint into a record without touching any module
pub fn load_record<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<DigitClassifierRecord<B>> {
    let format = CheckpointFormat::from_path(path)?;
    let file = resolve_path(path, format);

    if !file.is_file() {
        return Err(DigitError::CheckpointNotFound(file));
    }

    debug!("Reading {} checkpoint from {:?}", format, file);

    // Some recorder paths panic on malformed input instead of returning an error.
    let loaded = catch_unwind(AssertUnwindSafe(
        || -> std::result::Result<DigitClassifierRecord<B>, RecorderError> {
            match format {
                CheckpointFormat::PyTorch => {
                    let args = LoadArgs::new(file.clone())
                        .with_key_remap("layer1\\.0\\.(.+)", "conv1.$1")
                        .with_key_remap("layer2\\.0\\.(.+)", "conv2.$1");
                    let recorder = PyTorchFileRecorder::<FullPrecisionSettings>::default();
                    Recorder::<B>::load(&recorder, args, device)
                }
                CheckpointFormat::Burn => {
                    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::default();
                    Recorder::<B>::load(&recorder, file.clone(), device)
                }
            }
        },
    ));

    match loaded {
        Ok(Ok(record)) => Ok(record),
        Ok(Err(e)) => Err(DigitError::CheckpointCorrupt(file, e.to_string())),
        Err(payload) => Err(DigitError::CheckpointCorrupt(file, panic_message(payload))),
    }
}

fn check_shape(name: &str, expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected != actual {
        return Err(DigitError::ShapeMismatch {
            name: name.to_string(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

fn param_dims<B: Backend, const D: usize>(param: &Param<Tensor<B, D>>) -> Vec<usize> {
    param.val().dims().to_vec()
}

fn bias_dims<B: Backend>(
    path: &Path,
    name: &str,
    bias: &Option<Param<Tensor<B, 1>>>,
) -> Result<Vec<usize>> {
    bias.as_ref().map(param_dims).ok_or_else(|| {
        DigitError::CheckpointCorrupt(path.to_path_buf(), format!("missing parameter '{}'", name))
    })
}

/// Check every parameter of a record against the topology in `config`
pub fn validate_record<B: Backend>(
    path: &Path,
    record: &DigitClassifierRecord<B>,
    config: &DigitClassifierConfig,
) -> Result<()> {
    let actual = vec![
        ("conv1.weight", param_dims(&record.conv1.weight)),
        ("conv1.bias", bias_dims(path, "conv1.bias", &record.conv1.bias)?),
        ("conv2.weight", param_dims(&record.conv2.weight)),
        ("conv2.bias", bias_dims(path, "conv2.bias", &record.conv2.bias)?),
        ("fc1.weight", param_dims(&record.fc1.weight)),
        ("fc1.bias", bias_dims(path, "fc1.bias", &record.fc1.bias)?),
        ("fc2.weight", param_dims(&record.fc2.weight)),
        ("fc2.bias", bias_dims(path, "fc2.bias", &record.fc2.bias)?),
    ];

    for ((name, expected), (_, actual)) in config.expected_shapes().iter().zip(actual.iter()) {
        check_shape(name, expected, actual)?;
    }

    Ok(())
}

/// Load the classifier from a checkpoint.
///
/// Any failure here is a startup error: the service must not begin serving.
pub fn load_classifier<B: Backend>(path: &Path, device: &B::Device) -> Result<DigitClassifier<B>> {
    let config = DigitClassifierConfig::new();
    let record = load_record::<B>(path, device)?;
    validate_record(path, &record, &config)?;

    let model = DigitClassifier::new(&config, device).load_record(record);
    info!(
        "Loaded digit classifier from {:?} ({} parameters)",
        path,
        model.num_params()
    );

    Ok(model)
}

/// Save the classifier as a Burn MessagePack record.
///
/// Returns the path of the written file (always with the `.mpk` extension).
pub fn save_classifier<B: Backend>(model: &DigitClassifier<B>, path: &Path) -> Result<PathBuf> {
    let file = path.with_extension("mpk");
    if let Some(parent) = file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::default();
    model
        .clone()
        .save_file(file.clone(), &recorder)
        .map_err(|e| DigitError::Internal(format!("Failed to save checkpoint: {}", e)))?;

    info!("Checkpoint saved to {:?}", file);
    Ok(file)
}
