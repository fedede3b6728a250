//! Serializable snapshots of trained model state, with atomic disk
//! persistence (write temp file, then rename).

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::RankerConfig;
use crate::rnn::params::RnnParams;
use crate::rnn::ranker::ParseRanker;
use crate::rnn::RankerError;

/// Checkpoint format version for forward compatibility.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Snapshot of a ranker's trainable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankerCheckpoint {
    /// Format version.
    pub version: u32,
    /// Hyperparameters the model was built with.
    pub config: RankerConfig,
    /// All parameters, word-vector table included.
    pub params: RnnParams,
    /// Training examples accumulated when the snapshot was taken.
    pub examples_seen: u64,
}

impl ParseRanker {
    /// Create a serializable snapshot of the current state.
    pub fn snapshot(&self) -> RankerCheckpoint {
        RankerCheckpoint {
            version: CHECKPOINT_VERSION,
            config: self.config().clone(),
            params: self.params().clone(),
            examples_seen: self.examples_seen(),
        }
    }

    /// Restore parameters from a checkpoint.
    ///
    /// The checkpoint's dimensions must match this model's; gradient
    /// buffers are reset after restoration.
    pub fn restore_from(&mut self, cp: &RankerCheckpoint) -> Result<(), RankerError> {
        let dims = [
            ("checkpoint hidden dimension", self.params().hidden_dim, cp.params.hidden_dim),
            ("checkpoint vocabulary size", self.params().vocab_size, cp.params.vocab_size),
            ("checkpoint embedding dimension", self.params().middle_dim, cp.params.middle_dim),
        ];
        for (what, expected, actual) in dims {
            if expected != actual {
                return Err(RankerError::ShapeMismatch {
                    what,
                    expected,
                    actual,
                });
            }
        }

        *self.params_mut() = cp.params.clone();
        self.set_examples_seen(cp.examples_seen);
        self.reset_gradients();
        Ok(())
    }
}

/// Save a checkpoint to disk atomically (write temp file, then rename).
pub fn save_to_disk(cp: &RankerCheckpoint, path: &Path) -> io::Result<()> {
    let json = serde_json::to_vec(cp).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let tmp_path = path.with_extension("json.tmp");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a checkpoint from disk.
pub fn load_from_disk(path: &Path) -> io::Result<RankerCheckpoint> {
    let data = std::fs::read(path)?;
    serde_json::from_slice(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
