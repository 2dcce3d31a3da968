//! Sentence-embedding model run through ONNX Runtime.
//!
//! Compiled in with the `semantic-ort` feature. [`OrtEmbedder`] loads a
//! MiniLM-style encoder plus its `tokenizer.json`, mean-pools the last
//! hidden state over the attention mask and scales the result to unit
//! length. Without the feature [`OrtEmbedder::load`] always fails, and
//! callers fall back to [`HashEmbedder`](crate::HashEmbedder).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

#[cfg(feature = "semantic-ort")]
use std::sync::{Mutex, PoisonError};

#[cfg(feature = "semantic-ort")]
use ort::{session::Session, value::Tensor};
#[cfg(feature = "semantic-ort")]
use tokenizers::Tokenizer;

use crate::embed::Embedder;

pub const MODEL_FILENAME: &str = "all-minilm-l6-v2.onnx";
pub const TOKENIZER_FILENAME: &str = "tokenizer.json";

/// Default model directory: `<cache dir>/bugsift/models`.
///
/// # Errors
///
/// Fails when the OS exposes no cache directory.
pub fn model_cache_dir() -> Result<PathBuf> {
    let mut path = dirs::cache_dir().context("unable to determine OS cache directory")?;
    path.push("bugsift");
    path.push("models");
    Ok(path)
}

/// ONNX encoder behind the [`Embedder`] seam.
pub struct OrtEmbedder {
    #[cfg(feature = "semantic-ort")]
    session: Mutex<Session>,
    #[cfg(feature = "semantic-ort")]
    tokenizer: Tokenizer,
    dims: usize,
    name: String,
}

impl OrtEmbedder {
    /// Load the model at `model` and the tokenizer at `tokenizer`. Every
    /// vector must come out with `dims` components.
    ///
    /// # Errors
    ///
    /// Fails when either file is missing or unreadable, or when the crate
    /// was built without `semantic-ort`.
    pub fn load(model: &Path, tokenizer: &Path, dims: usize) -> Result<Self> {
        for (what, path) in [("model", model), ("tokenizer", tokenizer)] {
            if !path.is_file() {
                bail!("semantic {what} not found at {}", path.display());
            }
        }
        let stem = model
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("onnx-model");
        let name = format!("ort:{stem}-{dims}");

        #[cfg(feature = "semantic-ort")]
        {
            let session = Session::builder()
                .context("failed to create ONNX Runtime session builder")?
                .commit_from_file(model)
                .with_context(|| format!("failed to load semantic model from {}", model.display()))?;
            let tokenizer = Tokenizer::from_file(tokenizer)
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("failed to load tokenizer from {}", tokenizer.display()))?;
            tracing::info!(model = %name, dims, "semantic model loaded");
            return Ok(Self {
                session: Mutex::new(session),
                tokenizer,
                dims,
                name,
            });
        }

        #[cfg(not(feature = "semantic-ort"))]
        {
            let _ = (dims, name);
            bail!("semantic runtime unavailable: compile bugsift-search with `semantic-ort`");
        }
    }

    /// Load `MODEL_FILENAME` and `TOKENIZER_FILENAME` from `dir`.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub fn load_dir(dir: &Path, dims: usize) -> Result<Self> {
        Self::load(&dir.join(MODEL_FILENAME), &dir.join(TOKENIZER_FILENAME), dims)
    }

    #[cfg(feature = "semantic-ort")]
    fn infer(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(anyhow::Error::msg)
            .context("failed to tokenize text")?;
        let widen = |values: &[u32]| values.iter().map(|&v| i64::from(v)).collect::<Vec<i64>>();
        let ids = widen(encoding.get_ids());
        let mask = widen(encoding.get_attention_mask());
        let types = widen(encoding.get_type_ids());
        let seq = i64::try_from(ids.len()).context("token sequence too long")?;

        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let mut inputs: Vec<(String, Tensor<i64>)> = Vec::with_capacity(session.inputs.len());
        for input in &session.inputs {
            let data = match input.name.as_str() {
                "input_ids" => ids.clone(),
                "attention_mask" => mask.clone(),
                "token_type_ids" => types.clone(),
                other => bail!("semantic model expects unsupported input '{other}'"),
            };
            let tensor = Tensor::from_array((vec![1_i64, seq], data))
                .context("failed to build input tensor")?;
            inputs.push((input.name.clone(), tensor));
        }

        let outputs = session.run(inputs).context("semantic model inference failed")?;
        let (_, output) = outputs
            .iter()
            .next()
            .context("semantic model produced no output")?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .context("semantic model output is not an f32 tensor")?;
        let dim = |i: usize| -> Result<usize> {
            let raw = shape.get(i).copied().context("output tensor rank too small")?;
            usize::try_from(raw).context("negative output dimension")
        };

        let mut pooled = match shape.len() {
            3 => mean_pool(data, &mask, dim(1)?, dim(2)?),
            2 => data.get(..dim(1)?).context("output shorter than its shape")?.to_vec(),
            rank => bail!("unexpected semantic output rank {rank}"),
        };
        if pooled.len() != self.dims {
            bail!(
                "semantic model produced {} dimensions, configured for {}",
                pooled.len(),
                self.dims
            );
        }
        crate::embed::normalize(&mut pooled);
        Ok(pooled)
    }
}

impl Embedder for OrtEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        #[cfg(feature = "semantic-ort")]
        {
            return self.infer(text);
        }

        #[cfg(not(feature = "semantic-ort"))]
        {
            let _ = text;
            bail!("semantic runtime unavailable: compile bugsift-search with `semantic-ort`");
        }
    }
}

/// Average the `[seq, dims]` rows of `hidden` whose mask entry is set.
/// An all-zero mask averages every row.
#[cfg_attr(not(feature = "semantic-ort"), allow(dead_code))]
fn mean_pool(hidden: &[f32], mask: &[i64], seq: usize, dims: usize) -> Vec<f32> {
    let mut pooled = vec![0.0_f32; dims];
    if dims == 0 {
        return pooled;
    }
    let all = mask.iter().take(seq).all(|&m| m == 0);
    let mut count = 0_usize;
    for (row, values) in hidden.chunks_exact(dims).take(seq).enumerate() {
        if !all && mask.get(row).copied().unwrap_or(0) == 0 {
            continue;
        }
        count += 1;
        for (acc, v) in pooled.iter_mut().zip(values) {
            *acc += v;
        }
    }
    if count > 0 {
        for v in &mut pooled {
            *v /= count as f32;
        }
    }
    pooled
}
