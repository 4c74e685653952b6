//! Local sentence embeddings via Candle
use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::{api::sync::Api, Repo, RepoType};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::debug;

/// Sentence-embedding model the knowledge base was indexed with
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

const MAX_SEQUENCE_TOKENS: usize = 256;

/// BERT-family encoder with mean pooling
pub struct EmbeddingEngine {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dimension: usize,
}

impl EmbeddingEngine {
    /// Load `model_id` from the HuggingFace Hub (cached after first download)
    pub fn load(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;

        let api = Api::new().context("Failed to create HuggingFace API client")?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo.get("config.json").context("Failed to download model config")?;
        let tokenizer_path = repo.get("tokenizer.json").context("Failed to download tokenizer")?;
        let weights_path = repo
            .get("model.safetensors")
            .context("Failed to download model weights")?;

        let config_contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&config_contents).context("Failed to parse model config")?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .context("Failed to load model weights")?
        };
        let model = BertModel::load(vb, &config).context("Failed to create BERT model")?;

        debug!(model = model_id, dimension = config.hidden_size, "embedding model loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            model_id: model_id.to_string(),
            dimension: config.hidden_size,
        })
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .context("Embedding model returned no vector")
    }

    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

        let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        let batch_size = encodings.len();

        let mut ids = vec![0u32; batch_size * max_len];
        let mut mask = vec![0u32; batch_size * max_len];
        for (row, encoding) in encodings.iter().enumerate() {
            let start = row * max_len;
            let len = encoding.get_ids().len();
            ids[start..start + len].copy_from_slice(encoding.get_ids());
            mask[start..start + len].copy_from_slice(encoding.get_attention_mask());
        }

        let token_ids = Tensor::from_vec(ids, (batch_size, max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(mask, (batch_size, max_len), &self.device)?;
        let token_type_ids = token_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = mean_pool(&hidden, &attention_mask)?;

        Ok(pooled.to_vec2::<f32>()?)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Mean over the sequence axis, counting only attended tokens
fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let mask = attention_mask
        .unsqueeze(2)?
        .expand(hidden.shape())?
        .to_dtype(hidden.dtype())?;

    let summed = (hidden * &mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;

    Ok(summed.broadcast_div(&counts)?)
}
