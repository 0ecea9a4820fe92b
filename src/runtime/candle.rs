//! Local text generation on Candle with quantized Qwen2 GGUF weights

use super::download::ModelDownloader;
use super::{
    GenerateOptions, InferenceRuntime, LoadRequest, ModelPipeline, ProgressCallback,
    RuntimeProgress,
};
use crate::device::ComputeDevice;
use crate::registry::TaskKind;
use anyhow::{Context, Result};
use async_trait::async_trait;
use candle_core::{quantized::gguf_file, Device, IndexOp, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::quantized_qwen2::ModelWeights as QuantizedQwen2;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Qwen `<|im_end|>` and `<|endoftext|>`
const EOS_TOKENS: [u32; 2] = [151645, 151643];
const SAMPLING_SEED: u64 = 42;

/// Default [`InferenceRuntime`]: hf-hub downloads plus Candle execution
pub struct CandleRuntime {
    cache_dir: Option<PathBuf>,
}

impl CandleRuntime {
    pub fn new() -> Self {
        Self { cache_dir: None }
    }

    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: Some(cache_dir.into()),
        }
    }

    fn downloader(&self) -> Result<ModelDownloader> {
        match &self.cache_dir {
            Some(dir) => ModelDownloader::with_cache_dir(dir.clone()),
            None => ModelDownloader::new(),
        }
    }

    fn create_device(device: ComputeDevice) -> Result<Device> {
        match device {
            ComputeDevice::Cuda => {
                #[cfg(feature = "cuda")]
                {
                    Device::new_cuda(0).context("Failed to create CUDA device")
                }
                #[cfg(not(feature = "cuda"))]
                {
                    warn!("CUDA requested but not compiled with cuda feature, using CPU");
                    Ok(Device::Cpu)
                }
            }
            ComputeDevice::Metal => {
                #[cfg(feature = "metal")]
                {
                    Device::new_metal(0).context("Failed to create Metal device")
                }
                #[cfg(not(feature = "metal"))]
                {
                    warn!("Metal requested but not compiled with metal feature, using CPU");
                    Ok(Device::Cpu)
                }
            }
            ComputeDevice::Cpu => Ok(Device::Cpu),
        }
    }

    fn load_gguf(path: &Path, device: &Device) -> Result<(QuantizedQwen2, Option<usize>)> {
        debug!("Loading GGUF model from: {}", path.display());

        let mut file = std::fs::File::open(path).context("Failed to open GGUF model file")?;
        let content = gguf_file::Content::read(&mut file)
            .map_err(|e| anyhow::anyhow!("Failed to read GGUF file: {}", e))?;

        let context_length = content
            .metadata
            .get("qwen2.context_length")
            .and_then(|v| v.to_u32().ok())
            .map(|v| v as usize);

        let model = QuantizedQwen2::from_gguf(content, &mut file, device)
            .context("Failed to load model weights from GGUF")?;

        Ok((model, context_length))
    }

    /// Blocking part of `load`: download, tokenizer, weights
    fn load_blocking(
        downloader: ModelDownloader,
        request: LoadRequest,
        progress: ProgressCallback,
    ) -> Result<CandlePipeline> {
        let weights = downloader.fetch_weights(&request.model_ref, request.precision, &progress)?;

        let (weights_repo, _) = super::download::split_model_ref(&request.model_ref);
        let tokenizer_repo = request.tokenizer_ref.as_deref().unwrap_or(weights_repo);
        let tokenizer_path = downloader.fetch_tokenizer(tokenizer_repo, &progress)?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        let device = Self::create_device(request.device)?;
        info!("Loading {} on {}...", request.model_ref, request.device);

        let ((model, context_length), device) = match Self::load_gguf(&weights, &device) {
            Ok(loaded) => (loaded, device),
            Err(e) if !device.is_cpu() => {
                warn!(
                    "Failed to load GGUF model on {}: {}. Falling back to CPU",
                    request.device, e
                );
                let loaded = Self::load_gguf(&weights, &Device::Cpu)
                    .context("Failed to load GGUF model on CPU fallback")?;
                (loaded, Device::Cpu)
            }
            Err(e) => return Err(e),
        };

        progress(RuntimeProgress::Ready);
        info!("Model {} loaded", request.model_ref);

        Ok(CandlePipeline {
            model: Mutex::new(model),
            tokenizer,
            device,
            context_length,
        })
    }
}

impl Default for CandleRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceRuntime for CandleRuntime {
    async fn load(
        &self,
        request: LoadRequest,
        progress: ProgressCallback,
    ) -> Result<Arc<dyn ModelPipeline>> {
        if request.task != TaskKind::TextGeneration {
            anyhow::bail!(
                "The Candle runtime does not support {} models",
                request.task
            );
        }

        let downloader = self.downloader()?;
        let pipeline = tokio::task::spawn_blocking(move || {
            Self::load_blocking(downloader, request, progress)
        })
        .await
        .context("Model load task panicked")??;

        Ok(Arc::new(pipeline))
    }

    fn name(&self) -> &str {
        "candle"
    }
}

/// A loaded quantized Qwen2 model
pub struct CandlePipeline {
    model: Mutex<QuantizedQwen2>,
    tokenizer: Tokenizer,
    device: Device,
    context_length: Option<usize>,
}

impl CandlePipeline {
    /// Wraps a raw prompt in the Qwen chat template
    fn format_prompt(prompt: &str) -> String {
        format!(
            "<|im_start|>user\n{}<|im_end|>\n<|im_start|>assistant\n",
            prompt
        )
    }

    fn logits_processor(options: &GenerateOptions) -> LogitsProcessor {
        let sampling = if !options.do_sample || options.temperature <= 0.0 {
            Sampling::ArgMax
        } else {
            Sampling::TopP {
                p: options.top_p,
                temperature: options.temperature,
            }
        };
        LogitsProcessor::from_sampling(SAMPLING_SEED, sampling)
    }
}

#[async_trait]
impl ModelPipeline for CandlePipeline {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let start = Instant::now();

        let encoding = self
            .tokenizer
            .encode(Self::format_prompt(prompt), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;
        let input_ids: Vec<u32> = encoding.get_ids().to_vec();
        let input_len = input_ids.len();
        debug!("Input tokens: {}", input_len);

        let mut model = self.model.lock().await;
        let mut logits_processor = Self::logits_processor(options);
        let mut generated: Vec<u32> = Vec::new();

        for i in 0..options.max_new_tokens {
            // Full prompt first, then one token at a time against the KV cache
            let (input, seqlen_offset) = match generated.last() {
                None => (Tensor::new(input_ids.as_slice(), &self.device)?, 0),
                Some(last) => (Tensor::new(&[*last], &self.device)?, input_len + i - 1),
            };

            let logits = model.forward(&input.unsqueeze(0)?, seqlen_offset)?;
            let logits = if logits.dims().len() == 3 {
                let seq_len = logits.dim(1)?;
                logits.i((0, seq_len - 1))?
            } else {
                logits.squeeze(0)?
            };

            let next_token = logits_processor.sample(&logits)?;
            if EOS_TOKENS.contains(&next_token) {
                break;
            }
            generated.push(next_token);
        }

        let output = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| anyhow::anyhow!("Decoding failed: {}", e))?;

        debug!(
            "Generated {} tokens in {:.2}s",
            generated.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(output)
    }

    fn context_length(&self) -> Option<usize> {
        self.context_length
    }
}

impl std::fmt::Debug for CandlePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandlePipeline")
            .field("device", &format!("{:?}", self.device))
            .field("context_length", &self.context_length)
            .finish()
    }
}
