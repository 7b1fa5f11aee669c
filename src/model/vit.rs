// 该文件是 Xinjing （心镜） 项目的一部分。
// src/model/vit.rs - ViT 图像分类模型
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! # ViT 分类模块
//!
//! 使用 tract 在 CPU 上运行 ONNX 格式的 ViT 分类模型。
//!
//! 模型可以来自模型仓库，也可以来自本地目录：
//!
//! - `local://Xenova/vit-base-patch16-224`：首次使用时从仓库下载
//!   `onnx/model.onnx` 与 `config.json` 到缓存目录
//! - `local:///opt/models/vit`：直接读取目录下的同名文件
//!
//! 查询参数：
//!
//! - `device=cpu|gpu`：执行设备，tract 仅支持 CPU，选择 GPU 时回退到 CPU
//! - `cache=/path`：缓存目录，默认 `~/.cache/xinjing/models`
//! - `hub=https://mirror`：模型仓库地址，默认 `https://huggingface.co`
//!
//! 下载先写入 `<文件>.part`，完成后再改名，中断的下载不会被当作缓存。

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use tracing::{debug, info, warn};
use tract_onnx::prelude::*;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNchwTensor,
  model::{Classifier, ClassifierError, ClassifierLoader, Prediction, ScorerError},
  utils::query_param,
};

pub const DEFAULT_MODEL_ID: &str = "Xenova/vit-base-patch16-224";

const HUB_BASE_URL: &str = "https://huggingface.co";
const MODEL_FILE: &str = "onnx/model.onnx";
const CONFIG_FILE: &str = "config.json";
const VIT_INPUT_SIZE: u32 = 224;
const TOP_K: usize = 5;
const USER_AGENT: &str = concat!("xinjing/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

type VitPlan = TypedRunnableModel<TypedModel>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
  #[default]
  Cpu,
  Gpu,
}

impl FromStr for Device {
  type Err = ScorerError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "cpu" => Ok(Device::Cpu),
      "gpu" | "webgpu" => Ok(Device::Gpu),
      _ => Err(ScorerError::InvalidParameter {
        key: "device",
        value: s.to_string(),
      }),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
  Hub(String),
  Directory(PathBuf),
}

/// 按模型来源下载并构造 [`VitClassifier`]
pub struct HubModelLoader {
  source: ModelSource,
  hub: String,
  cache_dir: PathBuf,
  device: Device,
  client: reqwest::Client,
}

impl FromUrlWithScheme for HubModelLoader {
  const SCHEME: &'static str = "local";
}

impl FromUrl for HubModelLoader {
  type Error = ScorerError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ScorerError::SchemeMismatch);
    }

    let source = match url.host_str() {
      Some(owner) if !owner.is_empty() => {
        ModelSource::Hub(format!("{}{}", owner, url.path().trim_end_matches('/')))
      }
      _ if url.path().is_empty() || url.path() == "/" => {
        ModelSource::Hub(DEFAULT_MODEL_ID.to_string())
      }
      _ => ModelSource::Directory(PathBuf::from(url.path())),
    };

    let device = match query_param(url, "device") {
      Some(value) => value.parse()?,
      None => Device::default(),
    };

    let cache_dir = query_param(url, "cache")
      .map(PathBuf::from)
      .unwrap_or_else(default_cache_dir);

    let hub = query_param(url, "hub")
      .map(|hub| hub.trim_end_matches('/').to_string())
      .unwrap_or_else(|| HUB_BASE_URL.to_string());

    let client = reqwest::Client::builder()
      .user_agent(USER_AGENT)
      .connect_timeout(CONNECT_TIMEOUT)
      .timeout(DOWNLOAD_TIMEOUT)
      .build()?;

    Ok(HubModelLoader {
      source,
      hub,
      cache_dir,
      device,
      client,
    })
  }
}

fn default_cache_dir() -> PathBuf {
  dirs::cache_dir()
    .unwrap_or_else(std::env::temp_dir)
    .join("xinjing")
    .join("models")
}

impl HubModelLoader {
  pub fn source(&self) -> &ModelSource {
    &self.source
  }

  pub fn device(&self) -> Device {
    self.device
  }

  async fn ensure_file(&self, file: &str) -> Result<PathBuf, ClassifierError> {
    let model_id = match &self.source {
      ModelSource::Directory(dir) => return Ok(dir.join(file)),
      ModelSource::Hub(model_id) => model_id,
    };

    let path = self.cache_dir.join(model_id).join(file);
    if tokio::fs::try_exists(&path).await? {
      debug!("使用缓存文件: {}", path.display());
      return Ok(path);
    }

    let url = format!("{}/{}/resolve/main/{}", self.hub, model_id, file);
    info!("下载模型文件: {}", url);
    let response = self
      .client
      .get(&url)
      .send()
      .await
      .map_err(|e| ClassifierError::Load(e.to_string()))?;
    if !response.status().is_success() {
      return Err(ClassifierError::Load(format!(
        "下载 {} 失败: HTTP {}",
        url,
        response.status()
      )));
    }
    let data = response
      .bytes()
      .await
      .map_err(|e| ClassifierError::Load(e.to_string()))?;
    debug!(
      "模型文件大小: {:.2} MB",
      data.len() as f64 / (1024.0 * 1024.0)
    );

    write_cache_file(&path, &data).await?;
    Ok(path)
  }
}

fn partial_path(path: &Path) -> PathBuf {
  let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(".part");
  path.with_file_name(name)
}

/// 写入 `.part` 后改名为最终文件名
async fn write_cache_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  let partial = partial_path(path);
  tokio::fs::write(&partial, data).await?;
  tokio::fs::rename(&partial, path).await
}

#[async_trait]
impl ClassifierLoader for HubModelLoader {
  type Classifier = VitClassifier;

  async fn load(&self) -> Result<VitClassifier, ClassifierError> {
    if self.device == Device::Gpu {
      warn!("当前推理后端仅支持 CPU，GPU 设置被忽略");
    }

    let model_path = self.ensure_file(MODEL_FILE).await?;
    let config_path = self.ensure_file(CONFIG_FILE).await?;

    tokio::task::spawn_blocking(move || VitClassifier::from_files(&model_path, &config_path))
      .await
      .map_err(|e| ClassifierError::Load(e.to_string()))?
  }
}

/// ViT 分类器：224x224 输入，输出 ImageNet 标签
pub struct VitClassifier {
  plan: VitPlan,
  labels: Vec<String>,
}

impl VitClassifier {
  pub fn from_files(model_path: &Path, config_path: &Path) -> Result<Self, ClassifierError> {
    info!("加载模型文件: {}", model_path.display());
    let plan = build_plan(model_path).map_err(|e| ClassifierError::Load(e.to_string()))?;
    let labels = read_labels(config_path)?;
    debug!("标签数量: {}", labels.len());
    Ok(VitClassifier { plan, labels })
  }

  pub fn labels(&self) -> &[String] {
    &self.labels
  }

  fn logits(&self, image: &DynamicImage) -> TractResult<Vec<f32>> {
    let tensor = RgbNchwTensor::<VIT_INPUT_SIZE, VIT_INPUT_SIZE>::from(image);
    let [n, c, h, w] = tensor.shape();
    let input: Tensor = tract_ndarray::Array4::from_shape_vec((n, c, h, w), tensor.into_vec())?.into();
    let outputs = self.plan.run(tvec!(input.into()))?;
    let logits = outputs[0].to_array_view::<f32>()?;
    Ok(logits.iter().copied().collect())
  }
}

fn build_plan(model_path: &Path) -> TractResult<VitPlan> {
  let size = VIT_INPUT_SIZE as usize;
  tract_onnx::onnx()
    .model_for_path(model_path)?
    .with_input_fact(0, f32::fact([1, 3, size, size]).into())?
    .into_optimized()?
    .into_runnable()
}

fn read_labels(config_path: &Path) -> Result<Vec<String>, ClassifierError> {
  let text = std::fs::read_to_string(config_path)?;
  let config: serde_json::Value =
    serde_json::from_str(&text).map_err(|e| ClassifierError::Load(e.to_string()))?;
  let id2label = config
    .get("id2label")
    .and_then(|v| v.as_object())
    .ok_or_else(|| ClassifierError::Load("config.json 缺少 id2label".to_string()))?;

  let mut labels = vec![String::new(); id2label.len()];
  for (id, label) in id2label {
    let index: usize = id
      .parse()
      .map_err(|_| ClassifierError::Load(format!("无效的标签编号: {}", id)))?;
    if let (Some(slot), Some(label)) = (labels.get_mut(index), label.as_str()) {
      *slot = label.to_string();
    }
  }
  Ok(labels)
}

/// softmax 后取前 k 个
fn top_k(logits: &[f32], labels: &[String], k: usize) -> Vec<Prediction> {
  let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let exp: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
  let sum: f32 = exp.iter().sum();

  let mut ranked: Vec<(usize, f32)> = exp.iter().map(|e| e / sum).enumerate().collect();
  ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
  ranked
    .into_iter()
    .take(k)
    .map(|(index, score)| {
      let label = labels
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("LABEL_{}", index));
      Prediction { label, score }
    })
    .collect()
}

impl Classifier for VitClassifier {
  fn classify(&self, image: &DynamicImage) -> Result<Vec<Prediction>, ClassifierError> {
    let logits = self
      .logits(image)
      .map_err(|e| ClassifierError::Inference(e.to_string()))?;
    Ok(top_k(&logits, &self.labels, TOP_K))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_hub_and_directory_sources() {
    let hub = HubModelLoader::from_url(&Url::parse("local://Xenova/vit-base-patch16-224").unwrap()).unwrap();
    assert_eq!(hub.source(), &ModelSource::Hub(DEFAULT_MODEL_ID.to_string()));
    assert_eq!(hub.device(), Device::Cpu);

    let default = HubModelLoader::from_url(&Url::parse("local://").unwrap()).unwrap();
    assert_eq!(default.source(), &ModelSource::Hub(DEFAULT_MODEL_ID.to_string()));

    let dir = HubModelLoader::from_url(&Url::parse("local:///opt/models/vit?device=gpu").unwrap()).unwrap();
    assert_eq!(dir.source(), &ModelSource::Directory(PathBuf::from("/opt/models/vit")));
    assert_eq!(dir.device(), Device::Gpu);

    assert!(matches!(
      HubModelLoader::from_url(&Url::parse("local://Xenova/vit?device=tpu").unwrap()),
      Err(ScorerError::InvalidParameter { key: "device", .. })
    ));
  }

  #[test]
  fn hub_defaults_and_overrides() {
    let default = HubModelLoader::from_url(&Url::parse("local://Xenova/vit").unwrap()).unwrap();
    assert_eq!(default.hub, HUB_BASE_URL);

    let mirror =
      HubModelLoader::from_url(&Url::parse("local://Xenova/vit?hub=http://127.0.0.1:8080/").unwrap()).unwrap();
    assert_eq!(mirror.hub, "http://127.0.0.1:8080");
  }

  #[tokio::test]
  async fn cache_write_replaces_stale_partial() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Xenova/vit").join(CONFIG_FILE);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(partial_path(&path), b"trunc").unwrap();

    write_cache_file(&path, b"{\"id2label\": {}}").await.unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"{\"id2label\": {}}");
    assert!(!partial_path(&path).exists());
    assert_eq!(
      partial_path(&path).file_name().unwrap(),
      "config.json.part"
    );
  }

  #[cfg(feature = "remote_endpoint")]
  #[tokio::test]
  async fn downloads_once_and_never_caches_failures() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{Router, http::StatusCode, routing::get};

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new()
      .route(
        "/Org/vit/resolve/main/config.json",
        get(move || {
          let counter = counter.clone();
          async move {
            counter.fetch_add(1, Ordering::SeqCst);
            r#"{"id2label": {"0": "heart"}}"#
          }
        }),
      )
      .route(
        "/Org/vit/resolve/main/onnx/model.onnx",
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
      );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let cache = tempfile::tempdir().unwrap();
    let url = format!(
      "local://Org/vit?hub=http://{}&cache={}",
      addr,
      cache.path().display()
    );
    let loader = HubModelLoader::from_url(&Url::parse(&url).unwrap()).unwrap();

    let config = loader.ensure_file(CONFIG_FILE).await.unwrap();
    assert_eq!(config, cache.path().join("Org/vit").join(CONFIG_FILE));
    assert_eq!(read_labels(&config).unwrap(), vec!["heart".to_string()]);
    loader.ensure_file(CONFIG_FILE).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let model = cache.path().join("Org/vit").join(MODEL_FILE);
    assert!(matches!(
      loader.ensure_file(MODEL_FILE).await,
      Err(ClassifierError::Load(_))
    ));
    assert!(!model.exists());
    assert!(!partial_path(&model).exists());
  }

  #[test]
  fn top_k_orders_by_probability() {
    let labels: Vec<String> = ["cat", "heart", "dog"].iter().map(|s| s.to_string()).collect();
    let predictions = top_k(&[0.1, 3.0, 1.0], &labels, 2);

    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0].label, "heart");
    assert_eq!(predictions[1].label, "dog");
    assert!(predictions[0].score > predictions[1].score);
    let total: f32 = top_k(&[0.1, 3.0, 1.0], &labels, 3).iter().map(|p| p.score).sum();
    assert!((total - 1.0).abs() < 1e-5);
  }

  #[test]
  fn reads_id2label_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE);
    std::fs::write(&path, r#"{"id2label": {"1": "chest", "0": "tench, Tinca tinca"}}"#).unwrap();

    let labels = read_labels(&path).unwrap();
    assert_eq!(labels, vec!["tench, Tinca tinca".to_string(), "chest".to_string()]);
  }
}
