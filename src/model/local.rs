// 该文件是 Xinjing （心镜） 项目的一部分。
// src/model/local.rs - 本地视觉模型评分
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

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use image::DynamicImage;
use rand::{Rng, SeedableRng, rngs::StdRng};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{
  handle::ObjectUrlRegistry,
  input::UploadedImage,
  model::{AnalysisError, Score, Scorer, simulated::simulated_score},
};

/// 与心脏/解剖相关的标签词汇，按小写子串匹配
pub const HEART_VOCABULARY: [&str; 10] = [
  "heart",
  "cardiac",
  "organ",
  "medical",
  "anatomy",
  "thorax",
  "chest",
  "cardiovascular",
  "ventricle",
  "atrium",
];

pub const LOCAL_MIN: u8 = 40;
pub const LOCAL_MAX: u8 = 95;
const JITTER_SPAN: f64 = 20.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
  pub label: String,
  pub score: f32,
}

impl Prediction {
  pub fn new(label: impl Into<String>, score: f32) -> Self {
    Self {
      label: label.into(),
      score,
    }
  }
}

#[derive(Error, Debug)]
pub enum ClassifierError {
  #[error("模型加载错误: {0}")]
  Load(String),
  #[error("推理错误: {0}")]
  Inference(String),
  #[error("图像解码错误: {0}")]
  Decode(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

/// 图像分类器，返回标签与分数
pub trait Classifier: Send + Sync + 'static {
  fn classify(&self, image: &DynamicImage) -> Result<Vec<Prediction>, ClassifierError>;
}

/// 分类器的构造过程，由 [`LocalModelScorer`] 在首次使用时调用一次
#[async_trait]
pub trait ClassifierLoader: Send + Sync {
  type Classifier: Classifier;

  async fn load(&self) -> Result<Self::Classifier, ClassifierError>;
}

/// 匹配词汇表的标签中的最高分；没有任何匹配时返回 None
pub fn heart_relevance(predictions: &[Prediction]) -> Option<f32> {
  predictions
    .iter()
    .filter(|p| {
      let label = p.label.to_lowercase();
      HEART_VOCABULARY.iter().any(|term| label.contains(term))
    })
    .map(|p| p.score)
    .fold(None, |best, score| match best {
      Some(b) if b >= score => Some(b),
      _ => Some(score),
    })
}

/// 相关度换算为百分比，叠加抖动后截断到 [40, 95]
pub fn blend_confidence(relevance: f32, jitter: f64) -> Score {
  Score::clamped(relevance as f64 * 100.0 + jitter, LOCAL_MIN, LOCAL_MAX)
}

/// 本地模型评分。分类器在第一次分析时加载，此后复用，不会重新加载。
pub struct LocalModelScorer<L: ClassifierLoader> {
  loader: L,
  classifier: OnceCell<Arc<L::Classifier>>,
  handles: ObjectUrlRegistry,
  rng: Mutex<StdRng>,
}

impl<L: ClassifierLoader> LocalModelScorer<L> {
  pub fn new(loader: L) -> Self {
    Self {
      loader,
      classifier: OnceCell::new(),
      handles: ObjectUrlRegistry::new(),
      rng: Mutex::new(StdRng::from_entropy()),
    }
  }

  pub fn with_handles(mut self, handles: ObjectUrlRegistry) -> Self {
    self.handles = handles;
    self
  }

  pub fn with_seed(mut self, seed: u64) -> Self {
    self.rng = Mutex::new(StdRng::seed_from_u64(seed));
    self
  }

  pub fn is_loaded(&self) -> bool {
    self.classifier.initialized()
  }

  async fn classifier(&self) -> Result<Arc<L::Classifier>, ClassifierError> {
    self
      .classifier
      .get_or_try_init(|| async {
        info!("正在加载视觉模型...");
        let classifier = self.loader.load().await?;
        info!("视觉模型加载完成");
        Ok::<_, ClassifierError>(Arc::new(classifier))
      })
      .await
      .cloned()
  }

  async fn relevance(&self, image: &UploadedImage) -> Result<Option<f32>, AnalysisError> {
    let classifier = self.classifier().await?;

    // 推理期间持有图像句柄，结束即释放
    let handle = self.handles.create(image.mime(), image.shared_data());
    debug!("分类图像 {} ({})", image.name(), handle);

    let data = image.shared_data();
    let predictions = tokio::task::spawn_blocking(move || {
      let decoded = image::load_from_memory(&data)?;
      classifier.classify(&decoded)
    })
    .await??;
    drop(handle);

    debug!("分类结果: {:?}", predictions);
    Ok(heart_relevance(&predictions))
  }

  fn jitter(&self) -> f64 {
    let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
    rng.gen_range(0.0..JITTER_SPAN)
  }

  fn fallback(&self) -> Score {
    let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
    simulated_score(&mut *rng)
  }
}

#[async_trait]
impl<L: ClassifierLoader> Scorer for LocalModelScorer<L> {
  fn name(&self) -> &'static str {
    "local-model"
  }

  async fn analyze(&self, image: &UploadedImage) -> Result<Score, AnalysisError> {
    match self.relevance(image).await {
      Ok(Some(relevance)) => {
        let score = blend_confidence(relevance, self.jitter());
        info!("相关度 {:.3}，置信度 {}", relevance, score);
        Ok(score)
      }
      Ok(None) => {
        warn!("没有与心脏相关的标签，使用模拟评分");
        Ok(self.fallback())
      }
      Err(e) => {
        warn!("本地模型分析失败，使用模拟评分: {}", e);
        Ok(self.fallback())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{SIMULATED_MAX, SIMULATED_MIN};
  use std::io::Cursor;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct FixedClassifier(Vec<Prediction>);

  impl Classifier for FixedClassifier {
    fn classify(&self, _image: &DynamicImage) -> Result<Vec<Prediction>, ClassifierError> {
      Ok(self.0.clone())
    }
  }

  struct CountingLoader {
    loads: Arc<AtomicUsize>,
    fail_first: bool,
    predictions: Vec<Prediction>,
  }

  #[async_trait]
  impl ClassifierLoader for CountingLoader {
    type Classifier = FixedClassifier;

    async fn load(&self) -> Result<FixedClassifier, ClassifierError> {
      let n = self.loads.fetch_add(1, Ordering::SeqCst);
      if self.fail_first && n == 0 {
        return Err(ClassifierError::Load("hub unreachable".into()));
      }
      Ok(FixedClassifier(self.predictions.clone()))
    }
  }

  fn loader(predictions: Vec<Prediction>) -> (CountingLoader, Arc<AtomicUsize>) {
    let loads = Arc::new(AtomicUsize::new(0));
    let loader = CountingLoader {
      loads: loads.clone(),
      fail_first: false,
      predictions,
    };
    (loader, loads)
  }

  fn png() -> UploadedImage {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::new_rgb8(8, 8)
      .write_to(&mut buffer, image::ImageFormat::Png)
      .unwrap();
    UploadedImage::new("scan.png", "image/png", buffer.into_inner())
  }

  #[test]
  fn relevance_matches_vocabulary_case_insensitively() {
    let predictions = vec![
      Prediction::new("tabby, tabby cat", 0.9),
      Prediction::new("Human HEART model", 0.4),
      Prediction::new("chest, thorax", 0.6),
    ];
    assert_eq!(heart_relevance(&predictions), Some(0.6));
    assert_eq!(heart_relevance(&[Prediction::new("banana", 0.99)]), None);
    assert_eq!(heart_relevance(&[]), None);
  }

  #[test]
  fn blended_confidence_is_clamped() {
    assert_eq!(blend_confidence(0.0, 0.0).value(), LOCAL_MIN);
    assert_eq!(blend_confidence(0.99, 19.9).value(), LOCAL_MAX);
    assert_eq!(blend_confidence(0.5, 10.2).value(), 60);
  }

  #[tokio::test]
  async fn loads_classifier_once() {
    let (loader, loads) = loader(vec![Prediction::new("cardiac muscle", 0.7)]);
    let scorer = LocalModelScorer::new(loader).with_seed(1);
    assert!(!scorer.is_loaded());

    for _ in 0..3 {
      let score = scorer.analyze(&png()).await.unwrap();
      assert!((70..=LOCAL_MAX).contains(&score.value()));
    }
    assert!(scorer.is_loaded());
    assert_eq!(loads.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn load_failure_falls_back_and_retries() {
    let loads = Arc::new(AtomicUsize::new(0));
    let loader = CountingLoader {
      loads: loads.clone(),
      fail_first: true,
      predictions: vec![Prediction::new("organ", 0.5)],
    };
    let scorer = LocalModelScorer::new(loader);

    let score = scorer.analyze(&png()).await.unwrap();
    assert!((SIMULATED_MIN..=SIMULATED_MAX).contains(&score.value()));
    assert!(!scorer.is_loaded());

    scorer.analyze(&png()).await.unwrap();
    assert!(scorer.is_loaded());
    assert_eq!(loads.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn unmatched_labels_and_bad_images_fall_back() {
    let (loader, _) = loader(vec![Prediction::new("golden retriever", 0.95)]);
    let scorer = LocalModelScorer::new(loader);

    for _ in 0..50 {
      let score = scorer.analyze(&png()).await.unwrap();
      assert!((SIMULATED_MIN..=SIMULATED_MAX).contains(&score.value()));
    }

    let broken = UploadedImage::new("broken.png", "image/png", vec![0u8; 16]);
    let score = scorer.analyze(&broken).await.unwrap();
    assert!((LOCAL_MIN..=LOCAL_MAX).contains(&score.value()));
  }

  #[tokio::test]
  async fn releases_image_handle_after_inference() {
    let handles = ObjectUrlRegistry::new();
    let (loader, _) = loader(vec![Prediction::new("heart", 0.8)]);
    let scorer = LocalModelScorer::new(loader).with_handles(handles.clone());

    scorer.analyze(&png()).await.unwrap();
    assert_eq!(handles.live_count(), 0);
  }
}
