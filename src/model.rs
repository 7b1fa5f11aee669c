// 该文件是 Xinjing （心镜） 项目的一部分。
// src/model.rs - 评分模型
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

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::UploadedImage};

/// 置信度百分比，取值范围 [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Score(u8);

impl Score {
  pub const MAX: u8 = 100;

  pub fn new(value: u8) -> Option<Self> {
    (value <= Self::MAX).then_some(Score(value))
  }

  /// 从百分比浮点数构造，四舍五入；非有限值或越界返回 None
  pub fn from_percentage(value: f64) -> Option<Self> {
    if !value.is_finite() || !(0.0..=Self::MAX as f64).contains(&value) {
      return None;
    }
    Some(Score(value.round() as u8))
  }

  /// 四舍五入并截断到 [lower, upper]
  pub(crate) fn clamped(value: f64, lower: u8, upper: u8) -> Self {
    let value = if value.is_finite() { value } else { lower as f64 };
    Score(value.clamp(lower as f64, upper as f64).round() as u8)
  }

  pub fn value(self) -> u8 {
    self.0
  }
}

impl fmt::Display for Score {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}%", self.0)
  }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
  #[error("图像解码错误: {0}")]
  Decode(#[from] image::ImageError),
  #[error("分类器错误: {0}")]
  Classifier(#[from] ClassifierError),
  #[error("网络错误: {0}")]
  Network(#[from] reqwest::Error),
  #[error("远端推理服务返回错误 {status}: {message}")]
  Remote { status: u16, message: String },
  #[error("远端响应格式错误: {0}")]
  Malformed(String),
  #[error("推理任务异常终止: {0}")]
  Join(#[from] tokio::task::JoinError),
}

/// 评分策略：对一张图像给出心脏相似度置信度
#[async_trait]
pub trait Scorer: Send + Sync {
  fn name(&self) -> &'static str;

  async fn analyze(&self, image: &UploadedImage) -> Result<Score, AnalysisError>;
}

#[async_trait]
impl<S: Scorer + ?Sized> Scorer for Arc<S> {
  fn name(&self) -> &'static str {
    (**self).name()
  }

  async fn analyze(&self, image: &UploadedImage) -> Result<Score, AnalysisError> {
    (**self).analyze(image).await
  }
}

#[derive(Error, Debug)]
pub enum ScorerError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("参数 {key} 无效: {value}")]
  InvalidParameter { key: &'static str, value: String },
  #[error("HTTP 客户端创建失败: {0}")]
  Client(#[from] reqwest::Error),
}

mod local;
pub use self::local::{
  Classifier, ClassifierError, ClassifierLoader, HEART_VOCABULARY, LOCAL_MAX, LOCAL_MIN,
  LocalModelScorer, Prediction, blend_confidence, heart_relevance,
};

mod remote;
pub use self::remote::{AnalyzeErrorBody, AnalyzeRequest, AnalyzeResponse, RemoteScorer};

mod simulated;
pub use self::simulated::{SIMULATED_DELAY, SIMULATED_MAX, SIMULATED_MIN, SimulatedScorer};

#[cfg(feature = "local_model")]
mod vit;
#[cfg(feature = "local_model")]
pub use self::vit::{DEFAULT_MODEL_ID, Device, HubModelLoader, ModelSource, VitClassifier};

/// 按 URL 方案选择的评分策略
pub enum ScorerWrapper {
  Simulated(SimulatedScorer),
  #[cfg(feature = "local_model")]
  Local(LocalModelScorer<HubModelLoader>),
  Remote(RemoteScorer),
}

impl FromUrl for ScorerWrapper {
  type Error = ScorerError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SimulatedScorer::SCHEME => Ok(ScorerWrapper::Simulated(SimulatedScorer::from_url(url)?)),
      #[cfg(feature = "local_model")]
      HubModelLoader::SCHEME => {
        let loader = HubModelLoader::from_url(url)?;
        Ok(ScorerWrapper::Local(LocalModelScorer::new(loader)))
      }
      "http" | "https" => Ok(ScorerWrapper::Remote(RemoteScorer::from_url(url)?)),
      _ => Err(ScorerError::SchemeMismatch),
    }
  }
}

#[async_trait]
impl Scorer for ScorerWrapper {
  fn name(&self) -> &'static str {
    match self {
      ScorerWrapper::Simulated(scorer) => scorer.name(),
      #[cfg(feature = "local_model")]
      ScorerWrapper::Local(scorer) => scorer.name(),
      ScorerWrapper::Remote(scorer) => scorer.name(),
    }
  }

  async fn analyze(&self, image: &UploadedImage) -> Result<Score, AnalysisError> {
    match self {
      ScorerWrapper::Simulated(scorer) => scorer.analyze(image).await,
      #[cfg(feature = "local_model")]
      ScorerWrapper::Local(scorer) => scorer.analyze(image).await,
      ScorerWrapper::Remote(scorer) => scorer.analyze(image).await,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn score_rejects_out_of_range() {
    assert_eq!(Score::new(100).map(Score::value), Some(100));
    assert!(Score::new(101).is_none());
    assert_eq!(Score::from_percentage(55.5).map(Score::value), Some(56));
    assert_eq!(Score::from_percentage(0.2).map(Score::value), Some(0));
    assert!(Score::from_percentage(-1.0).is_none());
    assert!(Score::from_percentage(100.4).is_none());
    assert!(Score::from_percentage(f64::NAN).is_none());
  }

  #[test]
  fn clamped_score_stays_in_bounds() {
    assert_eq!(Score::clamped(12.0, 40, 95).value(), 40);
    assert_eq!(Score::clamped(99.9, 40, 95).value(), 95);
    assert_eq!(Score::clamped(71.4, 40, 95).value(), 71);
    assert_eq!(Score::clamped(f64::INFINITY, 40, 95).value(), 40);
  }

  #[test]
  fn selects_scorer_by_scheme() {
    let simulated = ScorerWrapper::from_url(&Url::parse("simulated://?delay_ms=0").unwrap()).unwrap();
    assert_eq!(simulated.name(), "simulated");

    let remote = ScorerWrapper::from_url(&Url::parse("https://example.com/analyze").unwrap()).unwrap();
    assert_eq!(remote.name(), "remote");

    assert!(matches!(
      ScorerWrapper::from_url(&Url::parse("ftp://example.com/").unwrap()),
      Err(ScorerError::SchemeMismatch)
    ));
  }

  #[cfg(feature = "local_model")]
  #[test]
  fn local_scheme_builds_lazy_scorer() {
    let local = ScorerWrapper::from_url(
      &Url::parse("local://Xenova/vit-base-patch16-224?device=cpu").unwrap(),
    )
    .unwrap();
    assert_eq!(local.name(), "local-model");
    match local {
      ScorerWrapper::Local(scorer) => assert!(!scorer.is_loaded()),
      _ => panic!("应当选择本地模型"),
    }
  }

  #[tokio::test]
  async fn arc_scorer_delegates() {
    let scorer: Arc<dyn Scorer> = Arc::new(SimulatedScorer::immediate().with_seed(3));
    let image = UploadedImage::new("a.png", "image/png", vec![0u8; 4]);
    let score = scorer.analyze(&image).await.unwrap();
    assert!((SIMULATED_MIN..=SIMULATED_MAX).contains(&score.value()));
  }
}
