// 该文件是 Xinjing （心镜） 项目的一部分。
// src/model/simulated.rs - 模拟评分
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

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::UploadedImage,
  model::{AnalysisError, Score, Scorer, ScorerError},
  utils::query_param,
};

pub const SIMULATED_MIN: u8 = 40;
pub const SIMULATED_MAX: u8 = 94;
pub const SIMULATED_DELAY: Duration = Duration::from_millis(2500);

/// 在 [40, 94] 上均匀抽样
pub(crate) fn simulated_score<R: Rng>(rng: &mut R) -> Score {
  Score(rng.gen_range(SIMULATED_MIN..=SIMULATED_MAX))
}

/// 模拟评分：等待固定时长后给出随机置信度
pub struct SimulatedScorer {
  delay: Duration,
  rng: Mutex<StdRng>,
}

impl Default for SimulatedScorer {
  fn default() -> Self {
    Self::new(SIMULATED_DELAY)
  }
}

impl SimulatedScorer {
  pub fn new(delay: Duration) -> Self {
    Self {
      delay,
      rng: Mutex::new(StdRng::from_entropy()),
    }
  }

  /// 无延迟版本
  pub fn immediate() -> Self {
    Self::new(Duration::ZERO)
  }

  pub fn with_seed(mut self, seed: u64) -> Self {
    self.rng = Mutex::new(StdRng::seed_from_u64(seed));
    self
  }

  pub fn delay(&self) -> Duration {
    self.delay
  }

  pub fn sample(&self) -> Score {
    let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
    simulated_score(&mut *rng)
  }
}

impl FromUrlWithScheme for SimulatedScorer {
  const SCHEME: &'static str = "simulated";
}

impl FromUrl for SimulatedScorer {
  type Error = ScorerError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ScorerError::SchemeMismatch);
    }

    let delay = match query_param(url, "delay_ms") {
      Some(value) => Duration::from_millis(value.parse().map_err(|_| {
        ScorerError::InvalidParameter {
          key: "delay_ms",
          value: value.clone(),
        }
      })?),
      None => SIMULATED_DELAY,
    };

    let scorer = SimulatedScorer::new(delay);
    match query_param(url, "seed") {
      Some(value) => {
        let seed = value.parse().map_err(|_| ScorerError::InvalidParameter {
          key: "seed",
          value: value.clone(),
        })?;
        Ok(scorer.with_seed(seed))
      }
      None => Ok(scorer),
    }
  }
}

#[async_trait]
impl Scorer for SimulatedScorer {
  fn name(&self) -> &'static str {
    "simulated"
  }

  async fn analyze(&self, image: &UploadedImage) -> Result<Score, AnalysisError> {
    debug!("模拟分析 {}，等待 {:?}", image.name(), self.delay);
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }
    Ok(self.sample())
  }
}
