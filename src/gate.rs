// 该文件是 Xinjing （心镜） 项目的一部分。
// src/gate.rs - 置信度阈值判定
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

use serde::Serialize;

use crate::model::Score;

/// 阈值本身（55）判定为低置信度
pub const CONFIDENCE_THRESHOLD: u8 = 55;

pub fn is_high_confidence(score: Option<Score>) -> bool {
  score.is_some_and(|s| s.value() > CONFIDENCE_THRESHOLD)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
  High,
  Low,
}

impl Verdict {
  pub fn of(score: Score) -> Self {
    if is_high_confidence(Some(score)) {
      Verdict::High
    } else {
      Verdict::Low
    }
  }

  pub fn is_high(self) -> bool {
    self == Verdict::High
  }

  pub fn icon(self) -> &'static str {
    match self {
      Verdict::High => "✓",
      Verdict::Low => "✗",
    }
  }

  pub fn message(self) -> &'static str {
    match self {
      Verdict::High => "Confidence threshold met - Displaying 3D model",
      Verdict::Low => "Confidence below 55% threshold",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gate_is_strictly_above_threshold() {
    for s in 0..=Score::MAX {
      let score = Score::new(s).unwrap();
      assert_eq!(is_high_confidence(Some(score)), s > 55, "score {}", s);
      assert_eq!(Verdict::of(score).is_high(), s > 55);
    }
  }

  #[test]
  fn boundary_and_absent_scores() {
    assert!(!is_high_confidence(None));
    assert!(!is_high_confidence(Score::new(55)));
    assert!(is_high_confidence(Score::new(56)));
  }

  #[test]
  fn verdict_text() {
    let low = Verdict::of(Score::new(50).unwrap());
    assert_eq!(low.icon(), "✗");
    assert!(low.message().contains("below 55%"));

    let high = Verdict::of(Score::new(60).unwrap());
    assert_eq!(high.icon(), "✓");
    assert!(high.message().contains("Displaying 3D model"));
  }
}
