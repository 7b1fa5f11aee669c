// 该文件是 Xinjing （心镜） 项目的一部分。
// src/task.rs - 分析任务
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

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
  input::UploadedImage,
  output::Render,
  session::{AnalysisSession, PageView, UploadOutcome},
};

#[async_trait]
pub trait Task<I, O>: Sized {
  type Error;
  async fn run_task(self, input: I, session: AnalysisSession, output: O) -> Result<(), Self::Error>;
}

/// 分析一张图像并输出页面状态
#[derive(Default, Debug)]
pub struct OneShotTask {
  save_dir: Option<PathBuf>,
}

impl OneShotTask {
  /// 置信度过阈值时把模型保存到该目录
  pub fn with_save_dir(mut self, save_dir: Option<PathBuf>) -> Self {
    self.save_dir = save_dir;
    self
  }
}

#[async_trait]
impl<I, O, RE> Task<I, O> for OneShotTask
where
  I: Iterator<Item = UploadedImage> + Send + 'static,
  O: Render<UploadedImage, PageView, Error = RE> + Send + Sync + 'static,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  async fn run_task(self, mut input: I, session: AnalysisSession, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始分析...");
    let now = Instant::now();
    let outcome = session.handle_upload(image.clone()).await?;
    let elapsed = now.elapsed();
    info!("分析完成，耗时: {:.2?}", elapsed);

    output.render_result(&image, &session.view())?;

    match outcome {
      UploadOutcome::Scored(_) | UploadOutcome::Superseded => {}
      UploadOutcome::Failed(e) => return Err(e.into()),
    }

    if let Some(dir) = &self.save_dir {
      match session.save_model(dir).await? {
        Some(path) => info!("模型已保存: {}", path.display()),
        None => info!("置信度未过阈值，没有可保存的模型"),
      }
    }

    Ok(())
  }
}

/// 对同一张图像重复分析，统计平均耗时
#[derive(Debug)]
pub struct RepeatShotTask {
  times: usize,
  warmup: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      times: 100,
      warmup: 2,
    }
  }
}

impl RepeatShotTask {
  pub fn with_times(mut self, times: usize) -> Self {
    self.times = times.max(1);
    self
  }

  pub fn with_warmup(mut self, warmup: usize) -> Self {
    self.warmup = warmup;
    self
  }
}

/// 跳过预热轮次后的平均耗时；轮次不足时对全部取平均
pub fn mean_latency(times: &[Duration], warmup: usize) -> Option<Duration> {
  let measured = if times.len() > warmup {
    &times[warmup..]
  } else {
    times
  };
  if measured.is_empty() {
    return None;
  }
  Some(measured.iter().sum::<Duration>() / measured.len() as u32)
}

#[async_trait]
impl<I, O, RE> Task<I, O> for RepeatShotTask
where
  I: Iterator<Item = UploadedImage> + Send + 'static,
  O: Render<UploadedImage, PageView, Error = RE> + Send + Sync + 'static,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  async fn run_task(self, mut input: I, session: AnalysisSession, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始分析...");

    let mut times = Vec::with_capacity(self.times);
    for i in 0..self.times {
      let now = Instant::now();
      let outcome = session.handle_upload(image.clone()).await?;
      let elapsed = now.elapsed();
      if let UploadOutcome::Failed(e) = outcome {
        return Err(e.into());
      }
      info!("({})分析完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
    }

    output.render_result(&image, &session.view())?;

    if let Some(mean) = mean_latency(&times, self.warmup) {
      warn!("平均分析时间: {:.2?}", mean);
    }

    Ok(())
  }
}
