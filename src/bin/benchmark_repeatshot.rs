// 该文件是 Xinjing （心镜） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 评分器重复分析基准
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
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use xinjing::{
  FromUrl,
  asset::AssetSource,
  input::ImageFileInput,
  model::ScorerWrapper,
  output::OutputWrapper,
  session::AnalysisSession,
  settings::Settings,
  task::{RepeatShotTask, Task},
  utils::init_tracing,
};

/// Xinjing 评分器基准测试
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 评分器
  #[arg(long, env = "XINJING_SCORER", value_name = "SCORER")]
  pub scorer: Option<Url>,
  /// 模型压缩包地址
  #[arg(long, env = "XINJING_ASSET", value_name = "ASSET")]
  pub asset: Option<Url>,
  /// 输出路径
  #[arg(long, env = "XINJING_OUTPUT", value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 重复次数
  #[arg(long, default_value = "100", value_name = "COUNT")]
  pub times: usize,
  /// 不计入统计的预热次数
  #[arg(long, default_value = "2", value_name = "COUNT")]
  pub warmup: usize,
  /// TOML 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  init_tracing();

  let args = Args::parse();
  let settings = Settings::load(args.config.as_deref())?.with_overrides(
    args.scorer,
    args.asset,
    args.output,
  );

  info!("评分器: {}", settings.scorer);
  info!("输入来源: {}", args.input);
  info!("重复次数: {} (预热 {})", args.times, args.warmup);

  let input = ImageFileInput::from_url(&args.input)?;
  let scorer = ScorerWrapper::from_url(&settings.scorer)?;
  let asset_source = AssetSource::from_url(&settings.asset)?;
  let output = OutputWrapper::from_url(&settings.output)?;

  let (session, _toasts) = AnalysisSession::new(Arc::new(scorer), asset_source);
  RepeatShotTask::default()
    .with_times(args.times)
    .with_warmup(args.warmup)
    .run_task(input, session, output)
    .await?;

  Ok(())
}
