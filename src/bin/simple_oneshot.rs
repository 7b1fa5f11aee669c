// 该文件是 Xinjing （心镜） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像分析
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
  task::{OneShotTask, Task},
  utils::init_tracing,
};

/// Xinjing 单张图像分析
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像，如 image:///tmp/photo.png
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 评分器: simulated://、local://<模型>、http(s)://<服务地址>
  #[arg(long, env = "XINJING_SCORER", value_name = "SCORER")]
  pub scorer: Option<Url>,
  /// 模型压缩包地址
  #[arg(long, env = "XINJING_ASSET", value_name = "ASSET")]
  pub asset: Option<Url>,
  /// 输出: console:// 或 json:///path/report.json
  #[arg(long, env = "XINJING_OUTPUT", value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 置信度过阈值时保存模型的目录
  #[arg(long, value_name = "DIR")]
  pub save_dir: Option<PathBuf>,
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
  let save_dir = args.save_dir.or(settings.save_dir.clone());

  info!("评分器: {}", settings.scorer);
  info!("模型资源: {}", settings.asset);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", settings.output);

  let input = ImageFileInput::from_url(&args.input)?;
  let scorer = ScorerWrapper::from_url(&settings.scorer)?;
  let asset_source = AssetSource::from_url(&settings.asset)?;
  let output = OutputWrapper::from_url(&settings.output)?;

  let (session, _toasts) = AnalysisSession::new(Arc::new(scorer), asset_source);
  OneShotTask::default()
    .with_save_dir(save_dir)
    .run_task(input, session, output)
    .await?;

  Ok(())
}
