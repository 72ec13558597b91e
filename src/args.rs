// 该文件是 Huojing （火警） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::{Parser, Subcommand};
use url::Url;

/// Huojing 火情检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 配置文件路径（TOML）
  #[arg(long, value_name = "FILE", env = "HUOJING_CONFIG", global = true)]
  pub config: Option<PathBuf>,

  /// 登录用户名
  #[arg(long, short = 'u', env = "HUOJING_USERNAME", global = true)]
  pub username: Option<String>,

  /// 登录密码
  #[arg(long, short = 'p', env = "HUOJING_PASSWORD", hide_env_values = true, global = true)]
  pub password: Option<String>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 关于本程序
  About,
  /// 检测单张图片
  Image(RunArgs),
  /// 检测视频文件
  Video(RunArgs),
  /// 使用摄像头实时检测，Ctrl-C 结束
  Webcam {
    #[command(flatten)]
    run: RunArgs,
    /// 处理指定帧数后停止（0 表示不限制）
    #[arg(long, value_name = "COUNT", default_value_t = 0)]
    frames: u64,
  },
  /// 用户管理
  #[command(subcommand)]
  Users(UsersCommand),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
  /// 输入来源，如 image:///tmp/fire.png、video:///tmp/fire.gif、camera://0；
  /// 省略时使用配置中的演示素材
  #[arg(long, value_name = "SOURCE")]
  pub source: Option<Url>,

  /// 输出，如 image:///tmp/out.png、folder:///tmp/records?always&record
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
}

#[derive(Subcommand, Debug)]
pub enum UsersCommand {
  /// 添加用户
  Add {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long, env = "HUOJING_NEW_PASSWORD", hide_env_values = true)]
    new_password: String,
  },
  /// 列出所有用户
  List,
  /// 删除用户
  Delete {
    #[arg(long)]
    name: String,
  },
}
