// 该文件是 Huojing （火警） 项目的一部分。
// src/main.rs - 命令行入口
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

mod args;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use huojing::{
  FromUrl,
  account::CredentialStore,
  alert::{AlertDispatcher, AlertMessage, Mailer, SmtpMailer, UnconfiguredMailer, open_alarm},
  config::HuojingConfig,
  detector::FireDetector,
  input::{InputSourceType, SourceLocator},
  output::{OutputWrapper, draw::Draw},
  task::{Session, StopSignal},
};

use crate::args::{Args, Command, RunArgs, UsersCommand};

const ABOUT: &str = "\
Huojing 火情检测

基于 YOLOv5 自定义训练模型的火情检测程序。

  huojing image   检测单张图片
  huojing video   检测视频文件
  huojing webcam  使用摄像头实时检测
  huojing users   用户管理

检测到火情时立即播放报警音，并向值班邮箱发送告警邮件；
同一冷却时间内（默认 3 分钟）只发送一封邮件。";

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  let command = match args.command {
    Command::About => {
      println!("{}", ABOUT);
      return Ok(());
    }
    command => command,
  };

  let config = HuojingConfig::load(args.config.as_deref()).context("配置加载失败")?;
  let mut store = CredentialStore::open(&config.database.path).context("无法打开账号数据库")?;

  let bootstrap =
    matches!(command, Command::Users(UsersCommand::Add { .. })) && store.count_accounts()? == 0;
  if bootstrap {
    info!("数据库中还没有用户，允许不登录创建第一个账号");
  } else {
    login(&store, args.username.as_deref(), args.password.as_deref())?;
  }

  match command {
    Command::About => Ok(()),
    Command::Image(run) => detect(&config, run, InputSourceType::Image, 0),
    Command::Video(run) => detect(&config, run, InputSourceType::Video, 0),
    Command::Webcam { run, frames } => detect(&config, run, InputSourceType::Camera, frames),
    Command::Users(command) => manage_users(&mut store, command),
  }
}

fn login(store: &CredentialStore, username: Option<&str>, password: Option<&str>) -> Result<()> {
  let (Some(username), Some(password)) = (username, password) else {
    bail!("请使用 --username 与 --password（或 HUOJING_USERNAME / HUOJING_PASSWORD）登录");
  };

  match store.authenticate(username, password)? {
    Some(account) => {
      info!("Logged in as {}", account.username);
      Ok(())
    }
    None => bail!("Incorrect Username/Password"),
  }
}

fn default_source(config: &HuojingConfig, kind: InputSourceType) -> SourceLocator {
  match kind {
    InputSourceType::Image => SourceLocator::Image(config.demo.image.clone()),
    InputSourceType::Video => SourceLocator::Video(config.demo.video.clone()),
    InputSourceType::Camera => SourceLocator::Camera(config.demo.camera),
  }
}

fn resolve_source(config: &HuojingConfig, source: Option<&Url>, kind: InputSourceType) -> Result<SourceLocator> {
  let Some(url) = source else {
    let locator = default_source(config, kind);
    info!("未指定输入，使用演示素材: {}", locator);
    return Ok(locator);
  };

  let locator = SourceLocator::from_url(url).with_context(|| format!("无效的输入: {}", url))?;
  if locator.source_type() != kind {
    bail!("输入 {} 不是 {} 类型", url, kind);
  }
  Ok(locator)
}

fn build_mailer(config: &HuojingConfig) -> Box<dyn Mailer> {
  if !config.smtp.is_complete() {
    warn!("SMTP 未完整配置，告警邮件将不会发送");
    return Box::new(UnconfiguredMailer);
  }
  match SmtpMailer::new(&config.smtp) {
    Ok(mailer) => Box::new(mailer),
    Err(e) => {
      warn!("SMTP 初始化失败，告警邮件将不会发送: {}", e);
      Box::new(UnconfiguredMailer)
    }
  }
}

fn build_message(config: &HuojingConfig) -> AlertMessage {
  AlertMessage::from_settings(&config.smtp).unwrap_or_else(|e| {
    warn!("告警邮件内容不完整: {}", e);
    AlertMessage {
      from: config.smtp.from.clone().unwrap_or_default(),
      to: config.smtp.to.clone().unwrap_or_default(),
      subject: config.smtp.subject.clone(),
      body: config.smtp.body.clone(),
    }
  })
}

fn detect(config: &HuojingConfig, run: RunArgs, kind: InputSourceType, frames: u64) -> Result<()> {
  let locator = resolve_source(config, run.source.as_ref(), kind)?;

  let draw = match &config.model.font {
    Some(font) => Draw::with_font_file(font).context("字体加载失败")?,
    None => Draw::default(),
  };
  info!("正在加载模型: {}", config.model.path.display());
  let detector = FireDetector::load(&config.model, draw).context("模型加载失败")?;

  let output = match &run.output {
    Some(url) => OutputWrapper::from_url(url).with_context(|| format!("无效的输出: {}", url))?,
    None => OutputWrapper::default(),
  };

  let dispatcher = AlertDispatcher::new(
    build_mailer(config),
    open_alarm(&config.alert.sound),
    build_message(config),
    config.alert.cooldown,
  );

  let stop = StopSignal::new();
  if kind == InputSourceType::Camera {
    stop
      .install_ctrlc_handler()
      .context("Error setting Ctrl-C handler")?;
  }

  let mut input = locator.open().with_context(|| format!("无法打开输入: {}", locator))?;
  let mut session = Session::new(&detector, &dispatcher, &output)
    .with_stop_signal(stop)
    .with_frame_limit(Some(frames));
  let report = session.run(&mut input)?;

  println!(
    "{}: {} frames, Number of fire detections: {}, alerts sent: {}",
    report.state, report.frames, report.detections, report.alerts_sent
  );
  Ok(())
}

fn manage_users(store: &mut CredentialStore, command: UsersCommand) -> Result<()> {
  match command {
    UsersCommand::Add {
      name,
      email,
      new_password,
    } => {
      let account = store.create_account(&name, &new_password, &email)?;
      println!("User {} added successfully!", account.username);
    }
    UsersCommand::List => {
      let accounts = store.list_accounts()?;
      println!("{:<24} {}", "Username", "Email");
      for account in accounts {
        println!("{:<24} {}", account.username, account.email);
      }
    }
    UsersCommand::Delete { name } => {
      if store.delete_account(&name)? {
        println!("User {} deleted successfully!", name);
      } else {
        println!("User {} does not exist.", name);
      }
    }
  }
  Ok(())
}
