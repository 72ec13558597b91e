// 该文件是 Huojing （火警） 项目的一部分。
// src/alert/email.rs - SMTP 告警邮件
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

use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;
use tracing::{debug, info};

use crate::alert::{AlertMessage, Mailer};
use crate::config::SmtpSettings;

#[derive(Error, Debug)]
pub enum EmailDeliveryError {
  #[error("邮件发送未配置（需要 smtp.username、password、from、to）")]
  NotConfigured,
  #[error("邮件地址无效: {0}")]
  Address(#[from] lettre::address::AddressError),
  #[error("邮件构建失败: {0}")]
  Build(#[from] lettre::error::Error),
  #[error("SMTP 错误: {0}")]
  Transport(#[from] lettre::transport::smtp::Error),
}

/// 通过 STARTTLS 提交邮件的发件器
pub struct SmtpMailer {
  transport: SmtpTransport,
}

impl SmtpMailer {
  pub fn new(settings: &SmtpSettings) -> Result<Self, EmailDeliveryError> {
    let (Some(username), Some(password)) = (&settings.username, &settings.password) else {
      return Err(EmailDeliveryError::NotConfigured);
    };

    info!("SMTP 服务器: {}:{}", settings.host, settings.port);
    let transport = SmtpTransport::starttls_relay(&settings.host)?
      .port(settings.port)
      .credentials(Credentials::new(username.clone(), password.clone()))
      .timeout(Some(settings.timeout))
      .build();

    Ok(Self { transport })
  }
}

/// 由设置生成告警邮件内容；收发件人缺失时返回 `NotConfigured`。
pub(crate) fn alert_message(settings: &SmtpSettings) -> Result<AlertMessage, EmailDeliveryError> {
  let (Some(from), Some(to)) = (&settings.from, &settings.to) else {
    return Err(EmailDeliveryError::NotConfigured);
  };
  // 提前校验地址，避免到发送时才失败
  from.parse::<Mailbox>()?;
  to.parse::<Mailbox>()?;

  Ok(AlertMessage {
    from: from.clone(),
    to: to.clone(),
    subject: settings.subject.clone(),
    body: settings.body.clone(),
  })
}

impl AlertMessage {
  pub fn from_settings(settings: &SmtpSettings) -> Result<Self, EmailDeliveryError> {
    alert_message(settings)
  }

  fn to_email(&self) -> Result<Message, EmailDeliveryError> {
    let email = Message::builder()
      .from(self.from.parse::<Mailbox>()?)
      .to(self.to.parse::<Mailbox>()?)
      .subject(self.subject.as_str())
      .header(ContentType::TEXT_PLAIN)
      .body(self.body.clone())?;
    Ok(email)
  }
}

impl Mailer for SmtpMailer {
  fn send(&self, message: &AlertMessage) -> Result<(), EmailDeliveryError> {
    let email = message.to_email()?;
    debug!("发送告警邮件: {}", message.subject);
    self.transport.send(&email)?;
    Ok(())
  }
}

/// 未配置 SMTP 时使用，每次发送都返回 `NotConfigured`
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredMailer;

impl Mailer for UnconfiguredMailer {
  fn send(&self, _message: &AlertMessage) -> Result<(), EmailDeliveryError> {
    Err(EmailDeliveryError::NotConfigured)
  }
}
