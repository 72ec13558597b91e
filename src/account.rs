// 该文件是 Huojing （火警） 项目的一部分。
// src/account.rs - 用户账号存储
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
use std::path::Path;
use std::sync::LazyLock;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use argon2::{Algorithm, Argon2, Params, Version};
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("邮箱正则表达式无效")
});

// 十进制数字（Unicode Nd），分数、罗马数字等不算
static DIGIT_PATTERN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\p{Nd}").expect("数字正则表达式无效"));

/// 账号。`password_hash` 保存 Argon2 PHC 字符串，不保存明文。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
  pub username: String,
  pub password_hash: String,
  pub email: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationReason {
  #[error("Please fill out all fields ({0} is empty).")]
  MissingField(&'static str),
  #[error("Username should not contain numbers.")]
  UsernameContainsDigit,
  #[error("Password should be at least {min} characters.")]
  PasswordTooShort { min: usize },
  #[error("Invalid email format.")]
  InvalidEmail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountField {
  Username,
  Email,
}

impl fmt::Display for AccountField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      AccountField::Username => write!(f, "Username"),
      AccountField::Email => write!(f, "Email"),
    }
  }
}

#[derive(Error, Debug)]
pub enum AccountError {
  #[error("{reason}")]
  Validation { reason: ValidationReason },
  #[error("{field} already exists.")]
  Duplicate { field: AccountField },
  #[error("数据库错误: {0}")]
  Database(#[from] rusqlite::Error),
  #[error("密码哈希错误: {0}")]
  Hash(String),
}

impl From<ValidationReason> for AccountError {
  fn from(reason: ValidationReason) -> Self {
    AccountError::Validation { reason }
  }
}

/// 按固定顺序校验账号字段，返回第一条不满足的规则。
pub fn validate_account(username: &str, password: &str, email: &str) -> Result<(), ValidationReason> {
  for (name, value) in [("username", username), ("password", password), ("email", email)] {
    if value.is_empty() {
      return Err(ValidationReason::MissingField(name));
    }
  }
  if DIGIT_PATTERN.is_match(username) {
    return Err(ValidationReason::UsernameContainsDigit);
  }
  if password.chars().count() < MIN_PASSWORD_LEN {
    return Err(ValidationReason::PasswordTooShort {
      min: MIN_PASSWORD_LEN,
    });
  }
  if !EMAIL_PATTERN.is_match(email) {
    return Err(ValidationReason::InvalidEmail);
  }
  Ok(())
}

/// 基于 SQLite 的账号存储
///
/// 单表 `users(username PRIMARY KEY, password, email)`，在打开时自动建表。
pub struct CredentialStore {
  conn: Connection,
  hasher: Argon2<'static>,
}

impl CredentialStore {
  pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, AccountError> {
    let db_path = db_path.as_ref();
    info!("打开账号数据库: {}", db_path.display());
    Self::with_connection(Connection::open(db_path)?)
  }

  pub fn open_in_memory() -> Result<Self, AccountError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, AccountError> {
    let store = Self {
      conn,
      hasher: Argon2::default(),
    };
    store.initialize()?;
    Ok(store)
  }

  /// 替换 Argon2 参数，只影响之后新建的账号；已有哈希自带参数。
  pub fn with_hash_params(mut self, params: Params) -> Self {
    self.hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    self
  }

  /// 幂等建表
  pub fn initialize(&self) -> Result<(), AccountError> {
    self.conn.execute_batch(
      r#"
      CREATE TABLE IF NOT EXISTS users (
        username TEXT PRIMARY KEY,
        password TEXT NOT NULL,
        email TEXT NOT NULL
      );
      CREATE UNIQUE INDEX IF NOT EXISTS users_email ON users (email);
      "#,
    )?;
    Ok(())
  }

  /// 用户名精确匹配且密码校验通过时返回账号
  pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<Account>, AccountError> {
    let Some(account) = self.find(username)? else {
      debug!("用户 {} 不存在", username);
      return Ok(None);
    };

    let parsed = match PasswordHash::new(&account.password_hash) {
      Ok(parsed) => parsed,
      Err(e) => {
        warn!("用户 {} 的密码哈希无法解析: {}", username, e);
        return Ok(None);
      }
    };

    if self
      .hasher
      .verify_password(password.as_bytes(), &parsed)
      .is_ok()
    {
      Ok(Some(account))
    } else {
      debug!("用户 {} 密码错误", username);
      Ok(None)
    }
  }

  /// 校验并创建账号。重复检查与插入在同一个事务中完成。
  pub fn create_account(
    &mut self,
    username: &str,
    password: &str,
    email: &str,
  ) -> Result<Account, AccountError> {
    validate_account(username, password, email)?;

    let tx = self
      .conn
      .transaction_with_behavior(TransactionBehavior::Immediate)?;

    let email_taken: bool = tx.query_row(
      "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
      params![email],
      |row| row.get(0),
    )?;
    if email_taken {
      return Err(AccountError::Duplicate {
        field: AccountField::Email,
      });
    }

    let username_taken: bool = tx.query_row(
      "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
      params![username],
      |row| row.get(0),
    )?;
    if username_taken {
      return Err(AccountError::Duplicate {
        field: AccountField::Username,
      });
    }

    let password_hash = hash_password(&self.hasher, password)?;
    tx.execute(
      "INSERT INTO users (username, password, email) VALUES (?1, ?2, ?3)",
      params![username, password_hash, email],
    )?;
    tx.commit()?;

    info!("用户 {} 添加成功", username);
    Ok(Account {
      username: username.to_string(),
      password_hash,
      email: email.to_string(),
    })
  }

  pub fn list_accounts(&self) -> Result<Vec<Account>, AccountError> {
    let mut stmt = self
      .conn
      .prepare("SELECT username, password, email FROM users ORDER BY username")?;
    let accounts = stmt
      .query_map([], |row| {
        Ok(Account {
          username: row.get(0)?,
          password_hash: row.get(1)?,
          email: row.get(2)?,
        })
      })?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(accounts)
  }

  /// 删除账号；用户名不存在时什么也不做。返回是否删除了记录。
  pub fn delete_account(&self, username: &str) -> Result<bool, AccountError> {
    let deleted = self
      .conn
      .execute("DELETE FROM users WHERE username = ?1", params![username])?;
    if deleted > 0 {
      info!("用户 {} 已删除", username);
    }
    Ok(deleted > 0)
  }

  pub fn count_accounts(&self) -> Result<usize, AccountError> {
    let count: i64 = self
      .conn
      .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count as usize)
  }

  fn find(&self, username: &str) -> Result<Option<Account>, AccountError> {
    let account = self
      .conn
      .query_row(
        "SELECT username, password, email FROM users WHERE username = ?1",
        params![username],
        |row| {
          Ok(Account {
            username: row.get(0)?,
            password_hash: row.get(1)?,
            email: row.get(2)?,
          })
        },
      )
      .optional()?;
    Ok(account)
  }
}

fn hash_password(hasher: &Argon2<'_>, password: &str) -> Result<String, AccountError> {
  let salt = SaltString::generate(&mut OsRng);
  hasher
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| AccountError::Hash(e.to_string()))
}
