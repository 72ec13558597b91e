// 该文件是 Huojing （火警） 项目的一部分。
// tests/credential_store.rs - 账号存储集成测试
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

use argon2::Params;
use tempfile::TempDir;

use huojing::account::{AccountError, AccountField, CredentialStore, ValidationReason};

fn fast_params() -> Params {
  Params::new(1024, 1, 1, None).expect("argon2 params")
}

fn open_store(dir: &TempDir) -> CredentialStore {
  CredentialStore::open(dir.path().join("users.db"))
    .expect("open store")
    .with_hash_params(fast_params())
}

#[test]
fn account_lifecycle() {
  let dir = TempDir::new().expect("tempdir");
  let mut store = open_store(&dir);

  store
    .create_account("alice", "secret1", "a@x.com")
    .expect("create alice");

  let account = store
    .authenticate("alice", "secret1")
    .expect("authenticate")
    .expect("alice logs in");
  assert_eq!(account.email, "a@x.com");
  assert!(store.authenticate("alice", "wrong").expect("authenticate").is_none());
  assert!(store.authenticate("Alice", "secret1").expect("authenticate").is_none());
  assert!(store.authenticate("bob", "secret1").expect("authenticate").is_none());

  assert!(store.delete_account("alice").expect("delete"));
  assert!(store.authenticate("alice", "secret1").expect("authenticate").is_none());
  assert!(store.list_accounts().expect("list").is_empty());
}

#[test]
fn validation_failures_write_nothing() {
  let dir = TempDir::new().expect("tempdir");
  let mut store = open_store(&dir);

  let cases = [
    ("bob1", "secret1", "b@x.com", ValidationReason::UsernameContainsDigit),
    ("bob", "12345", "b@x.com", ValidationReason::PasswordTooShort { min: 6 }),
    ("bob", "secret1", "bob@", ValidationReason::InvalidEmail),
    ("bob", "secret1", "bob@example", ValidationReason::InvalidEmail),
  ];
  for (username, password, email, expected) in cases {
    match store.create_account(username, password, email) {
      Err(AccountError::Validation { reason }) => assert_eq!(reason, expected),
      other => panic!("{username}/{email}: unexpected {other:?}"),
    }
  }
  assert_eq!(store.count_accounts().expect("count"), 0);
}

#[test]
fn duplicate_email_is_reported_before_duplicate_username() {
  let dir = TempDir::new().expect("tempdir");
  let mut store = open_store(&dir);
  store
    .create_account("alice", "secret1", "a@x.com")
    .expect("create alice");

  // 用户名和邮箱都重复时，先报告邮箱
  match store.create_account("alice", "secret2", "a@x.com") {
    Err(AccountError::Duplicate { field }) => assert_eq!(field, AccountField::Email),
    other => panic!("unexpected {other:?}"),
  }
  match store.create_account("alice", "secret2", "other@x.com") {
    Err(AccountError::Duplicate { field }) => assert_eq!(field, AccountField::Username),
    other => panic!("unexpected {other:?}"),
  }
  match store.create_account("carol", "secret3", "a@x.com") {
    Err(e @ AccountError::Duplicate { .. }) => assert_eq!(e.to_string(), "Email already exists."),
    other => panic!("unexpected {other:?}"),
  }
  assert_eq!(store.count_accounts().expect("count"), 1);
}

#[test]
fn deleting_unknown_user_is_a_no_op() {
  let dir = TempDir::new().expect("tempdir");
  let mut store = open_store(&dir);
  store
    .create_account("alice", "secret1", "a@x.com")
    .expect("create alice");

  assert!(!store.delete_account("ghost").expect("delete ghost"));
  assert!(!store.delete_account("ghost").expect("delete ghost again"));
  assert_eq!(store.count_accounts().expect("count"), 1);
}

#[test]
fn accounts_survive_reopen_and_are_not_stored_in_plaintext() {
  let dir = TempDir::new().expect("tempdir");
  {
    let mut store = open_store(&dir);
    store
      .create_account("alice", "secret1", "a@x.com")
      .expect("create alice");
    store
      .create_account("bob", "hunter22", "b@x.com")
      .expect("create bob");
  }

  let store = open_store(&dir);
  let accounts = store.list_accounts().expect("list");
  let names: Vec<&str> = accounts.iter().map(|a| a.username.as_str()).collect();
  assert_eq!(names, ["alice", "bob"]);
  for account in &accounts {
    assert!(account.password_hash.starts_with("$argon2"));
    assert!(!account.password_hash.contains("secret1"));
    assert!(!account.password_hash.contains("hunter22"));
  }
  assert!(store.authenticate("bob", "hunter22").expect("authenticate").is_some());
}

#[test]
fn legacy_plaintext_rows_cannot_log_in() {
  let dir = TempDir::new().expect("tempdir");
  let db_path = dir.path().join("users.db");
  {
    let conn = rusqlite::Connection::open(&db_path).expect("open raw");
    conn
      .execute_batch(
        "CREATE TABLE users (username TEXT PRIMARY KEY, password TEXT NOT NULL, email TEXT NOT NULL);
         INSERT INTO users VALUES ('legacy', 'plainpw', 'l@x.com');",
      )
      .expect("seed");
  }

  let store = CredentialStore::open(&db_path).expect("open store");
  assert!(store.authenticate("legacy", "plainpw").expect("authenticate").is_none());
  assert_eq!(store.count_accounts().expect("count"), 1);
}
