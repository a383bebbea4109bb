//! Models and helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use strata_query::connection::{Connection, ExecResult, Executor, TransactionConnection};
use strata_query::{
    Config, Db, Hooks, Model, QueryError, QueryResult, Rows, TransactionConfig, Value,
};
use strata_sqlite::SqliteConnection;

#[derive(Debug, Default, Clone, PartialEq, Model)]
pub struct Company {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Default, Clone, PartialEq, Model)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub bio: String,
}

#[derive(Debug, Default, Clone, PartialEq, Model)]
pub struct Email {
    pub id: i64,
    pub user_id: i64,
    pub address: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, PartialEq, Model)]
pub struct Language {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Default, Clone, PartialEq, Model)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub age: Option<i32>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub company_id: Option<i64>,
    #[strata(belongs_to)]
    pub company: Option<Company>,
    #[strata(has_one)]
    pub profile: Option<Profile>,
    #[strata(has_many)]
    pub emails: Vec<Email>,
    #[strata(many_to_many = "user_languages")]
    pub languages: Vec<Language>,
}

impl User {
    pub fn named(name: &str, age: i32) -> Self {
        Self {
            name: name.to_string(),
            age: Some(age),
            active: true,
            ..Default::default()
        }
    }
}

/// A model whose hooks record their order and can be told to fail.
#[derive(Debug, Default, Clone, PartialEq, Model)]
#[strata(hooks)]
pub struct Account {
    pub id: i64,
    pub owner: String,
    pub balance: i64,
    #[strata(ignore)]
    pub calls: Vec<String>,
    #[strata(ignore)]
    pub fail_on: Option<String>,
}

impl Account {
    fn record(&mut self, hook: &str) -> QueryResult<()> {
        self.calls.push(hook.to_string());
        if self.fail_on.as_deref() == Some(hook) {
            return Err(QueryError::invalid_query(format!("{} refused", hook)));
        }
        Ok(())
    }
}

impl Hooks for Account {
    fn before_save(&mut self, _db: &Db) -> QueryResult<()> {
        self.record("before_save")
    }

    fn before_create(&mut self, _db: &Db) -> QueryResult<()> {
        if self.balance < 0 {
            return Err(QueryError::invalid_query("balance cannot be negative"));
        }
        self.record("before_create")
    }

    fn after_create(&mut self, _db: &Db) -> QueryResult<()> {
        self.record("after_create")
    }

    fn after_save(&mut self, _db: &Db) -> QueryResult<()> {
        self.record("after_save")
    }

    fn before_update(&mut self, _db: &Db) -> QueryResult<()> {
        self.record("before_update")
    }

    fn after_update(&mut self, _db: &Db) -> QueryResult<()> {
        self.record("after_update")
    }

    fn before_delete(&mut self, _db: &Db) -> QueryResult<()> {
        self.record("before_delete")
    }

    fn after_delete(&mut self, _db: &Db) -> QueryResult<()> {
        self.record("after_delete")
    }

    fn after_find(&mut self, _db: &Db) -> QueryResult<()> {
        self.record("after_find")
    }
}

#[derive(Debug, Default, Clone, PartialEq, Model)]
pub struct Audit {
    pub created_by: String,
    pub note: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Model)]
pub struct Post {
    pub id: i64,
    pub title: String,
    #[strata(embedded, prefix = "audit_")]
    pub audit: Audit,
}

pub fn new_token() -> Value {
    Value::from(uuid::Uuid::new_v4())
}

#[derive(Debug, Default, Clone, PartialEq, Model)]
#[strata(table = "api_tokens")]
pub struct Token {
    #[strata(primary_key, generate = "new_token")]
    pub code: String,
    pub scope: String,
}

/// An in-memory session with every test table created.
pub fn setup() -> Db {
    migrate(strata_sqlite::open("sqlite::memory:").unwrap())
}

pub fn migrate(db: Db) -> Db {
    db.auto_migrate::<Company>().unwrap();
    db.auto_migrate::<Profile>().unwrap();
    db.auto_migrate::<Email>().unwrap();
    db.auto_migrate::<Language>().unwrap();
    db.auto_migrate::<User>().unwrap();
    db.auto_migrate::<Account>().unwrap();
    db.auto_migrate::<Post>().unwrap();
    db.auto_migrate::<Token>().unwrap();
    db
}

/// Statements seen by a [`CountingConnection`].
#[derive(Debug, Default)]
pub struct Statements {
    count: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl Statements {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
        self.log.lock().clear();
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn record(&self, sql: &str) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(sql.to_string());
    }
}

/// Wraps a SQLite connection and counts the statements run outside
/// transactions.
pub struct CountingConnection {
    inner: SqliteConnection,
    statements: Arc<Statements>,
}

impl Executor for CountingConnection {
    fn execute(&self, sql: &str, values: &[Value]) -> QueryResult<ExecResult> {
        self.statements.record(sql);
        self.inner.execute(sql, values)
    }

    fn query(&self, sql: &str, values: &[Value]) -> QueryResult<Rows> {
        self.statements.record(sql);
        self.inner.query(sql, values)
    }
}

impl Connection for CountingConnection {
    fn begin(&self, config: &TransactionConfig) -> QueryResult<Box<dyn TransactionConnection>> {
        self.inner.begin(config)
    }

    fn close(&self) -> QueryResult<()> {
        self.inner.close()
    }
}

/// An in-memory session over a [`CountingConnection`], migrated.
pub fn counting_setup() -> (Db, Arc<Statements>) {
    let statements = Arc::new(Statements::default());
    let conn = CountingConnection {
        inner: SqliteConnection::memory().unwrap(),
        statements: Arc::clone(&statements),
    };
    let db = migrate(Db::open("sqlite", conn, Config::default()).unwrap());
    statements.reset();
    (db, statements)
}

/// Insert a user with two emails, a profile, a company and two languages.
pub fn seed_user(db: &Db, name: &str, age: i32) -> User {
    let mut user = User {
        company: Some(Company {
            name: format!("{} Inc", name),
            ..Default::default()
        }),
        profile: Some(Profile {
            bio: format!("{} bio", name),
            ..Default::default()
        }),
        emails: vec![
            Email {
                address: format!("{}@home.test", name),
                ..Default::default()
            },
            Email {
                address: format!("{}@work.test", name),
                ..Default::default()
            },
        ],
        languages: vec![
            Language {
                name: format!("{}-lang-1", name),
                ..Default::default()
            },
            Language {
                name: format!("{}-lang-2", name),
                ..Default::default()
            },
        ],
        ..User::named(name, age)
    };
    db.create(&mut user).unwrap();
    user
}
