//! Benchmarks for statement building.
//!
//! Covers the work done before a statement reaches the driver:
//! - Placeholder expansion of lists and nested expressions
//! - Chaining conditions onto a session
//! - Rendering a full select from a chain
//! - Rebinding neutral placeholders per dialect
//! - Name inflection

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use strata_query::connection::{Connection, ExecResult, Executor, TransactionConnection};
use strata_query::sql::rebind;
use strata_query::{
    Arg, Config, Db, Dialect, Model, MsSql, Postgres, QueryError, QueryResult, Rows, SqlBuilder,
    TransactionConfig, Value, attrs, inflect,
};

/// A connection that is never reached; the benchmarks only build SQL.
struct Unreachable;

impl Executor for Unreachable {
    fn execute(&self, _sql: &str, _values: &[Value]) -> QueryResult<ExecResult> {
        Err(QueryError::connection("benchmark connection"))
    }

    fn query(&self, _sql: &str, _values: &[Value]) -> QueryResult<Rows> {
        Err(QueryError::connection("benchmark connection"))
    }
}

impl Connection for Unreachable {
    fn begin(&self, _config: &TransactionConfig) -> QueryResult<Box<dyn TransactionConnection>> {
        Err(QueryError::connection("benchmark connection"))
    }

    fn close(&self) -> QueryResult<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Model)]
struct Email {
    id: i64,
    user_id: i64,
    address: String,
}

#[derive(Debug, Default, Model)]
struct User {
    id: i64,
    name: String,
    age: Option<i32>,
    deleted_at: Option<chrono::DateTime<chrono::Utc>>,
    #[strata(has_many)]
    emails: Vec<Email>,
}

fn session(dialect: &str) -> Db {
    Db::open(dialect, Unreachable, Config::default()).unwrap()
}

// ============================================================================
// Placeholder expansion
// ============================================================================

fn bench_expansion(c: &mut Criterion) {
    let mut group = c.benchmark_group("expansion");

    group.bench_function("scalar_args", |b| {
        b.iter(|| black_box(Db::expr("name = ? AND age > ?", ("jinzhu", 18)).unwrap()))
    });

    for size in [10usize, 100, 1000] {
        let ids: Vec<i64> = (0..size as i64).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("in_list", size), &ids, |b, ids| {
            b.iter(|| black_box(Db::expr("id IN (?)", (ids.clone(),)).unwrap()))
        });
    }

    group.bench_function("nested_expression", |b| {
        let inner = Db::expr("SELECT user_id FROM emails WHERE address LIKE ?", "%@x.test")
            .unwrap()
            .parenthesized();
        b.iter(|| {
            black_box(Db::expr("id IN ? AND age > ?", (inner.clone(), 21)).unwrap())
        })
    });

    group.bench_function("builder_push_clause", |b| {
        let args: Vec<Arg> = vec![Value::from("a").into(), vec![1, 2, 3].into()];
        b.iter(|| {
            let mut builder = SqlBuilder::new();
            builder
                .push("SELECT * FROM users WHERE ")
                .push_clause("name = ? AND id IN (?)", &args)
                .unwrap();
            black_box(builder.into_expr())
        })
    });

    group.finish();
}

// ============================================================================
// Chaining
// ============================================================================

fn bench_chaining(c: &mut Criterion) {
    let mut group = c.benchmark_group("chaining");
    let db = session("sqlite");

    group.bench_function("where_order_limit", |b| {
        b.iter(|| {
            black_box(
                db.where_("age > ?", 18)
                    .where_attrs(attrs! { "name" => "jinzhu" })
                    .or("role = ?", "admin")
                    .order("id desc")
                    .limit(10),
            )
        })
    });

    let base = db.model::<User>().where_("age > ?", 18).preload("emails");
    group.bench_function("derive_from_populated_chain", |b| {
        b.iter(|| black_box(base.where_("name LIKE ?", "j%")))
    });

    group.finish();
}

// ============================================================================
// Rendering
// ============================================================================

fn bench_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("rendering");

    for dialect in ["sqlite", "postgres", "mysql", "mssql"] {
        let chain = session(dialect)
            .model::<User>()
            .where_("age > ?", 18)
            .where_attrs(attrs! { "name" => "jinzhu" })
            .not("id IN (?)", (vec![1, 2, 3],))
            .order("id desc")
            .limit(10)
            .offset(20);
        group.bench_with_input(BenchmarkId::new("select", dialect), &chain, |b, chain| {
            b.iter(|| black_box(chain.query_expr().unwrap()))
        });
    }

    group.finish();
}

fn bench_rebind(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebind");
    let sql = "SELECT * FROM users WHERE name = ? AND age > ? AND id IN (?,?,?) AND note = 'a?b'";

    let postgres: &dyn Dialect = &Postgres;
    let mssql: &dyn Dialect = &MsSql;
    group.bench_function("postgres", |b| b.iter(|| black_box(rebind(sql, postgres))));
    group.bench_function("mssql", |b| b.iter(|| black_box(rebind(sql, mssql))));

    group.finish();
}

// ============================================================================
// Inflection and metadata
// ============================================================================

fn bench_names(c: &mut Criterion) {
    let mut group = c.benchmark_group("names");

    group.bench_function("pluralize", |b| {
        b.iter(|| {
            for name in ["user", "company", "person", "status", "mouse", "language"] {
                black_box(inflect::pluralize(name));
            }
        })
    });

    group.bench_function("to_snake", |b| {
        b.iter(|| black_box(inflect::to_snake("UserLanguageHTTPSetting")))
    });

    group.bench_function("cached_descriptor", |b| {
        b.iter(|| black_box(User::describe()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_expansion,
    bench_chaining,
    bench_rendering,
    bench_rebind,
    bench_names,
);
criterion_main!(benches);
