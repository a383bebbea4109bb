//! Transactions, lifecycle hooks and callback registration against SQLite.

mod common;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use common::*;
use pretty_assertions::assert_eq;
use strata_query::{
    Db, ErrorCode, Operation, QueryError, QueryResult, TransactionConfig, TransactionStatus,
    attrs,
};

fn user_count(db: &Db) -> u64 {
    db.model::<User>().count().unwrap()
}

#[test]
fn test_explicit_commit() {
    let db = setup();
    let tx = db.begin().unwrap();
    assert!(tx.in_transaction());
    assert!(!db.in_transaction());
    assert_eq!(tx.transaction_status(), Some(TransactionStatus::Active));

    let mut user = User::named("a", 1);
    tx.create(&mut user).unwrap();
    tx.commit().unwrap();
    assert_eq!(tx.transaction_status(), Some(TransactionStatus::Committed));
    assert_eq!(user_count(&db), 1);

    let err = tx.commit().unwrap_err();
    assert!(err.is_transaction_closed());
    let err = tx.model::<User>().count().unwrap_err();
    assert_eq!(err.code, ErrorCode::TransactionClosed);
    tx.rollback_unless_committed().unwrap();
}

#[test]
fn test_explicit_rollback() {
    let db = setup();
    let tx = db.begin().unwrap();
    let mut user = User::named("a", 1);
    tx.create(&mut user).unwrap();
    assert_eq!(user_count(&tx), 1);

    tx.rollback().unwrap();
    assert_eq!(tx.transaction_status(), Some(TransactionStatus::RolledBack));
    assert_eq!(user_count(&db), 0);
    tx.rollback().unwrap();
}

#[test]
fn test_transactions_do_not_nest() {
    let db = setup();
    let tx = db.begin().unwrap();
    let err = tx.begin().unwrap_err();
    assert_eq!(err.code, ErrorCode::CannotStartTransaction);

    let err = db.commit().unwrap_err();
    assert_eq!(err.code, ErrorCode::TransactionFailed);
    tx.rollback().unwrap();
}

#[test]
fn test_chains_from_transaction_share_it() {
    let db = setup();
    let tx = db.begin().unwrap();
    let named = tx.where_("name = ?", "a");
    assert!(named.in_transaction());

    let mut user = User::named("a", 1);
    named.create(&mut user).unwrap();
    tx.rollback().unwrap();
    assert_eq!(user_count(&db), 0);
}

#[test]
fn test_transaction_closure_commits_on_ok() {
    let db = setup();
    let id = db
        .transaction(|tx| {
            let mut user = User::named("a", 1);
            tx.create(&mut user)?;
            tx.update(&mut user, attrs! { "age" => 2 })?;
            Ok::<_, QueryError>(user.id)
        })
        .unwrap();

    let mut user = User::default();
    db.where_pk(id).first(&mut user).unwrap();
    assert_eq!(user.age, Some(2));
}

#[test]
fn test_transaction_closure_rolls_back_on_err() {
    let db = setup();
    let err = db
        .transaction(|tx| -> QueryResult<()> {
            let mut user = User::named("a", 1);
            tx.create(&mut user)?;
            Err(QueryError::invalid_query("changed my mind"))
        })
        .unwrap_err();
    assert_eq!(err.message, "changed my mind");
    assert_eq!(user_count(&db), 0);
}

#[test]
fn test_transaction_closure_rolls_back_on_panic() {
    let db = setup();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        db.transaction(|tx| -> QueryResult<()> {
            let mut user = User::named("a", 1);
            tx.create(&mut user)?;
            panic!("boom");
        })
    }));
    assert!(result.is_err());
    assert_eq!(user_count(&db), 0);

    let mut user = User::named("b", 2);
    db.create(&mut user).unwrap();
    assert_eq!(user_count(&db), 1);
}

#[test]
fn test_read_only_transaction_rejects_writes() {
    let db = setup();
    let tx = db.begin_with(TransactionConfig::new().read_only()).unwrap();
    let mut user = User::named("a", 1);
    assert!(tx.create(&mut user).is_err());
    assert_eq!(user_count(&tx), 0);
    tx.rollback().unwrap();

    db.create(&mut User::named("b", 2)).unwrap();
    assert_eq!(user_count(&db), 1);
}

#[test]
fn test_hook_order() {
    let db = setup();
    let mut account = Account {
        owner: "ann".into(),
        balance: 10,
        ..Default::default()
    };
    db.create(&mut account).unwrap();
    assert_eq!(
        account.calls,
        vec!["before_save", "before_create", "after_create", "after_save"]
    );

    account.calls.clear();
    db.update(&mut account, attrs! { "balance" => 20 }).unwrap();
    assert_eq!(
        account.calls,
        vec!["before_save", "before_update", "after_update", "after_save"]
    );

    account.calls.clear();
    db.update_column(&mut account, "balance", 30).unwrap();
    assert!(account.calls.is_empty());

    let mut found = Account::default();
    db.first(&mut found).unwrap();
    assert_eq!(found.calls, vec!["after_find"]);
    assert_eq!(found.balance, 30);

    account.calls.clear();
    db.delete(&mut account).unwrap();
    assert_eq!(account.calls, vec!["before_delete", "after_delete"]);
}

#[test]
fn test_hook_error_aborts_and_rolls_back() {
    let db = setup();
    let mut negative = Account {
        owner: "ann".into(),
        balance: -1,
        ..Default::default()
    };
    let err = db.create(&mut negative).unwrap_err();
    assert_eq!(err.message, "balance cannot be negative");
    assert_eq!(negative.calls, vec!["before_save"]);

    let mut late = Account {
        owner: "bob".into(),
        balance: 1,
        fail_on: Some("after_create".into()),
        ..Default::default()
    };
    let err = db.create(&mut late).unwrap_err();
    assert_eq!(err.message, "after_create refused");
    assert_eq!(err.context.operation.as_deref(), Some("create"));
    assert_eq!(db.model::<Account>().count().unwrap(), 0);

    let mut account = Account {
        owner: "cid".into(),
        balance: 1,
        ..Default::default()
    };
    db.create(&mut account).unwrap();
    account.fail_on = Some("before_delete".into());
    assert!(db.delete(&mut account).is_err());
    assert_eq!(db.model::<Account>().count().unwrap(), 1);
}

#[test]
fn test_association_failure_rolls_back_owner() {
    let db = setup();
    db.callback(Operation::Create)
        .insert_before("strata:create", "test:reject_languages", |scope| {
            if scope.table_name() == "languages" {
                return Err(QueryError::invalid_query("no languages today"));
            }
            Ok(())
        })
        .unwrap();

    let mut user = User {
        languages: vec![Language {
            name: "go".into(),
            ..Default::default()
        }],
        ..User::named("a", 1)
    };
    let err = db.create(&mut user).unwrap_err();
    assert_eq!(err.message, "no languages today");
    assert_eq!(user_count(&db), 0);
}

#[test]
fn test_callback_registration() {
    let db = setup();
    let create = db.callback(Operation::Create);
    create
        .insert_before("strata:create", "test:stamp_name", |scope| {
            if scope.table_name() == "companies" {
                scope.set_column("name", "stamped".into())?;
            }
            Ok(())
        })
        .unwrap();

    let names = create.names();
    let at = names.iter().position(|n| n == "test:stamp_name").unwrap();
    assert_eq!(names[at + 1], "strata:create");

    let mut company = Company::default();
    db.create(&mut company).unwrap();
    assert_eq!(company.name, "stamped");

    let err = create
        .insert_after("strata:create", "test:stamp_name", |_| Ok(()))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DuplicateCallback);

    let err = create
        .insert_before("strata:missing", "test:other", |_| Ok(()))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::CallbackNotFound);
    let err = create.remove("test:missing").unwrap_err();
    assert_eq!(err.code, ErrorCode::CallbackNotFound);

    create.remove("test:stamp_name").unwrap();
    let mut plain = Company {
        name: "plain".into(),
        ..Default::default()
    };
    db.create(&mut plain).unwrap();
    assert_eq!(plain.name, "plain");
}

#[test]
fn test_replace_and_remove_builtin_steps() {
    let db = setup();
    let mut account = Account {
        owner: "ann".into(),
        balance: 1,
        ..Default::default()
    };
    db.create(&mut account).unwrap();

    db.callback(Operation::Query).remove("strata:after_query").unwrap();
    let mut found = Account::default();
    db.first(&mut found).unwrap();
    assert!(found.calls.is_empty());

    db.callback(Operation::Delete)
        .replace("strata:delete", |scope| {
            scope.instance_set("skipped", true.into());
            Ok(())
        })
        .unwrap();
    account.calls.clear();
    db.delete(&mut account).unwrap();
    assert_eq!(account.calls, vec!["before_delete", "after_delete"]);
    assert_eq!(db.model::<Account>().count().unwrap(), 1);
}

#[test]
fn test_user_step_error_before_commit_rolls_back() {
    let db = setup();
    let cleaned = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cleaned);

    let create = db.callback(Operation::Create);
    create
        .insert_before(
            "strata:commit_or_rollback_transaction",
            "test:veto",
            |scope| match scope.settings().values.get("veto") {
                Some(_) => Err(QueryError::invalid_query("vetoed")),
                None => Ok(()),
            },
        )
        .unwrap();
    create
        .append_cleanup("test:observe", move |scope| {
            flag.store(scope.has_error(), Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    let mut user = User::named("a", 1);
    let err = db.set("veto", true).create(&mut user).unwrap_err();
    assert_eq!(err.message, "vetoed");
    assert!(cleaned.load(Ordering::SeqCst));
    assert_eq!(user_count(&db), 0);

    db.create(&mut User::named("b", 2)).unwrap();
    assert!(!cleaned.load(Ordering::SeqCst));
    assert_eq!(user_count(&db), 1);
}

#[test]
fn test_close() {
    let db = setup();
    let derived = db.where_("age > ?", 1);
    db.close().unwrap();
    assert!(db.is_closed());
    db.close().unwrap();

    let err = derived.model::<User>().count().unwrap_err();
    assert_eq!(err.code, ErrorCode::ConnectionClosed);
    let err = db.create(&mut User::named("a", 1)).unwrap_err();
    assert_eq!(err.code, ErrorCode::ConnectionClosed);
}

#[test]
fn test_file_transaction_isolation() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("app.db").display());
    let db = migrate(strata_sqlite::open(&url).unwrap());

    let tx = db.begin().unwrap();
    tx.create(&mut User::named("pending", 1)).unwrap();
    assert_eq!(user_count(&tx), 1);
    assert_eq!(user_count(&db), 0);
    tx.commit().unwrap();
    assert_eq!(user_count(&db), 1);
}

#[test]
fn test_file_database_shared_across_threads() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("app.db").display());
    let db = migrate(strata_sqlite::open(&url).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let db = db.clone();
            thread::spawn(move || {
                for i in 0..5 {
                    let mut company = Company {
                        name: format!("{}-{}", t, i),
                        ..Default::default()
                    };
                    db.create(&mut company).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(db.model::<Company>().count().unwrap(), 20);
}

#[test]
fn test_memory_database_shared_across_threads() {
    let db = setup();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let db = db.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let mut company = Company {
                        name: format!("{}-{}", t, i),
                        ..Default::default()
                    };
                    db.create(&mut company).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(db.model::<Company>().count().unwrap(), 100);
}

#[test]
fn test_memory_session_write_outlives_foreign_rollback() {
    let db = setup();
    let tx = db.begin().unwrap();
    db.exec("INSERT INTO companies (name) VALUES ('outside')", ())
        .unwrap();
    tx.rollback().unwrap();
    assert_eq!(db.model::<Company>().count().unwrap(), 1);
}
