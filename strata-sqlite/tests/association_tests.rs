//! Association saving and eager loading against SQLite.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use strata_query::{Db, ErrorCode, Model};

#[derive(Debug, Default, Clone, PartialEq, Model)]
struct Item {
    id: i64,
    order_id: i64,
    sku: String,
}

#[derive(Debug, Default, Clone, PartialEq, Model)]
struct Order {
    id: i64,
    customer_id: i64,
    #[strata(has_many)]
    items: Vec<Item>,
}

#[derive(Debug, Default, Clone, PartialEq, Model)]
struct Customer {
    id: i64,
    name: String,
    #[strata(has_many)]
    orders: Vec<Order>,
}

fn migrate_orders(db: &Db) {
    db.auto_migrate::<Item>().unwrap();
    db.auto_migrate::<Order>().unwrap();
    db.auto_migrate::<Customer>().unwrap();
}

fn customer(name: &str, orders: usize, items: usize) -> Customer {
    Customer {
        name: name.to_string(),
        orders: (0..orders)
            .map(|o| Order {
                items: (0..items)
                    .map(|i| Item {
                        sku: format!("{}-{}-{}", name, o, i),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

#[test]
fn test_create_cascades_through_every_kind() {
    let db = setup();
    let user = seed_user(&db, "jinzhu", 18);

    let company = user.company.as_ref().unwrap();
    assert!(company.id > 0);
    assert_eq!(user.company_id, Some(company.id));

    let profile = user.profile.as_ref().unwrap();
    assert!(profile.id > 0);
    assert_eq!(profile.user_id, user.id);

    assert!(user.emails.iter().all(|e| e.id > 0 && e.user_id == user.id));
    assert!(user.languages.iter().all(|l| l.id > 0));

    assert_eq!(db.model::<Company>().count().unwrap(), 1);
    assert_eq!(db.model::<Profile>().count().unwrap(), 1);
    assert_eq!(db.model::<Email>().count().unwrap(), 2);
    assert_eq!(db.model::<Language>().count().unwrap(), 2);
    assert_eq!(db.table("user_languages").count().unwrap(), 2);
}

#[test]
fn test_save_associations_disabled() {
    let db = setup();
    let mut user = User {
        emails: vec![Email {
            address: "a@b.test".into(),
            ..Default::default()
        }],
        ..User::named("solo", 1)
    };
    db.save_associations(false).create(&mut user).unwrap();
    assert!(user.id > 0);
    assert_eq!(user.emails[0].id, 0);
    assert_eq!(db.model::<Email>().count().unwrap(), 0);
}

#[test]
fn test_existing_targets_are_linked_not_inserted() {
    let db = setup();
    let first = seed_user(&db, "first", 1);

    let mut second = User {
        company: first.company.clone(),
        languages: first.languages.clone(),
        ..User::named("second", 2)
    };
    db.create(&mut second).unwrap();

    assert_eq!(second.company_id, first.company_id);
    assert_eq!(db.model::<Company>().count().unwrap(), 1);
    assert_eq!(db.model::<Language>().count().unwrap(), 2);
    assert_eq!(db.table("user_languages").count().unwrap(), 4);

    // Saving again does not duplicate join rows.
    db.save(&mut second).unwrap();
    assert_eq!(db.table("user_languages").count().unwrap(), 4);
}

#[test]
fn test_autoupdate_writes_changed_targets() {
    let db = setup();
    let mut user = seed_user(&db, "jinzhu", 18);
    user.emails[0].address = "changed@home.test".into();
    db.save(&mut user).unwrap();

    let mut email = Email::default();
    db.where_pk(user.emails[0].id).first(&mut email).unwrap();
    assert_eq!(email.address, "changed@home.test");

    user.emails[1].address = "ignored@work.test".into();
    db.association_autoupdate(false).save(&mut user).unwrap();
    let mut email = Email::default();
    db.where_pk(user.emails[1].id).first(&mut email).unwrap();
    assert_eq!(email.address, "jinzhu@work.test");
}

#[test]
fn test_preload_every_kind() {
    let db = setup();
    let seeded = seed_user(&db, "jinzhu", 18);

    let mut user = User::default();
    db.preload("company")
        .preload("profile")
        .preload("emails")
        .preload("languages")
        .first(&mut user)
        .unwrap();

    assert_eq!(user.company.as_ref().map(|c| c.name.as_str()), Some("jinzhu Inc"));
    assert_eq!(user.profile.as_ref().map(|p| p.bio.as_str()), Some("jinzhu bio"));
    let addresses: Vec<&str> = user.emails.iter().map(|e| e.address.as_str()).collect();
    assert_eq!(addresses, vec!["jinzhu@home.test", "jinzhu@work.test"]);
    let mut languages: Vec<&str> = user.languages.iter().map(|l| l.name.as_str()).collect();
    languages.sort();
    assert_eq!(languages, vec!["jinzhu-lang-1", "jinzhu-lang-2"]);
    assert_eq!(user.emails, seeded.emails);
}

#[test]
fn test_preload_distributes_across_owners() {
    let db = setup();
    seed_user(&db, "a", 1);
    seed_user(&db, "b", 2);
    let mut bare = User::named("c", 3);
    db.create(&mut bare).unwrap();

    let mut users: Vec<User> = Vec::new();
    db.preload("emails")
        .preload("company")
        .order("id")
        .find(&mut users)
        .unwrap();

    assert_eq!(users.len(), 3);
    assert!(users[0].emails.iter().all(|e| e.address.starts_with("a@")));
    assert!(users[1].emails.iter().all(|e| e.address.starts_with("b@")));
    assert_eq!(users[0].emails.len(), 2);
    assert!(users[2].emails.is_empty());
    assert!(users[2].company.is_none());
    assert_eq!(users[1].company.as_ref().unwrap().name, "b Inc");
}

#[test]
fn test_preload_issues_one_statement_per_association() {
    let (db, statements) = counting_setup();
    for name in ["a", "b", "c"] {
        seed_user(&db, name, 1);
    }

    statements.reset();
    let mut users: Vec<User> = Vec::new();
    db.preload("emails").find(&mut users).unwrap();
    assert_eq!(users.len(), 3);
    assert_eq!(statements.count(), 2, "{:#?}", statements.log());

    statements.reset();
    db.preload("emails")
        .preload("languages")
        .preload("company")
        .find(&mut users)
        .unwrap();
    assert_eq!(statements.count(), 4, "{:#?}", statements.log());
    assert!(statements.log()[2].contains("__strata_owner_key"));
}

#[test]
fn test_preload_skips_soft_deleted_rows() {
    let db = setup();
    let mut seeded = seed_user(&db, "jinzhu", 18);
    db.delete(&mut seeded.emails[0]).unwrap();

    let mut user = User::default();
    db.preload("emails").first(&mut user).unwrap();
    assert_eq!(user.emails.len(), 1);
    assert_eq!(user.emails[0].address, "jinzhu@work.test");
}

#[test]
fn test_preload_where_filters_last_level() {
    let db = setup();
    seed_user(&db, "jinzhu", 18);

    let mut user = User::default();
    db.preload_where("emails", "address LIKE ?", "%@work.test")
        .first(&mut user)
        .unwrap();
    assert_eq!(user.emails.len(), 1);
    assert_eq!(user.emails[0].address, "jinzhu@work.test");
}

#[test]
fn test_nested_preload() {
    let (db, statements) = counting_setup();
    migrate_orders(&db);
    let mut alice = customer("alice", 2, 2);
    let mut bob = customer("bob", 1, 3);
    db.create(&mut alice).unwrap();
    db.create(&mut bob).unwrap();
    assert_eq!(db.model::<Item>().count().unwrap(), 7);

    statements.reset();
    let mut customers: Vec<Customer> = Vec::new();
    db.preload("orders.items")
        .order("id")
        .find(&mut customers)
        .unwrap();
    assert_eq!(statements.count(), 3, "{:#?}", statements.log());
    assert_eq!(customers, vec![alice, bob]);
}

#[test]
fn test_nested_preload_shares_intermediate_level() {
    let (db, statements) = counting_setup();
    migrate_orders(&db);
    let mut alice = customer("alice", 2, 2);
    db.create(&mut alice).unwrap();

    statements.reset();
    let mut found = Customer::default();
    db.preload("orders")
        .preload_where("orders.items", "sku LIKE ?", "%-0")
        .first(&mut found)
        .unwrap();
    assert_eq!(statements.count(), 3, "{:#?}", statements.log());
    assert_eq!(found.orders.len(), 2);
    assert!(found.orders.iter().all(|o| o.items.len() == 1));
}

#[test]
fn test_unknown_association() {
    let (db, statements) = counting_setup();
    seed_user(&db, "jinzhu", 18);
    statements.reset();

    let mut users: Vec<User> = Vec::new();
    let err = db.preload("posts").find(&mut users).unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownAssociation);
    assert!(err.message.contains("posts"));

    let err = db.preload("emails.owner").find(&mut users).unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownAssociation);
}

#[test]
fn test_preload_on_empty_result() {
    let (db, statements) = counting_setup();
    let mut users: Vec<User> = Vec::new();
    db.preload("emails").find(&mut users).unwrap();
    assert!(users.is_empty());
    assert_eq!(statements.count(), 1);
}
