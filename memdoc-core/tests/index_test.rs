use memdoc_core::{where_, Database, Document, Error, IndexModel};
use serde_json::{json, Value};
use uuid::Uuid;

fn doc(value: Value) -> Document {
    serde_json::from_value(value).unwrap()
}

fn sorted_ids(docs: &[Document]) -> Vec<Value> {
    let mut ids: Vec<Value> = docs.iter().filter_map(|d| d.get("id").cloned()).collect();
    ids.sort_by_key(|v| v.to_string());
    ids
}

#[test]
fn test_non_unique_index_probe() {
    let db = Database::new("test");
    let coll = db.collection("items");
    coll.indexes().create(IndexModel {
        keys: vec!["name".into()],
        name: "name".into(),
        unique: false,
        partial: None,
    });

    for _ in 0..10 {
        coll.insert_one(doc(json!({"id": Uuid::new_v4().to_string(), "name": "N"})))
            .unwrap();
    }
    coll.insert_one(doc(json!({"id": Uuid::new_v4().to_string(), "name": "M"})))
        .unwrap();

    let n = coll.find_many(Some(&where_("name").eq("N")), &[]).unwrap();
    assert_eq!(n.len(), 10);
    assert!(n.iter().all(|d| d.get("name") == Some(&json!("N"))));

    let m = coll.find_many(Some(&where_("name").eq("M")), &[]).unwrap();
    assert_eq!(m.len(), 1);
}

#[test]
fn test_unique_composite_index_conflict() {
    let db = Database::new("test");
    let coll = db.collection("items");
    coll.indexes().create(IndexModel {
        keys: vec!["a.b".into(), "c".into()],
        name: "a.b_c".into(),
        unique: true,
        partial: None,
    });

    coll.insert_one(doc(json!({"id": "1", "a": {"b": "x"}, "c": "y"})))
        .unwrap();
    let err = coll
        .insert_one(doc(json!({"id": "2", "a": {"b": "x"}, "c": "y"})))
        .unwrap_err();
    assert_eq!(err, Error::IndexConflict);
    assert_eq!(err.code(), "index_conflict");

    let all = coll.find_many(None, &[]).unwrap();
    assert_eq!(sorted_ids(&all), vec![json!("1")]);

    // A different composite key still goes in.
    coll.insert_one(doc(json!({"id": "3", "a": {"b": "x"}, "c": "z"})))
        .unwrap();
}

#[test]
fn test_filter_fallback_to_scan() {
    let db = Database::new("test");
    let coll = db.collection("items");

    for i in 0..4 {
        let name = if i % 2 == 0 { "V" } else { "W" };
        coll.insert_one(doc(json!({"id": i, "name": name}))).unwrap();
    }

    // Only the built-in _id index exists, so this scans; no error shows.
    let found = coll.find_many(Some(&where_("name").eq("V")), &[]).unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|d| d.get("name") == Some(&json!("V"))));
}

#[test]
fn test_or_of_equalities_across_indexes() {
    let db = Database::new("test");
    let coll = db.collection("items");
    coll.indexes().create(IndexModel {
        keys: vec!["c".into(), "a.b".into()],
        name: "c_a.b".into(),
        unique: true,
        partial: None,
    });

    let d1 = doc(json!({"id": "d1", "a": {"b": -5}, "c": "c1"}));
    let d2 = doc(json!({"id": "d2", "a": {"b": 1}, "c": "c2"}));
    let d3 = doc(json!({"id": "d3", "a": {"b": 2}, "c": "c3"}));
    coll.insert_many(vec![d1, d2, d3]).unwrap();

    // D1 passes the AND branch (id matches, a.b < 0), D2 the OR branch.
    let filter = where_("id")
        .eq("d1")
        .and(where_("a.b").lt(0))
        .or(where_("c").eq("c2"));
    let found = coll.find_many(Some(&filter), &[]).unwrap();
    assert_eq!(sorted_ids(&found), vec![json!("d1"), json!("d2")]);

    // With a.b not below zero the AND branch filters D1 back out.
    let filter = where_("id")
        .eq("d2")
        .and(where_("a.b").lt(0))
        .or(where_("c").eq("c3"));
    let found = coll.find_many(Some(&filter), &[]).unwrap();
    assert_eq!(sorted_ids(&found), vec![json!("d3")]);
}

#[test]
fn test_partial_index_through_collection() {
    let db = Database::new("test");
    let coll = db.collection("items");
    coll.indexes().create(IndexModel {
        keys: vec!["email".into()],
        name: "active_email".into(),
        unique: true,
        partial: Some(where_("active").eq(true)),
    });

    // Two inactive documents may share an email; an active one claims it.
    coll.insert_one(doc(json!({"id": "1", "email": "e", "active": false})))
        .unwrap();
    coll.insert_one(doc(json!({"id": "2", "email": "e", "active": false})))
        .unwrap();
    coll.insert_one(doc(json!({"id": "3", "email": "e", "active": true})))
        .unwrap();
    let err = coll
        .insert_one(doc(json!({"id": "4", "email": "e", "active": true})))
        .unwrap_err();
    assert_eq!(err, Error::IndexConflict);

    // The probe sees only documents the partial predicate accepts; the
    // inactive ones stay reachable by scan.
    let by_index = coll.find_many(Some(&where_("email").eq("e")), &[]).unwrap();
    assert_eq!(sorted_ids(&by_index), vec![json!("3")]);
    let by_scan = coll
        .find_many(Some(&where_("email").eq("e").and(where_("active").eq(false))), &[])
        .unwrap();
    assert_eq!(by_scan.len(), 2);
}

#[test]
fn test_index_stays_consistent_across_update_and_delete() {
    let db = Database::new("test");
    let coll = db.collection("items");
    coll.indexes().create(IndexModel {
        keys: vec!["name".into()],
        name: "name".into(),
        unique: false,
        partial: None,
    });

    coll.insert_one(doc(json!({"id": "1", "name": "old"}))).unwrap();
    coll.update_one(
        Some(&where_("id").eq("1")),
        doc(json!({"name": "new"})),
        &[],
    )
    .unwrap();

    // The old key is no longer probeable; the new one is.
    assert_eq!(
        coll.find_many(Some(&where_("name").eq("old")), &[])
            .unwrap()
            .len(),
        0
    );
    let found = coll.find_many(Some(&where_("name").eq("new")), &[]).unwrap();
    assert_eq!(sorted_ids(&found), vec![json!("1")]);

    coll.delete_one(Some(&where_("name").eq("new"))).unwrap();
    assert_eq!(
        coll.find_many(Some(&where_("name").eq("new")), &[])
            .unwrap()
            .len(),
        0
    );
}

#[test]
fn test_index_created_before_data_feeds_in_probe() {
    let db = Database::new("test");
    let coll = db.collection("items");
    coll.indexes().create(IndexModel {
        keys: vec!["kind".into(), "rank".into()],
        name: "kind_rank".into(),
        unique: false,
        partial: None,
    });

    for (i, rank) in [3, 1, 2].iter().enumerate() {
        coll.insert_one(doc(json!({"id": i, "kind": "k", "rank": rank})))
            .unwrap();
    }

    // Exact composite match.
    let found = coll
        .find_many(
            Some(&where_("kind").eq("k").and(where_("rank").eq(2))),
            &[],
        )
        .unwrap();
    assert_eq!(sorted_ids(&found), vec![json!(2)]);

    // Prefix probe collects the whole subtree under kind = "k".
    let found = coll.find_many(Some(&where_("kind").eq("k")), &[]).unwrap();
    assert_eq!(found.len(), 3);
}

#[test]
fn test_in_filter_probes_per_element() {
    let db = Database::new("test");
    let coll = db.collection("items");

    for i in 0..5 {
        coll.insert_one(doc(json!({"id": i}))).unwrap();
    }

    let found = coll
        .find_many(Some(&where_("id").is_in([1, 3])), &[])
        .unwrap();
    assert_eq!(sorted_ids(&found), vec![json!(1), json!(3)]);
}

#[test]
fn test_unsatisfiable_and_falls_back_to_scan() {
    let db = Database::new("test");
    let coll = db.collection("items");
    for i in 0..3 {
        coll.insert_one(doc(json!({"id": i}))).unwrap();
    }

    // id = 0 AND id = 1 can never hold; it must return nothing rather
    // than every document.
    let filter = where_("id").eq(0).and(where_("id").eq(1));
    assert_eq!(coll.find_many(Some(&filter), &[]).unwrap().len(), 0);
}

#[test]
fn test_index_list_and_drop() {
    let db = Database::new("test");
    let coll = db.collection("items");
    coll.indexes().create(IndexModel {
        keys: vec!["name".into()],
        name: "name".into(),
        unique: false,
        partial: None,
    });

    let names: Vec<String> = coll.indexes().list().into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["_id".to_string(), "name".to_string()]);

    coll.indexes().drop("name");
    assert_eq!(coll.indexes().list().len(), 1);

    // The built-in index survives a drop attempt.
    coll.indexes().drop("_id");
    assert_eq!(coll.indexes().list().len(), 1);
}
