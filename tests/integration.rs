//! Integration tests for rset
//!
//! Exercises resultsets end to end: building, compiling, running against
//! storage and persisting through a database directory.

use async_trait::async_trait;
use rset::{Config, Database, Error, MemoryStorage, ResultSet, ResultSetOptions, Row, Storage, Value};
use rsql::{BinaryOp, DeleteSpec, DialectKind, Expr, InsertSpec, Literal, OrderBy, SelectSpec, UpdateSpec};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Storage wrapper that counts how often it is asked for rows
struct CountingStorage {
    inner: MemoryStorage,
    selects: AtomicUsize,
}

impl CountingStorage {
    fn selects(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for CountingStorage {
    async fn select(&self, spec: &SelectSpec) -> rset::Result<Vec<Row>> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.inner.select(spec).await
    }

    async fn count(&self, spec: &SelectSpec) -> rset::Result<u64> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.inner.count(spec).await
    }

    async fn insert(&self, spec: &InsertSpec) -> rset::Result<Row> {
        self.inner.insert(spec).await
    }

    async fn update(&self, spec: &UpdateSpec) -> rset::Result<u64> {
        self.inner.update(spec).await
    }

    async fn delete(&self, spec: &DeleteSpec) -> rset::Result<u64> {
        self.inner.delete(spec).await
    }
}

/// Helper to build a seeded sample database in memory
async fn setup(options: ResultSetOptions) -> (Arc<CountingStorage>, Database) {
    let registry = rset::demo::registry().expect("sample schema");
    let inner = MemoryStorage::new(&registry);
    rset::demo::seed(&inner).await.expect("seed");
    let storage = Arc::new(CountingStorage {
        inner,
        selects: AtomicUsize::new(0),
    });
    let config = Config {
        dialect: options.dialect,
        trace_sql: options.trace_sql,
        default_rows: options.default_rows,
        cursor_batch_size: options.cursor_batch_size,
        ..Default::default()
    };
    let db = Database::with_storage(config, registry, storage.clone());
    (storage, db)
}

async fn albums() -> ResultSet {
    let (_, db) = setup(ResultSetOptions::default()).await;
    db.resultset("Album").expect("Album source")
}

fn titles(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .filter_map(|r| r.get("title").and_then(Value::as_str).map(str::to_string))
        .collect()
}

// =============================================================================
// Building
// =============================================================================

#[tokio::test]
async fn test_refinement_never_mutates_the_original() {
    let rs = albums().await;
    let before = rs.as_query().unwrap();

    let refined = rs
        .search(Expr::eq("year", 1995i64))
        .order_by([OrderBy::desc("title")])
        .join("artist")
        .rows(1)
        .page(2);

    assert_eq!(rs.as_query().unwrap(), before);
    assert_ne!(refined.as_query().unwrap(), before);
    assert_eq!(rs.count().await.unwrap(), 4);
}

#[tokio::test]
async fn test_chained_searches_equal_one_conjunction() {
    let rs = albums().await;

    let chained = rs
        .search_str("year > ?", &[Value::Int(1992)])
        .unwrap()
        .search_str("artist = ?", &[Value::Int(1)])
        .unwrap();
    let combined = rs
        .search_str("year > ? AND artist = ?", &[Value::Int(1992), Value::Int(1)])
        .unwrap();

    assert_eq!(chained.as_query().unwrap(), combined.as_query().unwrap());
    assert_eq!(
        titles(&chained.order_by([OrderBy::asc("year")]).all().await.unwrap()),
        vec!["Parklife", "The Great Escape"]
    );
}

#[tokio::test]
async fn test_bind_order_follows_placeholders_in_every_dialect() {
    for (dialect, first, second) in [
        (DialectKind::Postgres, "$1", "$2"),
        (DialectKind::Sqlite, "?", "?"),
        (DialectKind::Mysql, "?", "?"),
    ] {
        let (_, db) = setup(ResultSetOptions {
            dialect,
            ..Default::default()
        })
        .await;
        let q = db
            .resultset("Album")
            .unwrap()
            .join("artist")
            .search_str("artist.name = ?", &[Value::from("Pulp")])
            .unwrap()
            .search_str("year BETWEEN ? AND ?", &[Value::Int(1990), Value::Int(1999)])
            .unwrap()
            .as_query()
            .unwrap();

        assert_eq!(
            q.binds,
            vec![Literal::String("Pulp".into()), Literal::Int(1990), Literal::Int(1999)],
            "{:?}",
            dialect
        );
        let a = q.sql.find(first).expect("first placeholder");
        let b = q.sql.rfind(second).expect("last placeholder");
        assert!(a < b, "{}", q.sql);
    }
}

#[tokio::test]
async fn test_errors_surface_only_when_built() {
    let rs = albums().await;
    let broken = rs.columns(["nope"]).order_by([OrderBy::asc("missing")]);
    assert!(matches!(broken.as_query(), Err(Error::UnknownColumn { .. })));
    assert!(matches!(broken.all().await, Err(Error::UnknownColumn { .. })));
}

// =============================================================================
// Laziness
// =============================================================================

#[tokio::test]
async fn test_cursor_runs_one_query_on_first_next() {
    let (storage, db) = setup(ResultSetOptions::default()).await;
    let rs = db.resultset("Track").unwrap().search(Expr::cmp("position", BinaryOp::Gt, 0i64));
    let _ = rs.order_by([OrderBy::asc("title")]).rows(3);
    assert_eq!(storage.selects(), 0);

    let mut cursor = rs.cursor();
    assert_eq!(storage.selects(), 0);

    assert!(cursor.next().await.unwrap().is_some());
    assert_eq!(storage.selects(), 1);

    while cursor.next().await.unwrap().is_some() {}
    assert_eq!(storage.selects(), 1);
}

#[tokio::test]
async fn test_batched_cursor_queries_per_window() {
    let (storage, db) = setup(ResultSetOptions {
        cursor_batch_size: Some(4),
        ..Default::default()
    })
    .await;
    let rows = db
        .resultset("Track")
        .unwrap()
        .order_by([OrderBy::asc("trackid")])
        .cursor()
        .collect_all()
        .await
        .unwrap();

    assert_eq!(rows.len(), 6);
    // a full window of 4, then a short one of 2
    assert_eq!(storage.selects(), 2);
}

// =============================================================================
// Paging and counting
// =============================================================================

#[tokio::test]
async fn test_pages_cover_the_result_exactly_once() {
    let rs = albums().await.order_by([OrderBy::asc("albumid")]);
    let total = rs.count().await.unwrap();

    let mut seen = Vec::new();
    let pager = rs.rows(3).page(1).pager().await.unwrap();
    for page in 1..=pager.last_page() {
        let paged = rs.rows(3).page(page);
        let rows = paged.all().await.unwrap();
        assert_eq!(paged.count().await.unwrap(), rows.len() as u64);
        assert_eq!(paged.pager().await.unwrap().entries_on_this_page(), rows.len() as u64);
        seen.extend(rows);
    }

    assert_eq!(seen.len() as u64, total);
    assert_eq!(seen, rs.all().await.unwrap());
    assert!(rs.rows(3).page(3).all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_distinct_count_through_join() {
    let (_, db) = setup(ResultSetOptions::default()).await;
    let artists = db
        .resultset("Album")
        .unwrap()
        .join("artist")
        .columns(["artist.name"])
        .distinct(true);
    assert_eq!(artists.count().await.unwrap(), 2);
}

// =============================================================================
// Relationships
// =============================================================================

#[tokio::test]
async fn test_related_chains_across_relationships() {
    let (_, db) = setup(ResultSetOptions::default()).await;
    let pulp = db.resultset("Artist").unwrap().search(Expr::eq("name", "Pulp"));

    let tracks = pulp
        .related("albums")
        .unwrap()
        .related("tracks")
        .unwrap()
        .order_by([OrderBy::asc("trackid")]);
    assert_eq!(
        titles(&tracks.all().await.unwrap()),
        vec!["Love Is Blind", "Common People", "Disco 2000"]
    );

    let elastica = db.resultset("Artist").unwrap().search(Expr::eq("name", "Elastica"));
    assert_eq!(elastica.related("albums").unwrap().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_left_join_keeps_unmatched_rows() {
    let (_, db) = setup(ResultSetOptions::default()).await;
    let rows = db
        .resultset("Artist")
        .unwrap()
        .join("albums")
        .columns(["name", "albums.title"])
        .search(Expr::IsNull {
            expr: Box::new(Expr::col("albums.title")),
            negated: false,
        })
        .all()
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&Value::from("Elastica")));
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn test_create_update_delete_roundtrip() {
    let (_, db) = setup(ResultSetOptions::default()).await;
    let artists = db.resultset("Artist").unwrap();

    let suede = artists.create(Row::new().with("name", "Suede")).await.unwrap();
    assert_eq!(suede.get("artistid"), Some(&Value::Int(4)));
    assert_eq!(suede.get("rank"), Some(&Value::Int(13)));

    let by_suede = db.resultset("Album").unwrap().search(Expr::eq("artist", 4i64));
    let album = by_suede
        .create(Row::new().with("title", "Dog Man Star").with("year", 1994i64))
        .await
        .unwrap();
    assert_eq!(album.get("artist"), Some(&Value::Int(4)));

    let changed = artists
        .search(Expr::eq("name", "Suede"))
        .update(Row::new().with("rank", 7i64))
        .await
        .unwrap();
    assert_eq!(changed, 1);
    let found = artists.find(&[Value::Int(4)]).await.unwrap().unwrap();
    assert_eq!(found.get("rank"), Some(&Value::Int(7)));

    assert_eq!(by_suede.delete().await.unwrap(), 1);
    assert_eq!(db.resultset("Album").unwrap().count().await.unwrap(), 4);
}

#[tokio::test]
async fn test_write_validation() {
    let rs = albums().await;
    assert!(matches!(
        rs.create(Row::new().with("title", "No Artist")).await,
        Err(Error::MissingRequiredColumn { .. })
    ));
    assert!(matches!(
        rs.update(Row::new().with("colour", "red")).await,
        Err(Error::UnknownColumn { .. })
    ));
    assert!(matches!(
        rs.update(Row::new().with("year", "soon")).await,
        Err(Error::TypeMismatch { .. })
    ));
    assert_eq!(rs.count().await.unwrap(), 4);
}

// =============================================================================
// Database directory
// =============================================================================

#[tokio::test]
async fn test_init_then_open_persists_changes() {
    let tmp = TempDir::new().expect("Failed to create temp dir");

    let db = Database::init(tmp.path()).await.expect("init");
    assert!(tmp.path().join("rset.yaml").exists());
    assert!(tmp.path().join("schema/Artist.yaml").exists());
    assert!(tmp.path().join("data/album.yaml").exists());
    assert_eq!(
        db.sources().iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        vec!["Album", "Artist", "Track"]
    );

    let deleted = db
        .resultset("Track")
        .unwrap()
        .search(Expr::eq("album", 4i64))
        .delete()
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    db.flush().await.unwrap();

    let config = Config::load(&tmp.path().join("rset.yaml")).unwrap();
    let reopened = Database::open(config).await.expect("open");
    assert_eq!(reopened.resultset("Track").unwrap().count().await.unwrap(), 4);

    // init on an existing directory keeps the data
    let again = Database::init(tmp.path()).await.unwrap();
    assert_eq!(again.resultset("Track").unwrap().count().await.unwrap(), 4);
}

#[tokio::test]
async fn test_config_file_drives_resultset_options() {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    Database::init(tmp.path()).await.unwrap();
    std::fs::write(
        tmp.path().join("rset.yaml"),
        "dialect: mysql\ndefault_rows: 3\n",
    )
    .unwrap();

    let config = Config::load(&tmp.path().join("rset.yaml")).unwrap();
    let db = Database::open(config).await.unwrap();
    let rs = db.resultset("Album").unwrap();
    assert_eq!(rs.options().dialect, DialectKind::Mysql);

    let q = rs.page(1).as_query().unwrap();
    assert!(q.sql.contains('`'), "{}", q.sql);
    assert!(q.sql.ends_with("LIMIT 3"), "{}", q.sql);

    assert!(matches!(db.resultset("Nope"), Err(Error::SourceNotFound { .. })));
}

#[tokio::test]
async fn test_init_reports_unwritable_root() {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let blocker = tmp.path().join("plain-file");
    std::fs::write(&blocker, "not a directory").unwrap();

    let root = blocker.join("db");
    match Database::init(&root).await {
        Err(Error::FileWriteError { path, .. }) => assert_eq!(path, root),
        other => panic!("expected FileWriteError, got {:?}", other.map(|_| ())),
    }
}
