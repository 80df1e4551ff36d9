use std::fs;

use serde_json::{json, Value};
use tempfile::TempDir;

use sparkify_core::pipeline::{
    create_tables, execute_phase, insert_tables, load_staging_tables, run_etl, CommitPolicy,
};
use sparkify_core::staging::{StagingSources, DEFAULT_REGION};
use sparkify_core::statement::Phase;
use sparkify_core::time::TimeParts;
use sparkify_core::transform;
use sparkify_core::warehouse::Warehouse;
use sparkify_duckdb::{duckdb, DuckDbWarehouse};

const ALL_TABLES: [&str; 7] = [
    "staging_events",
    "staging_songs",
    "songplays",
    "users",
    "songs",
    "artists",
    "time",
];

const TS_HEY_JUDE: i64 = 1_541_990_258_796;
const TS_UNKNOWN: i64 = 1_541_990_358_796;
const TS_LOGIN: i64 = 1_541_990_200_000;

const JSONPATHS: &str = r#"{
  "jsonpaths": [
    "$['artist']", "$['auth']", "$['firstName']", "$['gender']",
    "$['itemInSession']", "$['lastName']", "$['length']", "$['level']",
    "$['location']", "$['method']", "$['page']", "$['registration']",
    "$['sessionId']", "$['song']", "$['status']", "$['ts']",
    "$['userAgent']", "$['userId']"
  ]
}"#;

fn event(page: &str, user_id: &str, level: &str, song: Option<&str>, ts: i64) -> Value {
    let logged_in = !user_id.is_empty();
    json!({
        "artist": song.map(|_| "The Beatles"),
        "auth": if logged_in { "Logged In" } else { "Logged Out" },
        "firstName": logged_in.then_some("Lily"),
        "gender": logged_in.then_some("F"),
        "itemInSession": 0,
        "lastName": logged_in.then_some("Koch"),
        "length": song.map(|_| 431.0),
        "level": level,
        "location": "Chicago-Naperville-Elgin, IL-IN-WI",
        "method": if page == "NextSong" { "PUT" } else { "GET" },
        "page": page,
        "registration": logged_in.then_some(1_540_970_000_796.0),
        "sessionId": 818,
        "song": song,
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0",
        "userId": user_id
    })
}

fn song(song_id: &str, title: &str, artist_id: &str) -> Value {
    json!({
        "num_songs": 1,
        "artist_id": artist_id,
        "artist_latitude": null,
        "artist_longitude": null,
        "artist_location": "Liverpool",
        "artist_name": "The Beatles",
        "song_id": song_id,
        "title": title,
        "duration": 431.07,
        "year": 1968
    })
}

/// Lay out a local mirror of the object store: one NDJSON file of events,
/// one file per song, and the JSONPaths manifest.
fn write_mirror(events: &[Value], songs: &[Value]) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let bucket = dir.path().join("udacity-dend");
    fs::create_dir_all(bucket.join("log_data/2018/11")).expect("mkdir log_data");
    fs::create_dir_all(bucket.join("song_data/A/B")).expect("mkdir song_data");

    let lines: Vec<String> = events.iter().map(Value::to_string).collect();
    fs::write(
        bucket.join("log_data/2018/11/2018-11-12-events.json"),
        lines.join("\n"),
    )
    .expect("write events");
    for (i, s) in songs.iter().enumerate() {
        fs::write(bucket.join(format!("song_data/A/B/TR{i:04}.json")), s.to_string())
            .expect("write song");
    }
    fs::write(bucket.join("log_json_path.json"), JSONPATHS).expect("write manifest");
    dir
}

fn sources() -> StagingSources {
    StagingSources {
        log_data: "s3://udacity-dend/log_data".to_string(),
        log_jsonpath: "s3://udacity-dend/log_json_path.json".to_string(),
        song_data: "s3://udacity-dend/song_data".to_string(),
        iam_role: "arn:aws:iam::123456789012:role/dwhRole".to_string(),
        region: DEFAULT_REGION.to_string(),
    }
}

async fn count(wh: &DuckDbWarehouse, table: &str) -> i64 {
    let conn = wh.conn_for_test().await.expect("connection open");
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
        row.get(0)
    })
    .expect("count")
}

fn scenario_events() -> Vec<Value> {
    // Later play first in the file: ordering must come from ts, not file order.
    vec![
        event("NextSong", "15", "paid", Some("Unknown Song"), TS_UNKNOWN),
        event("NextSong", "15", "free", Some("Hey Jude"), TS_HEY_JUDE),
        event("Login", "", "free", None, TS_LOGIN),
    ]
}

async fn loaded_warehouse(mirror: &TempDir) -> DuckDbWarehouse {
    let mut wh = DuckDbWarehouse::open_in_memory(mirror.path()).expect("in-memory DuckDB");
    create_tables(&mut wh, CommitPolicy::PerStatement)
        .await
        .expect("create tables");
    wh
}

// ============================================================
// Schema Manager: all seven tables exist and are empty
// ============================================================
#[tokio::test]
async fn test_create_tables_leaves_seven_empty_tables() {
    let mirror = write_mirror(&[], &[]);
    let mut wh = loaded_warehouse(&mirror).await;

    {
        let conn = wh.conn_for_test().await.expect("connection open");
        let existing: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_name IN \
                 ('staging_events', 'staging_songs', 'songplays', 'users', 'songs', 'artists', 'time')",
                [],
                |row| row.get(0),
            )
            .expect("information_schema");
        assert_eq!(existing, 7);
    }
    for table in ALL_TABLES {
        assert_eq!(count(&wh, table).await, 0, "{table} must be empty");
    }

    // Re-running the reset is safe and empties populated tables.
    {
        let conn = wh.conn_for_test().await.expect("connection open");
        conn.execute_batch("INSERT INTO artists VALUES ('AR1', 'x', NULL, NULL, NULL)")
            .expect("seed artist");
    }
    let report = create_tables(&mut wh, CommitPolicy::PerStatement)
        .await
        .expect("second reset");
    assert_eq!(report.statements, 14);
    assert_eq!(count(&wh, "artists").await, 0);
}

// ============================================================
// End-to-end: 3 events (2 NextSong, 1 Login) + 1 matching song
// ============================================================
#[tokio::test]
async fn test_end_to_end_star_schema() {
    let mirror = write_mirror(
        &scenario_events(),
        &[song("SOHEYJUDE", "Hey Jude", "ARBEATLES")],
    );
    let mut wh = loaded_warehouse(&mirror).await;

    let reports = run_etl(&mut wh, &sources(), CommitPolicy::PerStatement)
        .await
        .expect("etl");
    assert_eq!(reports[0].phase, Phase::Staging);
    assert_eq!(reports[1].phase, Phase::Transform);

    assert_eq!(count(&wh, "staging_events").await, 3);
    assert_eq!(count(&wh, "staging_songs").await, 1);
    assert_eq!(count(&wh, "songplays").await, 2);
    assert_eq!(count(&wh, "time").await, 2);
    assert_eq!(count(&wh, "users").await, 1);
    assert_eq!(count(&wh, "songs").await, 1);
    assert_eq!(count(&wh, "artists").await, 1);

    let conn = wh.conn_for_test().await.expect("connection open");
    let mut stmt = conn
        .prepare(
            "SELECT CAST(start_time AS VARCHAR), user_id, level, song_id, artist_id, session_id \
             FROM songplays ORDER BY start_time",
        )
        .expect("prepare");
    let plays: Vec<(String, i32, String, Option<String>, Option<String>, i32)> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows");

    assert_eq!(
        plays[0],
        (
            "2018-11-12 02:37:38".to_string(),
            15,
            "free".to_string(),
            Some("SOHEYJUDE".to_string()),
            Some("ARBEATLES".to_string()),
            818
        )
    );
    // No catalog match: the play is kept with NULL song and artist.
    assert_eq!(plays[1].0, "2018-11-12 02:39:18");
    assert_eq!(plays[1].3, None);
    assert_eq!(plays[1].4, None);

    let user: (i32, String, String, Option<String>, String) = conn
        .query_row(
            "SELECT user_id, first_name, last_name, gender, level FROM users",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .expect("user");
    assert_eq!(
        user,
        (
            15,
            "Lily".to_string(),
            "Koch".to_string(),
            Some("F".to_string()),
            "paid".to_string()
        )
    );
}

// ============================================================
// time dimension decomposition matches UTC calendar parts
// ============================================================
#[tokio::test]
async fn test_time_row_matches_calendar_decomposition() {
    let mirror = write_mirror(
        &scenario_events(),
        &[song("SOHEYJUDE", "Hey Jude", "ARBEATLES")],
    );
    let mut wh = loaded_warehouse(&mirror).await;
    run_etl(&mut wh, &sources(), CommitPolicy::PerStatement)
        .await
        .expect("etl");

    let expected = TimeParts::from_epoch_millis(TS_HEY_JUDE).expect("in range");
    let conn = wh.conn_for_test().await.expect("connection open");
    let row: (i32, i32, i32, i32, i32, i32) = conn
        .query_row(
            "SELECT hour, day, week, month, year, weekday FROM \"time\" \
             WHERE start_time = CAST(?1 AS TIMESTAMP)",
            duckdb::params![expected.start_time.to_string()],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .expect("time row");

    assert_eq!(row, (2, 12, 46, 11, 2018, 1));
    assert_eq!(
        row,
        (
            expected.hour as i32,
            expected.day as i32,
            expected.week as i32,
            expected.month as i32,
            expected.year,
            expected.weekday as i32
        )
    );
}

// ============================================================
// Dimension inserts are idempotent without a staging reload
// ============================================================
#[tokio::test]
async fn test_dimension_inserts_twice_add_no_duplicates() {
    let mirror = write_mirror(
        &scenario_events(),
        &[
            song("SOHEYJUDE", "Hey Jude", "ARBEATLES"),
            song("SOLETITBE", "Let It Be", "ARBEATLES"),
        ],
    );
    let mut wh = loaded_warehouse(&mirror).await;
    run_etl(&mut wh, &sources(), CommitPolicy::PerStatement)
        .await
        .expect("etl");

    let before: Vec<i64> = {
        let mut v = Vec::new();
        for t in ["users", "songs", "artists", "time"] {
            v.push(count(&wh, t).await);
        }
        v
    };
    assert_eq!(before, vec![1, 2, 1, 2]);

    let dimensions: Vec<_> = transform::insert_statements(wh.dialect())
        .into_iter()
        .filter(|s| s.name != "insert songplays")
        .collect();
    let report = execute_phase(&mut wh, Phase::Transform, &dimensions, CommitPolicy::PerStatement)
        .await
        .expect("second dimension pass");
    assert_eq!(report.statements, 4);
    assert_eq!(report.rows, 0);

    for (t, n) in ["users", "songs", "artists", "time"].iter().zip(before) {
        assert_eq!(count(&wh, t).await, n, "{t} gained rows");
    }
}

// ============================================================
// users.level is the tier of the chronologically last play
// ============================================================
#[tokio::test]
async fn test_user_level_is_last_play_by_timestamp() {
    let events = vec![
        event("NextSong", "15", "free", Some("A"), TS_HEY_JUDE + 2_000),
        event("NextSong", "15", "paid", Some("B"), TS_HEY_JUDE),
        event("NextSong", "15", "free", Some("C"), TS_HEY_JUDE + 1_000),
        event("NextSong", "42", "free", Some("D"), TS_HEY_JUDE),
        event("NextSong", "42", "paid", Some("E"), TS_HEY_JUDE + 5_000),
        // Non-play events never decide the level.
        event("Upgrade", "42", "free", None, TS_HEY_JUDE + 9_000),
    ];
    let mirror = write_mirror(&events, &[song("SOA", "A", "ARONE")]);
    let mut wh = loaded_warehouse(&mirror).await;
    load_staging_tables(&mut wh, &sources(), CommitPolicy::PerStatement)
        .await
        .expect("staging");
    insert_tables(&mut wh, CommitPolicy::PerStatement)
        .await
        .expect("inserts");

    let conn = wh.conn_for_test().await.expect("connection open");
    let mut stmt = conn
        .prepare("SELECT user_id, level FROM users ORDER BY user_id")
        .expect("prepare");
    let levels: Vec<(i32, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows");
    assert_eq!(levels, vec![(15, "free".to_string()), (42, "paid".to_string())]);
}

// ============================================================
// Duplicate catalog titles still yield one play per event
// ============================================================
#[tokio::test]
async fn test_duplicate_titles_attribute_play_once() {
    let mirror = write_mirror(
        &[event("NextSong", "15", "free", Some("Dup"), TS_HEY_JUDE)],
        &[song("SOZZZ", "Dup", "ARTWO"), song("SOAAA", "Dup", "ARONE")],
    );
    let mut wh = loaded_warehouse(&mirror).await;
    run_etl(&mut wh, &sources(), CommitPolicy::PerStatement)
        .await
        .expect("etl");

    assert_eq!(count(&wh, "staging_songs").await, 2);
    assert_eq!(count(&wh, "songplays").await, 1);
    assert_eq!(count(&wh, "songs").await, 2);

    let conn = wh.conn_for_test().await.expect("connection open");
    let (song_id, artist_id): (String, String) = conn
        .query_row("SELECT song_id, artist_id FROM songplays", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .expect("songplay");
    assert_eq!((song_id.as_str(), artist_id.as_str()), ("SOAAA", "ARONE"));
}

// ============================================================
// Staging tables are reset on every run
// ============================================================
#[tokio::test]
async fn test_second_run_reloads_staging_and_appends_only_new_dimensions() {
    let mirror = write_mirror(
        &scenario_events(),
        &[song("SOHEYJUDE", "Hey Jude", "ARBEATLES")],
    );
    let mut wh = loaded_warehouse(&mirror).await;
    run_etl(&mut wh, &sources(), CommitPolicy::PerStatement)
        .await
        .expect("first run");

    // A new song arrives between runs.
    let bucket = mirror.path().join("udacity-dend");
    fs::write(
        bucket.join("song_data/A/B/TR9999.json"),
        song("SOLETITBE", "Let It Be", "ARBEATLES").to_string(),
    )
    .expect("write song");

    run_etl(&mut wh, &sources(), CommitPolicy::PerStatement)
        .await
        .expect("second run");

    assert_eq!(count(&wh, "staging_events").await, 3);
    assert_eq!(count(&wh, "staging_songs").await, 2);
    assert_eq!(count(&wh, "songs").await, 2);
    assert_eq!(count(&wh, "artists").await, 1);
    assert_eq!(count(&wh, "users").await, 1);
    assert_eq!(count(&wh, "time").await, 2);
}

// ============================================================
// Commit granularity on a failing transform
// ============================================================
/// Fails the songs insert on a file-backed warehouse, closes it and hands
/// back a fresh handle on the same file.
async fn run_with_broken_songs_table(policy: CommitPolicy) -> (TempDir, DuckDbWarehouse, String) {
    let mirror = write_mirror(
        &scenario_events(),
        &[song("SOHEYJUDE", "Hey Jude", "ARBEATLES")],
    );
    let path = mirror.path().join("sparkify.duckdb").display().to_string();
    let mut wh = DuckDbWarehouse::open(&path, mirror.path()).expect("file-backed DuckDB");
    create_tables(&mut wh, policy).await.expect("create tables");
    load_staging_tables(&mut wh, &sources(), policy)
        .await
        .expect("staging");
    {
        let conn = wh.conn_for_test().await.expect("connection open");
        conn.execute_batch("DROP TABLE songs").expect("drop songs");
    }
    let err = insert_tables(&mut wh, policy)
        .await
        .expect_err("songs insert must fail");
    wh.close().await.expect("close");

    let reopened = DuckDbWarehouse::open(&path, mirror.path()).expect("reopen");
    (mirror, reopened, err.statement().to_string())
}

#[tokio::test]
async fn test_per_statement_failure_keeps_earlier_inserts() {
    let (_mirror, wh, failed) = run_with_broken_songs_table(CommitPolicy::PerStatement).await;
    assert_eq!(failed, "insert songs");
    assert_eq!(count(&wh, "songplays").await, 2);
    assert_eq!(count(&wh, "users").await, 1);
    assert_eq!(count(&wh, "artists").await, 0);
}

#[tokio::test]
async fn test_per_phase_failure_discards_whole_transform() {
    let (_mirror, wh, failed) = run_with_broken_songs_table(CommitPolicy::PerPhase).await;
    assert_eq!(failed, "insert songs");
    assert_eq!(count(&wh, "songplays").await, 0);
    assert_eq!(count(&wh, "users").await, 0);
    // Staging was its own committed phase.
    assert_eq!(count(&wh, "staging_events").await, 3);
}

// ============================================================
// Bulk load errors name the statement
// ============================================================
#[tokio::test]
async fn test_missing_manifest_fails_events_copy() {
    let mirror = write_mirror(&scenario_events(), &[song("S", "T", "A")]);
    fs::remove_file(mirror.path().join("udacity-dend/log_json_path.json")).expect("rm manifest");
    let mut wh = loaded_warehouse(&mirror).await;

    let err = run_etl(&mut wh, &sources(), CommitPolicy::PerStatement)
        .await
        .expect_err("must fail");
    assert_eq!(err.phase(), Phase::Staging);
    assert_eq!(err.statement(), "copy staging_events");
    let chain = format!("{:#}", anyhow::Error::from(err));
    assert!(chain.contains("JSONPaths manifest"));
}
