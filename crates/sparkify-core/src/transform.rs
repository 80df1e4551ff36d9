//! Transform/Insert statements: staging rows into the star schema.
//!
//! Dimensions are deduplicated with an anti-join against the rows already in
//! the target (`LEFT JOIN target ... WHERE target.key IS NULL`) rather than an
//! upsert, so every run only appends. Each insert scans the whole target
//! table.

use crate::statement::{Dialect, Phase, Statement};

/// Page action recorded when a user plays a song.
pub const NEXT_SONG: &str = "NextSong";

/// Expression converting a millisecond epoch column to a `TIMESTAMP`,
/// truncated to whole seconds.
pub fn epoch_millis_to_timestamp(dialect: Dialect, column: &str) -> String {
    match dialect {
        Dialect::Redshift => format!("TIMESTAMP 'epoch' + {column}/1000 * INTERVAL '1 second'"),
        Dialect::DuckDb => format!("epoch_ms({column} - {column} % 1000)"),
    }
}

/// One play row per `NextSong` event. When several catalog songs share the
/// played title, the one with the lowest `song_id` is attributed.
pub fn songplay_insert(dialect: Dialect) -> String {
    let start_time = epoch_millis_to_timestamp(dialect, "se.ts");
    format!(
        r#"INSERT INTO songplays (
  start_time, user_id, level, song_id, artist_id, session_id, location, user_agent
)
SELECT {start_time} AS start_time,
       se.userId AS user_id,
       se.level,
       ss.song_id,
       ss.artist_id,
       se.sessionId AS session_id,
       se.location,
       se.userAgent AS user_agent
FROM staging_events AS se
  LEFT JOIN (
    SELECT title, song_id, artist_id,
           ROW_NUMBER() OVER (PARTITION BY title ORDER BY song_id, artist_id) AS title_rank
    FROM staging_songs
  ) AS ss ON ss.title = se.song AND ss.title_rank = 1
WHERE se.page = '{NEXT_SONG}'"#
    )
}

/// Users of play events; `level` is the tier of each user's chronologically
/// last play.
pub fn user_insert() -> String {
    format!(
        r#"INSERT INTO users (user_id, first_name, last_name, gender, level)
SELECT DISTINCT
       se.userId AS user_id,
       se.firstName AS first_name,
       se.lastName AS last_name,
       se.gender AS gender,
       LAST_VALUE(se.level) OVER (
         PARTITION BY se.userId ORDER BY se.ts
         ROWS BETWEEN UNBOUNDED PRECEDING AND UNBOUNDED FOLLOWING
       ) AS level
FROM staging_events AS se
  LEFT JOIN users ON users.user_id = se.userId
WHERE se.page = '{NEXT_SONG}'
  AND users.user_id IS NULL"#
    )
}

pub fn song_insert() -> String {
    r#"INSERT INTO songs (song_id, title, artist_id, year, duration)
SELECT DISTINCT
       ss.song_id,
       ss.title,
       ss.artist_id,
       ss.year,
       ss.duration
FROM staging_songs AS ss
  LEFT JOIN songs ON songs.song_id = ss.song_id
WHERE songs.song_id IS NULL"#
        .to_string()
}

pub fn artist_insert() -> String {
    r#"INSERT INTO artists (artist_id, name, location, latitude, longitude)
SELECT DISTINCT
       ss.artist_id,
       ss.artist_name AS name,
       ss.artist_location AS location,
       ss.artist_latitude AS latitude,
       ss.artist_longitude AS longitude
FROM staging_songs AS ss
  LEFT JOIN artists ON artists.artist_id = ss.artist_id
WHERE artists.artist_id IS NULL"#
        .to_string()
}

pub fn time_insert(dialect: Dialect) -> String {
    let ts = epoch_millis_to_timestamp(dialect, "se.ts");
    format!(
        r#"INSERT INTO "time" (start_time, hour, day, week, month, year, weekday)
SELECT DISTINCT
       {ts} AS start_time,
       EXTRACT(HOUR FROM {ts}) AS hour,
       EXTRACT(DAY FROM {ts}) AS day,
       EXTRACT(WEEK FROM {ts}) AS week,
       EXTRACT(MONTH FROM {ts}) AS month,
       EXTRACT(YEAR FROM {ts}) AS year,
       EXTRACT(DOW FROM {ts}) AS weekday
FROM staging_events AS se
  LEFT JOIN "time" ON "time".start_time = {ts}
WHERE se.page = '{NEXT_SONG}'
  AND "time".start_time IS NULL"#
    )
}

/// The five inserts in run order: fact table first, then users, songs,
/// artists and time.
pub fn insert_statements(dialect: Dialect) -> Vec<Statement> {
    vec![
        Statement::sql(Phase::Transform, "insert songplays", songplay_insert(dialect)),
        Statement::sql(Phase::Transform, "insert users", user_insert()),
        Statement::sql(Phase::Transform, "insert songs", song_insert()),
        Statement::sql(Phase::Transform, "insert artists", artist_insert()),
        Statement::sql(Phase::Transform, "insert time", time_insert(dialect)),
    ]
}
