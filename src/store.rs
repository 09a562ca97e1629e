//! SQLite source and destination for the filter pass.
//!
//! The source is read through one forward-only statement. The destination
//! receives insert/delete batches, each inside its own transaction.
//!
//! ## Destination schema
//!
//! ```sql
//! CREATE TABLE lyrics (
//!     id            INTEGER PRIMARY KEY,
//!     track_name    TEXT NOT NULL,
//!     artist_name   TEXT NOT NULL,
//!     album_name    TEXT,
//!     duration      REAL,
//!     synced_lyrics TEXT NOT NULL,
//!     lang          TEXT NOT NULL
//! );
//! ```

use anyhow::{Context, Result};
use rusqlite::{params, Connection, MappedRows, Row, Statement};
use std::path::Path;

use crate::engine::RecordSink;
use crate::models::{Lang, Record, WriteOp};
use crate::quality::MIN_DURATION_SEC;

/// Maps one source row to a record.
pub type RowMapper = fn(&Row<'_>) -> rusqlite::Result<Record>;

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        id: row.get(0)?,
        track_name: row.get(1)?,
        artist_name: row.get(2)?,
        album_name: row.get(3)?,
        duration: row.get(4)?,
        lyrics_body: row.get(5)?,
    })
}

// ============================================================================
// Source
// ============================================================================

/// Read-only LRCLIB lyrics table.
pub struct SqliteSource {
    conn: Connection,
    prefilter: bool,
}

impl SqliteSource {
    /// Open the source dump tuned for one sequential scan.
    /// With `prefilter`, rows shorter than the duration floor never leave SQLite.
    pub fn open(path: &Path, prefilter: bool) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open source database")?;
        conn.execute_batch(
            "PRAGMA mmap_size = 8589934592;
             PRAGMA cache_size = -1000000;
             PRAGMA temp_store = MEMORY;",
        )?;
        Ok(Self::from_connection(conn, prefilter))
    }

    pub fn from_connection(conn: Connection, prefilter: bool) -> Self {
        Self { conn, prefilter }
    }

    fn where_clause(&self) -> String {
        if self.prefilter {
            format!(" WHERE duration IS NULL OR duration >= {}", MIN_DURATION_SEC)
        } else {
            String::new()
        }
    }

    /// Rows in the whole table.
    pub fn count_all(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM lyrics", [], |row| row.get(0))
            .context("Failed to count source rows")?;
        Ok(count as u64)
    }

    /// Rows the cursor will yield.
    pub fn count(&self) -> Result<u64> {
        if !self.prefilter {
            return self.count_all();
        }
        let sql = format!("SELECT COUNT(*) FROM lyrics{}", self.where_clause());
        let count: i64 = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .context("Failed to count source rows")?;
        Ok(count as u64)
    }

    /// Prepare the scan. Call [`RecordCursor::records`] to start reading.
    pub fn prepare(&self) -> Result<RecordCursor<'_>> {
        let sql = format!(
            "SELECT id, track_name, artist_name, album_name, duration, synced_lyrics
             FROM lyrics{}
             ORDER BY id",
            self.where_clause()
        );
        let stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare source query")?;
        Ok(RecordCursor { stmt })
    }
}

/// Prepared source scan. Not restartable once consumed; prepare a new one.
pub struct RecordCursor<'conn> {
    stmt: Statement<'conn>,
}

impl RecordCursor<'_> {
    /// Lazy, forward-only sequence of records in id order.
    /// A row that cannot be decoded (e.g. invalid UTF-8) yields an error.
    pub fn records(&mut self) -> Result<MappedRows<'_, RowMapper>> {
        let rows = self.stmt.query_map([], row_to_record as RowMapper)?;
        Ok(rows)
    }
}

// ============================================================================
// Destination
// ============================================================================

/// Output database receiving accepted records.
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Create the output database. The file must not already contain a `lyrics` table.
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to create output database")?;
        // WAL rather than journal_mode=OFF: a failed batch must roll back cleanly
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -500000;
             PRAGMA temp_store = MEMORY;",
        )?;
        Self::from_connection(conn)
    }

    /// Wrap an open connection and create the schema.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE lyrics (
                id            INTEGER PRIMARY KEY,
                track_name    TEXT NOT NULL,
                artist_name   TEXT NOT NULL,
                album_name    TEXT,
                duration      REAL,
                synced_lyrics TEXT NOT NULL,
                lang          TEXT NOT NULL
            );",
        )
        .context("Failed to create lyrics table")?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Lookup indexes and planner statistics, once the pass is complete.
    pub fn build_indexes(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE INDEX idx_artist_track ON lyrics(artist_name, track_name);
                 CREATE INDEX idx_lang ON lyrics(lang);
                 ANALYZE;",
            )
            .context("Failed to build output indexes")?;
        Ok(())
    }

    /// Reclaim pages freed by superseded rows.
    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM;").context("Failed to vacuum output")?;
        Ok(())
    }

    pub fn row_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM lyrics", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Accepted rows per language, in `Lang::ALL` order.
    pub fn lang_counts(&self) -> Result<Vec<(Lang, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM lyrics WHERE lang = ?1")?;
        Lang::ALL
            .iter()
            .map(|&lang| {
                let count: i64 = stmt.query_row([lang.as_str()], |row| row.get(0))?;
                Ok::<_, anyhow::Error>((lang, count as u64))
            })
            .collect()
    }
}

impl RecordSink for SqliteSink {
    fn apply(&mut self, ops: &[WriteOp]) -> Result<()> {
        // Dropping the transaction on error rolls the whole batch back
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO lyrics (id, track_name, artist_name, album_name, duration, synced_lyrics, lang)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            let mut delete = tx.prepare_cached("DELETE FROM lyrics WHERE id = ?1")?;

            for op in ops {
                match op {
                    WriteOp::Insert(accepted) => {
                        let r = &accepted.record;
                        insert
                            .execute(params![
                                r.id,
                                r.track_name,
                                r.artist_name,
                                r.album_name,
                                r.duration,
                                r.lyrics_body,
                                accepted.lang.as_str(),
                            ])
                            .with_context(|| format!("Failed to insert record {}", r.id))?;
                    }
                    WriteOp::Delete(id) => {
                        delete
                            .execute([id])
                            .with_context(|| format!("Failed to delete record {}", id))?;
                    }
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AcceptedRecord;

    fn source_conn(rows: &[(i64, &str, &str, Option<f64>, &str)]) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE lyrics (
                id INTEGER PRIMARY KEY,
                track_name TEXT NOT NULL,
                artist_name TEXT NOT NULL,
                album_name TEXT,
                duration REAL,
                synced_lyrics TEXT NOT NULL
            );",
        )
        .unwrap();
        for (id, track, artist, duration, lyrics) in rows {
            conn.execute(
                "INSERT INTO lyrics VALUES (?1, ?2, ?3, NULL, ?4, ?5)",
                params![id, track, artist, duration, lyrics],
            )
            .unwrap();
        }
        conn
    }

    fn accepted(id: i64, lang: Lang) -> AcceptedRecord {
        AcceptedRecord {
            record: Record {
                id,
                track_name: format!("Track {}", id),
                artist_name: "Artist".to_string(),
                album_name: None,
                duration: Some(180.0),
                lyrics_body: "[00:01.00]la la".to_string(),
            },
            lang,
        }
    }

    fn sink() -> SqliteSink {
        SqliteSink::from_connection(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn test_source_prefilter_counts() {
        let conn = source_conn(&[
            (1, "a", "x", Some(30.0), "l"),
            (2, "b", "x", Some(60.0), "l"),
            (3, "c", "x", None, "l"),
            (4, "d", "x", Some(59.99), "l"),
        ]);
        let filtered = SqliteSource::from_connection(conn, true);
        assert_eq!(filtered.count_all().unwrap(), 4);
        assert_eq!(filtered.count().unwrap(), 2);

        let unfiltered = SqliteSource::from_connection(filtered.conn, false);
        assert_eq!(unfiltered.count().unwrap(), 4);
    }

    #[test]
    fn test_cursor_yields_records_in_id_order() {
        let conn = source_conn(&[
            (7, "Later", "B", Some(120.0), "two"),
            (3, "Earlier", "A", None, "one"),
            (5, "Short", "C", Some(10.0), "skip"),
        ]);
        let source = SqliteSource::from_connection(conn, true);
        let mut cursor = source.prepare().unwrap();
        let records: Vec<Record> = cursor
            .records()
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 3);
        assert_eq!(records[0].duration, None);
        assert_eq!(records[0].lyrics_body, "one");
        assert_eq!(records[1].id, 7);
        assert_eq!(records[1].track_name, "Later");
    }

    #[test]
    fn test_cursor_surfaces_bad_row() {
        let conn = source_conn(&[(1, "a", "x", None, "l")]);
        // A blob where text is expected cannot become a record
        conn.execute("UPDATE lyrics SET synced_lyrics = X'FFFE' WHERE id = 1", [])
            .unwrap();
        let source = SqliteSource::from_connection(conn, false);
        let mut cursor = source.prepare().unwrap();
        let first = cursor.records().unwrap().next().unwrap();
        assert!(first.is_err());
    }

    #[test]
    fn test_sink_applies_inserts_and_deletes() {
        let mut sink = sink();
        sink.apply(&[
            WriteOp::Insert(accepted(1, Lang::En)),
            WriteOp::Insert(accepted(2, Lang::Ja)),
            WriteOp::Delete(1),
            WriteOp::Insert(accepted(3, Lang::Ja)),
        ])
        .unwrap();
        assert_eq!(sink.row_count().unwrap(), 2);

        let lang: String = sink
            .connection()
            .query_row("SELECT lang FROM lyrics WHERE id = 2", [], |r| r.get(0))
            .unwrap();
        assert_eq!(lang, "ja");
        assert_eq!(
            sink.lang_counts().unwrap(),
            vec![(Lang::Ja, 2), (Lang::Ko, 0), (Lang::En, 0)]
        );
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let mut sink = sink();
        sink.apply(&[WriteOp::Insert(accepted(1, Lang::En))]).unwrap();

        // Duplicate primary key fails halfway through the batch
        let result = sink.apply(&[
            WriteOp::Insert(accepted(2, Lang::En)),
            WriteOp::Delete(1),
            WriteOp::Insert(accepted(2, Lang::En)),
        ]);
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to insert record 2"));

        // Earlier committed batch intact, nothing from the failed one applied
        assert_eq!(sink.row_count().unwrap(), 1);
        let id: i64 = sink
            .connection()
            .query_row("SELECT id FROM lyrics", [], |r| r.get(0))
            .unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_build_indexes() {
        let mut sink = sink();
        sink.apply(&[WriteOp::Insert(accepted(1, Lang::Ko))]).unwrap();
        sink.build_indexes().unwrap();
        let names: Vec<String> = sink
            .connection()
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' ORDER BY name")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(names, vec!["idx_artist_track", "idx_lang"]);
    }
}
