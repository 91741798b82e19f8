use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};

use crate::error::{IndexerError, Result};
use crate::index::migrations;
use crate::index::{
    DefRow, FileRow, IndexCounts, RefKind, RefRow, RefStore, StoreOp, TableDump, UsageRow,
};

pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl SqliteIndex {
    /// Creates or migrates a file-backed store.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::configure_pragmas(&conn)?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.init_schema()?;
        Ok(index)
    }

    /// In-memory store used for the duration of a run.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_pragmas(&conn)?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.init_schema()?;
        Ok(index)
    }

    /// Opens an exported snapshot for reading. No migrations are run.
    pub fn open(snapshot: impl AsRef<Path>) -> Result<Self> {
        let snapshot = snapshot.as_ref();
        if !snapshot.is_file() {
            return Err(IndexerError::Index(format!(
                "Snapshot not found: {}",
                snapshot.display()
            )));
        }
        let conn = Connection::open_with_flags(snapshot, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        migrations::verify_schema_compatibility(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Configure SQLite PRAGMA settings.
    /// - foreign_keys: defs and usages must point at existing files and refs
    /// - MEMORY temp_store: speeds up temporary tables and sorts
    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;
        Ok(())
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        migrations::run_migrations(&conn)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| IndexerError::Index("Store connection lock poisoned".into()))
    }

    fn apply_on(conn: &Connection, op: &StoreOp) -> rusqlite::Result<()> {
        match op {
            StoreOp::UpsertFile(file) => {
                conn.execute(
                    "INSERT INTO files (id, path, content) VALUES (?1, ?2, ?3)
                     ON CONFLICT(path) DO NOTHING",
                    params![file.id, file.path, file.content],
                )?;
            }
            StoreOp::InsertRef(r) => {
                conn.execute(
                    "INSERT INTO refs (id, kind) VALUES (?1, ?2) ON CONFLICT(id) DO NOTHING",
                    params![r.id, r.kind.map(|k| k.as_str())],
                )?;
            }
            StoreOp::UpdateKind { ref_id, kind } => {
                conn.execute(
                    "UPDATE refs SET kind = ?2 WHERE id = ?1",
                    params![ref_id, kind.as_str()],
                )?;
            }
            StoreOp::InsertDef(def) => {
                conn.execute(
                    "INSERT INTO defs (id, fileId, name, refId, parentRefId, startPos, endPos)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO NOTHING",
                    params![
                        def.id,
                        def.file_id,
                        def.name,
                        def.ref_id,
                        def.parent_ref_id,
                        def.start_pos,
                        def.end_pos,
                    ],
                )?;
            }
            StoreOp::FillDefLocation {
                def_id,
                parent_ref_id,
                start_pos,
                end_pos,
            } => {
                conn.execute(
                    "UPDATE defs SET
                        parentRefId = COALESCE(parentRefId, ?2),
                        startPos = COALESCE(startPos, ?3),
                        endPos = COALESCE(endPos, ?4)
                     WHERE id = ?1",
                    params![def_id, parent_ref_id, start_pos, end_pos],
                )?;
            }
            StoreOp::InsertUsage(usage) => {
                conn.execute(
                    "INSERT INTO usages (id, fileId, refId, parentRefId, usedAs, startPos, endPos)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO NOTHING",
                    params![
                        usage.id,
                        usage.file_id,
                        usage.ref_id,
                        usage.parent_ref_id,
                        usage.used_as,
                        usage.start_pos,
                        usage.end_pos,
                    ],
                )?;
            }
            StoreOp::RewriteRefs { from, to } => {
                if from.is_empty() {
                    return Ok(());
                }
                let placeholders = (0..from.len())
                    .map(|i| format!("?{}", i + 2))
                    .collect::<Vec<_>>()
                    .join(", ");
                let values: Vec<&str> = std::iter::once(to.as_str())
                    .chain(from.iter().map(|s| s.as_str()))
                    .collect();

                for table in ["defs", "usages"] {
                    conn.execute(
                        &format!(
                            "UPDATE {} SET refId = ?1 WHERE refId IN ({})",
                            table, placeholders
                        ),
                        params_from_iter(values.iter()),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Writes the whole database to `path` as a standalone SQLite file.
    pub fn export_snapshot(&self, path: &Path) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("VACUUM INTO ?1", params![path.to_string_lossy()])
            .map_err(IndexerError::from_store)?;
        Ok(())
    }

    pub fn get_file_by_path(&self, path: &str) -> Result<Option<FileRow>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, path, content FROM files WHERE path = ?1",
                params![path],
                file_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_ref(&self, id: &str) -> Result<Option<RefRow>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, kind FROM refs WHERE id = ?1",
                params![id],
                ref_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_def(&self, id: &str) -> Result<Option<DefRow>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, fileId, name, refId, parentRefId, startPos, endPos
                 FROM defs WHERE id = ?1",
                params![id],
                def_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn defs_for_ref(&self, ref_id: &str) -> Result<Vec<DefRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, fileId, name, refId, parentRefId, startPos, endPos
             FROM defs WHERE refId = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![ref_id], def_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn usages_for_ref(&self, ref_id: &str) -> Result<Vec<UsageRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, fileId, refId, parentRefId, usedAs, startPos, endPos
             FROM usages WHERE refId = ?1 ORDER BY fileId, startPos",
        )?;
        let rows = stmt
            .query_map(params![ref_id], usage_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl RefStore for SqliteIndex {
    fn apply_batch(&self, ops: &[StoreOp]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for op in ops {
            Self::apply_on(&tx, op).map_err(|e| {
                tracing::debug!("Store op {} failed: {}", op.name(), e);
                IndexerError::from_store(e)
            })?;
        }
        tx.commit().map_err(IndexerError::from_store)?;
        Ok(())
    }

    fn dump(&self) -> Result<TableDump> {
        let conn = self.conn()?;

        let files = conn
            .prepare("SELECT id, path, content FROM files ORDER BY id")?
            .query_map([], file_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let refs = conn
            .prepare("SELECT id, kind FROM refs ORDER BY id")?
            .query_map([], ref_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let defs = conn
            .prepare(
                "SELECT id, fileId, name, refId, parentRefId, startPos, endPos
                 FROM defs ORDER BY id",
            )?
            .query_map([], def_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let usages = conn
            .prepare(
                "SELECT id, fileId, refId, parentRefId, usedAs, startPos, endPos
                 FROM usages ORDER BY id",
            )?
            .query_map([], usage_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(TableDump {
            files,
            refs,
            defs,
            usages,
        })
    }

    fn counts(&self) -> Result<IndexCounts> {
        let conn = self.conn()?;
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(IndexCounts {
            files: count("SELECT COUNT(*) FROM files")?,
            refs: count("SELECT COUNT(*) FROM refs")?,
            live_refs: count(
                "SELECT COUNT(*) FROM refs r
                 WHERE EXISTS (SELECT 1 FROM defs d WHERE d.refId = r.id)
                    OR EXISTS (SELECT 1 FROM usages u WHERE u.refId = r.id)",
            )?,
            defs: count("SELECT COUNT(*) FROM defs")?,
            usages: count("SELECT COUNT(*) FROM usages")?,
            placeholder_defs: count("SELECT COUNT(*) FROM defs WHERE startPos IS NULL")?,
        })
    }

    fn export_snapshot(&self, path: &Path) -> Result<()> {
        SqliteIndex::export_snapshot(self, path)
    }
}

fn file_from_row(row: &Row) -> rusqlite::Result<FileRow> {
    Ok(FileRow {
        id: row.get(0)?,
        path: row.get(1)?,
        content: row.get(2)?,
    })
}

fn ref_from_row(row: &Row) -> rusqlite::Result<RefRow> {
    let kind: Option<String> = row.get(1)?;
    Ok(RefRow {
        id: row.get(0)?,
        kind: kind.as_deref().and_then(RefKind::from_str),
    })
}

fn def_from_row(row: &Row) -> rusqlite::Result<DefRow> {
    Ok(DefRow {
        id: row.get(0)?,
        file_id: row.get(1)?,
        name: row.get(2)?,
        ref_id: row.get(3)?,
        parent_ref_id: row.get(4)?,
        start_pos: row.get(5)?,
        end_pos: row.get(6)?,
    })
}

fn usage_from_row(row: &Row) -> rusqlite::Result<UsageRow> {
    Ok(UsageRow {
        id: row.get(0)?,
        file_id: row.get(1)?,
        ref_id: row.get(2)?,
        parent_ref_id: row.get(3)?,
        used_as: row.get(4)?,
        start_pos: row.get(5)?,
        end_pos: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file(id: &str, path: &str) -> StoreOp {
        StoreOp::UpsertFile(FileRow {
            id: id.into(),
            path: path.into(),
            content: None,
        })
    }

    fn reference(id: &str, kind: Option<RefKind>) -> StoreOp {
        StoreOp::InsertRef(RefRow {
            id: id.into(),
            kind,
        })
    }

    fn def(id: &str, name: &str, ref_id: &str, start: Option<i64>) -> StoreOp {
        StoreOp::InsertDef(DefRow {
            id: id.into(),
            file_id: "f1".into(),
            name: name.into(),
            ref_id: ref_id.into(),
            parent_ref_id: None,
            start_pos: start,
            end_pos: start.map(|s| s + 3),
        })
    }

    fn usage(id: &str, ref_id: &str) -> StoreOp {
        StoreOp::InsertUsage(UsageRow {
            id: id.into(),
            file_id: "f1".into(),
            ref_id: ref_id.into(),
            parent_ref_id: None,
            used_as: "Btn".into(),
            start_pos: Some(1),
            end_pos: Some(4),
        })
    }

    #[test]
    fn test_upsert_file_keeps_first_row() {
        let index = SqliteIndex::in_memory().unwrap();
        index.apply_batch(&[file("f1", "a.ts")]).unwrap();
        index
            .apply_batch(&[StoreOp::UpsertFile(FileRow {
                id: "f1".into(),
                path: "a.ts".into(),
                content: Some("changed".into()),
            })])
            .unwrap();

        let row = index.get_file_by_path("a.ts").unwrap().unwrap();
        assert_eq!(row.content, None);
        assert_eq!(index.counts().unwrap().files, 1);
    }

    #[test]
    fn test_insert_ref_is_insert_if_absent() {
        let index = SqliteIndex::in_memory().unwrap();
        index
            .apply_batch(&[reference("r1", Some(RefKind::Function))])
            .unwrap();
        index.apply_batch(&[reference("r1", None)]).unwrap();

        let row = index.get_ref("r1").unwrap().unwrap();
        assert_eq!(row.kind, Some(RefKind::Function));
    }

    #[test]
    fn test_update_kind() {
        let index = SqliteIndex::in_memory().unwrap();
        index
            .apply_batch(&[
                reference("r1", None),
                StoreOp::UpdateKind {
                    ref_id: "r1".into(),
                    kind: RefKind::Component,
                },
            ])
            .unwrap();
        assert_eq!(
            index.get_ref("r1").unwrap().unwrap().kind,
            Some(RefKind::Component)
        );
    }

    #[test]
    fn test_fill_def_location_only_fills_missing_columns() {
        let index = SqliteIndex::in_memory().unwrap();
        index
            .apply_batch(&[
                file("f1", "a.ts"),
                reference("r1", None),
                reference("p1", None),
                def("d1", "Btn", "r1", None),
            ])
            .unwrap();

        let fill = |start: i64| StoreOp::FillDefLocation {
            def_id: "d1".into(),
            parent_ref_id: Some("p1".into()),
            start_pos: start,
            end_pos: start + 3,
        };
        index.apply_batch(&[fill(10)]).unwrap();
        index.apply_batch(&[fill(50)]).unwrap();

        let row = index.get_def("d1").unwrap().unwrap();
        assert_eq!(row.start_pos, Some(10));
        assert_eq!(row.end_pos, Some(13));
        assert_eq!(row.parent_ref_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_rewrite_refs_moves_defs_and_usages() {
        let index = SqliteIndex::in_memory().unwrap();
        index
            .apply_batch(&[
                file("f1", "a.ts"),
                reference("r1", None),
                reference("r2", None),
                reference("r3", None),
                reference("keep", None),
                def("d1", "A", "r1", Some(0)),
                def("d2", "B", "r2", Some(10)),
                def("d3", "C", "keep", Some(20)),
                usage("u1", "r2"),
            ])
            .unwrap();

        index
            .apply_batch(&[StoreOp::RewriteRefs {
                from: vec!["r1".into(), "r2".into()],
                to: "r3".into(),
            }])
            .unwrap();

        assert_eq!(index.defs_for_ref("r3").unwrap().len(), 2);
        assert_eq!(index.usages_for_ref("r3").unwrap().len(), 1);
        assert_eq!(index.defs_for_ref("keep").unwrap().len(), 1);

        let counts = index.counts().unwrap();
        assert_eq!(counts.refs, 4);
        assert_eq!(counts.live_refs, 2);
    }

    #[test]
    fn test_foreign_key_violation_is_store_integrity() {
        let index = SqliteIndex::in_memory().unwrap();
        index.apply_batch(&[file("f1", "a.ts")]).unwrap();

        let err = index
            .apply_batch(&[def("d1", "Ghost", "missing-ref", Some(0))])
            .unwrap_err();
        assert!(matches!(err, IndexerError::StoreIntegrity(_)));
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let index = SqliteIndex::in_memory().unwrap();
        let result = index.apply_batch(&[
            file("f1", "a.ts"),
            reference("r1", None),
            def("d1", "Ghost", "missing-ref", Some(0)),
        ]);
        assert!(result.is_err());
        assert_eq!(index.counts().unwrap(), IndexCounts::default());
    }

    #[test]
    fn test_export_and_reopen_snapshot() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("refs.db");

        let index = SqliteIndex::in_memory().unwrap();
        index
            .apply_batch(&[
                file("f1", "a.ts"),
                reference("r1", Some(RefKind::Constant)),
                def("d1", "PI", "r1", Some(6)),
                usage("u1", "r1"),
            ])
            .unwrap();
        index.export_snapshot(&out).unwrap();

        let reopened = SqliteIndex::open(&out).unwrap();
        assert_eq!(reopened.dump().unwrap(), index.dump().unwrap());
    }

    #[test]
    fn test_open_missing_snapshot() {
        let dir = TempDir::new().unwrap();
        assert!(SqliteIndex::open(dir.path().join("nope.db")).is_err());
    }
}
