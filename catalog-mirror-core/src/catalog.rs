//! Reads the deduplicated image reference set out of an extracted catalog database.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use crate::{Error, ImageReferenceSet, Result};

/// Opens `path` read-only and returns every non-empty `related_image.image`
/// and `operatorbundle.bundlepath` value, deduplicated.
///
/// A row that fails to scan is collected rather than aborting the whole
/// read; the caller receives the partial set alongside the row errors.
pub fn read_images(path: &Path) -> Result<(ImageReferenceSet, Vec<String>)> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| Error::OpenFailed(e.to_string()))?;

    check_schema(&conn)?;

    let mut images = ImageReferenceSet::new();
    let mut row_errors = Vec::new();

    collect_column(
        &conn,
        "SELECT image FROM related_image",
        &mut images,
        &mut row_errors,
    );
    collect_column(
        &conn,
        "SELECT bundlepath FROM operatorbundle",
        &mut images,
        &mut row_errors,
    );

    Ok((images, row_errors))
}

/// Verifies the two tables and columns this reader depends on exist.
fn check_schema(conn: &Connection) -> Result<()> {
    let has = |table: &str, column: &str| -> rusqlite::Result<bool> {
        let sql = format!("PRAGMA table_info({table})");
        let mut stmt = conn.prepare(&sql)?;
        let found = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .filter_map(std::result::Result::ok)
            .any(|name| name == column);
        Ok(found)
    };

    let related_image_ok = has("related_image", "image").unwrap_or(false);
    let operatorbundle_ok = has("operatorbundle", "bundlepath").unwrap_or(false);

    if !related_image_ok || !operatorbundle_ok {
        return Err(Error::SchemaMismatch(
            "expected related_image(image) and operatorbundle(bundlepath)".into(),
        ));
    }
    Ok(())
}

/// Runs `sql` (a single-column `SELECT`), inserting every non-empty, successfully
/// scanned value into `images` and every scan failure into `row_errors`.
fn collect_column(
    conn: &Connection,
    sql: &str,
    images: &mut ImageReferenceSet,
    row_errors: &mut Vec<String>,
) {
    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(e) => {
            row_errors.push(e.to_string());
            return;
        }
    };

    let rows = match stmt.query_map([], |row| row.get::<_, Option<String>>(0)) {
        Ok(rows) => rows,
        Err(e) => {
            row_errors.push(e.to_string());
            return;
        }
    };

    for row in rows {
        match row {
            Ok(Some(value)) if !value.is_empty() => {
                images.insert(value);
            }
            Ok(_) => {}
            Err(e) => row_errors.push(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn seeded_db() -> tempfile::TempPath {
        let file = tempfile::NamedTempFile::new().unwrap();
        let conn = Connection::open(file.path()).unwrap();
        conn.execute_batch(
            "
            CREATE TABLE related_image (image TEXT);
            CREATE TABLE operatorbundle (bundlepath TEXT, name TEXT);
            INSERT INTO related_image (image) VALUES
                ('quay.io/coreos/etcd-operator@sha256:aaaa'),
                ('quay.io/coreos/etcd-operator@sha256:aaaa'),
                ('');
            INSERT INTO operatorbundle (bundlepath, name) VALUES
                ('quay.io/test/etcd.0.9.0:latest', 'etcd.v0.9.0'),
                (NULL, 'etcd.v0.9.1');
            ",
        )
        .unwrap();
        drop(conn);
        file.into_temp_path()
    }

    #[test]
    fn dedupes_across_both_tables() {
        let path = seeded_db();
        let (images, errors) = read_images(&path).unwrap();
        assert!(errors.is_empty());
        assert_eq!(images.len(), 2);
        assert!(images.contains("quay.io/coreos/etcd-operator@sha256:aaaa"));
        assert!(images.contains("quay.io/test/etcd.0.9.0:latest"));
    }

    #[test]
    fn rejects_schema_mismatch() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let conn = Connection::open(file.path()).unwrap();
        conn.execute_batch("CREATE TABLE unrelated (x TEXT);").unwrap();
        drop(conn);

        let err = read_images(file.path()).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch(_)));
    }

    #[test]
    fn rejects_missing_file() {
        let err = read_images(Path::new("/nonexistent/bundles.db")).unwrap_err();
        assert!(matches!(err, Error::OpenFailed(_)));
    }
}
