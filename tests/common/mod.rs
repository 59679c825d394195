#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use report_intake::{store, tables};
use rusqlite::Connection;
use tempfile::{TempDir, tempdir};

pub const TAX_ID: &str = "0105537086874";

/// Scratch directory holding a SQLite file plus any input files a test writes.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn database(&self) -> PathBuf {
        self.temp_dir.path().join("intake.db")
    }

    /// Opens the workspace database with every table created.
    pub fn connection(&self) -> Connection {
        let conn = store::open(&self.database(), Duration::from_secs(5)).expect("open database");
        tables::bootstrap(&conn).expect("create tables");
        conn
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

pub fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .expect("count rows")
}
