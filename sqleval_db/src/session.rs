use crate::value::{Cell, ResultSet};
use crate::ExecError;
use rusqlite::{Connection, ErrorCode, InterruptHandle, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A read-only connection to one target database.
pub struct SqliteSession {
    conn: Connection,
    path: PathBuf,
}

impl SqliteSession {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExecError> {
        let path = path.as_ref();
        let open_err = |reason: String| ExecError::Open {
            path: path.display().to_string(),
            reason,
        };
        if !path.is_file() {
            return Err(open_err("no such file".into()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| open_err(e.to_string()))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `sql` and fetch every row, interrupting SQLite once `timeout` elapses.
    pub fn query(&self, sql: &str, timeout: Duration) -> Result<ResultSet, ExecError> {
        self.timed_query(sql, timeout).map(|(rows, _)| rows)
    }

    /// Like [`query`](Self::query), also returning the wall-clock time spent
    /// preparing, stepping and fetching.
    pub fn timed_query(
        &self,
        sql: &str,
        timeout: Duration,
    ) -> Result<(ResultSet, Duration), ExecError> {
        let watchdog = Watchdog::arm(self.conn.get_interrupt_handle(), timeout);
        let start = Instant::now();
        let result = self.fetch_all(sql);
        let elapsed = start.elapsed();
        let fired = watchdog.disarm();

        match result {
            Ok(rows) => Ok((rows, elapsed)),
            Err(e) if fired || is_interrupt(&e) => {
                debug!(db = %self.path.display(), ?timeout, "statement interrupted at deadline");
                Err(ExecError::TimedOut(timeout))
            }
            Err(e) => Err(ExecError::Sql(e.to_string())),
        }
    }

    fn fetch_all(&self, sql: &str) -> rusqlite::Result<ResultSet> {
        let mut stmt = self.conn.prepare(sql.trim())?;
        let columns = stmt.column_count();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(columns);
            for i in 0..columns {
                cells.push(Cell::from(row.get_ref(i)?));
            }
            out.push(cells);
        }
        Ok(ResultSet::new(columns, out))
    }
}

fn is_interrupt(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted
    )
}

/// Interrupts the connection from a side thread unless disarmed before `timeout`.
///
/// `sqlite3_interrupt` aborts the running statement at its next VM step, which
/// also covers statements that never yield a row (infinite recursive CTEs).
struct Watchdog {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<bool>>,
}

impl Watchdog {
    fn arm(interrupt: InterruptHandle, timeout: Duration) -> Self {
        let (cancel, rx) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name("sqleval-watchdog".into())
            .spawn(move || match rx.recv_timeout(timeout) {
                Err(RecvTimeoutError::Timeout) => {
                    interrupt.interrupt();
                    true
                }
                _ => false,
            });
        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to spawn statement watchdog: {}", e);
                None
            }
        };
        Self {
            cancel: Some(cancel),
            handle,
        }
    }

    /// Stop the watchdog; returns whether it already fired.
    fn disarm(mut self) -> bool {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.handle
            .take()
            .map(|h| h.join().unwrap_or(false))
            .unwrap_or(false)
    }
}
