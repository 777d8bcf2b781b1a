//! SQLite connection pool wrapper (lightweight for CLI usage).

use crate::utils::path::expand_tilde;
use rusqlite::{Connection, Result, Transaction, TransactionBehavior};

pub struct DbPool {
    pub conn: Connection,
}

impl DbPool {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(expand_tilde(path))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Begin an EXCLUSIVE transaction. Every engine mutation (session +
    /// cursor + queue) goes through one of these so a crash can never leave
    /// the three out of step.
    pub fn tx(&mut self) -> Result<Transaction<'_>> {
        self.conn
            .transaction_with_behavior(TransactionBehavior::Exclusive)
    }

    /// Helper to execute a closure with a mutable connection reference.
    pub fn with_conn<F, T>(&mut self, func: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        func(&mut self.conn)
    }
}
