//! Scripted in-memory driver for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::StorageError;
use crate::dialect::DatabaseProvider;
use crate::executor::{Record, SagaConnector, SagaTransaction};
use crate::options::IsolationLevel;
use crate::statement::SqlCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    RolledBack,
}

#[derive(Debug, Default)]
struct Entries {
    began: Vec<IsolationLevel>,
    fetched: Vec<SqlCommand>,
    executed: Vec<SqlCommand>,
    outcomes: Vec<Outcome>,
    open: usize,
}

/// Shared record of everything the fake driver saw.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Entries>>);

impl Journal {
    pub fn began(&self) -> Vec<IsolationLevel> {
        self.0.lock().unwrap().began.clone()
    }

    pub fn fetched(&self) -> Vec<SqlCommand> {
        self.0.lock().unwrap().fetched.clone()
    }

    pub fn executed(&self) -> Vec<SqlCommand> {
        self.0.lock().unwrap().executed.clone()
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.0.lock().unwrap().outcomes.clone()
    }

    /// Transactions neither committed nor rolled back nor dropped.
    pub fn open(&self) -> usize {
        self.0.lock().unwrap().open
    }
}

pub struct FakeTransaction {
    journal: Journal,
    rows: VecDeque<Vec<Record>>,
    affected: u64,
    finished: bool,
}

impl FakeTransaction {
    pub fn new(journal: Journal) -> Self {
        journal.0.lock().unwrap().open += 1;
        Self {
            journal,
            rows: VecDeque::new(),
            affected: 1,
            finished: false,
        }
    }

    /// Queue the rows returned by the next fetch.
    pub fn returning(mut self, rows: Vec<Record>) -> Self {
        self.rows.push_back(rows);
        self
    }

    pub fn affecting(mut self, affected: u64) -> Self {
        self.affected = affected;
        self
    }

    fn finish(mut self, outcome: Outcome) {
        let mut entries = self.journal.0.lock().unwrap();
        entries.outcomes.push(outcome);
        entries.open -= 1;
        drop(entries);
        self.finished = true;
    }
}

impl Drop for FakeTransaction {
    fn drop(&mut self) {
        if !self.finished {
            let mut entries = self.journal.0.lock().unwrap();
            entries.outcomes.push(Outcome::RolledBack);
            entries.open -= 1;
        }
    }
}

#[async_trait]
impl SagaTransaction for FakeTransaction {
    async fn fetch(&mut self, command: &SqlCommand) -> Result<Vec<Record>, StorageError> {
        self.journal.0.lock().unwrap().fetched.push(command.clone());
        Ok(self.rows.pop_front().unwrap_or_default())
    }

    async fn execute(&mut self, command: &SqlCommand) -> Result<u64, StorageError> {
        self.journal.0.lock().unwrap().executed.push(command.clone());
        Ok(self.affected)
    }

    async fn commit(self) -> Result<(), StorageError> {
        self.finish(Outcome::Committed);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StorageError> {
        self.finish(Outcome::RolledBack);
        Ok(())
    }
}

/// Hands out fake transactions, optionally preloaded with rows.
pub struct FakeConnector {
    pub journal: Journal,
    pub provider: Option<DatabaseProvider>,
    pub rows: Mutex<Vec<Record>>,
    pub affected: u64,
    pub fail_begin: bool,
}

impl FakeConnector {
    pub fn new(provider: Option<DatabaseProvider>) -> Self {
        Self {
            journal: Journal::default(),
            provider,
            rows: Mutex::new(Vec::new()),
            affected: 1,
            fail_begin: false,
        }
    }
}

#[async_trait]
impl SagaConnector for FakeConnector {
    type Transaction = FakeTransaction;

    fn provider(&self) -> Option<DatabaseProvider> {
        self.provider
    }

    async fn begin(
        &self,
        isolation_level: IsolationLevel,
    ) -> Result<FakeTransaction, StorageError> {
        if self.fail_begin {
            return Err(StorageError::driver(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        self.journal.0.lock().unwrap().began.push(isolation_level);
        let rows = std::mem::take(&mut *self.rows.lock().unwrap());
        Ok(FakeTransaction::new(self.journal.clone())
            .returning(rows)
            .affecting(self.affected))
    }
}
