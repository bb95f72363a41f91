//! The single writer.
//!
//! Every statement against a database, reads included, goes through one thread which owns the
//! executor and runs commands in the order they were sent.  Writes don't block: they hand back a
//! [WriteTicket] which can be waited on or dropped.  Reads block on their reply, which means a read
//! always sees every write submitted before it.
use std::thread::JoinHandle;

use crossbeam::channel as chan;
use log::*;

use crate::codec::{Params, ResultRow};
use crate::error::{Error, Result};
use crate::executor::Executor;

enum Command {
    Execute {
        sql: String,
        params: Params,
        result_sender: chan::Sender<Result<usize>>,
    },
    Query {
        sql: String,
        params: Params,
        result_sender: chan::Sender<Result<Vec<ResultRow>>>,
    },
}

/// The completion of one write.
#[must_use = "Dropping a ticket means failures are only logged"]
#[derive(Debug)]
pub struct WriteTicket {
    receiver: chan::Receiver<Result<usize>>,
}

impl WriteTicket {
    /// Block until the statement ran, returning the number of rows it touched.
    pub fn wait(self) -> Result<usize> {
        self.receiver.recv().map_err(|_| Error::WriterStopped)?
    }

    /// Returns `None` if the statement hasn't run yet.
    ///
    /// The outcome is handed out once; calling this again after it returned `Some` reports
    /// [Error::WriterStopped].
    pub fn try_wait(&self) -> Option<Result<usize>> {
        match self.receiver.try_recv() {
            Ok(r) => Some(r),
            Err(chan::TryRecvError::Empty) => None,
            Err(chan::TryRecvError::Disconnected) => Some(Err(Error::WriterStopped)),
        }
    }
}

/// The writes submitted by one [crate::Row::clean], in submission order.
#[must_use = "Dropping pending writes means failures are only logged"]
#[derive(Debug, Default)]
pub struct PendingWrites {
    tickets: Vec<WriteTicket>,
}

impl PendingWrites {
    pub(crate) fn push(&mut self, ticket: WriteTicket) {
        self.tickets.push(ticket);
    }

    /// Number of statements submitted.
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Wait for every write, returning the total number of rows touched or the first failure.
    pub fn wait(self) -> Result<usize> {
        let mut total = 0;
        let mut first_error = None;

        for ticket in self.tickets {
            match ticket.wait() {
                Ok(n) => total += n,
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => error!("Could not update database: {}", e),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }

    pub fn into_tickets(self) -> Vec<WriteTicket> {
        self.tickets
    }
}

fn writer_thread(commands: chan::Receiver<Command>, mut executor: Box<dyn Executor>) {
    info!("Writer thread started");

    for command in commands.iter() {
        match command {
            Command::Execute {
                sql,
                params,
                result_sender,
            } => {
                debug!("Executing {}", sql);
                let result = executor.execute(&sql, &params);
                // Nobody is listening, so this is the only place the failure can go.
                if let Err(chan::SendError(Err(e))) = result_sender.send(result) {
                    error!("Could not update database: {} (statement: {})", e, sql);
                }
            }
            Command::Query {
                sql,
                params,
                result_sender,
            } => {
                debug!("Querying {}", sql);
                let _ = result_sender.send(executor.query(&sql, &params));
            }
        }
    }

    info!("Writer thread stopped");
}

/// Handle to the writer thread.  Dropping it lets the thread drain what's queued, then joins it.
pub(crate) struct Writer {
    command_sender: Option<chan::Sender<Command>>,
    thread: Option<JoinHandle<()>>,
}

impl Writer {
    pub(crate) fn spawn(name: &str, executor: Box<dyn Executor>) -> Result<Writer> {
        let (command_sender, command_receiver) = chan::unbounded();
        let thread = std::thread::Builder::new()
            .name(format!("ammo_orm writer ({})", name))
            .spawn(move || writer_thread(command_receiver, executor))?;

        Ok(Writer {
            command_sender: Some(command_sender),
            thread: Some(thread),
        })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.command_sender
            .as_ref()
            .ok_or(Error::WriterStopped)?
            .send(command)
            .map_err(|_| Error::WriterStopped)
    }

    /// Queue a statement.  Never blocks; if the thread is gone the ticket reports
    /// [Error::WriterStopped].
    pub(crate) fn submit(&self, sql: impl Into<String>, params: Params) -> WriteTicket {
        let (result_sender, receiver) = chan::bounded(1);
        let command = Command::Execute {
            sql: sql.into(),
            params,
            result_sender,
        };

        if self.send(command).is_err() {
            warn!("Submitted a write after the writer thread stopped");
        }

        WriteTicket { receiver }
    }

    /// Run a query behind every write queued so far.
    pub(crate) fn query(&self, sql: impl Into<String>, params: Params) -> Result<Vec<ResultRow>> {
        let (result_sender, receiver) = chan::bounded(1);
        self.send(Command::Query {
            sql: sql.into(),
            params,
            result_sender,
        })?;
        receiver.recv().map_err(|_| Error::WriterStopped)?
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        // Closing the channel ends the thread's loop once the backlog is empty.
        self.command_sender.take();
        if let Some(t) = self.thread.take() {
            if t.join().is_err() {
                error!("Writer thread panicked");
            }
        }
    }
}
