use crate::descriptor::DescriptorVector;
use crate::source::{DescriptorSource, SourceConfig};
use crate::{ItqError, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, warn};

/// The subcommand a worker process is launched with.
pub const FETCH_WORKER_COMMAND: &str = "fetch-worker";

/// The argument carrying the worker's source configuration, as JSON.
pub const SOURCE_ARGUMENT: &str = "--source";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A worker's answer to one fetch request.
pub enum WorkerReply {
    /// The descriptor was fetched.
    Fetched(DescriptorVector),
    /// The identifier is unknown to the source.
    Missing {
        /// The unknown identifier.
        id: String,
    },
    /// The fetch failed for some other reason.
    Failed {
        /// The identifier being fetched.
        id: String,
        /// A description of the failure.
        message: String,
    },
}

/// Answer fetch requests on behalf of a parent process.
///
/// Requests are identifiers, one per line. Every reply is bincode-encoded; the worker stops after the first failed fetch.
///
/// # Arguments
///
/// * `source` - The descriptor source to fetch from.
///
/// * `requests` - The incoming identifiers.
///
/// * `replies` - Where to write the replies.
pub fn serve_fetch_requests(
    source: &dyn DescriptorSource,
    requests: impl BufRead,
    replies: impl Write,
) -> Result<()> {
    let mut replies = BufWriter::new(replies);
    for line in requests.lines() {
        let id = line?;
        let reply = match source.fetch(&id) {
            Ok(descriptor) => WorkerReply::Fetched(descriptor),
            Err(ItqError::Lookup { id }) => WorkerReply::Missing { id },
            Err(e) => WorkerReply::Failed {
                id,
                message: e.to_string(),
            },
        };
        let failed = !matches!(reply, WorkerReply::Fetched(_));
        bincode::serde::encode_into_std_write(&reply, &mut replies, bincode::config::legacy())
            .map_err(|e| ItqError::Worker(format!("could not send reply: {e}")))?;
        if failed {
            break;
        }
    }
    replies.flush()?;
    Ok(())
}

#[derive(Debug, Clone)]
/// A pool of worker processes, launched afresh for every extraction.
pub struct ProcessPool {
    worker_count: usize,
    program: PathBuf,
}

/// Running worker processes; any still running when dropped are killed.
struct Workers(Vec<Child>);

impl Workers {
    fn kill_all(&mut self) {
        for child in self.0.iter_mut() {
            let _ = child.kill();
        }
    }

    /// Reap every worker. After the first unsuccessful exit the remaining workers are killed.
    fn wait_all(mut self) -> Result<()> {
        let mut failure = None;
        for mut child in std::mem::take(&mut self.0) {
            if failure.is_some() {
                let _ = child.kill();
            }
            let result = match child.wait() {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(ItqError::Worker(format!(
                    "worker process {} exited with {status}",
                    child.id()
                ))),
                Err(e) => Err(e.into()),
            };
            if failure.is_none() {
                failure = result.err();
            }
        }
        failure.map_or(Ok(()), Err)
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        self.kill_all();
        for child in self.0.iter_mut() {
            let _ = child.wait();
        }
    }
}

impl ProcessPool {
    /// Create a process pool.
    ///
    /// # Arguments
    ///
    /// * `worker_count` - The number of worker processes to launch.
    ///
    /// * `program` - The executable to launch; it must understand [`FETCH_WORKER_COMMAND`]. Defaults to the current executable.
    pub fn new(worker_count: usize, program: Option<PathBuf>) -> Result<Self> {
        let program = match program {
            Some(program) => program,
            None => std::env::current_exe()?,
        };
        Ok(Self {
            worker_count,
            program,
        })
    }

    /// The number of worker processes launched per extraction.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn spawn(&self, source_argument: &str) -> Result<Child> {
        Ok(Command::new(&self.program)
            .arg(FETCH_WORKER_COMMAND)
            .arg(SOURCE_ARGUMENT)
            .arg(source_argument)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?)
    }

    /// Fetch descriptors across worker processes.
    ///
    /// Each worker receives a contiguous share of the identifiers. The first failure kills every worker.
    ///
    /// # Arguments
    ///
    /// * `ids` - The identifiers of the descriptors to fetch.
    ///
    /// * `config` - How each worker opens the descriptor source.
    ///
    /// # Returns
    ///
    /// One descriptor per identifier, in no particular order.
    pub fn fetch_all(
        &self,
        ids: Vec<String>,
        config: &SourceConfig,
    ) -> Result<Vec<DescriptorVector>> {
        if let Some(id) = ids.iter().find(|x| x.contains(['\n', '\r'])) {
            return Err(ItqError::Validation(format!(
                "identifier {id:?} contains a line break"
            )));
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let source_argument = serde_json::to_string(config)
            .map_err(|e| ItqError::Configuration(format!("unusable source configuration: {e}")))?;

        let share_size = ids.len().div_ceil(self.worker_count);
        let mut workers = Workers(Vec::new());
        let mut pipes = Vec::new();
        for share in ids.chunks(share_size) {
            let mut child = self.spawn(&source_argument)?;
            let stdin = child.stdin.take();
            let stdout = child.stdout.take();
            workers.0.push(child);
            match (stdin, stdout) {
                (Some(stdin), Some(stdout)) => pipes.push((stdin, stdout, share)),
                _ => {
                    return Err(ItqError::Worker(
                        "worker process has no standard streams".to_owned(),
                    ))
                }
            }
        }
        debug!(workers = workers.0.len(), share_size, "worker processes started");

        let (sender, receiver) = mpsc::channel::<Result<DescriptorVector>>();
        let fetched = thread::scope(|scope| {
            for (stdin, stdout, share) in pipes {
                scope.spawn(move || {
                    let mut requests = BufWriter::new(stdin);
                    for id in share {
                        if writeln!(requests, "{id}").is_err() {
                            return;
                        }
                    }
                    let _ = requests.flush();
                });
                let sender = sender.clone();
                let expected = share.len();
                scope.spawn(move || {
                    let mut replies = BufReader::new(stdout);
                    for _ in 0..expected {
                        let reply = match bincode::serde::decode_from_std_read(
                            &mut replies,
                            bincode::config::legacy(),
                        ) {
                            Ok(WorkerReply::Fetched(descriptor)) => Ok(descriptor),
                            Ok(WorkerReply::Missing { id }) => Err(ItqError::Lookup { id }),
                            Ok(WorkerReply::Failed { id, message }) => Err(ItqError::Worker(
                                format!("fetching '{id}' failed: {message}"),
                            )),
                            Err(e) => Err(ItqError::Worker(format!(
                                "worker process stopped replying: {e}"
                            ))),
                        };
                        let failed = reply.is_err();
                        if sender.send(reply).is_err() || failed {
                            return;
                        }
                    }
                });
            }
            drop(sender);

            let mut fetched = Vec::with_capacity(ids.len());
            for reply in receiver.iter() {
                match reply {
                    Ok(descriptor) => fetched.push(descriptor),
                    Err(e) => {
                        warn!(error = %e, "aborting extraction");
                        workers.kill_all();
                        return Err(e);
                    }
                }
            }
            Ok(fetched)
        })?;
        workers.wait_all()?;
        Ok(fetched)
    }
}
