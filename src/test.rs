//! Test doubles for the connection and topology seams. Commands are recorded as the documents
//! that would have been framed onto the wire, and replies come from a script that defaults to
//! `{ ok: 1 }`.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{
    bson::{doc, Document},
    conn::{Command, Connection, SessionKind, StreamDescription, Topology},
    error::{ErrorKind, Result},
    BoxFuture,
    Client,
};

#[derive(Debug)]
pub(crate) struct MockConnection {
    description: StreamDescription,
    commands: Mutex<Vec<Document>>,
    replies: Mutex<VecDeque<Result<Document>>>,
    reply_delay: Mutex<Option<Duration>>,
}

impl MockConnection {
    pub(crate) fn new(max_wire_version: i32) -> Self {
        Self {
            description: StreamDescription {
                max_wire_version: Some(max_wire_version),
                logical_session_timeout: Some(Duration::from_secs(30 * 60)),
            },
            commands: Default::default(),
            replies: Default::default(),
            reply_delay: Default::default(),
        }
    }

    /// Stalls every subsequent reply by `delay`, to model an unresponsive server. Commands are
    /// still recorded before the stall.
    pub(crate) fn set_reply_delay(&self, delay: Duration) {
        *self.reply_delay.lock().unwrap() = Some(delay);
    }

    /// Queues a reply; replies are consumed in order, one per command.
    pub(crate) fn enqueue_reply(&self, reply: Result<Document>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// All commands run on this connection so far, as wire documents.
    pub(crate) fn commands(&self) -> Vec<Document> {
        self.commands.lock().unwrap().clone()
    }

    /// The subset of recorded commands whose first key is `name`.
    pub(crate) fn commands_named(&self, name: &str) -> Vec<Document> {
        self.commands()
            .into_iter()
            .filter(|cmd| cmd.keys().next().map(String::as_str) == Some(name))
            .collect()
    }
}

impl Connection for MockConnection {
    fn run_command(&self, command: Command) -> BoxFuture<'_, Result<Document>> {
        Box::pin(async move {
            let document = command.into_document()?;
            self.commands.lock().unwrap().push(document);
            let delay = *self.reply_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match self.replies.lock().unwrap().pop_front() {
                Some(reply) => reply,
                None => Ok(doc! { "ok": 1 }),
            }
        })
    }

    fn stream_description(&self) -> &StreamDescription {
        &self.description
    }

    fn address(&self) -> &str {
        "mock.test:27017"
    }
}

#[derive(Debug)]
pub(crate) struct MockTopology {
    connection: Arc<MockConnection>,
    checkout_failures: Mutex<u32>,
}

impl MockTopology {
    pub(crate) fn new(connection: Arc<MockConnection>) -> Self {
        Self {
            connection,
            checkout_failures: Mutex::new(0),
        }
    }

    /// Makes the next `count` checkouts fail with a server selection error before connections
    /// are handed out again.
    pub(crate) fn fail_checkouts(&self, count: u32) {
        *self.checkout_failures.lock().unwrap() = count;
    }
}

impl Topology for MockTopology {
    fn checkout(&self, _kind: SessionKind) -> BoxFuture<'_, Result<Arc<dyn Connection>>> {
        Box::pin(async move {
            let mut failures = self.checkout_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ErrorKind::ServerSelection {
                    message: "no suitable server found yet".to_string(),
                }
                .into());
            }
            Ok(self.connection.clone() as Arc<dyn Connection>)
        })
    }

    fn logical_session_timeout(&self) -> Option<Duration> {
        self.connection.description.logical_session_timeout
    }
}

/// A client over a mock topology with one recording connection at the given wire version.
pub(crate) fn test_client(max_wire_version: i32) -> (Client, Arc<MockConnection>) {
    let connection = Arc::new(MockConnection::new(max_wire_version));
    let topology = Arc::new(MockTopology::new(connection.clone()));
    (Client::new(topology), connection)
}

/// Same as [`test_client`], but also returns the topology for checkout-failure scripting.
pub(crate) fn test_client_with_topology(
    max_wire_version: i32,
) -> (Client, Arc<MockConnection>, Arc<MockTopology>) {
    let connection = Arc::new(MockConnection::new(max_wire_version));
    let topology = Arc::new(MockTopology::new(connection.clone()));
    (Client::new(topology.clone()), connection, topology)
}
