//! Command dispatch: maps a parsed [`Verb`] to a [`Response`].
//!
//! Dispatch is the only pipeline stage that suspends, and only for
//! `ADD_NODE`, which waits on the registry write.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{error, info};

use crate::metrics::{COMMANDS_TOTAL, DISPATCH_DURATION_SECONDS, REGISTRY_SAVES_TOTAL};
use crate::registry::{NodeDraft, NodeRegistry};
use crate::session::{Response, Session, VerbCommand};
use crate::verb::Verb;

pub const MSG_INVALID_COMMAND: &str = "Invalid command";
pub const MSG_GOOD_BYE: &str = "Good Bye!";

/// Maps verbs to responses, saving nodes through the shared registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<NodeRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    /// Run one command.  Suspends only while an `ADD_NODE` save is in flight.
    pub async fn dispatch(&self, command: VerbCommand) -> Response {
        let verb = command.verb.name();
        let start = Instant::now();

        let response = match command.verb {
            Verb::Empty => Response {
                session: command.session,
                message: String::new(),
            },
            Verb::Illegal => Response {
                session: command.session,
                message: MSG_INVALID_COMMAND.to_string(),
            },
            Verb::Close => {
                let mut session = command.session;
                session.should_close = true;
                Response {
                    session,
                    message: MSG_GOOD_BYE.to_string(),
                }
            }
            Verb::AddNode { host, port } => {
                self.add_node(command.session, NodeDraft { host, port })
                    .await
            }
        };

        counter!(COMMANDS_TOTAL, "verb" => verb).increment(1);
        histogram!(DISPATCH_DURATION_SECONDS, "verb" => verb)
            .record(start.elapsed().as_secs_f64());
        response
    }

    async fn add_node(&self, session: Session, draft: NodeDraft) -> Response {
        match self.registry.save(draft).await {
            Ok(node) => {
                info!(
                    session = %session.id,
                    "Saved node {} ({}:{})",
                    node.id, node.host, node.port
                );
                counter!(REGISTRY_SAVES_TOTAL, "status" => "ok").increment(1);
                Response {
                    session,
                    message: format!("Saved node {}", node.id),
                }
            }
            Err(err) => {
                error!(session = %session.id, "Failed to add node: {err}");
                counter!(REGISTRY_SAVES_TOTAL, "status" => err.kind()).increment(1);
                Response {
                    session,
                    message: format!("Error adding node: {err}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::Path;

    use tempfile::TempDir;
    use uuid::Uuid;

    use crate::registry::SnapshotWriter;

    struct BrokenWriter;

    impl SnapshotWriter for BrokenWriter {
        fn write(&self, _path: &Path, _data: &[u8]) -> io::Result<()> {
            Err(io::Error::other("no space left on device"))
        }
    }

    fn test_dispatcher() -> (Dispatcher, Arc<NodeRegistry>, TempDir) {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let registry = Arc::new(NodeRegistry::open(tmp.path().join("nodes.json")).unwrap());
        (Dispatcher::new(Arc::clone(&registry)), registry, tmp)
    }

    fn command(text: &str) -> VerbCommand {
        Session::new("127.0.0.1:5000".parse().unwrap())
            .tag(text)
            .parse()
    }

    #[tokio::test]
    async fn test_empty_line() {
        let (dispatcher, _registry, _tmp) = test_dispatcher();
        let cmd = command("");
        let session = cmd.session.clone();
        let response = dispatcher.dispatch(cmd).await;
        assert_eq!(response.message, "");
        assert_eq!(response.session, session);
    }

    #[tokio::test]
    async fn test_illegal_command() {
        let (dispatcher, _registry, _tmp) = test_dispatcher();
        let response = dispatcher.dispatch(command("FOO")).await;
        assert_eq!(response.message, "Invalid command");
        assert!(!response.session.should_close);
    }

    #[tokio::test]
    async fn test_close_sets_flag() {
        let (dispatcher, _registry, _tmp) = test_dispatcher();
        let response = dispatcher.dispatch(command("CLOSE")).await;
        assert_eq!(response.message, "Good Bye!");
        assert!(response.session.should_close);
    }

    #[tokio::test]
    async fn test_add_node_saves() {
        let (dispatcher, registry, _tmp) = test_dispatcher();
        let response = dispatcher
            .dispatch(command("ADD_NODE example.com 9999"))
            .await;

        let id = response
            .message
            .strip_prefix("Saved node ")
            .expect("unexpected message");
        let id: Uuid = id.parse().unwrap();

        let nodes = registry.nodes().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, id);
        assert_eq!(nodes[0].host, "example.com");
        assert_eq!(nodes[0].port, 9999);
        assert!(!response.session.should_close);
    }

    #[tokio::test]
    async fn test_add_node_failure_reports_cause() {
        let tmp = TempDir::new().unwrap();
        let registry = Arc::new(
            NodeRegistry::with_writer(tmp.path().join("nodes.json"), Arc::new(BrokenWriter))
                .unwrap(),
        );
        let dispatcher = Dispatcher::new(Arc::clone(&registry));

        let response = dispatcher.dispatch(command("ADD_NODE a 1")).await;
        assert_eq!(
            response.message,
            "Error adding node: write failed: no space left on device"
        );
        assert!(!response.session.should_close);
        assert_eq!(registry.len().unwrap(), 0);
    }
}
