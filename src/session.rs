//! Per-connection session state and the values passed between pipeline
//! stages.
//!
//! A [`Session`] is created once when a connection is accepted and is then
//! carried by value through every stage.  Stages that need to change it
//! (only the dispatcher, to request a close) hand back an updated copy in
//! the [`Response`]; the connection adopts that copy before reading the
//! next line.

use std::net::SocketAddr;

use uuid::Uuid;

use crate::verb::Verb;

/// Identity and close flag of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    /// Remote address of the connection this session belongs to.
    pub peer: SocketAddr,
    pub should_close: bool,
}

impl Session {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            should_close: false,
        }
    }

    /// Tag a raw inbound line with this session.
    pub fn tag(&self, text: impl Into<String>) -> TextCommand {
        TextCommand {
            session: self.clone(),
            text: text.into(),
        }
    }
}

/// One inbound line, tagged with the session it arrived on.
#[derive(Debug, Clone)]
pub struct TextCommand {
    pub session: Session,
    pub text: String,
}

impl TextCommand {
    /// Run the verb parser over the raw text.
    pub fn parse(self) -> VerbCommand {
        VerbCommand {
            verb: Verb::parse(&self.text),
            session: self.session,
        }
    }
}

/// A parsed line, still tagged with its session.
#[derive(Debug, Clone)]
pub struct VerbCommand {
    pub session: Session,
    pub verb: Verb,
}

/// Result of dispatching one command.
#[derive(Debug, Clone)]
pub struct Response {
    pub session: Session,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_new_session_is_open() {
        let session = Session::new(peer());
        assert!(!session.should_close);
        assert_eq!(session.peer, peer());
    }

    #[test]
    fn test_sessions_get_distinct_ids() {
        assert_ne!(Session::new(peer()).id, Session::new(peer()).id);
    }

    #[test]
    fn test_tag_keeps_session_identity() {
        let session = Session::new(peer());
        let first = session.tag("CLOSE");
        let second = session.tag("ADD_NODE a 1");
        assert_eq!(first.session.id, session.id);
        assert_eq!(second.session.id, session.id);
    }

    #[test]
    fn test_parse_carries_session() {
        let session = Session::new(peer());
        let command = session.tag("close").parse();
        assert_eq!(command.verb, Verb::Close);
        assert_eq!(command.session, session);
    }
}
