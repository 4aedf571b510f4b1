//! Command-line verb parsing.
//!
//! The grammar is a fixed vocabulary of space-separated words.  Only the
//! command keyword is case-insensitive; arguments are taken verbatim.

use tracing::debug;

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    /// Blank line.
    Empty,
    /// Unknown command, missing arguments or a malformed argument.
    Illegal,
    /// `CLOSE`: say goodbye and end the connection.
    Close,
    /// `ADD_NODE <host> <port>`: register a node.
    AddNode { host: String, port: i64 },
}

impl Verb {
    /// Parse one line of input.  Never fails; anything unrecognised is
    /// [`Verb::Illegal`].
    pub fn parse(raw: &str) -> Self {
        let words: Vec<&str> = raw.trim().split(' ').filter(|w| !w.is_empty()).collect();
        let Some(first) = words.first() else {
            return Verb::Empty;
        };

        let command = first.to_uppercase();
        if let Some(expected) = expected_word_count(&command) {
            if words.len() < expected {
                debug!(
                    "{command} expects {expected} word(s), got {}",
                    words.len()
                );
                return Verb::Illegal;
            }
        }

        match command.as_str() {
            "CLOSE" => Verb::Close,
            "ADD_NODE" => match words[2].parse::<i64>() {
                Ok(port) => Verb::AddNode {
                    host: words[1].to_string(),
                    port,
                },
                Err(_) => {
                    debug!("Invalid port number {:?} for ADD_NODE", words[2]);
                    Verb::Illegal
                }
            },
            _ => Verb::Illegal,
        }
    }

    /// Label used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Verb::Empty => "empty",
            Verb::Illegal => "illegal",
            Verb::Close => "close",
            Verb::AddNode { .. } => "add_node",
        }
    }
}

/// Minimum number of words (keyword included) for a recognised command.
fn expected_word_count(command: &str) -> Option<usize> {
    match command {
        "CLOSE" => Some(1),
        "ADD_NODE" => Some(3),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_node(host: &str, port: i64) -> Verb {
        Verb::AddNode {
            host: host.to_string(),
            port,
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(Verb::parse(""), Verb::Empty);
        assert_eq!(Verb::parse("   "), Verb::Empty);
        assert_eq!(Verb::parse("\r\n"), Verb::Empty);
    }

    #[test]
    fn test_close() {
        assert_eq!(Verb::parse("CLOSE"), Verb::Close);
        assert_eq!(Verb::parse("close\n"), Verb::Close);
        assert_eq!(Verb::parse("  Close  "), Verb::Close);
        assert_eq!(Verb::parse("CLOSE now"), Verb::Close);
    }

    #[test]
    fn test_add_node() {
        assert_eq!(
            Verb::parse("ADD_NODE example.com 9999"),
            add_node("example.com", 9999)
        );
        assert_eq!(Verb::parse("add_node 10.0.0.1 80\r\n"), add_node("10.0.0.1", 80));
        assert_eq!(Verb::parse("ADD_NODE  spaced   443"), add_node("spaced", 443));
        assert_eq!(Verb::parse("ADD_NODE h 0 extra"), add_node("h", 0));
    }

    #[test]
    fn test_add_node_keeps_argument_case() {
        assert_eq!(
            Verb::parse("add_node Example.COM 1"),
            add_node("Example.COM", 1)
        );
    }

    #[test]
    fn test_add_node_port_is_base_ten() {
        for port in [0_i64, 1, 22, 8080, 65535, 99999, -1] {
            assert_eq!(
                Verb::parse(&format!("ADD_NODE host {port}")),
                add_node("host", port)
            );
        }
    }

    #[test]
    fn test_add_node_missing_port() {
        assert_eq!(Verb::parse("ADD_NODE example.com"), Verb::Illegal);
        assert_eq!(Verb::parse("ADD_NODE"), Verb::Illegal);
    }

    #[test]
    fn test_add_node_bad_port() {
        assert_eq!(Verb::parse("ADD_NODE example.com abc"), Verb::Illegal);
        assert_eq!(Verb::parse("ADD_NODE example.com 0x50"), Verb::Illegal);
        assert_eq!(Verb::parse("ADD_NODE example.com 80.5"), Verb::Illegal);
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(Verb::parse("FOO"), Verb::Illegal);
        assert_eq!(Verb::parse("ECHO hello"), Verb::Illegal);
        assert_eq!(Verb::parse("ADD-NODE a 1"), Verb::Illegal);
    }
}
