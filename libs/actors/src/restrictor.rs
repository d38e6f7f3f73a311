//! Message acceptance filters an actor publishes while it waits

use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;
use types::ActionKind;

/// Which datagrams a suspended actor is willing to take next
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Restrictor {
    /// Published while the actor is running or finished
    #[default]
    AcceptNothing,
    /// Any action, optionally only from one peer
    AcceptAny { from: Option<SocketAddr> },
    /// Listed actions only; an empty set accepts nothing
    AcceptKinds {
        kinds: BTreeSet<ActionKind>,
        from: Option<SocketAddr>,
    },
}

impl Restrictor {
    pub fn any() -> Self {
        Restrictor::AcceptAny { from: None }
    }

    pub fn any_from(sender: SocketAddr) -> Self {
        Restrictor::AcceptAny { from: Some(sender) }
    }

    pub fn kinds(kinds: impl IntoIterator<Item = ActionKind>) -> Self {
        Restrictor::AcceptKinds {
            kinds: kinds.into_iter().collect(),
            from: None,
        }
    }

    pub fn kinds_from(kinds: impl IntoIterator<Item = ActionKind>, sender: SocketAddr) -> Self {
        Restrictor::AcceptKinds {
            kinds: kinds.into_iter().collect(),
            from: Some(sender),
        }
    }

    pub fn accepts(&self, sender: SocketAddr, kind: ActionKind) -> bool {
        let from_ok = |from: &Option<SocketAddr>| from.map_or(true, |addr| addr == sender);
        match self {
            Restrictor::AcceptNothing => false,
            Restrictor::AcceptAny { from } => from_ok(from),
            Restrictor::AcceptKinds { kinds, from } => kinds.contains(&kind) && from_ok(from),
        }
    }
}

impl fmt::Display for Restrictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Restrictor::AcceptNothing => f.write_str("nothing"),
            Restrictor::AcceptAny { from: None } => f.write_str("any"),
            Restrictor::AcceptAny { from: Some(addr) } => write!(f, "any from {addr}"),
            Restrictor::AcceptKinds { kinds, from } => {
                let names: Vec<&str> = kinds.iter().map(|k| k.name()).collect();
                write!(f, "[{}]", names.join(", "))?;
                if let Some(addr) = from {
                    write!(f, " from {addr}")?;
                }
                Ok(())
            }
        }
    }
}
