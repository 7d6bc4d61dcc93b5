//! Closed action vocabulary and typed commands

use hypotree_core::{Context, Error, NodeType, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    CreateTree,
    AddChild,
    Start,
    SetResult,
    Reject,
    Aggregate,
    GetSynthesis,
    GetStatus,
    ListTrees,
    DeleteTree,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::CreateTree,
        Action::AddChild,
        Action::Start,
        Action::SetResult,
        Action::Reject,
        Action::Aggregate,
        Action::GetSynthesis,
        Action::GetStatus,
        Action::ListTrees,
        Action::DeleteTree,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateTree => "create_tree",
            Self::AddChild => "add_child",
            Self::Start => "start",
            Self::SetResult => "set_result",
            Self::Reject => "reject",
            Self::Aggregate => "aggregate",
            Self::GetSynthesis => "get_synthesis",
            Self::GetStatus => "get_status",
            Self::ListTrees => "list_trees",
            Self::DeleteTree => "delete_tree",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| Error::UnknownAction(s.to_string()))
    }
}

/// One Tree Manager call with its arguments.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CreateTree {
        description: String,
    },
    AddChild {
        tree_id: String,
        parent_id: String,
        description: String,
        node_type: NodeType,
        context: Context,
    },
    Start {
        tree_id: String,
        node_id: String,
    },
    SetResult {
        tree_id: String,
        node_id: String,
        confirmed: bool,
        evidence: String,
        confidence: f64,
    },
    Reject {
        tree_id: String,
        node_id: String,
        reason: String,
    },
    Aggregate {
        tree_id: String,
    },
    GetSynthesis {
        tree_id: String,
    },
    GetStatus {
        tree_id: String,
    },
    ListTrees,
    DeleteTree {
        tree_id: String,
    },
}

impl Command {
    /// Build a command from an action name and its flat parameter object.
    pub fn parse(action: &str, params: &Value) -> Result<Self> {
        let action: Action = action.parse()?;
        if !(params.is_object() || params.is_null()) {
            return Err(Error::invalid_input("params must be an object"));
        }
        let p = Params(params);

        let command = match action {
            Action::CreateTree => Self::CreateTree {
                description: p.string("description")?,
            },
            Action::AddChild => Self::AddChild {
                tree_id: p.string("tree_id")?,
                parent_id: p.string("parent_id")?,
                description: p.string("description")?,
                node_type: p.str("node_type")?.parse()?,
                context: p.context("context")?,
            },
            Action::Start => Self::Start {
                tree_id: p.string("tree_id")?,
                node_id: p.string("node_id")?,
            },
            Action::SetResult => Self::SetResult {
                tree_id: p.string("tree_id")?,
                node_id: p.string("node_id")?,
                confirmed: p.bool("confirmed")?,
                evidence: p.string("evidence")?,
                confidence: p.f64("confidence")?,
            },
            Action::Reject => Self::Reject {
                tree_id: p.string("tree_id")?,
                node_id: p.string("node_id")?,
                reason: p.string("reason")?,
            },
            Action::Aggregate => Self::Aggregate {
                tree_id: p.string("tree_id")?,
            },
            Action::GetSynthesis => Self::GetSynthesis {
                tree_id: p.string("tree_id")?,
            },
            Action::GetStatus => Self::GetStatus {
                tree_id: p.string("tree_id")?,
            },
            Action::ListTrees => Self::ListTrees,
            Action::DeleteTree => Self::DeleteTree {
                tree_id: p.string("tree_id")?,
            },
        };
        Ok(command)
    }

    pub fn action(&self) -> Action {
        match self {
            Self::CreateTree { .. } => Action::CreateTree,
            Self::AddChild { .. } => Action::AddChild,
            Self::Start { .. } => Action::Start,
            Self::SetResult { .. } => Action::SetResult,
            Self::Reject { .. } => Action::Reject,
            Self::Aggregate { .. } => Action::Aggregate,
            Self::GetSynthesis { .. } => Action::GetSynthesis,
            Self::GetStatus { .. } => Action::GetStatus,
            Self::ListTrees => Action::ListTrees,
            Self::DeleteTree { .. } => Action::DeleteTree,
        }
    }

    /// The tree this command addresses, if any.
    pub fn tree_id(&self) -> Option<&str> {
        match self {
            Self::AddChild { tree_id, .. }
            | Self::Start { tree_id, .. }
            | Self::SetResult { tree_id, .. }
            | Self::Reject { tree_id, .. }
            | Self::Aggregate { tree_id }
            | Self::GetSynthesis { tree_id }
            | Self::GetStatus { tree_id }
            | Self::DeleteTree { tree_id } => Some(tree_id),
            Self::CreateTree { .. } | Self::ListTrees => None,
        }
    }
}

/// Typed accessors over a request's params object.
struct Params<'a>(&'a Value);

impl<'a> Params<'a> {
    fn field(&self, name: &str) -> Option<&'a Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    fn missing(name: &str) -> Error {
        Error::invalid_input(format!("missing required param: {}", name))
    }

    fn wrong_type(name: &str, expected: &str) -> Error {
        Error::invalid_input(format!("param {} must be {}", name, expected))
    }

    fn str(&self, name: &str) -> Result<&'a str> {
        self.field(name)
            .ok_or_else(|| Self::missing(name))?
            .as_str()
            .ok_or_else(|| Self::wrong_type(name, "a string"))
    }

    fn string(&self, name: &str) -> Result<String> {
        self.str(name).map(String::from)
    }

    fn bool(&self, name: &str) -> Result<bool> {
        self.field(name)
            .ok_or_else(|| Self::missing(name))?
            .as_bool()
            .ok_or_else(|| Self::wrong_type(name, "a boolean"))
    }

    fn f64(&self, name: &str) -> Result<f64> {
        self.field(name)
            .ok_or_else(|| Self::missing(name))?
            .as_f64()
            .ok_or_else(|| Self::wrong_type(name, "a number"))
    }

    /// Optional; absent or null means empty.
    fn context(&self, name: &str) -> Result<Context> {
        match self.field(name) {
            None => Ok(Context::new()),
            Some(value) => value
                .as_object()
                .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .ok_or_else(|| Self::wrong_type(name, "an object")),
        }
    }
}
