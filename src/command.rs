//! Textual command format.
//!
//! The command loop reads a script laid out as
//!
//! ```text
//! <n>                     number of nodes
//! <m>                     arity of the implicit m-ary layout
//! <q>                     number of queries
//! <name>      x n         node names, root first
//! <type> <name> <uid>  x q
//! ```
//!
//! where `type` is `1` (lock), `2` (unlock) or `3` (upgrade). Each query
//! produces one output line: `true`, `false`, or `error: ...` when the query
//! names an unknown node. Blank lines are ignored.

use std::str::FromStr;

use thiserror::Error;

use crate::engine::{LockTree, Operation, OperationKind};
use crate::error::{ConstructionError, LockTreeError};
use crate::ids::UserId;
use crate::tree::{Tree, TreeShape};

// ============================================================================
//  Errors
// ============================================================================

/// A single query line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Wrong number of whitespace-separated fields.
    #[error("expected `<type> <name> <uid>`, got {0} fields")]
    FieldCount(usize),

    /// The type field is not `1`, `2` or `3`.
    #[error("unknown operation type `{0}`")]
    UnknownKind(String),

    /// The user id is not an integer.
    #[error("user id `{0}` is not an integer")]
    BadUser(String),
}

/// A script could not be parsed or its tree could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// Input ended before all announced lines were read.
    #[error("unexpected end of input: expected {0}")]
    UnexpectedEof(&'static str),

    /// A header count is not a non-negative integer.
    #[error("line {line}: {field} `{value}` is not a non-negative integer")]
    BadCount {
        /// 1-based line number.
        line: usize,
        /// Which header field.
        field: &'static str,
        /// Raw value.
        value: String,
    },

    /// A query line is malformed.
    #[error("line {line}: {source}")]
    Command {
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        source: CommandError,
    },

    /// The names and arity do not form a tree.
    #[error(transparent)]
    Construction(#[from] ConstructionError),
}

// ============================================================================
//  Operation parsing
// ============================================================================

impl FromStr for Operation {
    type Err = CommandError;

    /// Parse `"<type> <name> <uid>"`.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [kind, node, user] = fields.as_slice() else {
            return Err(CommandError::FieldCount(fields.len()));
        };

        let kind: OperationKind = kind
            .parse::<u8>()
            .ok()
            .and_then(OperationKind::from_code)
            .ok_or_else(|| CommandError::UnknownKind((*kind).to_string()))?;
        let user: i64 = user
            .parse()
            .map_err(|_| CommandError::BadUser((*user).to_string()))?;

        Ok(Self::new(kind, *node, UserId(user)))
    }
}

// ============================================================================
//  Script
// ============================================================================

/// A parsed command script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// Node names, root first.
    pub names: Vec<String>,
    /// Arity of the implicit layout.
    pub arity: usize,
    /// Queries in order.
    pub operations: Vec<Operation>,
}

impl Script {
    /// Parse a whole script.
    ///
    /// # Errors
    /// [`InputError`] describing the first malformed or missing line.
    pub fn parse(input: &str) -> Result<Self, InputError> {
        let mut lines = input
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let mut count = |field: &'static str| -> Result<usize, InputError> {
            let (line, raw) = lines.next().ok_or(InputError::UnexpectedEof(field))?;
            raw.parse().map_err(|_| InputError::BadCount {
                line,
                field,
                value: raw.to_string(),
            })
        };

        let n: usize = count("node count")?;
        let arity: usize = count("arity")?;
        let q: usize = count("query count")?;

        let mut names: Vec<String> = Vec::with_capacity(n);
        for _ in 0..n {
            let (_, name) = lines.next().ok_or(InputError::UnexpectedEof("node name"))?;
            names.push(name.to_string());
        }

        let mut operations: Vec<Operation> = Vec::with_capacity(q);
        for _ in 0..q {
            let (line, raw) = lines.next().ok_or(InputError::UnexpectedEof("query"))?;
            let op: Operation = raw
                .parse()
                .map_err(|source| InputError::Command { line, source })?;
            operations.push(op);
        }

        Ok(Self {
            names,
            arity,
            operations,
        })
    }

    /// Build the lock tree described by the header and names.
    ///
    /// # Errors
    /// [`ConstructionError`] if the names do not form a tree.
    pub fn build(&self) -> Result<Tree, ConstructionError> {
        Tree::build(self.names.iter().cloned(), TreeShape::Arity(self.arity))
    }

    /// Run every query against `locks`, in order.
    pub fn run(&self, locks: &LockTree) -> Vec<Result<bool, LockTreeError>> {
        self.operations.iter().map(|op| locks.apply(op)).collect()
    }
}

/// Output line for one query result.
#[must_use]
pub fn render(outcome: &Result<bool, LockTreeError>) -> String {
    match outcome {
        Ok(granted) => granted.to_string(),
        Err(err) => format!("error: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "7
2
5
World
Asia
Africa
China
India
SouthAfrica
Egypt
1 China 9
1 India 9
3 Asia 9
2 India 9
2 Asia 9
";

    #[test]
    fn test_parse_operation() {
        let op: Operation = "3  Asia   -4".parse().unwrap();
        assert_eq!(op, Operation::new(OperationKind::Upgrade, "Asia", UserId(-4)));
    }

    #[test]
    fn test_parse_operation_errors() {
        assert_eq!(
            "1 China".parse::<Operation>().unwrap_err(),
            CommandError::FieldCount(2)
        );
        assert_eq!(
            "7 China 1".parse::<Operation>().unwrap_err(),
            CommandError::UnknownKind("7".into())
        );
        assert_eq!(
            "1 China x".parse::<Operation>().unwrap_err(),
            CommandError::BadUser("x".into())
        );
    }

    #[test]
    fn test_script_end_to_end() {
        let script = Script::parse(SAMPLE).unwrap();
        assert_eq!(script.names.len(), 7);
        assert_eq!(script.arity, 2);

        let locks = LockTree::new(script.build().unwrap());
        let rendered: Vec<String> = script.run(&locks).iter().map(render).collect();
        assert_eq!(rendered, ["true", "true", "true", "false", "true"]);
    }

    #[test]
    fn test_unknown_node_renders_error() {
        let script = Script::parse("1\n0\n1\nroot\n1 nowhere 3\n").unwrap();
        let locks = LockTree::new(script.build().unwrap());

        let outcomes = script.run(&locks);
        assert_eq!(render(&outcomes[0]), "error: node not found: nowhere");
    }

    #[test]
    fn test_script_errors_carry_line_numbers() {
        assert_eq!(
            Script::parse("3\nx\n").unwrap_err(),
            InputError::BadCount {
                line: 2,
                field: "arity",
                value: "x".into(),
            }
        );
        assert_eq!(
            Script::parse("1\n1\n1\nroot\n").unwrap_err(),
            InputError::UnexpectedEof("query")
        );
        assert!(matches!(
            Script::parse("1\n1\n1\nroot\n9 root 1\n").unwrap_err(),
            InputError::Command { line: 5, .. }
        ));
    }
}
