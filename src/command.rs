//! Command surface: named commands with typed positional arguments.
//!
//! A line starting with `/` is parsed into a [`Command`]; anything else is
//! shorthand for creating a node with that text. When the session has a
//! selected node, it binds as the command's subject and the first positional
//! argument shifts to the object slot, so `/done` acts on the selection and
//! `/child abc` links the selection to node `abc`.
//!
//! Unresolvable id prefixes and malformed status/type values fail the whole
//! command with a message for the caller; state is never partially applied.

use std::sync::Arc;

use crate::canvas::CanvasController;
use crate::error::{CommandError, TopoResult};
use crate::graph::{Direction, NodeId, NodeKind};
use crate::manager::GraphStateManager;
use crate::session::{FocusTarget, Session};

/// A parsed command, arguments still in raw prefix/string form.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a node connected to an anchor.
    Add { anchor: String, direction: Direction },
    Delete { subject: String },
    /// Make `object` a child of `subject`.
    Child { subject: String, object: String },
    Status { subject: String, status: String },
    SetPriority { subject: String, priority: u8 },
    Pin { subject: String, pinned: bool },
    SetKind { subject: String, kind: String },
    Layout,
    Focus { subject: String },
    Unfocus,
    Hide { subject: String },
    /// Un-hide one node, or everything when no subject is given.
    Show { subject: Option<String> },
    Backup,
}

/// What a successfully executed command did, for display.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Created(NodeId),
    Updated(NodeId),
    Deleted,
    EdgeAdded(String),
    LaidOut,
    Focused(NodeId),
    Unfocused,
    Hidden(NodeId),
    Shown,
    BackedUp(Option<String>),
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Created(id) => write!(f, "created {}", id.short()),
            Outcome::Updated(id) => write!(f, "updated {}", id.short()),
            Outcome::Deleted => write!(f, "deleted"),
            Outcome::EdgeAdded(edge) => write!(f, "edge added: {edge}"),
            Outcome::LaidOut => write!(f, "layout recomputed"),
            Outcome::Focused(id) => write!(f, "focused {}", id.short()),
            Outcome::Unfocused => write!(f, "selection cleared"),
            Outcome::Hidden(id) => write!(f, "hidden {}", id.short()),
            Outcome::Shown => write!(f, "shown"),
            Outcome::BackedUp(Some(key)) => write!(f, "backup written: {key}"),
            Outcome::BackedUp(None) => write!(f, "nothing to back up"),
        }
    }
}

/// Parse one `/`-stripped command line against an optional bound subject.
pub fn parse(input: &str, bound: Option<&str>) -> Result<Command, CommandError> {
    let mut tokens = input.split_whitespace();
    let name = tokens.next().ok_or(CommandError::Unknown {
        name: String::new(),
    })?;
    let args: Vec<&str> = tokens.collect();

    match name {
        "add" => {
            let (anchor, keyword) = bind_two("add", &args, bound)?;
            let direction = match keyword.as_deref() {
                None | Some("child") => Direction::Child,
                Some("parent") => Direction::Parent,
                Some(other) => {
                    return Err(CommandError::InvalidConnection {
                        given: other.to_string(),
                    });
                }
            };
            Ok(Command::Add { anchor, direction })
        }
        "delete" => Ok(Command::Delete {
            subject: bind_one("delete", &args, bound)?,
        }),
        "child" => {
            let (subject, object) = bind_two("child", &args, bound)?;
            let object = object.ok_or(CommandError::MissingArgument {
                command: "child",
                arg: "object",
            })?;
            Ok(Command::Child { subject, object })
        }
        "status" => {
            let (subject, status) = bind_two("status", &args, bound)?;
            let status = status.ok_or(CommandError::MissingArgument {
                command: "status",
                arg: "status",
            })?;
            Ok(Command::Status { subject, status })
        }
        "done" | "active" | "unset" => {
            let command: &'static str = match name {
                "done" => "done",
                "active" => "active",
                _ => "unset",
            };
            Ok(Command::Status {
                subject: bind_one(command, &args, bound)?,
                status: name.to_string(),
            })
        }
        "p0" | "p1" | "p2" | "p3" | "p4" => {
            let priority = name.as_bytes()[1] - b'0';
            Ok(Command::SetPriority {
                subject: bind_one("priority", &args, bound)?,
                priority,
            })
        }
        "pin" => Ok(Command::Pin {
            subject: bind_one("pin", &args, bound)?,
            pinned: true,
        }),
        "unpin" => Ok(Command::Pin {
            subject: bind_one("unpin", &args, bound)?,
            pinned: false,
        }),
        "type" => {
            let (subject, kind) = bind_two("type", &args, bound)?;
            let kind = kind.ok_or(CommandError::MissingArgument {
                command: "type",
                arg: "type",
            })?;
            Ok(Command::SetKind { subject, kind })
        }
        "layout" => {
            expect_empty("layout", &args)?;
            Ok(Command::Layout)
        }
        "focus" => Ok(Command::Focus {
            subject: bind_one("focus", &args, bound)?,
        }),
        "unfocus" => {
            expect_empty("unfocus", &args)?;
            Ok(Command::Unfocus)
        }
        "hide" => Ok(Command::Hide {
            subject: bind_one("hide", &args, bound)?,
        }),
        "show" => match args.len() {
            0 => Ok(Command::Show { subject: None }),
            1 => Ok(Command::Show {
                subject: Some(args[0].to_string()),
            }),
            _ => Err(CommandError::ExtraArguments {
                command: "show",
                max: 1,
            }),
        },
        "backup" => {
            expect_empty("backup", &args)?;
            Ok(Command::Backup)
        }
        other => Err(CommandError::Unknown {
            name: other.to_string(),
        }),
    }
}

/// One subject argument, satisfiable by the bound selection.
fn bind_one(
    command: &'static str,
    args: &[&str],
    bound: Option<&str>,
) -> Result<String, CommandError> {
    match (args, bound) {
        ([only], _) => Ok((*only).to_string()),
        ([], Some(bound)) => Ok(bound.to_string()),
        ([], None) => Err(CommandError::MissingArgument {
            command,
            arg: "subject",
        }),
        _ => Err(CommandError::ExtraArguments { command, max: 1 }),
    }
}

/// Subject plus optional second argument. With a bound selection the subject
/// slot is pre-filled and positional args shift right, exactly like the
/// interactive command line.
fn bind_two(
    command: &'static str,
    args: &[&str],
    bound: Option<&str>,
) -> Result<(String, Option<String>), CommandError> {
    let (subject, rest): (String, &[&str]) = match bound {
        Some(bound) if args.len() < 2 => (bound.to_string(), args),
        _ => match args {
            [] => {
                return Err(CommandError::MissingArgument {
                    command,
                    arg: "subject",
                });
            }
            [subject, rest @ ..] => ((*subject).to_string(), rest),
        },
    };
    match rest {
        [] => Ok((subject, None)),
        [second] => Ok((subject, Some((*second).to_string()))),
        _ => Err(CommandError::ExtraArguments { command, max: 2 }),
    }
}

fn expect_empty(command: &'static str, args: &[&str]) -> Result<(), CommandError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(CommandError::ExtraArguments { command, max: 0 })
    }
}

/// Executes parsed commands against the state manager, canvas, and session.
pub struct CommandInterpreter {
    manager: Arc<GraphStateManager>,
    canvas: Arc<CanvasController>,
    session: Arc<Session>,
}

impl CommandInterpreter {
    pub fn new(
        manager: Arc<GraphStateManager>,
        canvas: Arc<CanvasController>,
        session: Arc<Session>,
    ) -> Self {
        Self {
            manager,
            canvas,
            session,
        }
    }

    /// Interpret one input line: `/command args…`, or plain text to create a
    /// node with that value.
    pub async fn execute_line(&self, line: &str) -> TopoResult<Outcome> {
        if let Some(rest) = line.strip_prefix('/') {
            let bound = self.session.selected().map(|id| id.to_string());
            let command = parse(rest, bound.as_deref())?;
            self.run(command).await
        } else {
            let id = self.manager.add_node(line.trim()).await?;
            Ok(Outcome::Created(id))
        }
    }

    /// Execute one parsed command.
    pub async fn run(&self, command: Command) -> TopoResult<Outcome> {
        match command {
            Command::Add { anchor, direction } => {
                // Multi-step flow: each step runs only after the previous
                // step's effect has landed on the canvas. The manager action
                // itself awaits one propagation turn before resolving.
                let id = self.manager.add_linked_node(&anchor, direction).await?;
                self.session.select(id.clone());
                self.session.request_focus(FocusTarget::Title);
                self.canvas.layout_nodes_and_center_selected();
                Ok(Outcome::Created(id))
            }
            Command::Delete { subject } => {
                self.manager.delete_node(&subject).await?;
                Ok(Outcome::Deleted)
            }
            Command::Child { subject, object } => {
                let edge = self.manager.add_edge(&subject, &object).await?;
                Ok(Outcome::EdgeAdded(edge))
            }
            Command::Status { subject, status } => {
                let id = self.manager.set_status(&subject, &status).await?;
                Ok(Outcome::Updated(id))
            }
            Command::SetPriority { subject, priority } => {
                let id = self.manager.set_priority(&subject, priority).await?;
                Ok(Outcome::Updated(id))
            }
            Command::Pin { subject, pinned } => {
                let id = self.manager.set_pinned(&subject, pinned).await?;
                Ok(Outcome::Updated(id))
            }
            Command::SetKind { subject, kind } => {
                let kind = NodeKind::parse(&kind)?;
                let id = self.manager.set_kind(&subject, kind).await?;
                Ok(Outcome::Updated(id))
            }
            Command::Layout => {
                self.canvas.layout_nodes();
                Ok(Outcome::LaidOut)
            }
            Command::Focus { subject } => {
                let id = self.manager.reconcile_id(&subject)?;
                self.session.select(id.clone());
                self.canvas.center(&id);
                Ok(Outcome::Focused(id))
            }
            Command::Unfocus => {
                self.session.clear_selection();
                Ok(Outcome::Unfocused)
            }
            Command::Hide { subject } => {
                let id = self.manager.reconcile_id(&subject)?;
                self.session.hide(id.clone());
                Ok(Outcome::Hidden(id))
            }
            Command::Show { subject } => {
                match subject {
                    Some(prefix) => {
                        let id = self.manager.reconcile_id(&prefix)?;
                        self.session.show(&id);
                    }
                    None => self.session.show_all(),
                }
                Ok(Outcome::Shown)
            }
            Command::Backup => Ok(Outcome::BackedUp(self.manager.backup()?)),
        }
    }
}
