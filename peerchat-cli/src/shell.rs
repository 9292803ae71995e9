//! Shell commands
//!
//! Parses one input line into a [`Command`] and runs it against a
//! [`ChatPeer`], producing the text to print.

use peerchat_core::{ChatError, ChatPeer, GroupId, UserId};
use std::fmt::Write as _;
use std::str::FromStr;
use thiserror::Error;

pub const HELP: &str = "\
Commands:
  create_user <name>                          create a user hosted by this peer
  create_group <name>                         create an empty group
  add_user_to_group <user_id> <group_id>      add a user to a group
  send_message <group_id> <user_id> <text...> send a message to a group
  list_users                                  list every known user
  list_groups                                 list every known group
  get_groups <user_id>                        groups a user belongs to
  get_users <group_id>                        members of a group
  inbox <user_id>                             new messages of a local user
  help                                        show this help
  exit | quit                                 leave the shell
Arguments containing spaces can be quoted: create_group \"Rust Devs\"";

/// A parsed shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateUser { name: String },
    CreateGroup { name: String },
    AddUserToGroup { user_id: UserId, group_id: GroupId },
    SendMessage { group_id: GroupId, user_id: UserId, body: String },
    ListUsers,
    ListGroups,
    GetGroups { user_id: UserId },
    GetUsers { group_id: GroupId },
    Inbox { user_id: UserId },
    Help,
    Exit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command '{0}', type 'help' for the command list")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid id '{0}'")]
    InvalidId(String),

    #[error("unterminated quote")]
    UnterminatedQuote,
}

impl Command {
    /// Parse one input line; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let tokens = tokenize(line)?;
        let Some((name, args)) = tokens.split_first() else {
            return Ok(None);
        };

        let command = match name.as_str() {
            "create_user" => Command::CreateUser {
                name: rest(args, "create_user <name>")?,
            },
            "create_group" => Command::CreateGroup {
                name: rest(args, "create_group <name>")?,
            },
            "add_user_to_group" => {
                const USAGE: &str = "add_user_to_group <user_id> <group_id>";
                let [user_id, group_id] = args else {
                    return Err(ParseError::Usage(USAGE));
                };
                Command::AddUserToGroup {
                    user_id: id(user_id)?,
                    group_id: id(group_id)?,
                }
            }
            "send_message" => {
                const USAGE: &str = "send_message <group_id> <user_id> <text...>";
                let [group_id, user_id, text @ ..] = args else {
                    return Err(ParseError::Usage(USAGE));
                };
                Command::SendMessage {
                    group_id: id(group_id)?,
                    user_id: id(user_id)?,
                    body: rest(text, USAGE)?,
                }
            }
            "list_users" => Command::ListUsers,
            "list_groups" => Command::ListGroups,
            "get_groups" => Command::GetGroups {
                user_id: single_id(args, "get_groups <user_id>")?,
            },
            "get_users" => Command::GetUsers {
                group_id: single_id(args, "get_users <group_id>")?,
            },
            "inbox" => Command::Inbox {
                user_id: single_id(args, "inbox <user_id>")?,
            },
            "help" | "?" => Command::Help,
            "exit" | "quit" => Command::Exit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

/// Split a line into words, honouring single and double quotes
///
/// Inside double quotes and outside quotes a backslash escapes the next
/// character; single quotes are literal.
pub fn tokenize(line: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(ParseError::UnterminatedQuote),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c) => current.push(c),
                            None => return Err(ParseError::UnterminatedQuote),
                        },
                        Some(c) => current.push(c),
                        None => return Err(ParseError::UnterminatedQuote),
                    }
                }
            }
            '\\' => {
                in_token = true;
                if let Some(c) = chars.next() {
                    current.push(c);
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn rest(args: &[String], usage: &'static str) -> Result<String, ParseError> {
    if args.is_empty() {
        return Err(ParseError::Usage(usage));
    }
    Ok(args.join(" "))
}

fn id<T: FromStr>(raw: &str) -> Result<T, ParseError> {
    raw.parse().map_err(|_| ParseError::InvalidId(raw.to_string()))
}

fn single_id<T: FromStr>(args: &[String], usage: &'static str) -> Result<T, ParseError> {
    match args {
        [raw] => id(raw),
        _ => Err(ParseError::Usage(usage)),
    }
}

/// Run a command and render its confirmation
///
/// `Help` and `Exit` are handled by the caller's loop; here they only
/// render text.
pub fn execute(peer: &ChatPeer, command: Command) -> Result<String, ChatError> {
    let out = match command {
        Command::CreateUser { name } => {
            let user = peer.create_user(&name)?;
            format!("User '{}' created with id {}", user.display_name, user.id)
        }
        Command::CreateGroup { name } => {
            let group = peer.create_group(&name)?;
            format!("Group '{}' created with id {}", group.name, group.id)
        }
        Command::AddUserToGroup { user_id, group_id } => {
            let membership = peer.add_user_to_group(&user_id, &group_id)?;
            if membership.changed {
                format!("User {} added to group {}", user_id, group_id)
            } else {
                format!("User {} is already a member of group {}", user_id, group_id)
            }
        }
        Command::SendMessage {
            group_id,
            user_id,
            body,
        } => {
            let id = peer.send_message(&group_id, &user_id, &body)?;
            format!("Message {} sent to group {}", id, group_id)
        }
        Command::ListUsers => {
            let users = peer.list_users();
            if users.is_empty() {
                "No users".to_string()
            } else {
                let local = peer.local_users();
                let mut out = String::new();
                for user in users {
                    let marker = if local.contains(&user.id) { " (local)" } else { "" };
                    let _ = writeln!(
                        out,
                        "{}  {}{}  groups: {}",
                        user.id,
                        user.display_name,
                        marker,
                        user.group_ids.len()
                    );
                }
                out.trim_end().to_string()
            }
        }
        Command::ListGroups => {
            let groups = peer.list_groups();
            if groups.is_empty() {
                "No groups".to_string()
            } else {
                let mut out = String::new();
                for group in groups {
                    let _ = writeln!(
                        out,
                        "{}  {}  members: {}",
                        group.id,
                        group.name,
                        group.member_ids.len()
                    );
                }
                out.trim_end().to_string()
            }
        }
        Command::GetGroups { user_id } => {
            let groups = peer.groups_of(&user_id)?;
            if groups.is_empty() {
                format!("User {} is not in any group", user_id)
            } else {
                groups
                    .iter()
                    .map(|g| format!("{}  {}", g.id, g.name))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Command::GetUsers { group_id } => {
            let users = peer.members_of(&group_id)?;
            if users.is_empty() {
                format!("Group {} has no members", group_id)
            } else {
                users
                    .iter()
                    .map(|u| format!("{}  {}", u.id, u.display_name))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Command::Inbox { user_id } => {
            let messages = peer.poll_inbox(&user_id)?;
            if messages.is_empty() {
                "No new messages".to_string()
            } else {
                let snapshot = peer.snapshot();
                messages
                    .iter()
                    .map(|m| {
                        let group = snapshot.group(&m.group_id).map(|g| g.name.as_str());
                        let sender = snapshot.user(&m.sender_id).map(|u| u.display_name.as_str());
                        format!(
                            "[{}] {}: {}",
                            group.unwrap_or("?"),
                            sender.unwrap_or("?"),
                            m.body
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Command::Help => HELP.to_string(),
        Command::Exit => "Bye".to_string(),
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerchat_core::{Config, InMemoryTransport};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_tokenize_quotes() {
        assert_eq!(
            tokenize(r#"create_group "Rust Devs"  'a b' c\ d"#).unwrap(),
            vec!["create_group", "Rust Devs", "a b", "c d"]
        );
        assert_eq!(tokenize(r#"say "he said \"hi\"""#).unwrap(), vec!["say", r#"he said "hi""#]);
        assert_eq!(tokenize(r#"x """#).unwrap(), vec!["x", ""]);
        assert!(tokenize("   ").unwrap().is_empty());
        assert_eq!(tokenize("bad \"quote"), Err(ParseError::UnterminatedQuote));
    }

    #[test]
    fn test_parse_commands() {
        let user = UserId::generate();
        let group = GroupId::generate();

        assert_eq!(Command::parse("").unwrap(), None);
        assert_eq!(
            Command::parse("create_user John Doe").unwrap(),
            Some(Command::CreateUser {
                name: "John Doe".to_string()
            })
        );
        assert_eq!(
            Command::parse(&format!("add_user_to_group {} {}", user, group)).unwrap(),
            Some(Command::AddUserToGroup {
                user_id: user,
                group_id: group
            })
        );
        assert_eq!(
            Command::parse(&format!("send_message {} {} hello   there \"you two\"", group, user))
                .unwrap(),
            Some(Command::SendMessage {
                group_id: group,
                user_id: user,
                body: "hello there you two".to_string()
            })
        );
        assert_eq!(Command::parse("quit").unwrap(), Some(Command::Exit));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Command::parse("create_user"),
            Err(ParseError::Usage("create_user <name>"))
        );
        assert!(matches!(
            Command::parse("get_groups not-a-uuid"),
            Err(ParseError::InvalidId(_))
        ));
        assert!(matches!(
            Command::parse(&format!("send_message {}", GroupId::generate())),
            Err(ParseError::Usage(_))
        ));
        assert_eq!(
            Command::parse("dance"),
            Err(ParseError::Unknown("dance".to_string()))
        );
    }

    #[tokio::test]
    async fn test_execute_session() {
        let mut config = Config::default();
        config.bus.poll_interval = Duration::from_millis(5);
        let peer = ChatPeer::start(config, Arc::new(InMemoryTransport::default())).unwrap();

        let alice = peer.create_user("alice").unwrap();
        let bob = peer.create_user("bob").unwrap();
        let out = execute(&peer, Command::CreateGroup { name: "team".into() }).unwrap();
        assert!(out.starts_with("Group 'team' created with id "));
        let group = peer.list_groups()[0].id;

        for user in [alice.id, bob.id] {
            let out = execute(&peer, Command::AddUserToGroup { user_id: user, group_id: group }).unwrap();
            assert!(out.contains("added to group"));
        }
        let out = execute(&peer, Command::AddUserToGroup { user_id: bob.id, group_id: group }).unwrap();
        assert!(out.contains("already a member"));

        execute(
            &peer,
            Command::SendMessage {
                group_id: group,
                user_id: alice.id,
                body: "hello bob".into(),
            },
        )
        .unwrap();

        let mut inbox = String::new();
        for _ in 0..500 {
            inbox = execute(&peer, Command::Inbox { user_id: bob.id }).unwrap();
            if inbox != "No new messages" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(inbox, "[team] alice: hello bob");

        let members = execute(&peer, Command::GetUsers { group_id: group }).unwrap();
        assert_eq!(members.lines().count(), 2);

        let err = execute(&peer, Command::GetGroups { user_id: UserId::generate() }).unwrap_err();
        assert!(err.is_not_found());
    }
}
