//! Named commands: thin wrappers over [`Manager::send_action`] and
//! [`Manager::send_action_await`] that fill in the action name.
//!
//! ```ignore
//! use amiwire_client::Action;
//!
//! let reply = manager
//!     .getvar_await(
//!         Action::default()
//!             .field("channel", "SIP/5060-44d225d0")
//!             .field("variable", "CALLERID"),
//!         None,
//!     )
//!     .await;
//! println!("{:?}", reply.value());
//! ```
//!
//! Sending `logoff` (either form) disables reconnection first: the server
//! closes the connection after its `Goodbye`.

use std::fmt;
use std::time::Duration;

use crate::error::Result;
use crate::manager::{ActionReply, Manager};
use crate::protocol::Action;

/// Actions with a dedicated method on [`Manager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Login,
    Logoff,
    Events,
    Originate,
    Redirect,
    Hangup,
    Ping,
    Setvar,
    Getvar,
    Command,
}

impl Command {
    pub const ALL: [Command; 10] = [
        Command::Login,
        Command::Logoff,
        Command::Events,
        Command::Originate,
        Command::Redirect,
        Command::Hangup,
        Command::Ping,
        Command::Setvar,
        Command::Getvar,
        Command::Command,
    ];

    /// Action name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Login => "login",
            Command::Logoff => "logoff",
            Command::Events => "events",
            Command::Originate => "originate",
            Command::Redirect => "redirect",
            Command::Hangup => "hangup",
            Command::Ping => "ping",
            Command::Setvar => "setvar",
            Command::Getvar => "getvar",
            Command::Command => "command",
        }
    }

    /// An empty action of this kind.
    pub fn action(&self) -> Action {
        Action::new(self.name())
    }

    /// `fields` renamed to this command.
    pub fn apply(&self, mut fields: Action) -> Action {
        fields.set_name(self.name());
        fields
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! command_methods {
    ($($(#[$doc:meta])* $variant:ident => $send:ident, $send_await:ident;)*) => {
        impl Manager {
            $(
                $(#[$doc])*
                pub async fn $send(&self, fields: Action) -> Result<()> {
                    self.send_command(Command::$variant, fields).await
                }

                $(#[$doc])*
                ///
                /// Waits for the correlated response; see
                /// [`send_action_await`](Manager::send_action_await).
                pub async fn $send_await(
                    &self,
                    fields: Action,
                    timeout: Option<Duration>,
                ) -> ActionReply {
                    self.send_command_await(Command::$variant, fields, timeout).await
                }
            )*
        }
    };
}

command_methods! {
    /// Send a `login` action.
    Login => login, login_await;
    /// Send a `logoff` action and disable reconnection.
    Logoff => logoff, logoff_await;
    /// Change the event mask (`eventmask` field).
    Events => events, events_await;
    /// Originate a call. Channel variables go in a multi-valued `variable`
    /// field (see [`Action::vars`]).
    Originate => originate, originate_await;
    /// Transfer a channel.
    Redirect => redirect, redirect_await;
    /// Hang up a channel.
    Hangup => hangup, hangup_await;
    /// Send a keepalive. The correlated form succeeds on `Pong`.
    Ping => ping, ping_await;
    /// Set a channel variable.
    Setvar => setvar, setvar_await;
    /// Run a server CLI command.
    Command => command, command_await;
}

impl Manager {
    /// Read a channel variable. Returns [`ActionReply::Value`] when the
    /// server reports one.
    pub async fn getvar_await(&self, fields: Action, timeout: Option<Duration>) -> ActionReply {
        self.send_command_await(Command::Getvar, fields, timeout)
            .await
    }

    async fn send_command(&self, command: Command, fields: Action) -> Result<()> {
        if command == Command::Logoff {
            self.disable_reconnect();
        }
        self.send_action(command.apply(fields)).await
    }

    async fn send_command_await(
        &self,
        command: Command,
        fields: Action,
        timeout: Option<Duration>,
    ) -> ActionReply {
        if command == Command::Logoff {
            self.disable_reconnect();
        }
        self.send_action_await(command.apply(fields), timeout).await
    }
}
