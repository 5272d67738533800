//! Administrative command dispatch.
//!
//! A static name-to-handler table with per-command permission gating.
//! Every handler reads or mutates the registry and the user store and
//! produces a `CommandResult` envelope for the invoking session only —
//! commands never broadcast.

use std::sync::Arc;

use parley_protocol::Envelope;
use parley_session::Session;
use parley_store::UserRepository;

use crate::server::{SERVER_QUITTING_REASON, ServerState};

/// Which built-in handler a table entry maps to.
enum Handler {
    Help,
    List,
    Quit,
    Kickout,
    MakeAdmin,
}

struct CommandSpec {
    name: &'static str,
    admin_only: bool,
    help: &'static str,
    handler: Handler,
}

/// The command table. `help` renders it; dispatch searches it.
const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "help",
        admin_only: false,
        help: "list available commands",
        handler: Handler::Help,
    },
    CommandSpec {
        name: "list",
        admin_only: false,
        help: "list connected users",
        handler: Handler::List,
    },
    CommandSpec {
        name: "quit",
        admin_only: true,
        help: "shut the server down",
        handler: Handler::Quit,
    },
    CommandSpec {
        name: "kickout",
        admin_only: true,
        help: "kickout <name>: disconnect a user",
        handler: Handler::Kickout,
    },
    CommandSpec {
        name: "make-admin",
        admin_only: true,
        help: "make-admin <name>: grant admin rights",
        handler: Handler::MakeAdmin,
    },
];

fn result(command: &str, lines: Vec<String>, success: bool) -> Envelope {
    Envelope::CommandResult {
        command: command.to_string(),
        lines,
        success,
    }
}

/// Routes one command invocation to its handler.
///
/// Unknown names and failed permission checks are handled-but-
/// unsuccessful invocations: the session stays open and gets a
/// `CommandResult` with `success == false`.
pub(crate) async fn dispatch<R: UserRepository>(
    state: &Arc<ServerState<R>>,
    session: &Arc<Session>,
    command: &str,
    parameter: &str,
) -> Envelope {
    // Every invocation is logged, independent of outcome.
    tracing::info!(
        invoker = %session.display_name(),
        command,
        parameter,
        "command invoked"
    );

    let Some(spec) = COMMANDS.iter().find(|c| c.name == command) else {
        return result(
            command,
            vec![format!("unsupported command: {command}")],
            false,
        );
    };

    if spec.admin_only && !session.is_admin() {
        return result(command, vec!["unauthorized".to_string()], false);
    }

    match spec.handler {
        Handler::Help => cmd_help(command),
        Handler::List => cmd_list(state, command),
        Handler::Quit => cmd_quit(state, command),
        Handler::Kickout => cmd_kickout(state, session, command, parameter),
        Handler::MakeAdmin => cmd_make_admin(state, command, parameter).await,
    }
}

fn cmd_help(command: &str) -> Envelope {
    let lines = COMMANDS
        .iter()
        .map(|c| {
            format!(
                "{} - {}{}",
                c.name,
                c.help,
                if c.admin_only { " (admin)" } else { "" }
            )
        })
        .collect();
    result(command, lines, true)
}

fn cmd_list<R: UserRepository>(state: &Arc<ServerState<R>>, command: &str) -> Envelope {
    let mut lines = Vec::new();
    state.registry.for_each(|s| lines.push(s.info_line()));
    result(command, lines, true)
}

fn cmd_quit<R: UserRepository>(state: &Arc<ServerState<R>>, command: &str) -> Envelope {
    state.shutdown.trigger();
    // Kick everyone (the invoker included) so blocked receives
    // unblock; the accept loop notices the flag on its own.
    let kicked = state
        .registry
        .kickout_matching(|_| true, SERVER_QUITTING_REASON);
    result(
        command,
        vec![format!("shutting down, disconnecting {kicked} session(s)")],
        true,
    )
}

fn cmd_kickout<R: UserRepository>(
    state: &Arc<ServerState<R>>,
    session: &Arc<Session>,
    command: &str,
    parameter: &str,
) -> Envelope {
    if parameter.is_empty() {
        return result(command, vec!["usage: kickout <name>".to_string()], false);
    }

    let reason = format!("kicked out by {}", session.display_name());
    let kicked = state
        .registry
        .kickout_matching(|s| s.display_name() == parameter, &reason);

    if kicked > 0 {
        result(
            command,
            vec![format!("kicked {kicked} session(s) of {parameter}")],
            true,
        )
    } else {
        result(
            command,
            vec![format!("{parameter} is not connected")],
            false,
        )
    }
}

async fn cmd_make_admin<R: UserRepository>(
    state: &Arc<ServerState<R>>,
    command: &str,
    parameter: &str,
) -> Envelope {
    if parameter.is_empty() {
        return result(command, vec!["usage: make-admin <name>".to_string()], false);
    }

    // Deliberately a lookup, not find-or-create: a typo here must not
    // mint a brand-new admin account.
    let user = match state.users.find_existing(parameter).await {
        Ok(user) => user,
        Err(e) => {
            return result(
                command,
                vec![format!("can't make {parameter} an admin: {e}")],
                false,
            );
        }
    };

    match state.users.set_admin(&user, true).await {
        Ok(()) => result(
            command,
            vec![format!("{parameter} is now an admin")],
            true,
        ),
        Err(e) => result(
            command,
            vec![format!("can't update {parameter}: {e}")],
            false,
        ),
    }
}
