//! Static method and error lookup tables.
//!
//! Components and commands are identified on the wire by numeric pairs;
//! callers use symbolic `"Component.command"` names. Notification
//! packets (`ReceiveMessage`) resolve their command through a separate
//! table since notifications share command numbers with requests.
//! The tables are immutable static data; unknown ids render as their
//! numeric form instead of failing.

/// Which command namespace a packet type resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodCategory {
    Command,
    Message,
}

const COMPONENTS: &[(u16, &str)] = &[
    (1, "Authentication"),
    (4, "GameManager"),
    (7, "Stats"),
    (9, "Util"),
    (15, "Messaging"),
    (30722, "UserSessions"),
];

const COMMANDS: &[(u16, u16, &str)] = &[
    (1, 40, "login"),
    (1, 45, "logout"),
    (1, 50, "silentLogin"),
    (1, 60, "expressLogin"),
    (4, 1, "createGame"),
    (4, 2, "destroyGame"),
    (4, 9, "joinGame"),
    (4, 11, "setGameSettings"),
    (7, 14, "getStatsByGroup"),
    (9, 1, "fetchClientConfig"),
    (9, 2, "ping"),
    (9, 7, "preAuth"),
    (9, 8, "postAuth"),
    (15, 1, "sendMessage"),
];

const MESSAGES: &[(u16, u16, &str)] = &[
    (4, 10, "NotifyGameCreated"),
    (4, 20, "NotifyJoinGame"),
    (4, 80, "NotifyGameStateChange"),
    (15, 1, "NotifyMessage"),
    (30722, 1, "UserSessionExtendedDataUpdate"),
    (30722, 2, "UserAdded"),
];

/// `(component, code, name, description)` entries for application
/// errors carried in the `ERRC` field.
const ERRORS: &[(u16, i64, &str, &str)] = &[
    (
        1,
        2,
        "ERR_AUTHENTICATION_REQUIRED",
        "the session is no longer authenticated",
    ),
    (1, 11, "ERR_INVALID_TOKEN", "the auth code was rejected"),
    (1, 12, "ERR_EXPIRED_TOKEN", "the auth code has expired"),
    (4, 2, "ERR_GAME_NOT_FOUND", "no game with the given id"),
    (9, 1, "ERR_SYSTEM", "internal backend failure"),
];

/// Fallback description for `(component, code)` pairs missing from the
/// table.
pub const UNKNOWN_ERROR_DESCRIPTION: &str = "unknown error";

pub fn component_name(id: u16) -> Option<&'static str> {
    COMPONENTS
        .iter()
        .find(|(component, _)| *component == id)
        .map(|(_, name)| *name)
}

pub fn component_id(name: &str) -> Option<u16> {
    COMPONENTS
        .iter()
        .find(|(_, component)| *component == name)
        .map(|(id, _)| *id)
}

pub fn command_name(component: u16, command: u16, category: MethodCategory) -> Option<&'static str> {
    let table = match category {
        MethodCategory::Command => COMMANDS,
        MethodCategory::Message => MESSAGES,
    };
    table
        .iter()
        .find(|(comp, cmd, _)| *comp == component && *cmd == command)
        .map(|(_, _, name)| *name)
}

/// Renders `"Component.command"`, falling back to the numeric id for
/// either half when unresolved.
pub fn method_name(component: u16, command: u16, category: MethodCategory) -> String {
    match (
        component_name(component),
        command_name(component, command, category),
    ) {
        (Some(comp), Some(cmd)) => format!("{comp}.{cmd}"),
        (Some(comp), None) => format!("{comp}.{command}"),
        (None, _) => format!("{component}.{command}"),
    }
}

/// Resolves a symbolic method back to its numeric pair. A literal
/// `"N.M"` numeric pair is accepted for methods outside the table.
pub fn resolve_method(method: &str) -> Option<(u16, u16)> {
    let (comp, cmd) = method.split_once('.')?;
    if let Some(component) = component_id(comp) {
        if let Some(&(_, command, _)) = COMMANDS
            .iter()
            .find(|(c, _, name)| *c == component && *name == cmd)
        {
            return Some((component, command));
        }
    }
    match (comp.parse::<u16>(), cmd.parse::<u16>()) {
        (Ok(component), Ok(command)) => Some((component, command)),
        _ => None,
    }
}

/// Looks up the symbolic name and description for an error pair.
pub fn error_entry(component: u16, code: i64) -> Option<(&'static str, &'static str)> {
    ERRORS
        .iter()
        .find(|(comp, c, _, _)| *comp == component && *c == code)
        .map(|(_, _, name, description)| (*name, *description))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_resolution_roundtrip() {
        assert_eq!(resolve_method("Authentication.login"), Some((1, 40)));
        assert_eq!(
            method_name(1, 40, MethodCategory::Command),
            "Authentication.login"
        );
    }

    #[test]
    fn test_numeric_fallbacks() {
        assert_eq!(resolve_method("123.456"), Some((123, 456)));
        assert_eq!(method_name(123, 456, MethodCategory::Command), "123.456");
        // Known component, unknown command.
        assert_eq!(
            method_name(1, 999, MethodCategory::Command),
            "Authentication.999"
        );
        assert_eq!(resolve_method("NoSuchComponent.nothing"), None);
        assert_eq!(resolve_method("KeepAlive"), None);
    }

    #[test]
    fn test_message_namespace_is_separate() {
        // Command 1 on Messaging resolves differently per category.
        assert_eq!(
            method_name(15, 1, MethodCategory::Command),
            "Messaging.sendMessage"
        );
        assert_eq!(
            method_name(15, 1, MethodCategory::Message),
            "Messaging.NotifyMessage"
        );
    }

    #[test]
    fn test_error_lookup() {
        let (name, _) = error_entry(1, 2).unwrap();
        assert_eq!(name, "ERR_AUTHENTICATION_REQUIRED");
        assert!(error_entry(9999, 9999).is_none());
    }
}
