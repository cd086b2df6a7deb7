use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, BridgeResult};

/// Path of a Lua script file loaded when a session starts.
pub const SCRIPT_OPTION: &str = "script";
/// Lua source evaluated after the script file.
pub const INJECT_OPTION: &str = "inject";

/// The catalog object an option is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionContext {
    ForeignDataWrapper,
    Server,
    UserMapping,
    ForeignTable,
    Attribute,
}

const VALID_OPTIONS: &[(&str, OptionContext)] = &[
    (SCRIPT_OPTION, OptionContext::ForeignTable),
    (INJECT_OPTION, OptionContext::ForeignTable),
];

impl OptionContext {
    pub fn valid_options(&self) -> Vec<&'static str> {
        VALID_OPTIONS
            .iter()
            .filter(|(_, context)| context == self)
            .map(|(name, _)| *name)
            .collect()
    }

    fn hint(&self) -> String {
        let options = self.valid_options();
        if options.is_empty() {
            "There are no valid options in this context.".to_string()
        } else {
            format!("Valid options in this context are: {}", options.join(", "))
        }
    }
}

impl fmt::Display for OptionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptionContext::ForeignDataWrapper => "wrapper",
            OptionContext::Server => "server",
            OptionContext::UserMapping => "user-mapping",
            OptionContext::ForeignTable => "table",
            OptionContext::Attribute => "column",
        };
        write!(f, "{name}")
    }
}

impl FromStr for OptionContext {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wrapper" | "fdw" | "foreign-data-wrapper" => Ok(OptionContext::ForeignDataWrapper),
            "server" => Ok(OptionContext::Server),
            "user-mapping" | "user" => Ok(OptionContext::UserMapping),
            "table" | "foreign-table" => Ok(OptionContext::ForeignTable),
            "column" | "attribute" => Ok(OptionContext::Attribute),
            other => Err(BridgeError::internal(format!("unknown option context: {other}"))),
        }
    }
}

/// Checks that every option name is accepted in the given context.
///
/// The first unrecognized option fails with a hint listing the options that
/// are valid for the context.
pub fn validate_options<'a, I>(context: OptionContext, names: I) -> BridgeResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    for name in names {
        if !VALID_OPTIONS.iter().any(|(n, c)| *n == name && *c == context) {
            return Err(BridgeError::Config {
                option: name.to_string(),
                hint: context.hint(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_options() {
        assert!(validate_options(OptionContext::ForeignTable, ["script", "inject"]).is_ok());
        assert!(validate_options(OptionContext::ForeignTable, []).is_ok());
        let err = validate_options(OptionContext::ForeignTable, ["script", "format"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid option \"format\": Valid options in this context are: script, inject"
        );
    }

    #[test]
    fn test_contexts_without_options() {
        for context in [
            OptionContext::ForeignDataWrapper,
            OptionContext::Server,
            OptionContext::UserMapping,
            OptionContext::Attribute,
        ] {
            let err = validate_options(context, ["script"]).unwrap_err();
            assert_eq!(
                err.to_string(),
                "invalid option \"script\": There are no valid options in this context."
            );
        }
    }

    #[test]
    fn test_parse_context() {
        assert_eq!(
            "table".parse::<OptionContext>().ok(),
            Some(OptionContext::ForeignTable)
        );
        assert_eq!(
            "Server".parse::<OptionContext>().ok(),
            Some(OptionContext::Server)
        );
        assert!("schema".parse::<OptionContext>().is_err());
    }
}
