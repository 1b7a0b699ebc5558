use core::fmt::{self, Display, Formatter};

use mailparse::MailAddr;

#[derive(PartialEq, PartialOrd, Eq, Hash, Debug, Clone)]
pub enum HeloVariant {
    Ehlo(String),
    Helo(String),
}

impl Display for HeloVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ehlo(id) => write!(f, "EHLO {id}"),
            Self::Helo(id) => write!(f, "HELO {id}"),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Command {
    Helo(HeloVariant),
    /// If `sender` is `None`, then it should be assumed this is the `null sender`, or `null reverse-path`,
    /// from [RFC-5321](https://www.ietf.org/rfc/rfc5321.txt).
    MailFrom {
        sender: Option<String>,
        /// Declared with the `SIZE=` parameter (RFC 1870).
        size: Option<usize>,
    },
    RcptTo(String),
    Data,
    Rset,
    Noop,
    Vrfy(String),
    Quit,
    /// Recognised, but not offered by this server (`STARTTLS`, `AUTH`, ...).
    NotImplemented(String),
    /// A known command with bad arguments.
    Invalid(String),
    /// Not a command at all.
    Unknown(String),
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(v) => Display::fmt(v, fmt),
            Self::MailFrom { sender, size } => {
                write!(fmt, "MAIL FROM:<{}>", sender.as_deref().unwrap_or_default())?;
                if let Some(size) = size {
                    write!(fmt, " SIZE={size}")?;
                }
                Ok(())
            }
            Self::RcptTo(rcpt) => write!(fmt, "RCPT TO:<{rcpt}>"),
            Self::Data => fmt.write_str("DATA"),
            Self::Rset => fmt.write_str("RSET"),
            Self::Noop => fmt.write_str("NOOP"),
            Self::Vrfy(arg) => write!(fmt, "VRFY {arg}"),
            Self::Quit => fmt.write_str("QUIT"),
            Self::NotImplemented(s) | Self::Invalid(s) | Self::Unknown(s) => fmt.write_str(s),
        }
    }
}

/// Strips `prefix` from the start of `value`, ignoring ASCII case.
fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    value
        .get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .and_then(|_| value.get(prefix.len()..))
}

/// Splits `<path> params` (or a bare `path params`) into its two parts.
fn split_path(argument: &str) -> Result<(&str, &str), String> {
    let argument = argument.trim_start();

    if let Some(stripped) = argument.strip_prefix('<') {
        let end = stripped
            .find('>')
            .ok_or_else(|| String::from("Unterminated address"))?;
        Ok((&stripped[..end], stripped[end + 1..].trim()))
    } else {
        Ok(argument
            .split_once(' ')
            .map_or((argument, ""), |(path, params)| (path, params.trim())))
    }
}

/// Validates a single mailbox with `mailparse` and returns its bare address.
fn parse_address(path: &str) -> Result<String, String> {
    let addresses = mailparse::addrparse(path).map_err(|err| err.to_string())?;

    match addresses.first() {
        Some(MailAddr::Single(single)) if addresses.len() == 1 && single.addr.contains('@') => {
            Ok(single.addr.clone())
        }
        _ => Err(format!("Invalid address: {path}")),
    }
}

fn parse_mail_from(argument: &str) -> Result<Command, Command> {
    if argument.trim().is_empty() {
        return Err(Command::Invalid(String::from("Syntax: MAIL FROM:<address>")));
    }

    let (path, params) = split_path(argument).map_err(Command::Invalid)?;

    // Handle NULL sender explicitly, as mailparse doesn't tend to like this
    let sender = if path.is_empty() {
        None
    } else {
        Some(parse_address(path).map_err(Command::Invalid)?)
    };

    let mut size = None;
    for param in params.split_ascii_whitespace() {
        if let Some(value) = strip_prefix_ignore_case(param, "SIZE=") {
            size = Some(
                value
                    .parse()
                    .map_err(|_| Command::Invalid(format!("Invalid SIZE parameter: {value}")))?,
            );
        }
    }

    Ok(Command::MailFrom { sender, size })
}

fn parse_rcpt_to(argument: &str) -> Result<Command, Command> {
    let (path, _) = split_path(argument).map_err(Command::Invalid)?;

    if path.is_empty() {
        return Err(Command::Invalid(String::from("Syntax: RCPT TO:<address>")));
    }

    // RFC 5321 4.5.1: postmaster must be accepted without a domain
    if path.eq_ignore_ascii_case("postmaster") {
        return Ok(Command::RcptTo(path.to_string()));
    }

    parse_address(path).map_or_else(|e| Err(Command::Invalid(e)), |to| Ok(Command::RcptTo(to)))
}

impl TryFrom<&str> for Command {
    type Error = Self;

    fn try_from(command: &str) -> Result<Self, Self::Error> {
        let command = command.trim_end_matches(['\r', '\n']);
        let (verb, argument) = command
            .trim_start()
            .split_once(' ')
            .map_or((command.trim(), ""), |(verb, argument)| (verb, argument.trim()));

        match verb.to_ascii_uppercase().as_str() {
            "MAIL" => strip_prefix_ignore_case(argument, "FROM:").map_or_else(
                || Err(Self::Invalid(String::from("Syntax: MAIL FROM:<address>"))),
                parse_mail_from,
            ),
            "RCPT" => strip_prefix_ignore_case(argument, "TO:").map_or_else(
                || Err(Self::Invalid(String::from("Syntax: RCPT TO:<address>"))),
                parse_rcpt_to,
            ),
            "EHLO" | "HELO" if argument.is_empty() => {
                Err(Self::Invalid(format!("Expected hostname in {verb}")))
            }
            "EHLO" => Ok(Self::Helo(HeloVariant::Ehlo(argument.to_string()))),
            "HELO" => Ok(Self::Helo(HeloVariant::Helo(argument.to_string()))),
            "DATA" => Ok(Self::Data),
            "RSET" => Ok(Self::Rset),
            "NOOP" => Ok(Self::Noop),
            "QUIT" => Ok(Self::Quit),
            "VRFY" if argument.is_empty() => Err(Self::Invalid(String::from("Syntax: VRFY <address>"))),
            "VRFY" => Ok(Self::Vrfy(argument.to_string())),
            "STARTTLS" | "AUTH" | "EXPN" | "HELP" | "TURN" | "BDAT" => {
                Err(Self::NotImplemented(verb.to_ascii_uppercase()))
            }
            _ => Err(Self::Unknown(command.to_owned())),
        }
    }
}

impl TryFrom<&[u8]> for Command {
    type Error = Self;

    fn try_from(command: &[u8]) -> Result<Self, Self::Error> {
        std::str::from_utf8(command).map_or(
            Err(Self::Invalid("Unable to interpret command".to_string())),
            Self::try_from,
        )
    }
}

impl TryFrom<String> for Command {
    type Error = Self;

    fn try_from(command: String) -> Result<Self, Self::Error> {
        Self::try_from(command.as_str())
    }
}
