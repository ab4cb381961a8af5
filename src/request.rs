//! Turning a chat message into a [`Request`].

use crate::error::{Error, Result};
use crate::jobs::Request;

/// Split `line` into words with POSIX shell quoting rules. Quotes are
/// stripped; inside double quotes a backslash only escapes `$`, `` ` ``,
/// `"`, `\` and newline.
pub fn parse_command_line(line: &str) -> Result<Vec<String>> {
    shell_words::split(line).map_err(|e| Error::invalid(format!("invalid command line: {e}")))
}

/// Parse `line` into a request carrying the caller identity from `origin`.
pub fn request_from_line(line: &str, origin: &Request) -> Result<Request> {
    let mut words = parse_command_line(line)?.into_iter();
    let command = words
        .next()
        .ok_or_else(|| Error::invalid("no command given"))?;
    Ok(Request {
        command,
        args: words.collect(),
        ..origin.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<String> {
        parse_command_line(line).unwrap()
    }

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(words("  echo   hello\tworld "), vec!["echo", "hello", "world"]);
        assert!(words("   ").is_empty());
    }

    #[test]
    fn quotes_group_words() {
        assert_eq!(
            words(r#"echo "hello world" 'single quoted' mixed"quo"ted"#),
            vec!["echo", "hello world", "single quoted", "mixedquoted"]
        );
        assert_eq!(words(r#"echo """#), vec!["echo", ""]);
    }

    #[test]
    fn backslash_escapes() {
        assert_eq!(words(r#"echo a\ b "say \"hi\"""#), vec!["echo", "a b", "say \"hi\""]);
        assert_eq!(words(r"echo 'no\escape'"), vec!["echo", r"no\escape"]);
    }

    #[test]
    fn backslash_in_double_quotes_is_kept_for_ordinary_chars() {
        assert_eq!(words(r#"grep "\d+" file"#), vec!["grep", r"\d+", "file"]);
        assert_eq!(
            words(r#"ls "C:\Temp\logs""#),
            vec!["ls", r"C:\Temp\logs"]
        );
    }

    #[test]
    fn unterminated_quote_is_invalid() {
        assert!(matches!(
            parse_command_line("echo 'oops"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn request_keeps_origin_identity() {
        let origin = Request {
            username: "someone".into(),
            channel_link: "<#123>".into(),
            ..Request::default()
        };
        let request = request_from_line("jobs -limit=1", &origin).unwrap();
        assert_eq!(request.command, "jobs");
        assert_eq!(request.args, vec!["-limit=1"]);
        assert_eq!(request.username, "someone");
        assert_eq!(request.channel_link, "<#123>");
        assert!(request_from_line("", &origin).is_err());
    }
}
