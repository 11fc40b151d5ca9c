//! `{{ ... }}` placeholder rendering for descriptor fields.
//!
//! Supported expressions: `env "NAME"`, `version`, `name`, `platform`, `os`,
//! `arch` and `sha256 "relative/path"`. Everything else is an error; there are
//! no conditionals, loops or pipelines.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::vars::VariableSource;
use crate::checksum;
use crate::platform::Platform;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unterminated `{{{{` at byte {0}")]
    Unterminated(usize),
    #[error("unterminated string literal in `{0}`")]
    UnterminatedString(String),
    #[error("empty placeholder")]
    Empty,
    #[error("unknown template function `{0}`")]
    UnknownFunction(String),
    #[error("`{func}` {reason}")]
    BadArguments { func: String, reason: String },
    #[error("variable `{0}` is not set")]
    UndefinedVariable(String),
    #[error("`{0}` is not available in this field")]
    Unavailable(String),
    #[error("sha256 of {path}: {source}")]
    Digest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Values placeholders resolve against.
pub struct TemplateContext<'a> {
    pub vars: &'a dyn VariableSource,
    pub name: &'a str,
    /// `None` while rendering the `version` field itself.
    pub version: Option<&'a str>,
    pub platform: &'a Platform,
    /// Directory `sha256 "path"` arguments are relative to.
    pub base_dir: &'a Path,
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
}

/// Render every placeholder in `input`. Text outside `{{ }}` is copied verbatim.
pub fn render(input: &str, ctx: &TemplateContext<'_>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut offset = 0;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let close = after_open
            .find("}}")
            .ok_or(TemplateError::Unterminated(offset + open))?;
        let expr = &after_open[..close];
        out.push_str(&evaluate(expr, ctx)?);
        let consumed = open + 2 + close + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

fn evaluate(expr: &str, ctx: &TemplateContext<'_>) -> Result<String, TemplateError> {
    let tokens = tokenize(expr)?;
    let (head, args) = match tokens.split_first() {
        Some((Token::Ident(head), args)) => (head.as_str(), args),
        Some((Token::Str(_), _)) => {
            return Err(TemplateError::BadArguments {
                func: expr.trim().to_string(),
                reason: "must start with a function name".to_string(),
            })
        }
        None => return Err(TemplateError::Empty),
    };

    match head {
        "env" => {
            let key = single_string_arg(head, args)?;
            ctx.vars
                .get(key)
                .ok_or_else(|| TemplateError::UndefinedVariable(key.to_string()))
        }
        "sha256" => {
            let rel = single_string_arg(head, args)?;
            let path = ctx.base_dir.join(rel);
            let digest = checksum::sha256_path(&path)
                .map_err(|source| TemplateError::Digest { path, source })?;
            Ok(digest.to_hex())
        }
        "version" => {
            no_args(head, args)?;
            ctx.version
                .map(str::to_string)
                .ok_or_else(|| TemplateError::Unavailable(head.to_string()))
        }
        "name" => {
            no_args(head, args)?;
            Ok(ctx.name.to_string())
        }
        "platform" => {
            no_args(head, args)?;
            Ok(ctx.platform.to_string())
        }
        "os" => {
            no_args(head, args)?;
            Ok(ctx.platform.os().to_string())
        }
        "arch" => {
            no_args(head, args)?;
            Ok(ctx.platform.arch().to_string())
        }
        other => Err(TemplateError::UnknownFunction(other.to_string())),
    }
}

fn single_string_arg<'t>(func: &str, args: &'t [Token]) -> Result<&'t str, TemplateError> {
    match args {
        [Token::Str(s)] => Ok(s),
        _ => Err(TemplateError::BadArguments {
            func: func.to_string(),
            reason: "takes exactly one quoted string".to_string(),
        }),
    }
}

fn no_args(func: &str, args: &[Token]) -> Result<(), TemplateError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(TemplateError::BadArguments {
            func: func.to_string(),
            reason: "takes no arguments".to_string(),
        })
    }
}

fn tokenize(expr: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut s = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some(escaped) => s.push(escaped),
                        None => break,
                    },
                    other => s.push(other),
                }
            }
            if !closed {
                return Err(TemplateError::UnterminatedString(expr.trim().to_string()));
            }
            tokens.push(Token::Str(s));
        } else {
            let mut ident = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '"' {
                    break;
                }
                ident.push(c);
                chars.next();
            }
            tokens.push(Token::Ident(ident));
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::vars::MapSource;

    fn render_with(input: &str, vars: &MapSource, version: Option<&str>) -> Result<String, TemplateError> {
        let platform = Platform::new("darwin", "amd64");
        let ctx = TemplateContext {
            vars,
            name: "gpup",
            version,
            platform: &platform,
            base_dir: Path::new("."),
        };
        render(input, &ctx)
    }

    #[test]
    fn plain_text_is_untouched() {
        let vars = MapSource::new();
        assert_eq!(
            render_with("https://example.com/a.zip", &vars, None).unwrap(),
            "https://example.com/a.zip"
        );
    }

    #[test]
    fn env_version_and_platform() {
        let vars = MapSource::new().with("VERSION", "v1.2.3");
        let url = r#"https://github.com/int128/gpup/releases/download/{{ env "VERSION" }}/{{name}}_{{ platform }}.zip"#;
        assert_eq!(
            render_with(url, &vars, None).unwrap(),
            "https://github.com/int128/gpup/releases/download/v1.2.3/gpup_darwin_amd64.zip"
        );
        assert_eq!(
            render_with("{{ version }}-{{ os }}-{{ arch }}", &vars, Some("1.2.3")).unwrap(),
            "1.2.3-darwin-amd64"
        );
    }

    #[test]
    fn version_unavailable_while_resolving_version() {
        let vars = MapSource::new();
        assert!(matches!(
            render_with("{{ version }}", &vars, None),
            Err(TemplateError::Unavailable(_))
        ));
    }

    #[test]
    fn undefined_variable_is_error() {
        let vars = MapSource::new();
        match render_with(r#"{{ env "VERSION" }}"#, &vars, None) {
            Err(TemplateError::UndefinedVariable(k)) => assert_eq!(k, "VERSION"),
            other => panic!("expected undefined variable, got {:?}", other),
        }
    }

    #[test]
    fn malformed_placeholders() {
        let vars = MapSource::new().with("X", "1");
        assert!(matches!(
            render_with("a {{ env \"X\" ", &vars, None),
            Err(TemplateError::Unterminated(2))
        ));
        assert!(matches!(
            render_with("{{ }}", &vars, None),
            Err(TemplateError::Empty)
        ));
        assert!(matches!(
            render_with("{{ upper \"x\" }}", &vars, None),
            Err(TemplateError::UnknownFunction(_))
        ));
        assert!(matches!(
            render_with("{{ env X }}", &vars, None),
            Err(TemplateError::BadArguments { .. })
        ));
        assert!(matches!(
            render_with("{{ env \"X }}", &vars, None),
            Err(TemplateError::UnterminatedString(_))
        ));
        assert!(matches!(
            render_with("{{ platform \"x\" }}", &vars, None),
            Err(TemplateError::BadArguments { .. })
        ));
    }

    #[test]
    fn escaped_quotes_in_strings() {
        let vars = MapSource::new().with("A\"B", "ok");
        assert_eq!(
            render_with(r#"{{ env "A\"B" }}"#, &vars, None).unwrap(),
            "ok"
        );
    }

    #[test]
    fn sha256_of_local_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.zip"), b"hello\n").unwrap();
        let vars = MapSource::new();
        let platform = Platform::new("linux", "amd64");
        let ctx = TemplateContext {
            vars: &vars,
            name: "gpup",
            version: Some("1"),
            platform: &platform,
            base_dir: dir.path(),
        };
        assert_eq!(
            render(r#"{{ sha256 "a.zip" }}"#, &ctx).unwrap(),
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
        assert!(matches!(
            render(r#"{{ sha256 "missing.zip" }}"#, &ctx),
            Err(TemplateError::Digest { .. })
        ));
    }
}
