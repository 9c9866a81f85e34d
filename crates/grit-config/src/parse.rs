//! INI parsing and serialization for the consumed config subset.

use bstr::{BString, ByteSlice};

use crate::{Config, ConfigError, Section};

/// Parse a git config file.
///
/// Handles section headers (with quoted subsections), `key = value` lines,
/// bare keys (implicit "true"), `#`/`;` comments, and blank lines. Values
/// may be double-quoted; quotes are stripped.
pub fn parse(data: &[u8]) -> Result<Config, ConfigError> {
    let mut config = Config::default();
    let mut current: Option<Section> = None;

    for (line_no, raw_line) in data.lines().enumerate() {
        let line_no = line_no + 1;
        let line = strip_comment(raw_line);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(b"[") {
            if let Some(section) = current.take() {
                config.sections.push(section);
            }
            current = Some(parse_section_header(line, line_no)?);
            continue;
        }

        let section = current.as_mut().ok_or(ConfigError::Parse {
            line: line_no,
            reason: "key outside any section".into(),
        })?;

        let (key, value) = match line.find_byte(b'=') {
            Some(eq) => {
                let key = line[..eq].trim();
                let value = unquote(line[eq + 1..].trim());
                (key, value)
            }
            // A bare key means boolean true.
            None => (line, BString::from("true")),
        };

        let key = std::str::from_utf8(key)
            .map_err(|_| ConfigError::Parse {
                line: line_no,
                reason: "non-UTF-8 key".into(),
            })?
            .to_ascii_lowercase();
        if key.is_empty() {
            return Err(ConfigError::Parse {
                line: line_no,
                reason: "empty key".into(),
            });
        }

        section.entries.push((key, value));
    }

    if let Some(section) = current {
        config.sections.push(section);
    }
    Ok(config)
}

fn parse_section_header(line: &[u8], line_no: usize) -> Result<Section, ConfigError> {
    let close = line.find_byte(b']').ok_or(ConfigError::Parse {
        line: line_no,
        reason: "unterminated section header".into(),
    })?;
    let inner = &line[1..close];

    // `[name "subsection"]` or plain `[name]`.
    let (name, subsection) = match inner.find_byte(b'"') {
        Some(quote) => {
            let name = inner[..quote].trim();
            let rest = &inner[quote + 1..];
            let end_quote = rest.find_byte(b'"').ok_or(ConfigError::Parse {
                line: line_no,
                reason: "unterminated subsection quote".into(),
            })?;
            (name, Some(&rest[..end_quote]))
        }
        None => (inner.trim(), None),
    };

    let name = std::str::from_utf8(name)
        .map_err(|_| ConfigError::Parse {
            line: line_no,
            reason: "non-UTF-8 section name".into(),
        })?
        .to_ascii_lowercase();
    if name.is_empty() {
        return Err(ConfigError::Parse {
            line: line_no,
            reason: "empty section name".into(),
        });
    }

    let subsection = subsection
        .map(|s| {
            std::str::from_utf8(s).map(str::to_owned).map_err(|_| ConfigError::Parse {
                line: line_no,
                reason: "non-UTF-8 subsection".into(),
            })
        })
        .transpose()?;

    Ok(Section {
        name,
        subsection,
        entries: Vec::new(),
    })
}

/// Drop a trailing `#` or `;` comment (quotes are respected).
fn strip_comment(line: &[u8]) -> &[u8] {
    let mut in_quotes = false;
    for (i, &b) in line.iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'#' | b';' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

fn unquote(value: &[u8]) -> BString {
    if value.len() >= 2 && value.starts_with(b"\"") && value.ends_with(b"\"") {
        BString::from(&value[1..value.len() - 1])
    } else {
        BString::from(value)
    }
}

/// Serialize in the conventional tab-indented form.
pub fn serialize(config: &Config) -> Vec<u8> {
    let mut out = Vec::new();
    for section in &config.sections {
        out.push(b'[');
        out.extend_from_slice(section.name.as_bytes());
        if let Some(ref sub) = section.subsection {
            out.extend_from_slice(b" \"");
            out.extend_from_slice(sub.as_bytes());
            out.push(b'"');
        }
        out.extend_from_slice(b"]\n");

        for (key, value) in &section.entries {
            out.push(b'\t');
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(b" = ");
            out.extend_from_slice(value);
            out.push(b'\n');
        }
    }
    out
}
