use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const MANIFEST_FILE: &str = "package.json";

static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());
static SCRIPTS_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""scripts"\s*:\s*\{([^}]*)\}"#).unwrap());
static SCRIPT_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]+)"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap());

#[derive(Debug)]
pub enum ParseError {
    IoError(std::io::Error),
    MissingManifest,
    Unreadable,
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        ParseError::IoError(err)
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::IoError(e) => write!(f, "failed to read {}: {}", MANIFEST_FILE, e),
            ParseError::MissingManifest => write!(f, "no {} found", MANIFEST_FILE),
            ParseError::Unreadable => write!(f, "{} could not be parsed", MANIFEST_FILE),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub name: Option<String>,
    pub scripts: BTreeMap<String, String>,
}

pub struct ManifestParser;

impl ManifestParser {
    /// Reads the script manifest in `project_path`.
    pub fn read(project_path: &Path) -> Result<Manifest, ParseError> {
        let manifest_path = project_path.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(ParseError::MissingManifest);
        }

        let content = fs::read_to_string(&manifest_path)?;
        Self::parse(&content).ok_or(ParseError::Unreadable)
    }

    /// Strict JSON first, then JSON with comments and trailing commas removed,
    /// then a regex scan of the `scripts` block.
    pub fn parse(content: &str) -> Option<Manifest> {
        if let Ok(value) = serde_json::from_str::<Value>(content) {
            return Some(Self::from_value(&value));
        }

        let cleaned = strip_comments(content);
        let cleaned = TRAILING_COMMA.replace_all(&cleaned, "$1");
        if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
            log::debug!("[ManifestParser] parsed manifest after removing comments");
            return Some(Self::from_value(&value));
        }

        let block = SCRIPTS_BLOCK.captures(&cleaned)?;
        let scripts: BTreeMap<String, String> = SCRIPT_ENTRY
            .captures_iter(block.get(1)?.as_str())
            .map(|c| (c[1].to_string(), c[2].replace("\\\"", "\"")))
            .collect();

        log::debug!(
            "[ManifestParser] recovered {} scripts from malformed manifest",
            scripts.len()
        );
        Some(Manifest {
            name: None,
            scripts,
        })
    }

    fn from_value(value: &Value) -> Manifest {
        let name = value
            .get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let scripts = value
            .get("scripts")
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(key, val)| val.as_str().map(|cmd| (key.clone(), cmd.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Manifest { name, scripts }
    }
}

/// Removes `//` and `/* */` comments that sit outside string literals.
fn strip_comments(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    out
}
